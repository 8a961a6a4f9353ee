//! Tip state encoding.
//!
//! Each species carries two binary traits; the model sees one categorical
//! state per tip. The pair is read lexicographically as a two-digit binary
//! code: (0,0) -> 1, (0,1) -> 2, (1,0) -> 3, (1,1) -> 4.

use filix_core::{FilixError, Result};

/// Number of model states.
pub const STATE_COUNT: usize = 4;

/// Encodes a binary trait pair as a state in `1..=4`.
pub fn encode_state(trait_a: u8, trait_b: u8) -> Result<u8> {
    if trait_a > 1 || trait_b > 1 {
        return Err(FilixError::InvalidInput(format!(
            "encode_state: traits must be 0 or 1, got ({}, {})",
            trait_a, trait_b
        )));
    }
    Ok(trait_a * 2 + trait_b + 1)
}

/// Decodes a state in `1..=4` back into its trait pair.
pub fn decode_state(state: u8) -> Result<(u8, u8)> {
    if !(1..=4).contains(&state) {
        return Err(FilixError::InvalidInput(format!(
            "decode_state: state must be in 1..=4, got {}",
            state
        )));
    }
    let code = state - 1;
    Ok((code / 2, code % 2))
}
