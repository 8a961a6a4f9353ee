//! Species trait tables read from CSV.
//!
//! A trait table maps species names to two binary trait scores. Rows with
//! missing or non-binary values are dropped rather than rejected, and the
//! drop count is reported so callers can surface it.

use filix_core::{FilixError, Result, Summarizable};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

use ::csv::ReaderBuilder;

/// Zero-based column indices selecting the species and trait columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSelection {
    /// Column holding the species name.
    pub species: usize,
    /// Column holding the first binary trait.
    pub trait_a: usize,
    /// Column holding the second binary trait.
    pub trait_b: usize,
}

impl ColumnSelection {
    /// Checks that the three column indices are pairwise distinct.
    pub fn validate(&self) -> Result<()> {
        if self.species == self.trait_a
            || self.species == self.trait_b
            || self.trait_a == self.trait_b
        {
            return Err(FilixError::InvalidInput(format!(
                "column selection: indices must be distinct (species={}, trait_a={}, trait_b={})",
                self.species, self.trait_a, self.trait_b
            )));
        }
        Ok(())
    }
}

/// One usable row of a trait table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraitRecord {
    pub species: String,
    /// First binary trait (0 or 1).
    pub trait_a: u8,
    /// Second binary trait (0 or 1).
    pub trait_b: u8,
}

/// A parsed trait table.
#[derive(Debug, Clone, PartialEq)]
pub struct TraitTable {
    /// Usable rows in file order, one per species.
    pub records: Vec<TraitRecord>,
    /// Rows dropped for missing data, non-binary values, short rows, or
    /// duplicate species.
    pub dropped: usize,
}

impl Summarizable for TraitTable {
    fn summary(&self) -> String {
        format!(
            "TraitTable: {} species ({} rows dropped)",
            self.records.len(),
            self.dropped
        )
    }
}

/// Parses a binary trait cell. `Ok(None)` means the value is missing or not
/// a clean 0/1 score.
fn parse_trait_cell(cell: &str) -> Option<u8> {
    let cell = cell.trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case("na") || cell == "?" {
        return None;
    }
    match cell {
        "0" => Some(0),
        "1" => Some(1),
        _ => None,
    }
}

/// Reads a species trait table from a headered CSV file.
///
/// Rows are dropped (and counted) when any selected column is absent, the
/// species name is empty, a trait value is missing or non-binary, or the
/// species already appeared in an earlier row. Returns an error if no
/// usable row remains.
pub fn read_trait_table(path: &Path, columns: &ColumnSelection) -> Result<TraitTable> {
    columns.validate()?;

    let file = File::open(path).map_err(|e| {
        FilixError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(file);

    let mut records = Vec::new();
    let mut dropped = 0usize;
    let mut seen: HashSet<String> = HashSet::new();

    for result in reader.records() {
        let record = result.map_err(|e| FilixError::Parse(e.to_string()))?;
        let fields = (
            record.get(columns.species),
            record.get(columns.trait_a),
            record.get(columns.trait_b),
        );
        let (species, cell_a, cell_b) = match fields {
            (Some(s), Some(a), Some(b)) => (s.trim(), a, b),
            _ => {
                dropped += 1;
                continue;
            }
        };
        if species.is_empty() {
            dropped += 1;
            continue;
        }
        let (trait_a, trait_b) = match (parse_trait_cell(cell_a), parse_trait_cell(cell_b)) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                dropped += 1;
                continue;
            }
        };
        if !seen.insert(species.to_string()) {
            dropped += 1;
            continue;
        }
        records.push(TraitRecord {
            species: species.to_string(),
            trait_a,
            trait_b,
        });
    }

    if records.is_empty() {
        return Err(FilixError::InvalidInput(format!(
            "read_trait_table: no usable rows in {}",
            path.display()
        )));
    }
    Ok(TraitTable { records, dropped })
}
