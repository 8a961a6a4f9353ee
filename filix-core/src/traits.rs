//! Core trait definitions for the filix workspace.

/// A type that can produce a summary of its contents.
///
/// Analysis stages report through their result types; `summary` renders the
/// one-line form used when a run is narrated to a terminal or a log file.
pub trait Summarizable {
    /// A one-line summary suitable for display.
    fn summary(&self) -> String;
}
