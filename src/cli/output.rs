//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::RelayError;

/// Map domain errors to a string for CLI output.
pub fn map_error(e: &RelayError) -> String {
    e.to_string()
}
