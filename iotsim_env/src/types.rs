//! Common types for the iotsim environment abstraction.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which stream a message belongs to.
///
/// Routing maps each view to its own list of sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataView {
    /// Exact simulated values
    Truth,
    /// Observed values after the reader and network layers
    Reading,
}

impl DataView {
    pub const ALL: [DataView; 2] = [DataView::Truth, DataView::Reading];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataView::Truth => "truth",
            DataView::Reading => "reading",
        }
    }
}

impl fmt::Display for DataView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
