pub use anyhow::{anyhow, bail, Context, Error, Result};
pub use log::{debug, error, info, trace, warn};

/// Structural problems with an excuse report, these abort the whole run
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Failed to parse excuse report: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Excuse report has no `sources` collection")]
    MissingSources,
    #[error("Excuse record #{0} has neither `source` nor `item-name`")]
    MissingName(usize),
    #[error("No excuse found for {0:?}")]
    UnknownSource(String),
}
