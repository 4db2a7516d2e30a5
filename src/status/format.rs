//! Encoding a train into an integration commit message.

use crate::types::MergeTrain;
use thiserror::Error;

/// The literal first line of every integration commit message.
pub const STATE_HEADER: &str = "Light-Merge State";

/// Serialising a train failed. Nothing should be written when this happens.
#[derive(Debug, Error)]
#[error("failed to serialize train state: {0}")]
pub struct FormatError(#[from] serde_json::Error);

/// Formats the commit message that carries `train`.
///
/// The output is deterministic: equal trains always produce byte-identical
/// messages.
pub fn format_train_state(train: &MergeTrain) -> Result<String, FormatError> {
    let json = serde_json::to_string_pretty(train)?;
    Ok(format!("{STATE_HEADER}\n\n{json}"))
}
