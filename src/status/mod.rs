//! Train state codec.
//!
//! A train's whole state lives in the message of the integration commit at the
//! tip of its branch. The message is a fixed header line, a blank line, and the
//! train as pretty-printed JSON.
//!
//! # Format
//!
//! ```text
//! Light-Merge State
//!
//! {
//!   "project_id": 1,
//!   "issue_iid": 7,
//!   "branch_name": "auto/light-merge-7",
//!   "members": [ ... ]
//! }
//! ```
//!
//! Field order follows the struct declaration of [`MergeTrain`](crate::types::MergeTrain),
//! so messages written by any version of this crate decode in any other.

pub mod format;
pub mod parse;

pub use format::{FormatError, STATE_HEADER, format_train_state};
pub use parse::{ParseError, parse_train_state};
