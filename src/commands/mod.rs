//! Command parsing for bot commands.
//!
//! This module provides types and parsing for commands that users issue via
//! notes on a merge train's issue.
//!
//! # Supported Commands
//!
//! - `!lm add <branch>` - Adds the branch (or refreshes it and moves it to the end)
//! - `!lm add !N` - Adds the source branch of merge request N
//! - `!lm remove <branch|!N>` - Removes the branch from the train
//! - `!lm status` - Re-renders the issue description
//!
//! # Example
//!
//! ```
//! use light_merge::commands::{parse_command, Command};
//!
//! let cmd = parse_command("!lm remove feature/login").unwrap();
//! assert_eq!(cmd, Command::Remove { target: "feature/login".to_string() });
//! ```

mod parser;
mod types;

pub use parser::{COMMAND_PREFIX, parse_command};
pub use types::{Command, CommandError};
