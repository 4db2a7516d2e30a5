//! Command types for `!lm` commands.
//!
//! These commands are parsed from issue notes.

use std::fmt;

use thiserror::Error;

/// A parsed `!lm` command from a note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Adds or refreshes a branch: `!lm add <branch|!N>`
    ///
    /// `!N` names merge request N; its source branch is added at the
    /// merge request's head commit.
    Add { target: String },

    /// Removes a branch: `!lm remove <branch|!N>`
    Remove { target: String },

    /// Re-renders the status view without changing the train: `!lm status`
    Status,
}

impl Command {
    /// The command word as typed after `!lm`.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Add { .. } => "add",
            Command::Remove { .. } => "remove",
            Command::Status => "status",
        }
    }

    /// The branch or merge request the command refers to, if any.
    pub fn target(&self) -> Option<&str> {
        match self {
            Command::Add { target } | Command::Remove { target } => Some(target),
            Command::Status => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target() {
            Some(target) => write!(f, "{} {}", self.name(), target),
            None => f.write_str(self.name()),
        }
    }
}

/// Why a note was not turned into a command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The note does not start with `!lm`. Such notes are ordinary discussion.
    #[error("not a light-merge command")]
    NotACommand,

    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    #[error("{command} expects {expected} argument(s), got {got}")]
    WrongArity {
        command: &'static str,
        expected: usize,
        got: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_typed_form() {
        assert_eq!(
            Command::Add { target: "feature/x".to_string() }.to_string(),
            "add feature/x"
        );
        assert_eq!(
            Command::Remove { target: "!12".to_string() }.to_string(),
            "remove !12"
        );
        assert_eq!(Command::Status.to_string(), "status");
    }

    #[test]
    fn target_is_absent_for_status() {
        assert_eq!(Command::Status.target(), None);
        assert_eq!(Command::Add { target: "a".to_string() }.target(), Some("a"));
    }

    #[test]
    fn arity_error_message() {
        let err = CommandError::WrongArity {
            command: "add",
            expected: 1,
            got: 2,
        };
        assert_eq!(err.to_string(), "add expects 1 argument(s), got 2");
    }
}
