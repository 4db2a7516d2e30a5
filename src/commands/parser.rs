//! Parser for `!lm` commands in note text.
//!
//! This module provides a pure parser that extracts a structured command from
//! an issue note.

use super::types::{Command, CommandError};

/// The prefix every command starts with.
pub const COMMAND_PREFIX: &str = "!lm";

/// Parses a note as a command.
///
/// # Parsing Rules
///
/// - Surrounding whitespace is ignored
/// - The note must start with `!lm` followed by whitespace; anything else is
///   [`CommandError::NotACommand`]
/// - Tokens are separated by any run of whitespace
/// - Command names are case-sensitive
/// - `add` and `remove` take exactly one argument, `status` takes none
///
/// # Examples
///
/// ```
/// use light_merge::commands::{parse_command, Command, CommandError};
///
/// assert_eq!(
///     parse_command("!lm add feature/login"),
///     Ok(Command::Add { target: "feature/login".to_string() })
/// );
/// assert_eq!(parse_command("!lm status"), Ok(Command::Status));
/// assert_eq!(parse_command("looks good to me"), Err(CommandError::NotACommand));
/// ```
pub fn parse_command(text: &str) -> Result<Command, CommandError> {
    let text = text.trim();
    let rest = text
        .strip_prefix(COMMAND_PREFIX)
        .ok_or(CommandError::NotACommand)?;

    // "!lmfoo" is not the prefix.
    if !rest.is_empty() && !rest.starts_with(|c: char| c.is_whitespace()) {
        return Err(CommandError::NotACommand);
    }

    let mut words = rest.split_whitespace();
    let Some(name) = words.next() else {
        return Err(CommandError::UnknownCommand(String::new()));
    };
    let args: Vec<&str> = words.collect();

    match name {
        "add" => {
            let target = single_arg("add", &args)?;
            Ok(Command::Add { target })
        }
        "remove" => {
            let target = single_arg("remove", &args)?;
            Ok(Command::Remove { target })
        }
        "status" => {
            if !args.is_empty() {
                return Err(CommandError::WrongArity {
                    command: "status",
                    expected: 0,
                    got: args.len(),
                });
            }
            Ok(Command::Status)
        }
        other => Err(CommandError::UnknownCommand(other.to_string())),
    }
}

fn single_arg(command: &'static str, args: &[&str]) -> Result<String, CommandError> {
    match args {
        [target] => Ok((*target).to_string()),
        _ => Err(CommandError::WrongArity {
            command,
            expected: 1,
            got: args.len(),
        }),
    }
}
