//! Decoding a train from an integration commit message.

use crate::status::format::STATE_HEADER;
use crate::types::MergeTrain;
use thiserror::Error;

/// Errors that can occur when decoding an integration commit message.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The first line is not the state header; the commit was not written by us.
    #[error("state header not found")]
    HeaderNotFound,

    /// The header is not followed by a blank line.
    #[error("expected a blank line after the state header")]
    MissingSeparator,

    /// The body is not a valid train.
    #[error("invalid JSON in train state: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Parses an integration commit message back into a train.
///
/// Trailing whitespace on the header line is tolerated (some tools append
/// `\r` or spaces); anything else before the JSON body is rejected.
///
/// # Errors
///
/// Returns `ParseError::HeaderNotFound` if the first line is not the state
/// header, `ParseError::MissingSeparator` if the second line is not blank, and
/// `ParseError::InvalidJson` if the body does not match the train schema.
pub fn parse_train_state(message: &str) -> Result<MergeTrain, ParseError> {
    let mut lines = message.splitn(3, '\n');

    let header = lines.next().unwrap_or_default();
    if header.trim_end() != STATE_HEADER {
        return Err(ParseError::HeaderNotFound);
    }

    match lines.next() {
        Some(sep) if sep.trim().is_empty() => {}
        _ => return Err(ParseError::MissingSeparator),
    }

    let body = lines.next().unwrap_or_default();
    Ok(serde_json::from_str(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::format::format_train_state;
    use crate::test_utils::arb_merge_train;
    use crate::types::{IssueIid, ProjectId, Sha};
    use proptest::prelude::*;

    mod parse {
        use super::*;

        #[test]
        fn missing_header_returns_error() {
            let result = parse_train_state("Merge branch 'feature'\n\nsome text");
            assert!(matches!(result, Err(ParseError::HeaderNotFound)));
        }

        #[test]
        fn empty_message_returns_error() {
            assert!(matches!(
                parse_train_state(""),
                Err(ParseError::HeaderNotFound)
            ));
        }

        #[test]
        fn missing_separator_returns_error() {
            let result = parse_train_state("Light-Merge State\n{}");
            assert!(matches!(result, Err(ParseError::MissingSeparator)));
            let result = parse_train_state("Light-Merge State");
            assert!(matches!(result, Err(ParseError::MissingSeparator)));
        }

        #[test]
        fn malformed_json_returns_error() {
            let result = parse_train_state("Light-Merge State\n\n{not json}");
            assert!(matches!(result, Err(ParseError::InvalidJson(_))));
        }

        #[test]
        fn wrong_shape_returns_error() {
            let result = parse_train_state("Light-Merge State\n\n{\"members\": 3}");
            assert!(matches!(result, Err(ParseError::InvalidJson(_))));
        }

        #[test]
        fn parses_handwritten_message() {
            let message = r#"Light-Merge State

{
  "project_id": 12,
  "issue_iid": 4,
  "branch_name": "auto/light-merge-4",
  "members": [
    {
      "project_id": 12,
      "branch": "feature-b",
      "merged_commit": "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"
    },
    {
      "project_id": 12,
      "branch": "feature-a",
      "merged_commit": "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
    }
  ]
}
"#;
            let train = parse_train_state(message).unwrap();
            assert_eq!(train.project_id, ProjectId(12));
            assert_eq!(train.issue_iid, IssueIid(4));
            assert_eq!(train.branch_name, "auto/light-merge-4");
            let branches: Vec<_> = train.members.iter().map(|m| m.branch.as_str()).collect();
            assert_eq!(branches, vec!["feature-b", "feature-a"]);
            assert_eq!(train.members[1].merged_commit, Sha::new("a".repeat(40)));
        }

        #[test]
        fn tolerates_crlf_header() {
            let message = "Light-Merge State\r\n\r\n{\"project_id\":1,\"issue_iid\":2,\
                           \"branch_name\":\"b\",\"members\":[]}";
            let train = parse_train_state(message).unwrap();
            assert!(train.members.is_empty());
        }

        #[test]
        fn absent_members_decode_as_empty() {
            let message = "Light-Merge State\n\n{\"project_id\":1,\"issue_iid\":2,\"branch_name\":\"b\"}";
            assert!(parse_train_state(message).unwrap().members.is_empty());
        }
    }

    mod roundtrip {
        use super::*;

        proptest! {
            #[test]
            fn format_then_parse_preserves_train(train in arb_merge_train()) {
                let message = format_train_state(&train).unwrap();
                let parsed = parse_train_state(&message).unwrap();
                prop_assert_eq!(parsed, train);
            }
        }
    }
}
