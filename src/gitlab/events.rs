//! GitLab webhook payload parsing.
//!
//! Only issue notes are interesting: every command arrives as a note on the
//! issue that owns the train. The event type comes from the `X-Gitlab-Event`
//! header; everything else is ignored rather than rejected.

use serde::Deserialize;
use thiserror::Error;

use crate::types::{IssueIid, NoteId, ProjectId};

/// `X-Gitlab-Event` value for comments.
pub const NOTE_HOOK: &str = "Note Hook";

/// Error type for webhook parsing failures.
#[derive(Debug, Error)]
pub enum EventError {
    /// JSON deserialization failed (includes missing required fields).
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// An issue note without the `issue` object.
    #[error("issue note without issue")]
    MissingIssue,
}

/// A note posted on an issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueNoteEvent {
    pub project_id: ProjectId,
    pub project: EventProject,
    pub user: EventUser,
    pub issue_iid: IssueIid,
    pub note_id: NoteId,
    pub note: String,
    /// As sent by GitLab, e.g. `2024-01-02 03:04:05 UTC`.
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EventProject {
    pub id: ProjectId,
    pub web_url: String,
    pub path_with_namespace: String,
    pub git_http_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EventUser {
    pub username: String,
    #[serde(default)]
    pub bot: bool,
}

#[derive(Debug, Deserialize)]
struct RawNotePayload {
    user: EventUser,
    project_id: ProjectId,
    project: EventProject,
    object_attributes: RawNote,
    #[serde(default)]
    issue: Option<RawIssue>,
}

#[derive(Debug, Deserialize)]
struct RawNote {
    id: NoteId,
    note: String,
    noteable_type: String,
    #[serde(default)]
    created_at: String,
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    iid: IssueIid,
}

/// Parses a webhook delivery.
///
/// * `Ok(Some(event))` - a note on an issue
/// * `Ok(None)` - another event type, or a note on something other than an issue
/// * `Err(e)` - a note payload that does not parse
pub fn parse_note_event(
    event_type: &str,
    payload: &[u8],
) -> Result<Option<IssueNoteEvent>, EventError> {
    if event_type != NOTE_HOOK {
        return Ok(None);
    }

    let raw: RawNotePayload = serde_json::from_slice(payload)?;
    if raw.object_attributes.noteable_type != "Issue" {
        return Ok(None);
    }
    let issue = raw.issue.ok_or(EventError::MissingIssue)?;

    Ok(Some(IssueNoteEvent {
        project_id: raw.project_id,
        project: raw.project,
        user: raw.user,
        issue_iid: issue.iid,
        note_id: raw.object_attributes.id,
        note: raw.object_attributes.note,
        created_at: raw.object_attributes.created_at,
    }))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// A trimmed-down note hook payload as GitLab sends it.
    pub(crate) fn note_payload(noteable_type: &str, note: &str, bot: bool) -> Vec<u8> {
        json!({
            "object_kind": "note",
            "event_type": "note",
            "user": { "id": 1, "name": "Alice", "username": "alice", "bot": bot },
            "project_id": 5,
            "project": {
                "id": 5,
                "name": "demo",
                "web_url": "https://gitlab.example/group/demo",
                "git_http_url": "https://gitlab.example/group/demo.git",
                "path_with_namespace": "group/demo"
            },
            "object_attributes": {
                "id": 1244,
                "note": note,
                "noteable_type": noteable_type,
                "created_at": "2024-01-02 03:04:05 UTC"
            },
            "issue": { "id": 92, "iid": 17, "title": "train" }
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn parses_issue_note() {
        let event = parse_note_event(NOTE_HOOK, &note_payload("Issue", "!lm add f1", false))
            .unwrap()
            .unwrap();

        assert_eq!(event.project_id, ProjectId(5));
        assert_eq!(event.issue_iid, IssueIid(17));
        assert_eq!(event.note_id, NoteId(1244));
        assert_eq!(event.note, "!lm add f1");
        assert_eq!(event.user.username, "alice");
        assert!(!event.user.bot);
        assert_eq!(event.project.path_with_namespace, "group/demo");
        assert_eq!(event.created_at, "2024-01-02 03:04:05 UTC");
    }

    #[test]
    fn other_events_are_ignored() {
        let payload = note_payload("Issue", "!lm add f1", false);
        assert!(parse_note_event("Push Hook", &payload).unwrap().is_none());
        assert!(parse_note_event("", b"not json").unwrap().is_none());
    }

    #[test]
    fn merge_request_notes_are_ignored() {
        let payload = note_payload("MergeRequest", "!lm add f1", false);
        assert!(parse_note_event(NOTE_HOOK, &payload).unwrap().is_none());
    }

    #[test]
    fn bot_flag_defaults_to_false() {
        let mut value: serde_json::Value =
            serde_json::from_slice(&note_payload("Issue", "x", true)).unwrap();
        value["user"].as_object_mut().unwrap().remove("bot");
        let event = parse_note_event(NOTE_HOOK, value.to_string().as_bytes())
            .unwrap()
            .unwrap();
        assert!(!event.user.bot);
    }

    #[test]
    fn malformed_note_is_an_error() {
        assert!(matches!(
            parse_note_event(NOTE_HOOK, b"{\"user\": 1}"),
            Err(EventError::Json(_))
        ));
    }

    #[test]
    fn issue_note_without_issue_is_an_error() {
        let mut value: serde_json::Value =
            serde_json::from_slice(&note_payload("Issue", "x", false)).unwrap();
        value.as_object_mut().unwrap().remove("issue");
        assert!(matches!(
            parse_note_event(NOTE_HOOK, value.to_string().as_bytes()),
            Err(EventError::MissingIssue)
        ));
    }
}
