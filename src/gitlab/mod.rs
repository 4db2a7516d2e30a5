//! GitLab integration: REST client, webhook payloads, and the issue-backed
//! status view.

pub mod api;
pub mod client;
pub mod error;
pub mod events;
pub mod view_helper;

pub use client::GitLabClient;
pub use error::GitLabError;
pub use events::{EventError, EventProject, EventUser, IssueNoteEvent, NOTE_HOOK, parse_note_event};
pub use view_helper::GitLabViewHelper;
