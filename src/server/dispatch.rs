//! Command execution.
//!
//! The webhook handler only validates and enqueues. [`Dispatcher::run`] drains
//! the queue, running each command on its own task:
//!
//! 1. take the working copy lock for the project's repository
//! 2. clone or fetch, then load the train (blocking, on the blocking pool)
//! 3. resolve the command's target through GitLab
//! 4. apply the change and push (blocking)
//! 5. react to the note, then rewrite the issue description
//!
//! Replies and emoji are spawned and never awaited; their failures are logged
//! and have no effect on the train.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use url::Url;

use super::locks::RepoLocks;
use crate::commands::Command;
use crate::config::Config;
use crate::git::{GitError, sync_with_remote};
use crate::gitlab::{GitLabClient, GitLabError, GitLabViewHelper, IssueNoteEvent};
use crate::operator::{MergeTrainOperator, OperatorError, OperatorSettings};
use crate::view::{LastCommand, error_to_markdown};

/// Username GitLab accepts alongside a personal access token in clone URLs.
const CLONE_USER: &str = "light-merge";

const EMOJI_SUCCESS: &str = "white_check_mark";
const EMOJI_FAILURE: &str = "x";

/// A parsed command and the note it came from.
#[derive(Debug, Clone)]
pub struct CommandJob {
    pub command: Command,
    pub event: IssueNoteEvent,
}

/// Failures before the command itself runs.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to sync repository: {0}")]
    Sync(#[from] GitError),

    #[error(transparent)]
    Operator(#[from] OperatorError),

    #[error("background task failed: {0}")]
    Join(#[from] JoinError),
}

/// Runs queued commands against their repositories.
#[derive(Clone)]
pub struct Dispatcher {
    config: Arc<Config>,
    gitlab: GitLabClient,
    locks: RepoLocks,
}

impl Dispatcher {
    pub fn new(config: Arc<Config>, gitlab: GitLabClient) -> Self {
        Dispatcher {
            config,
            gitlab,
            locks: RepoLocks::new(),
        }
    }

    /// Handles jobs until `shutdown` is cancelled or every sender is gone,
    /// then waits for in-flight commands to finish.
    pub async fn run(
        self,
        mut jobs: mpsc::UnboundedReceiver<CommandJob>,
        shutdown: CancellationToken,
    ) {
        info!("dispatcher started");
        let mut running = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                job = jobs.recv() => match job {
                    Some(job) => {
                        let dispatcher = self.clone();
                        running.spawn(async move { dispatcher.handle(job).await });
                    }
                    None => break,
                },
                Some(result) = running.join_next(), if !running.is_empty() => {
                    if let Err(e) = result {
                        error!(error = %e, "command task panicked");
                    }
                }
            }
        }

        info!(in_flight = running.len(), "dispatcher stopping");
        while let Some(result) = running.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "command task panicked");
            }
        }
    }

    /// Runs one command to completion, including notifications.
    pub async fn handle(&self, job: CommandJob) {
        let span = info_span!(
            "command",
            project_id = %job.event.project_id,
            issue = %job.event.issue_iid,
            command = %job.command,
        );
        self.handle_inner(job).instrument(span).await
    }

    async fn handle_inner(&self, job: CommandJob) {
        let event = &job.event;
        info!(author = %event.user.username, "handling command");

        let repo_path = self.repo_path(event);
        let _lock = self.locks.lock(&repo_path).await;

        let operator = match self.open_operator(event, repo_path).await {
            Ok(operator) => operator,
            Err(e) => {
                error!(error = %e, "failed to load merge train");
                let message = match &e {
                    DispatchError::Operator(op) => op.to_markdown(),
                    other => error_to_markdown(&other.to_string()),
                };
                self.reply(event, message);
                return;
            }
        };

        match &job.command {
            Command::Add { target } => {
                let git_ref = match self.gitlab.resolve_ref(event.project_id, target).await {
                    Ok(git_ref) => git_ref,
                    Err(e) => {
                        warn!(target = %target, error = %e, "failed to resolve ref");
                        self.reply(event, lookup_error_message(target, &e));
                        return;
                    }
                };
                let (operator, result) =
                    match run_blocking(operator, move |op| op.add_and_push(&git_ref)).await {
                        Ok(done) => done,
                        Err(e) => {
                            self.report_task_failure(event, "add", &e);
                            return;
                        }
                    };
                if let Ok(head) = &result {
                    info!(head = %head, "added branch");
                }
                self.finish(event, &operator, result.map(|_| ())).await;
            }
            Command::Remove { target } => {
                let branch = match self.branch_to_remove(event, target).await {
                    Ok(branch) => branch,
                    Err(e) => {
                        warn!(target = %target, error = %e, "failed to resolve ref");
                        self.reply(event, lookup_error_message(target, &e));
                        return;
                    }
                };
                let (operator, result) =
                    match run_blocking(operator, move |op| op.remove_and_push(&branch)).await {
                        Ok(done) => done,
                        Err(e) => {
                            self.report_task_failure(event, "remove", &e);
                            return;
                        }
                    };
                if let Ok(head) = &result {
                    match head {
                        Some(head) => info!(head = %head, "removed branch"),
                        None => info!("removed last branch"),
                    }
                }
                self.finish(event, &operator, result.map(|_| ())).await;
            }
            Command::Status => self.sync_view(event, &operator, None).await,
        }
    }

    fn repo_path(&self, event: &IssueNoteEvent) -> PathBuf {
        self.config.repo_dir.join(&event.project.path_with_namespace)
    }

    fn settings(&self, event: &IssueNoteEvent) -> OperatorSettings {
        OperatorSettings {
            project_id: event.project_id,
            issue_iid: event.issue_iid,
            branch_prefix: self.config.branch_name_prefix.clone(),
            base_revision: self.config.base_revision.clone(),
            remote: self.config.remote.clone(),
        }
    }

    async fn open_operator(
        &self,
        event: &IssueNoteEvent,
        repo_path: PathBuf,
    ) -> Result<MergeTrainOperator, DispatchError> {
        let url = clone_url(&event.project.git_http_url, &self.config.gitlab_token);
        let identity = self.config.commit_identity.clone();
        let settings = self.settings(event);

        tokio::task::spawn_blocking(move || {
            let repo = sync_with_remote(&repo_path, &url, identity)?;
            Ok(MergeTrainOperator::load(repo, settings)?)
        })
        .await?
    }

    /// Plain branch names need no lookup: the branch may already be gone on
    /// GitLab and still be a member.
    async fn branch_to_remove(
        &self,
        event: &IssueNoteEvent,
        target: &str,
    ) -> Result<String, GitLabError> {
        if target.starts_with('!') {
            Ok(self.gitlab.resolve_ref(event.project_id, target).await?.name)
        } else {
            Ok(target.to_string())
        }
    }

    /// The blocking task died, taking the operator with it; the train is
    /// reloaded from its branch by the next command.
    fn report_task_failure(&self, event: &IssueNoteEvent, action: &str, e: &JoinError) {
        error!(error = %e, action, "command task failed");
        self.award_emoji(event, EMOJI_FAILURE);
        self.reply(
            event,
            error_to_markdown(&format!("{} failed unexpectedly: {}", action, e)),
        );
    }

    async fn finish(
        &self,
        event: &IssueNoteEvent,
        operator: &MergeTrainOperator,
        outcome: Result<(), OperatorError>,
    ) {
        let error = match outcome {
            Ok(()) => {
                self.award_emoji(event, EMOJI_SUCCESS);
                None
            }
            Err(e) => {
                error!(error = %e, "command failed");
                self.award_emoji(event, EMOJI_FAILURE);
                Some(e.to_markdown())
            }
        };
        self.sync_view(event, operator, error).await;
    }

    async fn sync_view(
        &self,
        event: &IssueNoteEvent,
        operator: &MergeTrainOperator,
        error: Option<String>,
    ) {
        let helper = GitLabViewHelper::new(
            self.gitlab.clone(),
            event.project_id,
            event.project.web_url.clone(),
            event.issue_iid,
        )
        .with_last_command(LastCommand {
            note: event.note.clone(),
            author: event.user.username.clone(),
            created_at: event.created_at.clone(),
            error,
        });

        match operator.sync_merge_train_view(&helper).await {
            Ok(()) => debug!("merge train view updated"),
            Err(e) => {
                error!(error = %e, "failed to sync merge train view");
                self.reply(event, "failed to sync merge train view".to_string());
            }
        }
    }

    fn reply(&self, event: &IssueNoteEvent, message: String) {
        let gitlab = self.gitlab.clone();
        let (project_id, issue_iid) = (event.project_id, event.issue_iid);
        tokio::spawn(async move {
            if let Err(e) = gitlab.create_issue_note(project_id, issue_iid, &message).await {
                error!(%project_id, issue = %issue_iid, error = %e, "failed to reply to note");
            }
        });
    }

    fn award_emoji(&self, event: &IssueNoteEvent, emoji: &'static str) {
        let gitlab = self.gitlab.clone();
        let (project_id, issue_iid, note_id) = (event.project_id, event.issue_iid, event.note_id);
        tokio::spawn(async move {
            if let Err(e) = gitlab
                .award_emoji_on_issue_note(project_id, issue_iid, note_id, emoji)
                .await
            {
                error!(%project_id, issue = %issue_iid, error = %e, "failed to award emoji");
            }
        });
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("repo_dir", &self.config.repo_dir)
            .finish_non_exhaustive()
    }
}

/// Runs `f` on the blocking pool and hands the operator back with its result.
async fn run_blocking<T, F>(
    mut operator: MergeTrainOperator,
    f: F,
) -> Result<(MergeTrainOperator, Result<T, OperatorError>), JoinError>
where
    T: Send + 'static,
    F: FnOnce(&mut MergeTrainOperator) -> Result<T, OperatorError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let result = f(&mut operator);
        (operator, result)
    })
    .await
}

/// Embeds the access token into an HTTP(S) clone URL. Anything else (such as
/// a local path) is returned unchanged.
pub fn clone_url(project_url: &str, token: &str) -> String {
    match Url::parse(project_url) {
        Ok(mut url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {
            // Both only fail for URLs without a host.
            let _ = url.set_username(CLONE_USER);
            let _ = url.set_password(Some(token));
            url.to_string()
        }
        _ => project_url.to_string(),
    }
}

/// The reply for a target that could not be resolved.
fn lookup_error_message(target: &str, error: &GitLabError) -> String {
    match error {
        GitLabError::NotFound(_) => format!("branch {} not found.", target),
        GitLabError::LookupFailed { .. } => format!("merge request {} lookup failed", target),
        GitLabError::InvalidReference(_) => {
            format!("`{}` is neither a branch nor a merge request reference.", target)
        }
        other => error_to_markdown(&other.to_string()),
    }
}
