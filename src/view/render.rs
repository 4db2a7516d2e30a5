//! Markdown rendering of train status and command results.

use std::fmt::Write;

use super::{MemberView, MergeTrainView};
use crate::types::GitMergeFailResult;

/// Conflict diffs longer than this are left out of rendered failures.
pub const MAX_CONFLICT_DETAIL_LEN: usize = 4096;

/// Errors shorter than this are rendered inline in bold.
const SHORT_ERROR_LEN: usize = 100;

/// Text shown instead of a diagram when the train has no members.
const EMPTY_TRAIN: &str = "this light merge train is empty.";

const NULL: &str = "null";

impl MergeTrainView {
    /// Renders a mermaid flowchart: every member points at the train node.
    pub fn render_mermaid(&self) -> String {
        if self.members.is_empty() {
            return EMPTY_TRAIN.to_string();
        }

        let mut graph = vec!["graph LR".to_string()];

        for (idx, m) in self.members.iter().enumerate() {
            let name = display_name(m).replace('"', "'");
            let commit = m
                .merged_commit
                .as_ref()
                .map_or(NULL, |c| c.sha.short());

            if idx == 0 {
                let train_node = match &self.commit {
                    Some(c) => format!("LM[(\"{}({})\")]", self.branch, c.sha.short()),
                    None => format!("LM[(\"{}\")]", self.branch),
                };
                graph.push(format!("m{idx}(\"{name}\") -- {commit} --> {train_node};"));
            } else {
                graph.push(format!("m{idx}(\"{name}\") -- {commit} --> LM;"));
            }
        }

        graph.push(format!("click LM \"{}\" _blank", self.url));
        for (idx, m) in self.members.iter().enumerate() {
            let url = m
                .merge_request
                .as_ref()
                .map_or(m.branch_url.as_str(), |mr| mr.url.as_str());
            graph.push(format!("click m{idx} \"{url}\" _blank"));
        }

        format!("```mermaid\n{}\n```", graph.join("\n"))
    }

    /// Renders a Markdown table with one row for the train and one per member.
    ///
    /// Members whose branch moved since they were merged get a hint with the
    /// command that refreshes them.
    pub fn render_table(&self) -> String {
        if self.members.is_empty() {
            return String::new();
        }

        let mut table = vec![
            "| Branch | Merge Request | Merged Commit | Latest Commit | Note |".to_string(),
            "| ------ | ------------ | ------------- | ------------- | ---- |".to_string(),
        ];

        let train_commit = self.commit.as_ref().map_or(NULL.to_string(), |c| {
            format!("[{}]({})", c.sha.short(), c.url)
        });
        table.push(format!(
            "| [{}]({}) | null | null | {} |  |",
            self.branch, self.url, train_commit
        ));

        for m in &self.members {
            let branch = format!("[{}]({})", m.branch, m.branch_url);
            let mr = m.merge_request.as_ref().map_or(NULL.to_string(), |mr| {
                format!("[!{}({}): {}]({})", mr.iid, mr.author, mr.title, mr.url)
            });
            let merged = m.merged_commit.as_ref().map_or(NULL.to_string(), |c| {
                format!("[{}]({})", c.sha.short(), c.url)
            });
            let latest = m.latest_commit.as_ref().map_or(NULL.to_string(), |c| {
                format!("[{}]({})", c.sha.short(), c.url)
            });
            let hint = if m.is_stale() {
                format!("Update to latest: `!lm add {}`", m.branch)
            } else {
                String::new()
            };
            table.push(format!(
                "| {} | {} | {} | {} | {} |",
                branch, mr, merged, latest, hint
            ));
        }

        table.join("\n")
    }
}

fn display_name(m: &MemberView) -> String {
    match &m.merge_request {
        Some(mr) => format!("!{} - {}", mr.iid, mr.title),
        None => m.branch.clone(),
    }
}

/// Renders an error message: short ones inline in bold, long ones collapsed.
pub fn error_to_markdown(message: &str) -> String {
    if message.len() < SHORT_ERROR_LEN {
        format!("**{}**", message)
    } else {
        format!(
            "\n<details><summary>error</summary>\n\n```\n{}\n```\n</details>",
            message
        )
    }
}

/// Renders a merge failure with attribution, the failed command, and per-file diffs.
pub fn render_merge_failure(fail: &GitMergeFailResult) -> String {
    let mut out = String::new();

    match fail.introduced_branch() {
        Some(introduced) if !fail.conflicting_with().is_empty() => {
            let others: Vec<_> = fail
                .conflicting_with()
                .iter()
                .map(|b| format!("`{}`", b))
                .collect();
            let _ = write!(
                out,
                "**`{}` conflicts with {}.**",
                introduced,
                others.join(", ")
            );
        }
        Some(introduced) => {
            let _ = write!(out, "**`{}` could not be merged.**", introduced);
        }
        None => out.push_str("**merge failed.**"),
    }

    let _ = write!(
        out,
        "\n\n`{}` exited with {}\n",
        fail.commandline, fail.status
    );

    for file in &fail.failed_files {
        let _ = write!(
            out,
            "\n<details><summary>{}: {}</summary>\n\n",
            file.conflict_type, file.path
        );
        if file.conflict_detail.len() > MAX_CONFLICT_DETAIL_LEN {
            let _ = writeln!(
                out,
                "diff omitted ({} bytes)",
                file.conflict_detail.len()
            );
        } else {
            let _ = writeln!(out, "```diff\n{}\n```", file.conflict_detail);
        }
        out.push_str("</details>\n");
    }

    if fail.failed_files.is_empty() && !fail.stderr.trim().is_empty() {
        let _ = writeln!(
            out,
            "\n<details><summary>stderr</summary>\n\n```\n{}\n```\n</details>",
            fail.stderr.trim()
        );
    }

    out.trim_end().to_string()
}

/// The command that triggered a view update, and how it went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastCommand {
    /// The raw note text.
    pub note: String,
    /// Username of the note's author.
    pub author: String,
    /// When the note was created, as reported by the platform.
    pub created_at: String,
    /// Rendered failure, or `None` if the command succeeded.
    pub error: Option<String>,
}

/// Renders the full issue description: current status, then the last command.
pub fn render_issue_description(view: &MergeTrainView, last: Option<&LastCommand>) -> String {
    let status = format!(
        "## Current Status\n\n{}\n{}",
        view.render_mermaid(),
        view.render_table()
    );

    let Some(last) = last else {
        return status;
    };

    let quoted: Vec<_> = last.note.lines().map(|l| format!("> {}", l)).collect();
    let outcome = match &last.error {
        None => "and all goes well".to_string(),
        Some(err) => format!("but failed to process: {}", err),
    };

    format!(
        "{}\n\n## Last Command\n{}\n\nfrom @{} at `{}` {}",
        status,
        quoted.join("\n"),
        last.author,
        last.created_at,
        outcome
    )
}
