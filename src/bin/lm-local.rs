use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use light_merge::config::{DEFAULT_COMMIT_EMAIL, DEFAULT_COMMIT_NAME, DEFAULT_REMOTE};
use light_merge::git::{CommitIdentity, Repo};
use light_merge::operator::{MergeTrainOperator, OperatorError, OperatorSettings};
use light_merge::types::{DEFAULT_BRANCH_NAME_PREFIX, IssueIid, ProjectId};

/// Issue IID of the local train, relative to the repository root.
const ISSUE_IID_FILE: &str = ".git/LM_ISSUE_IID";

/// Maintain a merge train in a local repository
///
/// Runs the same operations as the light-merge bot without GitLab. The train
/// branch is `<prefix><iid>`, where the IID is read from .git/LM_ISSUE_IID.
#[derive(Parser)]
#[command(name = "lm-local")]
#[command(version, about)]
struct Cli {
    /// Repository to operate on
    #[arg(long, default_value = ".")]
    repo: PathBuf,

    /// Revision integration commits are built on
    #[arg(long, default_value = "main")]
    base: String,

    /// Prefix of the train branch name
    #[arg(long, default_value = DEFAULT_BRANCH_NAME_PREFIX)]
    prefix: String,

    /// Remote to push the train branch to after a change
    #[arg(long)]
    push: Option<String>,

    #[arg(long, env = "LM_COMMIT_NAME", default_value = DEFAULT_COMMIT_NAME)]
    commit_name: String,

    #[arg(long, env = "LM_COMMIT_EMAIL", default_value = DEFAULT_COMMIT_EMAIL)]
    commit_email: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add or update a branch in the merge train
    Add { branch: String },

    /// Remove a branch from the merge train
    Remove { branch: String },

    /// Show the train's members and integration commit
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "light_merge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let identity = CommitIdentity::new(&cli.commit_name, &cli.commit_email);
    let repo = Repo::open(&cli.repo, identity)
        .with_context(|| format!("{} is not a git repository", cli.repo.display()))?;
    let issue_iid = issue_iid(repo.path())?;

    let settings = OperatorSettings {
        project_id: ProjectId(0),
        issue_iid,
        branch_prefix: cli.prefix,
        base_revision: cli.base,
        remote: cli.push.clone().unwrap_or_else(|| DEFAULT_REMOTE.to_string()),
    };
    let mut operator =
        MergeTrainOperator::load(repo, settings).context("failed to load merge train")?;

    match cli.command {
        Commands::Add { branch } => {
            let git_ref = operator
                .repo()
                .resolve_ref(&branch)
                .with_context(|| format!("cannot resolve {}", branch))?;
            let result = if cli.push.is_some() {
                operator.add_and_push(&git_ref)
            } else {
                operator.add(&git_ref)
            };
            let head = result.map_err(|e| failure("add", &branch, e))?;
            println!(
                "Added {} at {}; {} is now {}",
                branch,
                git_ref.commit.short(),
                operator.settings().branch_name(),
                head.commit
            );
        }
        Commands::Remove { branch } => {
            let result = if cli.push.is_some() {
                operator.remove_and_push(&branch)
            } else {
                operator.remove(&branch)
            };
            match result.map_err(|e| failure("remove", &branch, e))? {
                Some(head) => println!(
                    "Removed {}; {} is now {}",
                    branch,
                    operator.settings().branch_name(),
                    head.commit
                ),
                None => println!("Removed {}; the merge train is now empty", branch),
            }
        }
        Commands::Status => print_status(&operator),
    }

    Ok(())
}

fn print_status(operator: &MergeTrainOperator) {
    let branch = operator.settings().branch_name();
    match operator.head() {
        Some(head) => println!("{} at {}", branch, head.commit),
        None => println!("{} (empty)", branch),
    }
    for member in operator.members() {
        println!("  {} {}", member.merged_commit.short(), member.branch);
    }
}

fn failure(action: &str, branch: &str, e: OperatorError) -> anyhow::Error {
    anyhow::anyhow!("failed to {} {}:\n\n{}", action, branch, e.to_markdown())
}

/// Reads the train's issue IID, creating the file with `1` on first use.
fn issue_iid(repo: &Path) -> Result<IssueIid> {
    let path = repo.join(ISSUE_IID_FILE);
    match std::fs::read_to_string(&path) {
        Ok(contents) => {
            let trimmed = contents.trim();
            match trimmed.parse::<u64>() {
                Ok(iid) => Ok(IssueIid(iid)),
                Err(_) => bail!("invalid issue IID {:?} in {}", trimmed, path.display()),
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            std::fs::write(&path, "1")
                .with_context(|| format!("failed to write {}", path.display()))?;
            Ok(IssueIid(1))
        }
        Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
    }
}
