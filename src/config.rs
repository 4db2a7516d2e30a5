//! Service configuration, read once from `LM_*` environment variables at startup.

use std::path::PathBuf;

use thiserror::Error;

use crate::git::CommitIdentity;
use crate::types::DEFAULT_BRANCH_NAME_PREFIX;

pub const DEFAULT_GITLAB_URL: &str = "https://gitlab.com";
pub const DEFAULT_REPO_DIR: &str = "/var/lib/light-merge/repos";
pub const DEFAULT_LISTEN_PORT: u16 = 8080;
pub const DEFAULT_BASE_REVISION: &str = "origin/HEAD";
pub const DEFAULT_REMOTE: &str = "origin";
pub const DEFAULT_COMMIT_NAME: &str = "light-merge";
pub const DEFAULT_COMMIT_EMAIL: &str = "operator@light-merge.localhost";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    /// Base URL of the GitLab instance, without `/api/v4`.
    pub gitlab_url: String,
    pub gitlab_token: String,

    /// Working copies live at `<repo_dir>/<path_with_namespace>`.
    pub repo_dir: PathBuf,

    pub branch_name_prefix: String,
    pub listen_port: u16,

    /// Expected `X-Gitlab-Token`. `None` accepts every delivery.
    pub webhook_secret: Option<String>,

    /// Revision each integration commit is built on.
    pub base_revision: String,
    pub remote: String,
    pub commit_identity: CommitIdentity,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("gitlab_url", &self.gitlab_url)
            .field("repo_dir", &self.repo_dir)
            .field("branch_name_prefix", &self.branch_name_prefix)
            .field("listen_port", &self.listen_port)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "***"))
            .field("base_revision", &self.base_revision)
            .field("remote", &self.remote)
            .field("commit_identity", &self.commit_identity)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let or_default = |name: &str, default: &str| get(name).unwrap_or_else(|| default.to_string());

        let gitlab_token = get("LM_GITLAB_TOKEN").ok_or(ConfigError::Missing("LM_GITLAB_TOKEN"))?;

        let gitlab_url = or_default("LM_GITLAB_URL", DEFAULT_GITLAB_URL);
        let parsed = url::Url::parse(&gitlab_url).map_err(|_| ConfigError::Invalid {
            name: "LM_GITLAB_URL",
            value: gitlab_url.clone(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                name: "LM_GITLAB_URL",
                value: gitlab_url,
            });
        }

        let listen_port = match get("LM_LISTEN_PORT") {
            None => DEFAULT_LISTEN_PORT,
            Some(value) => match value.trim().parse::<u16>() {
                Ok(port) if port > 0 => port,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "LM_LISTEN_PORT",
                        value,
                    });
                }
            },
        };

        let mut commit_identity = CommitIdentity::new(
            or_default("LM_COMMIT_NAME", DEFAULT_COMMIT_NAME),
            or_default("LM_COMMIT_EMAIL", DEFAULT_COMMIT_EMAIL),
        );
        commit_identity.signing_key = get("LM_COMMIT_SIGNING_KEY");

        Ok(Config {
            gitlab_url: gitlab_url.trim_end_matches('/').to_string(),
            gitlab_token,
            repo_dir: PathBuf::from(or_default("LM_REPO_DIR", DEFAULT_REPO_DIR)),
            branch_name_prefix: or_default("LM_BRANCH_NAME_PREFIX", DEFAULT_BRANCH_NAME_PREFIX),
            listen_port,
            webhook_secret: get("LM_WEBHOOK_SECRET"),
            base_revision: or_default("LM_BASE_REVISION", DEFAULT_BASE_REVISION),
            remote: or_default("LM_REMOTE", DEFAULT_REMOTE),
            commit_identity,
        })
    }
}
