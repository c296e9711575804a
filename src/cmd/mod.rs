//! CLI command implementations.
//!
//! | Module     | Commands handled |
//! |------------|------------------|
//! | `serve`    | `Serve`          |
//! | `run`      | `Run`            |
//! | `projects` | `Projects`       |

pub mod projects;
pub mod run;
pub mod serve;

use std::sync::Arc;

use relay::agent::ClaudeCli;
use relay::config::Config;
use relay::git::GitCli;
use relay::github::GitHubClient;
use relay::session::SessionRegistry;
use relay::workflow::{Collaborators, Orchestrator};

pub use projects::cmd_projects;
pub use run::cmd_run;
pub use serve::cmd_serve;

/// Wire the production collaborators around a shared registry.
pub(crate) fn build_orchestrator(
    config: &Config,
    registry: Arc<SessionRegistry>,
) -> Arc<Orchestrator> {
    let github = Arc::new(GitHubClient::new(config.github_token.clone()));
    let collaborators = Collaborators {
        vcs: Arc::new(GitCli::new()),
        issues: github.clone(),
        pulls: github,
        agent: Arc::new(ClaudeCli::new(config.claude_cmd.clone())),
    };
    Arc::new(Orchestrator::new(
        registry,
        config.projects.clone(),
        collaborators,
        config.workflow.clone(),
    ))
}
