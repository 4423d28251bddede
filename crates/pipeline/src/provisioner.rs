//! Repository creation with fall-back to an existing repository.

use std::sync::Arc;

use ghrun_core::error::CoreError;
use ghrun_github::backoff::{retry, BackoffConfig};
use ghrun_github::models::Repository;
use ghrun_github::{GitHubError, GitPlatform};

/// Repository a test run is committed into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedRepository {
    pub owner: String,
    pub name: String,
    pub full_name: String,
    /// Resolved from the platform, never assumed.
    pub default_branch: String,
    /// The name was taken and the existing repository is reused.
    pub already_exists: bool,
}

impl ProvisionedRepository {
    fn from_repository(repo: Repository, already_exists: bool) -> Self {
        Self {
            owner: repo.owner.login,
            name: repo.name,
            full_name: repo.full_name,
            default_branch: repo.default_branch,
            already_exists,
        }
    }
}

pub struct RepositoryProvisioner {
    platform: Arc<dyn GitPlatform>,
    retry: BackoffConfig,
}

impl RepositoryProvisioner {
    pub fn new(platform: Arc<dyn GitPlatform>, retry: BackoffConfig) -> Self {
        Self { platform, retry }
    }

    /// Create `name` (auto-initialised) or, if the name is already taken in
    /// the caller's namespace, adopt the existing repository.
    ///
    /// Creation is retried on transient failures. A retry after a request
    /// that did reach the platform lands in the name-taken branch, so it
    /// never yields two repositories.
    pub async fn provision(
        &self,
        name: &str,
        private: bool,
    ) -> Result<ProvisionedRepository, CoreError> {
        let created = retry(&self.retry, || self.platform.create_repository(name, private)).await;

        match created {
            Ok(repo) => {
                tracing::info!(
                    repo = %repo.full_name,
                    default_branch = %repo.default_branch,
                    private,
                    "Repository created",
                );
                Ok(ProvisionedRepository::from_repository(repo, false))
            }
            Err(err) if is_name_taken(&err) => self.adopt_existing(name).await,
            Err(err) => Err(err.into()),
        }
    }

    async fn adopt_existing(&self, name: &str) -> Result<ProvisionedRepository, CoreError> {
        let owner = retry(&self.retry, || self.platform.namespace()).await?;
        let repo = retry(&self.retry, || self.platform.get_repository(&owner, name)).await?;
        tracing::info!(
            repo = %repo.full_name,
            default_branch = %repo.default_branch,
            "Repository already exists, reusing it",
        );
        Ok(ProvisionedRepository::from_repository(repo, true))
    }
}

fn is_name_taken(err: &GitHubError) -> bool {
    err.status() == Some(422)
        && err
            .body()
            .is_some_and(|body| body.to_ascii_lowercase().contains("already exists"))
}
