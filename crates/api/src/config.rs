use std::str::FromStr;
use std::time::Duration;

use axum::http::HeaderValue;
use ghrun_github::client::DEFAULT_API_URL;
use ghrun_github::GitHubConfig;
use ghrun_pipeline::PipelineConfig;

/// Startup configuration problems. The binary refuses to start on any of
/// these.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Server configuration loaded from environment variables.
///
/// All fields except the GitHub token have defaults suitable for local
/// development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `60`). Run creation waits
    /// for correlation, so this must comfortably exceed the polling budget.
    pub request_timeout_secs: u64,
    /// GitHub connection settings.
    pub github: GitHubConfig,
    /// Commit, dispatch and correlation tunables.
    pub pipeline: PipelineConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default                    |
    /// |--------------------------------|----------------------------|
    /// | `HOST`                         | `0.0.0.0`                  |
    /// | `PORT`                         | `3000`                     |
    /// | `CORS_ORIGINS`                 | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`         | `60`                       |
    /// | `GITHUB_TOKEN`                 | required                   |
    /// | `GITHUB_API_URL`               | `https://api.github.com`   |
    /// | `GITHUB_ORG`                   | unset (token's own user)   |
    /// | `GITHUB_REPO_PRIVATE`          | `true`                     |
    /// | `CORRELATION_INITIAL_DELAY_MS` | `1000`                     |
    /// | `CORRELATION_MAX_ATTEMPTS`     | `5`                        |
    /// | `BLOB_CONCURRENCY`             | `4`                        |
    /// | `CONFLICT_RETRIES`             | `1`                        |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reading variables through
    /// `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = parse_or(&lookup, "PORT", 3000)?;

        let cors_origins: Vec<String> = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        for origin in &cors_origins {
            HeaderValue::from_str(origin).map_err(|e| ConfigError::Invalid {
                var: "CORS_ORIGINS",
                value: origin.clone(),
                reason: e.to_string(),
            })?;
        }

        let request_timeout_secs: u64 = parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 60)?;

        let token = lookup("GITHUB_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::Missing("GITHUB_TOKEN"))?;
        let mut github = GitHubConfig::new(token);
        github.api_url = lookup("GITHUB_API_URL").unwrap_or_else(|| DEFAULT_API_URL.into());
        github.org = lookup("GITHUB_ORG").filter(|org| !org.trim().is_empty());

        let defaults = PipelineConfig::default();
        let initial_delay_ms: u64 = parse_or(
            &lookup,
            "CORRELATION_INITIAL_DELAY_MS",
            defaults.correlation.initial_delay.as_millis() as u64,
        )?;
        let max_attempts: u32 = parse_or(
            &lookup,
            "CORRELATION_MAX_ATTEMPTS",
            defaults.correlation.max_attempts,
        )?;
        if max_attempts == 0 {
            return Err(ConfigError::Invalid {
                var: "CORRELATION_MAX_ATTEMPTS",
                value: "0".into(),
                reason: "at least one attempt is required".into(),
            });
        }
        let blob_concurrency: usize = parse_or(&lookup, "BLOB_CONCURRENCY", defaults.blob_concurrency)?;
        let conflict_retries: u32 = parse_or(&lookup, "CONFLICT_RETRIES", defaults.conflict_retries)?;
        let private_repos: bool = parse_or(&lookup, "GITHUB_REPO_PRIVATE", defaults.private_repos)?;

        let mut correlation = defaults.correlation.clone();
        correlation.initial_delay = Duration::from_millis(initial_delay_ms);
        correlation.max_delay = correlation.max_delay.max(correlation.initial_delay);
        correlation.max_attempts = max_attempts;

        let pipeline = PipelineConfig {
            correlation,
            blob_concurrency: blob_concurrency.max(1),
            conflict_retries,
            private_repos,
            ..defaults
        };

        Ok(Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            github,
            pipeline,
        })
    }
}

fn parse_or<T, F>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}
