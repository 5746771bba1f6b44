/// Worker configuration
///
/// | Variable | Default |
/// |---|---|
/// | `WORKER_POLL_INTERVAL_SECS` | 1 |
/// | `WORKER_MAX_CONCURRENT_JOBS` | 10 |
/// | `WORKER_BATCH_SIZE` | 5 |
/// | `WORKER_MAX_ATTEMPTS` | 5 |
/// | `WORKER_JOB_TIMEOUT_SECS` | 30 |
/// | `MEILI_HOST` | `http://localhost:7700` |
/// | `MEILI_API_KEY` | unset |
/// | `NOVU_API_URL` | `https://api.novu.co` |
/// | `NOVU_API_KEY` | empty |

use altruvist_shared::integrations::notifications::DEFAULT_API_URL;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Sleep between polls when the outbox is empty
    pub poll_interval_secs: u64,

    /// Jobs running at the same time
    pub max_concurrent_jobs: usize,

    /// Most jobs claimed per poll
    pub batch_size: usize,

    /// Attempts before a job is marked failed for good
    pub max_attempts: i32,

    pub job_timeout_secs: u64,

    pub search_host: String,
    pub search_api_key: Option<String>,

    pub novu_api_url: String,
    pub novu_api_key: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 1,
            max_concurrent_jobs: 10,
            batch_size: 5,
            max_attempts: 5,
            job_timeout_secs: 30,
            search_host: "http://localhost:7700".to_string(),
            search_api_key: None,
            novu_api_url: DEFAULT_API_URL.to_string(),
            novu_api_key: String::new(),
        }
    }
}

fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("{name} is not valid: {e}")),
        Err(_) => Ok(default),
    }
}

impl WorkerConfig {
    /// # Errors
    ///
    /// Fails when a numeric variable does not parse or a limit is zero.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let config = Self {
            poll_interval_secs: parse_var("WORKER_POLL_INTERVAL_SECS", defaults.poll_interval_secs)?,
            max_concurrent_jobs: parse_var("WORKER_MAX_CONCURRENT_JOBS", defaults.max_concurrent_jobs)?,
            batch_size: parse_var("WORKER_BATCH_SIZE", defaults.batch_size)?,
            max_attempts: parse_var("WORKER_MAX_ATTEMPTS", defaults.max_attempts)?,
            job_timeout_secs: parse_var("WORKER_JOB_TIMEOUT_SECS", defaults.job_timeout_secs)?,
            search_host: env::var("MEILI_HOST").unwrap_or(defaults.search_host),
            search_api_key: env::var("MEILI_API_KEY").ok(),
            novu_api_url: env::var("NOVU_API_URL").unwrap_or(defaults.novu_api_url),
            novu_api_key: env::var("NOVU_API_KEY").unwrap_or(defaults.novu_api_key),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.max_concurrent_jobs == 0 || self.batch_size == 0 {
            anyhow::bail!("WORKER_MAX_CONCURRENT_JOBS and WORKER_BATCH_SIZE must be positive");
        }
        if self.max_attempts < 1 {
            anyhow::bail!("WORKER_MAX_ATTEMPTS must be at least 1");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    /// Running jobs untouched for this long belong to a dead worker
    pub fn stale_after(&self) -> Duration {
        self.job_timeout() * 2
    }
}
