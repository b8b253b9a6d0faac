//! Store connector
//!
//! Opens the RocksDB store, bootstraps the schema and, when asked, keeps
//! retrying with capped exponential backoff until the store can be opened
//! (typically while another process still holds its lock).

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use rocksdb::{ColumnFamilyDescriptor, Options, DB};

use crate::error::{GraphError, Result};
use crate::store::{Connection, COLUMN_FAMILIES};

/// Where and how to open the backing store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub max_background_jobs: i32,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_background_jobs: 2,
        }
    }
}

/// Bounded exponential backoff for the initial connect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Wait after failed attempt `attempt` (1-based): the initial delay
    /// doubled per previous attempt, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

pub(crate) fn open_db(config: &StoreConfig) -> std::result::Result<DB, rocksdb::Error> {
    let mut opts = Options::default();
    opts.create_if_missing(true);
    opts.create_missing_column_families(true);
    opts.set_max_background_jobs(config.max_background_jobs);
    opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

    let descriptors = COLUMN_FAMILIES
        .iter()
        .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
        .collect::<Vec<_>>();

    DB::open_cf_descriptors(&opts, &config.path, descriptors)
}

fn establish(db: DB, config: &StoreConfig) -> Result<Connection> {
    let connection = Connection::new(db, config.path.clone());
    connection.bootstrap()?;
    log::info!("Graph store opened at: {}", config.path.display());
    Ok(connection)
}

/// Open the store once and bootstrap its schema
pub fn connect(config: &StoreConfig) -> Result<Connection> {
    if let Err(e) = std::fs::create_dir_all(&config.path) {
        return Err(GraphError::Connection {
            attempts: 1,
            last_error: e.to_string(),
        });
    }
    let db = open_db(config).map_err(|e| GraphError::Connection {
        attempts: 1,
        last_error: e.to_string(),
    })?;
    establish(db, config)
}

/// Open the store, retrying per `policy` until it succeeds, the attempts run
/// out, or `cancel` resolves.
///
/// Only opening is retried; a schema bootstrap failure returns immediately.
/// Each attempt runs on the blocking pool so the runtime keeps serving, and
/// `cancel` is honoured while an attempt is still in flight.
pub async fn connect_with_retry<F>(
    config: &StoreConfig,
    policy: RetryPolicy,
    cancel: F,
) -> Result<Connection>
where
    F: Future<Output = ()>,
{
    tokio::pin!(cancel);

    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        let attempt_config = config.clone();
        let opening = tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&attempt_config.path)
                .map_err(|e| e.to_string())
                .and_then(|_| open_db(&attempt_config).map_err(|e| e.to_string()))
        });

        // An open still running when cancel fires finishes on the blocking
        // pool and its handle is dropped there.
        let opened = tokio::select! {
            biased;
            _ = &mut cancel => {
                log::info!("Graph store connect cancelled");
                return Err(GraphError::Cancelled);
            }
            joined = opening => joined.map_err(|e| e.to_string()).and_then(|r| r),
        };

        match opened {
            Ok(db) => {
                let config = config.clone();
                return tokio::task::spawn_blocking(move || establish(db, &config))
                    .await
                    .map_err(|e| GraphError::Other(e.to_string()))?;
            }
            Err(e) => {
                log::warn!(
                    "Graph store open failed (attempt {}/{}): {}",
                    attempt,
                    max_attempts,
                    e
                );
                last_error = e;
            }
        }

        if attempt == max_attempts {
            break;
        }

        let delay = policy.delay_for_attempt(attempt);
        log::debug!("Retrying graph store open in {:?}", delay);
        tokio::select! {
            biased;
            _ = &mut cancel => {
                log::info!("Graph store connect cancelled");
                return Err(GraphError::Cancelled);
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }

    Err(GraphError::Connection {
        attempts: max_attempts,
        last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CF_META;
    use tempfile::TempDir;

    fn quick_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 30);
        assert_eq!(policy.initial_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
    }

    #[test]
    fn test_delay_doubles_until_capped() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (1..=6)
            .map(|n| policy.delay_for_attempt(n).as_secs())
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 10, 10]);
    }

    #[test]
    fn test_delay_does_not_overflow() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn test_connect_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::new(dir.path());

        let first = connect(&config).unwrap();
        drop(first);
        let second = connect(&config).unwrap();
        assert_eq!(second.stats().unwrap().total_nodes, 0);
    }

    #[test]
    fn test_newer_schema_is_fatal() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::new(dir.path());
        {
            let db = open_db(&config).unwrap();
            let meta = db.cf_handle(CF_META).unwrap();
            db.put_cf(&meta, b"schema_version", b"99").unwrap();
        }

        let err = connect(&config).err().unwrap();
        assert!(matches!(err, GraphError::SchemaBootstrap(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_reports_attempts() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::new(dir.path());
        let _holder = connect(&config).unwrap();

        let err = connect_with_retry(&config, quick_policy(3), std::future::pending())
            .await
            .err()
            .unwrap();

        match err {
            GraphError::Connection {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 3);
                assert!(!last_error.is_empty());
            }
            other => panic!("expected connection error, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_aborts_wait() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::new(dir.path());
        let _holder = connect(&config).unwrap();

        let err = connect_with_retry(&config, quick_policy(30), async {})
            .await
            .err()
            .unwrap();
        assert!(matches!(err, GraphError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_fires_between_blocking_attempts() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::new(dir.path());
        let _holder = connect(&config).unwrap();

        let started = tokio::time::Instant::now();
        let cancel = tokio::time::sleep(Duration::from_millis(2500));
        let err = connect_with_retry(&config, quick_policy(30), cancel)
            .await
            .err()
            .unwrap();

        assert!(matches!(err, GraphError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_once_lock_is_released() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::new(dir.path());
        let holder = connect(&config).unwrap();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            drop(holder);
        });

        let conn = connect_with_retry(&config, quick_policy(5), std::future::pending())
            .await
            .unwrap();
        assert_eq!(conn.path(), dir.path());
    }
}
