use crate::settings::error::SettingsError;
use chrono::{DateTime, TimeDelta, Utc};
use engine_core::retry::RetryPolicy;
use std::{num::NonZeroUsize, time::Duration};

pub const DEFAULT_CHUNK_SIZE: usize = 10;
pub const DEFAULT_PARTITION_COUNT: usize = 3;
pub const DEFAULT_POOL_SIZE: usize = 5;
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Immutable, validated configuration of a batch run.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSettings {
    /// Items per committed chunk
    pub chunk_size: NonZeroUsize,
    /// Items per page fetched by paging readers
    pub page_size: NonZeroUsize,
    /// Number of key-range partitions of a partitioned step
    pub partition_count: NonZeroUsize,
    /// Concurrent chunks inside one chunk step
    pub chunk_workers: NonZeroUsize,
    /// Concurrent partitions of a partitioned step
    pub partition_workers: NonZeroUsize,
    /// Records last updated more recently than this are skipped by readers
    pub stale_after: Option<Duration>,
    /// Upper bound on waiting for in-flight work when a pool shuts down
    pub shutdown_timeout: Duration,
    /// Retry policy for transient read/write failures
    pub retry: RetryPolicy,
}

impl Default for ValidatedSettings {
    fn default() -> Self {
        let pool = nz(DEFAULT_POOL_SIZE);
        Self {
            chunk_size: nz(DEFAULT_CHUNK_SIZE),
            page_size: nz(DEFAULT_CHUNK_SIZE),
            partition_count: nz(DEFAULT_PARTITION_COUNT),
            chunk_workers: pool,
            partition_workers: pool,
            stale_after: None,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

fn nz(value: usize) -> NonZeroUsize {
    NonZeroUsize::new(value).unwrap_or(NonZeroUsize::MIN)
}

impl ValidatedSettings {
    pub fn builder() -> ValidatedSettingsBuilder {
        ValidatedSettingsBuilder::default()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size.get()
    }

    pub fn page_size(&self) -> usize {
        self.page_size.get()
    }

    pub fn partition_count(&self) -> usize {
        self.partition_count.get()
    }

    pub fn chunk_workers(&self) -> usize {
        self.chunk_workers.get()
    }

    pub fn partition_workers(&self) -> usize {
        self.partition_workers.get()
    }

    pub fn stale_after(&self) -> Option<Duration> {
        self.stale_after
    }

    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Cut-off instant for the stale filter: records last updated strictly
    /// before it are eligible.
    pub fn stale_threshold(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let after = TimeDelta::from_std(self.stale_after?).ok()?;
        now.checked_sub_signed(after)
    }
}

/// Programmatic construction of [`ValidatedSettings`]; unset fields take the
/// defaults, zero sizes are rejected by `build`.
#[derive(Debug, Default)]
pub struct ValidatedSettingsBuilder {
    pub chunk_size: Option<usize>,
    pub page_size: Option<usize>,
    pub partition_count: Option<usize>,
    pub chunk_workers: Option<usize>,
    pub partition_workers: Option<usize>,
    pub stale_after: Option<Duration>,
    pub shutdown_timeout: Option<Duration>,
    pub retry: Option<RetryPolicy>,
}

impl ValidatedSettingsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn partition_count(mut self, partition_count: usize) -> Self {
        self.partition_count = Some(partition_count);
        self
    }

    pub fn chunk_workers(mut self, workers: usize) -> Self {
        self.chunk_workers = Some(workers);
        self
    }

    pub fn partition_workers(mut self, workers: usize) -> Self {
        self.partition_workers = Some(workers);
        self
    }

    pub fn stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = Some(stale_after);
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = Some(timeout);
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn build(self) -> Result<ValidatedSettings, SettingsError> {
        let chunk_size = self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);
        let chunk_size =
            NonZeroUsize::new(chunk_size).ok_or(SettingsError::InvalidChunkSize(0))?;
        let page_size = match self.page_size {
            Some(size) => NonZeroUsize::new(size).ok_or(SettingsError::InvalidPageSize(0))?,
            None => chunk_size,
        };
        let partition_count = NonZeroUsize::new(
            self.partition_count.unwrap_or(DEFAULT_PARTITION_COUNT),
        )
        .ok_or(SettingsError::InvalidPartitionCount(0))?;
        let chunk_workers = pool_size("chunk", self.chunk_workers)?;
        let partition_workers = pool_size("partition", self.partition_workers)?;

        Ok(ValidatedSettings {
            chunk_size,
            page_size,
            partition_count,
            chunk_workers,
            partition_workers,
            stale_after: self.stale_after,
            shutdown_timeout: self.shutdown_timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT),
            retry: self.retry.unwrap_or_default(),
        })
    }
}

fn pool_size(pool: &str, value: Option<usize>) -> Result<NonZeroUsize, SettingsError> {
    NonZeroUsize::new(value.unwrap_or(DEFAULT_POOL_SIZE)).ok_or(SettingsError::InvalidPoolSize {
        pool: pool.to_string(),
        value: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = ValidatedSettings::default();
        assert_eq!(settings.chunk_size(), 10);
        assert_eq!(settings.page_size(), 10);
        assert_eq!(settings.partition_count(), 3);
        assert_eq!(settings.chunk_workers(), 5);
        assert_eq!(settings.partition_workers(), 5);
        assert!(settings.stale_after().is_none());
        assert_eq!(settings.shutdown_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_builder_matches_defaults() {
        assert_eq!(
            ValidatedSettings::builder().build().unwrap(),
            ValidatedSettings::default()
        );
    }

    #[test]
    fn test_page_size_follows_chunk_size() {
        let settings = ValidatedSettings::builder().chunk_size(50).build().unwrap();
        assert_eq!(settings.page_size(), 50);

        let settings = ValidatedSettings::builder()
            .chunk_size(50)
            .page_size(200)
            .build()
            .unwrap();
        assert_eq!(settings.page_size(), 200);
    }

    #[test]
    fn test_zero_sizes_rejected() {
        assert!(matches!(
            ValidatedSettings::builder().chunk_size(0).build(),
            Err(SettingsError::InvalidChunkSize(0))
        ));
        assert!(matches!(
            ValidatedSettings::builder().partition_count(0).build(),
            Err(SettingsError::InvalidPartitionCount(0))
        ));
        assert!(matches!(
            ValidatedSettings::builder().partition_workers(0).build(),
            Err(SettingsError::InvalidPoolSize { .. })
        ));
    }

    #[test]
    fn test_stale_threshold() {
        let now = Utc::now();
        let settings = ValidatedSettings::builder()
            .stale_after(DEFAULT_STALE_AFTER)
            .build()
            .unwrap();
        assert_eq!(
            settings.stale_threshold(now),
            Some(now - TimeDelta::days(1))
        );
        assert_eq!(ValidatedSettings::default().stale_threshold(now), None);
    }
}
