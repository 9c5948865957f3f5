use crate::settings::{
    BatchSettings,
    error::SettingsError,
    validated::{DEFAULT_STALE_AFTER, ValidatedSettings, ValidatedSettingsBuilder},
};
use engine_core::retry::RetryPolicy;
use std::time::Duration;
use tracing::{info, warn};

const LARGE_CHUNK_SIZE: i64 = 100_000;

/// Turns raw [`BatchSettings`] into [`ValidatedSettings`], reporting every
/// invalid field at once.
#[derive(Debug, Default)]
pub struct SettingsValidator {
    errors: Vec<SettingsError>,
}

impl SettingsValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(mut self, settings: &BatchSettings) -> Result<ValidatedSettings, SettingsError> {
        let mut builder = ValidatedSettingsBuilder::new();

        if let Some(size) = self.positive(settings.chunk_size, SettingsError::InvalidChunkSize) {
            if size as i64 > LARGE_CHUNK_SIZE {
                warn!("Chunk size {size} is very large, may cause memory issues");
            }
            builder = builder.chunk_size(size);
        }
        if let Some(size) = self.positive(settings.page_size, SettingsError::InvalidPageSize) {
            builder = builder.page_size(size);
        }
        if let Some(count) =
            self.positive(settings.partition_count, SettingsError::InvalidPartitionCount)
        {
            builder = builder.partition_count(count);
        }
        if let Some(n) = self.positive(settings.chunk_workers, |value| {
            SettingsError::InvalidPoolSize {
                pool: "chunk".into(),
                value,
            }
        }) {
            builder = builder.chunk_workers(n);
        }
        if let Some(n) = self.positive(settings.partition_workers, |value| {
            SettingsError::InvalidPoolSize {
                pool: "partition".into(),
                value,
            }
        }) {
            builder = builder.partition_workers(n);
        }
        if let Some(stale) = self.stale_after(settings) {
            builder = builder.stale_after(stale);
        }
        if let Some(secs) = self.positive(settings.shutdown_timeout_secs, |value| {
            SettingsError::InvalidDuration {
                field: "shutdown_timeout_secs".into(),
                value,
            }
        }) {
            builder = builder.shutdown_timeout(Duration::from_secs(secs as u64));
        }
        if let Some(retry) = self.retry(settings) {
            builder = builder.retry(retry);
        }

        match self.errors.len() {
            0 => {}
            1 => return Err(self.errors.remove(0)),
            _ => {
                return Err(SettingsError::ValidationFailed(
                    self.errors.iter().map(|e| e.to_string()).collect(),
                ));
            }
        }

        let validated = builder.build()?;
        info!(
            chunk_size = validated.chunk_size(),
            page_size = validated.page_size(),
            partition_count = validated.partition_count(),
            chunk_workers = validated.chunk_workers(),
            partition_workers = validated.partition_workers(),
            stale_after_secs = validated.stale_after().map(|d| d.as_secs()),
            "Settings validated"
        );
        Ok(validated)
    }

    fn positive(
        &mut self,
        value: Option<i64>,
        err: impl FnOnce(i64) -> SettingsError,
    ) -> Option<usize> {
        let value = value?;
        match usize::try_from(value) {
            Ok(v) if v > 0 => Some(v),
            _ => {
                self.errors.push(err(value));
                None
            }
        }
    }

    fn stale_after(&mut self, settings: &BatchSettings) -> Option<Duration> {
        match (settings.stale_after_secs, settings.stale_after_days) {
            (Some(_), Some(_)) => {
                self.errors.push(SettingsError::Conflict(
                    "stale_after_secs and stale_after_days are mutually exclusive".into(),
                ));
                None
            }
            (Some(secs), None) => self
                .positive(Some(secs), |value| SettingsError::InvalidDuration {
                    field: "stale_after_secs".into(),
                    value,
                })
                .map(|s| Duration::from_secs(s as u64)),
            (None, Some(days)) => self
                .positive(Some(days), |value| SettingsError::InvalidDuration {
                    field: "stale_after_days".into(),
                    value,
                })
                .map(|d| DEFAULT_STALE_AFTER.saturating_mul(d.min(u32::MAX as usize) as u32)),
            (None, None) => None,
        }
    }

    fn retry(&mut self, settings: &BatchSettings) -> Option<RetryPolicy> {
        let retry = settings.retry.as_ref()?;
        let defaults = RetryPolicy::default();

        let max_attempts = match retry.max_attempts {
            Some(n) if n >= 1 => n as usize,
            Some(n) => {
                self.errors.push(SettingsError::InvalidRetry(format!(
                    "max_attempts must be at least 1, got {n}"
                )));
                return None;
            }
            None => defaults.max_attempts,
        };
        let base = self.millis("retry.base_delay_ms", retry.base_delay_ms)?;
        let max = self.millis("retry.max_delay_ms", retry.max_delay_ms)?;

        Some(RetryPolicy::new(
            max_attempts,
            base.unwrap_or(defaults.base_delay),
            max.unwrap_or(defaults.max_delay),
        ))
    }

    /// `Some(None)` when unset, `None` when invalid.
    fn millis(&mut self, field: &str, value: Option<i64>) -> Option<Option<Duration>> {
        match value {
            None => Some(None),
            Some(ms) if ms >= 0 => Some(Some(Duration::from_millis(ms as u64))),
            Some(ms) => {
                self.errors.push(SettingsError::InvalidDuration {
                    field: field.to_string(),
                    value: ms,
                });
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::RetrySettings;

    #[test]
    fn empty_settings_yield_defaults() {
        let validated = BatchSettings::default().validate().unwrap();
        assert_eq!(validated, ValidatedSettings::default());
    }

    #[test]
    fn non_positive_chunk_size_is_rejected() {
        for bad in [0, -1] {
            let settings = BatchSettings {
                chunk_size: Some(bad),
                ..Default::default()
            };
            assert!(matches!(
                settings.validate(),
                Err(SettingsError::InvalidChunkSize(v)) if v == bad
            ));
        }
    }

    #[test]
    fn non_positive_partition_count_is_rejected() {
        let settings = BatchSettings {
            partition_count: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::InvalidPartitionCount(0))
        ));
    }

    #[test]
    fn all_errors_are_reported_together() {
        let settings = BatchSettings {
            chunk_size: Some(0),
            partition_workers: Some(-2),
            ..Default::default()
        };
        match settings.validate() {
            Err(SettingsError::ValidationFailed(errors)) => {
                assert_eq!(errors.len(), 2);
                assert!(errors[0].contains("chunk size"));
                assert!(errors[1].contains("partition pool"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn stale_shorthands_conflict() {
        let settings = BatchSettings {
            stale_after_secs: Some(60),
            stale_after_days: Some(1),
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::Conflict(_))
        ));
    }

    #[test]
    fn retry_block_overrides_policy() {
        let settings = BatchSettings {
            retry: Some(RetrySettings {
                max_attempts: Some(4),
                base_delay_ms: Some(10),
                max_delay_ms: None,
            }),
            ..Default::default()
        };
        let validated = settings.validate().unwrap();
        assert_eq!(validated.retry().max_attempts, 4);
        assert_eq!(validated.retry().base_delay, Duration::from_millis(10));
        assert_eq!(validated.retry().max_delay, RetryPolicy::default().max_delay);

        let bad = BatchSettings {
            retry: Some(RetrySettings {
                max_attempts: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(matches!(bad.validate(), Err(SettingsError::InvalidRetry(_))));
    }
}
