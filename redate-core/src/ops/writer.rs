//! Timestamp application with read-back verification.
//!
//! Network filesystems truncate timestamps to whatever the protocol can
//! store, so verification compares requested and read-back values after
//! flooring both to the share's reported time resolution. Silent
//! precision loss is the bug this guards against.

use crate::error::{RedateError, Result};
use crate::share::{FileTimes, ShareClient};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

// Signed FILETIME range: 100 ns ticks since 1601-01-01, i64
const FILETIME_MIN_UNIX_SECS: i64 = -11_644_473_600; // 1601-01-01T00:00:00Z
const FILETIME_MAX_UNIX_SECS: i64 = 910_692_730_085; // 30828-09-14T02:48:05Z

#[derive(Debug, Default)]
pub struct DateWriter;

impl DateWriter {
    pub fn new() -> Self {
        Self
    }

    /// Write the target timestamp. Creation time is only requested when
    /// the client reports the capability; otherwise the share gets the
    /// modification time alone.
    pub async fn apply(
        &self,
        client: &dyn ShareClient,
        path: &Path,
        target: DateTime<Utc>,
    ) -> Result<()> {
        validate_target(target)?;

        let caps = client.capabilities();
        let times = FileTimes {
            modified: target,
            created: caps.creation_time.then_some(target),
        };

        debug!("Setting mtime of {} to {}", path.display(), target);
        client.set_times(path, times).await
    }

    /// Read the timestamp back and compare under the protocol's time
    /// resolution. Returns the value the share actually stored.
    pub async fn verify(
        &self,
        client: &dyn ShareClient,
        path: &Path,
        target: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        let resolution = client.capabilities().time_resolution;
        let actual = client.stat(path).await?.times.modified;

        if truncate_to_resolution(actual, resolution) == truncate_to_resolution(target, resolution)
        {
            Ok(actual)
        } else {
            Err(RedateError::VerificationMismatch {
                path: path.to_path_buf(),
                requested: target,
                actual,
            })
        }
    }
}

pub(crate) fn validate_target(target: DateTime<Utc>) -> Result<()> {
    let secs = target.timestamp();
    if !(FILETIME_MIN_UNIX_SECS..=FILETIME_MAX_UNIX_SECS).contains(&secs) {
        return Err(RedateError::UnsupportedTimestamp(target));
    }
    Ok(())
}

/// Floor a timestamp to a multiple of the protocol resolution
pub(crate) fn truncate_to_resolution(ts: DateTime<Utc>, resolution: Duration) -> DateTime<Utc> {
    let res_micros = resolution.as_micros() as i64;
    if res_micros <= 0 {
        return ts;
    }

    let micros = ts.timestamp_micros();
    let floored = micros.div_euclid(res_micros) * res_micros;
    DateTime::from_timestamp_micros(floored).unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::share::mock::MockShare;
    use chrono::TimeZone;

    #[test]
    fn test_truncate_whole_seconds() {
        let ts = Utc
            .with_ymd_and_hms(2024, 3, 15, 14, 30, 0)
            .unwrap()
            .checked_add_signed(chrono::TimeDelta::milliseconds(750))
            .unwrap();

        let truncated = truncate_to_resolution(ts, Duration::from_secs(1));
        assert_eq!(
            truncated,
            Utc.with_ymd_and_hms(2024, 3, 15, 14, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_truncate_two_second_resolution() {
        let odd = Utc.with_ymd_and_hms(2024, 3, 15, 14, 30, 3).unwrap();
        let truncated = truncate_to_resolution(odd, Duration::from_secs(2));
        assert_eq!(
            truncated,
            Utc.with_ymd_and_hms(2024, 3, 15, 14, 30, 2).unwrap()
        );
    }

    #[test]
    fn test_truncate_noop_below_resolution() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 15, 14, 30, 3).unwrap();
        assert_eq!(truncate_to_resolution(ts, Duration::from_micros(1)), ts);
    }

    #[test]
    fn test_target_window() {
        assert!(validate_target(Utc.with_ymd_and_hms(2024, 3, 15, 14, 30, 0).unwrap()).is_ok());
        assert!(validate_target(Utc.with_ymd_and_hms(1601, 1, 1, 0, 0, 0).unwrap()).is_ok());

        let too_early = Utc.with_ymd_and_hms(1500, 6, 1, 0, 0, 0).unwrap();
        assert!(matches!(
            validate_target(too_early),
            Err(RedateError::UnsupportedTimestamp(_))
        ));
    }

    #[tokio::test]
    async fn test_apply_then_verify_accepts_truncation() {
        // Share stores 2 s granularity; an odd-second target still verifies
        let share = MockShare::new(Duration::from_secs(2));
        share.insert_file("doc.pdf", 1_700_000_000, b"%PDF-1.4".to_vec());

        let writer = DateWriter::new();
        let target = Utc.with_ymd_and_hms(2024, 3, 15, 14, 30, 3).unwrap();

        writer.apply(&share, Path::new("doc.pdf"), target).await.unwrap();
        let stored = writer
            .verify(&share, Path::new("doc.pdf"), target)
            .await
            .unwrap();

        assert_eq!(stored, Utc.with_ymd_and_hms(2024, 3, 15, 14, 30, 2).unwrap());
    }

    #[tokio::test]
    async fn test_verify_rejects_skewed_write() {
        let share = MockShare::new(Duration::from_secs(1));
        share.insert_file("doc.pdf", 1_700_000_000, b"%PDF-1.4".to_vec());
        share.skew_writes(true);

        let writer = DateWriter::new();
        let target = Utc.with_ymd_and_hms(2024, 3, 15, 14, 30, 0).unwrap();

        writer.apply(&share, Path::new("doc.pdf"), target).await.unwrap();
        let err = writer
            .verify(&share, Path::new("doc.pdf"), target)
            .await
            .unwrap_err();

        assert!(matches!(err, RedateError::VerificationMismatch { .. }));
    }

    #[tokio::test]
    async fn test_apply_rejects_out_of_window_target() {
        let share = MockShare::new(Duration::from_secs(1));
        share.insert_file("doc.pdf", 1_700_000_000, b"%PDF-1.4".to_vec());

        let writer = DateWriter::new();
        let target = Utc.with_ymd_and_hms(1500, 1, 1, 0, 0, 0).unwrap();

        let err = writer
            .apply(&share, Path::new("doc.pdf"), target)
            .await
            .unwrap_err();
        assert!(matches!(err, RedateError::UnsupportedTimestamp(_)));
        assert_eq!(share.call_count("set_times"), 0);
    }
}
