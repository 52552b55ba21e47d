//! Reproducible timestamps for archive entries.
//!
//! See <https://reproducible-builds.org/specs/source-date-epoch/> for the environment
//! variable contract.

use std::env;
use std::path::Path;
use std::time::UNIX_EPOCH;

use jiff::tz::TimeZone;
use jiff::Timestamp;

use crate::Error;

/// 1980-01-01T00:00:00Z, the earliest timestamp a zip entry can carry.
pub(crate) const MIN_SOURCE_DATE_EPOCH: i64 = 315_532_800;
/// 2170-12-31T23:59:59Z.
pub(crate) const MAX_SOURCE_DATE_EPOCH: i64 = 6_342_019_199;

/// 2107-12-31T23:59:58Z, the latest timestamp the MS-DOS format in zip entries can carry.
const MAX_ZIP_TIMESTAMP: i64 = 4_354_819_198;

/// The single modification time stamped on every entry of an archive.
///
/// Resolved once per build: `SOURCE_DATE_EPOCH` wins, otherwise the `pyproject.toml`
/// modification time clamped to the representable range. Two builds over identical inputs
/// with identical `SOURCE_DATE_EPOCH` produce byte-identical archives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveTimestamp {
    seconds: i64,
}

impl ArchiveTimestamp {
    /// A fixed timestamp, unclamped. Mostly useful for tests.
    pub fn from_seconds(seconds: i64) -> Self {
        Self { seconds }
    }

    /// Resolve the timestamp from `SOURCE_DATE_EPOCH`, falling back to the project
    /// file's modification time.
    pub fn resolve(source_tree: &Path) -> Result<Self, Error> {
        match env::var("SOURCE_DATE_EPOCH") {
            Ok(value) => Self::from_env_value(&value),
            Err(env::VarError::NotPresent) => Self::from_project_mtime(source_tree),
            Err(env::VarError::NotUnicode(value)) => Err(Error::InvalidSourceDateEpoch(
                value.to_string_lossy().into_owned(),
            )),
        }
    }

    /// Parse and validate a `SOURCE_DATE_EPOCH` value.
    ///
    /// The value must be an integer with no fractional component and must fall within
    /// [`MIN_SOURCE_DATE_EPOCH`, `MAX_SOURCE_DATE_EPOCH`].
    pub(crate) fn from_env_value(value: &str) -> Result<Self, Error> {
        let seconds: i64 = value
            .parse()
            .map_err(|_| Error::InvalidSourceDateEpoch(value.to_string()))?;
        if !(MIN_SOURCE_DATE_EPOCH..=MAX_SOURCE_DATE_EPOCH).contains(&seconds) {
            return Err(Error::SourceDateEpochRange(seconds));
        }
        Ok(Self { seconds })
    }

    /// The `pyproject.toml` modification time, clamped to the valid range.
    fn from_project_mtime(source_tree: &Path) -> Result<Self, Error> {
        let modified = fs_err::metadata(source_tree.join("pyproject.toml"))?.modified()?;
        let seconds = match modified.duration_since(UNIX_EPOCH) {
            Ok(duration) => i64::try_from(duration.as_secs()).unwrap_or(MAX_SOURCE_DATE_EPOCH),
            // Modification times before the epoch clamp to the minimum.
            Err(_) => MIN_SOURCE_DATE_EPOCH,
        };
        Ok(Self {
            seconds: seconds.clamp(MIN_SOURCE_DATE_EPOCH, MAX_SOURCE_DATE_EPOCH),
        })
    }

    /// The mtime for a tar header.
    pub(crate) fn tar_mtime(self) -> u64 {
        u64::try_from(self.seconds).unwrap_or_default()
    }

    /// The last-modified time for a zip entry, in the MS-DOS representation.
    pub(crate) fn zip_datetime(self) -> zip::DateTime {
        let seconds = self.seconds.clamp(MIN_SOURCE_DATE_EPOCH, MAX_ZIP_TIMESTAMP);
        let Ok(timestamp) = Timestamp::from_second(seconds) else {
            return zip::DateTime::default();
        };
        let civil = timestamp.to_zoned(TimeZone::UTC);
        u16::try_from(civil.year())
            .ok()
            .and_then(|year| {
                zip::DateTime::from_date_and_time(
                    year,
                    u8::try_from(civil.month()).ok()?,
                    u8::try_from(civil.day()).ok()?,
                    u8::try_from(civil.hour()).ok()?,
                    u8::try_from(civil.minute()).ok()?,
                    u8::try_from(civil.second()).ok()?,
                )
                .ok()
            })
            .unwrap_or_default()
    }
}
