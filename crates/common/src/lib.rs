pub mod file_utils;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identity of a stored case, assigned at import time and never reused
pub type CaseId = Uuid;

/// Compression wrapper of an uploaded case file, taken from its last extension
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    #[default]
    None,
    Gz,
    Bz2,
    Xz,
    Zst,
}

impl CompressionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionKind::None => "none",
            CompressionKind::Gz => "gz",
            CompressionKind::Bz2 => "bz2",
            CompressionKind::Xz => "xz",
            CompressionKind::Zst => "zst",
        }
    }

    /// Map a lowercase file extension (without the dot) to a compression kind
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "gz" => Some(CompressionKind::Gz),
            "bz2" => Some(CompressionKind::Bz2),
            "xz" => Some(CompressionKind::Xz),
            "zst" => Some(CompressionKind::Zst),
            _ => None,
        }
    }
}

impl fmt::Display for CompressionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompressionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(CompressionKind::None),
            other => {
                CompressionKind::from_extension(other).ok_or_else(|| format!("unknown compression kind: {other}"))
            }
        }
    }
}

/// Archive container of an uploaded case file
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveKind {
    #[default]
    None,
    Zip,
    Tar,
}

impl ArchiveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveKind::None => "none",
            ArchiveKind::Zip => "zip",
            ArchiveKind::Tar => "tar",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "zip" => Some(ArchiveKind::Zip),
            "tar" => Some(ArchiveKind::Tar),
            _ => None,
        }
    }
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArchiveKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ArchiveKind::None),
            other => ArchiveKind::from_extension(other).ok_or_else(|| format!("unknown archive kind: {other}")),
        }
    }
}

/// Metadata record of a case, persisted by the metadata store
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CaseRecord {
    pub id: CaseId,
    pub original_filename: String,
    pub format: String,
    pub compression: CompressionKind,
    pub archive: ArchiveKind,
    pub indexed: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CaseRecord {
    /// Whether the case expired at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Event published once per successful import or duplicate
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CaseEvent {
    pub case_id: CaseId,
    pub original_filename: String,
    pub format: String,
}

impl From<&CaseRecord> for CaseEvent {
    fn from(record: &CaseRecord) -> Self {
        Self {
            case_id: record.id,
            original_filename: record.original_filename.clone(),
            format: record.format.clone(),
        }
    }
}

/// Caller options for import and duplicate
#[derive(Clone, Debug, Default)]
pub struct ImportOptions {
    /// Lifetime of the case; `None` keeps it until explicitly deleted
    pub expire_after: Option<chrono::Duration>,
    /// Whether the case should be picked up by the search indexer
    pub indexed: bool,
}

impl ImportOptions {
    /// Expiration instant for a case created at `now`
    pub fn expires_at(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, ExpirationOutOfRange> {
        self.expire_after
            .map(|after| now.checked_add_signed(after).ok_or(ExpirationOutOfRange))
            .transpose()
    }
}

/// An expiration too far away to be represented as a timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpirationOutOfRange;

impl fmt::Display for ExpirationOutOfRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expiration is out of the representable time range")
    }
}

impl std::error::Error for ExpirationOutOfRange {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_string_forms() {
        assert_eq!("zst".parse::<CompressionKind>(), Ok(CompressionKind::Zst));
        assert_eq!("none".parse::<ArchiveKind>(), Ok(ArchiveKind::None));
        assert!("rar".parse::<ArchiveKind>().is_err());
        assert_eq!(CompressionKind::Bz2.to_string(), "bz2");
    }

    #[test]
    fn test_record_serializes_kinds_lowercase() {
        let record = CaseRecord {
            id: Uuid::nil(),
            original_filename: "grid.xiidm.gz".to_string(),
            format: "XIIDM".to_string(),
            compression: CompressionKind::Gz,
            archive: ArchiveKind::None,
            indexed: false,
            expires_at: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["compression"], "gz");
        assert_eq!(json["archive"], "none");
        let back: CaseRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_expiration() {
        let now = Utc::now();
        let options = ImportOptions {
            expire_after: Some(chrono::Duration::hours(1)),
            indexed: false,
        };
        let mut record = CaseRecord {
            id: Uuid::new_v4(),
            original_filename: "a.xml".to_string(),
            format: "XIIDM".to_string(),
            compression: CompressionKind::None,
            archive: ArchiveKind::None,
            indexed: false,
            expires_at: options.expires_at(now).unwrap(),
        };
        assert!(!record.is_expired(now));
        assert!(record.is_expired(now + chrono::Duration::hours(2)));
        record.expires_at = None;
        assert!(!record.is_expired(now + chrono::Duration::days(365)));
    }

    #[test]
    fn test_expiration_out_of_range() {
        let options = ImportOptions {
            expire_after: chrono::Duration::try_days(400_000 * 365),
            indexed: false,
        };
        assert!(options.expire_after.is_some());
        assert_eq!(options.expires_at(Utc::now()), Err(ExpirationOutOfRange));
        assert_eq!(ImportOptions::default().expires_at(Utc::now()), Ok(None));
    }
}
