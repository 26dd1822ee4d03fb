//! Which listing entries are worth a detail fetch.
use chrono::{DateTime, NaiveDateTime, Utc};
use psstore_client::ListingEntry;

use super::error::SyncError;

const RELEASE_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Eligible,
    /// Add-on or bundle component (carries a parent reference).
    BundleComponent,
    Unreleased,
}

pub fn parse_release_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, RELEASE_DATE_FORMAT)
        .map(|naive| naive.and_utc())
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
}

/// Bundle components are excluded whatever their release date. A release date
/// equal to `now` counts as released.
pub fn classify_entry(entry: &ListingEntry, now: DateTime<Utc>) -> Result<EntryStatus, SyncError> {
    if entry.is_bundle_component() {
        return Ok(EntryStatus::BundleComponent);
    }
    let raw = entry
        .release_date
        .as_deref()
        .ok_or_else(|| SyncError::InvalidEntry {
            entry_id: entry.id.clone(),
            reason: "missing release_date".into(),
        })?;
    let released = parse_release_date(raw).ok_or_else(|| SyncError::InvalidEntry {
        entry_id: entry.id.clone(),
        reason: format!("unparseable release_date {raw:?}"),
    })?;
    if released > now {
        Ok(EntryStatus::Unreleased)
    } else {
        Ok(EntryStatus::Eligible)
    }
}
