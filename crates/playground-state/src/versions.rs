//! Nightly compiler versions.
//!
//! A nightly is published once per UTC day and named after its date,
//! `YYYY.M.D` without zero padding.

use chrono::{Datelike, Days, NaiveDate, Utc};

/// Number of nightlies offered for selection.
pub const NIGHTLY_WINDOW: usize = 30;

/// Version identifier of the nightly published on `date`.
pub fn nightly_version(date: NaiveDate) -> String {
    format!("{}.{}.{}", date.year(), date.month(), date.day())
}

/// Identifiers of the nightlies for the `count` days ending at `today`,
/// newest first.
pub fn recent_versions(today: NaiveDate, count: usize) -> Vec<String> {
    (0..u64::try_from(count).unwrap_or(u64::MAX))
        .map_while(|back| today.checked_sub_days(Days::new(back)))
        .map(nightly_version)
        .collect()
}

/// Today's date in UTC.
pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_nightly_version_is_unpadded() {
        assert_eq!(nightly_version(date(2025, 3, 4)), "2025.3.4");
        assert_eq!(nightly_version(date(2025, 12, 31)), "2025.12.31");
    }

    #[test]
    fn test_recent_versions_cross_month_and_year() {
        assert_eq!(
            recent_versions(date(2025, 1, 2), 4),
            ["2025.1.2", "2025.1.1", "2024.12.31", "2024.12.30"]
        );
    }

    #[test]
    fn test_recent_versions_window() {
        let versions = recent_versions(date(2024, 3, 1), NIGHTLY_WINDOW);
        assert_eq!(versions.len(), NIGHTLY_WINDOW);
        assert_eq!(versions[0], "2024.3.1");
        assert_eq!(versions[1], "2024.2.29");
        assert!(recent_versions(date(2024, 3, 1), 0).is_empty());
    }
}
