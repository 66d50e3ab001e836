//! Boundary arithmetic for the four rollup tiers (§4.5). Chapter boundaries
//! are a fixed 24h duration at 00:00 UTC, so plain integer division works;
//! book/part/series boundaries are calendar month/year/decade, which vary in
//! length, so those walk the UTC calendar via `chrono` instead of dividing a
//! fixed-width duration.

use chrono::{Datelike, NaiveDate, TimeZone, Utc};
use ledger_core::error::{LedgerError, LedgerResult};
use ledger_core::record::Tier;
use ledger_core::types::Timestamp;

const NANOS_PER_SEC: i64 = 1_000_000_000;

fn ns_to_secs(ts: Timestamp) -> i64 {
    ts.div_euclid(NANOS_PER_SEC)
}

fn secs_to_ns(secs: i64) -> Timestamp {
    secs * NANOS_PER_SEC
}

/// `[start, end)` of the chapter (24h-at-UTC-midnight) interval containing
/// `ts`. A timestamp exactly on a boundary belongs to the *earlier* chapter
/// (§8 boundary behaviour): `ts == end` is excluded from `[start, end)`.
pub fn chapter_interval(ts: Timestamp) -> (Timestamp, Timestamp) {
    let secs = ns_to_secs(ts);
    let day_secs = 24 * 3600;
    let start_secs = secs.div_euclid(day_secs) * day_secs;
    (secs_to_ns(start_secs), secs_to_ns(start_secs + day_secs))
}

fn to_datetime(ts: Timestamp) -> chrono::DateTime<Utc> {
    let secs = ns_to_secs(ts);
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(|| {
        // Fall back to the epoch on an out-of-range timestamp rather than
        // panicking on untrusted input further up the validation pipeline.
        Utc.timestamp_opt(0, 0).single().unwrap()
    })
}

fn ymd_to_ns(year: i32, month: u32, day: u32) -> Timestamp {
    let date = NaiveDate::from_ymd_opt(year, month, day).expect("valid calendar date");
    let dt = date.and_hms_opt(0, 0, 0).expect("valid time");
    secs_to_ns(dt.and_utc().timestamp())
}

/// `[start, end)` of the calendar month containing `ts`.
pub fn book_interval(ts: Timestamp) -> (Timestamp, Timestamp) {
    let dt = to_datetime(ts);
    let (year, month) = (dt.year(), dt.month());
    let start = ymd_to_ns(year, month, 1);
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let end = ymd_to_ns(next_year, next_month, 1);
    (start, end)
}

/// `[start, end)` of the calendar year containing `ts`.
pub fn part_interval(ts: Timestamp) -> (Timestamp, Timestamp) {
    let dt = to_datetime(ts);
    let year = dt.year();
    (ymd_to_ns(year, 1, 1), ymd_to_ns(year + 1, 1, 1))
}

/// `[start, end)` of the calendar decade containing `ts` (years `10k..10k+10`).
pub fn series_interval(ts: Timestamp) -> (Timestamp, Timestamp) {
    let dt = to_datetime(ts);
    let decade_start = (dt.year() / 10) * 10;
    (ymd_to_ns(decade_start, 1, 1), ymd_to_ns(decade_start + 10, 1, 1))
}

/// The `[start, end)` interval of `tier`'s rollup period containing `ts`.
/// `tier` must be one of the four rollup tiers; `Page`/`Genesis` have no
/// interval of their own, so those are reported as `Malformed` rather than
/// panicking — callers driven by a tier value that didn't come from the
/// scheduler's own fixed `ROLLUP_TIERS` list (the RPC surface's
/// `rollup_at`, for instance) must not be able to crash the node.
pub fn interval_for(tier: Tier, ts: Timestamp) -> LedgerResult<(Timestamp, Timestamp)> {
    Ok(match tier {
        Tier::Chapter => chapter_interval(ts),
        Tier::Book => book_interval(ts),
        Tier::Part => part_interval(ts),
        Tier::Series => series_interval(ts),
        Tier::Page | Tier::Genesis => {
            return Err(LedgerError::Malformed(format!("{tier:?} has no rollup interval")))
        }
    })
}

/// The tier immediately above `tier` in the rollup hierarchy, or `None` for
/// `Series` (the top) and non-rollup tiers.
pub fn parent_tier(tier: Tier) -> Option<Tier> {
    match tier {
        Tier::Page => Some(Tier::Chapter),
        Tier::Chapter => Some(Tier::Book),
        Tier::Book => Some(Tier::Part),
        Tier::Part => Some(Tier::Series),
        Tier::Series | Tier::Genesis => None,
    }
}

/// The instant (ns) at which `tier`'s interval containing `ts` closes — the
/// boundary a rollup record for that interval can first be produced at,
/// before accounting for the clock-skew + proposal-deadline grace period.
pub fn boundary_after(tier: Tier, ts: Timestamp) -> LedgerResult<Timestamp> {
    Ok(interval_for(tier, ts)?.1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chapter_interval_is_24h_at_midnight() {
        // 2026-07-27T12:00:00Z
        let ts = 1_784_901_600_000_000_000i64;
        let (start, end) = chapter_interval(ts);
        assert_eq!(end - start, 24 * 3600 * NANOS_PER_SEC);
        assert!(start <= ts && ts < end);
    }

    #[test]
    fn timestamp_on_boundary_belongs_to_earlier_chapter() {
        let (_, end) = chapter_interval(1_784_901_600_000_000_000i64);
        // `end` itself is the start of the *next* chapter, not inside this one.
        let (next_start, _) = chapter_interval(end);
        assert_eq!(next_start, end);
    }

    #[test]
    fn book_interval_spans_whole_month() {
        // 2026-02-15T00:00:00Z -> February 2026 has 28 days.
        let ts = ymd_to_ns(2026, 2, 15);
        let (start, end) = book_interval(ts);
        assert_eq!(start, ymd_to_ns(2026, 2, 1));
        assert_eq!(end, ymd_to_ns(2026, 3, 1));
    }

    #[test]
    fn part_interval_spans_whole_year() {
        let ts = ymd_to_ns(2026, 6, 1);
        let (start, end) = part_interval(ts);
        assert_eq!(start, ymd_to_ns(2026, 1, 1));
        assert_eq!(end, ymd_to_ns(2027, 1, 1));
    }

    #[test]
    fn series_interval_spans_decade() {
        let ts = ymd_to_ns(2026, 6, 1);
        let (start, end) = series_interval(ts);
        assert_eq!(start, ymd_to_ns(2020, 1, 1));
        assert_eq!(end, ymd_to_ns(2030, 1, 1));
    }

    #[test]
    fn parent_tier_chain_terminates_at_series() {
        assert_eq!(parent_tier(Tier::Page), Some(Tier::Chapter));
        assert_eq!(parent_tier(Tier::Chapter), Some(Tier::Book));
        assert_eq!(parent_tier(Tier::Book), Some(Tier::Part));
        assert_eq!(parent_tier(Tier::Part), Some(Tier::Series));
        assert_eq!(parent_tier(Tier::Series), None);
    }

    #[test]
    fn interval_for_rejects_non_rollup_tiers() {
        assert!(interval_for(Tier::Page, 0).is_err());
        assert!(interval_for(Tier::Genesis, 0).is_err());
        assert!(interval_for(Tier::Chapter, 0).is_ok());
    }
}
