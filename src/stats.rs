use crate::date::{date_key, days_in_month, month_prefix, today};
use crate::errors::Error;
use crate::models::{CalendarStats, CheckInRecord};
use chrono::{Datelike, NaiveDate};
use std::collections::HashSet;

/// Stats for one calendar's records as of the current local day.
pub fn build_stats(records: &[CheckInRecord]) -> Result<CalendarStats, Error> {
    build_stats_at(today(), records)
}

pub fn build_stats_at(today: NaiveDate, records: &[CheckInRecord]) -> Result<CalendarStats, Error> {
    let today_key = date_key(today);
    Ok(CalendarStats {
        streak: calculate_streak_at(today, records),
        total: records.len(),
        rate: calculate_monthly_rate(records, today.year(), today.month() as i32)?,
        checked_today: records.iter().any(|record| record.date == today_key),
    })
}

pub fn calculate_streak(records: &[CheckInRecord]) -> u32 {
    calculate_streak_at(today(), records)
}

/// Length of the unbroken run of non-retroactive check-ins counted back from
/// today. A latest check-in older than yesterday means no streak.
pub fn calculate_streak_at(today: NaiveDate, records: &[CheckInRecord]) -> u32 {
    let dates: HashSet<&str> = records
        .iter()
        .filter(|record| !record.is_retroactive)
        .map(|record| record.date.as_str())
        .collect();

    let Some(latest) = dates.iter().max() else {
        return 0;
    };

    let yesterday = today.pred_opt().map(date_key);
    if *latest != date_key(today) && Some(*latest) != yesterday.as_deref() {
        return 0;
    }

    // The walk always starts at today, so a run that stops at yesterday counts as 0.
    let mut cursor = Some(today);
    let mut streak = 0;
    while let Some(day) = cursor.filter(|day| dates.contains(date_key(*day).as_str())) {
        streak += 1;
        cursor = day.pred_opt();
    }
    streak
}

/// `round(100 * non-retroactive records in month / days in month)`.
pub fn calculate_monthly_rate(
    records: &[CheckInRecord],
    year: i32,
    month: i32,
) -> Result<u32, Error> {
    let days = days_in_month(year, month)?;
    let prefix = month_prefix(year, month)?;
    let checked = records
        .iter()
        .filter(|record| !record.is_retroactive && record.date.starts_with(&prefix))
        .count();

    Ok((checked as f64 / f64::from(days) * 100.0).round() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 15).unwrap()
    }

    fn record(date: NaiveDate, is_retroactive: bool) -> CheckInRecord {
        CheckInRecord {
            id: format!("r-{date}"),
            user_id: None,
            calendar_id: "c1".into(),
            date: date_key(date),
            check_in_time: 0,
            content: String::new(),
            images: Vec::new(),
            is_retroactive,
            retroactive_time: None,
        }
    }

    fn days_ago(n: i64) -> NaiveDate {
        today() - Duration::days(n)
    }

    #[test]
    fn streak_of_nothing_is_zero() {
        assert_eq!(calculate_streak_at(today(), &[]), 0);
    }

    #[test]
    fn retroactive_only_is_zero() {
        let records = vec![record(days_ago(0), true), record(days_ago(1), true)];
        assert_eq!(calculate_streak_at(today(), &records), 0);
    }

    #[test]
    fn streak_counts_back_to_first_gap() {
        let records = vec![
            record(days_ago(0), false),
            record(days_ago(1), false),
            record(days_ago(2), false),
            record(days_ago(4), false),
        ];
        assert_eq!(calculate_streak_at(today(), &records), 3);
    }

    #[test]
    fn streak_is_counted_from_today() {
        let records = vec![record(days_ago(1), false), record(days_ago(2), false)];
        assert_eq!(calculate_streak_at(today(), &records), 0);

        let mut records = records;
        records.push(record(days_ago(0), false));
        assert_eq!(calculate_streak_at(today(), &records), 3);
    }

    #[test]
    fn stale_latest_check_in_resets_streak() {
        let records = vec![record(days_ago(2), false), record(days_ago(3), false)];
        assert_eq!(calculate_streak_at(today(), &records), 0);
    }

    #[test]
    fn retroactive_fill_does_not_bridge_a_gap() {
        let records = vec![
            record(days_ago(0), false),
            record(days_ago(1), true),
            record(days_ago(2), false),
        ];
        assert_eq!(calculate_streak_at(today(), &records), 1);
    }

    #[test]
    fn monthly_rate_is_flat_ratio() {
        let records: Vec<_> = (1..=10)
            .map(|day| record(NaiveDate::from_ymd_opt(2026, 4, day).unwrap(), false))
            .collect();
        assert_eq!(calculate_monthly_rate(&records, 2026, 4).unwrap(), 33);
    }

    #[test]
    fn monthly_rate_ignores_retroactive_and_other_months() {
        let records = vec![
            record(NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(), false),
            record(NaiveDate::from_ymd_opt(2026, 2, 2).unwrap(), true),
            record(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(), false),
        ];
        // 1 of 28 days.
        assert_eq!(calculate_monthly_rate(&records, 2026, 2).unwrap(), 4);
    }

    #[test]
    fn stats_report_today_and_totals() {
        let records = vec![
            record(days_ago(0), false),
            record(days_ago(1), false),
            record(days_ago(5), true),
        ];
        let stats = build_stats_at(today(), &records).unwrap();
        assert_eq!(stats.streak, 2);
        assert_eq!(stats.total, 3);
        assert!(stats.checked_today);
        // 2 of 31 January days.
        assert_eq!(stats.rate, 6);
    }
}
