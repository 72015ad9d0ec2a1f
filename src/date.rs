use crate::errors::Error;
use crate::models::{CalendarDayData, CheckInRecord};
use chrono::{Datelike, Days, Local, NaiveDate};
use std::collections::HashMap;
use std::str::FromStr;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Cells in a month grid: six full weeks.
pub const GRID_CELLS: usize = 42;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WeekStart {
    #[default]
    Sunday,
    Monday,
}

impl WeekStart {
    /// Column index (0..7) of `date` in a grid whose first column is this weekday.
    pub fn column(self, date: NaiveDate) -> u32 {
        match self {
            WeekStart::Sunday => date.weekday().num_days_from_sunday(),
            WeekStart::Monday => date.weekday().num_days_from_monday(),
        }
    }
}

impl FromStr for WeekStart {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sunday" | "sun" => Ok(WeekStart::Sunday),
            "monday" | "mon" => Ok(WeekStart::Monday),
            other => Err(Error::Config(format!(
                "week start must be 'sunday' or 'monday', got '{other}'"
            ))),
        }
    }
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn today_string() -> String {
    date_key(today())
}

pub fn date_key(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(value: &str) -> Result<NaiveDate, Error> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|_| Error::validation(format!("'{value}' is not a YYYY-MM-DD date")))
}

pub fn is_today(date: &str) -> bool {
    date == today_string()
}

/// True when `date` is strictly after the current day. Unparsable input is never future.
pub fn is_future(date: &str) -> bool {
    is_future_at(date, today())
}

pub fn is_future_at(date: &str, today: NaiveDate) -> bool {
    parse_date(date).map(|d| d > today).unwrap_or(false)
}

/// Folds an out-of-range month into the neighbouring year: month 0 is the
/// previous December, month 13 the next January.
pub fn normalize_month(year: i32, month: i32) -> Result<(i32, u32), Error> {
    let index = year
        .checked_mul(12)
        .and_then(|months| months.checked_add(month.checked_sub(1)?))
        .ok_or_else(|| out_of_range(year, month))?;
    Ok((index.div_euclid(12), index.rem_euclid(12) as u32 + 1))
}

pub fn first_of_month(year: i32, month: i32) -> Result<NaiveDate, Error> {
    let (year, month) = normalize_month(year, month)?;
    NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| out_of_range(year, month as i32))
}

fn out_of_range(year: i32, month: i32) -> Error {
    Error::validation(format!("{year}-{month:02} is out of range"))
}

pub fn days_in_month(year: i32, month: i32) -> Result<u32, Error> {
    let following = month.checked_add(1).ok_or_else(|| out_of_range(year, month))?;
    let next = first_of_month(year, following)?;
    next.pred_opt()
        .map(|last| last.day())
        .ok_or_else(|| out_of_range(year, month))
}

pub fn first_day_of_week(year: i32, month: i32, week_start: WeekStart) -> Result<u32, Error> {
    Ok(week_start.column(first_of_month(year, month)?))
}

/// `YYYY-MM` prefix shared by every date string in the month.
pub fn month_prefix(year: i32, month: i32) -> Result<String, Error> {
    Ok(first_of_month(year, month)?.format("%Y-%m").to_string())
}

pub fn generate_calendar_days(
    year: i32,
    month: i32,
    records: &[CheckInRecord],
) -> Result<Vec<CalendarDayData>, Error> {
    generate_calendar_days_at(year, month, records, today(), WeekStart::Sunday)
}

/// Builds the 42-cell grid for a month. Spillover cells from the adjacent
/// months are never flagged current, today or future.
pub fn generate_calendar_days_at(
    year: i32,
    month: i32,
    records: &[CheckInRecord],
    today: NaiveDate,
    week_start: WeekStart,
) -> Result<Vec<CalendarDayData>, Error> {
    let first = first_of_month(year, month)?;
    let lead = week_start.column(first);
    let start = first
        .checked_sub_days(Days::new(u64::from(lead)))
        .ok_or_else(|| out_of_range(year, month))?;

    let mut by_date: HashMap<&str, &CheckInRecord> = HashMap::with_capacity(records.len());
    for record in records {
        by_date.entry(record.date.as_str()).or_insert(record);
    }

    let mut days = Vec::with_capacity(GRID_CELLS);
    for offset in 0..GRID_CELLS as u64 {
        let date = start
            .checked_add_days(Days::new(offset))
            .ok_or_else(|| out_of_range(year, month))?;
        let key = date_key(date);
        let is_current_month = date.year() == first.year() && date.month() == first.month();
        days.push(CalendarDayData {
            day: date.day(),
            is_current_month,
            is_today: is_current_month && date == today,
            is_future: is_current_month && date > today,
            record: by_date.get(key.as_str()).map(|record| (*record).clone()),
            date: key,
        });
    }

    Ok(days)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(date: &str) -> CheckInRecord {
        CheckInRecord {
            id: format!("r-{date}"),
            user_id: None,
            calendar_id: "c1".into(),
            date: date.into(),
            check_in_time: 0,
            content: String::new(),
            images: Vec::new(),
            is_retroactive: false,
            retroactive_time: None,
        }
    }

    #[test]
    fn every_month_has_42_cells_and_true_length() {
        let today = ymd(2026, 1, 5);
        for year in [2023, 2024, 2025, 2100] {
            for month in 1..=12 {
                for week_start in [WeekStart::Sunday, WeekStart::Monday] {
                    let days =
                        generate_calendar_days_at(year, month, &[], today, week_start).unwrap();
                    assert_eq!(days.len(), GRID_CELLS);
                    let current = days.iter().filter(|d| d.is_current_month).count() as u32;
                    assert_eq!(current, days_in_month(year, month).unwrap());
                }
            }
        }
    }

    #[test]
    fn leap_february_has_29_days() {
        assert_eq!(days_in_month(2024, 2).unwrap(), 29);
        assert_eq!(days_in_month(2025, 2).unwrap(), 28);
        assert_eq!(days_in_month(2000, 2).unwrap(), 29);
        assert_eq!(days_in_month(1900, 2).unwrap(), 28);
    }

    #[test]
    fn grid_pads_from_previous_month() {
        // 2026-01-01 is a Thursday.
        let days =
            generate_calendar_days_at(2026, 1, &[], ymd(2026, 1, 5), WeekStart::Sunday).unwrap();
        assert_eq!(first_day_of_week(2026, 1, WeekStart::Sunday).unwrap(), 4);
        assert_eq!(days[0].date, "2025-12-28");
        assert_eq!(days[0].day, 28);
        assert!(!days[0].is_current_month);
        assert_eq!(days[4].date, "2026-01-01");
        assert!(days[4].is_current_month);
        assert_eq!(days[41].date, "2026-02-07");

        let monday =
            generate_calendar_days_at(2026, 1, &[], ymd(2026, 1, 5), WeekStart::Monday).unwrap();
        assert_eq!(monday[0].date, "2025-12-29");
    }

    #[test]
    fn month_rollover_crosses_year_boundaries() {
        assert_eq!(normalize_month(2026, 0).unwrap(), (2025, 12));
        assert_eq!(normalize_month(2026, 13).unwrap(), (2027, 1));
        assert_eq!(normalize_month(2026, -12).unwrap(), (2024, 12));

        let days =
            generate_calendar_days_at(2025, 12, &[], ymd(2026, 1, 5), WeekStart::Sunday).unwrap();
        let tail: Vec<_> = days.iter().filter(|d| d.date.starts_with("2026-01")).collect();
        assert!(!tail.is_empty());
        assert!(tail.iter().all(|d| !d.is_current_month));

        let wrapped =
            generate_calendar_days_at(2026, 0, &[], ymd(2026, 1, 5), WeekStart::Sunday).unwrap();
        assert_eq!(wrapped, days);
    }

    #[test]
    fn out_of_range_months_are_rejected() {
        let today = ymd(2026, 1, 5);
        assert!(matches!(
            normalize_month(2_000_000_000, 1),
            Err(Error::Validation(_))
        ));
        assert!(matches!(normalize_month(2026, i32::MIN), Err(Error::Validation(_))));
        assert!(days_in_month(2026, i32::MAX).is_err());
        assert!(matches!(
            generate_calendar_days_at(2_000_000_000, 1, &[], today, WeekStart::Sunday),
            Err(Error::Validation(_))
        ));
        // Earliest representable month: leading padding would fall before it
        // for at least one of the week starts.
        let earliest: Vec<_> = [WeekStart::Sunday, WeekStart::Monday]
            .into_iter()
            .map(|week_start| generate_calendar_days_at(-262143, 1, &[], today, week_start))
            .collect();
        assert!(earliest.iter().any(|days| matches!(days, Err(Error::Validation(_)))));
    }

    #[test]
    fn today_and_future_flags_only_in_current_month() {
        let today = ymd(2026, 1, 31);
        let days = generate_calendar_days_at(2026, 1, &[], today, WeekStart::Sunday).unwrap();
        let flagged: Vec<_> = days.iter().filter(|d| d.is_today).collect();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].date, "2026-01-31");
        assert!(days.iter().filter(|d| !d.is_current_month).all(|d| !d.is_future));

        // Viewing February: today (Jan 31) is a spillover cell and stays unflagged.
        let feb = generate_calendar_days_at(2026, 2, &[], today, WeekStart::Sunday).unwrap();
        let spill = feb.iter().find(|d| d.date == "2026-01-31").unwrap();
        assert!(!spill.is_today);
        assert!(feb.iter().filter(|d| d.is_current_month).all(|d| d.is_future));
    }

    #[test]
    fn cells_carry_matching_records() {
        let records = vec![record("2026-01-03"), record("2025-12-30")];
        let days =
            generate_calendar_days_at(2026, 1, &records, ymd(2026, 1, 5), WeekStart::Sunday)
                .unwrap();
        let with_records: Vec<_> = days.iter().filter(|d| d.record.is_some()).collect();
        assert_eq!(with_records.len(), 2);
        let spill = days.iter().find(|d| d.date == "2025-12-30").unwrap();
        assert_eq!(spill.record.as_ref().unwrap().id, "r-2025-12-30");
    }

    #[test]
    fn is_future_is_strictly_after_today() {
        let today = ymd(2026, 1, 5);
        assert!(!is_future_at("2026-01-05", today));
        assert!(!is_future_at("2026-01-04", today));
        assert!(is_future_at("2026-01-06", today));
        assert!(!is_future_at("garbage", today));
    }

    #[test]
    fn week_start_parses() {
        assert_eq!("Monday".parse::<WeekStart>().unwrap(), WeekStart::Monday);
        assert_eq!("sun".parse::<WeekStart>().unwrap(), WeekStart::Sunday);
        assert!("friday".parse::<WeekStart>().is_err());
    }
}
