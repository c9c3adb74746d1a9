//! Business-day calendar.
//!
//! Counts come from the precomputed `is_business_day` flag of the `calendar_days`
//! table. [`BusinessCalendar`] loads the months a computation needs once and then
//! answers every count in memory. Asking about a month that has no rows at all
//! is a [`Error::CalendarMiss`].

use crate::{
    entities::{CalendarDay, calendar_day},
    errors::{Error, Result},
};
use chrono::{Datelike, NaiveDate, Weekday};
use sea_orm::{QueryOrder, Set, prelude::*};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

const INSERT_CHUNK: usize = 500;

/// First and last day of a month.
pub fn month_bounds(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate)> {
    let first =
        NaiveDate::from_ymd_opt(year, month, 1).ok_or(Error::CalendarMiss { year, month })?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    let last = next
        .and_then(|d| d.pred_opt())
        .ok_or(Error::CalendarMiss { year, month })?;
    Ok((first, last))
}

/// Every `(year, month)` touched by `[start, end]`, in order.
#[must_use]
pub fn months_between(start: NaiveDate, end: NaiveDate) -> Vec<(i32, u32)> {
    let mut months = Vec::new();
    let (mut year, mut month) = (start.year(), start.month());
    while (year, month) <= (end.year(), end.month()) {
        months.push((year, month));
        if month == 12 {
            year += 1;
            month = 1;
        } else {
            month += 1;
        }
    }
    months
}

/// Competence string `YYYY-MM`.
#[must_use]
pub fn competence(year: i32, month: u32) -> String {
    format!("{year:04}-{month:02}")
}

/// In-memory view over a range of calendar rows.
#[derive(Debug, Clone, Default)]
pub struct BusinessCalendar {
    days: BTreeMap<NaiveDate, bool>,
}

impl BusinessCalendar {
    /// Builds a calendar from `(date, is_business_day)` pairs.
    pub fn from_days<I>(days: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, bool)>,
    {
        Self {
            days: days.into_iter().collect(),
        }
    }

    /// Loads every calendar row of the months touched by `[start, end]`.
    pub async fn load<C>(db: &C, start: NaiveDate, end: NaiveDate) -> Result<Self>
    where
        C: ConnectionTrait,
    {
        let (from, _) = month_bounds(start.year(), start.month())?;
        let (_, to) = month_bounds(end.year(), end.month())?;

        let rows = CalendarDay::find()
            .filter(calendar_day::Column::Date.between(from, to))
            .order_by_asc(calendar_day::Column::Date)
            .all(db)
            .await?;

        debug!(from = %from, to = %to, days = rows.len(), "calendar loaded");
        Ok(Self::from_days(
            rows.into_iter().map(|r| (r.date, r.is_business_day)),
        ))
    }

    fn ensure_month(&self, year: i32, month: u32) -> Result<(NaiveDate, NaiveDate)> {
        let (first, last) = month_bounds(year, month)?;
        if self.days.range(first..=last).next().is_none() {
            return Err(Error::CalendarMiss { year, month });
        }
        Ok((first, last))
    }

    fn count(&self, start: NaiveDate, end: NaiveDate) -> u32 {
        let count = self
            .days
            .range(start..=end)
            .filter(|(_, business)| **business)
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// Business days in the full month.
    pub fn business_days(&self, year: i32, month: u32) -> Result<u32> {
        let (first, last) = self.ensure_month(year, month)?;
        Ok(self.count(first, last))
    }

    /// Business days in `[start, end]`, both inclusive. Empty when `start > end`.
    pub fn business_days_in(&self, start: NaiveDate, end: NaiveDate) -> Result<u32> {
        if start > end {
            return Ok(0);
        }
        for (year, month) in months_between(start, end) {
            self.ensure_month(year, month)?;
        }
        Ok(self.count(start, end))
    }

    /// Business days from the first of the month up to and including `date`.
    pub fn business_days_until(&self, year: i32, month: u32, date: NaiveDate) -> Result<u32> {
        let (first, last) = self.ensure_month(year, month)?;
        Ok(self.count(first, date.min(last)))
    }
}

/// Inserts calendar rows for `[from, to]` that are not present yet.
///
/// Monday to Friday are business days unless listed in `holidays`.
/// Returns the number of rows inserted.
pub async fn seed_calendar<C>(
    db: &C,
    from: NaiveDate,
    to: NaiveDate,
    holidays: &[NaiveDate],
) -> Result<usize>
where
    C: ConnectionTrait,
{
    let existing: HashSet<NaiveDate> = CalendarDay::find()
        .filter(calendar_day::Column::Date.between(from, to))
        .all(db)
        .await?
        .into_iter()
        .map(|r| r.date)
        .collect();
    let holidays: HashSet<&NaiveDate> = holidays.iter().collect();

    let rows: Vec<calendar_day::ActiveModel> = from
        .iter_days()
        .take_while(|d| *d <= to)
        .filter(|d| !existing.contains(d))
        .map(|date| {
            let weekend = matches!(date.weekday(), Weekday::Sat | Weekday::Sun);
            calendar_day::ActiveModel {
                date: Set(date),
                year: Set(date.year()),
                month: Set(i32::try_from(date.month()).unwrap_or_default()),
                is_business_day: Set(!weekend && !holidays.contains(&date)),
            }
        })
        .collect();

    let inserted = rows.len();
    for chunk in rows.chunks(INSERT_CHUNK) {
        CalendarDay::insert_many(chunk.to_vec()).exec(db).await?;
    }

    debug!(inserted, "calendar seeded");
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::{date, setup_test_db};

    #[test]
    fn test_month_bounds() {
        assert_eq!(
            month_bounds(2024, 2).unwrap(),
            (date("2024-02-01"), date("2024-02-29"))
        );
        assert_eq!(
            month_bounds(2025, 12).unwrap(),
            (date("2025-12-01"), date("2025-12-31"))
        );
        assert!(month_bounds(2025, 13).is_err());
    }

    #[test]
    fn test_months_between_crosses_year() {
        let months = months_between(date("2024-11-15"), date("2025-02-03"));
        assert_eq!(months, vec![(2024, 11), (2024, 12), (2025, 1), (2025, 2)]);
        assert_eq!(competence(2025, 3), "2025-03");
    }

    #[tokio::test]
    async fn test_business_day_counts() -> Result<()> {
        let db = setup_test_db().await?;
        // March 2025 has 21 weekdays; Carnival Monday and Tuesday are holidays
        let holidays = [date("2025-03-03"), date("2025-03-04")];
        seed_calendar(&db, date("2025-03-01"), date("2025-03-31"), &holidays).await?;

        let calendar = BusinessCalendar::load(&db, date("2025-03-01"), date("2025-03-31")).await?;
        assert_eq!(calendar.business_days(2025, 3)?, 19);
        assert_eq!(calendar.business_days_until(2025, 3, date("2025-03-26"))?, 16);
        assert_eq!(
            calendar.business_days_in(date("2025-03-27"), date("2025-03-31"))?,
            3
        );
        assert_eq!(
            calendar.business_days_in(date("2025-03-31"), date("2025-03-01"))?,
            0
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_month_is_calendar_miss() -> Result<()> {
        let db = setup_test_db().await?;
        seed_calendar(&db, date("2025-03-01"), date("2025-03-31"), &[]).await?;

        let calendar = BusinessCalendar::load(&db, date("2025-03-01"), date("2025-04-30")).await?;
        assert!(matches!(
            calendar.business_days(2025, 4),
            Err(Error::CalendarMiss { year: 2025, month: 4 })
        ));
        assert!(
            calendar
                .business_days_in(date("2025-03-20"), date("2025-04-10"))
                .is_err()
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_seed_calendar_skips_existing_days() -> Result<()> {
        let db = setup_test_db().await?;
        assert_eq!(
            seed_calendar(&db, date("2025-01-01"), date("2025-01-31"), &[]).await?,
            31
        );
        assert_eq!(
            seed_calendar(&db, date("2025-01-15"), date("2025-02-10"), &[]).await?,
            10
        );
        Ok(())
    }
}
