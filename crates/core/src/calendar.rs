use std::collections::HashSet;

use chrono::{Datelike, NaiveDate, Weekday};
use rust_decimal::Decimal;

use crate::domain::leave_request::LeaveDuration;

/// Where a date sits relative to the submission day.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DayClass {
    Backdated,
    SameDay,
    Future,
}

pub fn classify(date: NaiveDate, today: NaiveDate) -> DayClass {
    match date.cmp(&today) {
        std::cmp::Ordering::Less => DayClass::Backdated,
        std::cmp::Ordering::Equal => DayClass::SameDay,
        std::cmp::Ordering::Greater => DayClass::Future,
    }
}

/// Working-day arithmetic over a weekly rest-day set and a holiday set.
/// Pure and deterministic; every numeric rule in the engine builds on it.
#[derive(Clone, Debug)]
pub struct WorkCalendar {
    rest_days: HashSet<Weekday>,
    holidays: HashSet<NaiveDate>,
}

impl Default for WorkCalendar {
    fn default() -> Self {
        Self {
            rest_days: HashSet::from([Weekday::Sat, Weekday::Sun]),
            holidays: HashSet::new(),
        }
    }
}

impl WorkCalendar {
    pub fn new(
        rest_days: impl IntoIterator<Item = Weekday>,
        holidays: impl IntoIterator<Item = NaiveDate>,
    ) -> Self {
        Self {
            rest_days: rest_days.into_iter().collect(),
            holidays: holidays.into_iter().collect(),
        }
    }

    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        !self.rest_days.contains(&date.weekday()) && !self.holidays.contains(&date)
    }

    /// Working days in the inclusive range; 0 when `end < start`.
    pub fn working_days(&self, start: NaiveDate, end: NaiveDate) -> u32 {
        if end < start {
            return 0;
        }
        start
            .iter_days()
            .take_while(|date| *date <= end)
            .filter(|date| self.is_working_day(*date))
            .count() as u32
    }

    /// Working days scaled by the duration modifier.
    pub fn requested_days(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        duration: LeaveDuration,
    ) -> Decimal {
        Decimal::from(self.working_days(start, end)) * duration.multiplier()
    }
}
