//! Recurring pickup dates from a weekday, a recycling color, and the town policies.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, Days, NaiveDate};

use crate::model::{
    CalendarPolicy, CollectionType, DateRange, HolidayPolicy, RecyclingColor, RecyclingMode,
    ScheduleEvent, Weekday,
};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Errors that can occur while generating a schedule.
pub enum ScheduleError {
    /// Alternating-week recycling without both anchor fields. The policy record is broken.
    #[error("Missing recycling anchor data")]
    MissingAnchor,
    /// The requested window leaves the supported calendar.
    #[error("Schedule window out of range: {start} + {days} days")]
    WindowOutOfRange {
        /// Requested first day.
        start: NaiveDate,
        /// Requested length.
        days: u32,
    },
}

/// Sunday on or before `date`, or `None` below the calendar's lower bound.
#[must_use]
pub fn week_sunday(date: NaiveDate) -> Option<NaiveDate> {
    date.checked_sub_days(Days::new(u64::from(
        date.weekday().num_days_from_sunday(),
    )))
}

/// Recycling color of the week starting `sunday`.
#[must_use]
pub fn week_color(
    anchor_sunday: NaiveDate,
    anchor_color: RecyclingColor,
    sunday: NaiveDate,
) -> RecyclingColor {
    let weeks = (sunday - anchor_sunday).num_days().div_euclid(7);
    if weeks.rem_euclid(2) == 0 {
        anchor_color
    } else {
        anchor_color.opposite()
    }
}

/// Move a pickup for holidays.
///
/// Cancelled dates give `None`. Otherwise the pickup moves one day later when the
/// week's earliest shift trigger falls on or before it.
#[must_use]
pub fn apply_holiday_shift(
    base: NaiveDate,
    cutoff: Option<NaiveDate>,
    no_collection_dates: &BTreeSet<NaiveDate>,
) -> Option<NaiveDate> {
    if no_collection_dates.contains(&base) {
        return None;
    }
    match cutoff {
        Some(cutoff) if base >= cutoff => base.succ_opt(),
        _ => Some(base),
    }
}

/// Generate pickups in `[start, start + days]`.
///
/// Trash is collected every week on `trash_weekday`. When `recycling_color` is given and the
/// town alternates recycling weeks, recycling rides along on the weeks of that color. Both go
/// through the same holiday handling. Events are merged per date and sorted by date.
///
/// # Errors
///
/// Returns [`ScheduleError::MissingAnchor`] when alternating-week recycling is requested but
/// the calendar policy lacks its anchor, and [`ScheduleError::WindowOutOfRange`] when the
/// window cannot be represented.
pub fn generate(
    start: NaiveDate,
    days: u32,
    trash_weekday: Weekday,
    recycling_color: Option<RecyclingColor>,
    calendar_policy: &CalendarPolicy,
    holiday_policy: &HolidayPolicy,
) -> Result<Vec<ScheduleEvent>, ScheduleError> {
    let out_of_range = || ScheduleError::WindowOutOfRange { start, days };

    let window = DateRange {
        start,
        end: start
            .checked_add_days(Days::new(u64::from(days)))
            .ok_or_else(out_of_range)?,
    };

    let recycling = match recycling_color {
        Some(color) if calendar_policy.recycling_mode == RecyclingMode::AlternatingWeek => {
            let (anchor_sunday, anchor_color) =
                calendar_policy.anchor().ok_or(ScheduleError::MissingAnchor)?;
            Some((color, anchor_sunday, anchor_color))
        }
        _ => None,
    };

    let cutoffs = shift_cutoffs(holiday_policy);
    let offset = Days::new(trash_weekday.offset_from_sunday());
    let last_week = week_sunday(window.end).ok_or_else(out_of_range)?;
    let mut events: BTreeMap<NaiveDate, BTreeSet<CollectionType>> = BTreeMap::new();

    let mut current = week_sunday(window.start).ok_or_else(out_of_range)?;
    while current <= last_week {
        let Some(base) = current.checked_add_days(offset) else {
            break;
        };
        let cutoff = cutoffs.get(&current).copied();
        let pickup = apply_holiday_shift(base, cutoff, &holiday_policy.no_collection_dates)
            .filter(|date| window.contains(*date));

        if let Some(date) = pickup {
            events.entry(date).or_default().insert(CollectionType::Trash);

            if let Some((color, anchor_sunday, anchor_color)) = recycling
                && week_color(anchor_sunday, anchor_color, current) == color
            {
                events.entry(date).or_default().insert(CollectionType::Recycling);
            }
        }

        let Some(next) = current.checked_add_days(Days::new(7)) else {
            break;
        };
        current = next;
    }

    Ok(events
        .into_iter()
        .map(|(date, types)| ScheduleEvent { date, types })
        .collect())
}

/// Earliest shift trigger per week, keyed by the week's Sunday.
fn shift_cutoffs(policy: &HolidayPolicy) -> BTreeMap<NaiveDate, NaiveDate> {
    let mut cutoffs: BTreeMap<NaiveDate, NaiveDate> = BTreeMap::new();
    if !policy.shift_by_one_day {
        return cutoffs;
    }
    for trigger in policy.shift_triggers() {
        let Some(sunday) = week_sunday(trigger) else {
            continue;
        };
        cutoffs
            .entry(sunday)
            .and_modify(|earliest| *earliest = (*earliest).min(trigger))
            .or_insert(trigger);
    }
    cutoffs
}
