//! Property-based tests using proptest.
//!
//! These check invariants that hold for any input, not just the hand-picked cases in
//! `resolver_tests.rs` and `schedule_tests.rs`.

use std::collections::{BTreeSet, HashMap};

use chrono::{Datelike, Days, Duration, NaiveDate};
use curbside_core::{
    CalendarPolicy, CollectionType, HolidayPolicy, RecyclingColor, StreetNormalizer, Weekday,
    generate, normalize_street_name, week_color, week_sunday,
};
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn arb_street() -> impl Strategy<Value = String> {
    prop_oneof![
        "[A-Za-z0-9 .,'-]{0,30}",
        Just("N Main St".to_owned()),
        Just("Boston Rd.".to_owned()),
        Just("  SE   Elm   Ave  ".to_owned()),
    ]
}

const TABLE_WORDS: &[&str] = &[
    "n", "North", "XING", "crossing", "Sq.", "square", "rd", "Road", "ext", "main",
];

fn arb_table_word() -> impl Strategy<Value = String> {
    prop::sample::select(TABLE_WORDS.to_vec()).prop_map(str::to_owned)
}

fn arb_phrase() -> impl Strategy<Value = String> {
    prop::collection::vec(arb_table_word(), 1..4).prop_map(|words| words.join(" "))
}

/// Town tables built from a small vocabulary, so chains and cycles come up often.
fn arb_table() -> impl Strategy<Value = Option<HashMap<String, String>>> {
    prop::option::of(prop::collection::hash_map(arb_table_word(), arb_phrase(), 0..6))
}

fn arb_table_street() -> impl Strategy<Value = String> {
    prop_oneof![
        arb_street(),
        prop::collection::vec(arb_table_word(), 0..5).prop_map(|words| words.join(" ")),
    ]
}

fn arb_date() -> impl Strategy<Value = NaiveDate> {
    (2024i32..=2027, 1u32..=12, 1u32..=28)
        .prop_map(|(year, month, date)| NaiveDate::from_ymd_opt(year, month, date).expect("valid"))
}

fn arb_weekday() -> impl Strategy<Value = Weekday> {
    prop::sample::select(Weekday::ALL.to_vec())
}

fn arb_color() -> impl Strategy<Value = RecyclingColor> {
    prop_oneof![Just(RecyclingColor::Blue), Just(RecyclingColor::Green)]
}

fn arb_holidays() -> impl Strategy<Value = HolidayPolicy> {
    (
        prop::collection::btree_set(arb_date(), 0..6),
        prop::collection::btree_set(arb_date(), 0..6),
        any::<bool>(),
    )
        .prop_map(|(cancelled, shifts, shift_by_one_day)| HolidayPolicy {
            no_collection_dates: cancelled,
            shift_holidays: shifts,
            delay_anchor_week_sundays: BTreeSet::new(),
            shift_by_one_day,
        })
}

fn sunday_on_or_before(date: NaiveDate) -> NaiveDate {
    week_sunday(date).expect("in range")
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn normalization_is_idempotent(raw in arb_street()) {
        let once = normalize_street_name(&raw);
        prop_assert_eq!(normalize_street_name(&once), once);
    }

    #[test]
    fn normalization_with_town_tables_is_idempotent(
        suffixes in arb_table(),
        directionals in arb_table(),
        raw in arb_table_street(),
    ) {
        let normalizer = StreetNormalizer::new(suffixes, directionals);
        let once = normalizer.normalize(&raw);
        prop_assert_eq!(normalizer.normalize(&once), once);
    }

    #[test]
    fn normalized_keys_have_single_spaces(raw in arb_street()) {
        let key = normalize_street_name(&raw);
        prop_assert!(!key.contains("  "));
        prop_assert_eq!(key.trim(), key.as_str());
    }

    #[test]
    fn events_stay_inside_window_and_sorted(
        start in arb_date(),
        days in 0u32..120,
        weekday in arb_weekday(),
        color in prop::option::of(arb_color()),
        anchor in arb_date(),
        anchor_color in arb_color(),
        holidays in arb_holidays(),
    ) {
        let policy = CalendarPolicy::alternating(sunday_on_or_before(anchor), anchor_color);
        let events = generate(start, days, weekday, color, &policy, &holidays)
            .expect("anchored policy");
        let end = start + Days::new(u64::from(days));

        for event in &events {
            prop_assert!(start <= event.date && event.date <= end);
            prop_assert!(!event.types.is_empty());
            prop_assert!(!holidays.no_collection_dates.contains(&event.date)
                || event.date.weekday().num_days_from_sunday()
                    != u32::try_from(weekday.offset_from_sunday()).expect("small"));
        }
        prop_assert!(events.windows(2).all(|pair| matches!(pair, [left, right] if left.date < right.date)));
    }

    #[test]
    fn without_holidays_every_week_has_trash(
        start in arb_date(),
        weeks in 1u32..20,
        weekday in arb_weekday(),
    ) {
        let days = weeks * 7 - 1;
        let events = generate(
            start,
            days,
            weekday,
            None,
            &CalendarPolicy::default(),
            &HolidayPolicy::default(),
        )
        .expect("schedule");
        prop_assert_eq!(events.len(), usize::try_from(weeks).expect("small"));
        prop_assert!(events.iter().all(|event| event.types == BTreeSet::from([CollectionType::Trash])));
    }

    #[test]
    fn consecutive_weeks_never_share_a_color(
        anchor in arb_date(),
        anchor_color in arb_color(),
        offset_weeks in -60i64..60,
    ) {
        let anchor = sunday_on_or_before(anchor);
        let this_week = anchor + Duration::weeks(offset_weeks);
        let next_week = this_week + Duration::weeks(1);
        prop_assert_ne!(
            week_color(anchor, anchor_color, this_week),
            week_color(anchor, anchor_color, next_week)
        );
    }
}
