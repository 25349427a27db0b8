//! Weekday calendar arithmetic for picking a contract's expiry.
//!
//! Everything here is a pure function of the entry date and the configured
//! weekdays, so results never depend on the wall clock.

use crate::config::RolloverRule;
use chrono::{Datelike, Duration, NaiveDate, Weekday};

fn days_until(from: Weekday, to: Weekday) -> i64 {
    let from = from.num_days_from_monday() as i64;
    let to = to.num_days_from_monday() as i64;
    (to - from).rem_euclid(7)
}

/// Next date falling on `weekday`. With `include_today` a date that is
/// already on `weekday` is returned unchanged; otherwise the result is
/// always at least one day ahead.
pub fn next_occurrence(date: NaiveDate, weekday: Weekday, include_today: bool) -> NaiveDate {
    let mut days_ahead = days_until(date.weekday(), weekday);
    if days_ahead == 0 && !include_today {
        days_ahead = 7;
    }
    date + Duration::days(days_ahead)
}

/// Most recent `expiry_weekday` on or before `date`: the start of the
/// options week containing `date`.
pub fn options_week_start(date: NaiveDate, expiry_weekday: Weekday) -> NaiveDate {
    let days_back = days_until(expiry_weekday, date.weekday());
    date - Duration::days(days_back)
}

/// Date within the current options week that corresponds to
/// `rollover_weekday`. Equals the week start when both weekdays coincide.
pub fn rollover_boundary(
    entry_date: NaiveDate,
    expiry_weekday: Weekday,
    rollover_weekday: Weekday,
) -> NaiveDate {
    let week_start = options_week_start(entry_date, expiry_weekday);
    week_start + Duration::days(days_until(expiry_weekday, rollover_weekday))
}

/// Resolves the expiry targeted by a trade entered on `entry_date`.
///
/// Without rollover this is the first `expiry_weekday` on or after the entry
/// date. With a rollover weekday, entries before the boundary take the next
/// expiry strictly after the entry date and entries on or after it take the
/// one a week later.
pub fn resolve_expiry(
    entry_date: NaiveDate,
    expiry_weekday: Weekday,
    rollover_rule: RolloverRule,
) -> NaiveDate {
    match rollover_rule {
        RolloverRule::NoRollover => next_occurrence(entry_date, expiry_weekday, true),
        RolloverRule::Weekday(rollover_weekday) => {
            let next_expiry = next_occurrence(entry_date, expiry_weekday, false);
            let boundary = rollover_boundary(entry_date, expiry_weekday, rollover_weekday);
            if entry_date < boundary {
                next_expiry
            } else {
                next_expiry + Duration::days(7)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn no_rollover_counts_same_day() {
        // 2025-11-18 is a Tuesday.
        let tuesday = date(2025, 11, 18);
        assert_eq!(
            resolve_expiry(tuesday, Weekday::Tue, RolloverRule::NoRollover),
            tuesday
        );
        assert_eq!(
            resolve_expiry(date(2025, 11, 19), Weekday::Tue, RolloverRule::NoRollover),
            date(2025, 11, 25)
        );
    }

    #[test]
    fn no_rollover_lands_on_weekday_within_a_week() {
        let start = date(2025, 1, 1);
        let weekdays = [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
        ];
        for offset in 0..60 {
            let entry = start + Duration::days(offset);
            for weekday in weekdays {
                let expiry = resolve_expiry(entry, weekday, RolloverRule::NoRollover);
                assert!(expiry >= entry);
                assert!(expiry <= entry + Duration::days(7));
                assert_eq!(expiry.weekday(), weekday);
            }
        }
    }

    #[test]
    fn weekday_rollover_before_boundary_uses_next_expiry() {
        let rule = RolloverRule::Weekday(Weekday::Thu);
        // Wednesday, before Thursday's boundary.
        assert_eq!(
            resolve_expiry(date(2025, 11, 19), Weekday::Tue, rule),
            date(2025, 11, 25)
        );
        // Expiry day itself starts a new week; next expiry is strictly after.
        assert_eq!(
            resolve_expiry(date(2025, 11, 18), Weekday::Tue, rule),
            date(2025, 11, 25)
        );
    }

    #[test]
    fn weekday_rollover_boundary_is_inclusive() {
        let rule = RolloverRule::Weekday(Weekday::Thu);
        let thursday = date(2025, 11, 20);
        assert_eq!(
            rollover_boundary(thursday, Weekday::Tue, Weekday::Thu),
            thursday
        );
        assert_eq!(
            resolve_expiry(thursday, Weekday::Tue, rule),
            date(2025, 12, 2)
        );
        // Monday sits past the boundary of the week that started the previous Tuesday.
        assert_eq!(
            resolve_expiry(date(2025, 11, 17), Weekday::Tue, rule),
            date(2025, 11, 25)
        );
    }

    #[test]
    fn rollover_on_expiry_weekday_always_rolls() {
        let rule = RolloverRule::Weekday(Weekday::Tue);
        assert_eq!(
            resolve_expiry(date(2025, 11, 18), Weekday::Tue, rule),
            date(2025, 12, 2)
        );
        assert_eq!(
            resolve_expiry(date(2025, 11, 19), Weekday::Tue, rule),
            date(2025, 12, 2)
        );
    }

    #[test]
    fn week_start_walks_back_to_expiry_weekday() {
        assert_eq!(
            options_week_start(date(2025, 11, 17), Weekday::Tue),
            date(2025, 11, 11)
        );
        assert_eq!(
            next_occurrence(date(2025, 11, 18), Weekday::Tue, false),
            date(2025, 11, 25)
        );
    }
}
