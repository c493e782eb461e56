// Copyright (c) "bolt-core" contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Temporal types based on the [`chrono`] crate.

use chrono::{LocalResult, Offset, TimeZone};
use duplicate::duplicate_item;
use log::warn;

pub type Tz = chrono_tz::Tz;
pub type FixedOffset = chrono::FixedOffset;

pub type LocalTime = chrono::NaiveTime;
pub type Date = chrono::NaiveDate;
pub type LocalDateTime = chrono::NaiveDateTime;
pub type DateTime = chrono::DateTime<Tz>;
pub type DateTimeFixed = chrono::DateTime<FixedOffset>;

/// A wall-clock time with a UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Time {
    pub time: chrono::NaiveTime,
    pub offset: FixedOffset,
}

const AVERAGE_SECONDS_IN_MONTH: i64 = 2629746;
const AVERAGE_SECONDS_IN_DAY: i64 = 86400;

/// The DBMS's duration type: months, days, seconds and nanoseconds are
/// carried separately because their calendar lengths differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Duration {
    pub(crate) months: i64,
    pub(crate) days: i64,
    pub(crate) seconds: i64,
    pub(crate) nanoseconds: i32,
}

impl Duration {
    /// Fails when the total duration overflows when estimated in seconds
    /// (using average month and day lengths).
    pub fn new(months: i64, days: i64, seconds: i64, nanoseconds: i32) -> Option<Self> {
        let seconds = seconds.checked_add(i64::from(nanoseconds) / 1_000_000_000)?;
        let nanoseconds = nanoseconds % 1_000_000_000;
        let months_seconds = months.checked_mul(AVERAGE_SECONDS_IN_MONTH)?;
        let days_seconds = days.checked_mul(AVERAGE_SECONDS_IN_DAY)?;
        seconds
            .checked_add(months_seconds)?
            .checked_add(days_seconds)?;
        Some(Self {
            months,
            days,
            seconds,
            nanoseconds,
        })
    }

    #[duplicate_item(
        name            type_;
        [ months ]      [ i64 ];
        [ days ]        [ i64 ];
        [ seconds ]     [ i64 ];
        [ nanoseconds ] [ i32 ];
    )]
    pub fn name(&self) -> type_ {
        self.name
    }
}

pub(crate) fn local_date_time_from_timestamp(secs: i64, nsecs: u32) -> Option<LocalDateTime> {
    chrono::DateTime::from_timestamp(secs, nsecs).map(|dt| dt.naive_utc())
}

/// Resolve a wall-clock date-time against a named time zone.
///
/// Local times around DST transitions are not unique: a fall-back transition
/// makes them ambiguous, a spring-forward transition skips them entirely. In
/// both cases a warning is emitted because no offset was supplied to pick the
/// intended instant.
///
/// For skipped local times the true offset is found iteratively: the
/// wall-clock is first treated as a UTC instant, the zone's offset at that
/// instant is measured, the instant is shifted back by that offset, and the
/// zone's offset at the shifted instant is measured again. The second probe
/// yields the offset in effect.
pub fn resolve_local_date_time(local: LocalDateTime, tz: Tz) -> DateTime {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earlier, _) => {
            warn!(
                "local date-time {local} is ambiguous in {tz} (DST fall-back); \
                 picking the earlier offset"
            );
            earlier
        }
        LocalResult::None => {
            let candidate = local.and_utc().naive_utc();
            let probe_1 = tz.offset_from_utc_datetime(&candidate).fix().local_minus_utc();
            let guess = candidate - chrono::Duration::seconds(probe_1.into());
            let probe_2 = tz.offset_from_utc_datetime(&guess).fix().local_minus_utc();
            let utc = local - chrono::Duration::seconds(probe_2.into());
            warn!(
                "local date-time {local} does not exist in {tz} (DST spring-forward); \
                 resolving with offset {probe_2}s"
            );
            tz.from_utc_datetime(&utc)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Timelike;

    #[test]
    fn test_duration_normalizes_nanoseconds() {
        let duration = Duration::new(0, 0, 1, 1_500_000_000).unwrap();
        assert_eq!(duration.seconds(), 2);
        assert_eq!(duration.nanoseconds(), 500_000_000);
    }

    #[test]
    fn test_duration_overflow() {
        assert!(Duration::new(i64::MAX, 0, 0, 0).is_none());
    }

    #[test]
    fn test_resolve_unique_local_date_time() {
        let local = Date::from_ymd_opt(2022, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let dt = resolve_local_date_time(local, chrono_tz::Europe::Berlin);
        assert_eq!(dt.naive_local(), local);
    }

    #[test]
    fn test_resolve_ambiguous_local_date_time_picks_earlier() {
        // 2022-10-30 02:30 happens twice in Berlin (fall-back at 03:00 CEST).
        let local = Date::from_ymd_opt(2022, 10, 30)
            .unwrap()
            .and_hms_opt(2, 30, 0)
            .unwrap();
        let dt = resolve_local_date_time(local, chrono_tz::Europe::Berlin);
        assert_eq!(dt.offset().fix().local_minus_utc(), 2 * 3600);
    }

    #[test]
    fn test_resolve_skipped_local_date_time() {
        // 2022-03-27 02:30 does not exist in Berlin (spring-forward at 02:00 CET).
        let local = Date::from_ymd_opt(2022, 3, 27)
            .unwrap()
            .and_hms_opt(2, 30, 0)
            .unwrap();
        let dt = resolve_local_date_time(local, chrono_tz::Europe::Berlin);
        assert_eq!(dt.naive_utc().hour(), 1);
        assert_eq!(dt.naive_utc().minute(), 30);
    }
}
