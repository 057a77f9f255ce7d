// ----------------------------------------------------------------------------
// Attendance projection.
//
// Walks the calendar from today to the end of the semester, adding up how
// many classes of each subject are still to come, then works out how many
// of those a student can miss and still finish at or above the threshold.
// ----------------------------------------------------------------------------

use crate::courses::CourseNames;
use crate::error::{PortalError, Result};
use crate::timetable::{Timetable, WeeklySchedule};

use ::serde::*;
use chrono::*;
use indexmap::IndexMap;
use log::*;
use std::collections::BTreeSet;

/// Fraction of all classes that must be attended
pub const ATTENDANCE_THRESHOLD: f64 = 0.75;

/// Monday..Friday. Weekday indices at or above this never hold classes.
pub const WORKING_DAYS_PER_WEEK: usize = 5;

pub type HolidaySet = BTreeSet<NaiveDate>;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectionPolicy {
    pub threshold: f64,
    pub working_days: usize,
}

impl Default for ProjectionPolicy {
    fn default() -> Self {
        Self {
            threshold: ATTENDANCE_THRESHOLD,
            working_days: WORKING_DAYS_PER_WEEK,
        }
    }
}

/// What the portal knows about one subject so far.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttendanceReport {
    Recorded { held: u32, attended: u32 },
    /// The portal page had no usable attendance table
    Unavailable,
}

impl AttendanceReport {
    /// (held, attended), with an unavailable report counting as no classes yet.
    pub fn counts(&self) -> (u32, u32) {
        match *self {
            AttendanceReport::Recorded { held, attended } => (held, attended),
            AttendanceReport::Unavailable => (0, 0),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, AttendanceReport::Recorded { .. })
    }
}

/// Anything that can tell us held/attended counts for a subject code.
#[allow(async_fn_in_trait)]
pub trait AttendanceSource {
    async fn fetch_attendance(&self, subject_code: &str) -> std::result::Result<AttendanceReport, PortalError>;
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SubjectRecord {
    pub code: String,
    pub name: String,
    pub held: u32,
    pub attended: u32,
    pub future: u32,
    pub skippable: u32,
    pub attendance_available: bool,
}

impl SubjectRecord {
    /// Attended as a percentage of held, or None before any class was held.
    pub fn attendance_percentage(&self) -> Option<f64> {
        if self.held == 0 {
            return None;
        }

        Some(self.attended as f64 / self.held as f64 * 100.0)
    }
}

/// Counts the classes of each subject from `today` to `sem_end` inclusive.
///
/// Subjects come out in the order they were first met on the walk. Days past
/// the working week, holidays, and weekdays the schedule has no entry for
/// contribute nothing.
pub fn project_future_classes(
    today: NaiveDate,
    sem_end: NaiveDate,
    schedule: &WeeklySchedule,
    holidays: &HolidaySet,
    policy: &ProjectionPolicy,
) -> IndexMap<String, u32> {
    let mut future_counts: IndexMap<String, u32> = IndexMap::new();

    for current in today.iter_days().take_while(|d| *d <= sem_end) {
        let weekday = current.weekday().num_days_from_monday() as usize;

        if weekday >= policy.working_days || holidays.contains(&current) {
            continue;
        }

        let day = match schedule.get(weekday) {
            Some(day) => day,
            None => continue,
        };

        for (subject, count) in day {
            *future_counts.entry(subject.clone()).or_insert(0) += count;
        }
    }

    future_counts
}

/// Every subject on a working day of the schedule, with no classes to come.
///
/// Used once the semester window has closed, so the report still shows
/// where each subject stands.
pub fn scheduled_subjects(schedule: &WeeklySchedule, policy: &ProjectionPolicy) -> IndexMap<String, u32> {
    schedule
        .iter()
        .take(policy.working_days)
        .flat_map(|day| day.keys())
        .map(|subject| (subject.clone(), 0))
        .collect()
}

/// How many upcoming classes can be missed while still ending the semester
/// at `threshold` of all classes held.
pub fn skippable(held: u32, attended: u32, future: u32, threshold: f64) -> u32 {
    let total_projected = held as f64 + future as f64;
    let required = threshold * total_projected;
    let slack = attended as f64 + future as f64 - required;

    if slack <= 0.0 {
        0
    } else {
        slack.floor() as u32
    }
}

/// Builds one record per subject the batch still has classes for.
///
/// Attendance is fetched one subject at a time in walk order. Once `today`
/// is past `sem_end` every subject scheduled on a working day is reported
/// with no future classes, so the current budget can still be checked. A
/// window that is still open but holds no working day (a weekend, or only
/// holidays) meets no subject on the walk and reports nothing.
///
/// An unknown batch fails before anything is fetched, and a subject without
/// a course name fails before its attendance is requested.
#[allow(clippy::too_many_arguments)]
pub async fn calculate_skippable<S: AttendanceSource>(
    batch: &str,
    today: NaiveDate,
    sem_end: NaiveDate,
    timetable: &Timetable,
    holidays: &HolidaySet,
    source: &S,
    names: &CourseNames,
    policy: &ProjectionPolicy,
) -> Result<Vec<SubjectRecord>> {
    let schedule = timetable.schedule_for(batch)?;

    let future_counts = if today > sem_end {
        info!("Semester ended on {}, checking current attendance only", sem_end);
        scheduled_subjects(schedule, policy)
    } else {
        project_future_classes(today, sem_end, schedule, holidays, policy)
    };

    debug!(
        "{} subject(s) with classes between {} and {}",
        future_counts.len(),
        today,
        sem_end
    );

    let mut results = Vec::with_capacity(future_counts.len());

    for (code, future) in future_counts {
        let name = names.name_of(&code)?.to_string();

        let report = source.fetch_attendance(&code).await?;

        if !report.is_available() {
            warn!("No attendance table for {}, counting it as 0/0", code);
        }

        let (held, attended) = report.counts();

        if attended > held {
            warn!("Portal reports {} attended out of {} held for {}", attended, held, code);
        }

        results.push(SubjectRecord {
            skippable: skippable(held, attended, future, policy.threshold),
            code,
            name,
            held,
            attended,
            future,
            attendance_available: report.is_available(),
        });
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, LookupError, SkipError};
    use crate::timetable::DaySchedule;
    use proptest::prelude::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // 2025-11-03 is a Monday
    fn monday() -> NaiveDate {
        date(2025, 11, 3)
    }

    fn day(entries: &[(&str, u32)]) -> DaySchedule {
        entries.iter().map(|(s, c)| (s.to_string(), *c)).collect()
    }

    fn full_week() -> WeeklySchedule {
        vec![
            day(&[("SUB1", 2), ("SUB2", 1)]),
            day(&[("SUB3", 1)]),
            day(&[("SUB1", 1)]),
            day(&[("SUB2", 2)]),
            day(&[("SUB3", 1), ("SUB1", 1)]),
            day(&[("SUB1", 5)]),
            day(&[("SUB2", 5)]),
        ]
    }

    fn counts(entries: &[(&str, u32)]) -> IndexMap<String, u32> {
        entries.iter().map(|(s, c)| (s.to_string(), *c)).collect()
    }

    /// Records every code it is asked for.
    struct FakePortal {
        reports: HashMap<String, AttendanceReport>,
        asked: RefCell<Vec<String>>,
    }

    impl FakePortal {
        fn new(entries: &[(&str, u32, u32)]) -> Self {
            let reports = entries
                .iter()
                .map(|(code, held, attended)| {
                    (
                        code.to_string(),
                        AttendanceReport::Recorded {
                            held: *held,
                            attended: *attended,
                        },
                    )
                })
                .collect();

            Self {
                reports,
                asked: RefCell::new(Vec::new()),
            }
        }
    }

    impl AttendanceSource for FakePortal {
        async fn fetch_attendance(
            &self,
            subject_code: &str,
        ) -> std::result::Result<AttendanceReport, PortalError> {
            self.asked.borrow_mut().push(subject_code.to_string());

            Ok(self
                .reports
                .get(subject_code)
                .copied()
                .unwrap_or(AttendanceReport::Unavailable))
        }
    }

    struct FailingPortal;

    impl AttendanceSource for FailingPortal {
        async fn fetch_attendance(&self, _: &str) -> std::result::Result<AttendanceReport, PortalError> {
            Err(PortalError::BatchInfoMissing)
        }
    }

    fn names() -> CourseNames {
        let pairs = [("SUB1", "SUBJECT ONE"), ("SUB2", "SUBJECT TWO"), ("SUB3", "SUBJECT THREE")]
            .iter()
            .map(|(c, n)| (c.to_string(), n.to_string()))
            .collect();

        CourseNames::new(&pairs).unwrap()
    }

    fn timetable() -> Timetable {
        let mut batches = IndexMap::new();
        batches.insert("B12".to_string(), full_week());
        Timetable::new(batches).unwrap()
    }

    #[test]
    fn single_monday_window() {
        let result = project_future_classes(
            monday(),
            monday(),
            &full_week(),
            &HolidaySet::new(),
            &ProjectionPolicy::default(),
        );

        assert_eq!(result, counts(&[("SUB1", 2), ("SUB2", 1)]));
    }

    #[test]
    fn holiday_on_the_only_day_yields_nothing() {
        let holidays: HolidaySet = [monday()].into_iter().collect();

        let result = project_future_classes(
            monday(),
            monday(),
            &full_week(),
            &holidays,
            &ProjectionPolicy::default(),
        );

        assert!(result.is_empty());
    }

    #[test]
    fn weekends_never_count() {
        let saturday = date(2025, 11, 8);
        let sunday = date(2025, 11, 9);

        let result = project_future_classes(
            saturday,
            sunday,
            &full_week(),
            &HolidaySet::new(),
            &ProjectionPolicy::default(),
        );

        assert!(result.is_empty());
    }

    #[test]
    fn full_week_totals_in_first_seen_order() {
        let result = project_future_classes(
            monday(),
            date(2025, 11, 9),
            &full_week(),
            &HolidaySet::new(),
            &ProjectionPolicy::default(),
        );

        assert_eq!(result, counts(&[("SUB1", 4), ("SUB2", 3), ("SUB3", 2)]));
        assert_eq!(result.keys().collect::<Vec<_>>(), vec!["SUB1", "SUB2", "SUB3"]);
    }

    #[test]
    fn holiday_midweek_removes_that_day_only() {
        // Tuesday 2025-11-04 holds the only SUB3 class before Friday
        let holidays: HolidaySet = [date(2025, 11, 4)].into_iter().collect();

        let result = project_future_classes(
            monday(),
            date(2025, 11, 9),
            &full_week(),
            &holidays,
            &ProjectionPolicy::default(),
        );

        assert_eq!(result, counts(&[("SUB1", 4), ("SUB2", 3), ("SUB3", 1)]));
    }

    #[test]
    fn empty_window_when_today_is_after_semester_end() {
        let result = project_future_classes(
            date(2025, 12, 1),
            date(2025, 11, 21),
            &full_week(),
            &HolidaySet::new(),
            &ProjectionPolicy::default(),
        );

        assert!(result.is_empty());
    }

    #[test]
    fn short_schedule_skips_missing_weekdays() {
        let week = vec![day(&[("SUB1", 1)]), day(&[("SUB2", 1)])];

        let result = project_future_classes(
            monday(),
            date(2025, 11, 14),
            &week,
            &HolidaySet::new(),
            &ProjectionPolicy::default(),
        );

        assert_eq!(result, counts(&[("SUB1", 2), ("SUB2", 2)]));
    }

    #[test]
    fn policy_can_open_saturdays() {
        let policy = ProjectionPolicy {
            threshold: ATTENDANCE_THRESHOLD,
            working_days: 6,
        };

        let result = project_future_classes(
            date(2025, 11, 8),
            date(2025, 11, 9),
            &full_week(),
            &HolidaySet::new(),
            &policy,
        );

        assert_eq!(result, counts(&[("SUB1", 5)]));
    }

    #[test]
    fn skippable_with_lookahead() {
        // 30 projected, 22.5 required, 3.5 spare
        assert_eq!(skippable(20, 16, 10, ATTENDANCE_THRESHOLD), 3);
    }

    #[test]
    fn skippable_without_lookahead() {
        assert_eq!(skippable(10, 10, 0, ATTENDANCE_THRESHOLD), 2);
    }

    #[test]
    fn skippable_is_zero_exactly_at_requirement() {
        // 12 + 0 == 0.75 * 16
        assert_eq!(skippable(16, 12, 0, ATTENDANCE_THRESHOLD), 0);
        // 14 + 10 == 0.75 * (22 + 10)
        assert_eq!(skippable(22, 14, 10, ATTENDANCE_THRESHOLD), 0);
        // already behind
        assert_eq!(skippable(12, 5, 4, ATTENDANCE_THRESHOLD), 0);
    }

    #[test]
    fn skippable_with_nothing_held() {
        assert_eq!(skippable(0, 0, 8, ATTENDANCE_THRESHOLD), 2);
        assert_eq!(skippable(0, 0, 0, ATTENDANCE_THRESHOLD), 0);
    }

    #[test]
    fn skippable_honours_custom_threshold() {
        assert_eq!(skippable(20, 16, 10, 0.5), 11);
        assert_eq!(skippable(20, 16, 10, 1.0), 0);
    }

    #[test]
    fn percentage_is_undefined_without_held_classes() {
        let record = SubjectRecord {
            code: "SUB1".to_string(),
            name: "SUBJECT ONE".to_string(),
            held: 0,
            attended: 0,
            future: 4,
            skippable: 1,
            attendance_available: false,
        };

        assert_eq!(record.attendance_percentage(), None);

        let record = SubjectRecord {
            held: 8,
            attended: 6,
            ..record
        };
        assert_eq!(record.attendance_percentage(), Some(75.0));
    }

    #[tokio::test]
    async fn builds_records_in_walk_order() {
        let portal = FakePortal::new(&[("SUB1", 20, 16), ("SUB2", 10, 10), ("SUB3", 4, 1)]);

        let records = calculate_skippable(
            "B12",
            monday(),
            date(2025, 11, 9),
            &timetable(),
            &HolidaySet::new(),
            &portal,
            &names(),
            &ProjectionPolicy::default(),
        )
        .await
        .unwrap();

        assert_eq!(*portal.asked.borrow(), vec!["SUB1", "SUB2", "SUB3"]);

        let summary: Vec<(&str, u32, u32)> = records
            .iter()
            .map(|r| (r.name.as_str(), r.future, r.skippable))
            .collect();

        assert_eq!(
            summary,
            vec![
                // 16 + 4 - 0.75 * 24 = 2
                ("SUBJECT ONE", 4, 2),
                // 10 + 3 - 0.75 * 13 = 3.25
                ("SUBJECT TWO", 3, 3),
                // 1 + 2 - 0.75 * 6 < 0
                ("SUBJECT THREE", 2, 0),
            ]
        );
    }

    #[tokio::test]
    async fn unavailable_attendance_counts_as_zero() {
        let portal = FakePortal::new(&[]);

        let records = calculate_skippable(
            "B12",
            monday(),
            monday(),
            &timetable(),
            &HolidaySet::new(),
            &portal,
            &names(),
            &ProjectionPolicy::default(),
        )
        .await
        .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!((records[0].held, records[0].attended, records[0].future), (0, 0, 2));
        assert!(!records[0].attendance_available);
        assert_eq!(records[0].skippable, 0);
    }

    #[tokio::test]
    async fn unknown_batch_fails_before_fetching() {
        let portal = FakePortal::new(&[("SUB1", 1, 1)]);

        let err = calculate_skippable(
            "B99",
            monday(),
            date(2025, 11, 21),
            &timetable(),
            &HolidaySet::new(),
            &portal,
            &names(),
            &ProjectionPolicy::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SkipError::Config(ConfigError::UnknownBatch(ref b)) if b == "B99"));
        assert!(portal.asked.borrow().is_empty());
    }

    #[tokio::test]
    async fn unnamed_subject_is_a_lookup_error() {
        let mut batches = IndexMap::new();
        batches.insert("B1".to_string(), vec![day(&[("SUB1", 1), ("MYSTERY", 1)])]);
        let timetable = Timetable::new(batches).unwrap();
        let portal = FakePortal::new(&[("SUB1", 4, 4)]);

        let err = calculate_skippable(
            "B1",
            monday(),
            monday(),
            &timetable,
            &HolidaySet::new(),
            &portal,
            &names(),
            &ProjectionPolicy::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            SkipError::Lookup(LookupError::UnknownSubject(ref c)) if c == "MYSTERY"
        ));
        assert_eq!(*portal.asked.borrow(), vec!["SUB1"]);
    }

    #[tokio::test]
    async fn fetch_errors_propagate() {
        let err = calculate_skippable(
            "B12",
            monday(),
            monday(),
            &timetable(),
            &HolidaySet::new(),
            &FailingPortal,
            &names(),
            &ProjectionPolicy::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SkipError::Portal(PortalError::BatchInfoMissing)));
    }

    #[tokio::test]
    async fn past_semester_end_gives_a_budget_check() {
        let portal = FakePortal::new(&[("SUB1", 10, 10)]);

        let records = calculate_skippable(
            "B12",
            date(2025, 12, 1),
            date(2025, 11, 21),
            &timetable(),
            &HolidaySet::new(),
            &portal,
            &names(),
            &ProjectionPolicy::default(),
        )
        .await
        .unwrap();

        assert_eq!(*portal.asked.borrow(), vec!["SUB1", "SUB2", "SUB3"]);
        assert!(records.iter().all(|r| r.future == 0));

        // 10 - 0.75 * 10 = 2.5
        assert_eq!(records[0].skippable, 2);
        assert_eq!(records[1].skippable, 0);
    }

    #[tokio::test]
    async fn open_window_without_working_days_reports_nothing() {
        let portal = FakePortal::new(&[("SUB1", 10, 10)]);

        // Saturday 2025-11-08 to Sunday 2025-11-09
        let records = calculate_skippable(
            "B12",
            date(2025, 11, 8),
            date(2025, 11, 9),
            &timetable(),
            &HolidaySet::new(),
            &portal,
            &names(),
            &ProjectionPolicy::default(),
        )
        .await
        .unwrap();

        assert!(records.is_empty());
        assert!(portal.asked.borrow().is_empty());
    }

    #[test]
    fn scheduled_subjects_ignore_weekend_entries() {
        let result = scheduled_subjects(&full_week(), &ProjectionPolicy::default());

        assert_eq!(result, counts(&[("SUB1", 0), ("SUB2", 0), ("SUB3", 0)]));

        let weekend_only = vec![day(&[]), day(&[]), day(&[]), day(&[]), day(&[]), day(&[("SUB9", 3)])];
        assert!(scheduled_subjects(&weekend_only, &ProjectionPolicy::default()).is_empty());
    }

    fn arb_week() -> impl Strategy<Value = WeeklySchedule> {
        prop::collection::vec(
            prop::collection::vec((0usize..4, 0u32..4), 0..4).prop_map(|entries| {
                let mut day = DaySchedule::new();
                for (subject, count) in entries {
                    *day.entry(format!("SUB{}", subject)).or_insert(0) += count;
                }
                day
            }),
            0..=7,
        )
    }

    proptest! {
        #[test]
        fn weekend_days_contribute_nothing(week in arb_week(), weeks in 0i64..6) {
            // Saturday 2025-11-08 onwards, only weekend days
            let first = date(2025, 11, 8) + Duration::weeks(weeks);
            let result = project_future_classes(
                first,
                first + Duration::days(1),
                &week,
                &HolidaySet::new(),
                &ProjectionPolicy::default(),
            );
            prop_assert!(result.is_empty());
        }

        #[test]
        fn holidays_contribute_nothing(week in arb_week(), offset in 0i64..5) {
            let d = monday() + Duration::days(offset);
            let holidays: HolidaySet = [d].into_iter().collect();
            let result = project_future_classes(d, d, &week, &holidays, &ProjectionPolicy::default());
            prop_assert!(result.is_empty());
        }

        #[test]
        fn inverted_window_is_empty(week in arb_week(), gap in 1i64..400) {
            let end = date(2025, 11, 21);
            let result = project_future_classes(
                end + Duration::days(gap),
                end,
                &week,
                &HolidaySet::new(),
                &ProjectionPolicy::default(),
            );
            prop_assert!(result.is_empty());
        }

        #[test]
        fn attending_more_never_lowers_the_budget(
            held in 0u32..500,
            attended in 0u32..500,
            extra in 0u32..50,
            future in 0u32..200,
        ) {
            let attended = attended.min(held);
            let more = (attended + extra).min(held);
            prop_assert!(
                skippable(held, more, future, ATTENDANCE_THRESHOLD)
                    >= skippable(held, attended, future, ATTENDANCE_THRESHOLD)
            );
        }

        #[test]
        fn budget_never_exceeds_future_classes_when_behind(
            held in 1u32..500,
            future in 0u32..200,
        ) {
            // nothing attended yet: at most a quarter of what is left can go
            prop_assert!(skippable(held, 0, future, ATTENDANCE_THRESHOLD) <= future / 4);
        }
    }
}
