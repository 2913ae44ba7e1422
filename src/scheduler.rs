use std::fmt;

use chrono::{DateTime, NaiveTime, Timelike, Utc};

use crate::traits::{CareStore, DoseLog, PrescriptionPlan};

/// Symmetric tolerance around a scheduled dose time, in minutes.
pub const DOSE_WINDOW_MINUTES: i64 = 5;

/// Today's dose standing for a single plan at a given instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DoseStatus {
    /// Within the tolerance window of `slot` and that slot is not yet logged.
    Due { slot: NaiveTime },
    /// Next scheduled time not yet reached (tomorrow's first slot when all of
    /// today's have passed).
    Upcoming { next: NaiveTime },
    /// Today's required count is already logged.
    Satisfied,
    /// The plan's validity window has ended.
    PlanExpired,
}

/// Malformed schedule data. Raised at plan creation — the scheduler itself
/// never sees invalid schedules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    BadDoseCount(i32),
    BadTime(String),
    EmptyTimes,
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleError::BadDoseCount(n) => {
                write!(f, "times_per_day must be at least 1 (got {})", n)
            }
            ScheduleError::BadTime(t) => write!(f, "invalid dose time '{}' (expected HH:MM)", t),
            ScheduleError::EmptyTimes => write!(f, "dose time list is empty"),
        }
    }
}

impl std::error::Error for ScheduleError {}

/// Parse a comma-separated "HH:MM" list, strictly. Used at plan creation to
/// reject malformed schedules before they are ever stored.
pub fn parse_dose_times(csv: &str) -> Result<Vec<NaiveTime>, ScheduleError> {
    let mut out = Vec::new();
    for raw in csv.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let t = NaiveTime::parse_from_str(raw, "%H:%M")
            .map_err(|_| ScheduleError::BadTime(raw.to_string()))?;
        out.push(t);
    }
    if out.is_empty() {
        return Err(ScheduleError::EmptyTimes);
    }
    out.sort();
    Ok(out)
}

/// The plan's dose slots for one day, sorted. Explicit times when set,
/// otherwise the day divided evenly by `times_per_day`.
pub fn dose_slots(plan: &PrescriptionPlan) -> Vec<NaiveTime> {
    if let Some(csv) = plan.dose_times.as_deref() {
        // Validated at creation; tolerate stray entries anyway.
        let mut slots: Vec<NaiveTime> = csv
            .split(',')
            .filter_map(|t| NaiveTime::parse_from_str(t.trim(), "%H:%M").ok())
            .collect();
        slots.sort();
        if !slots.is_empty() {
            return slots;
        }
    }

    if plan.times_per_day <= 0 {
        return Vec::new();
    }
    let minutes_per = (24 * 60) / plan.times_per_day as u32;
    (0..plan.times_per_day as u32)
        .filter_map(|i| NaiveTime::from_hms_opt((minutes_per * i) / 60, (minutes_per * i) % 60, 0))
        .collect()
}

/// Index of the slot whose tolerance window contains `now`, if any.
pub fn match_slot(slots: &[NaiveTime], now: NaiveTime) -> Option<i32> {
    let now_min = (now.hour() * 60 + now.minute()) as i64;
    slots.iter().position(|slot| {
        let slot_min = (slot.hour() * 60 + slot.minute()) as i64;
        (slot_min - now_min).abs() <= DOSE_WINDOW_MINUTES
    }).map(|i| i as i32)
}

/// Whether the plan's validity window has ended at `now`.
pub fn plan_expired(plan: &PrescriptionPlan, now: DateTime<Utc>) -> bool {
    plan.window_end.is_some_and(|end| end < now)
}

/// Compute the plan's dose status for the calendar day containing `now`.
///
/// Deterministic and side-effect free. A dose logged outside any window
/// counts toward today's total (no double jeopardy for late logging) but
/// never satisfies a different slot, and never a different day's slot.
pub fn dose_status(plan: &PrescriptionPlan, today_logs: &[DoseLog], now: DateTime<Utc>) -> DoseStatus {
    if plan_expired(plan, now) {
        return DoseStatus::PlanExpired;
    }

    let slots = dose_slots(plan);
    if today_logs.len() as i32 >= plan.times_per_day {
        return DoseStatus::Satisfied;
    }

    let now_time = now.time();
    if let Some(idx) = match_slot(&slots, now_time) {
        let slot_logged = today_logs.iter().any(|l| l.slot == Some(idx));
        if !slot_logged {
            return DoseStatus::Due { slot: slots[idx as usize] };
        }
    }

    let next = slots
        .iter()
        .find(|s| **s > now_time)
        .or_else(|| slots.first())
        .copied()
        .unwrap_or(NaiveTime::MIN);
    DoseStatus::Upcoming { next }
}

/// Friendly reminder line for a due dose, surfaced into the turn context.
pub fn due_reminder(plan: &PrescriptionPlan, slot: NaiveTime) -> String {
    let mut line = format!(
        "{}: medication time window right now (~{})",
        plan.name,
        slot.format("%H:%M")
    );
    if let Some(instructions) = plan.instructions.as_deref() {
        line.push_str(&format!(" ({})", instructions));
    }
    line
}

/// The expiry pass: deactivate every plan of `person_id` whose window end has
/// passed. This is the only place that mutates a plan's `active` flag, and it
/// runs before active plans are surfaced to any reader. Idempotent.
pub async fn expire_plans(
    store: &dyn CareStore,
    person_id: i64,
    now: DateTime<Utc>,
) -> anyhow::Result<u64> {
    let changed = store.deactivate_expired_plans(person_id, now).await?;
    if changed > 0 {
        tracing::info!(person_id, changed, "Deactivated expired prescription plans");
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn plan(times_per_day: i32, dose_times: Option<&str>) -> PrescriptionPlan {
        PrescriptionPlan {
            id: 1,
            person_id: 1,
            name: "Aspirin".to_string(),
            times_per_day,
            dose_times: dose_times.map(|s| s.to_string()),
            instructions: None,
            active: true,
            window_start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            window_end: None,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn log(slot: Option<i32>) -> DoseLog {
        DoseLog {
            id: 0,
            plan_id: 1,
            taken_at: Utc::now(),
            slot,
        }
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, h, m, 0).unwrap()
    }

    #[test]
    fn test_parse_dose_times() {
        let times = parse_dose_times("09:00,14:00,20:00").unwrap();
        assert_eq!(times.len(), 3);
        assert_eq!(times[0], NaiveTime::from_hms_opt(9, 0, 0).unwrap());

        assert!(matches!(
            parse_dose_times("09:00,25:99"),
            Err(ScheduleError::BadTime(_))
        ));
        assert!(matches!(parse_dose_times("  ,  "), Err(ScheduleError::EmptyTimes)));
    }

    #[test]
    fn test_parse_dose_times_sorts() {
        let times = parse_dose_times("20:00, 08:00").unwrap();
        assert_eq!(times[0], NaiveTime::from_hms_opt(8, 0, 0).unwrap());
    }

    #[test]
    fn test_even_slots() {
        let slots = dose_slots(&plan(3, None));
        assert_eq!(
            slots,
            vec![
                NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            ]
        );
    }

    #[test]
    fn test_due_within_window() {
        let p = plan(1, Some("08:00"));
        match dose_status(&p, &[], at(8, 3)) {
            DoseStatus::Due { slot } => {
                assert_eq!(slot, NaiveTime::from_hms_opt(8, 0, 0).unwrap())
            }
            other => panic!("expected Due, got {:?}", other),
        }
        // Window is symmetric: 07:55 is also due.
        assert!(matches!(dose_status(&p, &[], at(7, 55)), DoseStatus::Due { .. }));
        // 08:06 is outside the ±5 minute window.
        assert!(matches!(
            dose_status(&p, &[], at(8, 6)),
            DoseStatus::Upcoming { .. }
        ));
    }

    #[test]
    fn test_logged_slot_not_due_again() {
        let p = plan(2, Some("08:00,20:00"));
        // Slot 0 already logged; 08:02 is no longer due.
        let status = dose_status(&p, &[log(Some(0))], at(8, 2));
        match status {
            DoseStatus::Upcoming { next } => {
                assert_eq!(next, NaiveTime::from_hms_opt(20, 0, 0).unwrap())
            }
            other => panic!("expected Upcoming, got {:?}", other),
        }
    }

    #[test]
    fn test_out_of_window_log_counts_toward_total() {
        let p = plan(1, Some("08:00"));
        // A late dose (slot None) still satisfies the daily count...
        assert_eq!(dose_status(&p, &[log(None)], at(12, 0)), DoseStatus::Satisfied);
        // ...but does not retroactively claim a specific slot: with two slots
        // and one unslotted log, the 20:00 window still comes due.
        let p2 = plan(2, Some("08:00,20:00"));
        assert!(matches!(
            dose_status(&p2, &[log(None)], at(20, 1)),
            DoseStatus::Due { .. }
        ));
    }

    #[test]
    fn test_expired_plan() {
        let mut p = plan(1, Some("08:00"));
        p.window_end = Some(at(0, 0) - chrono::Duration::days(1));
        assert_eq!(dose_status(&p, &[], at(8, 0)), DoseStatus::PlanExpired);
    }

    #[test]
    fn test_satisfied() {
        let p = plan(2, Some("08:00,20:00"));
        let logs = vec![log(Some(0)), log(Some(1))];
        assert_eq!(dose_status(&p, &logs, at(21, 0)), DoseStatus::Satisfied);
    }

    #[test]
    fn test_match_slot() {
        let slots = parse_dose_times("08:00,20:00").unwrap();
        assert_eq!(match_slot(&slots, NaiveTime::from_hms_opt(8, 4, 0).unwrap()), Some(0));
        assert_eq!(match_slot(&slots, NaiveTime::from_hms_opt(19, 56, 0).unwrap()), Some(1));
        assert_eq!(match_slot(&slots, NaiveTime::from_hms_opt(12, 0, 0).unwrap()), None);
    }

    #[test]
    fn test_due_reminder_includes_instructions() {
        let mut p = plan(1, Some("08:00"));
        p.instructions = Some("with food".to_string());
        let line = due_reminder(&p, NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        assert!(line.contains("Aspirin"));
        assert!(line.contains("with food"));
    }
}
