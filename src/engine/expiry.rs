//! Prescription expiry evaluation.
//!
//! Runs at the start of each poller pass over a record, before any
//! escalation logic. A passed `next_visit_date` either terminates the
//! record (nothing chronic left) or strips it down to its continuous
//! medications and lets it run indefinitely.

use chrono::NaiveDate;

use crate::models::DoseRecord;

/// What the expiry pass should do with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryAction {
    /// No visit date, or it has not passed yet.
    Keep,
    /// Date passed and no continuous medications remain: terminal.
    Expire,
    /// Date passed but chronic medications must keep running: drop the
    /// others, clear the date, continue escalating.
    RetainContinuous,
}

pub fn assess(dose: &DoseRecord, today: NaiveDate) -> ExpiryAction {
    let Some(visit) = dose.next_visit_date else {
        return ExpiryAction::Keep;
    };
    if visit >= today {
        return ExpiryAction::Keep;
    }
    if dose.medications.iter().any(|m| m.is_continuous) {
        ExpiryAction::RetainContinuous
    } else {
        ExpiryAction::Expire
    }
}

/// Whether the one-time "renew prescription" notice is due: exactly two
/// days before the visit date, not yet latched.
pub fn renewal_due(dose: &DoseRecord, today: NaiveDate) -> bool {
    match dose.next_visit_date {
        Some(visit) => !dose.renewal_notice_sent && (visit - today).num_days() == 2,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    use crate::models::{ClockTime, DoseRecord, DoseSource, MedicationLine, TimeSlot};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    fn dose_with(visit: Option<NaiveDate>, continuous: &[bool]) -> DoseRecord {
        let now: NaiveDateTime = day(1).and_hms_opt(6, 0, 0).unwrap();
        let medications = continuous
            .iter()
            .enumerate()
            .map(|(i, &c)| MedicationLine {
                name: format!("Med{i}"),
                qty: 1,
                stock: 10,
                is_continuous: c,
                low_stock_notified: false,
            })
            .collect();
        let mut dose = DoseRecord::new(
            "9000000001".into(),
            DoseSource::Manual,
            TimeSlot::Morning,
            ClockTime::parse_12h("08:00 AM").unwrap(),
            medications,
            now,
        );
        dose.next_visit_date = visit;
        dose
    }

    #[test]
    fn no_visit_date_keeps_running() {
        assert_eq!(assess(&dose_with(None, &[false]), day(10)), ExpiryAction::Keep);
    }

    #[test]
    fn future_or_today_visit_date_keeps_running() {
        assert_eq!(
            assess(&dose_with(Some(day(11)), &[false]), day(10)),
            ExpiryAction::Keep
        );
        // Expiry is strict: the visit day itself still runs.
        assert_eq!(
            assess(&dose_with(Some(day(10)), &[false]), day(10)),
            ExpiryAction::Keep
        );
    }

    #[test]
    fn passed_date_without_continuous_expires() {
        assert_eq!(
            assess(&dose_with(Some(day(9)), &[false, false]), day(10)),
            ExpiryAction::Expire
        );
    }

    #[test]
    fn passed_date_with_continuous_retains() {
        assert_eq!(
            assess(&dose_with(Some(day(9)), &[false, true]), day(10)),
            ExpiryAction::RetainContinuous
        );
    }

    #[test]
    fn empty_medication_list_expires() {
        assert_eq!(
            assess(&dose_with(Some(day(9)), &[]), day(10)),
            ExpiryAction::Expire
        );
    }

    #[test]
    fn renewal_due_exactly_two_days_out() {
        assert!(renewal_due(&dose_with(Some(day(12)), &[false]), day(10)));
        assert!(!renewal_due(&dose_with(Some(day(13)), &[false]), day(10)));
        assert!(!renewal_due(&dose_with(Some(day(11)), &[false]), day(10)));
        assert!(!renewal_due(&dose_with(None, &[false]), day(10)));
    }

    #[test]
    fn renewal_latch_suppresses_repeat() {
        let mut dose = dose_with(Some(day(12)), &[false]);
        dose.renewal_notice_sent = true;
        assert!(!renewal_due(&dose, day(10)));
    }
}
