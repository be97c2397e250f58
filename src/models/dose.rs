//! Dose records — one scheduled administration event per time-of-day slot.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{DoseSource, DoseStatus, TimeSlot};
use crate::db::DatabaseError;

/// Minute-resolution wall-clock time, stored and displayed in its 12-hour
/// form (`"08:00 AM"`) the way patients entered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTime {
    hour: u8,
    minute: u8,
}

impl ClockTime {
    pub fn new(hour: u8, minute: u8) -> Result<Self, DatabaseError> {
        if hour > 23 || minute > 59 {
            return Err(DatabaseError::InvalidEnum {
                field: "target_time".into(),
                value: format!("{hour:02}:{minute:02}"),
            });
        }
        Ok(Self { hour, minute })
    }

    /// Parse the 12-hour display form, e.g. `"08:00 AM"` or `"02:30 PM"`.
    pub fn parse_12h(s: &str) -> Result<Self, DatabaseError> {
        let invalid = || DatabaseError::InvalidEnum {
            field: "target_time".into(),
            value: s.into(),
        };
        let (clock, meridian) = s.trim().split_once(' ').ok_or_else(invalid)?;
        let (h, m) = clock.split_once(':').ok_or_else(invalid)?;
        let hour12: u8 = h.parse().map_err(|_| invalid())?;
        let minute: u8 = m.parse().map_err(|_| invalid())?;
        if hour12 == 0 || hour12 > 12 {
            return Err(invalid());
        }
        let hour = match meridian {
            "AM" => hour12 % 12,
            "PM" => hour12 % 12 + 12,
            _ => return Err(invalid()),
        };
        Self::new(hour, minute)
    }

    /// Parse 24-hour input (`"14:30"`), the form the time-edit API accepts.
    pub fn parse_24h(s: &str) -> Result<Self, DatabaseError> {
        let invalid = || DatabaseError::InvalidEnum {
            field: "target_time".into(),
            value: s.into(),
        };
        let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
        let hour: u8 = h.parse().map_err(|_| invalid())?;
        let minute: u8 = m.parse().map_err(|_| invalid())?;
        Self::new(hour, minute)
    }

    /// This time on the given date.
    pub fn on(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(
            NaiveTime::from_hms_opt(self.hour.into(), self.minute.into(), 0)
                .unwrap_or_else(|| NaiveTime::from_hms_opt(0, 0, 0).unwrap()),
        )
    }

    /// The first occurrence at or after `now`: today if the minute has not
    /// passed yet, otherwise tomorrow.
    pub fn next_occurrence(&self, now: NaiveDateTime) -> NaiveDateTime {
        let today = self.on(now.date());
        // Same-minute is still "not passed": the poller fires within the minute.
        if today + chrono::Duration::minutes(1) > now {
            today
        } else {
            today + chrono::Duration::days(1)
        }
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }
}

impl std::fmt::Display for ClockTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hour12 = match self.hour % 12 {
            0 => 12,
            h => h,
        };
        let meridian = if self.hour >= 12 { "PM" } else { "AM" };
        write!(f, "{hour12:02}:{:02} {meridian}", self.minute)
    }
}

impl Serialize for ClockTime {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse_12h(&s).map_err(serde::de::Error::custom)
    }
}

/// One medication line inside a dose record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicationLine {
    pub name: String,
    /// Units taken per dose.
    pub qty: u32,
    /// Units remaining in the patient's possession. Never negative.
    pub stock: u32,
    /// Chronic medication, exempt from automatic discontinuation when the
    /// prescription's validity window ends.
    pub is_continuous: bool,
    /// One-shot latch: the low-stock notice already went out for this line.
    pub low_stock_notified: bool,
}

impl MedicationLine {
    /// Low-stock boundary: three doses' worth.
    pub fn low_stock_threshold(&self) -> u32 {
        self.qty * 3
    }
}

/// One scheduled administration event for one time-of-day slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoseRecord {
    pub id: Uuid,
    pub patient_phone: String,
    pub source: DoseSource,
    pub time_slot: TimeSlot,
    pub target_time: ClockTime,
    pub status: DoseStatus,
    /// 0 = untouched, 1 = first call, 2 = second call, 3 = caretaker notified.
    pub alert_level: u8,
    pub last_alert_at: Option<NaiveDateTime>,
    /// Next instant this record is eligible for an escalation action.
    /// Set at creation to the first occurrence of `target_time`, and at each
    /// transition to `now + wait_interval`.
    pub next_action_at: Option<NaiveDateTime>,
    /// Expected end of the prescription run. Cleared permanently once
    /// continuous medications are retained past it.
    pub next_visit_date: Option<NaiveDate>,
    /// One-shot latch for the pre-expiry renewal notice.
    pub renewal_notice_sent: bool,
    pub photo: Option<String>,
    /// Optimistic-concurrency counter, bumped on every write.
    pub version: i64,
    pub created_at: NaiveDateTime,
    pub medications: Vec<MedicationLine>,
}

impl DoseRecord {
    /// New pending record with the first-call window computed from `now`.
    pub fn new(
        patient_phone: String,
        source: DoseSource,
        time_slot: TimeSlot,
        target_time: ClockTime,
        medications: Vec<MedicationLine>,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            patient_phone,
            source,
            time_slot,
            target_time,
            status: DoseStatus::Pending,
            alert_level: 0,
            last_alert_at: None,
            next_action_at: Some(target_time.next_occurrence(now)),
            next_visit_date: None,
            renewal_notice_sent: false,
            photo: None,
            version: 0,
            created_at: now,
            medications,
        }
    }

    /// The medication list as spoken in reminder calls,
    /// e.g. `"1 Aspirin and 2 Metformin"`.
    pub fn spoken_medicines(&self) -> String {
        self.medications
            .iter()
            .map(|m| format!("{} {}", m.qty, m.name))
            .collect::<Vec<_>>()
            .join(" and ")
    }
}
