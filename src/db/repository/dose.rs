//! Dose record persistence.
//!
//! Every mutation of a pending record is a compare-and-swap: the UPDATE is
//! keyed on `(id, version)` (or on `status = 'pending'` for the taken
//! transition) and bumps `version`. A `false` return means another writer
//! got there first; the poller and the confirmation callbacks race by
//! design, and the taken transition must always win.

use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::super::DatabaseError;
use crate::models::{ClockTime, DoseRecord, DoseSource, DoseStatus, MedicationLine, TimeSlot};

struct DoseRow {
    id: String,
    patient_phone: String,
    source: String,
    time_slot: String,
    target_time: String,
    status: String,
    alert_level: i64,
    last_alert_at: Option<NaiveDateTime>,
    next_action_at: Option<NaiveDateTime>,
    next_visit_date: Option<NaiveDate>,
    renewal_notice_sent: bool,
    photo: Option<String>,
    version: i64,
    created_at: NaiveDateTime,
}

const DOSE_COLUMNS: &str = "id, patient_phone, source, time_slot, target_time, status, \
     alert_level, last_alert_at, next_action_at, next_visit_date, \
     renewal_notice_sent, photo, version, created_at";

impl DoseRow {
    fn from_sql_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            patient_phone: row.get(1)?,
            source: row.get(2)?,
            time_slot: row.get(3)?,
            target_time: row.get(4)?,
            status: row.get(5)?,
            alert_level: row.get(6)?,
            last_alert_at: row.get(7)?,
            next_action_at: row.get(8)?,
            next_visit_date: row.get(9)?,
            renewal_notice_sent: row.get(10)?,
            photo: row.get(11)?,
            version: row.get(12)?,
            created_at: row.get(13)?,
        })
    }

    fn into_record(self, medications: Vec<MedicationLine>) -> Result<DoseRecord, DatabaseError> {
        Ok(DoseRecord {
            id: Uuid::parse_str(&self.id).map_err(|_| DatabaseError::InvalidEnum {
                field: "id".into(),
                value: self.id.clone(),
            })?,
            patient_phone: self.patient_phone,
            source: DoseSource::from_str(&self.source)?,
            time_slot: TimeSlot::from_str(&self.time_slot)?,
            target_time: ClockTime::parse_12h(&self.target_time)?,
            status: DoseStatus::from_str(&self.status)?,
            alert_level: self.alert_level as u8,
            last_alert_at: self.last_alert_at,
            next_action_at: self.next_action_at,
            next_visit_date: self.next_visit_date,
            renewal_notice_sent: self.renewal_notice_sent,
            photo: self.photo,
            version: self.version,
            created_at: self.created_at,
            medications,
        })
    }
}

pub fn insert_dose(conn: &Connection, dose: &DoseRecord) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO doses (id, patient_phone, source, time_slot, target_time, status,
         alert_level, last_alert_at, next_action_at, next_visit_date,
         renewal_notice_sent, photo, version, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            dose.id.to_string(),
            dose.patient_phone,
            dose.source.as_str(),
            dose.time_slot.as_str(),
            dose.target_time.to_string(),
            dose.status.as_str(),
            dose.alert_level as i64,
            dose.last_alert_at,
            dose.next_action_at,
            dose.next_visit_date,
            dose.renewal_notice_sent,
            dose.photo,
            dose.version,
            dose.created_at,
        ],
    )?;
    for (position, line) in dose.medications.iter().enumerate() {
        conn.execute(
            "INSERT INTO dose_medications (dose_id, position, name, qty, stock,
             is_continuous, low_stock_notified)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                dose.id.to_string(),
                position as i64,
                line.name,
                line.qty as i64,
                line.stock as i64,
                line.is_continuous,
                line.low_stock_notified,
            ],
        )?;
    }
    Ok(())
}

fn load_medications(
    conn: &Connection,
    dose_id: &Uuid,
) -> Result<Vec<MedicationLine>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT name, qty, stock, is_continuous, low_stock_notified
         FROM dose_medications WHERE dose_id = ?1 ORDER BY position",
    )?;
    let lines = stmt
        .query_map(params![dose_id.to_string()], |row| {
            Ok(MedicationLine {
                name: row.get(0)?,
                qty: row.get::<_, i64>(1)? as u32,
                stock: row.get::<_, i64>(2)? as u32,
                is_continuous: row.get(3)?,
                low_stock_notified: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(lines)
}

pub fn get_dose(conn: &Connection, id: &Uuid) -> Result<Option<DoseRecord>, DatabaseError> {
    let mut stmt = conn.prepare(&format!("SELECT {DOSE_COLUMNS} FROM doses WHERE id = ?1"))?;
    let row = stmt
        .query_row(params![id.to_string()], DoseRow::from_sql_row)
        .optional()?;
    match row {
        Some(row) => {
            let meds = load_medications(conn, id)?;
            Ok(Some(row.into_record(meds)?))
        }
        None => Ok(None),
    }
}

/// Every record the poller must look at this tick.
pub fn list_pending(conn: &Connection) -> Result<Vec<DoseRecord>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DOSE_COLUMNS} FROM doses WHERE status = 'pending' ORDER BY created_at"
    ))?;
    let rows = stmt
        .query_map([], DoseRow::from_sql_row)?
        .collect::<Result<Vec<_>, _>>()?;
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let id = Uuid::parse_str(&row.id).map_err(|_| DatabaseError::InvalidEnum {
            field: "id".into(),
            value: row.id.clone(),
        })?;
        let meds = load_medications(conn, &id)?;
        records.push(row.into_record(meds)?);
    }
    Ok(records)
}

/// Full history for one patient, terminal records included.
pub fn list_by_patient(
    conn: &Connection,
    phone: &str,
) -> Result<Vec<DoseRecord>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DOSE_COLUMNS} FROM doses WHERE patient_phone = ?1 ORDER BY created_at"
    ))?;
    let rows = stmt
        .query_map(params![phone], DoseRow::from_sql_row)?
        .collect::<Result<Vec<_>, _>>()?;
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let id = Uuid::parse_str(&row.id).map_err(|_| DatabaseError::InvalidEnum {
            field: "id".into(),
            value: row.id.clone(),
        })?;
        let meds = load_medications(conn, &id)?;
        records.push(row.into_record(meds)?);
    }
    Ok(records)
}

/// Commit an escalation step. Fails (returns `false`) if the record moved
/// under us: version mismatch or no longer pending.
pub fn commit_escalation(
    conn: &Connection,
    id: &Uuid,
    expected_version: i64,
    alert_level: u8,
    last_alert_at: NaiveDateTime,
    next_action_at: Option<NaiveDateTime>,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE doses SET alert_level = ?1, last_alert_at = ?2, next_action_at = ?3,
         version = version + 1
         WHERE id = ?4 AND version = ?5 AND status = 'pending'",
        params![
            alert_level as i64,
            last_alert_at,
            next_action_at,
            id.to_string(),
            expected_version,
        ],
    )?;
    Ok(changed == 1)
}

/// Move a missed first-call window to its next occurrence.
pub fn roll_next_action(
    conn: &Connection,
    id: &Uuid,
    expected_version: i64,
    next_action_at: NaiveDateTime,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE doses SET next_action_at = ?1, version = version + 1
         WHERE id = ?2 AND version = ?3 AND status = 'pending'",
        params![next_action_at, id.to_string(), expected_version],
    )?;
    Ok(changed == 1)
}

/// The taken transition. Deliberately not keyed on version: a confirmation
/// always wins over a concurrent escalation write, but never resurrects a
/// terminal record.
pub fn confirm_taken(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE doses SET status = 'taken', alert_level = 0, version = version + 1
         WHERE id = ?1 AND status = 'pending'",
        params![id.to_string()],
    )?;
    Ok(changed == 1)
}

pub fn mark_expired(
    conn: &Connection,
    id: &Uuid,
    expected_version: i64,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE doses SET status = 'expired', version = version + 1
         WHERE id = ?1 AND version = ?2 AND status = 'pending'",
        params![id.to_string(), expected_version],
    )?;
    Ok(changed == 1)
}

/// Keep only continuous medication lines and clear the expiry date so the
/// record runs indefinitely. One-way: the date is never reconsidered.
pub fn retain_continuous(
    conn: &Connection,
    id: &Uuid,
    expected_version: i64,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE doses SET next_visit_date = NULL, version = version + 1
         WHERE id = ?1 AND version = ?2 AND status = 'pending'",
        params![id.to_string(), expected_version],
    )?;
    if changed == 1 {
        conn.execute(
            "DELETE FROM dose_medications WHERE dose_id = ?1 AND is_continuous = 0",
            params![id.to_string()],
        )?;
        return Ok(true);
    }
    Ok(false)
}

/// Latch the pre-expiry renewal notice. Guarded so it fires at most once.
pub fn mark_renewal_notice_sent(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE doses SET renewal_notice_sent = 1, version = version + 1
         WHERE id = ?1 AND renewal_notice_sent = 0",
        params![id.to_string()],
    )?;
    Ok(changed == 1)
}

/// Patient edited the target time: store the new display form, reset the
/// escalation counter, and restart the first-call window.
pub fn update_target_time(
    conn: &Connection,
    id: &Uuid,
    target_time: ClockTime,
    next_action_at: NaiveDateTime,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE doses SET target_time = ?1, alert_level = 0, next_action_at = ?2,
         version = version + 1
         WHERE id = ?3 AND status = 'pending'",
        params![target_time.to_string(), next_action_at, id.to_string()],
    )?;
    Ok(changed == 1)
}

/// Persist one medication line's stock and low-stock latch after a
/// taken transition.
pub fn update_medication_stock(
    conn: &Connection,
    dose_id: &Uuid,
    position: usize,
    stock: u32,
    low_stock_notified: bool,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE dose_medications SET stock = ?1, low_stock_notified = ?2
         WHERE dose_id = ?3 AND position = ?4",
        params![
            stock as i64,
            low_stock_notified,
            dose_id.to_string(),
            position as i64,
        ],
    )?;
    Ok(())
}
