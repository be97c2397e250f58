//! Patient preference persistence, keyed by phone.

use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};

use super::super::DatabaseError;
use crate::models::{Language, Patient, ReminderChannel};

pub fn upsert_patient(conn: &Connection, patient: &Patient) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO patients (phone, name, language, reminder_channel, caretaker_phone)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (phone) DO UPDATE SET
             name = excluded.name,
             language = excluded.language,
             reminder_channel = excluded.reminder_channel,
             caretaker_phone = excluded.caretaker_phone",
        params![
            patient.phone,
            patient.name,
            patient.language.map(|l| l.as_str()),
            patient.reminder_channel.as_str(),
            patient.caretaker_phone,
        ],
    )?;
    Ok(())
}

pub fn get_patient(conn: &Connection, phone: &str) -> Result<Option<Patient>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT phone, name, language, reminder_channel, caretaker_phone
         FROM patients WHERE phone = ?1",
    )?;
    let row = stmt
        .query_row(params![phone], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })
        .optional()?;

    match row {
        Some((phone, name, language, channel, caretaker_phone)) => Ok(Some(Patient {
            phone,
            name,
            language: language.as_deref().map(Language::from_str).transpose()?,
            reminder_channel: ReminderChannel::from_str(&channel)?,
            caretaker_phone,
        })),
        None => Ok(None),
    }
}

/// Persist the captured spoken-language preference. Permanent: every later
/// call for this patient skips the language menu.
pub fn set_language(
    conn: &Connection,
    phone: &str,
    language: Language,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE patients SET language = ?1 WHERE phone = ?2",
        params![language.as_str(), phone],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "patient".into(),
            id: phone.into(),
        });
    }
    Ok(())
}
