//! Inventory post-processing on confirmed doses.
//!
//! Every taken transition subtracts each line's per-dose quantity from its
//! remaining stock (floored at zero). Only lines whose stock crosses from
//! above the low-stock threshold to at or below it in this decrement are
//! collected into one consolidated text to the patient. The per-line latch
//! guarantees a crossing notifies exactly once.

use rusqlite::Connection;
use tracing::{error, info};

use crate::db::{repository, DatabaseError};
use crate::gateway::{normalize_phone, scripts, ConfirmationGateway};
use crate::models::{DoseRecord, MedicationLine, Patient};

/// Apply the per-dose decrement to one line in memory.
/// Returns `true` when this decrement crossed the low-stock threshold for
/// the first time.
fn decrement_line(line: &mut MedicationLine) -> bool {
    let before = line.stock;
    line.stock = line.stock.saturating_sub(line.qty);
    let threshold = line.low_stock_threshold();
    let crossed = before > threshold && line.stock <= threshold;
    crossed && !line.low_stock_notified
}

/// Decrement stock for every line of a just-confirmed dose, persist the new
/// counts, and send the consolidated low-stock notice if any line crossed
/// its threshold.
///
/// Must run after (and only after) a winning taken transition, so the
/// decrement happens exactly once per confirmation.
pub async fn process_taken(
    conn: &mut Connection,
    gateway: &dyn ConfirmationGateway,
    dose: &DoseRecord,
    patient: &Patient,
    country_prefix: &str,
) -> Result<(), DatabaseError> {
    let mut crossed: Vec<MedicationLine> = Vec::new();

    for (position, line) in dose.medications.iter().enumerate() {
        let mut updated = line.clone();
        let newly_low = decrement_line(&mut updated);
        if newly_low {
            updated.low_stock_notified = true;
        }
        repository::update_medication_stock(
            conn,
            &dose.id,
            position,
            updated.stock,
            updated.low_stock_notified,
        )?;
        if newly_low {
            crossed.push(updated);
        }
    }

    if crossed.is_empty() {
        return Ok(());
    }
    info!(
        dose_id = %dose.id,
        lines = crossed.len(),
        "low-stock threshold crossed, notifying patient"
    );
    if !patient.reminder_channel.allows_patient_texts() {
        return Ok(());
    }
    let to = normalize_phone(&patient.phone, country_prefix);
    if let Err(e) = gateway.send_text(&to, &scripts::low_stock_notice(&crossed)).await {
        // The latch is already written: the notice is best-effort and the
        // crossing never re-triggers.
        error!(dose_id = %dose.id, error = %e, "low-stock notice failed");
    }
    Ok(())
}
