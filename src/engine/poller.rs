//! Polling scheduler — the fixed-cadence driver of the escalation engine.
//!
//! One tick per configured interval: load every pending dose, run the
//! expiry gate, then apply the state machine and perform whatever action it
//! decided. Failures are per-record; a broken record or a down gateway
//! never stops the tick.
//!
//! Write ordering: the escalation transition is committed (compare-and-swap
//! on the record's version) *before* the call or text goes out. A stale
//! record that a confirmation callback already moved loses the CAS and
//! triggers nothing, and a gateway failure after a committed transition
//! still leaves the escalation clock advanced so the next level retries on
//! schedule.

use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use rusqlite::Connection;
use tracing::{error, info, warn};

use crate::core_state::CoreState;
use crate::db::{repository, DatabaseError};
use crate::engine::expiry::{self, ExpiryAction};
use crate::engine::machine::{self, CallFlow, Decision, EscalationStep, EscalationTiming};
use crate::gateway::twiml::{Gather, Say, VoiceResponse};
use crate::gateway::{normalize_phone, scripts, CallRequest};
use crate::models::{DoseRecord, Language, Patient};

/// Gather timeout for the plain confirmation prompt.
const CONFIRM_GATHER_SECS: u16 = 10;
/// Gather timeout for the three-way language menu.
const LANGUAGE_GATHER_SECS: u16 = 15;

#[derive(Debug, Default)]
pub struct TickSummary {
    pub scanned: usize,
    pub escalated: usize,
    pub expired: usize,
}

/// Run the poller until the process exits.
pub async fn run(state: Arc<CoreState>) {
    let mut ticker = tokio::time::interval(state.config.tick_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    info!(
        interval_secs = state.config.tick_interval.as_secs(),
        "escalation poller started"
    );

    loop {
        ticker.tick().await;
        let now = Local::now().naive_local();
        match run_tick(&state, now).await {
            Ok(summary) if summary.escalated > 0 || summary.expired > 0 => {
                info!(
                    scanned = summary.scanned,
                    escalated = summary.escalated,
                    expired = summary.expired,
                    "tick complete"
                );
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "tick failed"),
        }
    }
}

/// One pass over every pending dose. Separated from the loop (and handed
/// `now` explicitly) so tests drive ticks directly.
pub async fn run_tick(
    state: &CoreState,
    now: NaiveDateTime,
) -> Result<TickSummary, DatabaseError> {
    let mut conn = state.open_db()?;
    let timing = EscalationTiming::from_config(&state.config);
    let pending = repository::list_pending(&conn)?;

    let mut summary = TickSummary {
        scanned: pending.len(),
        ..TickSummary::default()
    };

    for dose in pending {
        let dose_id = dose.id;
        match process_record(state, &mut conn, dose, &timing, now).await {
            Ok(RecordOutcome::Escalated) => summary.escalated += 1,
            Ok(RecordOutcome::Expired) => summary.expired += 1,
            Ok(RecordOutcome::Idle) => {}
            Err(e) => {
                // Isolated: the rest of the tick proceeds.
                error!(dose_id = %dose_id, error = %e, "record processing failed");
            }
        }
    }
    Ok(summary)
}

enum RecordOutcome {
    Idle,
    Escalated,
    Expired,
}

async fn process_record(
    state: &CoreState,
    conn: &mut Connection,
    mut dose: DoseRecord,
    timing: &EscalationTiming,
    now: NaiveDateTime,
) -> Result<RecordOutcome, DatabaseError> {
    let today = now.date();

    // Expiry gate runs before any escalation logic and can terminate the
    // record outright.
    match expiry::assess(&dose, today) {
        ExpiryAction::Expire => {
            if repository::mark_expired(conn, &dose.id, dose.version)? {
                info!(dose_id = %dose.id, patient = %dose.patient_phone,
                    "prescription expired, reminders stopped");
                return Ok(RecordOutcome::Expired);
            }
            return Ok(RecordOutcome::Idle);
        }
        ExpiryAction::RetainContinuous => {
            if !repository::retain_continuous(conn, &dose.id, dose.version)? {
                return Ok(RecordOutcome::Idle);
            }
            info!(dose_id = %dose.id, patient = %dose.patient_phone,
                "prescription expired, continuous medications kept running");
            match repository::get_dose(conn, &dose.id)? {
                Some(updated) => dose = updated,
                None => return Ok(RecordOutcome::Idle),
            }
        }
        ExpiryAction::Keep => {}
    }

    let Some(patient) = repository::get_patient(conn, &dose.patient_phone)? else {
        warn!(dose_id = %dose.id, phone = %dose.patient_phone,
            "dose has no patient preference record, skipping");
        return Ok(RecordOutcome::Idle);
    };

    // Pre-expiry renewal warning, independent of the escalation ladder.
    if expiry::renewal_due(&dose, today) && patient.reminder_channel.allows_patient_texts() {
        send_renewal_notice(state, conn, &dose, &patient).await?;
    }

    match machine::decide(&dose, &patient, timing, now) {
        Decision::Wait => Ok(RecordOutcome::Idle),
        Decision::RollFirstCallWindow { next_action_at } => {
            if repository::roll_next_action(conn, &dose.id, dose.version, next_action_at)? {
                warn!(dose_id = %dose.id, %next_action_at,
                    "first-call window missed, rolled to next occurrence");
            }
            Ok(RecordOutcome::Idle)
        }
        Decision::Escalate {
            step,
            alert_level,
            next_action_at,
        } => {
            // Commit first: a record the callback already confirmed loses
            // the CAS here and triggers no late call.
            let committed = repository::commit_escalation(
                conn,
                &dose.id,
                dose.version,
                alert_level,
                now,
                next_action_at,
            )?;
            if !committed {
                info!(dose_id = %dose.id, "record changed mid-tick, escalation discarded");
                return Ok(RecordOutcome::Idle);
            }
            info!(dose_id = %dose.id, alert_level, "escalation committed");
            perform_step(state, &dose, &patient, step).await;
            Ok(RecordOutcome::Escalated)
        }
    }
}

async fn send_renewal_notice(
    state: &CoreState,
    conn: &mut Connection,
    dose: &DoseRecord,
    patient: &Patient,
) -> Result<(), DatabaseError> {
    let med_name = dose
        .medications
        .first()
        .map(|m| m.name.clone())
        .unwrap_or_else(|| "your medicines".into());
    let to = normalize_phone(&patient.phone, &state.config.country_prefix);
    match state
        .gateway()
        .send_text(&to, &scripts::renewal_notice(&med_name))
        .await
    {
        Ok(()) => {
            repository::mark_renewal_notice_sent(conn, &dose.id)?;
            info!(dose_id = %dose.id, "renewal notice sent");
        }
        // Latch stays clear so the next tick retries.
        Err(e) => error!(dose_id = %dose.id, error = %e, "renewal notice failed"),
    }
    Ok(())
}

/// Perform the side effect of a committed escalation step. Channel
/// preferences gate delivery only; failures are logged and swallowed so the
/// already-committed transition stands.
async fn perform_step(
    state: &CoreState,
    dose: &DoseRecord,
    patient: &Patient,
    step: EscalationStep,
) {
    match step {
        EscalationStep::FirstCall { flow } => {
            if !patient.reminder_channel.allows_calls() {
                return;
            }
            let voice = match flow {
                CallFlow::LanguageMenu => language_menu_call(state, dose),
                CallFlow::Confirmation => confirmation_call(state, dose, patient, false),
            };
            place_call(state, dose, &patient.phone, voice).await;
        }
        EscalationStep::SecondCall => {
            if !patient.reminder_channel.allows_calls() {
                return;
            }
            let voice = confirmation_call(state, dose, patient, true);
            place_call(state, dose, &patient.phone, voice).await;
        }
        EscalationStep::CaretakerAlert => {
            if !patient.reminder_channel.allows_caretaker_texts() {
                return;
            }
            let Some(caretaker) = patient.caretaker_phone.as_deref() else {
                return;
            };
            let to = normalize_phone(caretaker, &state.config.country_prefix);
            let body = scripts::caretaker_alert(&patient.name, &dose.spoken_medicines());
            if let Err(e) = state.gateway().send_text(&to, &body).await {
                error!(dose_id = %dose.id, error = %e, "caretaker alert failed");
            }
        }
    }
}

async fn place_call(state: &CoreState, dose: &DoseRecord, phone: &str, voice: VoiceResponse) {
    let to = normalize_phone(phone, &state.config.country_prefix);
    if let Err(e) = state.gateway().place_call(CallRequest { to, voice }).await {
        error!(dose_id = %dose.id, error = %e, "reminder call failed");
    }
}

/// First call with no language on file: three-way menu, keypress routed to
/// the language-capture callback.
fn language_menu_call(state: &CoreState, dose: &DoseRecord) -> VoiceResponse {
    VoiceResponse::new()
        .gather(Gather {
            action: state.config.language_webhook_url(&dose.id),
            timeout_secs: LANGUAGE_GATHER_SECS,
            prompts: scripts::language_menu_prompts(),
        })
        .say(Say::new(
            Language::English.voice_code(),
            scripts::no_input(Language::English),
        ))
}

/// Dose reminder gather in the patient's language, keypress routed to the
/// confirmation callback. Shared with the language-capture handler, which
/// continues straight into this flow after persisting the choice.
pub fn confirmation_call(
    state: &CoreState,
    dose: &DoseRecord,
    patient: &Patient,
    second: bool,
) -> VoiceResponse {
    let lang = patient.language.unwrap_or(Language::English);
    let medicines = dose.spoken_medicines();
    let script = if second {
        scripts::second_call(lang, &patient.name, &medicines)
    } else {
        scripts::first_call(lang, &patient.name, dose.time_slot, &medicines)
    };
    VoiceResponse::new()
        .gather(Gather {
            action: state.config.confirm_webhook_url(&dose.id),
            timeout_secs: CONFIRM_GATHER_SECS,
            prompts: vec![Say::new(lang.voice_code(), script)],
        })
        .say(Say::new(lang.voice_code(), scripts::no_input(lang)))
}
