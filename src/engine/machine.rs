//! Escalation state machine.
//!
//! `decide` is a pure function from a dose record, the patient's
//! preferences, and the current wall-clock instant to the next transition.
//! Due-ness is a comparison against the record's stored next-action time,
//! so the machine needs no clock of its own and tests need no mocking.
//!
//! Levels: 0 untouched, 1 first call, 2 urgent recall, 3 caretaker
//! notified. Confirmation is never decided here; only the callback
//! handlers move a record to `taken`.

use chrono::{Duration, NaiveDateTime};

use crate::config::EngineConfig;
use crate::models::{DoseRecord, Patient};

/// Escalation timing, converted once from the engine configuration.
#[derive(Debug, Clone, Copy)]
pub struct EscalationTiming {
    /// Wait between escalation levels.
    pub wait: Duration,
    /// How long past its window a first call may still fire.
    pub grace: Duration,
}

impl EscalationTiming {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            wait: Duration::from_std(config.wait_interval).unwrap_or(Duration::minutes(10)),
            grace: Duration::from_std(config.first_call_grace).unwrap_or(Duration::minutes(1)),
        }
    }
}

/// Which gather flow a first call opens with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallFlow {
    /// No language on file: play the three-way menu, route the keypress to
    /// the language-capture callback.
    LanguageMenu,
    /// Language known: speak the dose script, route to the confirmation
    /// callback.
    Confirmation,
}

/// The action attached to an escalation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationStep {
    FirstCall { flow: CallFlow },
    SecondCall,
    CaretakerAlert,
}

/// Outcome of one evaluation of a pending record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Nothing due yet, or permanently stalled at level 2 with no
    /// caretaker on file (accepted behavior, not an error).
    Wait,
    /// The first-call window passed unanswered; store the next day's
    /// occurrence and try again then.
    RollFirstCallWindow { next_action_at: NaiveDateTime },
    /// Commit this step: bump the level, stamp the clock, perform the
    /// action (channel preference permitting).
    Escalate {
        step: EscalationStep,
        alert_level: u8,
        next_action_at: Option<NaiveDateTime>,
    },
}

pub fn decide(
    dose: &DoseRecord,
    patient: &Patient,
    timing: &EscalationTiming,
    now: NaiveDateTime,
) -> Decision {
    match dose.alert_level {
        0 => {
            let window = dose
                .next_action_at
                .unwrap_or_else(|| dose.target_time.next_occurrence(now));
            if now < window {
                Decision::Wait
            } else if now < window + timing.grace {
                let flow = if patient.language.is_none() {
                    CallFlow::LanguageMenu
                } else {
                    CallFlow::Confirmation
                };
                Decision::Escalate {
                    step: EscalationStep::FirstCall { flow },
                    alert_level: 1,
                    next_action_at: Some(now + timing.wait),
                }
            } else {
                Decision::RollFirstCallWindow {
                    next_action_at: dose.target_time.next_occurrence(now),
                }
            }
        }
        1 => {
            if now >= wait_deadline(dose, timing) {
                Decision::Escalate {
                    step: EscalationStep::SecondCall,
                    alert_level: 2,
                    next_action_at: Some(now + timing.wait),
                }
            } else {
                Decision::Wait
            }
        }
        2 => {
            // No caretaker on file: there is no one to escalate to.
            if patient.caretaker_phone.is_none() {
                return Decision::Wait;
            }
            if now >= wait_deadline(dose, timing) {
                Decision::Escalate {
                    step: EscalationStep::CaretakerAlert,
                    alert_level: 3,
                    next_action_at: None,
                }
            } else {
                Decision::Wait
            }
        }
        _ => Decision::Wait,
    }
}

/// When the next escalation step becomes eligible. Prefers the stored
/// next-action time; falls back to the last alert plus the wait interval
/// for records written before the engine stored windows explicitly.
fn wait_deadline(dose: &DoseRecord, timing: &EscalationTiming) -> NaiveDateTime {
    dose.next_action_at
        .or_else(|| dose.last_alert_at.map(|t| t + timing.wait))
        .unwrap_or(NaiveDateTime::MIN)
}
