//! Patient preference records, keyed by phone.

use serde::{Deserialize, Serialize};

use super::enums::{Language, ReminderChannel};

/// Per-patient reminder preferences consulted on every escalation action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    /// Phone number, the patient's identity across the system.
    pub phone: String,
    pub name: String,
    /// Preferred spoken language. Unset until first captured through the
    /// language-selection menu; once set, all calls skip the menu.
    pub language: Option<Language>,
    pub reminder_channel: ReminderChannel,
    /// Escalation target for the final alert level. Without one, records
    /// stall at level 2; there is no one to escalate to.
    pub caretaker_phone: Option<String>,
}
