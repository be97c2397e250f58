use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(TimeSlot {
    Morning => "Morning",
    Afternoon => "Afternoon",
    Night => "Night",
});

str_enum!(DoseStatus {
    Pending => "pending",
    Taken => "taken",
    Missed => "missed",
    Expired => "expired",
});

str_enum!(DoseSource {
    Fulfillment => "fulfillment",
    Manual => "manual",
});

str_enum!(ReminderChannel {
    Call => "call",
    Notification => "notification",
    None => "none",
});

str_enum!(Language {
    English => "English",
    Hindi => "Hindi",
    Telugu => "Telugu",
});

impl DoseStatus {
    /// Terminal states are retained for history and never leave the store.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Taken | Self::Expired)
    }
}

impl ReminderChannel {
    /// Whether voice calls to the patient are allowed.
    pub fn allows_calls(&self) -> bool {
        matches!(self, Self::Call)
    }

    /// Whether texts to the patient (low stock, renewal) are allowed.
    pub fn allows_patient_texts(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Whether the caretaker escalation text is allowed. Notification-only
    /// patients still get their caretaker alerted; "none" silences both.
    pub fn allows_caretaker_texts(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl Language {
    /// TTS locale code for the voice gateway.
    pub fn voice_code(&self) -> &'static str {
        match self {
            Self::English => "en-IN",
            Self::Hindi => "hi-IN",
            Self::Telugu => "te-IN",
        }
    }

    /// Keypad mapping used by the language-selection menu.
    /// Anything outside 2/3 falls back to English, as the menu announces.
    pub fn from_digit(digit: &str) -> Self {
        match digit {
            "2" => Self::Hindi,
            "3" => Self::Telugu,
            _ => Self::English,
        }
    }
}
