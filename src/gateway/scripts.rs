//! Spoken scripts and SMS bodies, per supported language.
//!
//! Wording follows the deployed call flows: first reminder, urgent second
//! reminder, no-input fallback, confirmation acknowledgements, the
//! three-way language menu, and the caretaker/stock/renewal texts.

use crate::models::{Language, MedicationLine, TimeSlot};

use super::twiml::Say;

/// First reminder call for a known-language patient.
pub fn first_call(lang: Language, name: &str, slot: TimeSlot, medicines: &str) -> String {
    match lang {
        Language::Hindi => format!(
            "Namaste {name}, yeh Med-guard hai. Aapki {} dawa ka samay ho gaya hai. \
             Kripaya {medicines} lein. Confirm karne ke liye, 1 dabayein.",
            slot.as_str()
        ),
        Language::Telugu => format!(
            "Namaskaram {name}, idi Med-guard. Mee {} mandula samayam ayindi. \
             Dayachesi {medicines} teesukondi. Confirm cheyadaniki, 1 nokkandi.",
            slot.as_str()
        ),
        Language::English => format!(
            "Hello {name}, this is MedGuard. It is time for your {} medication. \
             Please take {medicines} now. Press 1 to confirm.",
            slot.as_str()
        ),
    }
}

/// Second reminder, stronger urgency.
pub fn second_call(lang: Language, name: &str, medicines: &str) -> String {
    match lang {
        Language::Hindi => format!(
            "Namaste {name}. Yeh Med-guard se aapka doosra reminder hai. \
             Kripaya turant {medicines} lein. Confirm karne ke liye, 1 dabayein."
        ),
        Language::Telugu => format!(
            "Namaskaram {name}. Idi Med-guard nundi rendova reminder. \
             Dayachesi ventane {medicines} teesukondi. Confirm cheyadaniki, 1 nokkandi."
        ),
        Language::English => format!(
            "Hello {name}. This is your second reminder. \
             Please take {medicines} immediately. Press 1 to confirm."
        ),
    }
}

/// Spoken after a gather times out with no keypress.
pub fn no_input(lang: Language) -> String {
    match lang {
        Language::Hindi => {
            "Humein koi jawaab nahi mila. Hum baad mein call karenge. Dhanyawad.".into()
        }
        Language::Telugu => {
            "Maku elanti samadhanam raledu. Memu malli call chestamu. Dhanyavadalu.".into()
        }
        Language::English => {
            "We did not receive any input. We will call you back later. Goodbye.".into()
        }
    }
}

/// Acknowledgement after a successful dose confirmation.
pub fn confirm_success(lang: Language) -> String {
    match lang {
        Language::Hindi => {
            "Dhanyawad. Aapki dawa darj kar li gayi hai. Swasth rahein!".into()
        }
        Language::Telugu => {
            "Dhanyavadalu. Mee mandulu namodu cheyabaddayi. Arogyamga undandi!".into()
        }
        Language::English => {
            "Thank you. Your medicine has been marked as taken. Stay healthy and goodbye!".into()
        }
    }
}

/// Spoken on a wrong keypress during confirmation.
pub fn confirm_failure(lang: Language) -> String {
    match lang {
        Language::Hindi => {
            "Kshama karein, galat input. Kripaya app check karein. Dhanyawad.".into()
        }
        Language::Telugu => {
            "Kshaminchandi, tappu input. Dayachesi app check cheyandi. Dhanyavadalu.".into()
        }
        Language::English => {
            "We did not receive a valid input. Please check your MedGuard app. Goodbye.".into()
        }
    }
}

/// Generic spoken error for malformed or unknown callbacks.
pub fn spoken_error() -> String {
    "Error processing request. Goodbye.".into()
}

/// The three-way language menu played on a first call when no language
/// preference is on file. Each option is announced in its own language.
pub fn language_menu_prompts() -> Vec<Say> {
    vec![
        Say::new("en-IN", "Welcome to Med Guard. For English, press 1."),
        Say::new("hi-IN", "Hindi ke liye, do dabayein."),
        Say::new("te-IN", "Telugu kosam, moodu nokkandi."),
    ]
}

/// SOS text to the caretaker at the final escalation level.
pub fn caretaker_alert(patient_name: &str, medicines: &str) -> String {
    format!("MedGuard SOS: {patient_name} missed meds ({medicines}). Pls check!")
}

/// Consolidated low-stock text listing every line that just crossed the
/// threshold.
pub fn low_stock_notice(lines: &[MedicationLine]) -> String {
    let listing = lines
        .iter()
        .map(|l| format!("{} ({} left)", l.name, l.stock))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "MedGuard Alert: Running low on {listing}. Please restock soon to avoid missed doses."
    )
}

/// One-time pre-expiry warning, two days before the next visit date.
pub fn renewal_notice(med_name: &str) -> String {
    format!(
        "MedGuard Alert: Your prescription for {med_name} ends in 2 days. \
         Please consult your doctor. Do not take leftovers without advice."
    )
}
