pub mod dose;
pub mod enums;
pub mod patient;

pub use dose::{ClockTime, DoseRecord, MedicationLine};
pub use enums::{DoseSource, DoseStatus, Language, ReminderChannel, TimeSlot};
pub use patient::Patient;
