pub mod dose;
pub mod patient;

pub use dose::*;
pub use patient::*;
