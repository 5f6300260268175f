//! Domain models for the pediatric dosing system.

mod dosage;
mod drug;
mod patient;

pub use dosage::*;
pub use drug::*;
pub use patient::*;
