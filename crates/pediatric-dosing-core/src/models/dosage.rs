//! Dose calculation output.

use serde::{Deserialize, Serialize};

use super::{AdministrationMode, BasisKind};

/// A computed dose ready for display, with its administration metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DosageResult {
    pub drug_name: String,
    pub aliases: Vec<String>,
    /// Computed amount (daily total when scheduled, single use when as-needed)
    pub dose: f64,
    pub dose_unit: String,
    /// Rule that produced the dose
    pub basis: BasisKind,
    pub formulation: String,
    pub mode: AdministrationMode,
    /// Doses-per-day choices for the prescriber
    pub frequency_options: Vec<u32>,
    /// Timing labels suited to the administration mode
    pub timing_options: Vec<String>,
    pub notes: String,
    pub min_age_months: Option<u32>,
    pub max_age_months: Option<u32>,
}

impl DosageResult {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Dose per administration when split evenly over `times_per_day`.
    ///
    /// Only meaningful for scheduled use; as-needed doses are already a
    /// single administration.
    pub fn per_administration(&self, times_per_day: u32) -> Option<f64> {
        match self.mode {
            AdministrationMode::Scheduled if times_per_day > 0 => {
                Some(self.dose / f64::from(times_per_day))
            }
            AdministrationMode::Scheduled => None,
            AdministrationMode::AsNeeded => Some(self.dose),
        }
    }
}
