//! Patient profile for a single dose calculation.

use serde::{Deserialize, Serialize};

use crate::dosing::{DosageError, DosageOutcome};

/// Weight and age supplied by the caller for one calculation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PatientProfile {
    /// Weight in kg
    pub weight_kg: f64,
    /// Age in whole months, if known
    pub age_months: Option<u32>,
}

impl PatientProfile {
    pub fn new(weight_kg: f64, age_months: Option<u32>) -> Self {
        Self {
            weight_kg,
            age_months,
        }
    }

    /// Build a profile from an age in whole years (`years × 12` months).
    ///
    /// A negative age, or one too large to count in months, is
    /// [`DosageError::InvalidInput`].
    pub fn from_age_years(weight_kg: f64, age_years: Option<i64>) -> DosageOutcome<Self> {
        let age_months = age_years
            .map(|years| {
                years
                    .checked_mul(12)
                    .and_then(|months| u32::try_from(months).ok())
                    .ok_or_else(|| {
                        DosageError::InvalidInput(format!(
                            "age must be a non-negative number of years, got {}",
                            years
                        ))
                    })
            })
            .transpose()?;
        Ok(Self::new(weight_kg, age_months))
    }

    /// Check the weight is usable for dosing.
    pub fn has_valid_weight(&self) -> bool {
        self.weight_kg.is_finite() && self.weight_kg > 0.0
    }
}
