//! Eligibility and safety checks.

use crate::models::{is_usable_amount, DrugRecord, PatientProfile};

use super::{DosageError, DosageOutcome};

/// Reject profiles that cannot be dosed against this record at all.
pub fn check_input(record: &DrugRecord, patient: &PatientProfile) -> DosageOutcome<()> {
    if !patient.has_valid_weight() {
        return Err(DosageError::InvalidInput(format!(
            "weight must be a positive number of kg, got {}",
            patient.weight_kg
        )));
    }

    if patient.age_months.is_none() && (record.basis.requires_age() || record.has_age_window()) {
        return Err(DosageError::InvalidInput(format!(
            "{} has age-dependent dosing rules; patient age is required",
            record.name
        )));
    }

    Ok(())
}

/// Check the patient's age against the record's inclusive age window.
///
/// Without an age there is nothing to compare; [`check_input`] decides
/// whether a missing age is acceptable.
pub fn check_age_window(record: &DrugRecord, age_months: Option<u32>) -> DosageOutcome<()> {
    let Some(age) = age_months else {
        return Ok(());
    };

    if let Some(min) = record.min_age_months {
        if age < min {
            tracing::debug!(age, min, "Patient below minimum age");
            return Err(DosageError::PatientTooYoung {
                drug: record.name.clone(),
                min_age_months: min,
            });
        }
    }

    if let Some(max) = record.max_age_months {
        if age > max {
            tracing::debug!(age, max, "Patient above maximum age");
            return Err(DosageError::PatientTooOld {
                drug: record.name.clone(),
                max_age_months: max,
            });
        }
    }

    Ok(())
}

/// Check a resolved dose against the record's absolute ceiling (inclusive).
///
/// The dose is compared as resolved: a daily total for scheduled records,
/// a single administration for as-needed records. A ceiling that is not a
/// non-negative number, or a dose that is not a number, never passes.
pub fn check_safety_ceiling(record: &DrugRecord, dose: f64, unit: &str) -> DosageOutcome<()> {
    match record.max_daily_dose {
        Some(ceiling) if !is_usable_amount(ceiling) => Err(DosageError::InvalidInput(format!(
            "{} has an unusable safety ceiling: {}",
            record.name, ceiling
        ))),
        Some(ceiling) if dose.is_nan() || dose > ceiling => {
            tracing::warn!(drug = %record.name, dose, ceiling, "Dose exceeds safety ceiling");
            Err(DosageError::ExceedsSafetyCeiling {
                drug: record.name.clone(),
                dose,
                ceiling,
                unit: unit.to_string(),
            })
        }
        _ => Ok(()),
    }
}
