//! Raw dose resolution by dosing basis.

use serde::{Deserialize, Serialize};

use crate::models::{is_usable_amount, BasisKind, DosingBasis, DrugRecord, PatientProfile};

use super::{DosageError, DosageOutcome};

/// A dose before safety checks, with the rule that produced it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ResolvedDose {
    pub value: f64,
    pub basis: BasisKind,
}

/// Derive the raw dose for a patient from the record's dosing basis.
///
/// A stored coefficient or fixed dose that is negative or not finite counts
/// as missing dose data.
pub fn resolve_dose(record: &DrugRecord, patient: &PatientProfile) -> DosageOutcome<ResolvedDose> {
    match &record.basis {
        DosingBasis::PerWeight { dose_per_kg } => {
            let per_kg = usable(record, *dose_per_kg, BasisKind::PerWeight)?;
            if !patient.has_valid_weight() {
                return Err(DosageError::InvalidInput(format!(
                    "weight must be a positive number of kg, got {}",
                    patient.weight_kg
                )));
            }

            let value = patient.weight_kg * per_kg;
            if !value.is_finite() {
                return Err(DosageError::InvalidInput(format!(
                    "weight {} kg is too large to dose",
                    patient.weight_kg
                )));
            }
            Ok(ResolvedDose {
                value,
                basis: BasisKind::PerWeight,
            })
        }
        DosingBasis::AgeBracketed { brackets } => {
            let table = brackets
                .as_ref()
                .filter(|t| !t.is_empty())
                .ok_or_else(|| missing(record, BasisKind::AgeBracketed))?;

            let age_months = patient.age_months.ok_or_else(|| {
                DosageError::InvalidInput(format!(
                    "{} is dosed by age; patient age is required",
                    record.name
                ))
            })?;

            let bracket = table
                .lookup(age_months)
                .ok_or_else(|| DosageError::NoMatchingAgeBracket {
                    drug: record.name.clone(),
                    age_months,
                })?;

            tracing::trace!(
                min = bracket.min_months,
                max = bracket.max_months,
                "Matched age bracket"
            );

            Ok(ResolvedDose {
                value: bracket.dose,
                basis: BasisKind::AgeBracketed,
            })
        }
        DosingBasis::Fixed { dose } => {
            let value = usable(record, *dose, BasisKind::Fixed)?;
            Ok(ResolvedDose {
                value,
                basis: BasisKind::Fixed,
            })
        }
        DosingBasis::Unknown { label } => Err(DosageError::UnknownDosingBasis {
            drug: record.name.clone(),
            basis: label.clone(),
        }),
    }
}

fn usable(record: &DrugRecord, stored: Option<f64>, basis: BasisKind) -> DosageOutcome<f64> {
    match stored {
        Some(value) if is_usable_amount(value) => Ok(value),
        Some(value) => {
            tracing::warn!(drug = %record.name, value, "Ignoring unusable stored dose");
            Err(missing(record, basis))
        }
        None => Err(missing(record, basis)),
    }
}

fn missing(record: &DrugRecord, basis: BasisKind) -> DosageError {
    DosageError::MissingDoseData {
        drug: record.name.clone(),
        basis,
    }
}
