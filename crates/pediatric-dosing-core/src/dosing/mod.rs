//! Dose calculation engine.
//!
//! Pipeline: Input check → Age window → Resolve → Safety ceiling → Assemble
//!
//! Every stage is a pure function of the drug record and patient profile.
//! The first failing stage aborts the calculation with a [`DosageError`].

mod assembler;
mod resolver;
mod validator;
mod vocabulary;

pub use assembler::*;
pub use resolver::*;
pub use validator::*;
pub use vocabulary::*;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{BasisKind, DosageResult, DrugRecord, PatientProfile};

/// Dose calculation failures. All are recoverable by the caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DosageError {
    #[error("{drug} is {basis} but has no dose data configured")]
    MissingDoseData { drug: String, basis: BasisKind },

    #[error("{drug} has no age-based dose for a patient aged {}", years_months(.age_months))]
    NoMatchingAgeBracket { drug: String, age_months: u32 },

    #[error("{drug} uses an unknown dosing basis: {basis:?}")]
    UnknownDosingBasis { drug: String, basis: String },

    #[error("{drug} is not recommended for patients under {}", years_months(.min_age_months))]
    PatientTooYoung { drug: String, min_age_months: u32 },

    #[error("{drug} is not recommended for patients over {}", years_months(.max_age_months))]
    PatientTooOld { drug: String, max_age_months: u32 },

    #[error("{drug}: computed dose {dose}{unit} exceeds the maximum of {ceiling}{unit} per day")]
    ExceedsSafetyCeiling {
        drug: String,
        dose: f64,
        ceiling: f64,
        unit: String,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Machine-readable error discriminant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DosageErrorKind {
    MissingDoseData,
    NoMatchingAgeBracket,
    UnknownDosingBasis,
    PatientTooYoung,
    PatientTooOld,
    ExceedsSafetyCeiling,
    InvalidInput,
}

impl DosageError {
    pub fn kind(&self) -> DosageErrorKind {
        match self {
            DosageError::MissingDoseData { .. } => DosageErrorKind::MissingDoseData,
            DosageError::NoMatchingAgeBracket { .. } => DosageErrorKind::NoMatchingAgeBracket,
            DosageError::UnknownDosingBasis { .. } => DosageErrorKind::UnknownDosingBasis,
            DosageError::PatientTooYoung { .. } => DosageErrorKind::PatientTooYoung,
            DosageError::PatientTooOld { .. } => DosageErrorKind::PatientTooOld,
            DosageError::ExceedsSafetyCeiling { .. } => DosageErrorKind::ExceedsSafetyCeiling,
            DosageError::InvalidInput(_) => DosageErrorKind::InvalidInput,
        }
    }
}

impl DosageErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DosageErrorKind::MissingDoseData => "missing_dose_data",
            DosageErrorKind::NoMatchingAgeBracket => "no_matching_age_bracket",
            DosageErrorKind::UnknownDosingBasis => "unknown_dosing_basis",
            DosageErrorKind::PatientTooYoung => "patient_too_young",
            DosageErrorKind::PatientTooOld => "patient_too_old",
            DosageErrorKind::ExceedsSafetyCeiling => "exceeds_safety_ceiling",
            DosageErrorKind::InvalidInput => "invalid_input",
        }
    }
}

pub type DosageOutcome<T> = Result<T, DosageError>;

/// Months rendered as "X years Y months" (months omitted when zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeDisplay(pub u32);

impl fmt::Display for AgeDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let years = self.0 / 12;
        let months = self.0 % 12;
        write!(f, "{} {}", years, if years == 1 { "year" } else { "years" })?;
        if months > 0 {
            write!(f, " {} {}", months, if months == 1 { "month" } else { "months" })?;
        }
        Ok(())
    }
}

fn years_months(months: &u32) -> AgeDisplay {
    AgeDisplay(*months)
}

/// Runs the full calculation for one record and patient.
#[derive(Debug, Clone, Default)]
pub struct DosageCalculator {
    vocabulary: TimingVocabulary,
}

impl DosageCalculator {
    /// Create a calculator with the default timing vocabulary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a calculator with a custom timing vocabulary.
    pub fn with_vocabulary(vocabulary: TimingVocabulary) -> Self {
        Self { vocabulary }
    }

    /// Compute the dose for a patient, or the first rule it violates.
    pub fn calculate(
        &self,
        record: &DrugRecord,
        patient: &PatientProfile,
    ) -> DosageOutcome<DosageResult> {
        let span = tracing::debug_span!("calculate_dosage", drug = %record.name);
        let _enter = span.enter();

        check_input(record, patient)?;
        check_age_window(record, patient.age_months)?;

        let resolved = resolve_dose(record, patient)?;
        tracing::debug!(dose = resolved.value, basis = %resolved.basis, "Resolved raw dose");

        let unit = output_unit(record, resolved.basis);
        check_safety_ceiling(record, resolved.value, &unit)?;

        Ok(assemble(record, resolved, unit, &self.vocabulary))
    }
}

/// Compute a dose with the default calculator.
pub fn calculate_dosage(
    record: &DrugRecord,
    patient: &PatientProfile,
) -> DosageOutcome<DosageResult> {
    DosageCalculator::new().calculate(record, patient)
}
