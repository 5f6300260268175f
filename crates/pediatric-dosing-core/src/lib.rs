//! Pediatric Dosing Core Library
//!
//! Local-first drug catalog with a pure dose calculation engine.
//!
//! # Architecture
//!
//! ```text
//!   Drug name ──► Catalog lookup (SQLite) ──► DrugRecord
//!                                                │
//!   Weight, age ──► PatientProfile ──────────────┤
//!                                                ▼
//!                                   ┌────────────────────────┐
//!                                   │   DosageCalculator     │
//!                                   │  input → age window →  │
//!                                   │  resolve → ceiling →   │
//!                                   │  assemble              │
//!                                   └───────────┬────────────┘
//!                                               │
//!                              DosageResult ◄───┴───► DosageError
//! ```
//!
//! # Core Principle
//!
//! **The engine never returns a partial dose.** The first rule a patient
//! violates aborts the calculation with a typed error.
//!
//! # Modules
//!
//! - [`db`]: SQLite drug catalog
//! - [`models`]: Domain types (DrugRecord, PatientProfile, DosageResult, etc.)
//! - [`dosing`]: Resolver, eligibility and safety checks, result assembly

pub mod db;
pub mod dosing;
pub mod models;

// Re-export commonly used types
pub use db::Database;
pub use dosing::{calculate_dosage, DosageCalculator, DosageError, DosageErrorKind, TimingVocabulary};
pub use models::{
    AdministrationMode, AgeBracket, AgeBracketTable, BasisKind, DosageResult, DosingBasis,
    DrugRecord, PatientProfile,
};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};

/// Default number of search results when the caller passes zero.
const DEFAULT_SEARCH_LIMIT: usize = 50;

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum PediatricDosingError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Dose calculation rejected the patient or record.
    #[error("{message}")]
    Dosage { kind: String, message: String },
}

impl From<db::DbError> for PediatricDosingError {
    fn from(e: db::DbError) -> Self {
        match e {
            db::DbError::NotFound(what) => PediatricDosingError::NotFound(what),
            db::DbError::Duplicate(_) | db::DbError::Constraint(_) => {
                PediatricDosingError::InvalidInput(e.to_string())
            }
            other => PediatricDosingError::DatabaseError(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for PediatricDosingError {
    fn from(e: serde_json::Error) -> Self {
        PediatricDosingError::SerializationError(e.to_string())
    }
}

impl From<models::BracketError> for PediatricDosingError {
    fn from(e: models::BracketError) -> Self {
        PediatricDosingError::InvalidInput(e.to_string())
    }
}

impl From<models::RecordError> for PediatricDosingError {
    fn from(e: models::RecordError) -> Self {
        PediatricDosingError::InvalidInput(e.to_string())
    }
}

impl From<DosageError> for PediatricDosingError {
    fn from(e: DosageError) -> Self {
        PediatricDosingError::Dosage {
            kind: e.kind().as_str().to_string(),
            message: e.to_string(),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for PediatricDosingError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        PediatricDosingError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a database at the given path.
#[uniffi::export]
pub fn open_database(path: String) -> Result<Arc<PediatricDosingCore>, PediatricDosingError> {
    let db = Database::open(&path)?;
    tracing::info!(path = %path, "Opened drug database");
    Ok(Arc::new(PediatricDosingCore::new(db)))
}

/// Create an in-memory database (for testing).
#[uniffi::export]
pub fn open_database_in_memory() -> Result<Arc<PediatricDosingCore>, PediatricDosingError> {
    let db = Database::open_in_memory()?;
    Ok(Arc::new(PediatricDosingCore::new(db)))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe database wrapper for FFI.
#[derive(uniffi::Object)]
pub struct PediatricDosingCore {
    db: Arc<Mutex<Database>>,
    calculator: DosageCalculator,
}

impl PediatricDosingCore {
    fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            calculator: DosageCalculator::new(),
        }
    }

    /// Fetch a drug by exact name, releasing the lock before calculation.
    fn load_drug(&self, name: &str) -> Result<DrugRecord, PediatricDosingError> {
        let db = self.db.lock()?;
        db.get_drug_by_name(name)?
            .ok_or_else(|| PediatricDosingError::NotFound(name.to_string()))
    }
}

#[uniffi::export]
impl PediatricDosingCore {
    // =========================================================================
    // Catalog Operations
    // =========================================================================

    /// Add a drug, returning its ID.
    pub fn add_drug(&self, drug: FfiDrugRecord) -> Result<i64, PediatricDosingError> {
        let record = DrugRecord::try_from(drug)?;
        let db = self.db.lock()?;
        Ok(db.insert_drug(&record)?)
    }

    /// Replace an existing drug.
    pub fn update_drug(&self, id: i64, drug: FfiDrugRecord) -> Result<(), PediatricDosingError> {
        let record = DrugRecord::try_from(drug)?;
        let db = self.db.lock()?;
        db.update_drug(id, &record)?;
        Ok(())
    }

    /// Delete a drug by ID.
    pub fn delete_drug(&self, id: i64) -> Result<(), PediatricDosingError> {
        let db = self.db.lock()?;
        if !db.delete_drug(id)? {
            return Err(PediatricDosingError::NotFound(format!("drug id {}", id)));
        }
        Ok(())
    }

    /// Get a drug by ID.
    pub fn get_drug(&self, id: i64) -> Result<Option<FfiDrugRecord>, PediatricDosingError> {
        let db = self.db.lock()?;
        Ok(db.get_drug(id)?.map(|d| d.into()))
    }

    /// Search drugs by name/alias.
    pub fn search_drugs(
        &self,
        query: String,
        limit: u32,
    ) -> Result<Vec<FfiDrugRecord>, PediatricDosingError> {
        let limit = if limit == 0 {
            DEFAULT_SEARCH_LIMIT
        } else {
            limit as usize
        };
        let db = self.db.lock()?;
        let drugs = db.search_drugs(&query, limit)?;
        Ok(drugs.into_iter().map(|d| d.into()).collect())
    }

    /// List drugs in a category (all drugs when `None`).
    pub fn list_drugs_by_category(
        &self,
        category: Option<String>,
    ) -> Result<Vec<FfiDrugRecord>, PediatricDosingError> {
        let db = self.db.lock()?;
        let drugs = db.list_drugs_by_category(category.as_deref())?;
        Ok(drugs.into_iter().map(|d| d.into()).collect())
    }

    /// Distinct drug categories.
    pub fn list_categories(&self) -> Result<Vec<String>, PediatricDosingError> {
        let db = self.db.lock()?;
        Ok(db.list_categories()?)
    }

    // =========================================================================
    // Dosing Operations
    // =========================================================================

    /// Calculate the dose of a named drug for a patient.
    ///
    /// Age is given in whole years and converted to months.
    pub fn calculate_dosage(
        &self,
        drug_name: String,
        weight_kg: f64,
        age_years: Option<i64>,
    ) -> Result<FfiDosageResult, PediatricDosingError> {
        let record = self.load_drug(&drug_name)?;

        let result = PatientProfile::from_age_years(weight_kg, age_years)
            .and_then(|patient| self.calculator.calculate(&record, &patient))
            .map_err(|e| {
                tracing::info!(drug = %drug_name, kind = e.kind().as_str(), "Dose calculation rejected");
                e
            })?;

        Ok(result.into())
    }

    /// Calculate the dose with an age given directly in months.
    pub fn calculate_dosage_months(
        &self,
        drug_name: String,
        weight_kg: f64,
        age_months: Option<u32>,
    ) -> Result<FfiDosageResult, PediatricDosingError> {
        let record = self.load_drug(&drug_name)?;

        let patient = PatientProfile::new(weight_kg, age_months);
        Ok(self.calculator.calculate(&record, &patient)?.into())
    }

    /// Calculate the dose and return the result as JSON.
    pub fn calculate_dosage_json(
        &self,
        drug_name: String,
        weight_kg: f64,
        age_years: Option<i64>,
    ) -> Result<String, PediatricDosingError> {
        let record = self.load_drug(&drug_name)?;

        let patient = PatientProfile::from_age_years(weight_kg, age_years)?;
        let result = self.calculator.calculate(&record, &patient)?;
        Ok(result.to_json()?)
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe drug record with flat basis columns.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDrugRecord {
    pub id: Option<i64>,
    pub name: String,
    pub aliases: Vec<String>,
    pub category: Option<String>,
    /// "kg", "age", or "fixed"
    pub dosing_basis: String,
    pub dose_per_kg: Option<f64>,
    pub age_brackets: Vec<FfiAgeBracket>,
    pub fixed_dose: Option<f64>,
    pub min_age_months: Option<u32>,
    pub max_age_months: Option<u32>,
    /// "scheduled" or "as_needed"
    pub administration_mode: String,
    pub frequency_options: Vec<u32>,
    pub timing_options: Vec<String>,
    pub max_daily_dose: Option<f64>,
    pub max_uses_per_day: Option<u32>,
    pub dose_unit: Option<String>,
    pub formulation: Option<String>,
    pub notes: Option<String>,
}

/// FFI-safe age bracket.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAgeBracket {
    pub min_months: u32,
    pub max_months: u32,
    pub dose: f64,
}

impl From<DrugRecord> for FfiDrugRecord {
    fn from(drug: DrugRecord) -> Self {
        let (dose_per_kg, age_brackets, fixed_dose) = match &drug.basis {
            DosingBasis::PerWeight { dose_per_kg } => (*dose_per_kg, Vec::new(), None),
            DosingBasis::AgeBracketed { brackets } => (
                None,
                brackets
                    .iter()
                    .flat_map(|t| t.brackets())
                    .map(|b| FfiAgeBracket {
                        min_months: b.min_months,
                        max_months: b.max_months,
                        dose: b.dose,
                    })
                    .collect(),
                None,
            ),
            DosingBasis::Fixed { dose } => (None, Vec::new(), *dose),
            DosingBasis::Unknown { .. } => (None, Vec::new(), None),
        };

        Self {
            id: drug.id,
            dosing_basis: drug.basis.label().to_string(),
            name: drug.name,
            aliases: drug.aliases,
            category: drug.category,
            dose_per_kg,
            age_brackets,
            fixed_dose,
            min_age_months: drug.min_age_months,
            max_age_months: drug.max_age_months,
            administration_mode: drug.mode.as_str().to_string(),
            frequency_options: drug.frequency_options,
            timing_options: drug.timing_options,
            max_daily_dose: drug.max_daily_dose,
            max_uses_per_day: drug.max_uses_per_day,
            dose_unit: drug.dose_unit,
            formulation: drug.formulation,
            notes: drug.notes,
        }
    }
}

impl TryFrom<FfiDrugRecord> for DrugRecord {
    type Error = PediatricDosingError;

    fn try_from(drug: FfiDrugRecord) -> Result<Self, Self::Error> {
        let brackets = if drug.age_brackets.is_empty() {
            None
        } else {
            Some(AgeBracketTable::new(
                drug.age_brackets
                    .iter()
                    .map(|b| AgeBracket::new(b.min_months, b.max_months, b.dose))
                    .collect(),
            )?)
        };

        let mode = drug
            .administration_mode
            .parse::<AdministrationMode>()
            .map_err(|m| PediatricDosingError::InvalidInput(format!("unknown administration mode: {}", m)))?;

        let basis = DosingBasis::from_parts(&drug.dosing_basis, drug.dose_per_kg, brackets, drug.fixed_dose);
        if basis.kind().is_none() {
            return Err(PediatricDosingError::InvalidInput(format!(
                "unknown dosing basis: {}",
                drug.dosing_basis
            )));
        }

        let record = DrugRecord {
            id: drug.id,
            name: drug.name,
            aliases: drug.aliases,
            category: drug.category,
            basis,
            min_age_months: drug.min_age_months,
            max_age_months: drug.max_age_months,
            mode,
            frequency_options: drug.frequency_options,
            timing_options: drug.timing_options,
            max_daily_dose: drug.max_daily_dose,
            max_uses_per_day: drug.max_uses_per_day,
            dose_unit: drug.dose_unit,
            formulation: drug.formulation,
            notes: drug.notes,
        };
        record.validate()?;
        Ok(record)
    }
}

/// FFI-safe dosage result.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDosageResult {
    pub drug_name: String,
    pub aliases: Vec<String>,
    pub dose: f64,
    pub dose_unit: String,
    pub basis: String,
    pub formulation: String,
    pub administration_mode: String,
    pub frequency_options: Vec<u32>,
    pub timing_options: Vec<String>,
    pub notes: String,
    pub min_age_months: Option<u32>,
    pub max_age_months: Option<u32>,
}

impl From<DosageResult> for FfiDosageResult {
    fn from(result: DosageResult) -> Self {
        Self {
            drug_name: result.drug_name,
            aliases: result.aliases,
            dose: result.dose,
            dose_unit: result.dose_unit,
            basis: result.basis.as_str().to_string(),
            formulation: result.formulation,
            administration_mode: result.mode.as_str().to_string(),
            frequency_options: result.frequency_options,
            timing_options: result.timing_options,
            notes: result.notes,
            min_age_months: result.min_age_months,
            max_age_months: result.max_age_months,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ffi_drug(name: &str, basis: &str) -> FfiDrugRecord {
        FfiDrugRecord {
            id: None,
            name: name.into(),
            aliases: vec![],
            category: None,
            dosing_basis: basis.into(),
            dose_per_kg: None,
            age_brackets: vec![],
            fixed_dose: None,
            min_age_months: None,
            max_age_months: None,
            administration_mode: "scheduled".into(),
            frequency_options: vec![],
            timing_options: vec![],
            max_daily_dose: None,
            max_uses_per_day: None,
            dose_unit: None,
            formulation: None,
            notes: None,
        }
    }

    #[test]
    fn test_calculate_through_core() {
        let core = open_database_in_memory().unwrap();

        let mut drug = ffi_drug("Widecillin Fine Granules 10%", "kg");
        drug.dose_per_kg = Some(0.02);
        drug.frequency_options = vec![2, 3];
        core.add_drug(drug).unwrap();

        let result = core
            .calculate_dosage("Widecillin Fine Granules 10%".into(), 15.0, Some(4))
            .unwrap();
        assert!((result.dose - 0.3).abs() < 1e-9);
        assert_eq!(result.dose_unit, "g");
        assert_eq!(result.basis, "kg");
        assert_eq!(result.frequency_options, vec![2, 3]);
    }

    #[test]
    fn test_dosage_error_kind_exposed() {
        let core = open_database_in_memory().unwrap();

        let mut drug = ffi_drug("Asverin Powder 10%", "kg");
        drug.dose_per_kg = Some(0.001);
        drug.min_age_months = Some(18);
        core.add_drug(drug).unwrap();

        let err = core
            .calculate_dosage("Asverin Powder 10%".into(), 8.0, Some(1))
            .unwrap_err();
        match err {
            PediatricDosingError::Dosage { kind, message } => {
                assert_eq!(kind, "patient_too_young");
                assert!(message.contains("1 year 6 months"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_drug() {
        let core = open_database_in_memory().unwrap();
        let err = core.calculate_dosage("Nothing".into(), 10.0, None).unwrap_err();
        assert!(matches!(err, PediatricDosingError::NotFound(_)));
    }

    #[test]
    fn test_ffi_record_validation() {
        let core = open_database_in_memory().unwrap();

        let mut overlapping = ffi_drug("Overlap", "age");
        overlapping.age_brackets = vec![
            FfiAgeBracket { min_months: 0, max_months: 12, dose: 1.0 },
            FfiAgeBracket { min_months: 10, max_months: 24, dose: 2.0 },
        ];
        assert!(matches!(core.add_drug(overlapping), Err(PediatricDosingError::InvalidInput(_))));

        let unknown = ffi_drug("Unknown", "surface_area");
        assert!(matches!(core.add_drug(unknown), Err(PediatricDosingError::InvalidInput(_))));

        let mut bad_mode = ffi_drug("Bad Mode", "fixed");
        bad_mode.administration_mode = "weekly".into();
        assert!(matches!(core.add_drug(bad_mode), Err(PediatricDosingError::InvalidInput(_))));
    }

    #[test]
    fn test_ffi_record_rejects_unusable_values() {
        let core = open_database_in_memory().unwrap();

        let mut nan_dose = ffi_drug("NaN Syrup", "fixed");
        nan_dose.fixed_dose = Some(f64::NAN);
        nan_dose.max_daily_dose = Some(1.0);
        assert!(matches!(core.add_drug(nan_dose), Err(PediatricDosingError::InvalidInput(_))));

        let mut negative = ffi_drug("Negative Granules", "kg");
        negative.dose_per_kg = Some(-0.5);
        assert!(matches!(core.add_drug(negative), Err(PediatricDosingError::InvalidInput(_))));

        let mut bad_ceiling = ffi_drug("Unbounded", "fixed");
        bad_ceiling.fixed_dose = Some(1.0);
        bad_ceiling.max_daily_dose = Some(f64::INFINITY);
        assert!(matches!(core.add_drug(bad_ceiling), Err(PediatricDosingError::InvalidInput(_))));

        let mut flooded = ffi_drug("Flooded", "fixed");
        flooded.fixed_dose = Some(1.0);
        flooded.administration_mode = "as_needed".into();
        flooded.max_uses_per_day = Some(u32::MAX);
        assert!(matches!(core.add_drug(flooded), Err(PediatricDosingError::InvalidInput(_))));

        let mut inverted = ffi_drug("Inverted", "fixed");
        inverted.fixed_dose = Some(1.0);
        inverted.min_age_months = Some(48);
        inverted.max_age_months = Some(12);
        assert!(matches!(core.add_drug(inverted), Err(PediatricDosingError::InvalidInput(_))));

        assert!(core.list_drugs_by_category(None).unwrap().is_empty());
    }

    #[test]
    fn test_negative_age_rejected() {
        let core = open_database_in_memory().unwrap();

        let mut drug = ffi_drug("Widecillin Fine Granules 10%", "kg");
        drug.dose_per_kg = Some(0.01);
        core.add_drug(drug).unwrap();

        for age in [-3, i64::MAX] {
            let err = core
                .calculate_dosage("Widecillin Fine Granules 10%".into(), 10.0, Some(age))
                .unwrap_err();
            match err {
                PediatricDosingError::Dosage { kind, .. } => assert_eq!(kind, "invalid_input"),
                other => panic!("unexpected error: {:?}", other),
            }

            let err = core
                .calculate_dosage_json("Widecillin Fine Granules 10%".into(), 10.0, Some(age))
                .unwrap_err();
            assert!(matches!(err, PediatricDosingError::Dosage { .. }));
        }
    }

    #[test]
    fn test_catalog_round_trip() {
        let core = open_database_in_memory().unwrap();

        let mut drug = ffi_drug("Rinderon Syrup 0.01%", "age");
        drug.category = Some("steroid".into());
        drug.age_brackets = vec![
            FfiAgeBracket { min_months: 13, max_months: 36, dose: 1.0 },
            FfiAgeBracket { min_months: 0, max_months: 12, dose: 0.5 },
        ];
        let id = core.add_drug(drug).unwrap();

        let stored = core.get_drug(id).unwrap().unwrap();
        assert_eq!(stored.dosing_basis, "age");
        assert_eq!(stored.age_brackets.len(), 2);
        assert_eq!(stored.age_brackets[0].min_months, 0);

        assert_eq!(core.list_categories().unwrap(), vec!["steroid"]);
        assert_eq!(core.search_drugs("rinderon".into(), 0).unwrap().len(), 1);

        core.delete_drug(id).unwrap();
        assert!(matches!(core.delete_drug(id), Err(PediatricDosingError::NotFound(_))));
    }
}
