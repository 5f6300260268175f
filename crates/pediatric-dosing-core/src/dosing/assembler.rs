//! Result assembly: output unit and mode-specific candidate lists.

use crate::models::{AdministrationMode, BasisKind, DosageResult, DrugRecord, MAX_USES_PER_DAY};

use super::{ResolvedDose, TimingVocabulary};

/// Formulation keywords and the unit a dose of that form is measured in.
const FORMULATION_UNITS: &[(&str, &str)] = &[
    ("powder", "g"),
    ("granule", "g"),
    ("dry syrup", "g"),
    ("syrup", "mL"),
    ("solution", "mL"),
    ("suspension", "mL"),
    ("drops", "mL"),
    ("tablet", "tablet"),
    ("capsule", "capsule"),
    ("suppository", "suppository"),
];

/// Unit for the computed dose.
///
/// A record-declared unit always wins. Otherwise the formulation decides,
/// then the dosing basis (weight-based → g, age-based or fixed → mL).
pub fn output_unit(record: &DrugRecord, basis: BasisKind) -> String {
    if let Some(unit) = record.dose_unit.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        return unit.to_string();
    }

    if let Some(formulation) = &record.formulation {
        let lower = formulation.to_lowercase();
        if let Some((_, unit)) = FORMULATION_UNITS.iter().find(|(kw, _)| lower.contains(kw)) {
            return unit.to_string();
        }
    }

    match basis {
        BasisKind::PerWeight => "g".to_string(),
        BasisKind::AgeBracketed | BasisKind::Fixed => "mL".to_string(),
    }
}

/// Doses-per-day choices to present for the record's mode.
///
/// Scheduled records surface their stored options. As-needed records offer
/// 1..=max uses per day (at most [`MAX_USES_PER_DAY`]), or nothing when no
/// cap is set.
pub fn frequency_candidates(record: &DrugRecord) -> Vec<u32> {
    match record.mode {
        AdministrationMode::Scheduled => record.frequency_options.clone(),
        AdministrationMode::AsNeeded => record
            .max_uses_per_day
            .map(|max| (1..=max.min(MAX_USES_PER_DAY)).collect())
            .unwrap_or_default(),
    }
}

/// Package a validated dose with the record's display metadata.
pub fn assemble(
    record: &DrugRecord,
    resolved: ResolvedDose,
    dose_unit: String,
    vocabulary: &TimingVocabulary,
) -> DosageResult {
    DosageResult {
        drug_name: record.name.clone(),
        aliases: record.aliases.clone(),
        dose: resolved.value,
        dose_unit,
        basis: resolved.basis,
        formulation: record.formulation.clone().unwrap_or_default(),
        mode: record.mode,
        frequency_options: frequency_candidates(record),
        timing_options: vocabulary.filter(record.mode, &record.timing_options),
        notes: record.notes.clone().unwrap_or_default(),
        min_age_months: record.min_age_months,
        max_age_months: record.max_age_months,
    }
}
