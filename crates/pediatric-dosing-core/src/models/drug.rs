//! Drug record models.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading age-bracket data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BracketError {
    #[error("Malformed age range key: {0:?} (expected \"min-max\" in months)")]
    MalformedRange(String),

    #[error("Age range {min}-{max} has its minimum above its maximum")]
    InvertedRange { min: u32, max: u32 },

    #[error("Age range {min}-{max} has an invalid dose: {dose}")]
    InvalidDose { min: u32, max: u32, dose: f64 },

    #[error("Age ranges {first} and {second} overlap")]
    Overlap { first: String, second: String },

    #[error("Age bracket data is not a JSON object of numbers: {0}")]
    Json(String),
}

/// Most as-needed administrations a record may allow per day.
pub const MAX_USES_PER_DAY: u32 = 24;

/// Record-level values that can never produce a usable dose.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("{field} must be a non-negative number, got {value}")]
    InvalidDose { field: &'static str, value: f64 },

    #[error("Minimum age {min} months is above maximum age {max} months")]
    InvertedAgeWindow { min: u32, max: u32 },

    #[error("Max uses per day must be between 1 and {max}, got {uses}")]
    UsesPerDayOutOfRange { uses: u32, max: u32 },
}

/// One inclusive month range mapped to a dose.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AgeBracket {
    /// First month covered (inclusive)
    pub min_months: u32,
    /// Last month covered (inclusive)
    pub max_months: u32,
    /// Dose for patients inside the range
    pub dose: f64,
}

impl AgeBracket {
    pub fn new(min_months: u32, max_months: u32, dose: f64) -> Self {
        Self {
            min_months,
            max_months,
            dose,
        }
    }

    /// Check if an age falls inside this bracket.
    pub fn contains(&self, age_months: u32) -> bool {
        self.min_months <= age_months && age_months <= self.max_months
    }

    fn range_key(&self) -> String {
        format!("{}-{}", self.min_months, self.max_months)
    }
}

/// Validated, non-overlapping set of age brackets sorted by lower bound.
///
/// Gaps between brackets are allowed; a lookup that lands in a gap simply
/// finds nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "Vec<AgeBracket>", into = "Vec<AgeBracket>")]
pub struct AgeBracketTable {
    brackets: Vec<AgeBracket>,
}

impl AgeBracketTable {
    /// Build a table, rejecting inverted ranges, bad doses, and overlaps.
    pub fn new(mut brackets: Vec<AgeBracket>) -> Result<Self, BracketError> {
        for b in &brackets {
            if b.min_months > b.max_months {
                return Err(BracketError::InvertedRange {
                    min: b.min_months,
                    max: b.max_months,
                });
            }
            if !is_usable_amount(b.dose) {
                return Err(BracketError::InvalidDose {
                    min: b.min_months,
                    max: b.max_months,
                    dose: b.dose,
                });
            }
        }

        brackets.sort_by_key(|b| (b.min_months, b.max_months));

        for pair in brackets.windows(2) {
            if pair[1].min_months <= pair[0].max_months {
                return Err(BracketError::Overlap {
                    first: pair[0].range_key(),
                    second: pair[1].range_key(),
                });
            }
        }

        Ok(Self { brackets })
    }

    /// Parse the persisted `{"0-12": 1.0, "13-36": 2.0}` form.
    ///
    /// Repeated keys are kept as separate entries and rejected as overlaps.
    pub fn from_range_map(text: &str) -> Result<Self, BracketError> {
        let raw: RangeEntries =
            serde_json::from_str(text).map_err(|e| BracketError::Json(e.to_string()))?;

        let brackets = raw
            .0
            .into_iter()
            .map(|(key, dose)| {
                let (min, max) = parse_range_key(&key)?;
                Ok(AgeBracket::new(min, max, dose))
            })
            .collect::<Result<Vec<_>, BracketError>>()?;

        Self::new(brackets)
    }

    /// Serialize back to the persisted `"min-max": dose` form.
    pub fn to_range_map(&self) -> String {
        let map: serde_json::Map<String, serde_json::Value> = self
            .brackets
            .iter()
            .map(|b| (b.range_key(), serde_json::Value::from(b.dose)))
            .collect();
        serde_json::Value::Object(map).to_string()
    }

    /// Find the bracket containing the given age.
    pub fn lookup(&self, age_months: u32) -> Option<&AgeBracket> {
        self.brackets.iter().find(|b| b.contains(age_months))
    }

    pub fn brackets(&self) -> &[AgeBracket] {
        &self.brackets
    }

    pub fn is_empty(&self) -> bool {
        self.brackets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.brackets.len()
    }
}

impl TryFrom<Vec<AgeBracket>> for AgeBracketTable {
    type Error = BracketError;

    fn try_from(brackets: Vec<AgeBracket>) -> Result<Self, Self::Error> {
        Self::new(brackets)
    }
}

impl From<AgeBracketTable> for Vec<AgeBracket> {
    fn from(table: AgeBracketTable) -> Self {
        table.brackets
    }
}

/// Entries of a `"min-max": dose` object in document order.
#[derive(Deserialize)]
#[serde(transparent)]
struct RangeEntries(#[serde(deserialize_with = "deserialize_range_entries")] Vec<(String, f64)>);

fn deserialize_range_entries<'de, D>(deserializer: D) -> Result<Vec<(String, f64)>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct EntryList;

    impl<'de> de::Visitor<'de> for EntryList {
        type Value = Vec<(String, f64)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an object of \"min-max\": dose entries")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: de::MapAccess<'de>,
        {
            let mut entries = Vec::new();
            while let Some((key, dose)) = map.next_entry::<String, f64>()? {
                entries.push((key, dose));
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(EntryList)
}

fn parse_range_key(key: &str) -> Result<(u32, u32), BracketError> {
    let malformed = || BracketError::MalformedRange(key.to_string());
    let (min, max) = key.split_once('-').ok_or_else(malformed)?;
    let min = min.trim().parse::<u32>().map_err(|_| malformed())?;
    let max = max.trim().parse::<u32>().map_err(|_| malformed())?;
    Ok((min, max))
}

/// Rule family used to derive a dose. Exactly one payload is active.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "basis", rename_all = "snake_case")]
pub enum DosingBasis {
    /// Dose = weight (kg) × coefficient
    PerWeight { dose_per_kg: Option<f64> },
    /// Dose looked up from inclusive month ranges
    AgeBracketed { brackets: Option<AgeBracketTable> },
    /// Same dose for every patient
    Fixed { dose: Option<f64> },
    /// Basis label not recognized when the record was loaded
    Unknown { label: String },
}

/// Payload-free discriminant of [`DosingBasis`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BasisKind {
    PerWeight,
    AgeBracketed,
    Fixed,
}

impl BasisKind {
    /// Label used in the catalog store.
    pub fn as_str(&self) -> &'static str {
        match self {
            BasisKind::PerWeight => "kg",
            BasisKind::AgeBracketed => "age",
            BasisKind::Fixed => "fixed",
        }
    }
}

impl fmt::Display for BasisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BasisKind::PerWeight => "weight-based",
            BasisKind::AgeBracketed => "age-based",
            BasisKind::Fixed => "fixed-dose",
        };
        f.write_str(text)
    }
}

impl FromStr for BasisKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "kg" | "per_weight" | "weight" => Ok(BasisKind::PerWeight),
            "age" | "per_age_bracket" | "age_bracketed" => Ok(BasisKind::AgeBracketed),
            "fixed" => Ok(BasisKind::Fixed),
            other => Err(other.to_string()),
        }
    }
}

impl DosingBasis {
    /// Assemble a basis from flat store columns, keeping only the payload
    /// the label selects.
    pub fn from_parts(
        label: &str,
        dose_per_kg: Option<f64>,
        brackets: Option<AgeBracketTable>,
        fixed_dose: Option<f64>,
    ) -> Self {
        match label.parse::<BasisKind>() {
            Ok(BasisKind::PerWeight) => DosingBasis::PerWeight { dose_per_kg },
            Ok(BasisKind::AgeBracketed) => DosingBasis::AgeBracketed { brackets },
            Ok(BasisKind::Fixed) => DosingBasis::Fixed { dose: fixed_dose },
            Err(_) => DosingBasis::Unknown {
                label: label.to_string(),
            },
        }
    }

    pub fn kind(&self) -> Option<BasisKind> {
        match self {
            DosingBasis::PerWeight { .. } => Some(BasisKind::PerWeight),
            DosingBasis::AgeBracketed { .. } => Some(BasisKind::AgeBracketed),
            DosingBasis::Fixed { .. } => Some(BasisKind::Fixed),
            DosingBasis::Unknown { .. } => None,
        }
    }

    /// Store label for this basis.
    pub fn label(&self) -> &str {
        match self {
            DosingBasis::Unknown { label } => label,
            known => known.kind().map(|k| k.as_str()).unwrap_or_default(),
        }
    }

    pub fn requires_age(&self) -> bool {
        matches!(self, DosingBasis::AgeBracketed { .. })
    }
}

/// How the drug is taken over a day.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AdministrationMode {
    /// Recurring schedule; the dose is the daily total
    #[default]
    Scheduled,
    /// On demand; the dose is a single administration
    AsNeeded,
}

impl AdministrationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdministrationMode::Scheduled => "scheduled",
            AdministrationMode::AsNeeded => "as_needed",
        }
    }
}

impl FromStr for AdministrationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "" | "scheduled" => Ok(AdministrationMode::Scheduled),
            "as_needed" | "prn" => Ok(AdministrationMode::AsNeeded),
            other => Err(other.to_string()),
        }
    }
}

/// A medication's dosing rule, safety bounds, and display metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DrugRecord {
    /// Store row ID, absent until persisted
    pub id: Option<i64>,
    /// Unique drug name
    pub name: String,
    /// Alternative names (generic name, brand, drug class)
    pub aliases: Vec<String>,
    /// Free-text category (e.g., "antipyretic")
    pub category: Option<String>,
    /// Dosing rule
    pub basis: DosingBasis,
    /// Youngest eligible age in months (inclusive)
    pub min_age_months: Option<u32>,
    /// Oldest eligible age in months (inclusive)
    pub max_age_months: Option<u32>,
    pub mode: AdministrationMode,
    /// Doses-per-day options shown to the prescriber
    pub frequency_options: Vec<u32>,
    /// Timing labels (e.g., "after breakfast", "when feverish")
    pub timing_options: Vec<String>,
    /// Absolute per-day ceiling, in the output unit
    pub max_daily_dose: Option<f64>,
    /// Cap on as-needed administrations per day
    pub max_uses_per_day: Option<u32>,
    /// Unit attached to the computed dose (e.g., "g", "mL")
    pub dose_unit: Option<String>,
    /// Formulation label (e.g., "granules 20%", "syrup")
    pub formulation: Option<String>,
    /// Clinical notes, passed through untouched
    pub notes: Option<String>,
}

impl DrugRecord {
    /// Create a new record with required fields.
    pub fn new(name: impl Into<String>, basis: DosingBasis) -> Self {
        Self {
            id: None,
            name: name.into(),
            aliases: Vec::new(),
            category: None,
            basis,
            min_age_months: None,
            max_age_months: None,
            mode: AdministrationMode::default(),
            frequency_options: Vec::new(),
            timing_options: Vec::new(),
            max_daily_dose: None,
            max_uses_per_day: None,
            dose_unit: None,
            formulation: None,
            notes: None,
        }
    }

    /// Reject values no patient could be dosed from: negative or
    /// non-finite doses and ceilings, an inverted age window, and an
    /// as-needed cap outside `1..=MAX_USES_PER_DAY`.
    pub fn validate(&self) -> Result<(), RecordError> {
        let dose_field = match &self.basis {
            DosingBasis::PerWeight { dose_per_kg } => dose_per_kg.map(|v| ("dose_per_kg", v)),
            DosingBasis::Fixed { dose } => dose.map(|v| ("fixed_dose", v)),
            DosingBasis::AgeBracketed { .. } | DosingBasis::Unknown { .. } => None,
        };
        let ceiling = self.max_daily_dose.map(|v| ("max_daily_dose", v));

        for (field, value) in dose_field.into_iter().chain(ceiling) {
            if !is_usable_amount(value) {
                return Err(RecordError::InvalidDose { field, value });
            }
        }

        if let (Some(min), Some(max)) = (self.min_age_months, self.max_age_months) {
            if min > max {
                return Err(RecordError::InvertedAgeWindow { min, max });
            }
        }

        match self.max_uses_per_day {
            Some(uses) if uses == 0 || uses > MAX_USES_PER_DAY => {
                Err(RecordError::UsesPerDayOutOfRange {
                    uses,
                    max: MAX_USES_PER_DAY,
                })
            }
            _ => Ok(()),
        }
    }

    pub fn has_age_window(&self) -> bool {
        self.min_age_months.is_some() || self.max_age_months.is_some()
    }

    /// Check if a name matches the record name or one of its aliases.
    pub fn matches_name(&self, query: &str) -> bool {
        let query_lower = query.to_lowercase();
        self.name.to_lowercase() == query_lower
            || self.aliases.iter().any(|a| a.to_lowercase() == query_lower)
    }
}

/// Finite and non-negative.
pub fn is_usable_amount(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}
