//! Drug catalog database operations.

use std::cmp::Ordering;

use rusqlite::{params, ErrorCode, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use strsim::{jaro_winkler, normalized_levenshtein};

use super::{Database, DbError, DbResult};
use crate::models::{AdministrationMode, AgeBracketTable, DosingBasis, DrugRecord};

const DRUG_COLUMNS: &str = r#"
    id, drug_name, aliases, category, dosing_basis, dose_per_kg,
    dose_age_brackets, fixed_dose, min_age_months, max_age_months,
    administration_mode, frequency_options, timing_options, max_daily_dose,
    max_uses_per_day, dose_unit, formulation, notes
"#;

impl Database {
    /// Insert a new drug, returning its row ID.
    pub fn insert_drug(&self, drug: &DrugRecord) -> DbResult<i64> {
        let columns = DrugColumns::from_record(drug)?;
        let now = chrono::Utc::now().to_rfc3339();

        self.conn
            .execute(
                r#"
                INSERT INTO drugs (
                    drug_name, aliases, category, dosing_basis, dose_per_kg,
                    dose_age_brackets, fixed_dose, min_age_months, max_age_months,
                    administration_mode, frequency_options, timing_options, max_daily_dose,
                    max_uses_per_day, dose_unit, formulation, notes, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?18)
                "#,
                params![
                    drug.name,
                    columns.aliases,
                    drug.category,
                    columns.basis,
                    columns.dose_per_kg,
                    columns.brackets,
                    columns.fixed_dose,
                    drug.min_age_months,
                    drug.max_age_months,
                    drug.mode.as_str(),
                    columns.frequency_options,
                    columns.timing_options,
                    drug.max_daily_dose,
                    drug.max_uses_per_day,
                    drug.dose_unit,
                    drug.formulation,
                    drug.notes,
                    now,
                ],
            )
            .map_err(|e| duplicate_or(e, &drug.name))?;

        let id = self.conn.last_insert_rowid();
        tracing::info!(id, drug = %drug.name, "Added drug");
        Ok(id)
    }

    /// Replace every field of an existing drug.
    pub fn update_drug(&self, id: i64, drug: &DrugRecord) -> DbResult<()> {
        let columns = DrugColumns::from_record(drug)?;
        let now = chrono::Utc::now().to_rfc3339();

        let rows_affected = self
            .conn
            .execute(
                r#"
                UPDATE drugs SET
                    drug_name = ?1, aliases = ?2, category = ?3, dosing_basis = ?4,
                    dose_per_kg = ?5, dose_age_brackets = ?6, fixed_dose = ?7,
                    min_age_months = ?8, max_age_months = ?9, administration_mode = ?10,
                    frequency_options = ?11, timing_options = ?12, max_daily_dose = ?13,
                    max_uses_per_day = ?14, dose_unit = ?15, formulation = ?16, notes = ?17,
                    updated_at = ?18
                WHERE id = ?19
                "#,
                params![
                    drug.name,
                    columns.aliases,
                    drug.category,
                    columns.basis,
                    columns.dose_per_kg,
                    columns.brackets,
                    columns.fixed_dose,
                    drug.min_age_months,
                    drug.max_age_months,
                    drug.mode.as_str(),
                    columns.frequency_options,
                    columns.timing_options,
                    drug.max_daily_dose,
                    drug.max_uses_per_day,
                    drug.dose_unit,
                    drug.formulation,
                    drug.notes,
                    now,
                    id,
                ],
            )
            .map_err(|e| duplicate_or(e, &drug.name))?;

        if rows_affected == 0 {
            return Err(DbError::NotFound(format!("drug id {}", id)));
        }
        tracing::info!(id, drug = %drug.name, "Updated drug");
        Ok(())
    }

    /// Delete a drug by row ID.
    pub fn delete_drug(&self, id: i64) -> DbResult<bool> {
        let rows_affected = self.conn.execute("DELETE FROM drugs WHERE id = ?", [id])?;
        if rows_affected > 0 {
            tracing::info!(id, "Deleted drug");
        }
        Ok(rows_affected > 0)
    }

    /// Get a drug by row ID.
    pub fn get_drug(&self, id: i64) -> DbResult<Option<DrugRecord>> {
        let sql = format!("SELECT {} FROM drugs WHERE id = ?", DRUG_COLUMNS);
        let row = self.conn.query_row(&sql, [id], DrugRow::read).optional()?;
        Ok(row.map(DrugRecord::from))
    }

    /// Get a drug by its unique name.
    pub fn get_drug_by_name(&self, name: &str) -> DbResult<Option<DrugRecord>> {
        let sql = format!("SELECT {} FROM drugs WHERE drug_name = ?", DRUG_COLUMNS);
        let row = self.conn.query_row(&sql, [name], DrugRow::read).optional()?;
        Ok(row.map(DrugRecord::from))
    }

    /// Search by substring of name or alias, best matches first.
    ///
    /// An empty query lists drugs by name.
    pub fn search_drugs(&self, query: &str, limit: usize) -> DbResult<Vec<DrugRecord>> {
        let query = query.trim();
        if query.is_empty() {
            let mut drugs = self.list_drugs_by_category(None)?;
            drugs.truncate(limit);
            return Ok(drugs);
        }

        let pattern = format!("%{}%", escape_like(query));
        let sql = format!(
            r#"
            SELECT {} FROM drugs
            WHERE drug_name LIKE ?1 ESCAPE '\' OR aliases LIKE ?1 ESCAPE '\'
            ORDER BY drug_name
            "#,
            DRUG_COLUMNS
        );
        let drugs = self.query_drugs(&sql, [pattern])?;

        let query_lower = query.to_lowercase();
        let mut scored: Vec<(f64, DrugRecord)> = drugs
            .into_iter()
            .map(|d| (score_name_match(&d, &query_lower), d))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

        Ok(scored.into_iter().take(limit).map(|(_, d)| d).collect())
    }

    /// List drugs in a category, or all drugs when no category is given.
    pub fn list_drugs_by_category(&self, category: Option<&str>) -> DbResult<Vec<DrugRecord>> {
        match category.map(str::trim).filter(|c| !c.is_empty()) {
            Some(category) => {
                let sql = format!(
                    "SELECT {} FROM drugs WHERE category = ? ORDER BY drug_name",
                    DRUG_COLUMNS
                );
                self.query_drugs(&sql, [category])
            }
            None => {
                let sql = format!("SELECT {} FROM drugs ORDER BY drug_name", DRUG_COLUMNS);
                self.query_drugs(&sql, params![])
            }
        }
    }

    /// Distinct non-empty categories, sorted.
    pub fn list_categories(&self) -> DbResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT DISTINCT category FROM drugs
            WHERE category IS NOT NULL AND category != ''
            ORDER BY category
            "#,
        )?;
        let rows = stmt.query_map([], |row| row.get(0))?;

        let mut categories = Vec::new();
        for row in rows {
            categories.push(row?);
        }
        Ok(categories)
    }

    fn query_drugs<P: rusqlite::Params>(&self, sql: &str, params: P) -> DbResult<Vec<DrugRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, DrugRow::read)?;

        let mut drugs = Vec::new();
        for row in rows {
            drugs.push(DrugRecord::from(row?));
        }
        Ok(drugs)
    }
}

/// Map a unique-name violation to [`DbError::Duplicate`].
fn duplicate_or(e: rusqlite::Error, name: &str) -> DbError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == ErrorCode::ConstraintViolation
                && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            DbError::Duplicate(name.to_string())
        }
        _ => DbError::Sqlite(e),
    }
}

fn escape_like(query: &str) -> String {
    query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Score name/alias match quality (0.0 - 1.0).
fn score_name_match(drug: &DrugRecord, query_lower: &str) -> f64 {
    if drug.matches_name(query_lower) {
        return 1.0;
    }

    std::iter::once(&drug.name)
        .chain(drug.aliases.iter())
        .map(|n| fuzzy_match(query_lower, &n.to_lowercase()))
        .fold(0.0, f64::max)
}

fn fuzzy_match(a: &str, b: &str) -> f64 {
    // Jaro-Winkler favors shared prefixes; Levenshtein tracks overall length
    let jw = jaro_winkler(a, b);
    let lev = normalized_levenshtein(a, b);
    jw * 0.6 + lev * 0.4
}

/// Flattened basis and JSON columns for a record.
struct DrugColumns {
    aliases: String,
    basis: String,
    dose_per_kg: Option<f64>,
    brackets: Option<String>,
    fixed_dose: Option<f64>,
    frequency_options: String,
    timing_options: String,
}

impl DrugColumns {
    fn from_record(drug: &DrugRecord) -> DbResult<Self> {
        if drug.name.trim().is_empty() {
            return Err(DbError::Constraint("drug name is required".into()));
        }
        drug.validate()
            .map_err(|e| DbError::Constraint(e.to_string()))?;

        let (dose_per_kg, brackets, fixed_dose) = match &drug.basis {
            DosingBasis::PerWeight { dose_per_kg } => (*dose_per_kg, None, None),
            DosingBasis::AgeBracketed { brackets } => {
                (None, brackets.as_ref().map(AgeBracketTable::to_range_map), None)
            }
            DosingBasis::Fixed { dose } => (None, None, *dose),
            DosingBasis::Unknown { .. } => (None, None, None),
        };

        Ok(Self {
            aliases: serde_json::to_string(&drug.aliases)?,
            basis: drug.basis.label().to_string(),
            dose_per_kg,
            brackets,
            fixed_dose,
            frequency_options: serde_json::to_string(&drug.frequency_options)?,
            timing_options: serde_json::to_string(&drug.timing_options)?,
        })
    }
}

/// Intermediate row struct for database mapping.
struct DrugRow {
    id: i64,
    name: String,
    aliases: String,
    category: Option<String>,
    basis: String,
    dose_per_kg: Option<f64>,
    brackets: Option<String>,
    fixed_dose: Option<f64>,
    min_age_months: Option<u32>,
    max_age_months: Option<u32>,
    mode: String,
    frequency_options: String,
    timing_options: String,
    max_daily_dose: Option<f64>,
    max_uses_per_day: Option<u32>,
    dose_unit: Option<String>,
    formulation: Option<String>,
    notes: Option<String>,
}

impl DrugRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            aliases: row.get(2)?,
            category: row.get(3)?,
            basis: row.get(4)?,
            dose_per_kg: row.get(5)?,
            brackets: row.get(6)?,
            fixed_dose: row.get(7)?,
            min_age_months: row.get(8)?,
            max_age_months: row.get(9)?,
            mode: row.get(10)?,
            frequency_options: row.get(11)?,
            timing_options: row.get(12)?,
            max_daily_dose: row.get(13)?,
            max_uses_per_day: row.get(14)?,
            dose_unit: row.get(15)?,
            formulation: row.get(16)?,
            notes: row.get(17)?,
        })
    }
}

impl From<DrugRow> for DrugRecord {
    fn from(row: DrugRow) -> Self {
        // Bad bracket text leaves the table absent so the calculation
        // reports missing dose data instead of failing the lookup.
        let brackets = row.brackets.as_deref().and_then(|text| {
            AgeBracketTable::from_range_map(text)
                .map_err(|e| {
                    tracing::warn!(drug = %row.name, error = %e, "Ignoring malformed age brackets");
                })
                .ok()
        });

        let mode = row.mode.parse::<AdministrationMode>().unwrap_or_else(|unknown| {
            tracing::warn!(drug = %row.name, mode = %unknown, "Unknown administration mode, using scheduled");
            AdministrationMode::Scheduled
        });

        DrugRecord {
            id: Some(row.id),
            basis: DosingBasis::from_parts(&row.basis, row.dose_per_kg, brackets, row.fixed_dose),
            aliases: json_list(&row.name, "aliases", &row.aliases),
            frequency_options: json_list(&row.name, "frequency_options", &row.frequency_options),
            timing_options: json_list(&row.name, "timing_options", &row.timing_options),
            name: row.name,
            category: row.category,
            min_age_months: row.min_age_months,
            max_age_months: row.max_age_months,
            mode,
            max_daily_dose: row.max_daily_dose,
            max_uses_per_day: row.max_uses_per_day,
            dose_unit: row.dose_unit,
            formulation: row.formulation,
            notes: row.notes,
        }
    }
}

/// Decode a JSON list column, treating unreadable text as empty.
fn json_list<T: DeserializeOwned>(drug: &str, column: &str, text: &str) -> Vec<T> {
    serde_json::from_str(text).unwrap_or_else(|e| {
        tracing::warn!(drug, column, error = %e, "Ignoring malformed list column");
        Vec::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AgeBracket;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn calonal_granules() -> DrugRecord {
        let mut drug = DrugRecord::new(
            "Calonal Fine Granules 20%",
            DosingBasis::PerWeight {
                dose_per_kg: Some(0.05),
            },
        );
        drug.aliases = vec!["acetaminophen".into(), "antipyretic".into()];
        drug.category = Some("antipyretic".into());
        drug.mode = AdministrationMode::AsNeeded;
        drug.max_uses_per_day = Some(4);
        drug.timing_options = vec!["when feverish".into()];
        drug.max_daily_dose = Some(1.5);
        drug
    }

    fn rinderon_syrup() -> DrugRecord {
        let table = AgeBracketTable::new(vec![
            AgeBracket::new(0, 12, 0.5),
            AgeBracket::new(13, 36, 1.0),
        ])
        .unwrap();
        let mut drug = DrugRecord::new(
            "Rinderon Syrup 0.01%",
            DosingBasis::AgeBracketed {
                brackets: Some(table),
            },
        );
        drug.aliases = vec!["betamethasone".into()];
        drug.category = Some("steroid".into());
        drug.min_age_months = Some(0);
        drug.max_age_months = Some(36);
        drug.frequency_options = vec![1, 2];
        drug
    }

    #[test]
    fn test_insert_and_get() {
        let db = setup_db();

        let id = db.insert_drug(&calonal_granules()).unwrap();
        let retrieved = db.get_drug(id).unwrap().unwrap();

        let mut expected = calonal_granules();
        expected.id = Some(id);
        assert_eq!(retrieved, expected);
    }

    #[test]
    fn test_brackets_persisted() {
        let db = setup_db();
        db.insert_drug(&rinderon_syrup()).unwrap();

        let retrieved = db.get_drug_by_name("Rinderon Syrup 0.01%").unwrap().unwrap();
        match retrieved.basis {
            DosingBasis::AgeBracketed { brackets: Some(table) } => {
                assert_eq!(table.len(), 2);
                assert_eq!(table.lookup(20).map(|b| b.dose), Some(1.0));
            }
            other => panic!("unexpected basis: {:?}", other),
        }
        assert_eq!(retrieved.frequency_options, vec![1, 2]);
    }

    #[test]
    fn test_duplicate_name() {
        let db = setup_db();
        db.insert_drug(&calonal_granules()).unwrap();

        let result = db.insert_drug(&calonal_granules());
        assert!(matches!(result, Err(DbError::Duplicate(name)) if name == "Calonal Fine Granules 20%"));
    }

    #[test]
    fn test_empty_name_rejected() {
        let db = setup_db();
        let drug = DrugRecord::new("  ", DosingBasis::Fixed { dose: Some(1.0) });
        assert!(matches!(db.insert_drug(&drug), Err(DbError::Constraint(_))));
    }

    #[test]
    fn test_update_and_delete() {
        let db = setup_db();
        let id = db.insert_drug(&calonal_granules()).unwrap();

        let mut drug = calonal_granules();
        drug.basis = DosingBasis::Fixed { dose: Some(5.0) };
        drug.notes = Some("Leave at least 6 hours between doses".into());
        db.update_drug(id, &drug).unwrap();

        let retrieved = db.get_drug(id).unwrap().unwrap();
        assert_eq!(retrieved.basis, DosingBasis::Fixed { dose: Some(5.0) });
        assert_eq!(retrieved.notes.as_deref(), Some("Leave at least 6 hours between doses"));

        assert!(matches!(db.update_drug(id + 1, &drug), Err(DbError::NotFound(_))));

        assert!(db.delete_drug(id).unwrap());
        assert!(!db.delete_drug(id).unwrap());
        assert!(db.get_drug(id).unwrap().is_none());
    }

    #[test]
    fn test_search_by_name_and_alias() {
        let db = setup_db();
        db.insert_drug(&calonal_granules()).unwrap();
        db.insert_drug(&rinderon_syrup()).unwrap();

        let results = db.search_drugs("calonal", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Calonal Fine Granules 20%");

        let results = db.search_drugs("betametha", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Rinderon Syrup 0.01%");

        assert!(db.search_drugs("ibuprofen", 10).unwrap().is_empty());
        assert_eq!(db.search_drugs("", 10).unwrap().len(), 2);
        assert_eq!(db.search_drugs("", 1).unwrap().len(), 1);
    }

    #[test]
    fn test_search_ranks_exact_match_first() {
        let db = setup_db();
        db.insert_drug(&DrugRecord::new("Syrup Base Extra", DosingBasis::Fixed { dose: Some(1.0) }))
            .unwrap();
        db.insert_drug(&DrugRecord::new("Syrup", DosingBasis::Fixed { dose: Some(1.0) }))
            .unwrap();

        let results = db.search_drugs("syrup", 10).unwrap();
        assert_eq!(results[0].name, "Syrup");
    }

    #[test]
    fn test_search_escapes_wildcards() {
        let db = setup_db();
        db.insert_drug(&rinderon_syrup()).unwrap();
        db.insert_drug(&DrugRecord::new("Plain Syrup", DosingBasis::Fixed { dose: Some(1.0) }))
            .unwrap();

        let results = db.search_drugs("%", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Rinderon Syrup 0.01%");
        assert!(db.search_drugs("_", 10).unwrap().is_empty());
    }

    #[test]
    fn test_categories() {
        let db = setup_db();
        db.insert_drug(&calonal_granules()).unwrap();
        db.insert_drug(&rinderon_syrup()).unwrap();
        db.insert_drug(&DrugRecord::new("Uncategorized", DosingBasis::Fixed { dose: Some(1.0) }))
            .unwrap();

        assert_eq!(db.list_categories().unwrap(), vec!["antipyretic", "steroid"]);

        let steroids = db.list_drugs_by_category(Some("steroid")).unwrap();
        assert_eq!(steroids.len(), 1);
        assert_eq!(steroids[0].name, "Rinderon Syrup 0.01%");

        assert_eq!(db.list_drugs_by_category(None).unwrap().len(), 3);
        assert_eq!(db.list_drugs_by_category(Some(" ")).unwrap().len(), 3);
    }

    #[test]
    fn test_malformed_stored_brackets() {
        let db = setup_db();
        db.conn()
            .execute(
                "INSERT INTO drugs (drug_name, dosing_basis, dose_age_brackets, administration_mode, created_at, updated_at)
                 VALUES ('Broken', 'age', '{\"0-12\": 1.0, \"6-18\": 2.0}', 'weekly', 'now', 'now')",
                [],
            )
            .unwrap();

        let drug = db.get_drug_by_name("Broken").unwrap().unwrap();
        assert_eq!(drug.basis, DosingBasis::AgeBracketed { brackets: None });
        assert_eq!(drug.mode, AdministrationMode::Scheduled);
    }

    #[test]
    fn test_malformed_list_columns_still_load() {
        let db = setup_db();
        db.insert_drug(&rinderon_syrup()).unwrap();
        db.conn()
            .execute(
                "INSERT INTO drugs (drug_name, aliases, category, dosing_basis, fixed_dose,
                                    frequency_options, timing_options, created_at, updated_at)
                 VALUES ('Garbled Syrup', 'not json', 'steroid', 'fixed', 1.0, '[1, \"two\"]', '{', 'now', 'now')",
                [],
            )
            .unwrap();

        let drug = db.get_drug_by_name("Garbled Syrup").unwrap().unwrap();
        assert!(drug.aliases.is_empty());
        assert!(drug.frequency_options.is_empty());
        assert!(drug.timing_options.is_empty());
        assert_eq!(drug.basis, DosingBasis::Fixed { dose: Some(1.0) });

        assert_eq!(db.list_drugs_by_category(Some("steroid")).unwrap().len(), 2);
        let results = db.search_drugs("syrup", 10).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_unusable_record_rejected() {
        let db = setup_db();

        let negative = DrugRecord::new("Negative", DosingBasis::PerWeight { dose_per_kg: Some(-0.5) });
        assert!(matches!(db.insert_drug(&negative), Err(DbError::Constraint(_))));

        let mut flooded = calonal_granules();
        flooded.max_uses_per_day = Some(u32::MAX);
        assert!(matches!(db.insert_drug(&flooded), Err(DbError::Constraint(_))));

        let id = db.insert_drug(&rinderon_syrup()).unwrap();
        let mut inverted = rinderon_syrup();
        inverted.min_age_months = Some(48);
        assert!(matches!(db.update_drug(id, &inverted), Err(DbError::Constraint(_))));
        assert_eq!(db.get_drug(id).unwrap().unwrap().min_age_months, Some(0));
    }
}
