//! SQLite schema definition.

/// Complete database schema for the drug catalog.
pub const SCHEMA: &str = r#"
-- ============================================================================
-- Drug Catalog
-- ============================================================================

CREATE TABLE IF NOT EXISTS drugs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    drug_name TEXT NOT NULL UNIQUE,
    aliases TEXT NOT NULL DEFAULT '[]',           -- JSON array of strings
    category TEXT,
    dosing_basis TEXT NOT NULL,                   -- 'kg' | 'age' | 'fixed'
    dose_per_kg REAL,
    dose_age_brackets TEXT,                       -- JSON object {"min-max": dose}
    fixed_dose REAL,
    min_age_months INTEGER CHECK (min_age_months IS NULL OR min_age_months >= 0),
    max_age_months INTEGER CHECK (max_age_months IS NULL OR max_age_months >= 0),
    administration_mode TEXT NOT NULL DEFAULT 'scheduled',
    frequency_options TEXT NOT NULL DEFAULT '[]', -- JSON array of integers
    timing_options TEXT NOT NULL DEFAULT '[]',    -- JSON array of strings
    max_daily_dose REAL,
    max_uses_per_day INTEGER CHECK (max_uses_per_day IS NULL OR max_uses_per_day BETWEEN 1 AND 24),
    dose_unit TEXT,
    formulation TEXT,
    notes TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    CHECK (min_age_months IS NULL OR max_age_months IS NULL OR min_age_months <= max_age_months)
);

CREATE INDEX IF NOT EXISTS idx_drugs_category ON drugs(category);
"#;
