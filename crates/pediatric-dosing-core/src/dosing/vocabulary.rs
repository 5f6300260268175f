//! Timing label vocabularies.
//!
//! Handles:
//! - Routine labels for scheduled use (after meals, before bed)
//! - Situational labels for as-needed use (when feverish, when in pain)

use crate::models::AdministrationMode;

/// Label offered when an as-needed record has no situational timing.
pub const AS_NEEDED_LABEL: &str = "as needed";

/// Recognized timing terms per administration mode.
#[derive(Debug, Clone, PartialEq)]
pub struct TimingVocabulary {
    /// Terms marking a label as routine/schedule-oriented
    scheduled: Vec<String>,
    /// Terms marking a label as situational
    as_needed: Vec<String>,
}

impl Default for TimingVocabulary {
    fn default() -> Self {
        Self::new()
    }
}

impl TimingVocabulary {
    /// Create a vocabulary with the default terms.
    pub fn new() -> Self {
        Self {
            scheduled: Self::default_scheduled(),
            as_needed: Self::default_as_needed(),
        }
    }

    /// Keep the labels recognized for the given mode.
    ///
    /// Scheduled records fall back to every label when none is recognized.
    /// As-needed records fall back to a single [`AS_NEEDED_LABEL`].
    pub fn filter(&self, mode: AdministrationMode, labels: &[String]) -> Vec<String> {
        let terms = match mode {
            AdministrationMode::Scheduled => &self.scheduled,
            AdministrationMode::AsNeeded => &self.as_needed,
        };

        let matched: Vec<String> = labels
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty() && Self::recognizes(terms, l))
            .map(str::to_string)
            .collect();

        if !matched.is_empty() {
            return matched;
        }

        match mode {
            AdministrationMode::Scheduled => labels
                .iter()
                .map(|l| l.trim())
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            AdministrationMode::AsNeeded => vec![AS_NEEDED_LABEL.to_string()],
        }
    }

    /// Check if a label contains any term (case-insensitive).
    fn recognizes(terms: &[String], label: &str) -> bool {
        let lower = label.to_lowercase();
        terms.iter().any(|t| lower.contains(t.as_str()))
    }

    /// Add a routine timing term.
    pub fn add_scheduled(&mut self, term: &str) {
        self.scheduled.push(term.trim().to_lowercase());
    }

    /// Add a situational timing term.
    pub fn add_as_needed(&mut self, term: &str) {
        self.as_needed.push(term.trim().to_lowercase());
    }

    fn default_scheduled() -> Vec<String> {
        [
            "after breakfast",
            "after lunch",
            "after dinner",
            "after meals",
            "before meals",
            "between meals",
            "before bed",
            "morning",
            "evening",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }

    fn default_as_needed() -> Vec<String> {
        [
            AS_NEEDED_LABEL,
            "when feverish",
            "when in pain",
            "when coughing",
            "when nauseous",
            "when unable to sleep",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }
}
