use crate::defaults;
use crate::expression::types::ExpressionEvent;
use serde::Serialize;
use std::collections::BTreeMap;

/// Accumulated duration per expression label.
///
/// Durations of different units are summed as-is; mixing only happens when
/// the backend is resolved in the middle of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ExpressionTotals {
    totals: BTreeMap<String, f64>,
}

impl Default for ExpressionTotals {
    fn default() -> Self {
        Self {
            totals: defaults::KNOWN_EXPRESSIONS
                .iter()
                .map(|label| (label.to_string(), 0.0))
                .collect(),
        }
    }
}

impl ExpressionTotals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: &ExpressionEvent) {
        *self.totals.entry(event.label.clone()).or_insert(0.0) += event.duration;
    }

    pub fn get(&self, label: &str) -> f64 {
        self.totals.get(label).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.totals.iter().map(|(label, total)| (label.as_str(), *total))
    }
}
