use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Raw, un-normalized component readings for one sector, keyed by component name.
pub type Components = HashMap<String, f64>;

/// Grid rows are lettered, so a grid has at most `A..=Z`.
pub const MAX_GRID_ROWS: usize = 26;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sector(String);

impl Sector {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Row-major grid of sectors named `A1`, `A2`, ... Rows past
    /// [`MAX_GRID_ROWS`] are dropped; profiles reject them before this point.
    pub fn grid(rows: usize, cols: usize) -> Vec<Sector> {
        (0..rows.min(MAX_GRID_ROWS))
            .flat_map(|row| {
                let letter = (b'A' + row as u8) as char;
                (1..=cols).map(move |col| Sector(format!("{letter}{col}")))
            })
            .collect()
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator weights per component. Not required to sum to 1.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightSet(BTreeMap<String, f64>);

impl WeightSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, component: impl Into<String>, weight: f64) -> Self {
        self.set(component, weight);
        self
    }

    pub fn set(&mut self, component: impl Into<String>, weight: f64) {
        self.0.insert(component.into(), weight);
    }

    pub fn get(&self, component: &str) -> Option<f64> {
        self.0.get(component).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(name, weight)| (name.as_str(), *weight))
    }

    pub fn sum(&self) -> f64 {
        self.0.values().sum()
    }

    /// Divide every weight by the total. An all-zero set stays all zero.
    pub fn normalized(&self) -> WeightSet {
        let total = self.sum();
        if total <= 0.0 {
            return self.clone();
        }
        WeightSet(
            self.0
                .iter()
                .map(|(name, weight)| (name.clone(), weight / total))
                .collect(),
        )
    }
}

impl FromIterator<(String, f64)> for WeightSet {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        WeightSet(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskBand {
    Low,
    Moderate,
    Elevated,
    Critical,
}

impl RiskBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskBand::Low => "low",
            RiskBand::Moderate => "moderate",
            RiskBand::Elevated => "elevated",
            RiskBand::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitizenReport {
    pub id: Uuid,
    pub sector: Sector,
    pub issue: String,
    pub severity: u8,
    pub comment: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorScore {
    pub sector: Sector,
    /// Weighted sum of normalized components, before scaling.
    pub raw_score: f64,
    pub scaled_score: f64,
    pub band: RiskBand,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Aggregates {
    pub avg: f64,
    pub max: f64,
    pub alert_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    pub timestamp: DateTime<Utc>,
    pub scores: Vec<SectorScore>,
    pub aggregates: Aggregates,
}

#[derive(Debug, Clone)]
pub struct IssueSummary {
    pub issue: String,
    pub count: usize,
    pub avg_severity: f64,
}
