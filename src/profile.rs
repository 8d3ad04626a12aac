//! Per-domain scoring configuration.
//!
//! A profile fixes the sector layout, each component's calibration range and
//! default weight, the scale/ceiling pair and the band thresholds. Built-in
//! profiles cover traffic, waste and energy; any of them can be dumped to JSON,
//! edited and loaded back with `--profile`.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{ProfileError, ScoreError};
use crate::models::{Sector, WeightSet, MAX_GRID_ROWS};
use crate::risk::{self, BandThresholds, FusionScorer, Range};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Traffic,
    Waste,
    Energy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentConfig {
    pub name: String,
    pub min: f64,
    pub max: f64,
    pub weight: f64,
    #[serde(default)]
    pub unit: String,
}

/// Turns qualifying citizen reports into a 0/1 incident component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentRule {
    pub component: String,
    pub issue: String,
    pub min_severity: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedReport {
    pub sector: String,
    pub issue: String,
    pub severity: u8,
    pub comment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainProfile {
    pub name: String,
    pub domain: Domain,
    pub rows: usize,
    pub cols: usize,
    pub components: Vec<ComponentConfig>,
    pub scale_factor: f64,
    pub output_ceiling: f64,
    pub bands: BandThresholds,
    pub alert_threshold: f64,
    #[serde(default)]
    pub renormalize_weights: bool,
    /// Component fed with the per-sector sum of citizen report severities.
    #[serde(default)]
    pub citizen_component: Option<String>,
    #[serde(default)]
    pub incident_rule: Option<IncidentRule>,
    #[serde(default)]
    pub issue_types: Vec<String>,
    #[serde(default)]
    pub seed_reports: Vec<SeedReport>,
}

fn component(name: &str, min: f64, max: f64, weight: f64, unit: &str) -> ComponentConfig {
    ComponentConfig {
        name: name.to_string(),
        min,
        max,
        weight,
        unit: unit.to_string(),
    }
}

fn seed(sector: &str, issue: &str, severity: u8, comment: &str) -> SeedReport {
    SeedReport {
        sector: sector.to_string(),
        issue: issue.to_string(),
        severity,
        comment: comment.to_string(),
    }
}

impl DomainProfile {
    pub fn builtin(domain: Domain) -> Self {
        match domain {
            Domain::Traffic => Self::traffic(),
            Domain::Waste => Self::waste(),
            Domain::Energy => Self::energy(),
        }
    }

    pub fn traffic() -> Self {
        Self {
            name: "traffic".to_string(),
            domain: Domain::Traffic,
            rows: 3,
            cols: 3,
            components: vec![
                component("sensor", 0.0, 800.0, 0.6, "veh/hr"),
                component("citizen", 0.0, 25.0, 0.3, "severity sum"),
                component("incident", 0.0, 1.0, 0.1, "flag"),
            ],
            scale_factor: 120.0,
            output_ceiling: 200.0,
            bands: BandThresholds::default(),
            alert_threshold: 85.0,
            renormalize_weights: false,
            citizen_component: Some("citizen".to_string()),
            incident_rule: Some(IncidentRule {
                component: "incident".to_string(),
                issue: "Accident".to_string(),
                min_severity: 3,
            }),
            issue_types: vec![
                "Accident".to_string(),
                "Heavy Traffic".to_string(),
                "Road Hazard".to_string(),
            ],
            seed_reports: vec![
                seed("A1", "Accident", 4, "Multi-car crash"),
                seed("B2", "Heavy Traffic", 2, "Slow moving"),
                seed("C3", "Road Hazard", 3, "Debris on road"),
            ],
        }
    }

    pub fn waste() -> Self {
        Self {
            name: "waste".to_string(),
            domain: Domain::Waste,
            rows: 3,
            cols: 3,
            components: vec![
                component("sensor", 0.0, 200.0, 0.6, "% fill"),
                component("hours", 0.0, 72.0, 0.25, "h since collection"),
                component("citizen", 0.0, 25.0, 0.15, "severity sum"),
            ],
            scale_factor: 120.0,
            output_ceiling: 200.0,
            bands: BandThresholds::default(),
            alert_threshold: 85.0,
            renormalize_weights: false,
            citizen_component: Some("citizen".to_string()),
            incident_rule: None,
            issue_types: vec![
                "Overflow".to_string(),
                "Missed Pickup".to_string(),
                "Illegal Dumping".to_string(),
            ],
            seed_reports: vec![
                seed("B2", "Overflow", 4, "Bins overflowing near mall"),
                seed("A3", "Missed Pickup", 3, "No collection today"),
            ],
        }
    }

    /// Storage deficit mirrors the streetlight storage colors: a deficit of
    /// 40 / 65 / 85 is storage below 60 / 35 / 15 percent.
    pub fn energy() -> Self {
        Self {
            name: "energy".to_string(),
            domain: Domain::Energy,
            rows: 3,
            cols: 3,
            components: vec![
                component("storage_deficit", 0.0, 100.0, 0.85, "% empty"),
                component("outage", 0.0, 2.0, 0.15, "kWh unmet"),
            ],
            scale_factor: 100.0,
            output_ceiling: 100.0,
            bands: BandThresholds {
                moderate: 40.0,
                elevated: 65.0,
                critical: 85.0,
            },
            alert_threshold: 65.0,
            renormalize_weights: false,
            citizen_component: None,
            incident_rule: None,
            issue_types: vec!["Streetlight Out".to_string(), "Flickering".to_string()],
            seed_reports: vec![seed("C1", "Flickering", 2, "Corner lamppost flickering")],
        }
    }

    pub fn load(path: &Path) -> Result<Self, ProfileError> {
        let raw = std::fs::read_to_string(path)?;
        let profile: DomainProfile = serde_json::from_str(&raw)?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.rows == 0 || self.cols == 0 {
            return Err(ProfileError::NoSectors {
                profile: self.name.clone(),
            });
        }
        if self.rows > MAX_GRID_ROWS {
            return Err(ProfileError::TooManyRows {
                profile: self.name.clone(),
                rows: self.rows,
                max: MAX_GRID_ROWS,
            });
        }
        if !self.alert_threshold.is_finite() || self.alert_threshold < 0.0 {
            return Err(ProfileError::InvalidAlertThreshold(self.alert_threshold));
        }
        self.check_components()?;
        risk::validate_weights(&self.default_weights())?;
        self.scorer()?;
        Ok(())
    }

    /// Component names are unique and every report-fed component is configured.
    fn check_components(&self) -> Result<(), ProfileError> {
        let mut names = HashSet::new();
        for c in &self.components {
            if !names.insert(c.name.as_str()) {
                return Err(ProfileError::DuplicateComponent(c.name.clone()));
            }
        }

        if let Some(component) = &self.citizen_component {
            if !names.contains(component.as_str()) {
                return Err(ProfileError::UnconfiguredComponent {
                    role: "citizen_component",
                    component: component.clone(),
                });
            }
        }
        if let Some(rule) = &self.incident_rule {
            if !names.contains(rule.component.as_str()) {
                return Err(ProfileError::UnconfiguredComponent {
                    role: "incident_rule",
                    component: rule.component.clone(),
                });
            }
            if !(1..=5).contains(&rule.min_severity) {
                return Err(ProfileError::InvalidIncidentSeverity(rule.min_severity));
            }
        }
        Ok(())
    }

    pub fn has_component(&self, name: &str) -> bool {
        self.components.iter().any(|c| c.name == name)
    }

    pub fn sectors(&self) -> Vec<Sector> {
        Sector::grid(self.rows, self.cols)
    }

    pub fn default_weights(&self) -> WeightSet {
        self.components
            .iter()
            .map(|c| (c.name.clone(), c.weight))
            .collect()
    }

    pub fn scorer(&self) -> Result<FusionScorer, ScoreError> {
        let ranges: HashMap<String, Range> = self
            .components
            .iter()
            .map(|c| (c.name.clone(), Range::new(c.min, c.max)))
            .collect();
        FusionScorer::new(ranges, self.scale_factor, self.output_ceiling, self.bands)
    }
}
