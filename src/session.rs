//! One operator session: its own history, report list and signal source.

use std::collections::HashMap;

use anyhow::Context;
use tracing::{debug, warn};

use crate::error::{ProfileError, ScoreError};
use crate::history::RollingHistory;
use crate::models::{Components, HistorySnapshot, Sector, WeightSet};
use crate::profile::DomainProfile;
use crate::risk::{self, FusionScorer};
use crate::signal::SignalSource;
use crate::store::ReportStore;

#[derive(Debug)]
pub struct Session<S: SignalSource> {
    profile: DomainProfile,
    scorer: FusionScorer,
    sectors: Vec<Sector>,
    weights: WeightSet,
    source: S,
    reports: ReportStore,
    history: RollingHistory,
    service_capacity: usize,
}

impl<S: SignalSource> Session<S> {
    pub fn new(
        profile: DomainProfile,
        source: S,
        history: RollingHistory,
    ) -> Result<Self, ProfileError> {
        profile.validate()?;
        let scorer = profile.scorer()?;
        Ok(Self {
            sectors: profile.sectors(),
            weights: profile.default_weights(),
            reports: ReportStore::for_profile(&profile),
            scorer,
            profile,
            source,
            history,
            service_capacity: 0,
        })
    }

    /// Service the `k` worst sectors after every tick.
    pub fn with_service_capacity(mut self, k: usize) -> Self {
        self.service_capacity = k;
        self
    }

    /// Override individual component weights; unspecified components keep theirs.
    /// Every override must name a component of the profile.
    pub fn set_weights(&mut self, overrides: &WeightSet) -> Result<(), ScoreError> {
        risk::validate_weights(overrides)?;
        if let Some((component, _)) = overrides
            .iter()
            .find(|(component, _)| !self.profile.has_component(component))
        {
            return Err(ScoreError::UnknownComponent(component.to_string()));
        }
        let mut weights = self.weights.clone();
        for (component, weight) in overrides.iter() {
            weights.set(component, weight);
        }
        self.weights = weights;
        Ok(())
    }

    pub fn weights(&self) -> &WeightSet {
        &self.weights
    }

    pub fn profile(&self) -> &DomainProfile {
        &self.profile
    }

    pub fn reports(&self) -> &ReportStore {
        &self.reports
    }

    pub fn reports_mut(&mut self) -> &mut ReportStore {
        &mut self.reports
    }

    pub fn history(&self) -> &RollingHistory {
        &self.history
    }

    /// Read, score and record one tick.
    ///
    /// On error nothing is appended and the previous snapshot stays latest.
    pub fn tick(&mut self) -> anyhow::Result<&HistorySnapshot> {
        let reading = self
            .source
            .read_tick(&self.sectors)
            .context("signal source failed")?;

        let mut per_sector = reading.components;
        self.merge_reports(&mut per_sector);

        let mut weights = reading.weights.unwrap_or_else(|| self.weights.clone());
        if self.profile.renormalize_weights {
            weights = weights.normalized();
        }

        let scores = self.scorer.score_all(&self.sectors, &per_sector, &weights)?;
        let aggregates = risk::aggregate(&scores, self.profile.alert_threshold);
        let serviced = if self.service_capacity > 0 {
            risk::select_for_service(&scores, self.service_capacity)
        } else {
            Vec::new()
        };

        self.history.append(HistorySnapshot {
            timestamp: reading.timestamp,
            scores,
            aggregates,
        })?;

        debug!(
            profile = %self.profile.name,
            timestamp = %reading.timestamp,
            avg = aggregates.avg,
            max = aggregates.max,
            alerts = aggregates.alert_count,
            "tick recorded"
        );

        if !serviced.is_empty() {
            debug!(sectors = ?serviced, "servicing worst sectors");
            self.source.service(&serviced);
        }

        self.history
            .latest()
            .context("history empty after append")
    }

    /// Run `ticks` ticks, logging and skipping failed ones. Returns how many were recorded.
    pub fn run(&mut self, ticks: usize) -> usize {
        let mut recorded = 0;
        for step in 0..ticks {
            match self.tick() {
                Ok(_) => recorded += 1,
                Err(err) => warn!(step, error = %err, "tick skipped"),
            }
        }
        recorded
    }

    fn merge_reports(&self, per_sector: &mut HashMap<Sector, Components>) {
        if let Some(component) = &self.profile.citizen_component {
            for (sector, sum) in self.reports.severity_by_sector() {
                per_sector
                    .entry(sector)
                    .or_default()
                    .insert(component.clone(), f64::from(sum));
            }
        }
        if let Some(rule) = &self.profile.incident_rule {
            for sector in self.reports.incidents_by_sector(rule) {
                per_sector
                    .entry(sector)
                    .or_default()
                    .insert(rule.component.clone(), 1.0);
            }
        }
    }
}
