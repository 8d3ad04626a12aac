//! Signal sources feeding raw per-sector components into a session.
//!
//! `SimulatedCity` stands in for real sensors. Its distributions are only there
//! to make the dashboards move; nothing downstream depends on them.

use std::collections::HashMap;
use std::f64::consts::PI;

use chrono::{DateTime, Duration, Timelike, Utc};
use clap::ValueEnum;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use crate::models::{Components, Sector, WeightSet};
use crate::profile::Domain;

/// Everything a source reports for one tick.
#[derive(Debug, Clone)]
pub struct TickReading {
    pub timestamp: DateTime<Utc>,
    pub components: HashMap<Sector, Components>,
    /// Operator weight overrides; `None` keeps the profile defaults.
    pub weights: Option<WeightSet>,
}

pub trait SignalSource {
    fn read_tick(&mut self, sectors: &[Sector]) -> anyhow::Result<TickReading>;

    /// Called with the sectors picked for service after a tick was scored.
    fn service(&mut self, _sectors: &[Sector]) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// Baseline day.
    Normal,
    /// Rush hour, high waste generation or clear skies.
    Surge,
    /// Accidents, overflow alerts or heavy overcast.
    Disruption,
    /// Road works, truck maintenance or partial cloud.
    Maintenance,
}

#[derive(Debug, Clone)]
struct BatteryCluster {
    storage_pct: f64,
    capacity_kwh: f64,
    panels: f64,
    pedestrian_activity: f64,
}

#[derive(Debug)]
pub struct SimulatedCity {
    domain: Domain,
    scenario: Scenario,
    rng: StdRng,
    clock: DateTime<Utc>,
    hours_since_collection: HashMap<Sector, f64>,
    batteries: HashMap<Sector, BatteryCluster>,
}

const MAX_HOURS_SINCE_COLLECTION: f64 = 72.0;
const BATTERY_EFFICIENCY: f64 = 0.95;

impl SimulatedCity {
    pub fn new(domain: Domain, scenario: Scenario, seed: u64, start: DateTime<Utc>) -> Self {
        Self {
            domain,
            scenario,
            rng: StdRng::seed_from_u64(seed),
            clock: start,
            hours_since_collection: HashMap::new(),
            batteries: HashMap::new(),
        }
    }

    fn traffic(&mut self, sectors: &[Sector]) -> HashMap<Sector, Components> {
        let avg_congestion: f64 = match self.scenario {
            Scenario::Normal => self.rng.gen_range(35.0..55.0),
            Scenario::Surge => self.rng.gen_range(60.0..85.0),
            Scenario::Disruption => self.rng.gen_range(55.0..90.0),
            Scenario::Maintenance => self.rng.gen_range(50.0..80.0),
        };
        let base_load = avg_congestion * 6.0;
        let low = (base_load - 80.0).max(50.0);

        let closed = match self.scenario {
            Scenario::Maintenance if !sectors.is_empty() => {
                Some(self.rng.gen_range(0..sectors.len()))
            }
            _ => None,
        };

        sectors
            .iter()
            .enumerate()
            .map(|(index, sector)| {
                let mut load = self.rng.gen_range(low..base_load + 80.0);
                if closed == Some(index) {
                    load *= 1.3;
                }
                (sector.clone(), HashMap::from([("sensor".to_string(), load)]))
            })
            .collect()
    }

    fn waste(&mut self, sectors: &[Sector]) -> HashMap<Sector, Components> {
        let base_fill = match self.scenario {
            Scenario::Surge => 75.0,
            Scenario::Disruption => 85.0,
            _ => 55.0,
        };
        let hour_step = if self.scenario == Scenario::Maintenance { 2.0 } else { 1.0 };
        let pattern = daily_waste_pattern(self.clock.hour());

        let mut readings = HashMap::new();
        for (index, sector) in sectors.iter().enumerate() {
            let initial = self.rng.gen_range(6.0..24.0);
            let hours = *self
                .hours_since_collection
                .entry(sector.clone())
                .or_insert(initial);
            // Middle column of the grid is commercial.
            let type_mult = if index % 3 == 1 { 1.6 } else { 1.0 };
            let hours_factor = 1.0 + (hours / 24.0).min(1.2);
            let noise = self.rng.gen_range(-5.0..5.0);
            let fill = (base_fill * type_mult * hours_factor * pattern + noise).clamp(0.0, 200.0);

            readings.insert(
                sector.clone(),
                HashMap::from([("sensor".to_string(), fill), ("hours".to_string(), hours)]),
            );
        }

        for hours in self.hours_since_collection.values_mut() {
            *hours = (*hours + hour_step).min(MAX_HOURS_SINCE_COLLECTION);
        }
        readings
    }

    fn energy(&mut self, sectors: &[Sector]) -> HashMap<Sector, Components> {
        let cloudiness = match self.scenario {
            Scenario::Normal => 0.25,
            Scenario::Surge => 0.05,
            Scenario::Disruption => 0.9,
            Scenario::Maintenance => 0.6,
        };
        let solar_per_panel = solar_kw_per_panel(self.clock.hour(), cloudiness);

        let mut readings = HashMap::new();
        for (index, sector) in sectors.iter().enumerate() {
            if !self.batteries.contains_key(sector) {
                let cluster = BatteryCluster {
                    storage_pct: self.rng.gen_range(40.0..90.0),
                    capacity_kwh: self.rng.gen_range(20.0..50.0),
                    panels: 30.0 + ((index * 17) % 50) as f64,
                    pedestrian_activity: self.rng.gen_range(0.1..1.0),
                };
                self.batteries.insert(sector.clone(), cluster);
            }
            let drift = self.rng.gen_range(-0.05..0.05);
            let Some(cluster) = self.batteries.get_mut(sector) else {
                continue;
            };

            cluster.pedestrian_activity = (cluster.pedestrian_activity + drift).clamp(0.0, 1.0);
            let generation = cluster.panels * solar_per_panel
                + 0.01
                + 0.09 * cluster.pedestrian_activity;

            let dim = if cluster.storage_pct < 15.0 {
                0.0
            } else if cluster.storage_pct < 30.0 {
                0.5
            } else {
                1.0
            };
            let consumption = 1.5 * dim;

            let net = generation - consumption;
            let mut stored = cluster.storage_pct * cluster.capacity_kwh / 100.0;
            let mut unmet = 0.0;
            if net > 0.0 {
                stored += (net * BATTERY_EFFICIENCY).min(cluster.capacity_kwh - stored);
            } else {
                let need = -net / BATTERY_EFFICIENCY;
                let drawn = need.min(stored);
                stored -= drawn;
                unmet = need - drawn;
            }
            cluster.storage_pct = (stored / cluster.capacity_kwh * 100.0).clamp(0.0, 100.0);

            readings.insert(
                sector.clone(),
                HashMap::from([
                    ("storage_deficit".to_string(), 100.0 - cluster.storage_pct),
                    ("outage".to_string(), unmet),
                ]),
            );
        }
        readings
    }
}

impl SignalSource for SimulatedCity {
    fn read_tick(&mut self, sectors: &[Sector]) -> anyhow::Result<TickReading> {
        let components = match self.domain {
            Domain::Traffic => self.traffic(sectors),
            Domain::Waste => self.waste(sectors),
            Domain::Energy => self.energy(sectors),
        };
        let timestamp = self.clock;
        self.clock += Duration::hours(1);
        trace!(%timestamp, sectors = components.len(), "simulated tick");

        Ok(TickReading {
            timestamp,
            components,
            weights: None,
        })
    }

    /// Collection crews empty the serviced sectors' bins.
    fn service(&mut self, sectors: &[Sector]) {
        if self.domain != Domain::Waste {
            return;
        }
        for sector in sectors {
            self.hours_since_collection.insert(sector.clone(), 0.0);
        }
    }
}

fn daily_waste_pattern(hour: u32) -> f64 {
    match hour {
        6..=9 => 1.25,
        17..=20 => 1.2,
        10..=16 => 1.0,
        0..=4 => 0.6,
        _ => 0.8,
    }
}

fn solar_kw_per_panel(hour: u32, cloudiness: f64) -> f64 {
    if !(6..=18).contains(&hour) {
        return 0.0;
    }
    let sun = ((hour as f64 - 12.0) * PI / 12.0).cos().max(0.0);
    0.2 * sun * (1.0 - cloudiness * 0.8)
}
