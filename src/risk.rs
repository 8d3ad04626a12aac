//! Weighted fusion of normalized signal components into per-sector risk scores.
//!
//! Every component is mapped onto `[0, 1]` with its calibration range, weighted,
//! summed, then scaled and clamped into `[0, output_ceiling]`. The ceiling is
//! allowed to sit above 100 so that a sector far over nominal stays visible.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ScoreError;
use crate::models::{Aggregates, Components, RiskBand, Sector, SectorScore, WeightSet};

/// Calibration range used to map a raw reading onto `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

/// Lower bounds of the Moderate, Elevated and Critical bands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandThresholds {
    pub moderate: f64,
    pub elevated: f64,
    pub critical: f64,
}

impl Default for BandThresholds {
    fn default() -> Self {
        Self {
            moderate: 60.0,
            elevated: 85.0,
            critical: 120.0,
        }
    }
}

impl BandThresholds {
    pub fn validate(&self) -> Result<(), ScoreError> {
        let finite = [self.moderate, self.elevated, self.critical]
            .iter()
            .all(|t| t.is_finite());
        if finite && self.moderate < self.elevated && self.elevated < self.critical {
            Ok(())
        } else {
            Err(ScoreError::InvalidThresholds {
                moderate: self.moderate,
                elevated: self.elevated,
                critical: self.critical,
            })
        }
    }

    pub fn classify(&self, scaled: f64) -> RiskBand {
        if scaled < self.moderate {
            RiskBand::Low
        } else if scaled < self.elevated {
            RiskBand::Moderate
        } else if scaled < self.critical {
            RiskBand::Elevated
        } else {
            RiskBand::Critical
        }
    }
}

fn check_range(component: &str, min: f64, max: f64) -> Result<(), ScoreError> {
    if min.is_finite() && max.is_finite() && min < max {
        Ok(())
    } else {
        Err(ScoreError::InvalidRange {
            component: component.to_string(),
            min,
            max,
        })
    }
}

/// Map `raw` onto `[0, 1]`, clamping readings outside `[min, max]`.
pub fn normalize(raw: f64, min: f64, max: f64) -> Result<f64, ScoreError> {
    check_range("value", min, max)?;
    if raw.is_nan() {
        return Err(ScoreError::NonFiniteReading {
            component: "value".to_string(),
        });
    }
    Ok(((raw - min) / (max - min)).clamp(0.0, 1.0))
}

/// Reject negative or non-finite weights before any scoring happens.
pub fn validate_weights(weights: &WeightSet) -> Result<(), ScoreError> {
    for (component, weight) in weights.iter() {
        if !weight.is_finite() || weight < 0.0 {
            return Err(ScoreError::InvalidWeight {
                component: component.to_string(),
                weight,
            });
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct FusionScorer {
    ranges: HashMap<String, Range>,
    scale_factor: f64,
    output_ceiling: f64,
    bands: BandThresholds,
}

impl FusionScorer {
    pub fn new(
        ranges: HashMap<String, Range>,
        scale_factor: f64,
        output_ceiling: f64,
        bands: BandThresholds,
    ) -> Result<Self, ScoreError> {
        for (component, range) in ranges.iter() {
            check_range(component, range.min, range.max)?;
        }
        let scale_ok = scale_factor.is_finite() && scale_factor > 0.0;
        let ceiling_ok = output_ceiling.is_finite() && output_ceiling > 0.0;
        if !scale_ok || !ceiling_ok {
            return Err(ScoreError::InvalidScale {
                scale_factor,
                output_ceiling,
            });
        }
        bands.validate()?;

        Ok(Self {
            ranges,
            scale_factor,
            output_ceiling,
            bands,
        })
    }

    /// Score one sector. Components absent from `components` contribute zero,
    /// and zero-weight components are never looked at.
    pub fn score(
        &self,
        sector: &Sector,
        components: &Components,
        weights: &WeightSet,
    ) -> Result<SectorScore, ScoreError> {
        validate_weights(weights)?;

        let mut combined = 0.0;
        for (component, weight) in weights.iter() {
            if weight == 0.0 {
                continue;
            }
            let range = self
                .ranges
                .get(component)
                .ok_or_else(|| ScoreError::UnknownComponent(component.to_string()))?;

            let normalized = match components.get(component) {
                Some(raw) if raw.is_nan() => {
                    return Err(ScoreError::NonFiniteReading {
                        component: component.to_string(),
                    })
                }
                Some(raw) => normalize(*raw, range.min, range.max)?,
                None => 0.0,
            };
            combined += weight * normalized;
        }

        let scaled = (combined * self.scale_factor).clamp(0.0, self.output_ceiling);
        Ok(SectorScore {
            sector: sector.clone(),
            raw_score: combined,
            scaled_score: scaled,
            band: self.bands.classify(scaled),
        })
    }

    /// Score every sector, preserving the order of `sectors`.
    pub fn score_all(
        &self,
        sectors: &[Sector],
        per_sector: &HashMap<Sector, Components>,
        weights: &WeightSet,
    ) -> Result<Vec<SectorScore>, ScoreError> {
        validate_weights(weights)?;
        let empty = Components::new();
        sectors
            .iter()
            .map(|sector| {
                let components = per_sector.get(sector).unwrap_or(&empty);
                self.score(sector, components, weights)
            })
            .collect()
    }
}

/// Mean and max of the scaled scores plus how many exceed `alert_threshold`.
pub fn aggregate(scores: &[SectorScore], alert_threshold: f64) -> Aggregates {
    if scores.is_empty() {
        return Aggregates::default();
    }

    let total: f64 = scores.iter().map(|s| s.scaled_score).sum();
    let max = scores
        .iter()
        .map(|s| s.scaled_score)
        .fold(f64::NEG_INFINITY, f64::max);
    let alert_count = scores
        .iter()
        .filter(|s| s.scaled_score > alert_threshold)
        .count();

    Aggregates {
        avg: total / scores.len() as f64,
        max,
        alert_count,
    }
}

/// The `k` worst sectors, highest score first. Equal scores keep input order.
pub fn select_for_service(scores: &[SectorScore], k: usize) -> Vec<Sector> {
    let mut ranked: Vec<&SectorScore> = scores.iter().collect();
    ranked.sort_by(|a, b| {
        b.scaled_score
            .partial_cmp(&a.scaled_score)
            .unwrap_or(Ordering::Equal)
    });
    ranked
        .into_iter()
        .take(k)
        .map(|s| s.sector.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn traffic_scorer() -> FusionScorer {
        let ranges = HashMap::from([
            ("sensor".to_string(), Range::new(0.0, 800.0)),
            ("citizen".to_string(), Range::new(0.0, 25.0)),
            ("incident".to_string(), Range::new(0.0, 1.0)),
        ]);
        FusionScorer::new(ranges, 120.0, 200.0, BandThresholds::default()).unwrap()
    }

    fn traffic_weights() -> WeightSet {
        WeightSet::new()
            .with("sensor", 0.6)
            .with("citizen", 0.3)
            .with("incident", 0.1)
    }

    fn components(sensor: f64, citizen: f64, incident: f64) -> Components {
        HashMap::from([
            ("sensor".to_string(), sensor),
            ("citizen".to_string(), citizen),
            ("incident".to_string(), incident),
        ])
    }

    fn score_with(value: f64) -> SectorScore {
        SectorScore {
            sector: Sector::new("X"),
            raw_score: 0.0,
            scaled_score: value,
            band: RiskBand::Low,
        }
    }

    #[test]
    fn normalize_hits_range_endpoints() {
        assert_eq!(normalize(10.0, 10.0, 20.0).unwrap(), 0.0);
        assert_eq!(normalize(20.0, 10.0, 20.0).unwrap(), 1.0);
        assert_eq!(normalize(15.0, 10.0, 20.0).unwrap(), 0.5);
    }

    #[test]
    fn normalize_clamps_outside_range() {
        assert_eq!(normalize(-5.0, 0.0, 72.0).unwrap(), 0.0);
        assert_eq!(normalize(300.0, 0.0, 200.0).unwrap(), 1.0);
        assert_eq!(normalize(f64::INFINITY, 0.0, 1.0).unwrap(), 1.0);
    }

    #[test]
    fn normalize_rejects_degenerate_range() {
        assert!(matches!(
            normalize(1.0, 5.0, 5.0),
            Err(ScoreError::InvalidRange { .. })
        ));
        assert!(matches!(
            normalize(1.0, 6.0, 5.0),
            Err(ScoreError::InvalidRange { .. })
        ));
    }

    #[test]
    fn normalize_rejects_nan_reading() {
        assert!(matches!(
            normalize(f64::NAN, 0.0, 1.0),
            Err(ScoreError::NonFiniteReading { .. })
        ));
    }

    #[test]
    fn traffic_fusion_scenario() {
        let scorer = traffic_scorer();
        let sectors = Sector::grid(3, 3);
        let per_sector: HashMap<Sector, Components> = sectors
            .iter()
            .map(|s| (s.clone(), components(400.0, 0.0, 0.0)))
            .collect();

        let scores = scorer
            .score_all(&sectors, &per_sector, &traffic_weights())
            .unwrap();

        assert_eq!(scores.len(), 9);
        for (score, sector) in scores.iter().zip(sectors.iter()) {
            assert_eq!(&score.sector, sector);
            assert!((score.scaled_score - 36.0).abs() < 1e-9);
            assert_eq!(score.band, RiskBand::Low);
        }
    }

    #[test]
    fn critical_band_starts_at_threshold() {
        let bands = BandThresholds::default();
        assert_eq!(bands.classify(120.0), RiskBand::Critical);
        assert_eq!(bands.classify(119.999), RiskBand::Elevated);
        assert_eq!(bands.classify(85.0), RiskBand::Elevated);
        assert_eq!(bands.classify(84.9), RiskBand::Moderate);
        assert_eq!(bands.classify(59.9), RiskBand::Low);

        let ranges = HashMap::from([("sensor".to_string(), Range::new(0.0, 1.0))]);
        let scorer = FusionScorer::new(ranges, 120.0, 200.0, bands).unwrap();
        let weights = WeightSet::new().with("sensor", 1.0);
        let score = scorer
            .score(
                &Sector::new("A1"),
                &HashMap::from([("sensor".to_string(), 1.0)]),
                &weights,
            )
            .unwrap();
        assert_eq!(score.scaled_score, 120.0);
        assert_eq!(score.band, RiskBand::Critical);
    }

    #[test]
    fn scores_above_one_hundred_are_kept() {
        let scorer = traffic_scorer();
        let weights = WeightSet::new()
            .with("sensor", 1.0)
            .with("citizen", 1.0)
            .with("incident", 1.0);
        let score = scorer
            .score(&Sector::new("B2"), &components(800.0, 25.0, 1.0), &weights)
            .unwrap();
        assert!((score.raw_score - 3.0).abs() < 1e-12);
        assert_eq!(score.scaled_score, 200.0);
    }

    #[test]
    fn weights_are_not_renormalized() {
        let scorer = traffic_scorer();
        let heavy = WeightSet::new().with("sensor", 1.2);
        let score = scorer
            .score(&Sector::new("A1"), &components(400.0, 0.0, 0.0), &heavy)
            .unwrap();
        assert!((score.scaled_score - 72.0).abs() < 1e-9);
    }

    #[test]
    fn missing_component_equals_explicit_zero() {
        let scorer = traffic_scorer();
        let weights = traffic_weights();
        let sector = Sector::new("C3");
        let explicit = scorer
            .score(&sector, &components(300.0, 0.0, 0.0), &weights)
            .unwrap();
        let absent = scorer
            .score(
                &sector,
                &HashMap::from([("sensor".to_string(), 300.0)]),
                &weights,
            )
            .unwrap();
        assert_eq!(explicit, absent);
    }

    #[test]
    fn missing_sector_scores_zero() {
        let scorer = traffic_scorer();
        let sectors = vec![Sector::new("A1")];
        let scores = scorer
            .score_all(&sectors, &HashMap::new(), &traffic_weights())
            .unwrap();
        assert_eq!(scores[0].scaled_score, 0.0);
    }

    #[test]
    fn negative_weight_is_rejected() {
        let scorer = traffic_scorer();
        let weights = traffic_weights().with("citizen", -0.1);
        let err = scorer
            .score(&Sector::new("A1"), &components(1.0, 1.0, 0.0), &weights)
            .unwrap_err();
        assert_eq!(
            err,
            ScoreError::InvalidWeight {
                component: "citizen".to_string(),
                weight: -0.1
            }
        );
    }

    #[test]
    fn unknown_weighted_component_is_rejected() {
        let scorer = traffic_scorer();
        let weights = WeightSet::new().with("noise", 0.5);
        assert_eq!(
            scorer
                .score(&Sector::new("A1"), &Components::new(), &weights)
                .unwrap_err(),
            ScoreError::UnknownComponent("noise".to_string())
        );
    }

    #[test]
    fn nan_reading_is_rejected() {
        let scorer = traffic_scorer();
        let err = scorer
            .score(
                &Sector::new("A1"),
                &components(f64::NAN, 0.0, 0.0),
                &traffic_weights(),
            )
            .unwrap_err();
        assert!(matches!(err, ScoreError::NonFiniteReading { .. }));
    }

    #[test]
    fn zero_weight_component_needs_no_range_or_reading() {
        let scorer = traffic_scorer();
        let sector = Sector::new("A1");
        let mut readings = components(400.0, f64::NAN, 0.0);
        readings.insert("noise".to_string(), f64::NAN);

        let muted = WeightSet::new()
            .with("sensor", 0.5)
            .with("noise", 0.0)
            .with("citizen", 0.0);
        let score = scorer.score(&sector, &readings, &muted).unwrap();
        assert!((score.scaled_score - 30.0).abs() < 1e-9);

        let counted = muted.with("citizen", 0.3);
        assert!(matches!(
            scorer.score(&sector, &readings, &counted),
            Err(ScoreError::NonFiniteReading { .. })
        ));
    }

    #[test]
    fn constructor_validates_configuration() {
        let bad_range = HashMap::from([("sensor".to_string(), Range::new(5.0, 5.0))]);
        assert!(matches!(
            FusionScorer::new(bad_range, 120.0, 200.0, BandThresholds::default()),
            Err(ScoreError::InvalidRange { .. })
        ));

        let bands = BandThresholds {
            moderate: 85.0,
            elevated: 60.0,
            critical: 120.0,
        };
        assert!(matches!(
            FusionScorer::new(HashMap::new(), 120.0, 200.0, bands),
            Err(ScoreError::InvalidThresholds { .. })
        ));

        assert!(matches!(
            FusionScorer::new(HashMap::new(), 120.0, -1.0, BandThresholds::default()),
            Err(ScoreError::InvalidScale { .. })
        ));
    }

    #[test]
    fn aggregate_counts_strictly_above_threshold() {
        let scores = vec![score_with(40.0), score_with(85.0), score_with(135.0)];
        let agg = aggregate(&scores, 85.0);
        assert!((agg.avg - 260.0 / 3.0).abs() < 1e-9);
        assert_eq!(agg.max, 135.0);
        assert_eq!(agg.alert_count, 1);
    }

    #[test]
    fn aggregate_of_nothing_is_zero() {
        assert_eq!(aggregate(&[], 85.0), Aggregates::default());
    }

    #[test]
    fn service_selection_breaks_ties_by_sector_order() {
        let mut scores = vec![
            score_with(50.0),
            score_with(90.0),
            score_with(90.0),
            score_with(70.0),
        ];
        for (score, name) in scores.iter_mut().zip(["A1", "A2", "A3", "B1"]) {
            score.sector = Sector::new(name);
        }

        let picked = select_for_service(&scores, 3);
        let names: Vec<&str> = picked.iter().map(Sector::as_str).collect();
        assert_eq!(names, ["A2", "A3", "B1"]);
        assert_eq!(select_for_service(&scores, 10).len(), 4);
        assert!(select_for_service(&scores, 0).is_empty());
    }

    proptest! {
        #[test]
        fn normalize_stays_in_unit_interval(
            raw in -1e6f64..1e6,
            min in -1e3f64..1e3,
            width in 1e-3f64..1e3,
        ) {
            let n = normalize(raw, min, min + width).unwrap();
            prop_assert!((0.0..=1.0).contains(&n));
        }

        #[test]
        fn score_is_monotonic_in_each_component(
            base in prop::array::uniform3(0.0f64..1000.0),
            bump in 0.0f64..500.0,
            which in 0usize..3,
            weights in prop::array::uniform3(0.0f64..2.0),
        ) {
            let scorer = traffic_scorer();
            let weights = WeightSet::new()
                .with("sensor", weights[0])
                .with("citizen", weights[1])
                .with("incident", weights[2]);
            let mut raised = base;
            raised[which] += bump;

            let sector = Sector::new("A1");
            let low = components(base[0], base[1], base[2]);
            let high = components(raised[0], raised[1], raised[2]);
            let lo = scorer.score(&sector, &low, &weights).unwrap();
            let hi = scorer.score(&sector, &high, &weights).unwrap();
            prop_assert!(hi.scaled_score >= lo.scaled_score);
        }

        #[test]
        fn zero_weight_component_is_ignored(
            sensor in 0.0f64..1000.0,
            citizen_a in 0.0f64..50.0,
            citizen_b in 0.0f64..50.0,
        ) {
            let scorer = traffic_scorer();
            let weights = WeightSet::new().with("sensor", 0.7).with("citizen", 0.0);
            let sector = Sector::new("B1");
            let a = scorer.score(&sector, &components(sensor, citizen_a, 0.0), &weights).unwrap();
            let b = scorer.score(&sector, &components(sensor, citizen_b, 0.0), &weights).unwrap();
            prop_assert_eq!(a, b);
        }
    }
}
