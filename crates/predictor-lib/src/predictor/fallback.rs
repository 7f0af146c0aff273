//! Rule-based watering estimate used when no trained model can answer
//!
//! The soil-humidity baseline always applies. The extended multipliers are
//! reserved for the case where no artifact exists at all; partial failures
//! (load or inference errors) only get the baseline.

use crate::models::{FallbackReason, GrowthStage, SensorKind, SensorSnapshot};
use tracing::debug;

/// Lower bound of any fallback estimate, in hours
pub const MIN_FALLBACK_HOURS: f64 = 1.0;

/// Upper bound of any fallback estimate, in hours
pub const MAX_FALLBACK_HOURS: f64 = 72.0;

/// Soil humidity brackets (exclusive upper bound, hours)
const SOIL_HUMIDITY_BRACKETS: &[(f64, f64)] = &[(20.0, 4.0), (30.0, 12.0), (40.0, 24.0), (60.0, 36.0)];

/// Baseline when soil humidity is at or above the last bracket
const WET_SOIL_HOURS: f64 = 48.0;

/// Secondary heuristics of the extended tier, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackRule {
    Temperature,
    AirHumidity,
    Light,
    GrowthStage,
    ElapsedTime,
}

impl FallbackRule {
    pub fn name(&self) -> &'static str {
        match self {
            FallbackRule::Temperature => "temperature",
            FallbackRule::AirHumidity => "air_humidity",
            FallbackRule::Light => "light",
            FallbackRule::GrowthStage => "growth_stage",
            FallbackRule::ElapsedTime => "elapsed_time",
        }
    }
}

/// A rule that was evaluated and the factor it contributed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleApplication {
    pub rule: FallbackRule,
    pub factor: f64,
}

/// Breakdown of a fallback estimate
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackEstimate {
    pub baseline_hours: f64,
    pub rules_applied: Vec<RuleApplication>,
    pub hours: f64,
}

/// Deterministic decision-table predictor
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackPredictor;

impl FallbackPredictor {
    pub fn new() -> Self {
        Self
    }

    /// Hours until next watering, always within `[MIN_FALLBACK_HOURS, MAX_FALLBACK_HOURS]`
    pub fn predict(
        &self,
        snapshot: &SensorSnapshot,
        stage: Option<GrowthStage>,
        hours_since_watering: f64,
        reason: &FallbackReason,
    ) -> f64 {
        self.evaluate(snapshot, stage, hours_since_watering, reason).hours
    }

    pub fn evaluate(
        &self,
        snapshot: &SensorSnapshot,
        stage: Option<GrowthStage>,
        hours_since_watering: f64,
        reason: &FallbackReason,
    ) -> FallbackEstimate {
        let baseline_hours = soil_humidity_baseline(snapshot.value_or_default(SensorKind::SoilHumidity));

        let rules_applied = if reason.is_no_model() {
            extended_rules(snapshot, stage, hours_since_watering)
        } else {
            Vec::new()
        };

        let raw = rules_applied
            .iter()
            .fold(baseline_hours, |hours, applied| hours * applied.factor);
        let hours = clamp_hours(raw);

        debug!(
            reason = %reason,
            baseline_hours = baseline_hours,
            rules = rules_applied.len(),
            hours = hours,
            "Fallback estimate computed"
        );

        FallbackEstimate {
            baseline_hours,
            rules_applied,
            hours,
        }
    }
}

fn soil_humidity_baseline(soil_humidity: f64) -> f64 {
    SOIL_HUMIDITY_BRACKETS
        .iter()
        .find(|(upper, _)| soil_humidity < *upper)
        .map(|(_, hours)| *hours)
        .unwrap_or(WET_SOIL_HOURS)
}

fn extended_rules(
    snapshot: &SensorSnapshot,
    stage: Option<GrowthStage>,
    hours_since_watering: f64,
) -> Vec<RuleApplication> {
    let temperature = snapshot.value_or_default(SensorKind::Temperature);
    let air_humidity = snapshot.value_or_default(SensorKind::AirHumidity);
    let light = snapshot.value_or_default(SensorKind::Light);

    let temperature_factor = if temperature > 30.0 {
        0.8
    } else if temperature < 15.0 {
        1.2
    } else {
        1.0
    };

    let air_humidity_factor = if air_humidity < 30.0 {
        0.9
    } else if air_humidity > 70.0 {
        1.1
    } else {
        1.0
    };

    let light_factor = if light > 800.0 {
        0.9
    } else if light < 100.0 {
        1.1
    } else {
        1.0
    };

    let stage_factor = match stage {
        Some(GrowthStage::Seedling) => 0.8,
        Some(GrowthStage::Vegetative) | None => 1.0,
        Some(GrowthStage::Flowering) => 1.1,
    };

    let elapsed_factor = if hours_since_watering > 48.0 { 0.8 } else { 1.0 };

    vec![
        RuleApplication { rule: FallbackRule::Temperature, factor: temperature_factor },
        RuleApplication { rule: FallbackRule::AirHumidity, factor: air_humidity_factor },
        RuleApplication { rule: FallbackRule::Light, factor: light_factor },
        RuleApplication { rule: FallbackRule::GrowthStage, factor: stage_factor },
        RuleApplication { rule: FallbackRule::ElapsedTime, factor: elapsed_factor },
    ]
}

fn clamp_hours(hours: f64) -> f64 {
    if hours.is_finite() {
        hours.clamp(MIN_FALLBACK_HOURS, MAX_FALLBACK_HOURS)
    } else {
        MAX_FALLBACK_HOURS
    }
}
