//! Feature extraction for ML inference
//!
//! Maps a prediction request into the fixed-order numeric vector a trained
//! artifact expects. Base readings fall back to per-sensor defaults, the
//! growth stage is label-encoded and a set of interaction terms is derived
//! from the base values. The same formulas are used by the trainer, so they
//! must not change without bumping the schema version.

use crate::models::{GrowthStage, PredictionRequest, SensorKind, SensorSnapshot};
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Schema version produced by the current trainer
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Six-feature layout written by earlier trainers
pub const LEGACY_SCHEMA_VERSION: u32 = 1;

/// Every feature the extractor knows how to compute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Temperature,
    SoilHumidity,
    AirHumidity,
    Light,
    Co2,
    Pir,
    Proximity,
    TimeSinceLastWatering,
    GrowthStage,
    TemperatureXSoilHumidity,
    TemperatureXAirHumidity,
    LightXTemperature,
    SoilHumidityXAirHumidity,
    WateringXSoilHumidity,
    TemperatureSquared,
    SoilHumiditySquared,
}

impl Feature {
    /// Canonical order, identical to the current trainer's column order
    pub const ALL: [Feature; 16] = [
        Feature::Temperature,
        Feature::SoilHumidity,
        Feature::AirHumidity,
        Feature::Light,
        Feature::Co2,
        Feature::Pir,
        Feature::Proximity,
        Feature::TimeSinceLastWatering,
        Feature::GrowthStage,
        Feature::TemperatureXSoilHumidity,
        Feature::TemperatureXAirHumidity,
        Feature::LightXTemperature,
        Feature::SoilHumidityXAirHumidity,
        Feature::WateringXSoilHumidity,
        Feature::TemperatureSquared,
        Feature::SoilHumiditySquared,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Feature::Temperature => "temperature",
            Feature::SoilHumidity => "soil_humidity",
            Feature::AirHumidity => "air_humidity",
            Feature::Light => "light",
            Feature::Co2 => "co2",
            Feature::Pir => "pir",
            Feature::Proximity => "proximity",
            Feature::TimeSinceLastWatering => "time_since_last_watering",
            Feature::GrowthStage => "growth_stage",
            Feature::TemperatureXSoilHumidity => "temperature_x_soil_humidity",
            Feature::TemperatureXAirHumidity => "temperature_x_air_humidity",
            Feature::LightXTemperature => "light_x_temperature",
            Feature::SoilHumidityXAirHumidity => "soil_humidity_x_air_humidity",
            Feature::WateringXSoilHumidity => "watering_x_soil_humidity",
            Feature::TemperatureSquared => "temperature_squared",
            Feature::SoilHumiditySquared => "soil_humidity_squared",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    fn compute(&self, base: &BaseValues) -> f64 {
        match self {
            Feature::Temperature => base.temperature,
            Feature::SoilHumidity => base.soil_humidity,
            Feature::AirHumidity => base.air_humidity,
            Feature::Light => base.light,
            Feature::Co2 => base.co2,
            Feature::Pir => base.pir,
            Feature::Proximity => base.proximity,
            Feature::TimeSinceLastWatering => base.hours_since_watering,
            Feature::GrowthStage => base.growth_stage,
            Feature::TemperatureXSoilHumidity => {
                guarded_div(base.temperature * base.soil_humidity, 100.0)
            }
            Feature::TemperatureXAirHumidity => {
                guarded_div(base.temperature * base.air_humidity, 100.0)
            }
            Feature::LightXTemperature => guarded_div(base.light * base.temperature, 1000.0),
            Feature::SoilHumidityXAirHumidity => {
                guarded_div(base.soil_humidity * base.air_humidity, 100.0)
            }
            Feature::WateringXSoilHumidity => {
                guarded_div(base.hours_since_watering * base.soil_humidity, 100.0)
            }
            Feature::TemperatureSquared => guarded_div(base.temperature.powi(2), 100.0),
            Feature::SoilHumiditySquared => guarded_div(base.soil_humidity.powi(2), 100.0),
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("unknown feature schema version {0}")]
    UnknownVersion(u32),
    #[error("unknown feature {0:?}")]
    UnknownFeature(String),
    #[error("feature {0:?} listed more than once")]
    DuplicateFeature(String),
    #[error("feature schema is empty")]
    Empty,
    #[error("artifact graph takes {declared} inputs, schema lists {expected}")]
    InputWidthMismatch { declared: usize, expected: usize },
}

/// Ordered feature layout a model artifact was trained with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSchema {
    version: u32,
    features: Vec<Feature>,
}

impl FeatureSchema {
    pub fn current() -> Self {
        Self {
            version: CURRENT_SCHEMA_VERSION,
            features: Feature::ALL.to_vec(),
        }
    }

    pub fn legacy() -> Self {
        Self {
            version: LEGACY_SCHEMA_VERSION,
            features: vec![
                Feature::Temperature,
                Feature::SoilHumidity,
                Feature::AirHumidity,
                Feature::Light,
                Feature::TimeSinceLastWatering,
                Feature::GrowthStage,
            ],
        }
    }

    /// Built-in layout for a schema version
    pub fn for_version(version: u32) -> Result<Self, SchemaError> {
        match version {
            CURRENT_SCHEMA_VERSION => Ok(Self::current()),
            LEGACY_SCHEMA_VERSION => Ok(Self::legacy()),
            other => Err(SchemaError::UnknownVersion(other)),
        }
    }

    /// Layout from an explicit feature-name list
    pub fn from_names<S: AsRef<str>>(version: u32, names: &[S]) -> Result<Self, SchemaError> {
        if names.is_empty() {
            return Err(SchemaError::Empty);
        }
        let mut features = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            let feature =
                Feature::from_name(name).ok_or_else(|| SchemaError::UnknownFeature(name.to_string()))?;
            if features.contains(&feature) {
                return Err(SchemaError::DuplicateFeature(name.to_string()));
            }
            features.push(feature);
        }
        Ok(Self { version, features })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.features.iter().map(|f| f.name()).collect()
    }
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self::current()
    }
}

/// Model input, ordered according to a [`FeatureSchema`]
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub schema_version: u32,
    pub values: Vec<f64>,
}

impl FeatureVector {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_f32(&self) -> Vec<f32> {
        self.values.iter().map(|v| *v as f32).collect()
    }
}

/// Inputs every feature is derived from, defaults already applied
#[derive(Debug, Clone, Copy)]
struct BaseValues {
    temperature: f64,
    soil_humidity: f64,
    air_humidity: f64,
    light: f64,
    co2: f64,
    pir: f64,
    proximity: f64,
    hours_since_watering: f64,
    growth_stage: f64,
}

impl BaseValues {
    fn from_request(request: &PredictionRequest) -> Self {
        let snapshot: SensorSnapshot = request.snapshot();
        let hours = request.time_since_last_watering_hours;
        let hours_since_watering = if hours.is_finite() {
            hours
        } else {
            debug!(value = hours, "Non-finite elapsed time, using 0");
            0.0
        };

        Self {
            temperature: snapshot.value_or_default(SensorKind::Temperature),
            soil_humidity: snapshot.value_or_default(SensorKind::SoilHumidity),
            air_humidity: snapshot.value_or_default(SensorKind::AirHumidity),
            light: snapshot.value_or_default(SensorKind::Light),
            co2: snapshot.value_or_default(SensorKind::Co2),
            pir: snapshot.value_or_default(SensorKind::Pir),
            proximity: snapshot.value_or_default(SensorKind::Proximity),
            hours_since_watering,
            growth_stage: GrowthStage::encode(&request.plant_growth_stage),
        }
    }
}

/// Extracts model features from prediction requests
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    schema: FeatureSchema,
}

impl FeatureExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(schema: FeatureSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Vector in the extractor's own schema
    pub fn extract(&self, request: &PredictionRequest) -> FeatureVector {
        self.extract_with(request, &self.schema)
    }

    /// Vector in the order a specific artifact declares
    pub fn extract_with(&self, request: &PredictionRequest, schema: &FeatureSchema) -> FeatureVector {
        let base = BaseValues::from_request(request);
        let values = schema
            .features()
            .iter()
            .map(|feature| finite_or_zero(feature.compute(&base)))
            .collect();

        FeatureVector {
            schema_version: schema.version(),
            values,
        }
    }
}

/// Division that never yields NaN or infinity
fn guarded_div(numerator: f64, denominator: f64) -> f64 {
    if denominator.abs() < f64::EPSILON {
        return 0.0;
    }
    finite_or_zero(numerator / denominator)
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
