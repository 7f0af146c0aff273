//! Core data models for the irrigation predictor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// Canonical greenhouse sensors understood by the predictor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SensorKind {
    Temperature,
    SoilHumidity,
    AirHumidity,
    Light,
    Co2,
    Pir,
    Proximity,
}

impl SensorKind {
    pub const COUNT: usize = 7;

    pub const ALL: [SensorKind; Self::COUNT] = [
        SensorKind::Temperature,
        SensorKind::SoilHumidity,
        SensorKind::AirHumidity,
        SensorKind::Light,
        SensorKind::Co2,
        SensorKind::Pir,
        SensorKind::Proximity,
    ];

    /// Parse a wire sensor name (case-insensitive, surrounding whitespace ignored)
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
    }

    /// Canonical wire name
    pub fn name(&self) -> &'static str {
        match self {
            SensorKind::Temperature => "Temperature",
            SensorKind::SoilHumidity => "Soil Humidity",
            SensorKind::AirHumidity => "Air Humidity",
            SensorKind::Light => "Light",
            SensorKind::Co2 => "CO2",
            SensorKind::Pir => "PIR",
            SensorKind::Proximity => "Proximity",
        }
    }

    /// Value assumed when the sensor did not report
    pub fn default_value(&self) -> f64 {
        match self {
            SensorKind::Temperature => 25.0,
            SensorKind::SoilHumidity => 40.0,
            SensorKind::AirHumidity => 50.0,
            SensorKind::Light => 200.0,
            SensorKind::Co2 => 400.0,
            SensorKind::Pir => 0.0,
            SensorKind::Proximity => 0.0,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single sensor value as delivered by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    #[serde(rename = "SensorName", alias = "sensorName")]
    pub sensor_name: String,
    /// Informational only
    #[serde(rename = "Unit", alias = "unit", default)]
    pub unit: String,
    #[serde(rename = "Value", alias = "value")]
    pub value: f64,
}

impl SensorReading {
    pub fn new(sensor_name: impl Into<String>, unit: impl Into<String>, value: f64) -> Self {
        Self {
            sensor_name: sensor_name.into(),
            unit: unit.into(),
            value,
        }
    }
}

/// Typed view over a set of readings, keyed by canonical sensor
///
/// Duplicated sensors resolve last-write-wins. Unknown sensor names and
/// non-finite values are dropped, so the per-sensor default applies.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorSnapshot {
    values: [Option<f64>; SensorKind::COUNT],
}

impl SensorSnapshot {
    pub fn from_readings(readings: &[SensorReading]) -> Self {
        let mut snapshot = Self::default();
        for reading in readings {
            match SensorKind::parse(&reading.sensor_name) {
                Some(kind) => snapshot.set(kind, reading.value),
                None => debug!(sensor = %reading.sensor_name, "Ignoring unknown sensor"),
            }
        }
        snapshot
    }

    pub fn set(&mut self, kind: SensorKind, value: f64) {
        if value.is_finite() {
            self.values[kind.index()] = Some(value);
        } else {
            debug!(sensor = %kind, "Discarding non-finite reading");
        }
    }

    pub fn get(&self, kind: SensorKind) -> Option<f64> {
        self.values[kind.index()]
    }

    /// The single default-lookup used by feature extraction and fallback rules
    pub fn value_or_default(&self, kind: SensorKind) -> f64 {
        self.get(kind).unwrap_or_else(|| kind.default_value())
    }

    pub fn reported(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }
}

/// Plant lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowthStage {
    Seedling,
    Vegetative,
    Flowering,
}

impl GrowthStage {
    /// Encoding used for stage strings that are not recognized
    pub const DEFAULT_CODE: f64 = 1.0;

    /// Case- and suffix-sensitive: "Seedling" and "Seedling Stage" are synonyms,
    /// "seedling" is not recognized.
    pub fn parse(stage: &str) -> Option<Self> {
        match stage {
            "Seedling" | "Seedling Stage" => Some(GrowthStage::Seedling),
            "Vegetative" | "Vegetative Stage" => Some(GrowthStage::Vegetative),
            "Flowering" | "Flowering Stage" => Some(GrowthStage::Flowering),
            _ => None,
        }
    }

    pub fn code(&self) -> f64 {
        match self {
            GrowthStage::Seedling => 0.0,
            GrowthStage::Vegetative => 1.0,
            GrowthStage::Flowering => 2.0,
        }
    }

    pub fn encode(stage: &str) -> f64 {
        Self::parse(stage)
            .map(|s| s.code())
            .unwrap_or(Self::DEFAULT_CODE)
    }
}

/// Request validation failures, raised by the API layer only
#[derive(Debug, Error, PartialEq)]
pub enum RequestError {
    #[error("timeSinceLastWateringInHours must be a finite value >= 0, got {0}")]
    InvalidElapsedTime(f64),
}

/// Prediction request sent by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRequest {
    pub timestamp: DateTime<Utc>,
    pub plant_growth_stage: String,
    #[serde(rename = "timeSinceLastWateringInHours")]
    pub time_since_last_watering_hours: f64,
    #[serde(rename = "mlSensorReadings", alias = "readings", default)]
    pub readings: Vec<SensorReading>,
}

impl PredictionRequest {
    pub fn snapshot(&self) -> SensorSnapshot {
        SensorSnapshot::from_readings(&self.readings)
    }

    pub fn growth_stage(&self) -> Option<GrowthStage> {
        GrowthStage::parse(&self.plant_growth_stage)
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        let hours = self.time_since_last_watering_hours;
        if !hours.is_finite() || hours < 0.0 {
            return Err(RequestError::InvalidElapsedTime(hours));
        }
        Ok(())
    }
}

/// Why the rule-based predictor produced a result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// No artifact matched the configured pattern
    NoModelFound,
    ModelLoadError(String),
    PredictionError(String),
    UnexpectedError(String),
}

impl FallbackReason {
    pub fn kind(&self) -> &'static str {
        match self {
            FallbackReason::NoModelFound => "no_model_found",
            FallbackReason::ModelLoadError(_) => "model_load_error",
            FallbackReason::PredictionError(_) => "prediction_error",
            FallbackReason::UnexpectedError(_) => "unexpected_error",
        }
    }

    pub fn cause(&self) -> Option<&str> {
        match self {
            FallbackReason::NoModelFound => None,
            FallbackReason::ModelLoadError(cause)
            | FallbackReason::PredictionError(cause)
            | FallbackReason::UnexpectedError(cause) => Some(cause),
        }
    }

    pub fn is_no_model(&self) -> bool {
        matches!(self, FallbackReason::NoModelFound)
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cause() {
            Some(cause) => write!(f, "{}:{}", self.kind(), cause),
            None => f.write_str(self.kind()),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("unrecognized provenance tag: {0:?}")]
pub struct ProvenanceParseError(String);

impl FromStr for FallbackReason {
    type Err = ProvenanceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "no_model_found" {
            return Ok(FallbackReason::NoModelFound);
        }
        let (kind, cause) = s
            .split_once(':')
            .ok_or_else(|| ProvenanceParseError(s.to_string()))?;
        let cause = cause.to_string();
        match kind {
            "model_load_error" => Ok(FallbackReason::ModelLoadError(cause)),
            "prediction_error" => Ok(FallbackReason::PredictionError(cause)),
            "unexpected_error" => Ok(FallbackReason::UnexpectedError(cause)),
            _ => Err(ProvenanceParseError(s.to_string())),
        }
    }
}

/// Where a prediction came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provenance {
    /// Trained artifact, identified by its version
    Model { version: String },
    Fallback(FallbackReason),
}

impl Provenance {
    const FALLBACK_PREFIX: &'static str = "fallback:";

    pub fn is_fallback(&self) -> bool {
        matches!(self, Provenance::Fallback(_))
    }

    pub fn fallback_reason(&self) -> Option<&FallbackReason> {
        match self {
            Provenance::Fallback(reason) => Some(reason),
            Provenance::Model { .. } => None,
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Model { version } => f.write_str(version),
            Provenance::Fallback(reason) => write!(f, "{}{}", Self::FALLBACK_PREFIX, reason),
        }
    }
}

impl FromStr for Provenance {
    type Err = ProvenanceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(reason) = s.strip_prefix(Self::FALLBACK_PREFIX) {
            return reason.parse().map(Provenance::Fallback);
        }
        if s.is_empty() {
            return Err(ProvenanceParseError(String::new()));
        }
        Ok(Provenance::Model {
            version: s.to_string(),
        })
    }
}

impl Serialize for Provenance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Provenance {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        tag.parse().map_err(serde::de::Error::custom)
    }
}

/// Prediction returned to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    pub prediction_time: DateTime<Utc>,
    pub hours_until_next_watering: f64,
    pub provenance: Provenance,
}

impl PredictionResult {
    pub fn is_fallback(&self) -> bool {
        self.provenance.is_fallback()
    }
}
