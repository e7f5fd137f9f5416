//! Pasture telemetry simulator.
//!
//! Produces plausible per-zone readings for demos and soak tests: a diurnal
//! temperature curve drives soil evaporation, soil moisture gates biomass
//! regrowth, and grazing pressure eats it back down. Values are normalized
//! to 0-1, which matches the scale the scored policy expects.

use crate::telemetry::types::{Metrics, TelemetryRecord};
use chrono::{DateTime, Timelike, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;
use std::f64::consts::PI;
use std::path::Path;
use std::time::Duration;

const BASE_TEMPERATURE: f64 = 25.0;
const DIURNAL_AMPLITUDE: f64 = 6.0;
const RAIN_PROBABILITY: f64 = 0.03;
const MOISTURE_REGROWTH_THRESHOLD: f64 = 0.3;
const HEAT_STRESS_TEMPERATURE: f64 = 35.0;
const BASELINE_REGROWTH: f64 = 0.5;

/// Sensor-side noise applied to reported values.
const BIOMASS_NOISE_SD: f64 = 0.05;
const SOIL_NOISE_SD: f64 = 0.05;
const TEMPERATURE_NOISE_SD: f64 = 0.4;
const WEATHER_NOISE_SD: f64 = 0.5;

/// Static description of a zone as read from the simulator config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneSpec {
    pub id: String,
    #[serde(default)]
    pub area_hectares: f64,
    pub initial_biomass: f64,
    pub initial_soil_moisture: f64,
    pub initial_animal_load: u32,
    pub regen_rate: f64,
    pub degrade_rate: f64,
    pub evap_rate: f64,
}

/// Simulator configuration (tick interval plus zone list).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    pub tick_ms: u64,
    pub zones: Vec<ZoneSpec>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        let zone = |id: &str, biomass: f64, soil: f64, load: u32, degrade: f64| ZoneSpec {
            id: id.to_string(),
            area_hectares: 12.0,
            initial_biomass: biomass,
            initial_soil_moisture: soil,
            initial_animal_load: load,
            regen_rate: 0.02,
            degrade_rate: degrade,
            evap_rate: 0.0008,
        };

        Self {
            tick_ms: 1000,
            zones: vec![
                zone("north-paddock", 0.8, 0.45, 10, 0.0015),
                zone("river-flat", 0.6, 0.6, 25, 0.002),
                zone("ridge", 0.35, 0.25, 40, 0.003),
            ],
        }
    }
}

impl SimulatorConfig {
    /// Load a zone layout from a JSON file.
    pub fn load(path: &Path) -> Result<Self, crate::config::ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::config::ConfigError::IoError(e.to_string()))?;
        serde_json::from_str(&content)
            .map_err(|e| crate::config::ConfigError::ParseError(e.to_string()))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

/// Mutable state of one simulated zone.
#[derive(Debug, Clone)]
pub struct PastureZone {
    pub zone_id: String,
    pub biomass: f64,
    pub soil_moisture: f64,
    pub temperature: f64,
    pub animal_load: u32,
    regen_rate: f64,
    degrade_rate: f64,
    evap_rate: f64,
}

impl From<&ZoneSpec> for PastureZone {
    fn from(spec: &ZoneSpec) -> Self {
        Self {
            zone_id: spec.id.clone(),
            biomass: spec.initial_biomass,
            soil_moisture: spec.initial_soil_moisture,
            temperature: BASE_TEMPERATURE,
            animal_load: spec.initial_animal_load,
            regen_rate: spec.regen_rate,
            degrade_rate: spec.degrade_rate,
            evap_rate: spec.evap_rate,
        }
    }
}

impl PastureZone {
    /// Advance the zone one step and emit the observed reading.
    pub fn tick<R: Rng>(&mut self, now: DateTime<Utc>, rng: &mut R) -> TelemetryRecord {
        self.temperature = diurnal_temperature(now) + gaussian(rng, WEATHER_NOISE_SD);
        self.soil_moisture =
            next_soil_moisture(self.soil_moisture, self.temperature, self.evap_rate, rng);
        self.biomass = next_biomass(
            self.biomass,
            self.regen_rate,
            self.degrade_rate,
            self.animal_load,
            self.soil_moisture,
            self.temperature,
        );

        TelemetryRecord {
            ts: now,
            zone_id: self.zone_id.clone(),
            metrics: Metrics {
                biomass: clamp_unit(self.biomass + gaussian(rng, BIOMASS_NOISE_SD)),
                soil_moisture: clamp_unit(self.soil_moisture + gaussian(rng, SOIL_NOISE_SD)),
                temperature: self.temperature + gaussian(rng, TEMPERATURE_NOISE_SD),
                animal_load: self.animal_load,
            },
            quality: draw_quality(rng).to_string(),
        }
    }
}

/// Drives every configured zone from a single RNG.
pub struct Simulator {
    zones: Vec<PastureZone>,
    rng: StdRng,
}

impl Simulator {
    /// Create a simulator. A fixed seed makes runs reproducible.
    pub fn new(config: &SimulatorConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            zones: config.zones.iter().map(PastureZone::from).collect(),
            rng,
        }
    }

    /// One reading per zone, all stamped with `now`.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<TelemetryRecord> {
        let mut records = Vec::with_capacity(self.zones.len());
        for zone in &mut self.zones {
            records.push(zone.tick(now, &mut self.rng));
        }
        records
    }

    pub fn zone_count(&self) -> usize {
        self.zones.len()
    }
}

/// Temperature curve peaking at midday, coolest at midnight.
fn diurnal_temperature(now: DateTime<Utc>) -> f64 {
    let hour = now.hour() as f64 + now.minute() as f64 / 60.0;
    let radian = hour / 24.0 * 2.0 * PI;
    BASE_TEMPERATURE + DIURNAL_AMPLITUDE * (radian - PI / 2.0).sin()
}

fn next_soil_moisture<R: Rng>(current: f64, temperature: f64, evap_rate: f64, rng: &mut R) -> f64 {
    let mut next = current - temperature * evap_rate;
    if rng.gen::<f64>() < RAIN_PROBABILITY {
        next += rng.gen_range(0.1..0.3);
    }
    clamp_unit(next)
}

fn next_biomass(
    current: f64,
    regen_rate: f64,
    degrade_rate: f64,
    animal_load: u32,
    soil_moisture: f64,
    temperature: f64,
) -> f64 {
    let mut regrowth = BASELINE_REGROWTH;
    if soil_moisture > MOISTURE_REGROWTH_THRESHOLD {
        regrowth = regen_rate;
        if temperature > HEAT_STRESS_TEMPERATURE {
            regrowth *= 0.5;
        }
    }
    let grazing = animal_load as f64 * degrade_rate;
    clamp_unit(current + regrowth - grazing)
}

fn draw_quality<R: Rng>(rng: &mut R) -> &'static str {
    let r: f64 = rng.gen();
    if r < 0.01 {
        "CORRUPT"
    } else if r < 0.03 {
        "PARTIAL"
    } else if r < 0.08 {
        "NOISY"
    } else {
        "OK"
    }
}

fn gaussian<R: Rng>(rng: &mut R, std_dev: f64) -> f64 {
    match Normal::new(0.0, std_dev) {
        Ok(normal) => rng.sample(normal),
        Err(_) => 0.0,
    }
}

fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}
