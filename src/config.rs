//! Simulation configuration
//!
//! One immutable value passed into module `setup` and `load_data`; there is
//! no process-wide mutable configuration. Unknown keys in a config file are
//! rejected rather than silently ignored.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    pub simulation_parameters: SimulationParameters,
    pub run_configuration: RunConfiguration,
    /// Consumed by the healthcare access module only.
    #[serde(default)]
    pub healthcare_access: HealthcareAccessConfig,
    /// Consumed by the opportunistic screening module only.
    #[serde(default)]
    pub opportunistic_screening: ScreeningConfig,
}

/// Calendar bounds shared by reference tables and runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationParameters {
    pub year_start: i32,
    pub year_end: i32,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        SimulationParameters {
            year_start: 1990,
            year_end: 2013,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RunConfiguration {
    /// Column suffix selecting one vector from draw-indexed reference
    /// tables.
    #[serde(default)]
    pub draw_number: u32,
    /// Seed for the run's single random source. Re-applied at the start of
    /// every `run`, so repeated runs of one simulation are bit-identical.
    #[serde(default)]
    pub random_seed: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthcareAccessConfig {
    /// Annual rate at which a living simulant makes an unplanned
    /// appointment.
    pub annual_utilization_rate: f64,
    pub appointment_cost: f64,
}

impl Default for HealthcareAccessConfig {
    fn default() -> Self {
        HealthcareAccessConfig {
            annual_utilization_rate: 0.7,
            appointment_cost: 7.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScreeningConfig {
    /// Daily medication costs.
    pub medication_a_cost: f64,
    pub medication_b_cost: f64,
    /// SBP reduction (mmHg) at full adherence.
    pub medication_a_effectiveness: f64,
    pub medication_b_effectiveness: f64,
    /// Fraction of prescribed doses actually taken, applied to both cost
    /// and effect.
    pub adherence: f64,
    pub blood_pressure_test_cost: f64,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        ScreeningConfig {
            medication_a_cost: 0.20,
            medication_b_cost: 0.35,
            medication_a_effectiveness: 9.0,
            medication_b_effectiveness: 7.0,
            adherence: 0.65,
            blood_pressure_test_cost: 3.0,
        }
    }
}

impl SimulationConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: SimulationConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let params = &self.simulation_parameters;
        if params.year_start > params.year_end {
            return Err(Error::Configuration(format!(
                "year_start {} is after year_end {}",
                params.year_start, params.year_end
            )));
        }
        if !(0.0..=1.0).contains(&self.opportunistic_screening.adherence) {
            return Err(Error::Configuration(format!(
                "adherence must be in [0, 1], got {}",
                self.opportunistic_screening.adherence
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        SimulationConfig::default().validate().unwrap();
    }

    #[test]
    fn test_unknown_keys_fail_loudly() {
        let json = r#"{
            "simulation_parameters": {"year_start": 1990, "year_end": 2013},
            "run_configuration": {"draw_number": 0, "random_seed": 0},
            "not_a_section": {}
        }"#;
        assert!(serde_json::from_str::<SimulationConfig>(json).is_err());
    }

    #[test]
    fn test_inverted_years_rejected() {
        let mut config = SimulationConfig::default();
        config.simulation_parameters.year_start = 2020;
        assert!(matches!(
            config.validate().unwrap_err(),
            Error::Configuration(_)
        ));
    }

    #[test]
    fn test_json_round_trip() {
        let config = SimulationConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: SimulationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(
            back.simulation_parameters.year_end,
            config.simulation_parameters.year_end
        );
    }
}
