//! Systolic blood pressure risk module
//!
//! Population Columns
//! ------------------
//! `systolic_blood_pressure_percentile`
//!     The simulant's position in the population-level SBP distribution. A
//!     simulant at 0.99 always runs high relative to the current average,
//!     one at 0.01 always low.
//! `systolic_blood_pressure`
//!     The simulant's current SBP in mmHg.
//!
//! Each continuous sub-step, SBP is re-derived from a draw-indexed
//! lognormal parameter table at the simulant's fixed percentile. Elevated
//! SBP scales heart attack and hemorrhagic stroke incidence; a mediation
//! factor keeps the share of that effect already carried by downstream
//! modules from being counted twice.

use std::path::Path;

use rand::Rng;
use rand::RngCore;

use crate::config::SimulationConfig;
use crate::data::{draw_column, loader, DataTable};
use crate::engine::events::TIME_STEP_CONTINUOUS;
use crate::engine::{
    Event, EventContext, ListenerId, ModuleRegistration, MutatorKind, RateFrame,
    SimulationModule, DEFAULT_PRIORITY,
};
use crate::error::{Error, Result};
use crate::interpolation::Interpolation;
use crate::population::{Column, PopulationSource, PopulationTable, AGE, SEX, YEAR};
use crate::stats::normal_quantile;

use super::demographics;

pub const MODULE_NAME: &str = "blood_pressure";

pub const SBP: &str = "systolic_blood_pressure";
pub const SBP_PERCENTILE: &str = "systolic_blood_pressure_percentile";

pub const HEART_ATTACK: &str = "heart_attack";
pub const HEMORRHAGIC_STROKE: &str = "hemorrhagic_stroke";

/// SBP assigned before the first continuous update, and held for ages with
/// no modeled risk.
const BASELINE_SBP: f64 = 112.0;

const UPDATE_SBP: ListenerId = 0;

pub struct BloodPressureModule {
    distribution_table: DataTable,
    lookup: Option<Interpolation>,
    log_mean_column: String,
    log_sd_column: String,
}

impl BloodPressureModule {
    /// Distribution parameters keyed (age, sex, year) with draw-indexed
    /// `log_mean_<draw>` / `log_sd_<draw>` value columns.
    pub fn new(distribution_table: DataTable) -> Self {
        BloodPressureModule {
            distribution_table,
            lookup: None,
            log_mean_column: String::new(),
            log_sd_column: String::new(),
        }
    }

    pub fn from_csv(dir: &Path) -> Result<Self> {
        Ok(BloodPressureModule::new(loader::load_table(
            &dir.join("sbp_distributions.csv"),
        )?))
    }

    /// In-memory single-draw table: mean SBP rises from the baseline past
    /// age 25; under 25 there is no modeled risk, so the distribution is
    /// pinned at the baseline with negligible spread.
    pub fn with_default_tables(year_start: i32, year_end: i32) -> Self {
        let mut age = Vec::new();
        let mut sex = Vec::new();
        let mut year = Vec::new();
        let mut log_mean = Vec::new();
        let mut log_sd = Vec::new();
        for y in year_start..=year_end {
            for &s in &[1.0, 2.0] {
                for a in (0..=110).step_by(5) {
                    age.push(a as f64);
                    sex.push(s);
                    year.push(y as f64);
                    if a < 25 {
                        log_mean.push(BASELINE_SBP.ln());
                        log_sd.push(1.0e-7);
                    } else {
                        let mean = BASELINE_SBP + 0.5 * (a as f64 - 25.0);
                        log_mean.push(mean.ln());
                        log_sd.push(0.08);
                    }
                }
            }
        }
        BloodPressureModule::new(
            DataTable::new()
                .with_column(AGE, age)
                .with_column(SEX, sex)
                .with_column(YEAR, year)
                .with_column(&draw_column("log_mean", 0), log_mean)
                .with_column(&draw_column("log_sd", 0), log_sd),
        )
    }

    fn lookup(&self) -> Result<&Interpolation> {
        self.lookup
            .as_ref()
            .ok_or_else(|| Error::Configuration("blood pressure data not loaded".to_string()))
    }
}

impl SimulationModule for BloodPressureModule {
    fn name(&self) -> &str {
        MODULE_NAME
    }

    fn dependencies(&self) -> Vec<String> {
        vec![demographics::MODULE_NAME.to_string()]
    }

    fn setup(&mut self, registration: &mut ModuleRegistration) {
        registration.register_living_listener(TIME_STEP_CONTINUOUS, DEFAULT_PRIORITY, UPDATE_SBP);
        registration.register_incidence_mutator(HEART_ATTACK, MutatorKind::Multiplicative);
        registration.register_incidence_mutator(HEMORRHAGIC_STROKE, MutatorKind::Multiplicative);
        registration.register_mediation_factor(HEART_ATTACK, 0.3);
        registration.register_mediation_factor(HEMORRHAGIC_STROKE, 0.3);
    }

    fn contribute_columns(
        &self,
        source: &PopulationSource,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<(String, Column)>> {
        let percentiles: Vec<f64> = (0..source.len())
            .map(|_| rng.random_range(0.01..0.99))
            .collect();
        Ok(vec![
            (SBP_PERCENTILE.to_string(), Column::Float(percentiles)),
            (
                SBP.to_string(),
                Column::Float(vec![BASELINE_SBP; source.len()]),
            ),
        ])
    }

    fn load_data(&mut self, config: &SimulationConfig) -> Result<()> {
        let draw = config.run_configuration.draw_number;
        self.log_mean_column = draw_column("log_mean", draw);
        self.log_sd_column = draw_column("log_sd", draw);
        let selected = self.distribution_table.select(&[
            AGE,
            SEX,
            YEAR,
            &self.log_mean_column,
            &self.log_sd_column,
        ])?;
        self.lookup = Some(Interpolation::new(&selected, &[SEX, YEAR], &[AGE], 1)?);
        Ok(())
    }

    fn on_listener(
        &self,
        listener: ListenerId,
        event: &Event,
        ctx: &mut EventContext<'_>,
    ) -> Result<()> {
        if listener != UPDATE_SBP {
            return Ok(());
        }
        let query = ctx.population().query(&[AGE, SEX, YEAR])?;
        let distribution = self.lookup()?.evaluate(&query)?;
        let log_mean = distribution.column(&self.log_mean_column)?;
        let log_sd = distribution.column(&self.log_sd_column)?;
        let percentile = ctx.population().floats(SBP_PERCENTILE)?.to_vec();

        let sbp = ctx.population_mut().floats_mut(SBP)?;
        for i in event.mask.indices() {
            sbp[i] = (log_mean[i] + log_sd[i] * normal_quantile(percentile[i])).exp();
        }
        Ok(())
    }

    fn incidence_contribution(
        &self,
        population: &PopulationTable,
        cause: &str,
        frame: &mut RateFrame,
    ) -> Result<()> {
        if cause != HEART_ATTACK && cause != HEMORRHAGIC_STROKE {
            return Ok(());
        }
        let sbp = population.floats(SBP)?;
        for (i, v) in frame.values_mut().iter_mut().enumerate() {
            let adjustment = 1.5f64.powf((sbp[i] - 112.5) / 10.0).max(1.0);
            *v *= adjustment;
        }
        Ok(())
    }
}
