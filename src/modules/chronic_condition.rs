//! Chronic condition module
//!
//! One instance per modeled condition (heart attack, hemorrhagic stroke,
//! ...). Contributes a boolean state column named after the condition,
//! realizes incidence among the living not-yet-affected through the rate
//! pipeline, adds excess mortality for the affected, attributes deaths
//! that occur while the condition is present, and accrues YLDs from a
//! disability weight.

use std::path::Path;

use rand::RngCore;

use crate::config::SimulationConfig;
use crate::data::{loader, DataTable};
use crate::engine::events::{DEATHS, TIME_STEP};
use crate::engine::{
    Event, EventContext, ListenerId, ModuleRegistration, MutatorKind, RateFrame,
    SimulationModule, DEFAULT_PRIORITY,
};
use crate::error::{Error, Result};
use crate::interpolation::Interpolation;
use crate::population::{
    Column, Mask, PopulationSource, PopulationTable, AGE, ALIVE, SEX, YEAR,
};

use super::demographics::{self, MORTALITY_RATE};

pub const INCIDENCE_RATE: &str = "incidence_rate";

const INCIDENCE: ListenerId = 0;
const ATTRIBUTION: ListenerId = 1;

pub struct ChronicConditionModule {
    condition: String,
    incidence_table: DataTable,
    excess_mortality_table: DataTable,
    disability_weight: f64,
    incidence_lookup: Option<Interpolation>,
    mortality_lookup: Option<Interpolation>,
}

impl ChronicConditionModule {
    /// `incidence_table` and `excess_mortality_table` are keyed
    /// (age, sex, year) with `incidence_rate` / `mortality_rate` value
    /// columns.
    pub fn new(
        condition: &str,
        incidence_table: DataTable,
        excess_mortality_table: DataTable,
        disability_weight: f64,
    ) -> Self {
        ChronicConditionModule {
            condition: condition.to_string(),
            incidence_table,
            excess_mortality_table,
            disability_weight,
            incidence_lookup: None,
            mortality_lookup: None,
        }
    }

    pub fn from_csv(condition: &str, dir: &Path, disability_weight: f64) -> Result<Self> {
        Ok(ChronicConditionModule::new(
            condition,
            loader::load_table(&dir.join(format!("{condition}_incidence.csv")))?,
            loader::load_table(&dir.join(format!("{condition}_excess_mortality.csv")))?,
            disability_weight,
        ))
    }

    /// Age/sex/year-flat rates, for pricing-style defaults and tests.
    pub fn with_constant_rates(
        condition: &str,
        annual_incidence: f64,
        annual_excess_mortality: f64,
        disability_weight: f64,
        year_start: i32,
        year_end: i32,
    ) -> Self {
        let build = |value_column: &str, rate: f64| {
            let mut age = Vec::new();
            let mut sex = Vec::new();
            let mut year = Vec::new();
            let mut values = Vec::new();
            for y in year_start..=year_end {
                for &s in &[1.0, 2.0] {
                    for a in (0..=120).step_by(20) {
                        age.push(a as f64);
                        sex.push(s);
                        year.push(y as f64);
                        values.push(rate);
                    }
                }
            }
            DataTable::new()
                .with_column(AGE, age)
                .with_column(SEX, sex)
                .with_column(YEAR, year)
                .with_column(value_column, values)
        };
        ChronicConditionModule::new(
            condition,
            build(INCIDENCE_RATE, annual_incidence),
            build(MORTALITY_RATE, annual_excess_mortality),
            disability_weight,
        )
    }

    pub fn condition(&self) -> &str {
        &self.condition
    }

    fn incidence(&self) -> Result<&Interpolation> {
        self.incidence_lookup.as_ref().ok_or_else(|| {
            Error::Configuration(format!("{} data not loaded", self.condition))
        })
    }

    fn excess_mortality(&self) -> Result<&Interpolation> {
        self.mortality_lookup.as_ref().ok_or_else(|| {
            Error::Configuration(format!("{} data not loaded", self.condition))
        })
    }

    /// Living simulants currently carrying the condition.
    fn affected(&self, population: &PopulationTable) -> Result<Mask> {
        let mut mask = population.bool_mask(&self.condition)?;
        mask.and(&population.living()?);
        Ok(mask)
    }
}

impl SimulationModule for ChronicConditionModule {
    fn name(&self) -> &str {
        &self.condition
    }

    fn dependencies(&self) -> Vec<String> {
        vec![demographics::MODULE_NAME.to_string()]
    }

    fn setup(&mut self, registration: &mut ModuleRegistration) {
        registration.register_living_listener(TIME_STEP, DEFAULT_PRIORITY, INCIDENCE);
        registration.register_listener(DEATHS, DEFAULT_PRIORITY, ATTRIBUTION);
        registration.register_mortality_mutator();
        registration.register_incidence_mutator(&self.condition, MutatorKind::Additive);
    }

    fn contribute_columns(
        &self,
        source: &PopulationSource,
        _rng: &mut dyn RngCore,
    ) -> Result<Vec<(String, Column)>> {
        Ok(vec![(
            self.condition.clone(),
            Column::Bool(vec![false; source.len()]),
        )])
    }

    fn load_data(&mut self, _config: &SimulationConfig) -> Result<()> {
        self.incidence_lookup = Some(Interpolation::new(
            &self.incidence_table,
            &[SEX, YEAR],
            &[AGE],
            1,
        )?);
        self.mortality_lookup = Some(Interpolation::new(
            &self.excess_mortality_table,
            &[SEX, YEAR],
            &[AGE],
            1,
        )?);
        Ok(())
    }

    fn on_listener(
        &self,
        listener: ListenerId,
        event: &Event,
        ctx: &mut EventContext<'_>,
    ) -> Result<()> {
        match listener {
            INCIDENCE => {
                let mut at_risk = event.mask.clone();
                at_risk.and_not(&ctx.population().bool_mask(&self.condition)?);

                let frame = ctx.incidence_rate_step(&self.condition)?;
                let mut new_cases = ctx.draw(&frame);
                new_cases.and(&at_risk);
                if new_cases.any() {
                    ctx.population_mut()
                        .set_bool_where(&self.condition, &new_cases, true)?;
                    ctx.record_new_cases(&self.condition, new_cases.count() as u64);
                }
            }
            ATTRIBUTION => {
                let mut attributed = event.mask.clone();
                attributed.and(&ctx.population().bool_mask(&self.condition)?);
                ctx.record_deaths(&self.condition, attributed.count() as u64);
            }
            _ => {}
        }
        Ok(())
    }

    fn mortality_contribution(
        &self,
        population: &PopulationTable,
        frame: &mut RateFrame,
    ) -> Result<()> {
        let affected = self.affected(population)?;
        if !affected.any() {
            return Ok(());
        }
        let query = population.query(&[AGE, SEX, YEAR])?;
        let result = self.excess_mortality()?.evaluate(&query)?;
        let rate = result.column(MORTALITY_RATE)?;
        let values = frame.values_mut();
        for i in affected.indices() {
            values[i] += rate[i];
        }
        Ok(())
    }

    fn incidence_contribution(
        &self,
        population: &PopulationTable,
        cause: &str,
        frame: &mut RateFrame,
    ) -> Result<()> {
        if cause != self.condition {
            return Ok(());
        }
        let query = population.query(&[AGE, SEX, YEAR])?;
        let result = self.incidence()?.evaluate(&query)?;
        let rate = result.column(INCIDENCE_RATE)?;

        let alive = population.bools(ALIVE)?;
        let has_condition = population.bools(&self.condition)?;
        for (i, v) in frame.values_mut().iter_mut().enumerate() {
            if alive[i] && !has_condition[i] {
                *v += rate[i];
            }
        }
        Ok(())
    }

    fn yld_contribution(&self, population: &PopulationTable, alive: &Mask) -> f64 {
        match population.count_where(&self.condition, alive) {
            Ok(count) => self.disability_weight * count as f64,
            Err(_) => 0.0,
        }
    }
}
