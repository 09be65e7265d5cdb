//! Base demographics module
//!
//! Ages simulants, applies all-cause mortality, and accrues years of life
//! lost from the reference life table. Always first in module order; the
//! accounting columns (`age`, `fractional_age`, `sex`, `alive`) are owned
//! here and only mutated here.

use std::path::Path;

use rand::RngCore;

use crate::config::SimulationConfig;
use crate::data::{loader, DataTable};
use crate::engine::events::{DEATHS, TIME_STEP};
use crate::engine::{
    Event, EventContext, ListenerId, ModuleRegistration, RateFrame, SimulationModule,
};
use crate::error::{Error, Result};
use crate::interpolation::Interpolation;
use crate::population::{
    Column, PopulationSource, PopulationTable, AGE, ALIVE, FRACTIONAL_AGE, SEX, YEAR,
};

pub const MODULE_NAME: &str = "demographics";

pub const REMAINING_LIFE_EXPECTANCY: &str = "remaining_life_expectancy";
pub const MORTALITY_RATE: &str = "mortality_rate";

const AGING: ListenerId = 0;
const MORTALITY: ListenerId = 1;

pub struct DemographicsModule {
    mortality_table: DataTable,
    life_table: DataTable,
    mortality_lookup: Option<Interpolation>,
    life_lookup: Option<Interpolation>,
}

impl DemographicsModule {
    /// All-cause mortality rates keyed (age, sex, year) and a life table
    /// keyed on age with a `remaining_life_expectancy` column.
    pub fn new(mortality_table: DataTable, life_table: DataTable) -> Self {
        DemographicsModule {
            mortality_table,
            life_table,
            mortality_lookup: None,
            life_lookup: None,
        }
    }

    pub fn from_csv(dir: &Path) -> Result<Self> {
        Ok(DemographicsModule::new(
            loader::load_table(&dir.join("mortality_rates.csv"))?,
            loader::load_table(&dir.join("life_table.csv"))?,
        ))
    }

    /// In-memory default tables: Gompertz-shaped all-cause mortality with
    /// a female advantage and a slow secular improvement, and a life table
    /// derived from the first year's rates.
    pub fn with_default_tables(year_start: i32, year_end: i32) -> Self {
        let mut age = Vec::new();
        let mut sex = Vec::new();
        let mut year = Vec::new();
        let mut rate = Vec::new();
        for y in year_start..=year_end {
            let improvement = 0.995f64.powi(y - year_start);
            for &s in &[1.0, 2.0] {
                let sex_factor = if s == 1.0 { 1.0 } else { 0.75 };
                for a in 0..=110 {
                    age.push(a as f64);
                    sex.push(s);
                    year.push(y as f64);
                    rate.push(gompertz_rate(a) * sex_factor * improvement);
                }
            }
        }

        // Life table from the sex-averaged rates at year_start.
        let first_year: Vec<f64> = (0..=110)
            .map(|a| gompertz_rate(a) * (1.0 + 0.75) / 2.0)
            .collect();
        let expectancy = remaining_life_expectancies(&first_year);
        let life_table = DataTable::new()
            .with_column(AGE, (0..=110).map(|a| a as f64).collect())
            .with_column(REMAINING_LIFE_EXPECTANCY, expectancy);

        let mortality_table = DataTable::new()
            .with_column(AGE, age)
            .with_column(SEX, sex)
            .with_column(YEAR, year)
            .with_column(MORTALITY_RATE, rate);

        DemographicsModule::new(mortality_table, life_table)
    }

    fn mortality(&self) -> Result<&Interpolation> {
        self.mortality_lookup
            .as_ref()
            .ok_or_else(|| Error::Configuration("demographics data not loaded".to_string()))
    }

    fn life(&self) -> Result<&Interpolation> {
        self.life_lookup
            .as_ref()
            .ok_or_else(|| Error::Configuration("demographics data not loaded".to_string()))
    }
}

fn gompertz_rate(age: u32) -> f64 {
    3.0e-5 * (0.085 * age as f64).exp()
}

/// Standard abridged life-table accounting: survivorship from the annual
/// rates, person-years as the trapezoid of adjacent survivorships, and
/// remaining expectancy as the tail person-years over survivorship.
fn remaining_life_expectancies(annual_rates: &[f64]) -> Vec<f64> {
    let n = annual_rates.len();
    let mut survivors = vec![1.0; n + 1];
    for (a, &rate) in annual_rates.iter().enumerate() {
        survivors[a + 1] = survivors[a] * (-rate).exp();
    }
    let person_years: Vec<f64> = (0..n)
        .map(|a| (survivors[a] + survivors[a + 1]) / 2.0)
        .collect();
    let mut tail = 0.0;
    let mut expectancy = vec![0.0; n];
    for a in (0..n).rev() {
        tail += person_years[a];
        expectancy[a] = if survivors[a] > 0.0 { tail / survivors[a] } else { 0.0 };
    }
    expectancy
}

impl SimulationModule for DemographicsModule {
    fn name(&self) -> &str {
        MODULE_NAME
    }

    fn setup(&mut self, registration: &mut ModuleRegistration) {
        registration.register_living_listener(TIME_STEP, 0, AGING);
        registration.register_living_listener(TIME_STEP, 1, MORTALITY);
        registration.register_mortality_mutator();
    }

    fn contribute_columns(
        &self,
        source: &PopulationSource,
        _rng: &mut dyn RngCore,
    ) -> Result<Vec<(String, Column)>> {
        let fractional = source.ages().to_vec();
        let age: Vec<i32> = fractional.iter().map(|a| a.floor() as i32).collect();
        Ok(vec![
            (AGE.to_string(), Column::Int(age)),
            (FRACTIONAL_AGE.to_string(), Column::Float(fractional)),
            (SEX.to_string(), Column::Sex(source.sexes().to_vec())),
            (
                ALIVE.to_string(),
                Column::Bool(vec![true; source.len()]),
            ),
        ])
    }

    fn load_data(&mut self, _config: &SimulationConfig) -> Result<()> {
        self.mortality_lookup = Some(Interpolation::new(
            &self.mortality_table,
            &[SEX, YEAR],
            &[AGE],
            1,
        )?);
        self.life_lookup = Some(Interpolation::new(&self.life_table, &[], &[AGE], 1)?);
        Ok(())
    }

    fn on_listener(
        &self,
        listener: ListenerId,
        event: &Event,
        ctx: &mut EventContext<'_>,
    ) -> Result<()> {
        match listener {
            AGING => {
                let days = ctx.time_step().num_days() as f64;
                let population = ctx.population_mut();
                population.add_float_where(FRACTIONAL_AGE, &event.mask, days / 365.0)?;
                let fractional = population.floats(FRACTIONAL_AGE)?.to_vec();
                for (age, f) in population.ints_mut(AGE)?.iter_mut().zip(fractional) {
                    *age = f.floor() as i32;
                }
            }
            MORTALITY => {
                let frame = ctx.mortality_rate_step()?;
                let mut deaths = ctx.draw(&frame);
                deaths.and(&event.mask);
                if !deaths.any() {
                    return Ok(());
                }
                let query = ctx.population().query(&[AGE])?;
                let expectancy = self.life()?.evaluate(&query)?;
                let remaining = expectancy.column(REMAINING_LIFE_EXPECTANCY)?;
                let ylls: f64 = deaths.indices().map(|i| remaining[i]).sum();
                ctx.add_yll(ylls);
                ctx.population_mut().set_bool_where(ALIVE, &deaths, false)?;
                ctx.emit(DEATHS, deaths);
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
        let query = population.query(&[AGE, SEX, YEAR])?;
        let result = self.mortality()?.evaluate(&query)?;
        let rate = result.column(MORTALITY_RATE)?;
        let alive = population.bools(ALIVE)?;
        for (i, v) in frame.values_mut().iter_mut().enumerate() {
            if alive[i] {
                *v += rate[i];
            }
        }
        Ok(())
    }
}
