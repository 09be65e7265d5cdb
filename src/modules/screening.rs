//! Opportunistic blood pressure screening
//!
//! Whenever a simulant touches the healthcare system their blood pressure
//! is tested. Normotensives get a distant follow-up; hypertensives get a
//! near one and medication; severe hypertensives get everything. Costs of
//! tests and medication accrue per year, and medication lowers SBP in
//! proportion to configured effectiveness and adherence.

use crate::config::{ScreeningConfig, SimulationConfig};
use crate::engine::events::{
    FOLLOWUP_HEALTHCARE_ACCESS, GENERAL_HEALTHCARE_ACCESS, TIME_STEP,
};
use crate::engine::{
    Event, EventContext, ListenerId, ModuleRegistration, SimulationModule, DEFAULT_PRIORITY,
};
use crate::error::Result;
use crate::population::{Column, Mask, PopulationSource, PopulationTable, AGE};

use super::blood_pressure::{self, SBP};
use super::healthcare_access::{self, schedule_followup};

pub const MODULE_NAME: &str = "opportunistic_screening";

pub const MEDICATION_A: &str = "taking_blood_pressure_medication_a";
pub const MEDICATION_B: &str = "taking_blood_pressure_medication_b";

const NON_FOLLOWUP_TEST: ListenerId = 0;
const FOLLOWUP_TEST: ListenerId = 1;
const TRACK_COST: ListenerId = 2;
const ADJUST_BLOOD_PRESSURE: ListenerId = 3;

/// Follow-up horizons in months.
const NORMOTENSIVE_FOLLOWUP: f64 = 60.0;
const MEDICATED_NORMOTENSIVE_FOLLOWUP: f64 = 11.0;
const HYPERTENSIVE_FOLLOWUP: f64 = 6.0;
const NEW_HYPERTENSIVE_FOLLOWUP: f64 = 1.0;

#[derive(Default)]
pub struct OpportunisticScreeningModule {
    screening: ScreeningConfig,
}

impl OpportunisticScreeningModule {
    pub fn new() -> Self {
        OpportunisticScreeningModule {
            screening: ScreeningConfig::default(),
        }
    }
}

/// Split the tested rows into (normotensive, hypertensive, severe). The
/// hypertension threshold is 140 mmHg before age 60 and 150 after; 180
/// and over is severe at any age.
fn hypertensive_categories(
    population: &PopulationTable,
    mask: &Mask,
) -> Result<(Mask, Mask, Mask)> {
    let age = population.ints(AGE)?;
    let sbp = population.floats(SBP)?;
    let mut normotensive = Mask::none(mask.len());
    let mut hypertensive = Mask::none(mask.len());
    let mut severe = Mask::none(mask.len());
    for i in mask.indices() {
        let threshold = if age[i] < 60 { 140.0 } else { 150.0 };
        if sbp[i] >= 180.0 {
            severe.set(i, true);
        } else if sbp[i] >= threshold {
            hypertensive.set(i, true);
        } else {
            normotensive.set(i, true);
        }
    }
    Ok((normotensive, hypertensive, severe))
}

impl SimulationModule for OpportunisticScreeningModule {
    fn name(&self) -> &str {
        MODULE_NAME
    }

    fn dependencies(&self) -> Vec<String> {
        vec![
            blood_pressure::MODULE_NAME.to_string(),
            healthcare_access::MODULE_NAME.to_string(),
        ]
    }

    fn setup(&mut self, registration: &mut ModuleRegistration) {
        registration.register_listener(
            GENERAL_HEALTHCARE_ACCESS,
            DEFAULT_PRIORITY,
            NON_FOLLOWUP_TEST,
        );
        registration.register_listener(FOLLOWUP_HEALTHCARE_ACCESS, DEFAULT_PRIORITY, FOLLOWUP_TEST);
        registration.register_living_listener(TIME_STEP, DEFAULT_PRIORITY, TRACK_COST);
        registration.register_living_listener(TIME_STEP, DEFAULT_PRIORITY, ADJUST_BLOOD_PRESSURE);
    }

    fn contribute_columns(
        &self,
        source: &PopulationSource,
        _rng: &mut dyn rand::RngCore,
    ) -> Result<Vec<(String, Column)>> {
        let n = source.len();
        Ok(vec![
            (MEDICATION_A.to_string(), Column::Bool(vec![false; n])),
            (MEDICATION_B.to_string(), Column::Bool(vec![false; n])),
        ])
    }

    fn load_data(&mut self, config: &SimulationConfig) -> Result<()> {
        self.screening = config.opportunistic_screening;
        Ok(())
    }

    fn on_listener(
        &self,
        listener: ListenerId,
        event: &Event,
        ctx: &mut EventContext<'_>,
    ) -> Result<()> {
        match listener {
            NON_FOLLOWUP_TEST => {
                ctx.add_cost(
                    MODULE_NAME,
                    event.mask.count() as f64 * self.screening.blood_pressure_test_cost,
                );
                let (normotensive, hypertensive, severe) =
                    hypertensive_categories(ctx.population(), &event.mask)?;
                let now = ctx.current_time();

                let population = ctx.population_mut();
                schedule_followup(population, &normotensive, now, NORMOTENSIVE_FOLLOWUP)?;
                schedule_followup(population, &hypertensive, now, NEW_HYPERTENSIVE_FOLLOWUP)?;
                schedule_followup(population, &severe, now, HYPERTENSIVE_FOLLOWUP)?;
                population.set_bool_where(MEDICATION_A, &severe, true)?;
                population.set_bool_where(MEDICATION_B, &severe, true)?;
            }
            FOLLOWUP_TEST => {
                ctx.add_cost(
                    MODULE_NAME,
                    event.mask.count() as f64 * self.screening.blood_pressure_test_cost,
                );
                let (normotensive, hypertensive, severe) =
                    hypertensive_categories(ctx.population(), &event.mask)?;

                let mut on_medication = ctx.population().bool_mask(MEDICATION_A)?;
                on_medication.or(&ctx.population().bool_mask(MEDICATION_B)?);
                let mut medicated_normotensive = normotensive.clone();
                medicated_normotensive.and(&on_medication);
                let mut unmedicated_normotensive = normotensive;
                unmedicated_normotensive.and_not(&on_medication);

                let now = ctx.current_time();
                let population = ctx.population_mut();

                // Controlled and unmedicated: come back in five years.
                schedule_followup(
                    population,
                    &unmedicated_normotensive,
                    now,
                    NORMOTENSIVE_FOLLOWUP,
                )?;

                // Controlled on medication: drop the drugs, check sooner.
                schedule_followup(
                    population,
                    &medicated_normotensive,
                    now,
                    MEDICATED_NORMOTENSIVE_FOLLOWUP,
                )?;
                population.set_bool_where(MEDICATION_A, &medicated_normotensive, false)?;
                population.set_bool_where(MEDICATION_B, &medicated_normotensive, false)?;

                // Still hypertensive: first-line drug and a 6-month check.
                schedule_followup(population, &hypertensive, now, HYPERTENSIVE_FOLLOWUP)?;
                population.set_bool_where(MEDICATION_A, &hypertensive, true)?;

                // Severe: both drugs and a 6-month check.
                schedule_followup(population, &severe, now, HYPERTENSIVE_FOLLOWUP)?;
                population.set_bool_where(MEDICATION_A, &severe, true)?;
                population.set_bool_where(MEDICATION_B, &severe, true)?;
            }
            TRACK_COST => {
                let days = ctx.time_step().num_days() as f64;
                for (column, daily_cost) in [
                    (MEDICATION_A, self.screening.medication_a_cost),
                    (MEDICATION_B, self.screening.medication_b_cost),
                ] {
                    let taking = ctx.population().count_where(column, &event.mask)?;
                    ctx.add_cost(
                        MODULE_NAME,
                        taking as f64 * daily_cost * self.screening.adherence * days,
                    );
                }
            }
            ADJUST_BLOOD_PRESSURE => {
                for (column, effectiveness) in [
                    (MEDICATION_A, self.screening.medication_a_effectiveness),
                    (MEDICATION_B, self.screening.medication_b_effectiveness),
                ] {
                    let mut taking = event.mask.clone();
                    taking.and(&ctx.population().bool_mask(column)?);
                    if taking.any() {
                        let reduction = effectiveness * self.screening.adherence;
                        ctx.population_mut()
                            .add_float_where(SBP, &taking, -reduction)?;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }
}
