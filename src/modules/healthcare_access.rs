//! Healthcare access module
//!
//! Models contact with the healthcare system: a configured annual
//! utilization rate drives unplanned appointments, and a follow-up date
//! column drives scheduled ones. Both kinds cost an appointment fee and
//! fan out as events other modules (screening) hook into.

use chrono::NaiveDateTime;
use rand::RngCore;

use crate::config::SimulationConfig;
use crate::engine::events::{
    FOLLOWUP_HEALTHCARE_ACCESS, GENERAL_HEALTHCARE_ACCESS, TIME_STEP,
};
use crate::engine::{
    Event, EventContext, ListenerId, ModuleRegistration, SimulationModule, DEFAULT_PRIORITY,
};
use crate::error::Result;
use crate::population::{Column, Mask, PopulationSource, PopulationTable};
use crate::rates;

use super::demographics;

pub const MODULE_NAME: &str = "healthcare_access";

/// Unix timestamp (seconds) of the next scheduled appointment; NaN when
/// none is scheduled.
pub const FOLLOWUP_DATE: &str = "healthcare_followup_date";

const GENERAL_ACCESS: ListenerId = 0;
const FOLLOWUP_ACCESS: ListenerId = 1;

/// Days per month used for follow-up horizons.
const DAYS_PER_MONTH: f64 = 30.5;

#[derive(Default)]
pub struct HealthcareAccessModule {
    annual_utilization_rate: f64,
    appointment_cost: f64,
}

impl HealthcareAccessModule {
    pub fn new() -> Self {
        HealthcareAccessModule::default()
    }
}

/// Schedule a follow-up appointment `months` from `now` for the masked
/// rows.
pub fn schedule_followup(
    population: &mut PopulationTable,
    mask: &Mask,
    now: NaiveDateTime,
    months: f64,
) -> Result<()> {
    let due = now.and_utc().timestamp() as f64 + months * DAYS_PER_MONTH * 86400.0;
    population.set_float_where(FOLLOWUP_DATE, mask, due)
}

impl SimulationModule for HealthcareAccessModule {
    fn name(&self) -> &str {
        MODULE_NAME
    }

    fn dependencies(&self) -> Vec<String> {
        vec![demographics::MODULE_NAME.to_string()]
    }

    fn setup(&mut self, registration: &mut ModuleRegistration) {
        registration.register_living_listener(TIME_STEP, DEFAULT_PRIORITY, GENERAL_ACCESS);
        registration.register_living_listener(TIME_STEP, DEFAULT_PRIORITY, FOLLOWUP_ACCESS);
    }

    fn contribute_columns(
        &self,
        source: &PopulationSource,
        _rng: &mut dyn RngCore,
    ) -> Result<Vec<(String, Column)>> {
        Ok(vec![(
            FOLLOWUP_DATE.to_string(),
            Column::Float(vec![f64::NAN; source.len()]),
        )])
    }

    fn load_data(&mut self, config: &SimulationConfig) -> Result<()> {
        self.annual_utilization_rate = config.healthcare_access.annual_utilization_rate;
        self.appointment_cost = config.healthcare_access.appointment_cost;
        Ok(())
    }

    fn on_listener(
        &self,
        listener: ListenerId,
        event: &Event,
        ctx: &mut EventContext<'_>,
    ) -> Result<()> {
        match listener {
            GENERAL_ACCESS => {
                let per_step = rates::from_yearly(self.annual_utilization_rate, ctx.time_step());
                let rates_per_row = vec![per_step; ctx.population().len()];
                let mut access = rates::draw_mask(&rates_per_row, ctx.rng());
                access.and(&event.mask);
                if access.any() {
                    ctx.add_cost(MODULE_NAME, access.count() as f64 * self.appointment_cost);
                    ctx.emit(GENERAL_HEALTHCARE_ACCESS, access);
                }
            }
            FOLLOWUP_ACCESS => {
                let now = ctx.current_time().and_utc().timestamp() as f64;
                let dates = ctx.population().floats(FOLLOWUP_DATE)?;
                let mut due = Mask::none(dates.len());
                for i in event.mask.indices() {
                    // NaN (nothing scheduled) never compares due.
                    if dates[i] <= now {
                        due.set(i, true);
                    }
                }
                if due.any() {
                    ctx.population_mut()
                        .set_float_where(FOLLOWUP_DATE, &due, f64::NAN)?;
                    ctx.add_cost(MODULE_NAME, due.count() as f64 * self.appointment_cost);
                    ctx.emit(FOLLOWUP_HEALTHCARE_ACCESS, due);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_schedule_and_clear_followup() {
        let mut population = PopulationTable::new();
        population
            .insert_column(FOLLOWUP_DATE, Column::Float(vec![f64::NAN; 3]))
            .unwrap();

        let now = NaiveDate::from_ymd_opt(1990, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let mask = Mask::from_vec(vec![true, false, true]);
        schedule_followup(&mut population, &mask, now, 1.0).unwrap();

        let dates = population.floats(FOLLOWUP_DATE).unwrap();
        let expected = now.and_utc().timestamp() as f64 + 30.5 * 86400.0;
        assert_eq!(dates[0], expected);
        assert!(dates[1].is_nan());
        assert_eq!(dates[2], expected);
    }

    #[test]
    fn test_nan_is_never_due() {
        // NaN <= t is false for every t, so an unscheduled row can never
        // fire a follow-up.
        assert!(!(f64::NAN <= f64::INFINITY));
    }
}
