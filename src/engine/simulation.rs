//! Simulation driver
//!
//! Owns the module registry, the population table, the clock, the single
//! seeded random source, and the per-run accumulators. The step loop is
//! strictly single-threaded and synchronous: a step is a fold over
//! modules x listeners with no suspension points, so no listener ever
//! observes a partial write from another.
//!
//! Follow-on events emitted by listeners (`deaths`) enter a pending queue
//! that is drained after the current label finishes fanning out and before
//! the next label of the same step.

use std::collections::{BTreeMap, VecDeque};

use chrono::{Datelike, Duration, NaiveDateTime};
use log::info;
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use serde::Serialize;

use crate::config::SimulationConfig;
use crate::error::{Error, Result};
use crate::population::{Column, Mask, PopulationSource, PopulationTable, YEAR};
use crate::rates;

use super::events::{self, Event, EventLabel};
use super::module::{ModuleRegistration, SimulationModule};
use super::pipeline::{self, RateFrame};
use super::registry::{ModuleEntry, ModuleRegistry};

/// Per-run accounting, cleared by `reset`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Accumulators {
    pub yll_by_year: BTreeMap<i32, f64>,
    pub yld_by_year: BTreeMap<i32, f64>,
    pub deaths_by_year_and_cause: BTreeMap<(i32, String), u64>,
    pub new_cases_by_year: BTreeMap<(i32, String), u64>,
    /// Costs keyed by (year, accruing module).
    pub cost_by_year: BTreeMap<(i32, String), f64>,
}

struct SimulationState {
    population: PopulationTable,
    initial_population: Option<PopulationTable>,
    current_time: Option<NaiveDateTime>,
    last_time_step: Duration,
    rng: SmallRng,
    accumulators: Accumulators,
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct Metrics {
    pub ylls: f64,
    pub ylds: f64,
    pub dalys: f64,
    pub cost: f64,
    pub deaths_by_cause: BTreeMap<String, u64>,
    pub new_cases_by_cause: BTreeMap<String, u64>,
    pub living: usize,
}

pub struct Simulation {
    config: SimulationConfig,
    registry: ModuleRegistry,
    state: SimulationState,
}

impl Simulation {
    /// Create a simulation around its privileged base module (the
    /// demographics module in any complete assembly). The base is pinned
    /// first in module order regardless of declared dependencies.
    pub fn new(config: SimulationConfig, base: Box<dyn SimulationModule>) -> Self {
        let seed = config.run_configuration.random_seed;
        let base = ModuleEntry::new(base, ModuleRegistration::default());
        Simulation {
            config,
            registry: ModuleRegistry::new(base),
            state: SimulationState {
                population: PopulationTable::new(),
                initial_population: None,
                current_time: None,
                last_time_step: Duration::days(30),
                rng: SmallRng::seed_from_u64(seed),
                accumulators: Accumulators::default(),
            },
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn population(&self) -> &PopulationTable {
        &self.state.population
    }

    pub fn accumulators(&self) -> &Accumulators {
        &self.state.accumulators
    }

    /// Register a module. Re-registration by name replaces the previous
    /// instance.
    pub fn register_module(&mut self, module: Box<dyn SimulationModule>) {
        let entry = ModuleEntry::new(module, ModuleRegistration::default());
        self.registry.register(entry);
    }

    pub fn deregister_module(&mut self, name: &str) -> bool {
        self.registry.deregister(name)
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    /// Let every module build its reference tables.
    pub fn load_data(&mut self) -> Result<()> {
        let order = self.registry.ordered()?.to_vec();
        for &idx in &order {
            self.registry.entries_mut()[idx]
                .module
                .load_data(&self.config)?;
        }
        Ok(())
    }

    /// Build the population table from module-contributed columns and
    /// preserve it as the initial image for `reset`.
    ///
    /// The base module's columns land first and establish the population
    /// size; later contributions must match it and may not redefine an
    /// existing column.
    pub fn load_population(&mut self, source: &PopulationSource) -> Result<()> {
        let order = self.registry.ordered()?.to_vec();
        let mut table = PopulationTable::new();
        for &idx in &order {
            let columns = self.registry.entries()[idx]
                .module
                .contribute_columns(source, &mut self.state.rng)?;
            for (name, column) in columns {
                table.insert_column(&name, column)?;
            }
        }
        table.insert_column(YEAR, Column::Int(vec![0; source.len()]))?;

        self.state.population = table;
        self.state.initial_population = Some(self.state.population.clone());
        info!("loaded population of {} simulants", source.len());
        Ok(())
    }

    /// Advance the clock from `start` to `end` in increments of `step`,
    /// emitting the step events and integrating YLDs.
    ///
    /// The random source is re-seeded from the configured seed at every
    /// call, so two runs of the same simulation are bit-identical.
    pub fn run(&mut self, start: NaiveDateTime, end: NaiveDateTime, step: Duration) -> Result<()> {
        if self.state.initial_population.is_none() {
            return Err(Error::Configuration(
                "load_population must be called before run".to_string(),
            ));
        }
        info!(
            "running {} -> {} with a {}h step",
            start,
            end,
            step.num_hours()
        );
        self.state.rng = SmallRng::seed_from_u64(self.config.run_configuration.random_seed);
        self.state.last_time_step = step;

        let mut current = start;
        while current <= end {
            self.state.current_time = Some(current);
            self.state.population.set_int_all(YEAR, current.year())?;

            let everyone = Mask::all(self.state.population.len());
            self.emit_event(events::TIME_STEP, everyone.clone())?;
            self.emit_event(events::TIME_STEP_CONTINUOUS, everyone)?;

            let yld = self.total_yld()?;
            self.state.accumulators.yld_by_year.insert(current.year(), yld);

            current = current + step;
        }
        Ok(())
    }

    /// Restore the initial population image, clear the clock and all
    /// accumulators, and reset every module. Idempotent.
    pub fn reset(&mut self) {
        for entry in self.registry.entries_mut() {
            entry.module.reset();
        }
        if let Some(initial) = &self.state.initial_population {
            self.state.population = initial.clone();
        }
        self.state.current_time = None;
        self.state.accumulators = Accumulators::default();
    }

    pub fn metrics(&self) -> Result<Metrics> {
        let acc = &self.state.accumulators;
        let mut deaths_by_cause = BTreeMap::new();
        for ((_, cause), count) in &acc.deaths_by_year_and_cause {
            *deaths_by_cause.entry(cause.clone()).or_insert(0) += count;
        }
        let mut new_cases_by_cause = BTreeMap::new();
        for ((_, cause), count) in &acc.new_cases_by_year {
            *new_cases_by_cause.entry(cause.clone()).or_insert(0) += count;
        }
        let ylls = acc.yll_by_year.values().sum::<f64>();
        let ylds = acc.yld_by_year.values().sum::<f64>();
        Ok(Metrics {
            ylls,
            ylds,
            dalys: ylls + ylds,
            cost: acc.cost_by_year.values().sum(),
            deaths_by_cause,
            new_cases_by_cause,
            living: self.state.population.living()?.count(),
        })
    }

    fn total_yld(&mut self) -> Result<f64> {
        let order = self.registry.ordered()?.to_vec();
        let alive = self.state.population.living()?;
        let mut total = 0.0;
        for &idx in &order {
            total += self.registry.entries()[idx]
                .module
                .yld_contribution(&self.state.population, &alive);
        }
        Ok(total)
    }

    /// Fan one event out across modules in dependency order, then drain
    /// any events the listeners queued.
    fn emit_event(&mut self, label: EventLabel, mask: Mask) -> Result<()> {
        let order = self.registry.ordered()?.to_vec();
        let now = self.state.current_time.ok_or_else(|| {
            Error::Configuration("events can only be emitted during a run".to_string())
        })?;

        let mut pending = VecDeque::new();
        pending.push_back(Event { label, mask });
        while let Some(event) = pending.pop_front() {
            for &idx in &order {
                let plan = self.registry.entries()[idx].listeners.matching(event.label);
                for (listener, living_only) in plan {
                    let mut mask = event.mask.clone();
                    if living_only {
                        mask.and(&self.state.population.living()?);
                    }
                    let scoped = Event {
                        label: event.label,
                        mask,
                    };
                    let entries = self.registry.entries();
                    let mut ctx = EventContext {
                        state: &mut self.state,
                        entries,
                        order: &order,
                        pending: &mut pending,
                        now,
                    };
                    entries[idx].module.on_listener(listener, &scoped, &mut ctx)?;
                }
            }
        }
        Ok(())
    }
}

/// The view of the simulation a listener works through: the population,
/// the clock, the random source, the rate pipeline, the accumulators, and
/// deferred event emission.
pub struct EventContext<'a> {
    state: &'a mut SimulationState,
    entries: &'a [ModuleEntry],
    order: &'a [usize],
    pending: &'a mut VecDeque<Event>,
    now: NaiveDateTime,
}

impl EventContext<'_> {
    pub fn population(&self) -> &PopulationTable {
        &self.state.population
    }

    pub fn population_mut(&mut self) -> &mut PopulationTable {
        &mut self.state.population
    }

    pub fn current_time(&self) -> NaiveDateTime {
        self.now
    }

    pub fn year(&self) -> i32 {
        self.now.year()
    }

    pub fn time_step(&self) -> Duration {
        self.state.last_time_step
    }

    pub fn rng(&mut self) -> &mut dyn RngCore {
        &mut self.state.rng
    }

    /// Queue an event; it fans out after the current label completes and
    /// before the next label of this step.
    pub fn emit(&mut self, label: EventLabel, mask: Mask) {
        self.pending.push_back(Event { label, mask });
    }

    /// Aggregate mortality rate frame for this step.
    pub fn mortality_rate_step(&self) -> Result<RateFrame> {
        pipeline::mortality_rate_step(
            self.entries,
            self.order,
            &self.state.population,
            self.state.last_time_step,
        )
    }

    /// Aggregate incidence rate frame for `cause` for this step.
    pub fn incidence_rate_step(&self, cause: &str) -> Result<RateFrame> {
        pipeline::incidence_rate_step(
            self.entries,
            self.order,
            &self.state.population,
            cause,
            self.state.last_time_step,
        )
    }

    /// Realize per-row transitions for a step-rate frame. One uniform
    /// variate per row, in row order.
    pub fn draw(&mut self, frame: &RateFrame) -> Mask {
        rates::draw_mask(frame.values(), &mut self.state.rng)
    }

    pub fn add_yll(&mut self, amount: f64) {
        *self
            .state
            .accumulators
            .yll_by_year
            .entry(self.now.year())
            .or_insert(0.0) += amount;
    }

    pub fn record_deaths(&mut self, cause: &str, count: u64) {
        if count > 0 {
            *self
                .state
                .accumulators
                .deaths_by_year_and_cause
                .entry((self.now.year(), cause.to_string()))
                .or_insert(0) += count;
        }
    }

    pub fn record_new_cases(&mut self, cause: &str, count: u64) {
        if count > 0 {
            *self
                .state
                .accumulators
                .new_cases_by_year
                .entry((self.now.year(), cause.to_string()))
                .or_insert(0) += count;
        }
    }

    pub fn add_cost(&mut self, module: &str, amount: f64) {
        if amount != 0.0 {
            *self
                .state
                .accumulators
                .cost_by_year
                .entry((self.now.year(), module.to_string()))
                .or_insert(0.0) += amount;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataTable;
    use crate::engine::events::{DEATHS, TIME_STEP, TIME_STEP_CONTINUOUS};
    use crate::modules::demographics::DemographicsModule;
    use crate::population::{ALIVE, AGE, FRACTIONAL_AGE};
    use chrono::NaiveDate;

    fn datetime(year: i32, month: u32, day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    /// All-cause mortality flat at `rate` for every age, sex, and year, and
    /// a life table with 10 remaining years at every age.
    fn flat_tables(rate: f64, year_start: i32, year_end: i32) -> (DataTable, DataTable) {
        let mut age = Vec::new();
        let mut sex = Vec::new();
        let mut year = Vec::new();
        let mut mortality = Vec::new();
        for y in year_start..=year_end {
            for &s in &[1.0, 2.0] {
                for a in (0..=120).step_by(10) {
                    age.push(a as f64);
                    sex.push(s);
                    year.push(y as f64);
                    mortality.push(rate);
                }
            }
        }
        let mortality_table = DataTable::new()
            .with_column("age", age)
            .with_column("sex", sex)
            .with_column("year", year)
            .with_column("mortality_rate", mortality);

        let life_table = DataTable::new()
            .with_column("age", (0..=120).map(|a| a as f64).collect())
            .with_column("remaining_life_expectancy", vec![10.0; 121]);

        (mortality_table, life_table)
    }

    fn simulation(rate: f64, seed: u64) -> Simulation {
        let mut config = SimulationConfig::default();
        config.run_configuration.random_seed = seed;
        let (mortality, life) = flat_tables(rate, 1990, 2013);
        let mut sim = Simulation::new(config, Box::new(DemographicsModule::new(mortality, life)));
        sim.load_data().unwrap();
        sim
    }

    #[test]
    fn test_aging_one_year_step() {
        // 100 simulants at age 40, zero mortality, one 365-day step.
        let mut sim = simulation(0.0, 1);
        sim.load_population(&PopulationSource::uniform_cohort(100, 40.0))
            .unwrap();
        let start = datetime(1990, 1, 1);
        sim.run(start, start, Duration::days(365)).unwrap();

        let population = sim.population();
        assert!(population.ints(AGE).unwrap().iter().all(|&a| a == 41));
        assert!(population
            .floats(FRACTIONAL_AGE)
            .unwrap()
            .iter()
            .all(|&a| (a - 41.0).abs() < 1e-12));
        assert_eq!(population.living().unwrap().count(), 100);
    }

    #[test]
    fn test_mortality_integration_matches_expectation() {
        // 1000 simulants, annual rate 0.1, one 365-day step. Expected
        // deaths 1000 * (1 - e^-0.1) ~ 95.2, sigma ~ 9.3.
        let mut sim = simulation(0.1, 42);
        sim.load_population(&PopulationSource::uniform_cohort(1000, 80.0))
            .unwrap();
        let start = datetime(1990, 1, 1);
        sim.run(start, start, Duration::days(365)).unwrap();

        let deaths = 1000 - sim.population().living().unwrap().count();
        let expected = 1000.0 * (1.0 - (-0.1f64).exp());
        assert!(
            (deaths as f64 - expected).abs() <= 3.0 * 9.3,
            "observed {deaths} deaths, expected ~{expected:.1}"
        );

        // Flat life table: every decedent contributes exactly 10 YLLs.
        let ylls = sim.accumulators().yll_by_year[&1990];
        assert!((ylls - deaths as f64 * 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_alive_is_monotone_and_dead_stop_aging() {
        let mut sim = simulation(0.5, 7);
        sim.load_population(&PopulationSource::uniform_cohort(200, 60.0))
            .unwrap();
        sim.run(
            datetime(1990, 1, 1),
            datetime(1993, 12, 31),
            Duration::days(365),
        )
        .unwrap();

        let population = sim.population();
        let alive = population.bools(ALIVE).unwrap();
        let fractional = population.floats(FRACTIONAL_AGE).unwrap();
        // Five 365-day steps fit between the bounds (1992 is a leap year):
        // the living aged every step, the dead stopped short.
        for (i, &a) in alive.iter().enumerate() {
            if a {
                assert!((fractional[i] - 65.0).abs() < 1e-9);
            } else {
                assert!(fractional[i] < 65.0);
            }
            let age = population.ints(AGE).unwrap()[i];
            assert_eq!(age, fractional[i].floor() as i32);
        }
        assert!(alive.iter().filter(|&&a| a).count() < 200);
    }

    #[test]
    fn test_determinism_same_seed_same_tables() {
        let run = |seed| {
            let mut sim = simulation(0.2, seed);
            sim.load_population(&PopulationSource::uniform_cohort(300, 50.0))
                .unwrap();
            sim.run(
                datetime(1990, 1, 1),
                datetime(1992, 12, 31),
                Duration::hours(732),
            )
            .unwrap();
            (sim.population().clone(), sim.accumulators().clone())
        };
        let (pop_a, acc_a) = run(5);
        let (pop_b, acc_b) = run(5);
        assert_eq!(pop_a, pop_b);
        assert_eq!(acc_a, acc_b);

        let (pop_c, _) = run(6);
        assert_ne!(pop_a, pop_c);
    }

    #[test]
    fn test_reset_then_rerun_is_bit_identical() {
        let mut sim = simulation(0.3, 9);
        sim.load_population(&PopulationSource::uniform_cohort(250, 70.0))
            .unwrap();
        let start = datetime(1990, 1, 1);
        let end = datetime(1991, 12, 31);

        sim.run(start, end, Duration::days(365)).unwrap();
        let first_population = sim.population().clone();
        let first_accumulators = sim.accumulators().clone();

        sim.reset();
        // Reset is idempotent.
        sim.reset();
        assert_eq!(sim.accumulators(), &Accumulators::default());

        sim.run(start, end, Duration::days(365)).unwrap();
        assert_eq!(sim.population(), &first_population);
        assert_eq!(sim.accumulators(), &first_accumulators);
    }

    #[test]
    fn test_run_without_population_is_an_error() {
        let mut sim = simulation(0.0, 0);
        let start = datetime(1990, 1, 1);
        assert!(matches!(
            sim.run(start, start, Duration::days(365)).unwrap_err(),
            Error::Configuration(_)
        ));
    }

    // A module whose listeners record their invocation order in population
    // columns, for dispatch-order assertions.
    struct Recorder;

    const REC_TIME_STEP: u32 = 0;
    const REC_DEATHS: u32 = 1;
    const REC_CONTINUOUS: u32 = 2;

    impl SimulationModule for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn setup(&mut self, registration: &mut ModuleRegistration) {
            registration.register_listener(TIME_STEP, 10, REC_TIME_STEP);
            registration.register_listener(DEATHS, 10, REC_DEATHS);
            registration.register_listener(TIME_STEP_CONTINUOUS, 10, REC_CONTINUOUS);
        }

        fn contribute_columns(
            &self,
            source: &PopulationSource,
            _rng: &mut dyn RngCore,
        ) -> Result<Vec<(String, Column)>> {
            let n = source.len();
            Ok(vec![
                ("seen_counter".to_string(), Column::Float(vec![0.0; n])),
                ("seen_time_step".to_string(), Column::Float(vec![-1.0; n])),
                ("seen_deaths".to_string(), Column::Float(vec![-1.0; n])),
                ("seen_continuous".to_string(), Column::Float(vec![-1.0; n])),
            ])
        }

        fn on_listener(
            &self,
            listener: u32,
            _event: &Event,
            ctx: &mut EventContext<'_>,
        ) -> Result<()> {
            let column = match listener {
                REC_TIME_STEP => "seen_time_step",
                REC_DEATHS => "seen_deaths",
                _ => "seen_continuous",
            };
            let count = ctx.population().floats("seen_counter")?[0];
            ctx.population_mut().floats_mut(column)?[0] = count;
            ctx.population_mut().floats_mut("seen_counter")?[0] = count + 1.0;
            Ok(())
        }
    }

    #[test]
    fn test_deaths_fires_after_time_step_and_before_next_label() {
        // A near-certain annual rate guarantees deaths on the first step.
        let mut sim = simulation(1000.0, 3);
        sim.register_module(Box::new(Recorder));
        sim.load_data().unwrap();
        sim.load_population(&PopulationSource::uniform_cohort(10, 50.0))
            .unwrap();
        let start = datetime(1990, 1, 1);
        sim.run(start, start, Duration::days(365)).unwrap();

        let population = sim.population();
        let time_step_at = population.floats("seen_time_step").unwrap()[0];
        let deaths_at = population.floats("seen_deaths").unwrap()[0];
        let continuous_at = population.floats("seen_continuous").unwrap()[0];
        assert!(time_step_at >= 0.0 && deaths_at >= 0.0 && continuous_at >= 0.0);
        assert!(time_step_at < deaths_at);
        assert!(deaths_at < continuous_at);
    }

    // Three listeners on one label at priorities (5, 10, 1).
    struct Prioritized;

    impl SimulationModule for Prioritized {
        fn name(&self) -> &str {
            "prioritized"
        }

        fn setup(&mut self, registration: &mut ModuleRegistration) {
            registration.register_listener(TIME_STEP, 5, 0);
            registration.register_listener(TIME_STEP, 10, 1);
            registration.register_listener(TIME_STEP, 1, 2);
        }

        fn contribute_columns(
            &self,
            source: &PopulationSource,
            _rng: &mut dyn RngCore,
        ) -> Result<Vec<(String, Column)>> {
            let n = source.len();
            Ok(vec![
                ("call_counter".to_string(), Column::Float(vec![0.0; n])),
                ("at_priority_5".to_string(), Column::Float(vec![-1.0; n])),
                ("at_priority_10".to_string(), Column::Float(vec![-1.0; n])),
                ("at_priority_1".to_string(), Column::Float(vec![-1.0; n])),
            ])
        }

        fn on_listener(
            &self,
            listener: u32,
            _event: &Event,
            ctx: &mut EventContext<'_>,
        ) -> Result<()> {
            let column = match listener {
                0 => "at_priority_5",
                1 => "at_priority_10",
                _ => "at_priority_1",
            };
            let count = ctx.population().floats("call_counter")?[0];
            ctx.population_mut().floats_mut(column)?[0] = count;
            ctx.population_mut().floats_mut("call_counter")?[0] = count + 1.0;
            Ok(())
        }
    }

    #[test]
    fn test_listener_priority_dispatch_order() {
        let mut sim = simulation(0.0, 1);
        sim.register_module(Box::new(Prioritized));
        sim.load_data().unwrap();
        sim.load_population(&PopulationSource::uniform_cohort(5, 30.0))
            .unwrap();
        let start = datetime(1990, 1, 1);
        sim.run(start, start, Duration::days(365)).unwrap();

        let population = sim.population();
        let p1 = population.floats("at_priority_1").unwrap()[0];
        let p5 = population.floats("at_priority_5").unwrap()[0];
        let p10 = population.floats("at_priority_10").unwrap()[0];
        assert!(p1 < p5 && p5 < p10);
    }

    // Modules used to probe column contribution failures.
    struct DuplicateColumn;

    impl SimulationModule for DuplicateColumn {
        fn name(&self) -> &str {
            "duplicate"
        }

        fn contribute_columns(
            &self,
            source: &PopulationSource,
            _rng: &mut dyn RngCore,
        ) -> Result<Vec<(String, Column)>> {
            Ok(vec![(
                AGE.to_string(),
                Column::Int(vec![0; source.len()]),
            )])
        }
    }

    struct ShortColumn;

    impl SimulationModule for ShortColumn {
        fn name(&self) -> &str {
            "short"
        }

        fn contribute_columns(
            &self,
            _source: &PopulationSource,
            _rng: &mut dyn RngCore,
        ) -> Result<Vec<(String, Column)>> {
            Ok(vec![("stub".to_string(), Column::Bool(vec![true]))])
        }
    }

    #[test]
    fn test_duplicate_column_contribution_fails() {
        let mut sim = simulation(0.0, 0);
        sim.register_module(Box::new(DuplicateColumn));
        let err = sim
            .load_population(&PopulationSource::uniform_cohort(10, 40.0))
            .unwrap_err();
        assert!(matches!(err, Error::Schema(name) if name == AGE));
    }

    #[test]
    fn test_wrong_length_contribution_fails() {
        let mut sim = simulation(0.0, 0);
        sim.register_module(Box::new(ShortColumn));
        let err = sim
            .load_population(&PopulationSource::uniform_cohort(10, 40.0))
            .unwrap_err();
        assert!(matches!(err, Error::Size { .. }));
    }
}
