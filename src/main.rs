//! Health Microsim demo
//!
//! Runs the opportunistic blood pressure screening experiment against its
//! counterfactual on a synthetic cohort and prints DALYs averted and cost
//! per DALY with confidence intervals.

use std::fs::File;
use std::io::Write;

use chrono::{Duration, NaiveDate, NaiveDateTime};

use health_microsim::experiment::ExperimentRunner;
use health_microsim::modules::blood_pressure::{HEART_ATTACK, HEMORRHAGIC_STROKE};
use health_microsim::modules::{
    BloodPressureModule, ChronicConditionModule, DemographicsModule, HealthcareAccessModule,
    OpportunisticScreeningModule,
};
use health_microsim::{PopulationSource, Sex, Simulation, SimulationConfig};

const POPULATION_SIZE: usize = 2_000;
const RUNS: usize = 10;

fn midnight(year: i32, month: u32, day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .expect("valid date")
        .and_hms_opt(0, 0, 0)
        .expect("valid time")
}

fn build_simulation(
    mut config: SimulationConfig,
    seed: u64,
    with_screening: bool,
) -> health_microsim::Result<Simulation> {
    config.run_configuration.random_seed = seed;
    let year_start = config.simulation_parameters.year_start;
    let year_end = config.simulation_parameters.year_end;

    let mut sim = Simulation::new(
        config,
        Box::new(DemographicsModule::with_default_tables(year_start, year_end)),
    );
    sim.register_module(Box::new(ChronicConditionModule::with_constant_rates(
        HEART_ATTACK,
        0.008,
        0.09,
        0.08,
        year_start,
        year_end,
    )));
    sim.register_module(Box::new(ChronicConditionModule::with_constant_rates(
        HEMORRHAGIC_STROKE,
        0.003,
        0.13,
        0.32,
        year_start,
        year_end,
    )));
    sim.register_module(Box::new(HealthcareAccessModule::new()));
    sim.register_module(Box::new(BloodPressureModule::with_default_tables(
        year_start, year_end,
    )));
    if with_screening {
        sim.register_module(Box::new(OpportunisticScreeningModule::new()));
    }
    sim.load_data()?;

    // Synthetic cohort: ages 25-75 cycling, sexes alternating.
    let ages: Vec<f64> = (0..POPULATION_SIZE).map(|i| 25.0 + (i % 51) as f64).collect();
    let sexes: Vec<Sex> = (0..POPULATION_SIZE)
        .map(|i| if i % 2 == 0 { Sex::Male } else { Sex::Female })
        .collect();
    sim.load_population(&PopulationSource::new(ages, sexes)?)?;
    Ok(sim)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    println!("Health Microsim v0.1.0");
    println!("======================\n");

    let config = SimulationConfig::default();
    let start = midnight(config.simulation_parameters.year_start, 1, 1);
    let end = midnight(config.simulation_parameters.year_end, 12, 31);
    let step = Duration::hours(732); // 30.5 days

    println!(
        "Population: {POPULATION_SIZE} simulants, {}-{}, monthly steps, {RUNS} paired runs\n",
        config.simulation_parameters.year_start, config.simulation_parameters.year_end
    );

    let runner = ExperimentRunner::new(start, end, step, |seed, with_screening| {
        build_simulation(config.clone(), seed, with_screening)
    });
    let summary = runner.run_comparisons(RUNS, 17)?;

    println!("Screening vs. counterfactual (95% CI):");
    println!(
        "  DALYs averted:  {:>10.1}  [{:.1}, {:.1}]",
        summary.dalys_averted.mean, summary.dalys_averted.lower, summary.dalys_averted.upper
    );
    println!(
        "  Added cost:     {:>10.0}  [{:.0}, {:.0}]",
        summary.intervention_cost.mean,
        summary.intervention_cost.lower,
        summary.intervention_cost.upper
    );
    println!(
        "  Cost per DALY:  {:>10.0}  [{:.0}, {:.0}]",
        summary.cost_per_daly.mean, summary.cost_per_daly.lower, summary.cost_per_daly.upper
    );

    // Per-year accounting of one intervention run.
    let mut sim = build_simulation(config.clone(), 17, true)?;
    sim.run(start, end, step)?;
    let accumulators = sim.accumulators();

    let csv_path = "metrics_output.csv";
    let mut file = File::create(csv_path)?;
    writeln!(file, "Year,YLLs,YLDs,Cost")?;
    for year in config.simulation_parameters.year_start..=config.simulation_parameters.year_end {
        let ylls = accumulators.yll_by_year.get(&year).copied().unwrap_or(0.0);
        let ylds = accumulators.yld_by_year.get(&year).copied().unwrap_or(0.0);
        let cost: f64 = accumulators
            .cost_by_year
            .iter()
            .filter(|((y, _), _)| *y == year)
            .map(|(_, c)| c)
            .sum();
        writeln!(file, "{year},{ylls:.2},{ylds:.2},{cost:.2}")?;
    }
    println!("\nPer-year metrics written to {csv_path}");

    let metrics = sim.metrics()?;
    println!(
        "Final intervention run: {} living, {:.0} DALYs, ${:.0} total cost",
        metrics.living, metrics.dalys, metrics.cost
    );
    Ok(())
}
