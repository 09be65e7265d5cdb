//! Rate composition pipeline
//!
//! Mortality and per-cause incidence rates are composed the same way: a
//! zero frame is folded through every registered mutator in module order,
//! then converted from annual to per-step rates. Incidence additionally
//! applies risk-factor adjustments and mediation damping:
//!
//!   additive contributions -> multiplicative adjustments -> x Π(1 - m)
//!   -> yearly-to-step conversion
//!
//! Frames hold 0 for rows outside the at-risk set.

use chrono::Duration;

use crate::error::Result;
use crate::population::PopulationTable;
use crate::rates;

use super::registry::ModuleEntry;

/// How a registered incidence mutator combines with the frame. Additive
/// mutators run first (base rates), multiplicative ones after (risk-factor
/// adjustments).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutatorKind {
    Additive,
    Multiplicative,
}

/// Per-row rates for one step, aligned to the population row index.
#[derive(Debug, Clone, PartialEq)]
pub struct RateFrame {
    values: Vec<f64>,
}

impl RateFrame {
    pub fn zeros(len: usize) -> Self {
        RateFrame {
            values: vec![0.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    fn scale(&mut self, factor: f64) {
        for v in &mut self.values {
            *v *= factor;
        }
    }

    fn to_step(&mut self, step: Duration) {
        for v in &mut self.values {
            *v = rates::from_yearly(*v, step);
        }
    }
}

/// Aggregate mortality rate for the current step.
pub(crate) fn mortality_rate_step(
    entries: &[ModuleEntry],
    order: &[usize],
    population: &PopulationTable,
    step: Duration,
) -> Result<RateFrame> {
    let mut frame = RateFrame::zeros(population.len());
    for &idx in order {
        let entry = &entries[idx];
        if entry.mortality_mutator {
            entry.module.mortality_contribution(population, &mut frame)?;
        }
    }
    frame.to_step(step);
    Ok(frame)
}

/// Aggregate incidence rate for `cause` for the current step.
pub(crate) fn incidence_rate_step(
    entries: &[ModuleEntry],
    order: &[usize],
    population: &PopulationTable,
    cause: &str,
    step: Duration,
) -> Result<RateFrame> {
    let mut frame = RateFrame::zeros(population.len());
    for kind in [MutatorKind::Additive, MutatorKind::Multiplicative] {
        for &idx in order {
            let entry = &entries[idx];
            let registered = entry
                .incidence_mutators
                .iter()
                .any(|(c, k)| c == cause && *k == kind);
            if registered {
                entry
                    .module
                    .incidence_contribution(population, cause, &mut frame)?;
            }
        }
    }

    let mut damping = 1.0;
    for &idx in order {
        for (c, factor) in &entries[idx].mediation_factors {
            if c == cause {
                damping *= 1.0 - factor;
            }
        }
    }
    if damping != 1.0 {
        frame.scale(damping);
    }

    frame.to_step(step);
    Ok(frame)
}
