//! The module contract
//!
//! A module is one capability set: declared dependencies, contributed
//! population columns, listener registrations, and optional contributions
//! to the mortality and incidence rate pipelines. All per-run mutable
//! state lives in the population table or the driver's accumulators, so
//! listener dispatch and rate composition only ever need shared access to
//! the modules themselves.

use rand::RngCore;

use crate::config::SimulationConfig;
use crate::error::Result;
use crate::population::{Column, Mask, PopulationSource, PopulationTable};

use super::events::{Event, EventLabel, ListenerId, ListenerSet};
use super::pipeline::{MutatorKind, RateFrame};
use super::simulation::EventContext;

pub trait SimulationModule: Send {
    /// Stable identity used for dependency declarations and registry
    /// replacement.
    fn name(&self) -> &str;

    /// Names of modules that must be ordered before this one.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Register listeners, rate mutators, and mediation factors. Called
    /// once, at registration.
    fn setup(&mut self, registration: &mut ModuleRegistration) {
        let _ = registration;
    }

    /// Columns this module contributes at population load, with initial
    /// values. Draws taken from `rng` must be made in ascending row order.
    fn contribute_columns(
        &self,
        source: &PopulationSource,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<(String, Column)>> {
        let _ = (source, rng);
        Ok(Vec::new())
    }

    /// Build internal reference tables. The kernel treats their content as
    /// opaque.
    fn load_data(&mut self, config: &SimulationConfig) -> Result<()> {
        let _ = config;
        Ok(())
    }

    /// Handle one of this module's registered listeners.
    fn on_listener(
        &self,
        listener: ListenerId,
        event: &Event,
        ctx: &mut EventContext<'_>,
    ) -> Result<()> {
        let _ = (listener, event, ctx);
        Ok(())
    }

    /// Fold this module's contribution into the mortality rate frame.
    /// Invoked only when a mortality mutator was registered.
    fn mortality_contribution(
        &self,
        population: &PopulationTable,
        frame: &mut RateFrame,
    ) -> Result<()> {
        let _ = (population, frame);
        Ok(())
    }

    /// Fold this module's contribution into an incidence rate frame.
    /// Invoked only for causes it registered a mutator for.
    fn incidence_contribution(
        &self,
        population: &PopulationTable,
        cause: &str,
        frame: &mut RateFrame,
    ) -> Result<()> {
        let _ = (population, cause, frame);
        Ok(())
    }

    /// Years lived with disability accrued by the living subset over the
    /// current year. Must be non-negative.
    fn yld_contribution(&self, population: &PopulationTable, alive: &Mask) -> f64 {
        let _ = (population, alive);
        0.0
    }

    /// Clear per-run internal state between runs.
    fn reset(&mut self) {}
}

/// Registration surface handed to `setup`. Collects the module's listener
/// set and its pipeline registrations.
#[derive(Debug, Default)]
pub struct ModuleRegistration {
    pub(crate) listeners: ListenerSet,
    pub(crate) mortality_mutator: bool,
    pub(crate) incidence_mutators: Vec<(String, MutatorKind)>,
    pub(crate) mediation_factors: Vec<(String, f64)>,
}

impl ModuleRegistration {
    pub fn register_listener(&mut self, label: EventLabel, priority: u8, listener: ListenerId) {
        self.listeners.register(Some(label), priority, listener, false);
    }

    /// Like `register_listener`, but the bus conjuncts the event mask with
    /// the `alive` column before invoking the listener.
    pub fn register_living_listener(
        &mut self,
        label: EventLabel,
        priority: u8,
        listener: ListenerId,
    ) {
        self.listeners.register(Some(label), priority, listener, true);
    }

    /// A generic listener fires for every label emitted to this module.
    pub fn register_generic_listener(&mut self, priority: u8, listener: ListenerId) {
        self.listeners.register(None, priority, listener, false);
    }

    pub fn register_mortality_mutator(&mut self) {
        self.mortality_mutator = true;
    }

    pub fn register_incidence_mutator(&mut self, cause: &str, kind: MutatorKind) {
        self.incidence_mutators.push((cause.to_string(), kind));
    }

    /// Fraction of this module's effect on `cause` already routed through
    /// another module. Applied as a (1 - factor) damping after all rate
    /// contributions.
    pub fn register_mediation_factor(&mut self, cause: &str, factor: f64) {
        assert!(
            (0.0..=1.0).contains(&factor),
            "mediation factor for '{cause}' must be in [0, 1], got {factor}"
        );
        self.mediation_factors.push((cause.to_string(), factor));
    }
}
