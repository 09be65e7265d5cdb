//! Simulation kernel: module registry, event bus, rate pipeline, driver

pub mod events;
pub mod module;
pub mod pipeline;
pub mod registry;
pub mod simulation;

pub use events::{Event, EventLabel, ListenerId, ListenerSet, DEFAULT_PRIORITY};
pub use module::{ModuleRegistration, SimulationModule};
pub use pipeline::{MutatorKind, RateFrame};
pub use registry::ModuleRegistry;
pub use simulation::{Accumulators, EventContext, Metrics, Simulation};
