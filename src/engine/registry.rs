//! Module registry and dependency ordering
//!
//! Modules declare dependencies by name; `ordered` returns a linear
//! extension of that relation. The base demographics module is privileged:
//! it occupies slot 0 and is always first, independent of declared edges.
//! Among unconstrained modules, registration order is preserved.

use std::collections::HashMap;

use log::debug;

use crate::error::{Error, Result};

use super::events::ListenerSet;
use super::module::{ModuleRegistration, SimulationModule};
use super::pipeline::MutatorKind;

/// A registered module together with everything it declared at setup.
pub struct ModuleEntry {
    pub(crate) module: Box<dyn SimulationModule>,
    pub(crate) listeners: ListenerSet,
    pub(crate) mortality_mutator: bool,
    pub(crate) incidence_mutators: Vec<(String, MutatorKind)>,
    pub(crate) mediation_factors: Vec<(String, f64)>,
}

impl ModuleEntry {
    pub(crate) fn new(
        mut module: Box<dyn SimulationModule>,
        mut registration: ModuleRegistration,
    ) -> Self {
        module.setup(&mut registration);
        ModuleEntry {
            module,
            listeners: registration.listeners,
            mortality_mutator: registration.mortality_mutator,
            incidence_mutators: registration.incidence_mutators,
            mediation_factors: registration.mediation_factors,
        }
    }

    pub fn module(&self) -> &dyn SimulationModule {
        self.module.as_ref()
    }
}

pub struct ModuleRegistry {
    /// `entries[0]` is the base module.
    entries: Vec<ModuleEntry>,
    order: Option<Vec<usize>>,
}

impl ModuleRegistry {
    pub(crate) fn new(base: ModuleEntry) -> Self {
        ModuleRegistry {
            entries: vec![base],
            order: None,
        }
    }

    /// Register a module. Re-registering an already-known name replaces
    /// the prior instance in place. Either way the cached order is
    /// invalidated.
    pub(crate) fn register(&mut self, entry: ModuleEntry) {
        let name = entry.module.name().to_string();
        match self.entries.iter().position(|e| e.module.name() == name) {
            Some(i) => {
                debug!("replacing module '{name}'");
                self.entries[i] = entry;
            }
            None => {
                debug!("registering module '{name}'");
                self.entries.push(entry);
            }
        }
        self.order = None;
    }

    /// Remove a module by name. The base module is never removed; returns
    /// whether anything was removed.
    pub(crate) fn deregister(&mut self, name: &str) -> bool {
        let position = self
            .entries
            .iter()
            .skip(1)
            .position(|e| e.module.name() == name);
        match position {
            Some(i) => {
                debug!("deregistering module '{name}'");
                self.entries.remove(i + 1);
                self.order = None;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.module.name() == name)
    }

    pub(crate) fn entries(&self) -> &[ModuleEntry] {
        &self.entries
    }

    pub(crate) fn entries_mut(&mut self) -> &mut [ModuleEntry] {
        &mut self.entries
    }

    /// Entry indices in dependency order, base first. Cached until the
    /// module set changes.
    pub fn ordered(&mut self) -> Result<&[usize]> {
        if self.order.is_none() {
            self.order = Some(self.compute_order()?);
        }
        Ok(self.order.as_deref().unwrap_or_default())
    }

    fn compute_order(&self) -> Result<Vec<usize>> {
        let index_by_name: HashMap<&str, usize> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.module.name(), i))
            .collect();

        let mut order = vec![0];
        let mut placed = vec![false; self.entries.len()];
        placed[0] = true;
        let mut remaining: Vec<usize> = (1..self.entries.len()).collect();

        while !remaining.is_empty() {
            let mut progressed = false;
            let mut i = 0;
            while i < remaining.len() {
                let idx = remaining[i];
                let mut ready = true;
                for dependency in self.entries[idx].module.dependencies() {
                    match index_by_name.get(dependency.as_str()) {
                        None => {
                            return Err(Error::UnresolvedDependency {
                                module: self.entries[idx].module.name().to_string(),
                                dependency,
                            });
                        }
                        Some(&dep) => {
                            if !placed[dep] {
                                ready = false;
                                break;
                            }
                        }
                    }
                }
                if ready {
                    placed[idx] = true;
                    order.push(idx);
                    remaining.remove(i);
                    progressed = true;
                } else {
                    i += 1;
                }
            }
            if !progressed {
                let name = self.entries[remaining[0]].module.name().to_string();
                return Err(Error::CyclicDependency(name));
            }
        }
        Ok(order)
    }
}
