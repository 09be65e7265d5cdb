//! Typed event bus primitives
//!
//! Every module owns a `ListenerSet`: listeners keyed by event label plus
//! label-less generic listeners that fire for every label. Listeners are
//! registered explicitly at `setup` time and identified by a module-chosen
//! id; dispatch hands the id back to the owning module. There is no
//! reflection and no global listener table; generic listeners are scoped
//! to their module.

use crate::population::Mask;

pub type EventLabel = &'static str;

/// Module-chosen token identifying one of its listeners.
pub type ListenerId = u32;

pub const TIME_STEP: EventLabel = "time_step";
pub const TIME_STEP_CONTINUOUS: EventLabel = "time_step__continuous";
pub const DEATHS: EventLabel = "deaths";
pub const GENERAL_HEALTHCARE_ACCESS: EventLabel = "general_healthcare_access";
pub const FOLLOWUP_HEALTHCARE_ACCESS: EventLabel = "followup_healthcare_access";

/// Lower priorities fire first; listeners registered without an explicit
/// priority get this one.
pub const DEFAULT_PRIORITY: u8 = 10;

/// An event in flight: a label and the affected rows. Each listener gets
/// its own copy of the mask, so callee-local narrowing never leaks to
/// peers.
#[derive(Debug, Clone)]
pub struct Event {
    pub label: EventLabel,
    pub mask: Mask,
}

#[derive(Debug, Clone, Copy)]
struct ListenerEntry {
    label: Option<EventLabel>,
    priority: u8,
    listener: ListenerId,
    living_only: bool,
}

/// One module's listener registrations.
#[derive(Debug, Clone, Default)]
pub struct ListenerSet {
    entries: Vec<ListenerEntry>,
}

impl ListenerSet {
    pub(crate) fn register(
        &mut self,
        label: Option<EventLabel>,
        priority: u8,
        listener: ListenerId,
        living_only: bool,
    ) {
        self.entries.push(ListenerEntry {
            label,
            priority,
            listener,
            living_only,
        });
    }

    /// Listeners to invoke for `label`: label matches plus generic, sorted
    /// by priority ascending. The sort is stable, so listeners with equal
    /// priority fire in registration order.
    pub fn matching(&self, label: EventLabel) -> Vec<(ListenerId, bool)> {
        let mut hits: Vec<ListenerEntry> = self
            .entries
            .iter()
            .filter(|e| e.label.is_none() || e.label == Some(label))
            .copied()
            .collect();
        hits.sort_by_key(|e| e.priority);
        hits.into_iter().map(|e| (e.listener, e.living_only)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
