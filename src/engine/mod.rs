//! # Apply Engines
//!
//! Implementations of [`ApplyEngine`](crate::domain::ApplyEngine), the
//! collaborator that creates each resource and reports back its computed
//! attributes.
//!
//! | Engine | Used by | Computed attributes |
//! |--------|---------|---------------------|
//! | [`PlanEngine`] | `stack plan` | none, every computed value stays deferred |
//! | [`SimulatedEngine`] | `stack apply` | rendered from schema templates |
//!
//! No engine talks to a real cloud provider.

mod simulated;

pub use simulated::SimulatedEngine;

use crate::domain::{ApplyEngine, ApplyError, ComputedAttributes, ResolvedNode};

/// Engine for dry runs: nothing is known until apply time
#[derive(Debug, Default)]
pub struct PlanEngine;

impl ApplyEngine for PlanEngine {
    fn apply(&mut self, _node: &ResolvedNode) -> Result<ComputedAttributes, ApplyError> {
        Ok(ComputedAttributes::new())
    }
}
