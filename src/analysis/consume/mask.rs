//! Result of a liveness run.

use crate::analysis::graph::{OpId, ValueId};

/// Consume masks computed for every value slot of one function.
///
/// Masks are only meaningful for the graph state the analysis ran on; any
/// later mutation of the function invalidates them.
#[derive(Debug, Clone)]
pub struct ConsumeMasks {
    pub(crate) consume: Vec<u64>,
    pub(crate) reached: Vec<bool>,
    pub(crate) anchored: Vec<ValueId>,
    pub(crate) indirect_sources: Vec<OpId>,
    pub(crate) pushes: usize,
    pub(crate) rounds: usize,
    pub(crate) trace: Option<Vec<(ValueId, u64)>>,
}

impl ConsumeMasks {
    /// Returns the bits of `value` read by some definitely-executed use.
    ///
    /// Unknown handles report zero.
    #[must_use]
    pub fn mask(&self, value: ValueId) -> u64 {
        self.consume.get(value.index()).copied().unwrap_or(0)
    }

    /// Returns `true` if propagation reached `value` at all, even with a zero mask.
    #[must_use]
    pub fn is_reached(&self, value: ValueId) -> bool {
        self.reached.get(value.index()).copied().unwrap_or(false)
    }

    /// Returns `true` if `value` was reached but none of its bits are consumed.
    #[must_use]
    pub fn is_vacuous(&self, value: ValueId) -> bool {
        self.is_reached(value) && self.mask(value) == 0
    }

    /// Returns the load outputs kept alive by the volatile-load guard.
    #[must_use]
    pub fn anchored_loads(&self) -> &[ValueId] {
        &self.anchored
    }

    /// Returns the operations found to cause a live `Indirect` effect.
    #[must_use]
    pub fn indirect_sources(&self) -> &[OpId] {
        &self.indirect_sources
    }

    /// Returns how many times a value was placed on the worklist.
    #[must_use]
    pub const fn pushes(&self) -> usize {
        self.pushes
    }

    /// Returns the number of worklist fixpoints run (2 when the volatile-load
    /// guard anchored a load).
    #[must_use]
    pub const fn rounds(&self) -> usize {
        self.rounds
    }

    /// Returns every mask update in order, if tracing was requested.
    #[must_use]
    pub fn trace(&self) -> Option<&[(ValueId, u64)]> {
        self.trace.as_deref()
    }

    /// Iterates over `(value, mask)` for every reached value.
    pub fn iter(&self) -> impl Iterator<Item = (ValueId, u64)> + '_ {
        self.consume
            .iter()
            .zip(&self.reached)
            .enumerate()
            .filter(|(_, (_, &reached))| reached)
            .filter_map(|(index, (&mask, _))| {
                u32::try_from(index).ok().map(|i| (ValueId::new(i), mask))
            })
    }
}
