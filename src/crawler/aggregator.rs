//! Shared result store written by concurrent lookup tasks

use crate::crawler::client::GeocodeCandidate;
use crate::table::{AddressRecord, GeocodeRow, ResultSlot};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Preallocated result slots, one per input address, addressed by index
///
/// Every write happens under the mutex. A slot is written at most once; later
/// writes for the same index are ignored.
#[derive(Debug)]
pub struct ResultAggregator {
    slots: Mutex<Vec<ResultSlot>>,
}

impl ResultAggregator {
    /// Creates `len` unset slots
    pub fn new(len: usize) -> Self {
        Self {
            slots: Mutex::new(vec![ResultSlot::default(); len]),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ResultSlot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `candidate` in slot `index`
    ///
    /// An absent candidate leaves the slot unset.
    ///
    /// # Returns
    ///
    /// `true` if the slot was written by this call
    pub fn record(&self, index: usize, candidate: Option<&GeocodeCandidate>) -> bool {
        let Some(candidate) = candidate else {
            return false;
        };

        let mut slots = self.lock();
        match slots.get_mut(index) {
            Some(slot) if slot.is_set() => {
                tracing::warn!("Result slot {} already set, keeping first value", index);
                false
            }
            Some(slot) => {
                *slot = ResultSlot::resolved(candidate.latitude, candidate.longitude);
                true
            }
            None => {
                tracing::warn!("Result slot {} out of range ({} slots)", index, slots.len());
                false
            }
        }
    }

    /// Copy of the slot at `index`
    pub fn get(&self, index: usize) -> Option<ResultSlot> {
        self.lock().get(index).copied()
    }

    /// Number of slots holding coordinates
    pub fn resolved_count(&self) -> usize {
        self.lock().iter().filter(|slot| slot.is_set()).count()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Joins each record with its slot; call after every writer has finished
    pub fn rows(&self, records: &[AddressRecord]) -> Vec<GeocodeRow> {
        let slots = self.lock();
        records
            .iter()
            .map(|record| GeocodeRow {
                record: record.clone(),
                slot: slots.get(record.index).copied().unwrap_or_default(),
            })
            .collect()
    }
}
