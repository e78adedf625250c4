//! Identity table of live VCCs, used to route signaling messages.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use atm_types::VccId;
use parking_lot::RwLock;

use super::entity::Vcc;

#[derive(Debug)]
pub struct VccTable {
    next_id: AtomicU64,
    entries: RwLock<HashMap<VccId, Weak<Vcc>>>,
}

impl Default for VccTable {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl VccTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn allocate_id(&self) -> VccId {
        VccId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn insert(&self, vcc: &Arc<Vcc>) {
        self.entries.write().insert(vcc.id(), Arc::downgrade(vcc));
    }

    pub(crate) fn remove(&self, id: VccId) {
        self.entries.write().remove(&id);
    }

    pub fn get(&self, id: VccId) -> Option<Arc<Vcc>> {
        self.entries.read().get(&id).and_then(Weak::upgrade)
    }

    /// All live VCCs.
    pub fn snapshot(&self) -> Vec<Arc<Vcc>> {
        self.entries.read().values().filter_map(Weak::upgrade).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
