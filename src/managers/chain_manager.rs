// ChainManager: Ordered processing chain for local DSP
//
// Single Responsibility: Module descriptor bookkeeping and ordering

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::processing::ProcessingModule;

/// Manages the ordered list of processing modules
///
/// Single Responsibility: Chain ordering and identity
///
/// This manager handles:
/// - Appending modules in application order, assigning ids when absent
/// - Replacing a module in place when its id already exists
/// - Removing, toggling and clearing modules
/// - Handing out snapshots for the local processor and the FFI layer
///
/// Writes are serialized behind one lock; `list()` always observes a
/// complete chain.
///
/// # Example
/// ```ignore
/// let chain = ChainManager::new();
/// let eq = chain.add(ProcessingModule::new(ModuleKind::Equalizer));
/// chain.remove(&eq);
/// ```
pub struct ChainManager {
    modules: Mutex<Vec<ProcessingModule>>,
    next_id: AtomicU64,
}

impl ChainManager {
    pub fn new() -> Self {
        Self {
            modules: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    fn lock_modules(&self) -> MutexGuard<'_, Vec<ProcessingModule>> {
        self.modules.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn generate_id(&self, modules: &[ProcessingModule]) -> String {
        loop {
            let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
            let candidate = format!("module-{}", n);
            if !modules.iter().any(|module| module.id == candidate) {
                return candidate;
            }
        }
    }

    /// Append a module to the end of the chain
    ///
    /// # Returns
    /// The module id (generated when the descriptor had none)
    ///
    /// A module whose id is already present replaces the existing entry and
    /// keeps its position.
    pub fn add(&self, mut module: ProcessingModule) -> String {
        let mut modules = self.lock_modules();

        if module.id.is_empty() {
            module.id = self.generate_id(&modules);
        }
        let id = module.id.clone();

        match modules.iter_mut().find(|existing| existing.id == id) {
            Some(existing) => {
                log::debug!("[ChainManager] Replacing module {} in place", id);
                *existing = module;
            }
            None => modules.push(module),
        }

        id
    }

    /// Remove a module; absent ids are ignored
    pub fn remove(&self, id: &str) {
        self.lock_modules().retain(|module| module.id != id);
    }

    /// Toggle a module without changing its position
    ///
    /// # Returns
    /// false when no module has this id
    pub fn set_enabled(&self, id: &str, enabled: bool) -> bool {
        match self.lock_modules().iter_mut().find(|module| module.id == id) {
            Some(module) => {
                module.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        self.lock_modules().clear();
    }

    /// Snapshot of the chain in application order
    pub fn list(&self) -> Vec<ProcessingModule> {
        self.lock_modules().clone()
    }

    pub fn len(&self) -> usize {
        self.lock_modules().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_modules().is_empty()
    }
}

impl Default for ChainManager {
    fn default() -> Self {
        Self::new()
    }
}
