use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use greenlight_types::PipelineId;

use crate::error::{ConductorError, ConductorResult};

/// In-process lock table keyed by pipeline.
///
/// A stage that mutates a pipeline takes the lock first and holds it for
/// the whole mutation. Acquisition is fail-fast: a second caller gets
/// [`ConductorError::LockViolation`] instead of waiting. Abort requests
/// that arrive while a lock is held are parked here and picked up by the
/// holder at its next safe boundary.
#[derive(Default)]
pub struct LockRegistry {
    held: Mutex<HashSet<PipelineId>>,
    abort_requests: Mutex<HashMap<PipelineId, String>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for `id`, failing fast if another holder exists.
    pub fn acquire(&self, id: &PipelineId) -> ConductorResult<PipelineLock<'_>> {
        let mut held = self.held_set();
        if !held.insert(id.clone()) {
            return Err(ConductorError::LockViolation(id.clone()));
        }
        Ok(PipelineLock {
            registry: self,
            id: id.clone(),
        })
    }

    pub fn is_locked(&self, id: &PipelineId) -> bool {
        self.held_set().contains(id)
    }

    /// Park an abort request for a pipeline whose lock is currently held.
    /// A later request for the same pipeline replaces the parked reason.
    pub fn request_abort(&self, id: &PipelineId, reason: impl Into<String>) {
        self.abort_map().insert(id.clone(), reason.into());
    }

    /// Remove and return the parked abort reason, if any.
    pub fn take_abort_request(&self, id: &PipelineId) -> Option<String> {
        self.abort_map().remove(id)
    }

    pub fn abort_requested(&self, id: &PipelineId) -> bool {
        self.abort_map().contains_key(id)
    }

    // Critical sections are single set operations. Poisoning is recovered
    // rather than propagated.
    fn held_set(&self) -> MutexGuard<'_, HashSet<PipelineId>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn abort_map(&self) -> MutexGuard<'_, HashMap<PipelineId, String>> {
        self.abort_requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Scoped lock over a single pipeline, released on drop.
pub struct PipelineLock<'a> {
    registry: &'a LockRegistry,
    id: PipelineId,
}

impl PipelineLock<'_> {
    pub fn pipeline(&self) -> &PipelineId {
        &self.id
    }
}

impl Drop for PipelineLock<'_> {
    fn drop(&mut self) {
        self.registry.held_set().remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_is_exclusive_until_dropped() {
        let registry = LockRegistry::new();
        let id = PipelineId::new("p-1");

        let guard = registry.acquire(&id).unwrap();
        assert!(registry.is_locked(&id));
        assert!(matches!(
            registry.acquire(&id),
            Err(ConductorError::LockViolation(_))
        ));

        drop(guard);
        assert!(!registry.is_locked(&id));
        assert!(registry.acquire(&id).is_ok());
    }

    #[test]
    fn locks_are_per_pipeline() {
        let registry = LockRegistry::new();
        let _first = registry.acquire(&PipelineId::new("p-1")).unwrap();
        assert!(registry.acquire(&PipelineId::new("p-2")).is_ok());
    }

    #[test]
    fn abort_requests_are_taken_once() {
        let registry = LockRegistry::new();
        let id = PipelineId::new("p-1");

        assert!(!registry.abort_requested(&id));
        registry.request_abort(&id, "operator cancelled");
        registry.request_abort(&id, "budget exceeded");
        assert!(registry.abort_requested(&id));

        assert_eq!(
            registry.take_abort_request(&id).as_deref(),
            Some("budget exceeded")
        );
        assert_eq!(registry.take_abort_request(&id), None);
    }
}
