//! On-publish notification seam
//!
//! The broker itself never blocks or wakes anyone: "wait for the next
//! update" belongs to the surrounding scheduler/work-queue system. This
//! module is the interface that system plugs into. Hooks are invoked after
//! the payload write completes and outside the node's data lock, so a slow
//! or reentrant hook can never stall publishers or tear a read. Broker
//! correctness never depends on any hook being registered.

use std::fmt::Debug;
use std::sync::{Arc, RwLock};

use crate::descriptor::TopicDescriptor;
use crate::node::Generation;

/// Callback invoked after every successful publish on a node
///
/// Implementations must be cheap and non-blocking; a typical hook sets an
/// event flag or pushes a work item for a scheduler to act on.
pub trait PublishHook: Send + Sync + Debug {
    /// Called once per publish with the generation that publish produced
    fn on_publish(&self, meta: &'static TopicDescriptor, instance: u8, generation: Generation);
}

/// Per-node list of registered publish hooks
#[derive(Debug, Default)]
pub struct HookSet {
    hooks: RwLock<Vec<Arc<dyn PublishHook>>>,
}

impl HookSet {
    /// Create an empty hook set
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook; it will see every subsequent publish
    pub fn register(&self, hook: Arc<dyn PublishHook>) {
        self.hooks.write().unwrap().push(hook);
    }

    /// Unregister a previously registered hook
    pub fn unregister(&self, hook: &Arc<dyn PublishHook>) {
        self.hooks
            .write()
            .unwrap()
            .retain(|h| !Arc::ptr_eq(h, hook));
    }

    /// Number of registered hooks
    pub fn len(&self) -> usize {
        self.hooks.read().unwrap().len()
    }

    /// Whether no hooks are registered
    pub fn is_empty(&self) -> bool {
        self.hooks.read().unwrap().is_empty()
    }

    /// Invoke every registered hook for one publish
    pub(crate) fn notify(
        &self,
        meta: &'static TopicDescriptor,
        instance: u8,
        generation: Generation,
    ) {
        let hooks = self.hooks.read().unwrap();
        for hook in hooks.iter() {
            hook.on_publish(meta, instance, generation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    use crate::define_topic;

    define_topic!(TEST_TOPIC, 0, "hook_test", 8);

    #[derive(Debug, Default)]
    struct CountingHook {
        calls: AtomicUsize,
        last_generation: AtomicU32,
    }

    impl PublishHook for CountingHook {
        fn on_publish(&self, _meta: &'static TopicDescriptor, _instance: u8, generation: u32) {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.last_generation.store(generation, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_register_and_notify() {
        let hooks = HookSet::new();
        assert!(hooks.is_empty());

        let counting = Arc::new(CountingHook::default());
        hooks.register(counting.clone());
        assert_eq!(hooks.len(), 1);

        hooks.notify(&TEST_TOPIC, 0, 1);
        hooks.notify(&TEST_TOPIC, 0, 2);
        assert_eq!(counting.calls.load(Ordering::Relaxed), 2);
        assert_eq!(counting.last_generation.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_unregister() {
        let hooks = HookSet::new();
        let counting = Arc::new(CountingHook::default());
        let as_dyn: Arc<dyn PublishHook> = counting.clone();

        hooks.register(as_dyn.clone());
        hooks.notify(&TEST_TOPIC, 0, 1);

        hooks.unregister(&as_dyn);
        assert!(hooks.is_empty());
        hooks.notify(&TEST_TOPIC, 0, 2);
        assert_eq!(counting.calls.load(Ordering::Relaxed), 1);
    }
}
