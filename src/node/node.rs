//! Per-(topic, instance) data-plane node
//!
//! A node owns the payload ring, the wrapping generation counter, and the
//! advertised / data-valid flags for one instance of one topic. The hot
//! publish and copy paths touch only this object; the directory and
//! existence registry are consulted exclusively on the cold
//! advertise/subscribe paths.
//!
//! Writes and reads each run under one short critical section
//! (allocate-if-absent, bump generation, copy payload on the write side;
//! read generation, clamp, copy slot on the read side) so a reader can
//! never observe a partially written slot.

use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Arc, Mutex,
};

use crate::{
    config,
    descriptor::TopicDescriptor,
    error::{KestrelError, Result},
    notify::{HookSet, PublishHook},
};

use super::generation::{is_in_range, round_up_queue_size, Generation};

/// State mutated under the node's data lock
#[derive(Debug)]
struct NodeInner {
    /// Payload ring, `queue_size * meta.size` bytes, allocated on first publish
    data: Option<Box<[u8]>>,
    /// Ring depth in slots, a power of two; fixed once `data` is allocated
    queue_size: usize,
    /// Whether at least one publish has completed
    data_valid: bool,
}

/// The per-(topic, instance) data-plane object
#[derive(Debug)]
pub struct TopicNode {
    /// Borrowed descriptor from the firmware's static topic table
    meta: &'static TopicDescriptor,
    /// Instance index in `[0, MAX_INSTANCES)`
    instance: u8,
    /// Publish counter; wraps as an unsigned value
    generation: AtomicU32,
    /// Set on advertise, cleared on unadvertise (tombstone)
    advertised: AtomicBool,
    /// Live subscription handles attached to this node
    subscriber_count: AtomicU32,
    /// Ring and flags, guarded by the data lock
    inner: Mutex<NodeInner>,
    /// External on-publish notification hooks
    hooks: HookSet,
}

impl TopicNode {
    /// Create a node with the requested queue depth (rounded up to a power
    /// of two, saturating at the cap). The payload ring is not allocated
    /// until the first publish.
    pub(crate) fn new(meta: &'static TopicDescriptor, instance: u8, queue_size: usize) -> Self {
        Self {
            meta,
            instance,
            generation: AtomicU32::new(0),
            advertised: AtomicBool::new(false),
            subscriber_count: AtomicU32::new(0),
            inner: Mutex::new(NodeInner {
                data: None,
                queue_size: round_up_queue_size(queue_size),
                data_valid: false,
            }),
            hooks: HookSet::new(),
        }
    }

    /// Descriptor this node publishes under
    pub fn descriptor(&self) -> &'static TopicDescriptor {
        self.meta
    }

    /// Instance index of this node
    pub fn instance(&self) -> u8 {
        self.instance
    }

    /// Current queue depth in slots
    pub fn queue_size(&self) -> usize {
        self.inner.lock().unwrap().queue_size
    }

    /// Current generation (total publishes, modulo wrap)
    pub fn generation(&self) -> Generation {
        self.generation.load(Ordering::Acquire)
    }

    /// Whether a producer currently advertises this node
    pub fn is_advertised(&self) -> bool {
        self.advertised.load(Ordering::Acquire)
    }

    pub(crate) fn mark_advertised(&self) {
        self.advertised.store(true, Ordering::Release);
    }

    pub(crate) fn mark_unadvertised(&self) {
        self.advertised.store(false, Ordering::Release);
    }

    /// Number of attached subscriptions
    pub fn subscriber_count(&self) -> u32 {
        self.subscriber_count.load(Ordering::Acquire)
    }

    /// Whether at least one publish has completed on this node
    pub fn has_published(&self) -> bool {
        self.inner.lock().unwrap().data_valid
    }

    /// Attach a subscriber and return its initial generation.
    ///
    /// The initial generation is one behind the current one when data has
    /// been published, so the subscriber's first copy yields the newest
    /// value instead of reporting "nothing new".
    pub(crate) fn add_subscriber(&self) -> Generation {
        let inner = self.inner.lock().unwrap();
        self.subscriber_count.fetch_add(1, Ordering::AcqRel);
        let current = self.generation.load(Ordering::Acquire);
        if inner.data_valid {
            current.wrapping_sub(1)
        } else {
            current
        }
    }

    pub(crate) fn remove_subscriber(&self) {
        self.subscriber_count.fetch_sub(1, Ordering::AcqRel);
    }

    /// Register an external on-publish hook
    pub fn register_hook(&self, hook: Arc<dyn PublishHook>) {
        self.hooks.register(hook);
    }

    /// Unregister a previously registered hook
    pub fn unregister_hook(&self, hook: &Arc<dyn PublishHook>) {
        self.hooks.unregister(hook);
    }

    /// Change the queue depth before the payload ring exists.
    ///
    /// Requests equal to the current depth succeed as no-ops. Once the ring
    /// has been allocated the depth is fixed and any change is rejected, as
    /// are shrinking below the current depth and requests above the cap.
    pub fn set_queue_size(&self, queue_size: usize) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.queue_size == queue_size {
            return Ok(());
        }
        if inner.data.is_some() {
            return Err(KestrelError::queue_resize(
                "payload ring already allocated, depth is fixed",
            ));
        }
        if queue_size < inner.queue_size {
            return Err(KestrelError::queue_resize(format!(
                "cannot shrink depth from {} to {}",
                inner.queue_size, queue_size
            )));
        }
        if queue_size > config::MAX_QUEUE_SIZE {
            return Err(KestrelError::queue_resize(format!(
                "requested depth {} exceeds the cap of {}",
                queue_size,
                config::MAX_QUEUE_SIZE
            )));
        }
        inner.queue_size = round_up_queue_size(queue_size);
        Ok(())
    }

    /// Publish one payload into the ring, returning the bytes written.
    ///
    /// The first call allocates the ring; if that allocation fails the node
    /// is left unchanged and the next publish retries it. The generation
    /// bump and the slot copy happen inside one critical section, so
    /// readers always see a generation together with the payload that
    /// produced it.
    pub fn write(&self, payload: &[u8]) -> Result<usize> {
        let size = self.meta.size;
        if payload.len() != size {
            return Err(KestrelError::invalid_parameter(
                "payload",
                format!(
                    "payload length {} does not match '{}' descriptor size {}",
                    payload.len(),
                    self.meta.name,
                    size
                ),
            ));
        }

        let produced;
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.data.is_none() {
                let bytes = size * inner.queue_size;
                inner.data = Some(allocate_ring(bytes)?);
            }
            let depth = inner.queue_size;
            // wrap-around happens after ~49 days at a 1 kHz publish rate
            let generation = self.generation.fetch_add(1, Ordering::AcqRel);
            produced = generation.wrapping_add(1);
            let offset = size * (generation as usize % depth);
            let ring = inner.data.as_mut().expect("ring allocated above");
            ring[offset..offset + size].copy_from_slice(payload);
            inner.data_valid = true;
        }

        // Hooks run outside the data lock; the write is already complete.
        self.hooks.notify(self.meta, self.instance, produced);

        Ok(size)
    }

    /// Copy the best available payload for a reader at `generation`.
    ///
    /// Returns 0 if nothing has ever been published. Otherwise the call
    /// always succeeds: a reader that already has the newest value is
    /// backed up one step and re-delivered the previous payload, and a
    /// reader that fell more than a full ring behind is clamped to the
    /// oldest generation still physically present. `generation` is
    /// advanced so the next call naturally asks for the following value;
    /// loss is visible only through the gap it skips.
    pub fn read(&self, dst: &mut [u8], generation: &mut Generation) -> Result<usize> {
        let size = self.meta.size;
        if dst.len() < size {
            return Err(KestrelError::invalid_parameter(
                "dst",
                format!(
                    "destination length {} is smaller than '{}' descriptor size {}",
                    dst.len(),
                    self.meta.name,
                    size
                ),
            ));
        }

        let inner = self.inner.lock().unwrap();
        let ring = match inner.data.as_ref() {
            Some(ring) => ring,
            None => return Ok(0),
        };

        if inner.queue_size == 1 {
            dst[..size].copy_from_slice(&ring[..size]);
            *generation = self.generation.load(Ordering::Acquire);
            return Ok(size);
        }

        let depth = inner.queue_size as Generation;
        let current = self.generation.load(Ordering::Acquire);

        if current == *generation {
            // Reader already has the latest value and nothing newer was
            // published; re-deliver the previous payload.
            *generation = generation.wrapping_sub(1);
        }

        if !is_in_range(
            current.wrapping_sub(depth),
            *generation,
            current.wrapping_sub(1),
        ) {
            // Reader fell behind by more than the ring holds; clamp to the
            // oldest generation still present.
            *generation = current.wrapping_sub(depth);
        }

        let offset = size * (*generation as usize % inner.queue_size);
        dst[..size].copy_from_slice(&ring[offset..offset + size]);
        *generation = generation.wrapping_add(1);

        Ok(size)
    }

    /// Publishes a reader at `last_generation` has not yet consumed
    ///
    /// Reports 0 for unadvertised (tombstoned) nodes, matching the
    /// advertised-driven existence queries.
    pub fn updates_available(&self, last_generation: Generation) -> u32 {
        if self.advertised.load(Ordering::Acquire) {
            self.generation
                .load(Ordering::Acquire)
                .wrapping_sub(last_generation)
        } else {
            0
        }
    }

    /// Release the payload ring on destruction
    pub(crate) fn release(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.data = None;
        inner.data_valid = false;
    }

    /// Override the depth without rounding or cap, bypassing the checks
    /// publishers go through; lets tests drive the ring allocation into
    /// failure.
    #[cfg(test)]
    pub(crate) fn set_raw_queue_size(&self, queue_size: usize) {
        self.inner.lock().unwrap().queue_size = queue_size;
    }

    /// Park the generation counter at an arbitrary value, so tests can
    /// start a node just below the wrap point.
    #[cfg(test)]
    pub(crate) fn set_raw_generation(&self, generation: Generation) {
        self.generation.store(generation, Ordering::Release);
    }
}

fn allocate_ring(bytes: usize) -> Result<Box<[u8]>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(bytes)
        .map_err(|_| KestrelError::allocation(bytes))?;
    buf.resize(bytes, 0);
    Ok(buf.into_boxed_slice())
}
