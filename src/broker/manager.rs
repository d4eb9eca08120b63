//! Broker core: existence registry, node directory, and node lifecycle
//!
//! The broker is an explicitly constructed value with no ambient global
//! state; firmware passes a reference to it through every control-path
//! call, which keeps it trivially unit-testable. The directory and the
//! existence registry live under one lock and move in lockstep: the bit
//! for a (topic, instance) pair is set exactly while its node is in the
//! directory. The hot publish/copy paths never take this lock.

use std::sync::{
    atomic::Ordering,
    Arc, RwLock,
};

use log::{debug, warn};

use crate::{
    config,
    descriptor::TopicDescriptor,
    error::{KestrelError, Result},
    node::{Generation, TopicNode},
    registry::ExistenceRegistry,
};

use super::{
    handles::{Advertisement, Subscription},
    stats::BrokerStats,
};

/// Registry and node list, kept consistent under one lock
#[derive(Debug)]
struct Directory {
    registry: ExistenceRegistry,
    nodes: Vec<Arc<TopicNode>>,
}

impl Directory {
    /// Find the live node for (topic, instance).
    ///
    /// The registry bit is the fast reject: absent topics short-circuit
    /// without a scan. A set bit with no matching node is a broker defect.
    fn find(&self, meta: &'static TopicDescriptor, instance: u8) -> Option<Arc<TopicNode>> {
        if !self.registry.exists(meta.id, instance) {
            return None;
        }

        let node = self
            .nodes
            .iter()
            .find(|node| node.descriptor().name == meta.name && node.instance() == instance)
            .cloned();
        debug_assert!(
            node.is_some(),
            "existence registry and node directory disagree for {}:{}",
            meta.name,
            instance
        );
        node
    }
}

/// The intra-process topic broker
///
/// Owns the set of all live topic nodes and hands out [`Advertisement`]
/// and [`Subscription`] handles. Producers and consumers keep working on
/// their handles without the broker once attached; the broker is only
/// involved again to tear handles down.
#[derive(Debug)]
pub struct Broker {
    dir: RwLock<Directory>,
    stats: BrokerStats,
}

impl Broker {
    /// Create a broker for a topic table of `topic_count` topics
    ///
    /// Each topic may have up to [`config::MAX_INSTANCES`] instances.
    pub fn new(topic_count: usize) -> Self {
        Self {
            dir: RwLock::new(Directory {
                registry: ExistenceRegistry::new(topic_count, config::MAX_INSTANCES),
                nodes: Vec::new(),
            }),
            stats: BrokerStats::new(),
        }
    }

    /// Number of topics in the table this broker covers
    pub fn topic_count(&self) -> usize {
        self.dir.read().unwrap().registry.topic_count()
    }

    /// Number of live nodes, tombstoned nodes included
    pub fn node_count(&self) -> usize {
        self.dir.read().unwrap().nodes.len()
    }

    /// Global broker statistics
    pub fn stats(&self) -> &BrokerStats {
        &self.stats
    }

    /// Advertise the default instance of a topic.
    ///
    /// Creates the instance-0 node if absent; if it already exists the
    /// existing node is returned untouched (double advertise is an
    /// idempotent no-op that never resets the ring or queue depth). The
    /// requested depth is rounded up to a power of two and only applies
    /// on creation. If `initial` is given it is published immediately;
    /// an allocation failure there leaves the node valid and inert and
    /// is retried on the next publish.
    pub fn advertise(
        &self,
        meta: &'static TopicDescriptor,
        initial: Option<&[u8]>,
        queue_size: usize,
    ) -> Result<Advertisement> {
        self.advertise_inner(meta, initial, queue_size, false)
    }

    /// Advertise a new instance of a multi-instance topic.
    ///
    /// Scans instances upward and claims the first free or
    /// not-yet-advertised slot; fails with `InstanceExhausted` when every
    /// instance is already advertised. The claimed instance index is
    /// available on the returned handle.
    pub fn advertise_multi(
        &self,
        meta: &'static TopicDescriptor,
        initial: Option<&[u8]>,
        queue_size: usize,
    ) -> Result<Advertisement> {
        self.advertise_inner(meta, initial, queue_size, true)
    }

    fn advertise_inner(
        &self,
        meta: &'static TopicDescriptor,
        initial: Option<&[u8]>,
        queue_size: usize,
        multi: bool,
    ) -> Result<Advertisement> {
        if let Some(payload) = initial {
            if payload.len() != meta.size {
                return Err(KestrelError::invalid_parameter(
                    "initial",
                    format!(
                        "payload length {} does not match '{}' descriptor size {}",
                        payload.len(),
                        meta.name,
                        meta.size
                    ),
                ));
            }
        }

        let node = {
            let mut dir = self.dir.write().unwrap();
            self.validate_descriptor(&dir, meta)?;

            let max_instances = if multi { dir.registry.max_instances() } else { 1 };
            let mut selected = None;
            for instance in 0..max_instances as u8 {
                match dir.find(meta, instance) {
                    Some(node) => {
                        // In multi mode an advertised instance belongs to
                        // another producer; keep scanning.
                        if !multi || !node.is_advertised() {
                            selected = Some(node);
                            break;
                        }
                    }
                    None => {
                        selected = Some(self.create_node(&mut dir, meta, instance, queue_size));
                        break;
                    }
                }
            }

            let node = selected.ok_or_else(|| {
                KestrelError::instance_exhausted(meta.name, dir.registry.max_instances())
            })?;
            node.mark_advertised();
            node
        };

        self.stats.advertisements.fetch_add(1, Ordering::Relaxed);

        if let Some(payload) = initial {
            if let Err(e) = node.write(payload) {
                warn!(
                    "initial publish on {}:{} failed, will retry on next publish: {}",
                    meta.name,
                    node.instance(),
                    e
                );
            }
        }

        Ok(Advertisement::new(node))
    }

    /// Stop advertising a node.
    ///
    /// With no subscribers attached the node is destroyed outright. With
    /// subscribers attached it is tombstoned: kept alive and readable for
    /// the handles that already reference it, destroyed when the last one
    /// detaches.
    pub fn unadvertise(&self, advertisement: Advertisement) {
        let node = advertisement.into_node();
        node.mark_unadvertised();
        self.try_destroy(&node);
    }

    /// Subscribe to the default instance of a topic
    pub fn subscribe(&self, meta: &'static TopicDescriptor) -> Result<Subscription> {
        self.subscribe_multi(meta, 0)
    }

    /// Subscribe to a specific instance of a topic.
    ///
    /// Subscribing to a topic that has not been advertised yet is valid:
    /// the handle attaches lazily on the first copy/update call after the
    /// node appears.
    pub fn subscribe_multi(
        &self,
        meta: &'static TopicDescriptor,
        instance: u8,
    ) -> Result<Subscription> {
        {
            let dir = self.dir.read().unwrap();
            self.validate_descriptor(&dir, meta)?;
            if instance as usize >= dir.registry.max_instances() {
                return Err(KestrelError::invalid_parameter(
                    "instance",
                    format!(
                        "instance {} out of range, '{}' allows at most {}",
                        instance,
                        meta.name,
                        dir.registry.max_instances()
                    ),
                ));
            }
        }

        let mut subscription = Subscription::new(meta, instance);
        subscription.attach(self);
        self.stats.subscriptions.fetch_add(1, Ordering::Relaxed);
        Ok(subscription)
    }

    /// Detach a subscription from its node.
    ///
    /// If the node is tombstoned and this was its last subscriber, the
    /// node is destroyed.
    pub fn unsubscribe(&self, subscription: Subscription) {
        if let Some(node) = subscription.into_node() {
            self.detach_subscriber(&node);
        }
    }

    /// Whether (topic, instance) exists and is currently advertised
    ///
    /// Tombstoned and merely-subscribed nodes report `false`; only an
    /// advertised node can be published and copied meaningfully.
    pub fn exists(&self, meta: &'static TopicDescriptor, instance: u8) -> bool {
        self.find_node(meta, instance)
            .map(|node| node.is_advertised())
            .unwrap_or(false)
    }

    /// Number of advertised instances of a topic
    ///
    /// Instance indices are dense from 0, so this counts upward until the
    /// first gap.
    pub fn instance_count(&self, meta: &'static TopicDescriptor) -> usize {
        let max_instances = self.dir.read().unwrap().registry.max_instances();
        (0..max_instances as u8)
            .take_while(|instance| self.exists(meta, *instance))
            .count()
    }

    /// Look up the live node for (topic, instance)
    pub fn find_node(
        &self,
        meta: &'static TopicDescriptor,
        instance: u8,
    ) -> Option<Arc<TopicNode>> {
        self.dir.read().unwrap().find(meta, instance)
    }

    /// Attach a subscriber to an existing node, returning the node and the
    /// subscriber's initial generation. The refcount moves under the
    /// directory lock so a racing destroy cannot miss it.
    pub(crate) fn attach_subscriber(
        &self,
        meta: &'static TopicDescriptor,
        instance: u8,
    ) -> Option<(Arc<TopicNode>, Generation)> {
        let dir = self.dir.read().unwrap();
        let node = dir.find(meta, instance)?;
        let initial_generation = node.add_subscriber();
        if node.subscriber_count() > config::SUBSCRIBER_WARN_THRESHOLD {
            warn!(
                "'{}' has {} subscribers, stale handles may not have been released",
                meta.name,
                node.subscriber_count()
            );
        }
        Some((node, initial_generation))
    }

    pub(crate) fn detach_subscriber(&self, node: &Arc<TopicNode>) {
        node.remove_subscriber();
        if !node.is_advertised() && node.subscriber_count() == 0 {
            self.try_destroy(node);
        }
    }

    fn validate_descriptor(&self, dir: &Directory, meta: &'static TopicDescriptor) -> Result<()> {
        if !dir.registry.in_bounds(meta.id, 0) {
            return Err(KestrelError::invalid_descriptor(format!(
                "topic '{}' (id {}) is outside the broker's table of {} topics",
                meta.name,
                meta.id,
                dir.registry.topic_count()
            )));
        }
        if meta.size == 0 {
            return Err(KestrelError::invalid_descriptor(format!(
                "topic '{}' has zero payload size",
                meta.name
            )));
        }
        Ok(())
    }

    fn create_node(
        &self,
        dir: &mut Directory,
        meta: &'static TopicDescriptor,
        instance: u8,
        queue_size: usize,
    ) -> Arc<TopicNode> {
        let node = Arc::new(TopicNode::new(meta, instance, queue_size));
        dir.registry.mark(meta.id, instance);
        dir.nodes.push(node.clone());
        self.stats.nodes_created.fetch_add(1, Ordering::Relaxed);
        debug!(
            "created node {}:{} (depth {})",
            meta.name,
            instance,
            node.queue_size()
        );
        node
    }

    /// Destroy a node if (and only if) it is unadvertised with no
    /// subscribers. Racing attaches are re-checked under the directory
    /// lock, so a node is never destroyed out from under a new reader.
    fn try_destroy(&self, node: &Arc<TopicNode>) {
        let mut dir = self.dir.write().unwrap();
        if node.is_advertised() || node.subscriber_count() > 0 {
            return;
        }

        let position = dir.nodes.iter().position(|n| Arc::ptr_eq(n, node));
        let Some(position) = position else {
            // A racing detach already destroyed it.
            return;
        };

        let meta = node.descriptor();
        assert!(
            dir.registry.exists(meta.id, node.instance()),
            "existence registry and node directory disagree for {}:{}",
            meta.name,
            node.instance()
        );

        dir.nodes.swap_remove(position);
        dir.registry.clear(meta.id, node.instance());
        node.release();
        self.stats.nodes_destroyed.fetch_add(1, Ordering::Relaxed);
        debug!("destroyed node {}:{}", meta.name, node.instance());
    }
}
