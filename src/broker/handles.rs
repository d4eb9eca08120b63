//! Advertisement and Subscription handles
//!
//! Handles are owned by the calling task, never tracked centrally: a
//! subscription carries its own last-read generation, which keeps the hot
//! copy path free of any per-subscriber bookkeeping inside the node. Both
//! handle types hold an `Arc` to their node, so a node a handle points at
//! can never be freed underneath it, even after unadvertise.
//!
//! Handles are returned to the broker explicitly ([`Broker::unadvertise`] /
//! [`Broker::unsubscribe`]); dropping one without doing so keeps its node's
//! refcount claimed for the life of the process.

use std::sync::Arc;

use crate::{
    descriptor::TopicDescriptor,
    error::{KestrelError, Result},
    node::{Generation, TopicNode},
    notify::PublishHook,
};

use super::manager::Broker;

/// Producer handle for one advertised (topic, instance)
#[derive(Debug)]
pub struct Advertisement {
    node: Arc<TopicNode>,
}

impl Advertisement {
    pub(crate) fn new(node: Arc<TopicNode>) -> Self {
        Self { node }
    }

    /// Publish one payload; returns the bytes written
    ///
    /// Hot path: touches only the node, never the broker.
    pub fn publish(&self, payload: &[u8]) -> Result<usize> {
        self.node.write(payload)
    }

    /// Instance index this advertisement claimed
    pub fn instance(&self) -> u8 {
        self.node.instance()
    }

    /// Descriptor of the advertised topic
    pub fn descriptor(&self) -> &'static TopicDescriptor {
        self.node.descriptor()
    }

    /// Current queue depth of the node
    pub fn queue_size(&self) -> usize {
        self.node.queue_size()
    }

    /// Current generation of the node
    pub fn generation(&self) -> Generation {
        self.node.generation()
    }

    /// Change the queue depth; fails once the payload ring exists
    pub fn set_queue_size(&self, queue_size: usize) -> Result<()> {
        self.node.set_queue_size(queue_size)
    }

    /// Register an external on-publish hook on this node
    pub fn register_hook(&self, hook: Arc<dyn PublishHook>) {
        self.node.register_hook(hook);
    }

    /// The underlying node
    pub fn node(&self) -> &Arc<TopicNode> {
        &self.node
    }

    pub(crate) fn into_node(self) -> Arc<TopicNode> {
        self.node
    }
}

/// Consumer handle for one (topic, instance)
///
/// Created by [`Broker::subscribe`] / [`Broker::subscribe_multi`]. May
/// exist before the topic is advertised; it attaches lazily on the first
/// copy/update call once the node appears.
#[derive(Debug)]
pub struct Subscription {
    meta: &'static TopicDescriptor,
    instance: u8,
    node: Option<Arc<TopicNode>>,
    last_generation: Generation,
}

impl Subscription {
    pub(crate) fn new(meta: &'static TopicDescriptor, instance: u8) -> Self {
        Self {
            meta,
            instance,
            node: None,
            last_generation: 0,
        }
    }

    /// Attach to the node if it exists; true when attached
    pub(crate) fn attach(&mut self, broker: &Broker) -> bool {
        if self.node.is_some() {
            return true;
        }
        match broker.attach_subscriber(self.meta, self.instance) {
            Some((node, initial_generation)) => {
                self.node = Some(node);
                self.last_generation = initial_generation;
                true
            }
            None => false,
        }
    }

    /// Copy the best available payload into `dst`.
    ///
    /// Never reports "no data" once the node has published: a caught-up
    /// reader is re-delivered the newest value and a lapped reader is
    /// clamped to the oldest value still in the ring. Returns 0 while the
    /// topic has no node or no published data yet. Progress (and loss) is
    /// visible through [`Self::last_generation`].
    pub fn copy(&mut self, broker: &Broker, dst: &mut [u8]) -> Result<usize> {
        self.attach(broker);
        match &self.node {
            Some(node) => node.read(dst, &mut self.last_generation),
            None => Ok(0),
        }
    }

    /// Copy only if something newer than `last_generation` was published;
    /// returns 0 otherwise
    pub fn update(&mut self, broker: &Broker, dst: &mut [u8]) -> Result<usize> {
        if self.updated(broker) {
            self.copy(broker, dst)
        } else {
            Ok(0)
        }
    }

    /// Whether unread publishes are available
    pub fn updated(&mut self, broker: &Broker) -> bool {
        self.attach(broker);
        self.updates_available() > 0
    }

    /// Number of publishes this handle has not yet consumed
    ///
    /// 0 for unattached handles and for tombstoned nodes.
    pub fn updates_available(&self) -> u32 {
        self.node
            .as_ref()
            .map(|node| node.updates_available(self.last_generation))
            .unwrap_or(0)
    }

    /// Re-point this subscription at another instance of the same topic
    pub fn change_instance(&mut self, broker: &Broker, instance: u8) -> Result<()> {
        if instance == self.instance {
            return Err(KestrelError::invalid_parameter(
                "instance",
                format!("already subscribed to {}:{}", self.meta.name, instance),
            ));
        }
        if instance as usize >= crate::config::MAX_INSTANCES {
            return Err(KestrelError::invalid_parameter(
                "instance",
                format!(
                    "instance {} out of range, at most {} allowed",
                    instance,
                    crate::config::MAX_INSTANCES
                ),
            ));
        }

        if let Some(node) = self.node.take() {
            broker.detach_subscriber(&node);
        }
        self.instance = instance;
        self.last_generation = 0;
        self.attach(broker);
        Ok(())
    }

    /// Descriptor of the subscribed topic
    pub fn descriptor(&self) -> &'static TopicDescriptor {
        self.meta
    }

    /// Instance index this subscription tracks
    pub fn instance(&self) -> u8 {
        self.instance
    }

    /// Whether the handle has attached to a live node
    pub fn is_attached(&self) -> bool {
        self.node.is_some()
    }

    /// Generation of the last payload this handle consumed
    pub fn last_generation(&self) -> Generation {
        self.last_generation
    }

    /// The underlying node, if attached
    pub fn node(&self) -> Option<&Arc<TopicNode>> {
        self.node.as_ref()
    }

    pub(crate) fn into_node(self) -> Option<Arc<TopicNode>> {
        self.node
    }
}
