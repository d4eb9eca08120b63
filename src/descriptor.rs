//! Static topic descriptors
//!
//! Topic descriptors are supplied by the surrounding firmware as a static,
//! compile-time table. The broker only ever borrows them; it never owns or
//! mutates a descriptor. Payload layouts are opaque to the broker, which
//! sees each topic as `size` raw bytes.

use serde::Serialize;

/// Dense topic identifier, used to index the existence registry
pub type TopicId = u16;

/// Immutable metadata describing one topic
///
/// The `id` must be unique and dense across the firmware's topic table
/// (it indexes the existence registry), and `size` is the fixed payload
/// size in bytes for every instance of the topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TopicDescriptor {
    /// Dense topic id in `[0, topic_count)`
    pub id: TopicId,
    /// Human-readable topic name, unique across the table
    pub name: &'static str,
    /// Payload size in bytes
    pub size: usize,
}

impl TopicDescriptor {
    /// Create a descriptor; intended for static topic tables
    pub const fn new(id: TopicId, name: &'static str, size: usize) -> Self {
        Self { id, name, size }
    }
}

/// Define a static topic descriptor for a firmware topic table
///
/// ```
/// use kestrel::define_topic;
///
/// define_topic!(VEHICLE_ATTITUDE, 0, "vehicle_attitude", 28);
/// assert_eq!(VEHICLE_ATTITUDE.name, "vehicle_attitude");
/// ```
#[macro_export]
macro_rules! define_topic {
    ($ident:ident, $id:expr, $name:expr, $size:expr) => {
        pub static $ident: $crate::descriptor::TopicDescriptor =
            $crate::descriptor::TopicDescriptor::new($id, $name, $size);
    };
}
