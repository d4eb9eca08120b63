//! Topic node data plane
//!
//! The per-(topic, instance) node: lazily allocated payload ring, wrapping
//! generation counter, and the wrap-safe arithmetic the copy path depends
//! on. Lifecycle (creation, tombstoning, destruction) is driven from the
//! broker module; this module only implements the data plane itself.

pub mod generation;
pub mod node;


pub use generation::{is_in_range, round_up_queue_size, Generation};
pub use node::TopicNode;
