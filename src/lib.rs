//! # Kestrel - Intra-Process Topic Broker
//!
//! Kestrel is the publish/subscribe bus at the center of a flight-controller
//! firmware: dozens of independently scheduled control, estimation, and
//! driver tasks exchange typed payloads through named, multi-instance topics
//! with no direct coupling and no blocking on the hot path.
//!
//! ## Features
//!
//! - **Topic nodes**: per-(topic, instance) ring of historical payloads,
//!   lazily allocated on first publish
//! - **Generation counters**: wrap-safe freshness and loss detection without
//!   per-subscriber state in the node
//! - **Existence registry**: O(1) bit-indexed fast reject before any
//!   directory scan
//! - **Tombstoned destruction**: unadvertised nodes stay alive while
//!   subscribers still hold them; readers never fault
//! - **Pluggable notification**: on-publish hooks for an external scheduler,
//!   never required for correctness
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────┐
//! │                  Broker (cold path)               │
//! ├───────────────────────────────────────────────────┤
//! │  Existence Registry   │  Node Directory           │
//! │  - (topic, inst) bits │  - live TopicNodes        │
//! │  - O(1) fast reject   │  - advertise/subscribe    │
//! └───────────┬───────────┴──────────┬────────────────┘
//!             ▼                      ▼
//! ┌─────────────────────┐  ┌─────────────────────────┐
//! │  Advertisement      │  │  Subscription           │
//! │  publish() ──────┐  │  │  copy()/update() ────┐  │
//! └──────────────────┼──┘  └──────────────────────┼──┘
//!                    ▼                            ▼
//!           ┌────────────────────────────────────────┐
//!           │       TopicNode (hot path)             │
//!           │  payload ring · generation · flags     │
//!           └────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use kestrel::{define_topic, Broker};
//!
//! define_topic!(VEHICLE_RATES, 0, "vehicle_rates", 8);
//!
//! let broker = Broker::new(16);
//!
//! let advert = broker.advertise(&VEHICLE_RATES, None, 4).unwrap();
//! let mut sub = broker.subscribe(&VEHICLE_RATES).unwrap();
//!
//! advert.publish(&42u64.to_le_bytes()).unwrap();
//!
//! let mut dst = [0u8; 8];
//! assert_eq!(sub.copy(&broker, &mut dst).unwrap(), 8);
//! assert_eq!(u64::from_le_bytes(dst), 42);
//! ```

// Core modules
pub mod broker;
pub mod descriptor;
pub mod error;
pub mod node;
pub mod notify;
pub mod registry;

// Main API re-exports
pub use broker::{Advertisement, Broker, BrokerStats, BrokerStatsSnapshot, Subscription};
pub use descriptor::{TopicDescriptor, TopicId};
pub use error::{KestrelError, Result};
pub use node::{is_in_range, round_up_queue_size, Generation, TopicNode};
pub use notify::{HookSet, PublishHook};
pub use registry::ExistenceRegistry;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration constants
pub mod config {
    /// Maximum instances per topic; instance indices are dense in
    /// `[0, MAX_INSTANCES)`
    pub const MAX_INSTANCES: usize = 4;

    /// Queue depth cap; requested depths saturate here
    pub const MAX_QUEUE_SIZE: usize = 128;

    /// Default queue depth for latest-value topics
    pub const DEFAULT_QUEUE_SIZE: usize = 1;

    /// Subscriber count above which a leak warning is logged
    pub const SUBSCRIBER_WARN_THRESHOLD: u32 = 50;
}
