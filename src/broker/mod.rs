//! Broker control plane
//!
//! Everything that happens on the cold path: node creation and lookup via
//! the existence registry, the advertise/unadvertise lifecycle with
//! tombstoned destruction, subscriber refcounting, and the handle types
//! tasks hold on to.

pub mod handles;
pub mod manager;
pub mod stats;

pub use manager::Broker;
pub use handles::{Advertisement, Subscription};
pub use stats::{BrokerStats, BrokerStatsSnapshot};
