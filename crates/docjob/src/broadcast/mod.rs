//! Broadcasting of job lifecycle events.
//!
//! Subscribers (metrics, webhook delivery) receive every status change
//! through a tokio broadcast channel. Delivery is best effort: a lagging
//! or absent subscriber never blocks the coordinator.

pub mod lifecycle;

pub use lifecycle::{LifecycleBroadcaster, LifecycleEvent};
