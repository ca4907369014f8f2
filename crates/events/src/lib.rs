//! Job progress fan-out.
//!
//! - [`ProgressBroadcaster`]: per-job registry of progress observers.
//! - [`Subscription`]: one observer's live stream of snapshots.

pub mod broadcaster;

pub use broadcaster::{ProgressBroadcaster, SubscriberId, Subscription};
