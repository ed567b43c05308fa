//! # clawboard-events
//!
//! Process-wide ordered publish/replay bus.
//!
//! Every published event gets a monotonically increasing `eventId` (starting
//! at 1) and lands in a bounded ring buffer for replay. Each subscriber has
//! its own bounded queue; when a slow subscriber falls behind, the oldest
//! queued event is dropped so live tailing keeps moving and publishers never
//! block.

mod hub;

pub use hub::{BoardEvent, EventHub, Replay, Subscription};
