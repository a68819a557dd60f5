//! Session registry
//!
//! Channels (one per authenticated connection), the rooms they join and the
//! buckets that shard both by key.

mod bucket;
mod channel;
mod ring;
mod room;

pub use bucket::{Bucket, BucketError};
pub use channel::{Channel, ChannelError, ChannelState, SessionInfo, Signal, StateCell};
pub use ring::{Ring, RingError};
pub use room::Room;
