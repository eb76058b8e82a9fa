//! host
//!
//! The protocol surface toward the host application.
//!
//! - [`HostChannel`]: synchronous print-and-acknowledge, used for progress
//! - [`Reply`]: the tree-or-failure envelope returned for each request

mod channel;
mod reply;

pub use channel::{ChannelError, HostChannel, MemoryChannel, StdioChannel};
pub use reply::{Failure, Reply};
