//! The three command views: async, blocking and stream.
//!
//! The async view is canonical. The blocking and stream views are
//! adapters that wrap its futures, so all three send exactly the same
//! commands and decode replies the same way.

mod asynchronous;
mod blocking;
mod selection;
mod stream;

pub use asynchronous::{ClusterAsyncCommands, PubSubAsyncCommands};
pub use blocking::{BlockingCommands, Blocker, ClusterBlockingCommands, PubSubBlockingCommands};
pub use selection::{AsyncNodeSelection, BlockingNodeSelection, Executions, StreamNodeSelection};
pub use stream::{ClusterStreamCommands, CommandStream, PubSubStreamCommands, StreamCommands};
