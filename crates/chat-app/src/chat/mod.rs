/// Reply routing events produced by reader tasks.
pub mod events;
/// Streaming reply accumulation against the message store.
pub mod reducer;

pub use events::{ReplyEvent, ReplyPayload, ReplyTarget};
pub use reducer::{PendingReplies, PendingReply, ReplyApplied};
