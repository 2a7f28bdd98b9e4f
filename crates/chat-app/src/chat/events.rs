use mechat_storage::{ConversationId, MessageId};

/// Routing key for one in-flight reply: the conversation and its placeholder.
///
/// Events whose target is no longer tracked are stale and must be dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReplyTarget {
    pub conversation_id: ConversationId,
    pub message_id: MessageId,
}

impl ReplyTarget {
    pub fn new(conversation_id: ConversationId, message_id: MessageId) -> Self {
        Self {
            conversation_id,
            message_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyPayload {
    Fragment(String),
    Finished,
}

/// Emitted by a reply reader task for every fragment and once at the end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyEvent {
    pub target: ReplyTarget,
    pub payload: ReplyPayload,
}

impl ReplyEvent {
    pub fn fragment(target: ReplyTarget, text: impl Into<String>) -> Self {
        Self {
            target,
            payload: ReplyPayload::Fragment(text.into()),
        }
    }

    pub fn finished(target: ReplyTarget) -> Self {
        Self {
            target,
            payload: ReplyPayload::Finished,
        }
    }
}
