use std::collections::HashMap;

use mechat_storage::{
    ConversationId, ConversationStore, Message, MessageId, StorageResult, TYPING_SENTINEL, UserId,
};

use super::events::{ReplyEvent, ReplyPayload, ReplyTarget};

/// Accumulates streamed fragments into one placeholder message.
///
/// The placeholder is inserted with the typing sentinel, rewritten with the
/// full accumulated text after every fragment, and committed exactly once.
#[derive(Debug)]
pub struct PendingReply {
    target: ReplyTarget,
    accumulated: String,
}

impl PendingReply {
    pub fn begin<S>(
        store: &mut S,
        conversation_id: &ConversationId,
        sender_id: UserId,
    ) -> StorageResult<Self>
    where
        S: ConversationStore + ?Sized,
    {
        let placeholder = store.insert_placeholder(conversation_id, sender_id, TYPING_SENTINEL)?;

        Ok(Self {
            target: ReplyTarget::new(conversation_id.clone(), placeholder.id),
            accumulated: String::new(),
        })
    }

    pub fn target(&self) -> &ReplyTarget {
        &self.target
    }

    pub fn push<S>(&mut self, store: &mut S, fragment: &str) -> StorageResult<()>
    where
        S: ConversationStore + ?Sized,
    {
        if fragment.is_empty() {
            return Ok(());
        }

        self.accumulated.push_str(fragment);
        store.replace_pending_text(
            &self.target.conversation_id,
            &self.target.message_id,
            &self.accumulated,
        )?;
        Ok(())
    }

    /// Commits the placeholder. A reply that produced no text keeps the sentinel.
    pub fn finish<S>(self, store: &mut S) -> StorageResult<Message>
    where
        S: ConversationStore + ?Sized,
    {
        store.commit_message(&self.target.conversation_id, &self.target.message_id)
    }
}

/// What a reply event did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyApplied {
    Updated(ReplyTarget),
    Committed { target: ReplyTarget, message: Message },
}

/// All replies currently streaming, keyed by placeholder id.
#[derive(Debug, Default)]
pub struct PendingReplies {
    replies: HashMap<MessageId, PendingReply>,
}

impl PendingReplies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, reply: PendingReply) -> ReplyTarget {
        let target = reply.target.clone();
        self.replies.insert(target.message_id.clone(), reply);
        target
    }

    pub fn len(&self) -> usize {
        self.replies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replies.is_empty()
    }

    pub fn is_tracking(&self, target: &ReplyTarget) -> bool {
        self.replies
            .get(&target.message_id)
            .is_some_and(|reply| reply.target == *target)
    }

    /// Applies one reply event; events for untracked targets are ignored.
    pub fn apply<S>(
        &mut self,
        store: &mut S,
        event: ReplyEvent,
    ) -> StorageResult<Option<ReplyApplied>>
    where
        S: ConversationStore + ?Sized,
    {
        if !self.is_tracking(&event.target) {
            tracing::debug!(
                conversation_id = %event.target.conversation_id,
                message_id = %event.target.message_id,
                "ignoring event for untracked reply"
            );
            return Ok(None);
        }

        match event.payload {
            ReplyPayload::Fragment(text) => {
                let Some(reply) = self.replies.get_mut(&event.target.message_id) else {
                    return Ok(None);
                };
                reply.push(store, &text)?;
                Ok(Some(ReplyApplied::Updated(event.target)))
            }
            ReplyPayload::Finished => {
                let Some(reply) = self.replies.remove(&event.target.message_id) else {
                    return Ok(None);
                };
                let message = reply.finish(store)?;
                Ok(Some(ReplyApplied::Committed {
                    target: event.target,
                    message,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use mechat_storage::{MessageStatus, StorageError, assistant_user_id, mock_storage};

    use super::*;

    fn conversation_id() -> ConversationId {
        ConversationId::new("c1")
    }

    fn body_of(store: &impl ConversationStore, target: &ReplyTarget) -> String {
        store
            .get_conversation(&target.conversation_id)
            .and_then(|conversation| conversation.message(&target.message_id))
            .map(|message| message.body.clone())
            .unwrap()
    }

    #[test]
    fn placeholder_shows_sentinel_until_first_fragment() {
        let mut store = mock_storage(1_000);
        let reply =
            PendingReply::begin(&mut store, &conversation_id(), assistant_user_id()).unwrap();

        let conversation = store.get_conversation(&conversation_id()).unwrap();
        let placeholder = conversation.last_message().unwrap();
        assert_eq!(placeholder.id, reply.target().message_id);
        assert_eq!(placeholder.body, TYPING_SENTINEL);
        assert_eq!(placeholder.status, MessageStatus::Streaming);
    }

    #[test]
    fn committed_text_is_exact_concatenation_of_fragments() {
        let mut store = mock_storage(1_000);
        let mut reply =
            PendingReply::begin(&mut store, &conversation_id(), assistant_user_id()).unwrap();
        let target = reply.target().clone();

        let fragments = ["Hel", "", "lo", ", ", "world 🌍"];
        let mut observed = Vec::new();
        for fragment in fragments {
            reply.push(&mut store, fragment).unwrap();
            observed.push(body_of(&store, &target));
        }

        assert_eq!(observed.last().map(String::as_str), Some("Hello, world 🌍"));
        // Each visible body extends the previous one.
        assert!(
            observed
                .windows(2)
                .all(|pair| pair[1].starts_with(&pair[0]))
        );

        let committed = reply.finish(&mut store).unwrap();
        assert_eq!(committed.body, fragments.concat());
        assert!(committed.is_committed());
    }

    #[test]
    fn empty_reply_commits_the_sentinel() {
        let mut store = mock_storage(1_000);
        let reply =
            PendingReply::begin(&mut store, &conversation_id(), assistant_user_id()).unwrap();
        let committed = reply.finish(&mut store).unwrap();
        assert_eq!(committed.body, TYPING_SENTINEL);
    }

    #[test]
    fn committed_reply_rejects_later_rewrites() {
        let mut store = mock_storage(1_000);
        let reply =
            PendingReply::begin(&mut store, &conversation_id(), assistant_user_id()).unwrap();
        let target = reply.target().clone();
        reply.finish(&mut store).unwrap();

        let result =
            store.replace_pending_text(&target.conversation_id, &target.message_id, "late");
        assert!(matches!(result, Err(StorageError::MessageCommitted { .. })));
    }

    #[test]
    fn events_for_untracked_replies_are_ignored() {
        let mut store = mock_storage(1_000);
        let mut replies = PendingReplies::new();
        let reply =
            PendingReply::begin(&mut store, &conversation_id(), assistant_user_id()).unwrap();
        let target = replies.track(reply);

        replies
            .apply(&mut store, ReplyEvent::fragment(target.clone(), "Hi"))
            .unwrap();
        let applied = replies
            .apply(&mut store, ReplyEvent::finished(target.clone()))
            .unwrap();
        assert!(matches!(applied, Some(ReplyApplied::Committed { .. })));
        assert!(replies.is_empty());

        let late = replies
            .apply(&mut store, ReplyEvent::fragment(target.clone(), " again"))
            .unwrap();
        assert_eq!(late, None);
        assert_eq!(body_of(&store, &target), "Hi");
    }

    #[test]
    fn concurrent_replies_accumulate_independently() {
        let mut store = mock_storage(1_000);
        let mut replies = PendingReplies::new();
        let first = replies.track(
            PendingReply::begin(&mut store, &conversation_id(), assistant_user_id()).unwrap(),
        );
        let second = replies.track(
            PendingReply::begin(&mut store, &conversation_id(), assistant_user_id()).unwrap(),
        );

        for (target, text) in [(&first, "one"), (&second, "two"), (&first, "!")] {
            replies
                .apply(&mut store, ReplyEvent::fragment(target.clone(), text))
                .unwrap();
        }

        assert_eq!(replies.len(), 2);
        assert_eq!(body_of(&store, &first), "one!");
        assert_eq!(body_of(&store, &second), "two");
    }
}
