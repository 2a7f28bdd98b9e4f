use snafu::{OptionExt, ensure};

use crate::error::{InvariantViolationSnafu, MessageCommittedSnafu, NotFoundSnafu, StorageResult};
use crate::ids::{CallLogId, ConversationId, MessageId, StoryId, UserId};
use crate::types::{
    CallLog, Conversation, Message, MessageKind, MessageStatus, NewCallLog, NewMessage, Story,
    User,
};
use crate::{CallLogStore, ConversationStore, StoryStore, UserDirectory, unix_now_seconds};

/// Process-lifetime store for users, conversations, stories and call logs.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    me: User,
    users: Vec<User>,
    conversations: Vec<Conversation>,
    stories: Vec<Story>,
    call_logs: Vec<CallLog>,
}

impl MemoryStorage {
    pub fn new(me: User) -> Self {
        Self {
            me,
            users: Vec::new(),
            conversations: Vec::new(),
            stories: Vec::new(),
            call_logs: Vec::new(),
        }
    }

    pub fn with_users(mut self, users: Vec<User>) -> Self {
        self.users = users;
        self
    }

    pub fn with_conversations(mut self, conversations: Vec<Conversation>) -> Self {
        self.conversations = conversations;
        self
    }

    pub fn with_stories(mut self, stories: Vec<Story>) -> Self {
        self.stories = stories;
        self
    }

    /// Call logs are expected newest first.
    pub fn with_call_logs(mut self, call_logs: Vec<CallLog>) -> Self {
        self.call_logs = call_logs;
        self
    }

    fn conversation_mut(
        &mut self,
        conversation_id: &ConversationId,
        stage: &'static str,
    ) -> StorageResult<&mut Conversation> {
        self.conversations
            .iter_mut()
            .find(|conversation| &conversation.id == conversation_id)
            .context(NotFoundSnafu {
                stage,
                entity: "conversation",
                id: conversation_id.to_string(),
            })
    }
}

impl UserDirectory for MemoryStorage {
    fn me(&self) -> &User {
        &self.me
    }

    fn get_user(&self, user_id: &UserId) -> Option<&User> {
        if &self.me.id == user_id {
            return Some(&self.me);
        }

        self.users.iter().find(|user| &user.id == user_id)
    }

    fn list_users(&self) -> &[User] {
        &self.users
    }
}

impl ConversationStore for MemoryStorage {
    fn list_conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    fn get_conversation(&self, conversation_id: &ConversationId) -> Option<&Conversation> {
        self.conversations
            .iter()
            .find(|conversation| &conversation.id == conversation_id)
    }

    fn search_conversations(&self, query: &str) -> Vec<&Conversation> {
        let normalized_query = query.to_lowercase();

        self.conversations
            .iter()
            .filter(|conversation| {
                normalized_query.is_empty()
                    || conversation
                        .display_name()
                        .to_lowercase()
                        .contains(&normalized_query)
            })
            .collect()
    }

    fn append_message(
        &mut self,
        conversation_id: &ConversationId,
        input: NewMessage,
    ) -> StorageResult<Message> {
        let conversation = self.conversation_mut(conversation_id, "append-message")?;

        let mut message = Message::new(
            MessageId::new_v7(),
            input.sender_id,
            input.body,
            input.kind,
            input.created_at_unix_seconds,
        );
        message.media_url = input.media_url;

        Ok(conversation.push_message(message))
    }

    fn insert_placeholder(
        &mut self,
        conversation_id: &ConversationId,
        sender_id: UserId,
        sentinel: &str,
    ) -> StorageResult<Message> {
        let conversation = self.conversation_mut(conversation_id, "insert-placeholder")?;

        let mut placeholder = Message::new(
            MessageId::new_v7(),
            sender_id,
            sentinel,
            MessageKind::Text,
            unix_now_seconds(),
        );
        placeholder.status = MessageStatus::Streaming;

        Ok(conversation.push_message(placeholder))
    }

    fn replace_pending_text(
        &mut self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
        text: &str,
    ) -> StorageResult<Message> {
        let conversation = self.conversation_mut(conversation_id, "replace-pending-text")?;
        let current = conversation.message(message_id).context(NotFoundSnafu {
            stage: "replace-pending-text",
            entity: "message",
            id: message_id.to_string(),
        })?;

        ensure!(
            !current.is_committed(),
            MessageCommittedSnafu {
                stage: "replace-pending-text",
                conversation_id: conversation_id.to_string(),
                message_id: message_id.to_string(),
            }
        );

        // The body is swapped in one assignment so readers never see a partial string.
        let replacement = text.to_string();
        conversation
            .update_message(message_id, move |message| message.body = replacement)
            .context(InvariantViolationSnafu {
                stage: "replace-pending-text",
                details: format!("message '{message_id}' vanished during update"),
            })
    }

    fn commit_message(
        &mut self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> StorageResult<Message> {
        let conversation = self.conversation_mut(conversation_id, "commit-message")?;
        let current = conversation.message(message_id).context(NotFoundSnafu {
            stage: "commit-message",
            entity: "message",
            id: message_id.to_string(),
        })?;

        ensure!(
            !current.is_committed(),
            MessageCommittedSnafu {
                stage: "commit-message",
                conversation_id: conversation_id.to_string(),
                message_id: message_id.to_string(),
            }
        );

        conversation
            .update_message(message_id, |message| {
                message.status = MessageStatus::Committed;
            })
            .context(InvariantViolationSnafu {
                stage: "commit-message",
                details: format!("message '{message_id}' vanished during commit"),
            })
    }

    fn mark_read(&mut self, conversation_id: &ConversationId) -> StorageResult<()> {
        let conversation = self.conversation_mut(conversation_id, "mark-read")?;
        conversation.unread_count = 0;
        Ok(())
    }

    fn bump_unread(&mut self, conversation_id: &ConversationId) -> StorageResult<u32> {
        let conversation = self.conversation_mut(conversation_id, "bump-unread")?;
        conversation.unread_count = conversation.unread_count.saturating_add(1);
        Ok(conversation.unread_count)
    }
}

impl StoryStore for MemoryStorage {
    fn list_stories(&self) -> &[Story] {
        &self.stories
    }

    fn get_story(&self, story_id: &StoryId) -> Option<&Story> {
        self.stories.iter().find(|story| &story.id == story_id)
    }

    fn story_index(&self, story_id: &StoryId) -> Option<usize> {
        self.stories.iter().position(|story| &story.id == story_id)
    }

    fn mark_story_viewed(&mut self, story_id: &StoryId) -> StorageResult<Story> {
        let story = self
            .stories
            .iter_mut()
            .find(|story| &story.id == story_id)
            .context(NotFoundSnafu {
                stage: "mark-story-viewed",
                entity: "story",
                id: story_id.to_string(),
            })?;

        story.viewed = true;
        Ok(story.clone())
    }
}

impl CallLogStore for MemoryStorage {
    fn list_call_logs(&self) -> &[CallLog] {
        &self.call_logs
    }

    fn record_call(&mut self, input: NewCallLog) -> CallLog {
        let entry = CallLog {
            id: CallLogId::new_v7(),
            peer_id: input.peer_id,
            kind: input.kind,
            direction: input.direction,
            created_at_unix_seconds: input.created_at_unix_seconds,
            duration_secs: input.duration_secs,
        };

        self.call_logs.insert(0, entry.clone());
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::ids::{ME_USER_ID, me_user_id};
    use crate::types::{CallDirection, CallKind, Presence, TYPING_SENTINEL};

    fn storage() -> MemoryStorage {
        let sarah = User::new("u1", "Sarah Connor", "", Presence::Offline);
        let john = User::new("u2", "John Doe", "", Presence::Online);
        MemoryStorage::new(User::new(ME_USER_ID, "Alex Design", "", Presence::Online))
            .with_users(vec![sarah.clone(), john.clone()])
            .with_conversations(vec![
                Conversation::direct("c2", sarah.clone()),
                Conversation::group("c4", "Weekend Trip", "", vec![sarah, john]),
            ])
    }

    #[test]
    fn append_updates_last_message_cache() {
        let mut storage = storage();
        let conversation_id = ConversationId::new("c2");

        let appended = storage
            .append_message(
                &conversation_id,
                NewMessage::text(me_user_id(), "See you at 1pm.", 100),
            )
            .unwrap();

        let conversation = storage.get_conversation(&conversation_id).unwrap();
        assert_eq!(conversation.last_message(), Some(&appended));
        assert_eq!(conversation.messages().last(), Some(&appended));
        assert!(appended.is_committed());
    }

    #[test]
    fn append_to_unknown_conversation_is_not_found() {
        let mut storage = storage();
        let error = storage
            .append_message(
                &ConversationId::new("missing"),
                NewMessage::text(me_user_id(), "hello", 1),
            )
            .unwrap_err();

        assert!(matches!(
            error,
            StorageError::NotFound {
                entity: "conversation",
                ..
            }
        ));
    }

    #[test]
    fn pending_text_is_rewritable_until_commit() {
        let mut storage = storage();
        let conversation_id = ConversationId::new("c2");
        let placeholder = storage
            .insert_placeholder(&conversation_id, UserId::new("u1"), TYPING_SENTINEL)
            .unwrap();
        assert_eq!(placeholder.body, TYPING_SENTINEL);
        assert_eq!(placeholder.status, MessageStatus::Streaming);

        let updated = storage
            .replace_pending_text(&conversation_id, &placeholder.id, "Hello there")
            .unwrap();
        assert_eq!(updated.body, "Hello there");

        let committed = storage
            .commit_message(&conversation_id, &placeholder.id)
            .unwrap();
        assert!(committed.is_committed());

        assert!(matches!(
            storage.replace_pending_text(&conversation_id, &placeholder.id, "again"),
            Err(StorageError::MessageCommitted { .. })
        ));
        assert!(matches!(
            storage.commit_message(&conversation_id, &placeholder.id),
            Err(StorageError::MessageCommitted { .. })
        ));
        assert_eq!(
            storage
                .get_conversation(&conversation_id)
                .and_then(Conversation::last_message)
                .map(|message| message.body.as_str()),
            Some("Hello there")
        );
    }

    #[test]
    fn search_is_case_insensitive_on_display_name() {
        let storage = storage();

        let matches = storage
            .search_conversations("weekend")
            .into_iter()
            .map(|conversation| conversation.id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(matches, vec!["c4"]);
        assert_eq!(storage.search_conversations("").len(), 2);
        assert!(storage.search_conversations("  ").is_empty());
        assert!(storage.search_conversations("nobody").is_empty());
    }

    #[test]
    fn unread_counter_bumps_and_clears() {
        let mut storage = storage();
        let conversation_id = ConversationId::new("c2");

        assert_eq!(storage.bump_unread(&conversation_id).unwrap(), 1);
        assert_eq!(storage.bump_unread(&conversation_id).unwrap(), 2);
        storage.mark_read(&conversation_id).unwrap();
        assert_eq!(
            storage
                .get_conversation(&conversation_id)
                .map(|conversation| conversation.unread_count),
            Some(0)
        );
    }

    #[test]
    fn recorded_calls_are_listed_newest_first() {
        let mut storage = storage();
        let first = storage.record_call(NewCallLog {
            peer_id: UserId::new("u1"),
            kind: CallKind::Audio,
            direction: CallDirection::Outgoing,
            created_at_unix_seconds: 1,
            duration_secs: Some(45),
        });
        let second = storage.record_call(NewCallLog {
            peer_id: UserId::new("u2"),
            kind: CallKind::Video,
            direction: CallDirection::Outgoing,
            created_at_unix_seconds: 2,
            duration_secs: Some(45),
        });

        assert_eq!(storage.list_call_logs(), &[second, first]);
    }

    #[test]
    fn get_user_resolves_self() {
        let storage = storage();
        assert_eq!(
            storage
                .get_user(&me_user_id())
                .map(|user| user.name.as_str()),
            Some("Alex Design")
        );
        assert!(storage.get_user(&UserId::new("u9")).is_none());
    }
}
