use std::time::{SystemTime, UNIX_EPOCH};

pub mod error;
pub mod ids;
pub mod memory;
pub mod seed;
pub mod types;

pub use error::{StorageError, StorageResult};
pub use ids::{
    ASSISTANT_USER_ID, CallLogId, ConversationId, ME_USER_ID, MessageId, StoryId, UserId,
    assistant_user_id, me_user_id,
};
pub use memory::MemoryStorage;
pub use seed::mock_storage;
pub use types::{
    AttachmentMeta, CallDirection, CallKind, CallLog, Conversation, Message, MessageKind,
    MessageStatus, NewCallLog, NewMessage, Presence, Story, StoryMediaKind, TYPING_SENTINEL,
    User,
};

pub trait UserDirectory {
    fn me(&self) -> &User;
    fn get_user(&self, user_id: &UserId) -> Option<&User>;
    fn list_users(&self) -> &[User];
}

pub trait ConversationStore {
    fn list_conversations(&self) -> &[Conversation];
    fn get_conversation(&self, conversation_id: &ConversationId) -> Option<&Conversation>;
    fn search_conversations(&self, query: &str) -> Vec<&Conversation>;
    fn append_message(
        &mut self,
        conversation_id: &ConversationId,
        input: NewMessage,
    ) -> StorageResult<Message>;
    fn insert_placeholder(
        &mut self,
        conversation_id: &ConversationId,
        sender_id: UserId,
        sentinel: &str,
    ) -> StorageResult<Message>;
    fn replace_pending_text(
        &mut self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
        text: &str,
    ) -> StorageResult<Message>;
    fn commit_message(
        &mut self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> StorageResult<Message>;
    fn mark_read(&mut self, conversation_id: &ConversationId) -> StorageResult<()>;
    fn bump_unread(&mut self, conversation_id: &ConversationId) -> StorageResult<u32>;
}

pub trait StoryStore {
    fn list_stories(&self) -> &[Story];
    fn get_story(&self, story_id: &StoryId) -> Option<&Story>;
    fn story_index(&self, story_id: &StoryId) -> Option<usize>;
    fn mark_story_viewed(&mut self, story_id: &StoryId) -> StorageResult<Story>;
}

pub trait CallLogStore {
    /// Newest first.
    fn list_call_logs(&self) -> &[CallLog];
    fn record_call(&mut self, input: NewCallLog) -> CallLog;
}

pub trait Storage: UserDirectory + ConversationStore + StoryStore + CallLogStore {}

impl<T> Storage for T where T: UserDirectory + ConversationStore + StoryStore + CallLogStore {}

pub fn unix_now_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}
