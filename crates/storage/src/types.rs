use std::collections::BTreeMap;
use std::fmt;

use super::ids::{CallLogId, ConversationId, MessageId, ME_USER_ID, StoryId, UserId};

/// Sentinel body shown while an assistant reply has not produced text yet.
pub const TYPING_SENTINEL: &str = "...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Presence {
    Online,
    Offline,
    Typing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub avatar_url: String,
    pub bio: String,
    pub presence: Presence,
    pub last_seen_unix_seconds: Option<u64>,
    pub phone_number: Option<String>,
}

impl User {
    pub fn new(
        id: impl Into<UserId>,
        name: impl Into<String>,
        avatar_url: impl Into<String>,
        presence: Presence,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            avatar_url: avatar_url.into(),
            bio: String::new(),
            presence,
            last_seen_unix_seconds: None,
            phone_number: None,
        }
    }

    pub fn with_bio(mut self, bio: impl Into<String>) -> Self {
        self.bio = bio.into();
        self
    }

    pub fn with_last_seen(mut self, unix_seconds: u64) -> Self {
        self.last_seen_unix_seconds = Some(unix_seconds);
        self
    }

    pub fn with_phone_number(mut self, phone_number: impl Into<String>) -> Self {
        self.phone_number = Some(phone_number.into());
        self
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Text,
    Image,
    Audio,
    Video,
    File,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::File => "file",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Lifecycle of one transcript entry.
///
/// Only `Streaming` messages may have their body rewritten; the transition to
/// `Committed` happens once and is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageStatus {
    Streaming,
    Committed,
}

/// File metadata slot carried by the data model but never populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentMeta {
    pub file_name: String,
    pub file_size: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub body: String,
    pub created_at_unix_seconds: u64,
    pub kind: MessageKind,
    pub media_url: Option<String>,
    pub status: MessageStatus,
    // Reserved: present in the model, unused by application logic.
    pub reactions: BTreeMap<UserId, String>,
    pub attachment: Option<AttachmentMeta>,
}

impl Message {
    pub fn new(
        id: impl Into<MessageId>,
        sender_id: impl Into<UserId>,
        body: impl Into<String>,
        kind: MessageKind,
        created_at_unix_seconds: u64,
    ) -> Self {
        Self {
            id: id.into(),
            sender_id: sender_id.into(),
            body: body.into(),
            created_at_unix_seconds,
            kind,
            media_url: None,
            status: MessageStatus::Committed,
            reactions: BTreeMap::new(),
            attachment: None,
        }
    }

    pub fn with_media_url(mut self, media_url: impl Into<String>) -> Self {
        self.media_url = Some(media_url.into());
        self
    }

    pub fn is_committed(&self) -> bool {
        self.status == MessageStatus::Committed
    }

    pub fn is_from_me(&self) -> bool {
        self.sender_id.as_str() == ME_USER_ID
    }
}

/// Insert payload for a committed message; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub sender_id: UserId,
    pub body: String,
    pub kind: MessageKind,
    pub media_url: Option<String>,
    pub created_at_unix_seconds: u64,
}

impl NewMessage {
    pub fn text(sender_id: UserId, body: impl Into<String>, created_at_unix_seconds: u64) -> Self {
        Self::of_kind(sender_id, body, MessageKind::Text, created_at_unix_seconds)
    }

    pub fn of_kind(
        sender_id: UserId,
        body: impl Into<String>,
        kind: MessageKind,
        created_at_unix_seconds: u64,
    ) -> Self {
        Self {
            sender_id,
            body: body.into(),
            kind,
            media_url: None,
            created_at_unix_seconds,
        }
    }
}

/// Conversation aggregate.
///
/// The message list and the cached latest message are private so every
/// mutation goes through methods that keep `last_message` equal to the final
/// element of `messages`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    pub participants: Vec<User>,
    pub unread_count: u32,
    pub group_name: Option<String>,
    pub group_avatar_url: Option<String>,
    messages: Vec<Message>,
    last_message: Option<Message>,
}

impl Conversation {
    pub fn direct(id: impl Into<ConversationId>, participant: User) -> Self {
        Self {
            id: id.into(),
            participants: vec![participant],
            unread_count: 0,
            group_name: None,
            group_avatar_url: None,
            messages: Vec::new(),
            last_message: None,
        }
    }

    pub fn group(
        id: impl Into<ConversationId>,
        name: impl Into<String>,
        avatar_url: impl Into<String>,
        participants: Vec<User>,
    ) -> Self {
        Self {
            id: id.into(),
            participants,
            unread_count: 0,
            group_name: Some(name.into()),
            group_avatar_url: Some(avatar_url.into()),
            messages: Vec::new(),
            last_message: None,
        }
    }

    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self.refresh_last_message();
        self
    }

    pub fn with_unread_count(mut self, unread_count: u32) -> Self {
        self.unread_count = unread_count;
        self
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.last_message.as_ref()
    }

    pub fn message(&self, message_id: &MessageId) -> Option<&Message> {
        self.messages
            .iter()
            .find(|message| &message.id == message_id)
    }

    pub fn is_group(&self) -> bool {
        self.group_name.is_some()
    }

    /// Group name, or the first participant that is not the local user.
    pub fn display_name(&self) -> &str {
        if let Some(name) = &self.group_name {
            return name;
        }

        self.participants
            .iter()
            .find(|participant| participant.id.as_str() != ME_USER_ID)
            .or_else(|| self.participants.first())
            .map(|participant| participant.name.as_str())
            .unwrap_or_default()
    }

    pub fn has_participant(&self, user_id: &UserId) -> bool {
        self.participants
            .iter()
            .any(|participant| &participant.id == user_id)
    }

    pub(crate) fn push_message(&mut self, message: Message) -> Message {
        self.messages.push(message.clone());
        self.refresh_last_message();
        message
    }

    pub(crate) fn update_message<F>(&mut self, message_id: &MessageId, update: F) -> Option<Message>
    where
        F: FnOnce(&mut Message),
    {
        let message = self
            .messages
            .iter_mut()
            .find(|message| &message.id == message_id)?;
        update(message);
        let updated = message.clone();
        self.refresh_last_message();
        Some(updated)
    }

    fn refresh_last_message(&mut self) {
        self.last_message = self.messages.last().cloned();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoryMediaKind {
    Image,
    Video,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Story {
    pub id: StoryId,
    pub owner_id: UserId,
    pub media_url: String,
    pub media_kind: StoryMediaKind,
    pub created_at_unix_seconds: u64,
    pub viewed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Audio,
    Video,
}

impl CallKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallDirection {
    Incoming,
    Outgoing,
    Missed,
}

impl CallDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
            Self::Missed => "missed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallLog {
    pub id: CallLogId,
    pub peer_id: UserId,
    pub kind: CallKind,
    pub direction: CallDirection,
    pub created_at_unix_seconds: u64,
    pub duration_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCallLog {
    pub peer_id: UserId,
    pub kind: CallKind,
    pub direction: CallDirection,
    pub created_at_unix_seconds: u64,
    pub duration_secs: Option<u64>,
}
