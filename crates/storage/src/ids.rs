use std::fmt;
use std::str::FromStr;

use snafu::ensure;
use uuid::Uuid;

use super::error::{InvalidIdSnafu, StorageError, StorageResult};

// Seed data uses short fixed ids ("c1", "m1"), runtime inserts mint UUID v7 strings.
macro_rules! define_storage_id {
    ($name:ident, $id_type:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            pub fn new_v7() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            pub fn parse(raw: &str) -> StorageResult<Self> {
                let trimmed = raw.trim();
                ensure!(
                    !trimmed.is_empty() && !trimmed.contains(char::is_whitespace),
                    InvalidIdSnafu {
                        stage: "parse-storage-id",
                        id_type: $id_type,
                        raw: raw.to_string(),
                    }
                );
                Ok(Self(trimmed.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl FromStr for $name {
            type Err = StorageError;

            fn from_str(raw: &str) -> StorageResult<Self> {
                Self::parse(raw)
            }
        }
    };
}

define_storage_id!(UserId, "user-id");
define_storage_id!(ConversationId, "conversation-id");
define_storage_id!(MessageId, "message-id");
define_storage_id!(StoryId, "story-id");
define_storage_id!(CallLogId, "call-log-id");

/// Id of the local user; every outgoing message carries it as sender.
pub const ME_USER_ID: &str = "me";
/// Id of the simulated AI contact.
pub const ASSISTANT_USER_ID: &str = "ai-assistant";

pub fn me_user_id() -> UserId {
    UserId::new(ME_USER_ID)
}

pub fn assistant_user_id() -> UserId {
    UserId::new(ASSISTANT_USER_ID)
}
