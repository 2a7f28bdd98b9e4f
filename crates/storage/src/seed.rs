use crate::ids::{ASSISTANT_USER_ID, CallLogId, ME_USER_ID, StoryId, UserId};
use crate::memory::MemoryStorage;
use crate::types::{
    CallDirection, CallKind, CallLog, Conversation, Message, MessageKind, Presence, Story,
    StoryMediaKind, User,
};

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Builds the fixed mock dataset, with timestamps relative to `now_unix_seconds`.
pub fn mock_storage(now_unix_seconds: u64) -> MemoryStorage {
    let ago = |seconds: u64| now_unix_seconds.saturating_sub(seconds);

    let me = User::new(
        ME_USER_ID,
        "Alex Design",
        "https://picsum.photos/id/64/200/200",
        Presence::Online,
    )
    .with_bio("Designing the future 🚀")
    .with_phone_number("+1 555 0192");

    let assistant = User::new(
        ASSISTANT_USER_ID,
        "meChat AI",
        "https://picsum.photos/id/20/200/200",
        Presence::Online,
    )
    .with_bio("Always here to help. Powered by Gemini.");
    let sarah = User::new(
        "u1",
        "Sarah Connor",
        "https://picsum.photos/id/65/200/200",
        Presence::Offline,
    )
    .with_bio("No fate but what we make.")
    .with_last_seen(ago(5 * MINUTE));
    let john = User::new(
        "u2",
        "John Doe",
        "https://picsum.photos/id/91/200/200",
        Presence::Online,
    )
    .with_bio("At the gym 🏋️");
    let design_team = User::new(
        "u3",
        "Design Team",
        "https://picsum.photos/id/180/200/200",
        Presence::Offline,
    );

    let conversations = vec![
        Conversation::direct("c1", assistant.clone()).with_messages(vec![Message::new(
            "m1",
            ASSISTANT_USER_ID,
            "Hello! I am your AI assistant. How can I help you today?",
            MessageKind::Text,
            ago(HOUR),
        )]),
        Conversation::direct("c2", sarah.clone()).with_messages(vec![
            Message::new(
                "m2",
                "u1",
                "Hey Alex, are we still on for lunch?",
                MessageKind::Text,
                ago(30 * MINUTE),
            ),
            Message::new(
                "m3",
                ME_USER_ID,
                "Yes! See you at 1pm.",
                MessageKind::Text,
                ago(29 * MINUTE),
            ),
        ]),
        Conversation::direct("c3", john.clone())
            .with_messages(vec![
                Message::new(
                    "m4",
                    "u2",
                    "Check out this view!",
                    MessageKind::Image,
                    ago(2 * HOUR),
                )
                .with_media_url("https://picsum.photos/id/28/800/600"),
            ])
            .with_unread_count(1),
        Conversation::group(
            "c4",
            "Weekend Trip",
            "https://picsum.photos/id/10/200/200",
            vec![sarah.clone(), john.clone()],
        ),
    ];

    let stories = vec![
        Story {
            id: StoryId::new("s1"),
            owner_id: UserId::new("u1"),
            media_url: "https://picsum.photos/id/50/600/900".to_string(),
            media_kind: StoryMediaKind::Image,
            created_at_unix_seconds: ago(2 * HOUR),
            viewed: false,
        },
        Story {
            id: StoryId::new("s2"),
            owner_id: UserId::new("u2"),
            media_url: "https://picsum.photos/id/55/600/900".to_string(),
            media_kind: StoryMediaKind::Image,
            created_at_unix_seconds: ago(5 * HOUR),
            viewed: true,
        },
    ];

    let call_logs = vec![
        CallLog {
            id: CallLogId::new("cl1"),
            peer_id: UserId::new("u1"),
            kind: CallKind::Video,
            direction: CallDirection::Incoming,
            created_at_unix_seconds: ago(DAY),
            duration_secs: Some(124),
        },
        CallLog {
            id: CallLogId::new("cl2"),
            peer_id: UserId::new("u2"),
            kind: CallKind::Audio,
            direction: CallDirection::Missed,
            created_at_unix_seconds: ago(2 * DAY),
            duration_secs: None,
        },
    ];

    MemoryStorage::new(me)
        .with_users(vec![assistant, sarah, john, design_team])
        .with_conversations(conversations)
        .with_stories(stories)
        .with_call_logs(call_logs)
}
