use std::fmt::Write as _;

use mechat_storage::{
    CallLog, CallLogStore, Conversation, Message, MessageKind, Presence, Storage, StoryStore,
    UserDirectory,
};

use crate::app::ChatApp;
use crate::overlay::story::STORY_PROGRESS_MAX;
use crate::overlay::{CallOverlay, StoryOverlay, format_duration};
use crate::settings::AppSettings;

const PROGRESS_BAR_WIDTH: usize = 20;

/// `HH:MM` of a unix timestamp, in UTC.
pub fn format_clock(unix_seconds: u64) -> String {
    let minutes_of_day = (unix_seconds % 86_400) / 60;
    format!("{:02}:{:02}", minutes_of_day / 60, minutes_of_day % 60)
}

/// Sidebar preview of a conversation's latest message.
pub fn preview(conversation: &Conversation) -> String {
    match conversation.last_message() {
        Some(message) if message.kind == MessageKind::Text => message.body.clone(),
        Some(message) => format!("Sent a {}", message.kind),
        None => "Start a conversation".to_string(),
    }
}

pub fn chat_row(conversation: &Conversation, is_active: bool) -> String {
    let mut row = format!(
        "{} [{}] {}",
        if is_active { '>' } else { ' ' },
        conversation.id,
        conversation.display_name()
    );

    if let Some(message) = conversation.last_message() {
        let _ = write!(row, " {}", format_clock(message.created_at_unix_seconds));
    }
    let _ = write!(row, "\n      {}", preview(conversation));
    if conversation.unread_count > 0 {
        let _ = write!(row, "  ({})", conversation.unread_count);
    }

    row
}

pub fn chat_list(app: &ChatApp) -> String {
    let conversations = app.visible_conversations();
    if conversations.is_empty() {
        return "No chats found".to_string();
    }

    conversations
        .into_iter()
        .map(|conversation| chat_row(conversation, app.navigation().is_active(&conversation.id)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn message_line(store: &dyn Storage, message: &Message) -> String {
    let sender = if message.is_from_me() {
        "You".to_string()
    } else {
        store
            .get_user(&message.sender_id)
            .map(|user| user.name.clone())
            .unwrap_or_else(|| message.sender_id.to_string())
    };

    let mut line = format!(
        "[{}] {sender}: {}",
        format_clock(message.created_at_unix_seconds),
        message.body
    );
    if let Some(media_url) = &message.media_url {
        let _ = write!(line, " <{media_url}>");
    }

    line
}

pub fn transcript(app: &ChatApp, conversation: &Conversation) -> String {
    let mut output = format!("== {} ==", conversation.display_name());
    if !conversation.is_group()
        && let Some(peer) = conversation.participants.first()
    {
        let presence = match peer.presence {
            Presence::Online => "Online",
            Presence::Offline => "Offline",
            Presence::Typing => "typing...",
        };
        let _ = write!(output, " ({presence})");
    }

    for message in conversation.messages() {
        output.push('\n');
        output.push_str(&message_line(app.store(), message));
    }

    output
}

pub fn status_list(app: &ChatApp) -> String {
    let store = app.store();
    let mut output = String::from("Recent updates");
    for story in store.list_stories() {
        let owner = store
            .get_user(&story.owner_id)
            .map_or(story.owner_id.as_str(), |user| user.name.as_str());
        let _ = write!(
            output,
            "\n  [{}] {} {}{}",
            story.id,
            owner,
            format_clock(story.created_at_unix_seconds),
            if story.viewed { "" } else { "  (new)" }
        );
    }

    output
}

pub fn call_log_line(app: &ChatApp, log: &CallLog) -> String {
    let peer = app
        .store()
        .get_user(&log.peer_id)
        .map_or(log.peer_id.as_str(), |user| user.name.as_str());
    let mut line = format!(
        "  {} {} {} {}",
        peer,
        log.direction.as_str(),
        log.kind,
        format_clock(log.created_at_unix_seconds)
    );
    if let Some(duration_secs) = log.duration_secs {
        let _ = write!(line, " ({})", format_duration(duration_secs));
    }

    line
}

pub fn call_logs(app: &ChatApp) -> String {
    let mut output = String::from("Recent calls");
    for log in app.store().list_call_logs() {
        output.push('\n');
        output.push_str(&call_log_line(app, log));
    }

    output
}

pub fn call_status(call: &CallOverlay) -> String {
    let mut line = format!(
        "{} call with {}: {}",
        call.kind(),
        call.peer().name,
        call.status_line()
    );
    if call.is_muted() {
        line.push_str(" [muted]");
    }
    if call.is_camera_off() {
        line.push_str(" [camera off]");
    }

    line
}

pub fn story_progress(app: &ChatApp, story: &StoryOverlay) -> String {
    let filled =
        usize::from(story.progress()) * PROGRESS_BAR_WIDTH / usize::from(STORY_PROGRESS_MAX);
    let (position, total) = story.position();
    let owner = app
        .store()
        .get_story(story.current())
        .and_then(|current| app.store().get_user(&current.owner_id))
        .map_or("", |user| user.name.as_str());

    format!(
        "story {position}/{total} {owner} [{}{}]",
        "#".repeat(filled),
        "-".repeat(PROGRESS_BAR_WIDTH - filled)
    )
}

pub fn settings_view(app: &ChatApp, settings: &AppSettings) -> String {
    let me = app.store().me();
    let policy = app.assistant().sessions().policy();
    format!(
        "{}\n  {}\n  phone: {}\n  assistant: {} ({})\n  model: {}\n  \
         memory: up to {} chats, idle {} min\n  call duration: {:?}",
        me.name,
        me.bio,
        me.phone_number.as_deref().unwrap_or("-"),
        app.assistant().provider_name().unwrap_or("offline"),
        settings.provider_id,
        app.assistant().model_id(),
        policy.max_sessions,
        policy.idle_ttl.as_secs() / 60,
        app.options().call_duration_policy
    )
}

#[cfg(test)]
mod tests {
    use mechat_storage::{ConversationId, ConversationStore, mock_storage};

    use super::*;

    #[test]
    fn clock_uses_hours_and_minutes() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(13 * 3_600 + 5 * 60 + 59), "13:05");
        assert_eq!(format_clock(86_400 + 60), "00:01");
    }

    #[test]
    fn previews_follow_message_kind() {
        let store = mock_storage(100_000);
        let preview_of = |raw: &str| {
            preview(store.get_conversation(&ConversationId::new(raw)).unwrap())
        };

        assert_eq!(preview_of("c2"), "Yes! See you at 1pm.");
        assert_eq!(preview_of("c3"), "Sent a image");
        assert_eq!(preview_of("c4"), "Start a conversation");
    }

    #[test]
    fn unread_badge_only_when_positive() {
        let store = mock_storage(100_000);
        let row = |raw: &str| {
            chat_row(store.get_conversation(&ConversationId::new(raw)).unwrap(), false)
        };

        assert!(row("c3").ends_with("(1)"));
        assert!(!row("c2").contains('('));
    }
}
