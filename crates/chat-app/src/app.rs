use futures::StreamExt;
use mechat_llm::{AssistantClient, DialogueKey, FragmentStream, ProviderMessage};
use mechat_storage::{
    CallKind, CallLog, CallLogStore, Conversation, ConversationId, ConversationStore, Message,
    MessageKind, NewMessage, Storage, Story, StoryId, StoryStore, UserDirectory, UserId,
    assistant_user_id, unix_now_seconds,
};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::chat::{PendingReplies, PendingReply, ReplyApplied, ReplyEvent, ReplyTarget};
use crate::navigation::{Navigation, ViewTab};
use crate::overlay::{
    CallDurationPolicy, CallOverlay, CallSignal, OverlayId, StoryOverlay, StorySignal, StoryStep,
};
use crate::settings::AppSettings;

pub const VOICE_NOTE_BODY: &str = "🎤 Voice Note (0:05)";

/// Everything that reaches the application from background tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    Reply(ReplyEvent),
    Call {
        overlay: OverlayId,
        signal: CallSignal,
    },
    Story {
        overlay: OverlayId,
        signal: StorySignal,
    },
}

pub type AppEventSender = mpsc::UnboundedSender<AppEvent>;
pub type AppEventReceiver = mpsc::UnboundedReceiver<AppEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AppOptions {
    pub call_duration_policy: CallDurationPolicy,
}

impl From<&AppSettings> for AppOptions {
    fn from(settings: &AppSettings) -> Self {
        Self {
            call_duration_policy: settings.call_duration_policy,
        }
    }
}

/// Visible effect of one operation, used by the shell to decide what to redraw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppChange {
    Nothing,
    Reply { target: ReplyTarget, committed: bool },
    Call,
    Story,
    StoryClosed,
}

/// Application context: owns the store, the assistant and all transient view state.
///
/// All mutation happens on the caller's control flow; background tasks only
/// send [`AppEvent`]s which the owner feeds back through [`ChatApp::handle_event`].
pub struct ChatApp {
    store: Box<dyn Storage>,
    assistant: AssistantClient,
    navigation: Navigation,
    replies: PendingReplies,
    readers: JoinSet<()>,
    call: Option<CallOverlay>,
    story: Option<StoryOverlay>,
    options: AppOptions,
    events: AppEventSender,
    next_overlay_id: u64,
}

impl ChatApp {
    pub fn new(
        store: Box<dyn Storage>,
        assistant: AssistantClient,
        options: AppOptions,
    ) -> (Self, AppEventReceiver) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let app = Self {
            store,
            assistant,
            navigation: Navigation::new(),
            replies: PendingReplies::new(),
            readers: JoinSet::new(),
            call: None,
            story: None,
            options,
            events,
            next_overlay_id: 0,
        };

        (app, events_rx)
    }

    pub fn store(&self) -> &dyn Storage {
        self.store.as_ref()
    }

    pub fn navigation(&self) -> &Navigation {
        &self.navigation
    }

    pub fn assistant(&self) -> &AssistantClient {
        &self.assistant
    }

    pub fn options(&self) -> AppOptions {
        self.options
    }

    pub fn call(&self) -> Option<&CallOverlay> {
        self.call.as_ref()
    }

    pub fn story(&self) -> Option<&StoryOverlay> {
        self.story.as_ref()
    }

    pub fn pending_replies(&self) -> usize {
        self.replies.len()
    }

    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.navigation
            .active_conversation()
            .and_then(|conversation_id| self.store.get_conversation(conversation_id))
    }

    /// Chat list filtered by the current search query.
    pub fn visible_conversations(&self) -> Vec<&Conversation> {
        let query = self.navigation.search_query();
        self.store.search_conversations(query)
    }

    pub fn set_tab(&mut self, tab: ViewTab) {
        self.navigation.set_tab(tab);
    }

    pub fn set_search_query(&mut self, query: &str) {
        self.navigation.set_search_query(query);
    }

    /// Opens a conversation and clears its unread counter. Unknown ids are ignored.
    pub fn select_conversation(&mut self, conversation_id: &ConversationId) -> bool {
        if let Err(error) = self.store.mark_read(conversation_id) {
            tracing::debug!(
                conversation_id = %conversation_id,
                error = %error,
                "ignoring selection"
            );
            return false;
        }

        self.navigation.select(conversation_id.clone());
        true
    }

    pub fn back(&mut self) {
        self.navigation.back();
    }

    /// Sends text to the active conversation. Blank input is ignored.
    pub fn send_text(&mut self, text: &str) -> Option<Message> {
        let body = text.trim();
        if body.is_empty() {
            return None;
        }

        self.send_to_active(body, MessageKind::Text)
    }

    pub fn send_attachment(&mut self, kind: MessageKind, file_name: &str) -> Option<Message> {
        let file_name = file_name.trim();
        if file_name.is_empty() {
            return None;
        }

        self.send_to_active(&format!("Sent a file: {file_name}"), kind)
    }

    pub fn send_voice_note(&mut self) -> Option<Message> {
        self.send_to_active(VOICE_NOTE_BODY, MessageKind::Audio)
    }

    fn send_to_active(&mut self, body: &str, kind: MessageKind) -> Option<Message> {
        let conversation_id = self.navigation.active_conversation()?.clone();
        self.send_message(&conversation_id, body, kind)
    }

    /// Appends one self-authored message and, in assistant conversations,
    /// starts streaming the reply.
    pub fn send_message(
        &mut self,
        conversation_id: &ConversationId,
        body: &str,
        kind: MessageKind,
    ) -> Option<Message> {
        let history = self
            .store
            .get_conversation(conversation_id)
            .map(dialogue_history)
            .unwrap_or_default();

        let sender_id = self.store.me().id.clone();
        let message = match self.store.append_message(
            conversation_id,
            NewMessage::of_kind(sender_id, body, kind, unix_now_seconds()),
        ) {
            Ok(message) => message,
            Err(error) => {
                tracing::debug!(
                    conversation_id = %conversation_id,
                    error = %error,
                    "dropping message"
                );
                return None;
            }
        };

        let has_assistant = self
            .store
            .get_conversation(conversation_id)
            .is_some_and(|conversation| conversation.has_participant(&assistant_user_id()));
        if has_assistant {
            self.start_reply(conversation_id, body, &history);
        }

        Some(message)
    }

    fn start_reply(
        &mut self,
        conversation_id: &ConversationId,
        prompt: &str,
        history: &[ProviderMessage],
    ) {
        let reply = match PendingReply::begin(
            self.store.as_mut(),
            conversation_id,
            assistant_user_id(),
        ) {
            Ok(reply) => reply,
            Err(error) => {
                tracing::error!(
                    conversation_id = %conversation_id,
                    error = %error,
                    "failed to insert reply placeholder"
                );
                return;
            }
        };

        let target = self.replies.track(reply);
        let fragments = self.assistant.send_message(
            DialogueKey::new(conversation_id.as_str()),
            prompt,
            history,
        );

        tracing::debug!(
            conversation_id = %conversation_id,
            message_id = %target.message_id,
            "assistant reply started"
        );
        self.readers
            .spawn(forward_fragments(target, fragments, self.events.clone()));
    }

    pub fn start_call(&mut self, user_id: &UserId, kind: CallKind) -> bool {
        let Some(peer) = self.store.get_user(user_id).cloned() else {
            tracing::debug!(user_id = %user_id, "ignoring call to unknown user");
            return false;
        };

        if self.call.is_some() {
            self.end_call();
        }

        let mut call = CallOverlay::new(self.alloc_overlay_id(), peer, kind);
        call.start(&self.events);
        tracing::info!(user_id = %user_id, kind = %kind, overlay = %call.id(), "call started");
        self.call = Some(call);
        true
    }

    pub fn toggle_mute(&mut self) -> Option<bool> {
        self.call.as_mut().map(CallOverlay::toggle_mute)
    }

    pub fn toggle_camera(&mut self) -> Option<bool> {
        self.call.as_mut().and_then(CallOverlay::toggle_camera)
    }

    /// Ends the open call and records it. Returns `None` when no call is open.
    pub fn end_call(&mut self) -> Option<CallLog> {
        let call = self.call.take()?;
        let entry = call.end(self.options.call_duration_policy, unix_now_seconds());
        let log = self.store.record_call(entry);
        tracing::info!(
            user_id = %log.peer_id,
            kind = %log.kind,
            duration_secs = ?log.duration_secs,
            "call ended"
        );
        Some(log)
    }

    /// Opens the story viewer at `story_id`. Unknown ids open nothing.
    pub fn open_story(&mut self, story_id: &StoryId) -> Option<&Story> {
        let order = self
            .store
            .list_stories()
            .iter()
            .map(|story| story.id.clone())
            .collect();
        let mut overlay = StoryOverlay::new(self.alloc_overlay_id(), order, story_id)?;
        overlay.start(&self.events);
        self.story = Some(overlay);
        self.mark_viewed(story_id);

        self.store.get_story(story_id)
    }

    pub fn next_story(&mut self) -> AppChange {
        let Some(step) = self.story.as_mut().map(StoryOverlay::next) else {
            return AppChange::Nothing;
        };
        self.apply_story_step(step)
    }

    pub fn prev_story(&mut self) -> AppChange {
        let Some(step) = self.story.as_mut().map(StoryOverlay::prev) else {
            return AppChange::Nothing;
        };
        self.apply_story_step(step)
    }

    pub fn close_story(&mut self) -> bool {
        self.story.take().is_some()
    }

    pub fn handle_event(&mut self, event: AppEvent) -> AppChange {
        match event {
            AppEvent::Reply(event) => self.handle_reply_event(event),
            AppEvent::Call { overlay, signal } => {
                let events = self.events.clone();
                match self.call.as_mut() {
                    Some(call) if call.id() == overlay => {
                        if call.apply(signal, &events) {
                            AppChange::Call
                        } else {
                            AppChange::Nothing
                        }
                    }
                    _ => {
                        tracing::debug!(
                            overlay = %overlay,
                            ?signal,
                            "ignoring signal for dismissed call"
                        );
                        AppChange::Nothing
                    }
                }
            }
            AppEvent::Story { overlay, signal } => {
                let step = match self.story.as_mut() {
                    Some(story) if story.id() == overlay => story.apply(signal),
                    _ => {
                        tracing::debug!(overlay = %overlay, "ignoring signal for dismissed story");
                        return AppChange::Nothing;
                    }
                };
                self.apply_story_step(step)
            }
        }
    }

    fn handle_reply_event(&mut self, event: ReplyEvent) -> AppChange {
        match self.replies.apply(self.store.as_mut(), event) {
            Ok(Some(ReplyApplied::Updated(target))) => AppChange::Reply {
                target,
                committed: false,
            },
            Ok(Some(ReplyApplied::Committed { target, message })) => {
                while self.readers.try_join_next().is_some() {}

                let conversation_id = &target.conversation_id;
                if !self.navigation.is_active(conversation_id)
                    && let Err(error) = self.store.bump_unread(conversation_id)
                {
                    tracing::debug!(
                        conversation_id = %conversation_id,
                        error = %error,
                        "could not bump unread count"
                    );
                }
                tracing::debug!(
                    conversation_id = %conversation_id,
                    message_id = %message.id,
                    reply_len = message.body.len(),
                    "assistant reply committed"
                );
                AppChange::Reply {
                    target,
                    committed: true,
                }
            }
            Ok(None) => AppChange::Nothing,
            Err(error) => {
                tracing::error!(error = %error, "failed to apply reply event");
                AppChange::Nothing
            }
        }
    }

    fn apply_story_step(&mut self, step: StoryStep) -> AppChange {
        match step {
            StoryStep::Progressed(_) => AppChange::Story,
            StoryStep::Showing(story_id) => {
                self.mark_viewed(&story_id);
                AppChange::Story
            }
            StoryStep::Closed => {
                self.story = None;
                AppChange::StoryClosed
            }
        }
    }

    fn mark_viewed(&mut self, story_id: &StoryId) {
        if let Err(error) = self.store.mark_story_viewed(story_id) {
            tracing::debug!(story_id = %story_id, error = %error, "could not mark story viewed");
        }
    }

    fn alloc_overlay_id(&mut self) -> OverlayId {
        self.next_overlay_id = self.next_overlay_id.saturating_add(1);
        OverlayId(self.next_overlay_id)
    }
}

/// Prior text turns of a conversation as dialogue context for the assistant.
fn dialogue_history(conversation: &Conversation) -> Vec<ProviderMessage> {
    conversation
        .messages()
        .iter()
        .filter(|message| message.kind == MessageKind::Text && message.is_committed())
        .map(|message| {
            if message.is_from_me() {
                ProviderMessage::user(message.body.clone())
            } else {
                ProviderMessage::assistant(message.body.clone())
            }
        })
        .collect()
}

async fn forward_fragments(
    target: ReplyTarget,
    mut fragments: FragmentStream,
    events: AppEventSender,
) {
    while let Some(fragment) = fragments.next().await {
        if events
            .send(AppEvent::Reply(ReplyEvent::fragment(target.clone(), fragment)))
            .is_err()
        {
            return;
        }
    }

    let _ = events.send(AppEvent::Reply(ReplyEvent::finished(target)));
}
