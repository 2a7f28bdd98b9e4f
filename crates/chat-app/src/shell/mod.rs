/// Input line parsing.
pub mod command;
/// Text projections of the application state.
pub mod render;

use mechat_storage::{
    CallLogStore, Conversation, ConversationStore, Message, MessageKind, UserDirectory,
};
use snafu::{ResultExt, Snafu};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::app::{AppChange, AppEventReceiver, ChatApp};
use crate::chat::ReplyTarget;
use crate::navigation::ViewTab;
use crate::settings::AppSettings;
use command::{Command, HELP};

pub type ShellResult<T> = Result<T, ShellError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ShellError {
    #[snafu(display("failed to read input on `{stage}`: {source}"))]
    ReadInput {
        stage: &'static str,
        source: std::io::Error,
    },
    #[snafu(display("failed to write output on `{stage}`: {source}"))]
    WriteOutput {
        stage: &'static str,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Line-driven front end: reads commands, applies them to the app, and prints
/// the affected projection after every change.
pub struct Shell {
    app: ChatApp,
    settings: AppSettings,
}

impl Shell {
    pub fn new(app: ChatApp, settings: AppSettings) -> Self {
        Self { app, settings }
    }

    pub fn app(&self) -> &ChatApp {
        &self.app
    }

    /// Runs until `/quit`, or until input ends and no reply is still streaming.
    pub async fn run<R, W>(
        &mut self,
        mut events: AppEventReceiver,
        input: R,
        mut output: W,
    ) -> ShellResult<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();
        let mut input_open = true;

        write_block(&mut output, &render::chat_list(&self.app)).await?;

        loop {
            if !input_open && self.app.pending_replies() == 0 {
                break;
            }

            tokio::select! {
                line = lines.next_line(), if input_open => {
                    match line.context(ReadInputSnafu { stage: "read-line" })? {
                        Some(line) => {
                            let reaction = self.execute(&line);
                            write_block(&mut output, &reaction.text).await?;
                            if reaction.flow == Flow::Quit {
                                break;
                            }
                        }
                        None => {
                            tracing::debug!("input closed");
                            input_open = false;
                        }
                    }
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    let change = self.app.handle_event(event);
                    let text = self.render_change(change);
                    write_raw(&mut output, &text).await?;
                }
            }
        }

        output
            .flush()
            .await
            .context(WriteOutputSnafu { stage: "flush" })?;
        Ok(())
    }

    fn execute(&mut self, line: &str) -> Reaction {
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(error) => return Reaction::show(error.to_string()),
        };

        match command {
            Command::Empty => Reaction::silent(),
            Command::Help => Reaction::show(HELP),
            Command::Quit => Reaction::quit(),
            Command::Tab(tab) => {
                self.app.set_tab(tab);
                Reaction::show(self.render_tab(tab))
            }
            Command::Open(conversation_id) => {
                if !self.app.select_conversation(&conversation_id) {
                    return Reaction::show(format!("no conversation '{conversation_id}'"));
                }
                Reaction::show(self.render_active())
            }
            Command::Back => {
                self.app.back();
                Reaction::show(render::chat_list(&self.app))
            }
            Command::Search(query) => {
                self.app.set_search_query(&query);
                Reaction::show(render::chat_list(&self.app))
            }
            Command::Call { user_id, kind } => {
                let replaced = self.app.call().is_some();
                if !self.app.start_call(&user_id, kind) {
                    return Reaction::show(format!("no user '{user_id}'"));
                }
                let mut text = String::new();
                if replaced && let Some(log) = self.app.store().list_call_logs().first() {
                    text.push_str("ended previous call\n");
                    text.push_str(&render::call_log_line(&self.app, log));
                    text.push('\n');
                }
                text.push_str(&self.render_call());
                Reaction::show(text)
            }
            Command::EndCall => match self.app.end_call() {
                Some(log) => Reaction::show(format!(
                    "call ended\n{}",
                    render::call_log_line(&self.app, &log)
                )),
                None => Reaction::show("no call in progress"),
            },
            Command::Mute => match self.app.toggle_mute() {
                Some(_) => Reaction::show(self.render_call()),
                None => Reaction::show("no call in progress"),
            },
            Command::Camera => match self.app.toggle_camera() {
                Some(_) => Reaction::show(self.render_call()),
                None if self.app.call().is_some() => {
                    Reaction::show("camera is only available on video calls")
                }
                None => Reaction::show("no call in progress"),
            },
            Command::Story(story_id) => {
                if self.app.open_story(&story_id).is_none() {
                    return Reaction::show(format!("no story '{story_id}'"));
                }
                Reaction::show(self.render_story())
            }
            Command::NextStory => {
                let change = self.app.next_story();
                Reaction::show(self.render_story_change(change))
            }
            Command::PrevStory => {
                let change = self.app.prev_story();
                Reaction::show(self.render_story_change(change))
            }
            Command::CloseStory => {
                if self.app.close_story() {
                    Reaction::show("story closed")
                } else {
                    Reaction::show("no story open")
                }
            }
            Command::File(name) => self.send(|app| app.send_attachment(MessageKind::File, &name)),
            Command::Image(name) => self.send(|app| app.send_attachment(MessageKind::Image, &name)),
            Command::Voice => self.send(ChatApp::send_voice_note),
            Command::Send(text) => self.send(|app| app.send_text(&text)),
        }
    }

    fn send<F>(&mut self, send: F) -> Reaction
    where
        F: FnOnce(&mut ChatApp) -> Option<Message>,
    {
        if self.app.navigation().active_conversation().is_none() {
            return Reaction::show("open a conversation first (/open <id>)");
        }

        match send(&mut self.app) {
            Some(_) => Reaction::show(self.render_active()),
            None => Reaction::silent(),
        }
    }

    fn render_tab(&self, tab: ViewTab) -> String {
        match tab {
            ViewTab::Chats => render::chat_list(&self.app),
            ViewTab::Status => render::status_list(&self.app),
            ViewTab::Calls => render::call_logs(&self.app),
            ViewTab::Settings => render::settings_view(&self.app, &self.settings),
        }
    }

    fn render_active(&self) -> String {
        self.app
            .active_conversation()
            .map(|conversation| render::transcript(&self.app, conversation))
            .unwrap_or_else(|| render::chat_list(&self.app))
    }

    fn render_call(&self) -> String {
        self.app.call().map(render::call_status).unwrap_or_default()
    }

    fn render_story(&self) -> String {
        self.app
            .story()
            .map(|story| render::story_progress(&self.app, story))
            .unwrap_or_default()
    }

    fn render_story_change(&self, change: AppChange) -> String {
        match change {
            AppChange::StoryClosed => "story closed".to_string(),
            AppChange::Nothing => "no story open".to_string(),
            _ => self.render_story(),
        }
    }

    /// Output for a background event. Streaming text and timers redraw the
    /// current line in place; completed replies end it.
    fn render_change(&self, change: AppChange) -> String {
        match change {
            AppChange::Nothing => String::new(),
            AppChange::Reply { target, committed } => self.render_reply(&target, committed),
            AppChange::Call => format!("\r{}", self.render_call()),
            AppChange::Story => {
                // Only redraw on whole steps of the bar to keep output quiet.
                match self.app.story() {
                    Some(story) if story.progress() % 5 == 0 => {
                        format!("\r{}", self.render_story())
                    }
                    _ => String::new(),
                }
            }
            AppChange::StoryClosed => "\rstory closed\n".to_string(),
        }
    }

    fn render_reply(&self, target: &ReplyTarget, committed: bool) -> String {
        if !self.app.navigation().is_active(&target.conversation_id) {
            if !committed {
                return String::new();
            }
            let name = self
                .app
                .store()
                .get_conversation(&target.conversation_id)
                .map_or(target.conversation_id.as_str(), Conversation::display_name);
            return format!("new message in {name}\n");
        }

        let Some(message) = self
            .app
            .store()
            .get_conversation(&target.conversation_id)
            .and_then(|conversation| conversation.message(&target.message_id))
        else {
            return String::new();
        };

        let sender = self
            .app
            .store()
            .get_user(&message.sender_id)
            .map_or(message.sender_id.as_str(), |user| user.name.as_str());
        let line = format!("\r{sender}: {}", message.body);
        if committed { line + "\n" } else { line }
    }
}

struct Reaction {
    text: String,
    flow: Flow,
}

impl Reaction {
    fn show(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            flow: Flow::Continue,
        }
    }

    fn silent() -> Self {
        Self::show(String::new())
    }

    fn quit() -> Self {
        Self {
            text: String::new(),
            flow: Flow::Quit,
        }
    }
}

async fn write_block<W>(output: &mut W, text: &str) -> ShellResult<()>
where
    W: AsyncWrite + Unpin,
{
    if text.is_empty() {
        return Ok(());
    }

    write_raw(output, &format!("{text}\n")).await
}

async fn write_raw<W>(output: &mut W, text: &str) -> ShellResult<()>
where
    W: AsyncWrite + Unpin,
{
    if text.is_empty() {
        return Ok(());
    }

    output
        .write_all(text.as_bytes())
        .await
        .context(WriteOutputSnafu { stage: "write" })?;
    output
        .flush()
        .await
        .context(WriteOutputSnafu { stage: "flush" })
}
