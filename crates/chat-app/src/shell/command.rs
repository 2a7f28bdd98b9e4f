use mechat_storage::{CallKind, ConversationId, StorageError, StoryId, UserId};
use snafu::{OptionExt, ResultExt, Snafu};

use crate::navigation::ViewTab;

pub const HELP: &str = "\
/chats /status /calls /settings   switch tab
/open <conversation>              open a conversation
/back                             return to the list
/search <text>                    filter the chat list (empty clears)
/call <user> [audio|video]        start a call
/end /mute /camera                control the open call
/story <id> /next /prev /close    view status updates
/file <name> /image <name>        send an attachment
/voice                            send a voice note
/help /quit
anything else                     send as a message";

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Tab(ViewTab),
    Open(ConversationId),
    Back,
    Search(String),
    Call { user_id: UserId, kind: CallKind },
    EndCall,
    Mute,
    Camera,
    Story(StoryId),
    NextStory,
    PrevStory,
    CloseStory,
    File(String),
    Image(String),
    Voice,
    Help,
    Quit,
    Send(String),
    Empty,
}

pub type CommandResult<T> = Result<T, CommandError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CommandError {
    #[snafu(display("unknown command '/{name}', try /help"))]
    UnknownCommand { stage: &'static str, name: String },
    #[snafu(display("/{command} needs an argument"))]
    MissingArgument {
        stage: &'static str,
        command: &'static str,
    },
    #[snafu(display("unknown call type '{raw}', expected audio or video"))]
    UnknownCallKind { stage: &'static str, raw: String },
    #[snafu(display("invalid id on `{stage}`: {source}"))]
    InvalidId {
        stage: &'static str,
        source: StorageError,
    },
}

impl Command {
    pub fn parse(line: &str) -> CommandResult<Self> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Self::Empty);
        }

        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Self::Send(line.to_string()));
        };

        let (name, argument) = match rest.split_once(char::is_whitespace) {
            Some((name, argument)) => (name, argument.trim()),
            None => (rest, ""),
        };

        let command = match name {
            "chats" => Self::Tab(ViewTab::Chats),
            "status" => Self::Tab(ViewTab::Status),
            "calls" => Self::Tab(ViewTab::Calls),
            "settings" => Self::Tab(ViewTab::Settings),
            "open" => Self::Open(
                ConversationId::parse(required(argument, "open")?).context(InvalidIdSnafu {
                    stage: "parse-open",
                })?,
            ),
            "back" => Self::Back,
            "search" => Self::Search(argument.to_string()),
            "call" => Self::parse_call(argument)?,
            "end" => Self::EndCall,
            "mute" => Self::Mute,
            "camera" => Self::Camera,
            "story" => Self::Story(
                StoryId::parse(required(argument, "story")?).context(InvalidIdSnafu {
                    stage: "parse-story",
                })?,
            ),
            "next" => Self::NextStory,
            "prev" => Self::PrevStory,
            "close" => Self::CloseStory,
            "file" => Self::File(required(argument, "file")?.to_string()),
            "image" => Self::Image(required(argument, "image")?.to_string()),
            "voice" => Self::Voice,
            "help" => Self::Help,
            "quit" | "exit" => Self::Quit,
            _ => {
                return UnknownCommandSnafu {
                    stage: "parse-command",
                    name,
                }
                .fail();
            }
        };

        Ok(command)
    }

    fn parse_call(argument: &str) -> CommandResult<Self> {
        let mut parts = argument.split_whitespace();
        let user = parts.next().context(MissingArgumentSnafu {
            stage: "parse-call",
            command: "call",
        })?;
        let user_id = UserId::parse(user).context(InvalidIdSnafu {
            stage: "parse-call",
        })?;

        let kind = match parts.next() {
            None | Some("audio") => CallKind::Audio,
            Some("video") => CallKind::Video,
            Some(raw) => {
                return UnknownCallKindSnafu {
                    stage: "parse-call",
                    raw,
                }
                .fail();
            }
        };

        Ok(Self::Call { user_id, kind })
    }
}

fn required<'a>(argument: &'a str, command: &'static str) -> CommandResult<&'a str> {
    if argument.is_empty() {
        return MissingArgumentSnafu {
            stage: "parse-argument",
            command,
        }
        .fail();
    }

    Ok(argument)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_messages() {
        assert_eq!(
            Command::parse("  hello there ").unwrap(),
            Command::Send("hello there".to_string())
        );
        assert_eq!(Command::parse("   ").unwrap(), Command::Empty);
    }

    #[test]
    fn tabs_and_navigation() {
        assert_eq!(Command::parse("/calls").unwrap(), Command::Tab(ViewTab::Calls));
        assert_eq!(
            Command::parse("/open c2").unwrap(),
            Command::Open(ConversationId::new("c2"))
        );
        assert_eq!(Command::parse("/back").unwrap(), Command::Back);
        assert_eq!(Command::parse("/search").unwrap(), Command::Search(String::new()));
    }

    #[test]
    fn call_defaults_to_audio() {
        assert_eq!(
            Command::parse("/call u1").unwrap(),
            Command::Call {
                user_id: UserId::new("u1"),
                kind: CallKind::Audio
            }
        );
        assert_eq!(
            Command::parse("/call u2 video").unwrap(),
            Command::Call {
                user_id: UserId::new("u2"),
                kind: CallKind::Video
            }
        );
        assert!(matches!(
            Command::parse("/call u2 hologram"),
            Err(CommandError::UnknownCallKind { .. })
        ));
    }

    #[test]
    fn missing_arguments_and_unknown_commands_are_errors() {
        assert!(matches!(
            Command::parse("/open"),
            Err(CommandError::MissingArgument { command: "open", .. })
        ));
        assert!(matches!(
            Command::parse("/call"),
            Err(CommandError::MissingArgument { command: "call", .. })
        ));
        assert!(matches!(
            Command::parse("/dance"),
            Err(CommandError::UnknownCommand { .. })
        ));
    }

    #[test]
    fn attachment_names_keep_inner_spaces() {
        assert_eq!(
            Command::parse("/file quarterly report.pdf").unwrap(),
            Command::File("quarterly report.pdf".to_string())
        );
    }
}
