use std::fmt;

use mechat_storage::ConversationId;

/// Top-level section shown when no conversation is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ViewTab {
    #[default]
    Chats,
    Status,
    Calls,
    Settings,
}

impl ViewTab {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chats => "chats",
            Self::Status => "status",
            Self::Calls => "calls",
            Self::Settings => "settings",
        }
    }
}

impl fmt::Display for ViewTab {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Tab × active conversation. Every transition is total; the tab and the
/// active conversation change independently.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Navigation {
    tab: ViewTab,
    active_conversation: Option<ConversationId>,
    search_query: String,
}

impl Navigation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tab(&self) -> ViewTab {
        self.tab
    }

    pub fn active_conversation(&self) -> Option<&ConversationId> {
        self.active_conversation.as_ref()
    }

    pub fn is_active(&self, conversation_id: &ConversationId) -> bool {
        self.active_conversation.as_ref() == Some(conversation_id)
    }

    pub fn search_query(&self) -> &str {
        &self.search_query
    }

    pub fn set_tab(&mut self, tab: ViewTab) {
        self.tab = tab;
    }

    pub fn select(&mut self, conversation_id: ConversationId) {
        self.active_conversation = Some(conversation_id);
    }

    pub fn back(&mut self) {
        self.active_conversation = None;
    }

    pub fn set_search_query(&mut self, query: impl Into<String>) {
        self.search_query = query.into();
    }
}
