/// One displayable chat entry, built by the dispatcher from a parsed frame.
/// The presentation handle lives in the scrollback slot, not on the entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatEntry {
    pub name: String,
    /// Message id, when the relay tagged one.
    pub id: Option<String>,
    /// Reply target display name, when this entry replies to someone.
    pub host: Option<String>,
    pub content: Content,
    /// Excerpt of the message being replied to.
    pub reply_text: Option<String>,
    /// Index into the accent palette, 0 = neutral.
    pub color_bucket: usize,
    pub is_alert: bool,
    pub is_error: bool,
    /// Uppercased command token while the entry is command-flagged. The
    /// command processor clears this when the entry should render after all.
    pub command: Option<String>,
    /// Media reference rendered behind the entry.
    pub background: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Content {
    #[default]
    Empty,
    Plain(String),
    Segments(Vec<Segment>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(String),
    Emote(String),
}

impl ChatEntry {
    pub fn is_command(&self) -> bool {
        self.command.is_some()
    }

    /// Connection-level error surfaced into the scrollback.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            host: Some("twitch".to_owned()),
            content: Content::Plain(text.into()),
            is_error: true,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ChatEntry, Content};

    #[test]
    fn default_entry_is_not_a_command() {
        let entry = ChatEntry::default();
        assert!(!entry.is_command());
        assert_eq!(entry.content, Content::Empty);
        assert_eq!(entry.color_bucket, 0);
    }

    #[test]
    fn error_entries_are_flagged() {
        let entry = ChatEntry::error("ERROR: BAD CONNECTION");
        assert!(entry.is_error);
        assert!(!entry.is_alert);
        assert_eq!(entry.content, Content::Plain("ERROR: BAD CONNECTION".to_owned()));
    }
}
