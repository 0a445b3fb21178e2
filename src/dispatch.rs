use std::collections::HashSet;

use tracing::{debug, info};

use crate::{
    colors,
    commands::CommandProcessor,
    entry::{ChatEntry, Content, Segment},
    parser::{decode_tag_value, ParsedMessage},
};

/// What a dispatched frame asks the connection loop to do. A single frame may
/// produce both a reply and a display entry (or neither).
#[derive(Debug, Default)]
pub struct Dispatched {
    /// Entry ready for the scrollback.
    pub entry: Option<ChatEntry>,
    /// Line to write back to the relay before reading further frames.
    pub reply: Option<String>,
    /// Scrollback deletion requested by a moderation frame.
    pub purge: Option<PurgeRequest>,
    /// The relay asked us to drop the connection.
    pub reconnect: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PurgeRequest {
    All,
    Matching {
        user: Option<String>,
        id: Option<String>,
    },
}

/// Routes parsed records by command type and builds chat entries for
/// chat-type records.
pub struct Dispatcher {
    ignore_users: HashSet<String>,
    commands: CommandProcessor,
}

impl Dispatcher {
    pub fn new(ignore_users: &[String], commands: CommandProcessor) -> Self {
        Self {
            ignore_users: ignore_users
                .iter()
                .map(|name| name.trim().to_lowercase())
                .filter(|name| !name.is_empty())
                .collect(),
            commands,
        }
    }

    pub async fn dispatch(&self, msg: &ParsedMessage) -> Dispatched {
        let mut out = Dispatched::default();
        // A record lacking a command type is a no-op.
        let Some(command) = &msg.command else {
            return out;
        };

        match command.kind.as_str() {
            "PING" => {
                let token = msg.params.as_deref().unwrap_or_default();
                out.reply = Some(format!("PONG :{token}"));
                debug!(token = %token, "replied to keep-alive ping");
            }
            "PRIVMSG" => {
                let Some(mut entry) = self.format_entry(msg) else {
                    return out;
                };
                if self.ignore_users.contains(&entry.name.to_lowercase()) {
                    debug!(name = %entry.name, "dropped message from ignored sender");
                    return out;
                }
                if entry.is_command() {
                    if let Some(text) = self.commands.process(&mut entry).await {
                        if let Some(channel) = &command.channel {
                            out.reply = Some(format!("PRIVMSG {channel} :{text}"));
                        }
                    }
                }
                if !entry.is_command() {
                    out.entry = Some(entry);
                }
            }
            // Moderation: a bare CLEARCHAT wipes the room, a targeted one
            // purges that user's retained messages.
            "CLEARCHAT" => {
                out.purge = Some(match &msg.params {
                    Some(user) => PurgeRequest::Matching {
                        user: Some(user.clone()),
                        id: None,
                    },
                    None => PurgeRequest::All,
                });
            }
            "CLEARMSG" => match msg.tag("target-msg-id") {
                Some(id) => {
                    out.purge = Some(PurgeRequest::Matching {
                        user: None,
                        id: Some(id.to_owned()),
                    });
                }
                None => debug!("CLEARMSG without target-msg-id tag"),
            },
            "RECONNECT" => {
                info!("relay requested a reconnect");
                out.reconnect = true;
            }
            other => debug!(command = %other, params = ?msg.params, "unhandled relay command"),
        }
        out
    }

    /// Builds a chat entry from a chat-type record: name, color bucket, reply
    /// context, command extraction, emote segmentation. Returns `None` when
    /// the record names no sender.
    fn format_entry(&self, msg: &ParsedMessage) -> Option<ChatEntry> {
        let name = msg
            .tag("display-name")
            .map(ToOwned::to_owned)
            .or_else(|| msg.source.as_ref().and_then(|source| source.nick.clone()))?;

        let mut entry = ChatEntry {
            id: msg.tag("id").map(ToOwned::to_owned),
            color_bucket: colors::bucket(
                colors::hue(msg.tag("color").unwrap_or(&name)),
                colors::PALETTE.len(),
            ),
            name,
            ..ChatEntry::default()
        };

        let mut content = msg.params.as_deref().unwrap_or_default();

        // Reply context arrives as tags; the raw content still carries the
        // leading @mention, which gets stripped and offsets the emote ranges.
        let mut reply_char_offset = 0;
        if let (Some(reply_name), Some(reply_body)) = (
            msg.tag("reply-parent-display-name"),
            msg.tag("reply-parent-msg-body"),
        ) {
            entry.host = Some(reply_name.to_owned());
            entry.reply_text = Some(decode_tag_value(reply_body));
            if let Some(space) = content.find(' ') {
                reply_char_offset = content[..space + 1].chars().count();
                content = &content[space + 1..];
            }
        }

        if let Some(rest) = content.strip_prefix('!') {
            let end = rest.find(' ').unwrap_or(rest.len());
            entry.command = Some(rest[..end].to_uppercase());
            entry.content = Content::Plain(rest.get(end + 1..).unwrap_or("").trim().to_owned());
            return Some(entry);
        }

        entry.content = match msg.tag("emotes") {
            Some(emote_tag) => segment_content(content, emote_tag, reply_char_offset),
            None => Content::Plain(content.to_owned()),
        };
        Some(entry)
    }
}

/// Splits content into text and emote-reference segments using the
/// `id:start-end[,start-end]/id:...` position tag. Ranges are
/// character-indexed relative to the unstripped content; `char_offset`
/// accounts for a removed reply mention.
fn segment_content(content: &str, emote_tag: &str, char_offset: usize) -> Content {
    let chars: Vec<char> = content.chars().collect();

    let mut ranges: Vec<(usize, usize, String)> = Vec::new();
    for group in emote_tag.split('/') {
        let Some((id, occurrences)) = group.split_once(':') else {
            continue;
        };
        if id.is_empty() {
            continue;
        }
        for occurrence in occurrences.split(',') {
            let Some((start, end)) = occurrence.split_once('-') else {
                continue;
            };
            let (Ok(start), Ok(end)) = (start.parse::<i64>(), end.parse::<i64>()) else {
                continue;
            };
            let start = start - char_offset as i64;
            let end = end - char_offset as i64;
            if start < 0 || end < start {
                continue;
            }
            ranges.push((start as usize, end as usize, id.to_owned()));
        }
    }
    if ranges.is_empty() {
        return Content::Plain(content.to_owned());
    }
    ranges.sort_by_key(|(start, _, _)| *start);
    // Sentinel tail range so the text after the last emote is emitted too.
    ranges.push((chars.len(), 0, String::new()));

    let mut segments = Vec::new();
    let mut cursor = 0usize;
    for (start, end, id) in ranges {
        let gap_end = start.min(chars.len());
        if cursor < gap_end {
            let text: String = chars[cursor..gap_end].iter().collect();
            let text = text.trim();
            if !text.is_empty() {
                segments.push(Segment::Text(text.to_owned()));
            }
        }
        if id.is_empty() {
            break;
        }
        segments.push(Segment::Emote(id));
        cursor = end.saturating_add(1);
    }
    Content::Segments(segments)
}

#[cfg(test)]
mod tests {
    use super::{segment_content, Dispatched, Dispatcher, PurgeRequest};
    use crate::commands::CommandProcessor;
    use crate::entry::{Content, Segment};
    use crate::parser::parse;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(
            &["Nightbot".to_owned()],
            CommandProcessor::new(&["GIF".to_owned(), "HYPE".to_owned()], None),
        )
    }

    async fn dispatch(line: &str) -> Dispatched {
        dispatcher().dispatch(&parse(line)).await
    }

    #[tokio::test]
    async fn ping_yields_an_immediate_pong() {
        let out = dispatch("PING :tmi.twitch.tv").await;
        assert_eq!(out.reply.as_deref(), Some("PONG :tmi.twitch.tv"));
        assert!(out.entry.is_none());
    }

    #[tokio::test]
    async fn chat_record_becomes_an_entry() {
        let out = dispatch(
            "@id=123;display-name=Foo;color=#FF0000 :foo!foo@x PRIVMSG #ch :hello world",
        )
        .await;
        let entry = out.entry.expect("entry");
        assert_eq!(entry.name, "Foo");
        assert_eq!(entry.id.as_deref(), Some("123"));
        assert_eq!(entry.content, Content::Plain("hello world".to_owned()));
        // Pure red sits in the first chromatic bucket.
        assert_eq!(entry.color_bucket, 1);
    }

    #[tokio::test]
    async fn name_falls_back_to_source_nick() {
        let out = dispatch(":foo!foo@x PRIVMSG #ch :hi").await;
        assert_eq!(out.entry.expect("entry").name, "foo");
    }

    #[tokio::test]
    async fn nameless_record_is_dropped() {
        let out = dispatch(":tmi.twitch.tv PRIVMSG #ch :hi").await;
        assert!(out.entry.is_none());
    }

    #[tokio::test]
    async fn ignored_senders_are_dropped_case_insensitively() {
        let out = dispatch("@display-name=NIGHTBOT :n!n@x PRIVMSG #ch :!gif spam").await;
        assert!(out.entry.is_none());
        assert!(out.reply.is_none());
    }

    #[tokio::test]
    async fn color_tag_beats_name_hash() {
        let explicit = dispatch("@display-name=Foo;color=#0000FF :foo!foo@x PRIVMSG #ch :hi")
            .await
            .entry
            .expect("entry");
        let hashed = dispatch("@display-name=Foo :foo!foo@x PRIVMSG #ch :hi")
            .await
            .entry
            .expect("entry");
        assert_eq!(explicit.color_bucket, 9);
        assert_ne!(explicit.color_bucket, hashed.color_bucket);
    }

    #[tokio::test]
    async fn reply_tags_set_host_and_strip_the_mention() {
        let out = dispatch(
            "@display-name=Foo;reply-parent-display-name=Bar;reply-parent-msg-body=hello\\sthere \
             :foo!foo@x PRIVMSG #ch :@Bar yes indeed",
        )
        .await;
        let entry = out.entry.expect("entry");
        assert_eq!(entry.host.as_deref(), Some("Bar"));
        assert_eq!(entry.reply_text.as_deref(), Some("hello there"));
        assert_eq!(entry.content, Content::Plain("yes indeed".to_owned()));
    }

    #[tokio::test]
    async fn command_sigil_extracts_an_uppercased_token() {
        let out = dispatch("@display-name=Foo :foo!foo@x PRIVMSG #ch :!dance fast  ").await;
        // Unrecognized command: suppressed, no reply.
        assert!(out.entry.is_none());
        assert!(out.reply.is_none());
    }

    #[tokio::test]
    async fn alert_command_produces_a_displayable_alert() {
        let out = dispatch("@display-name=Foo :foo!foo@x PRIVMSG #ch :!hype").await;
        let entry = out.entry.expect("entry");
        assert!(entry.is_alert);
        assert!(!entry.is_command());
        assert_eq!(entry.content, Content::Plain("Foo is hyped!".to_owned()));
    }

    #[tokio::test]
    async fn empty_gif_query_replies_into_the_channel() {
        let dispatcher = Dispatcher::new(
            &[],
            CommandProcessor::new(
                &["GIF".to_owned()],
                Some(crate::media::MediaClient::new(
                    "key".to_owned(),
                    "test".to_owned(),
                )),
            ),
        );
        let out = dispatcher
            .dispatch(&parse("@display-name=Foo :foo!foo@x PRIVMSG #ch :!gif"))
            .await;
        assert_eq!(
            out.reply.as_deref(),
            Some("PRIVMSG #ch :@Foo -- Please enter a search query!")
        );
        assert!(out.entry.is_none());
    }

    #[tokio::test]
    async fn clearchat_purges_by_user_or_entirely() {
        let targeted = dispatch(":tmi.twitch.tv CLEARCHAT #ch :baduser").await;
        assert_eq!(
            targeted.purge,
            Some(PurgeRequest::Matching {
                user: Some("baduser".to_owned()),
                id: None,
            })
        );

        let wipe = dispatch(":tmi.twitch.tv CLEARCHAT #ch").await;
        assert_eq!(wipe.purge, Some(PurgeRequest::All));
    }

    #[tokio::test]
    async fn clearmsg_purges_by_message_id() {
        let out = dispatch("@target-msg-id=abc-123 :tmi.twitch.tv CLEARMSG #ch :the text").await;
        assert_eq!(
            out.purge,
            Some(PurgeRequest::Matching {
                user: None,
                id: Some("abc-123".to_owned()),
            })
        );
    }

    #[tokio::test]
    async fn reconnect_command_requests_a_socket_close() {
        let out = dispatch(":tmi.twitch.tv RECONNECT").await;
        assert!(out.reconnect);
    }

    #[tokio::test]
    async fn record_without_command_is_a_noop() {
        let out = dispatch("").await;
        assert!(out.entry.is_none() && out.reply.is_none() && out.purge.is_none());
        assert!(!out.reconnect);
    }

    #[test]
    fn segments_single_emote_without_reemitting_its_text() {
        let content = segment_content("hello world", "25:6-10", 0);
        assert_eq!(
            content,
            Content::Segments(vec![
                Segment::Text("hello".to_owned()),
                Segment::Emote("25".to_owned()),
            ])
        );
    }

    #[test]
    fn segments_interleave_text_and_emotes_in_order() {
        // "Kappa" at 0-4 and 12-16, text in between and after.
        let content = segment_content("Kappa hello Kappa bye", "25:0-4,12-16", 0);
        assert_eq!(
            content,
            Content::Segments(vec![
                Segment::Emote("25".to_owned()),
                Segment::Text("hello".to_owned()),
                Segment::Emote("25".to_owned()),
                Segment::Text("bye".to_owned()),
            ])
        );
    }

    #[test]
    fn segment_ranges_account_for_a_stripped_reply_mention() {
        // Original content "@Bar Kappa hi" with the emote at 5-9; after the
        // mention strip the range applies at 0-4.
        let content = segment_content("Kappa hi", "25:5-9", 5);
        assert_eq!(
            content,
            Content::Segments(vec![
                Segment::Emote("25".to_owned()),
                Segment::Text("hi".to_owned()),
            ])
        );
    }

    #[test]
    fn emote_only_message_has_no_text_segments() {
        let content = segment_content("Kappa", "25:0-4", 0);
        assert_eq!(content, Content::Segments(vec![Segment::Emote("25".to_owned())]));
    }

    #[test]
    fn unparsable_emote_tag_leaves_content_plain() {
        let content = segment_content("hello", "garbage", 0);
        assert_eq!(content, Content::Plain("hello".to_owned()));
    }

    #[test]
    fn emote_ranges_are_character_indexed() {
        // Multibyte text before the emote; range counts characters, not bytes.
        let content = segment_content("héllo Kappa", "25:6-10", 0);
        assert_eq!(
            content,
            Content::Segments(vec![
                Segment::Text("héllo".to_owned()),
                Segment::Emote("25".to_owned()),
            ])
        );
    }
}
