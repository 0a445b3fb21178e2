use std::collections::HashMap;

/// One parsed protocol frame. Every field that may be missing on the wire is
/// an `Option`; an empty tag value is a present key with `None`, which is not
/// the same thing as an absent key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedMessage {
    pub tags: HashMap<String, Option<String>>,
    pub source: Option<Source>,
    pub command: Option<Command>,
    pub params: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Source {
    pub nick: Option<String>,
    pub host: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub kind: String,
    pub channel: Option<String>,
    pub ack: Option<String>,
}

impl ParsedMessage {
    /// Non-empty value of a tag, if the tag is present and carries one.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .get(key)
            .and_then(|value| value.as_deref())
            .filter(|value| !value.is_empty())
    }
}

/// Parses one raw frame into its parts. Never fails: malformed input yields a
/// best-effort partial structure with absent fields.
pub fn parse(frame: &str) -> ParsedMessage {
    let mut message = ParsedMessage::default();
    let mut rest = frame;

    // Tag block: "@key=value;key2;key3=" up to the first space.
    if let Some(stripped) = rest.strip_prefix('@') {
        let (block, remainder) = match stripped.find(' ') {
            Some(idx) => (&stripped[..idx], &stripped[idx + 1..]),
            None => (stripped, ""),
        };
        message.tags = parse_tags(block);
        rest = remainder;
    }

    // Source block: ":nick!host" or ":host" up to the next space.
    if let Some(stripped) = rest.strip_prefix(':') {
        let (block, remainder) = match stripped.find(' ') {
            Some(idx) => (&stripped[..idx], &stripped[idx + 1..]),
            None => (stripped, ""),
        };
        message.source = parse_source(block);
        rest = remainder;
    }

    // Command region runs to the params colon (or end of frame). The params
    // component is not reliably space-delimited, so jump straight to the colon.
    let command_end = rest.find(':').unwrap_or(rest.len());
    let mut tokens = rest[..command_end].trim().split(' ').filter(|t| !t.is_empty());
    if let Some(kind) = tokens.next() {
        message.command = Some(Command {
            kind: kind.to_owned(),
            channel: tokens.next().map(ToOwned::to_owned),
            ack: tokens.next().map(ToOwned::to_owned),
        });
    }

    if command_end < rest.len() {
        let params = rest[command_end + 1..].trim();
        if !params.is_empty() {
            message.params = Some(params.to_owned());
        }
    }

    message
}

fn parse_tags(block: &str) -> HashMap<String, Option<String>> {
    let mut tags = HashMap::new();
    for pair in block.split(';') {
        if pair.is_empty() {
            continue;
        }
        match pair.split_once('=') {
            // Empty value means the tag is present but carries no value.
            Some((key, "")) => {
                tags.insert(key.to_owned(), None);
            }
            Some((key, value)) => {
                tags.insert(key.to_owned(), Some(value.to_owned()));
            }
            None => {
                tags.insert(pair.to_owned(), None);
            }
        }
    }
    tags
}

fn parse_source(block: &str) -> Option<Source> {
    let source = match block.split_once('!') {
        Some((nick, host)) => Source {
            nick: Some(nick.to_owned()).filter(|v| !v.is_empty()),
            host: Some(host.to_owned()).filter(|v| !v.is_empty()),
        },
        None => Source {
            nick: None,
            host: Some(block.to_owned()).filter(|v| !v.is_empty()),
        },
    };
    if source.nick.is_none() && source.host.is_none() {
        return None;
    }
    Some(source)
}

/// Decodes the IRC tag-value escapes (`\s`, `\:`, `\r`, `\n`, `\\`). Used when
/// surfacing the reply-context body, which arrives space-escaped.
pub fn decode_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('s') => out.push(' '),
            Some(':') => out.push(';'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
