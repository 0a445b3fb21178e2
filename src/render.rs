use tracing::{debug, info};

use crate::{
    colors::PALETTE,
    entry::{ChatEntry, Content, Segment},
};

/// Placeholder a renderer shows in place of a redacted reply excerpt.
pub const REDACTED_REPLY: &str = "< Message removed >";

/// Presentation collaborator for the scrollback buffer. Construction may
/// suspend (resource loading, layout); the remaining operations act on an
/// already-built handle and complete immediately.
#[allow(async_fn_in_trait)]
pub trait Renderer {
    type Handle;

    async fn construct(&self, entry: &ChatEntry) -> Self::Handle;
    /// Insert into the live display, preserving arrival order.
    fn append(&self, handle: &Self::Handle);
    fn remove(&self, handle: &Self::Handle);
    fn redact_reply(&self, handle: &Self::Handle);
}

/// Terminal renderer shipped with the binary: entries become labelled lines on
/// stdout, evictions and redactions go to the log.
pub struct TermRenderer;

pub struct TermHandle {
    label: String,
}

impl Renderer for TermRenderer {
    type Handle = TermHandle;

    async fn construct(&self, entry: &ChatEntry) -> TermHandle {
        TermHandle {
            label: entry_label(entry),
        }
    }

    fn append(&self, handle: &TermHandle) {
        println!(
            "[{}] {}",
            chrono::Local::now().format("%H:%M:%S"),
            handle.label
        );
    }

    fn remove(&self, handle: &TermHandle) {
        debug!(line = %handle.label, "scrollback entry evicted");
    }

    fn redact_reply(&self, handle: &TermHandle) {
        info!(line = %handle.label, placeholder = REDACTED_REPLY, "reply context redacted");
    }
}

/// Flattens an entry into a single display line.
pub fn entry_label(entry: &ChatEntry) -> String {
    let mut label = String::new();
    if entry.is_error {
        label.push_str("[ERROR] ");
    } else if entry.is_alert {
        label.push_str("[ALERT] ");
    } else {
        label.push_str(&entry.name);
        if let Some(host) = &entry.host {
            label.push_str(&format!(" -> {host}"));
        }
        if entry.color_bucket < PALETTE.len() {
            label.push_str(&format!(" ({})", PALETTE[entry.color_bucket]));
        }
        label.push_str(": ");
        if let Some(reply) = &entry.reply_text {
            label.push_str(&format!("(re: {reply}) "));
        }
    }

    match &entry.content {
        Content::Empty => {}
        Content::Plain(text) => label.push_str(text),
        Content::Segments(segments) => {
            for (idx, segment) in segments.iter().enumerate() {
                if idx > 0 {
                    label.push(' ');
                }
                match segment {
                    Segment::Text(text) => label.push_str(text),
                    Segment::Emote(id) => label.push_str(&format!("[emote:{id}]")),
                }
            }
        }
    }

    if let Some(url) = &entry.background {
        if !label.ends_with(' ') {
            label.push(' ');
        }
        label.push_str(&format!("[media {url}]"));
    }
    label
}
