use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::{
    entry::{ChatEntry, Content},
    media::{pick_background, MediaClient},
};

/// Resolves a command-flagged entry into a reply line, a display mutation, or
/// a no-op. Resolution completes (including any media lookup) before the
/// entry can reach the scrollback; entries still command-flagged afterwards
/// stay suppressed.
pub struct CommandProcessor {
    enabled: HashSet<String>,
    media: Option<MediaClient>,
}

impl CommandProcessor {
    pub fn new(enabled_commands: &[String], media: Option<MediaClient>) -> Self {
        Self {
            enabled: enabled_commands
                .iter()
                .map(|name| name.trim().to_uppercase())
                .filter(|name| !name.is_empty())
                .collect(),
            media,
        }
    }

    /// Returns the text the bot should say back into the channel, if any.
    pub async fn process(&self, entry: &mut ChatEntry) -> Option<String> {
        let token = entry.command.clone()?;
        if !self.enabled.contains(&token) {
            info!(command = %token, "unrecognized chat command");
            return None;
        }
        match token.as_str() {
            "GIF" => self.media_post(entry).await,
            "HYPE" => {
                entry.content = Content::Plain(format!("{} is hyped!", entry.name));
                entry.is_alert = true;
                entry.command = None;
                None
            }
            _ => {
                info!(command = %token, "unrecognized chat command");
                None
            }
        }
    }

    async fn media_post(&self, entry: &mut ChatEntry) -> Option<String> {
        let Some(media) = &self.media else {
            warn!("no media-search key configured; GIF command will not work");
            return None;
        };

        let query = match &entry.content {
            Content::Plain(text) if !text.is_empty() => text.clone(),
            _ => {
                // User typed the bare command.
                return Some(format!(
                    "@{} -- Please enter a search query!",
                    entry.name
                ));
            }
        };

        if query.chars().all(|ch| ch.is_ascii_digit()) {
            debug!(query = %query, "media id lookup is not supported");
            return None;
        }

        let results = match media.search(&query).await {
            Ok(results) => results,
            Err(err) => {
                warn!(?err, query = %query, "media search failed");
                return None;
            }
        };
        match pick_background(&results) {
            Some(url) => {
                // The entry renders as an image post from here on.
                entry.background = Some(url.to_owned());
                entry.content = Content::Empty;
                entry.command = None;
            }
            None => info!(query = %query, "no media results for query"),
        }
        None
    }
}
