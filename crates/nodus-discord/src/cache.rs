//! Short-lived in-memory caches owned by the bot.

use crate::models::{Channel, Guild, Message};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How long a message stays cached.
pub const DEFAULT_MESSAGE_EXPIRY: Duration = Duration::from_millis(400_000);

/// Message, channel and guild caches.
#[derive(Debug)]
pub struct BotCache {
    messages: DashMap<String, (Instant, Message)>,
    channels: DashMap<String, Channel>,
    guilds: DashMap<String, Guild>,
    message_expiry: Duration,
}

impl Default for BotCache {
    fn default() -> Self {
        Self::new(DEFAULT_MESSAGE_EXPIRY)
    }
}

impl BotCache {
    pub fn new(message_expiry: Duration) -> Self {
        Self {
            messages: DashMap::new(),
            channels: DashMap::new(),
            guilds: DashMap::new(),
            message_expiry,
        }
    }

    pub fn message_expiry(&self) -> Duration {
        self.message_expiry
    }

    pub fn insert_message(&self, message: Message) {
        self.messages
            .insert(message.id.clone(), (Instant::now(), message));
    }

    pub fn message(&self, id: &str) -> Option<Message> {
        self.messages.get(id).map(|entry| entry.1.clone())
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Drop messages older than the expiry. Returns how many were removed.
    pub fn sweep_messages(&self) -> usize {
        let now = Instant::now();
        let before = self.messages.len();
        self.messages
            .retain(|_, (inserted, _)| now.duration_since(*inserted) < self.message_expiry);
        let removed = before.saturating_sub(self.messages.len());
        if removed > 0 {
            debug!(removed, "Swept expired messages");
        }
        removed
    }

    pub fn channel(&self, id: &str) -> Option<Channel> {
        self.channels.get(id).map(|c| c.clone())
    }

    pub fn insert_channel(&self, channel: Channel) {
        self.channels.insert(channel.id.clone(), channel);
    }

    /// Replace every cached channel of a guild.
    pub fn replace_channels(&self, guild_id: &str, channels: Vec<Channel>) {
        self.channels
            .retain(|_, c| c.guild_id.as_deref() != Some(guild_id));
        for channel in channels {
            self.insert_channel(channel);
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn guild(&self, id: &str) -> Option<Guild> {
        self.guilds.get(id).map(|g| g.clone())
    }

    /// Replace the whole guild cache.
    pub fn replace_guilds(&self, guilds: Vec<Guild>) {
        self.guilds.clear();
        for guild in guilds {
            self.guilds.insert(guild.id.clone(), guild);
        }
    }

    pub fn guild_count(&self) -> usize {
        self.guilds.len()
    }

    /// Periodically sweep expired messages until `cancel` fires.
    pub fn spawn_sweeper(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);
        let period = self.message_expiry;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        match cache.upgrade() {
                            Some(cache) => {
                                cache.sweep_messages();
                            }
                            None => break,
                        }
                    }
                }
            }
        })
    }
}
