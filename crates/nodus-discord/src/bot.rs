//! The bot: owner of the REST client, caches, event bus and gateway session.

use crate::cache::BotCache;
use crate::collector::{Collector, CollectorOptions};
use crate::error::DiscordError;
use crate::events::{EventBus, EventKind, GatewayEvent, ListenerId};
use crate::gateway::{GatewayConfig, GatewaySession};
use crate::models::{Channel, Guild, Interaction, Message, User};
use crate::rest::{RestClient, ScriptRunner, TaskRunner};
use crate::Result;
use nodus_core::config::DiscordConfig;
use nodus_tickrate::{ScriptCatalog, TickrateClient};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A chat bot session.
#[derive(Debug)]
pub struct Bot {
    config: DiscordConfig,
    rest: RestClient,
    cache: Arc<BotCache>,
    bus: EventBus,
    user: RwLock<Option<User>>,
    gateway: Mutex<Option<GatewaySession>>,
    cache_listener: Mutex<Option<ListenerId>>,
    sweeper: CancellationToken,
    sweeper_started: Mutex<bool>,
}

impl Bot {
    /// Create a bot whose REST calls go through `runner`.
    pub fn new(config: DiscordConfig, runner: Arc<dyn TaskRunner>) -> Self {
        let rest = RestClient::new(runner, config.token.clone(), config.api_script.clone());
        let cache = Arc::new(BotCache::new(Duration::from_millis(config.message_expiry_ms)));
        Self {
            config,
            rest,
            cache,
            bus: EventBus::new(),
            user: RwLock::new(None),
            gateway: Mutex::new(None),
            cache_listener: Mutex::new(None),
            sweeper: CancellationToken::new(),
            sweeper_started: Mutex::new(false),
        }
    }

    /// Create a bot that tunnels REST through the task service.
    pub fn from_tickrate(config: DiscordConfig, client: TickrateClient, catalog: ScriptCatalog) -> Self {
        Self::new(config, Arc::new(ScriptRunner::new(client, catalog)))
    }

    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    pub fn cache(&self) -> &Arc<BotCache> {
        &self.cache
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The logged-in user, after [`Bot::login`].
    pub fn user(&self) -> Option<User> {
        self.user.read().clone()
    }

    pub fn gateway(&self) -> Option<GatewaySession> {
        self.gateway.lock().clone()
    }

    /// Register an event handler.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&GatewayEvent) + Send + Sync + 'static,
    {
        self.bus.on(kind, handler)
    }

    /// Fetch the bot user and emit `Ready`.
    pub async fn login(&self) -> Result<User> {
        if self.config.token.is_empty() {
            return Err(DiscordError::Auth("bot token is empty".to_string()));
        }

        let value = self.rest.get("/users/@me").await?;
        let user: User = serde_json::from_value(value)?;
        if user.id.is_empty() {
            return Err(DiscordError::InvalidResponse("user has no id".to_string()));
        }

        info!(user = %user.display_name(), id = %user.id, "Logged in");
        *self.user.write() = Some(user.clone());
        self.bus.emit(&GatewayEvent::Ready(user.clone()));
        Ok(user)
    }

    /// Ask the platform where the gateway lives.
    pub async fn gateway_url(&self) -> Result<String> {
        let value = self.rest.get("/gateway").await?;
        value
            .get("url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| DiscordError::InvalidResponse("gateway response has no url".to_string()))
    }

    /// Open the gateway session, replacing any previous one.
    pub async fn connect_gateway(&self) -> Result<GatewaySession> {
        let url = self.gateway_url().await?;
        self.start_gateway(GatewayConfig::from_discord(&self.config, url))
    }

    /// Open a session with explicit parameters.
    pub fn start_gateway(&self, config: GatewayConfig) -> Result<GatewaySession> {
        self.install_cache_listener();
        self.start_sweeper();

        let session = GatewaySession::connect(config, self.bus.clone())?;
        if let Some(old) = self.gateway.lock().replace(session.clone()) {
            debug!("Replacing previous gateway session");
            old.shutdown();
        }
        Ok(session)
    }

    fn install_cache_listener(&self) {
        let mut listener = self.cache_listener.lock();
        if listener.is_some() {
            return;
        }
        let cache = Arc::downgrade(&self.cache);
        *listener = Some(self.bus.on(EventKind::MessageCreate, move |event| {
            if let (GatewayEvent::MessageCreate(message), Some(cache)) = (event, cache.upgrade()) {
                cache.insert_message(message.clone());
            }
        }));
    }

    fn start_sweeper(&self) {
        let mut started = self.sweeper_started.lock();
        if !*started {
            self.cache.spawn_sweeper(self.sweeper.clone());
            *started = true;
        }
    }

    /// Fetch the guilds the bot is in and replace the guild cache.
    pub async fn fetch_guilds(&self) -> Result<Vec<Guild>> {
        let value = self.rest.get("/users/@me/guilds").await?;
        let guilds: Vec<Guild> = serde_json::from_value(value)?;
        self.cache.replace_guilds(guilds.clone());
        Ok(guilds)
    }

    /// Fetch a guild's channels and replace them in the cache.
    pub async fn fetch_channels(&self, guild_id: &str) -> Result<Vec<Channel>> {
        let value = self.rest.get(&format!("/guilds/{}/channels", guild_id)).await?;
        let channels: Vec<Channel> = serde_json::from_value(value)?;
        self.cache.replace_channels(guild_id, channels.clone());
        Ok(channels)
    }

    /// Channel by id, from the cache when present.
    pub async fn fetch_channel(&self, channel_id: &str) -> Result<Channel> {
        if let Some(channel) = self.cache.channel(channel_id) {
            return Ok(channel);
        }
        let channel = Channel::from_value(self.rest.get(&format!("/channels/{}", channel_id)).await?)?;
        self.cache.insert_channel(channel.clone());
        Ok(channel)
    }

    /// Collect messages posted in one channel.
    pub fn create_message_collector(
        &self,
        channel_id: impl Into<String>,
        options: CollectorOptions<Message>,
    ) -> Collector<Message> {
        let channel_id = channel_id.into();
        let options = options.and_filter(move |m: &Message| m.channel_id == channel_id);
        Collector::subscribe(&self.bus, options)
    }

    /// Collect component interactions on one message.
    pub fn create_component_collector(
        &self,
        message_id: impl Into<String>,
        options: CollectorOptions<Interaction>,
    ) -> Collector<Interaction> {
        let message_id = message_id.into();
        let options = options.and_filter(move |i: &Interaction| {
            i.message.as_ref().map_or(false, |m| m.id == message_id)
        });
        Collector::subscribe(&self.bus, options)
    }

    /// Stop the gateway session and background tasks.
    pub fn shutdown(&self) {
        if let Some(gateway) = self.gateway.lock().take() {
            gateway.shutdown();
        }
        if let Some(id) = self.cache_listener.lock().take() {
            self.bus.off(id);
        }
        self.sweeper.cancel();
        info!("Bot shut down");
    }
}

impl Drop for Bot {
    fn drop(&mut self) {
        self.sweeper.cancel();
        if let Some(gateway) = self.gateway.get_mut().take() {
            gateway.shutdown();
        }
    }
}
