//! Domain objects built from gateway and REST payloads.
//!
//! Every object is constructed fresh from the payload it arrived in. The
//! action methods take the [`RestClient`] explicitly so nothing here holds
//! on to connection state.

use crate::rest::{encode_path_segment, RestClient};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Interaction callback: reply with a message.
pub const CALLBACK_CHANNEL_MESSAGE: u8 = 4;
/// Interaction callback: acknowledge a component, update later.
pub const CALLBACK_DEFERRED_UPDATE: u8 = 6;

/// A platform user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub id: String,
    pub username: String,
    pub global_name: Option<String>,
    pub discriminator: Option<String>,
    pub avatar: Option<String>,
    pub bot: bool,
}

impl User {
    /// Name to show in logs: global name when set, otherwise username.
    pub fn display_name(&self) -> &str {
        self.global_name.as_deref().unwrap_or(&self.username)
    }
}

/// A guild member wrapper as found on interactions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Member {
    pub user: Option<User>,
    pub nick: Option<String>,
}

/// Message body for sends, edits and replies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<Value>,
}

impl MessageContent {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn with_embed(mut self, embed: Value) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn with_component(mut self, component: Value) -> Self {
        self.components.push(component);
        self
    }

    fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl From<&str> for MessageContent {
    fn from(content: &str) -> Self {
        Self::text(content)
    }
}

impl From<String> for MessageContent {
    fn from(content: String) -> Self {
        Self::text(content)
    }
}

/// A chat message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    pub id: String,
    pub channel_id: String,
    pub guild_id: Option<String>,
    pub author: User,
    pub content: String,
    pub timestamp: Option<String>,
    pub embeds: Vec<Value>,
    pub components: Vec<Value>,
}

impl Message {
    /// Parse a payload.
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Creation time from the payload timestamp.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc))
    }

    fn endpoint(&self) -> String {
        format!("/channels/{}/messages/{}", self.channel_id, self.id)
    }

    /// Replace the message content.
    pub async fn edit(&self, rest: &RestClient, content: impl Into<MessageContent>) -> Result<Message> {
        let body = content.into().to_value();
        Message::from_value(rest.patch(&self.endpoint(), body).await?)
    }

    pub async fn delete(&self, rest: &RestClient) -> Result<()> {
        rest.delete(&self.endpoint()).await?;
        Ok(())
    }

    /// Add a reaction as the bot user.
    pub async fn react(&self, rest: &RestClient, emoji: &str) -> Result<()> {
        let endpoint = format!("{}/reactions/{}/@me", self.endpoint(), encode_path_segment(emoji));
        rest.put(&endpoint).await?;
        Ok(())
    }

    /// Reply in the same channel, referencing this message.
    pub async fn reply(&self, rest: &RestClient, content: impl Into<MessageContent>) -> Result<Message> {
        let mut body = content.into().to_value();
        body["message_reference"] = json!({ "message_id": self.id });
        let endpoint = format!("/channels/{}/messages", self.channel_id);
        Message::from_value(rest.post(&endpoint, body).await?)
    }
}

/// A component or command interaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Interaction {
    pub id: String,
    pub application_id: String,
    #[serde(rename = "type")]
    pub kind: u8,
    pub token: String,
    pub channel_id: Option<String>,
    pub guild_id: Option<String>,
    pub member: Option<Member>,
    pub user: Option<User>,
    pub data: Value,
    /// Message the component was attached to.
    pub message: Option<Message>,
}

impl Interaction {
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Invoking user, from the member in guilds or the user in DMs.
    pub fn user(&self) -> Option<&User> {
        self.member
            .as_ref()
            .and_then(|m| m.user.as_ref())
            .or(self.user.as_ref())
    }

    /// `custom_id` of the clicked component, if any.
    pub fn custom_id(&self) -> Option<&str> {
        self.data.get("custom_id").and_then(Value::as_str)
    }

    fn callback_endpoint(&self) -> String {
        format!("/interactions/{}/{}/callback", self.id, self.token)
    }

    pub async fn reply(&self, rest: &RestClient, content: impl Into<MessageContent>) -> Result<()> {
        let body = json!({
            "type": CALLBACK_CHANNEL_MESSAGE,
            "data": content.into().to_value(),
        });
        rest.post(&self.callback_endpoint(), body).await?;
        Ok(())
    }

    pub async fn defer(&self, rest: &RestClient) -> Result<()> {
        let body = json!({ "type": CALLBACK_DEFERRED_UPDATE });
        rest.post(&self.callback_endpoint(), body).await?;
        Ok(())
    }

    /// Edit the message the component belongs to.
    pub async fn update(&self, rest: &RestClient, content: impl Into<MessageContent>) -> Result<Option<Message>> {
        match &self.message {
            Some(message) => message.edit(rest, content).await.map(Some),
            None => Ok(None),
        }
    }
}

/// A channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Channel {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: u8,
    pub guild_id: Option<String>,
    pub name: Option<String>,
    pub topic: Option<String>,
}

impl Channel {
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub async fn send(&self, rest: &RestClient, content: impl Into<MessageContent>) -> Result<Message> {
        let endpoint = format!("/channels/{}/messages", self.id);
        Message::from_value(rest.post(&endpoint, content.into().to_value()).await?)
    }
}

/// A guild.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Guild {
    pub id: String,
    pub name: String,
    pub icon: Option<String>,
    pub owner: bool,
}
