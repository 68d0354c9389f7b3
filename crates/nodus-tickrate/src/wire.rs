//! Wire message types exchanged with the task service.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Remote command that queues a task script for execution.
pub const ADD_TASK: &str = "add_task";

/// Discriminator of a [`WireMessage`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Client request.
    Command,
    /// Server liveness probe.
    Heartbeat,
    /// Client answer to a probe.
    HeartbeatResponse,
    /// Successful task output.
    TaskResult,
    /// Task or service failure.
    Error,
    /// Anything else the service may send.
    #[default]
    #[serde(other)]
    Unknown,
}

impl MessageType {
    /// Look up a type by its wire name. Unrecognized names map to
    /// [`MessageType::Unknown`].
    pub fn from_name(name: &str) -> Self {
        serde_json::from_value(Value::String(name.to_string())).unwrap_or_default()
    }
}

/// One framed message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    /// Correlation id. Echoed verbatim for heartbeats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,

    /// Message type.
    #[serde(rename = "type", default)]
    pub kind: MessageType,

    /// Payload.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

/// Remote command name plus its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub name: String,
    pub args: Value,
}

/// Arguments of the [`ADD_TASK`] command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskArgs {
    /// Script name, as the service reports it.
    pub task_name: String,
    /// Inlined script source.
    pub task_body: String,
    /// Caller arguments handed to the script.
    #[serde(default)]
    pub custom_args: Value,
}

impl TaskDescriptor {
    /// Descriptor for running a task script.
    pub fn add_task(args: TaskArgs) -> Result<Self, serde_json::Error> {
        Ok(Self {
            name: ADD_TASK.to_string(),
            args: serde_json::to_value(args)?,
        })
    }
}

impl WireMessage {
    /// Build a `command` message.
    ///
    /// The descriptor is nested one level deeper than the outer envelope:
    /// `{id, type: "command", data: {type: "command", data: {name, args}}}`.
    pub fn command(id: impl Into<String>, descriptor: &TaskDescriptor) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: Some(Value::String(id.into())),
            kind: MessageType::Command,
            data: serde_json::json!({
                "type": "command",
                "data": serde_json::to_value(descriptor)?,
            }),
        })
    }

    /// Answer to a server heartbeat, carrying the same id.
    pub fn heartbeat_response(id: Option<Value>) -> Self {
        Self {
            id,
            kind: MessageType::HeartbeatResponse,
            data: Value::Null,
        }
    }

    /// Server heartbeat probe.
    pub fn heartbeat(id: impl Into<Value>) -> Self {
        Self {
            id: Some(id.into()),
            kind: MessageType::Heartbeat,
            data: Value::Null,
        }
    }

    /// Successful task result.
    pub fn task_result(id: impl Into<Value>, data: Value) -> Self {
        Self {
            id: Some(id.into()),
            kind: MessageType::TaskResult,
            data,
        }
    }

    /// Error reply.
    pub fn error(id: impl Into<Value>, message: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            kind: MessageType::Error,
            data: serde_json::json!({ "message": message.into() }),
        }
    }

    /// Read a message from a decoded JSON value.
    ///
    /// Only the outer shape is checked: any object is a message. A `type`
    /// that is missing or not a string reads as [`MessageType::Unknown`].
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let kind = object
            .get("type")
            .and_then(Value::as_str)
            .map(MessageType::from_name)
            .unwrap_or_default();
        Some(Self {
            id: object.get("id").filter(|id| !id.is_null()).cloned(),
            kind,
            data: object.get("data").cloned().unwrap_or(Value::Null),
        })
    }

    /// The id as a string, when it is one.
    pub fn id_str(&self) -> Option<&str> {
        self.id.as_ref().and_then(Value::as_str)
    }

    /// Human-readable message of an `error` reply.
    pub fn error_message(&self) -> String {
        match self.data.get("message") {
            Some(Value::String(message)) => message.clone(),
            Some(other) => other.to_string(),
            None => self.data.to_string(),
        }
    }

    /// The task descriptor of a `command` message.
    pub fn descriptor(&self) -> Option<TaskDescriptor> {
        if self.kind != MessageType::Command {
            return None;
        }
        serde_json::from_value(self.data.get("data")?.clone()).ok()
    }

    /// Serialize to an unframed payload.
    pub fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }
}
