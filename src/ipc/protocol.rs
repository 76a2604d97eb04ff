//! Wire protocol message types for broker IPC.
//!
//! All messages are MessagePack-encoded maps with at minimum `type` and `id`
//! fields.

use serde::{Deserialize, Serialize};

/// All wire protocol messages.
///
/// Serialized as a tagged union on the `type` field via MessagePack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Message {
    // -- Handshake --
    #[serde(rename = "hello")]
    Hello { id: u32, version: u32, role: Role },

    #[serde(rename = "hello_ack")]
    HelloAck {
        id: u32,
        status: Status,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    // -- Session management --
    #[serde(rename = "register")]
    Register {
        id: u32,
        session: String,
        pid: u32,
        pattern: String,
    },

    #[serde(rename = "deregister")]
    Deregister { id: u32, session: String },

    // -- Turn storage --
    #[serde(rename = "turn_completed")]
    TurnCompleted {
        id: u32,
        session: String,
        #[serde(with = "serde_bytes")]
        content: Vec<u8>,
        interrupted: bool,
        /// Unix epoch millis when the turn was detected by the wrapper.
        /// Defaults to 0 when absent (v0 compat); the broker falls back
        /// to receipt time.
        #[serde(default)]
        timestamp: u64,
        /// Whether the wrapper's own accumulator cap truncated this
        /// turn before it reached the broker. Defaults to `false` when
        /// absent (v0 compat).
        #[serde(default)]
        truncated: bool,
    },

    // -- Capture / Paste --
    #[serde(rename = "capture")]
    Capture { id: u32, session: String },

    #[serde(rename = "paste")]
    Paste { id: u32, session: String },

    // -- Unsolicited commands (broker → wrapper) --
    #[serde(rename = "inject")]
    Inject {
        id: u32,
        #[serde(with = "serde_bytes")]
        content: Vec<u8>,
    },

    // -- Query --
    #[serde(rename = "list_sessions")]
    ListSessions { id: u32 },

    // -- Turn registry (v1) --
    #[serde(rename = "get_turn")]
    GetTurn { id: u32, turn_id: String },

    #[serde(rename = "list_turns")]
    ListTurns {
        id: u32,
        session: String,
        #[serde(default)]
        limit: Option<u32>,
    },

    #[serde(rename = "capture_by_id")]
    CaptureByID { id: u32, turn_id: String },

    // -- Generic response --
    #[serde(rename = "response")]
    Response {
        id: u32,
        status: Status,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        size: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sessions: Option<Vec<SessionDescriptor>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        turn_id: Option<String>,
        // -- GetTurn content + metadata (v1) --
        #[serde(default, skip_serializing_if = "Option::is_none", with = "serde_bytes")]
        content: Option<Vec<u8>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        byte_length: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interrupted: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        truncated: Option<bool>,
        // -- ListTurns descriptors (v1) --
        #[serde(default, skip_serializing_if = "Option::is_none")]
        turns: Option<Vec<TurnDescriptor>>,
    },
}

/// Client role in the handshake.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Wrapper,
    Client,
}

/// Response status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
}

/// Session descriptor returned in list_sessions responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionDescriptor {
    pub session: String,
    pub pid: u32,
    pub has_turn: bool,
}

/// Turn descriptor returned in list_turns responses (metadata only, no content).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TurnDescriptor {
    pub turn_id: String,
    pub timestamp: u64,
    pub byte_length: u32,
    pub interrupted: bool,
    pub truncated: bool,
}

/// Protocol version for v0.
pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum payload size (16 MiB).
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Minimal envelope for extracting `{type, id}` from unknown messages.
///
/// Used by the broker as a fallback when [`Message`] deserialization
/// fails (e.g., unknown `type` tag). Allows the broker to echo the
/// request `id` back in the error response.
#[derive(Debug, Deserialize)]
pub struct RawEnvelope {
    /// Consumed by serde for structural matching; not read by broker code.
    #[serde(rename = "type")]
    #[allow(dead_code)]
    pub msg_type: String,
    pub id: u32,
}
