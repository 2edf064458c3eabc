use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::room::{Question, RoomSnapshot};

/// Messages sent by clients over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Binds the connection to a room and identity
    #[serde(rename_all = "camelCase")]
    Join {
        room_code: String,
        #[serde(default)]
        user: String,
        #[serde(default)]
        is_admin: bool,
    },

    /// Admin posts a new question
    #[serde(rename_all = "camelCase")]
    Poll { room_code: String, question: Question },

    /// Student submits an answer to the open question
    #[serde(rename_all = "camelCase")]
    Answer {
        room_code: String,
        user: String,
        answer: Value,
    },
}

/// Events fanned out to every connection bound to a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PollEvent {
    /// A question opened, or `None` when the open question closed
    Poll { question: Option<Question> },
    Update { room: RoomSnapshot },
    Timer { timer: u32 },
    End,
}

impl PollEvent {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
