use std::collections::{BTreeMap, HashMap};

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{RwLock, RwLockWriteGuard};

use super::timer::PollTimer;
use crate::error::{PollError, Result};

const ROOM_CODE_LENGTH: usize = 6;
const ROOM_CODE_CHARSET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const MAX_CODE_ATTEMPTS: usize = 32;

/// A timed prompt posed to every student in a room.
///
/// Everything except `timer` and `responses` is opaque payload chosen by the
/// admin client (question text, options, ...) and is echoed back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    #[serde(flatten)]
    pub content: Map<String, Value>,
    /// Countdown duration in seconds
    #[serde(rename = "timer")]
    pub timer_seconds: u32,
    #[serde(default)]
    pub responses: BTreeMap<String, Value>,
}

impl Question {
    pub fn new(content: Map<String, Value>, timer_seconds: u32) -> Self {
        Self {
            content,
            timer_seconds,
            responses: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Student {
    /// Answers keyed by position in `Room::questions`
    #[serde(default)]
    pub answers: BTreeMap<usize, Value>,
}

/// One polling session owned by a single admin.
pub struct Room {
    pub code: String,
    pub admin: String,
    pub questions: Vec<Question>,
    pub students: BTreeMap<String, Student>,
    /// Index into `questions` of the open question
    pub(crate) current_question: Option<usize>,
    /// Seconds remaining on the open question
    pub timer: u32,
    pub(crate) poll_timer: Option<PollTimer>,
}

impl Room {
    pub fn new(code: String, admin: String) -> Self {
        Self {
            code,
            admin,
            questions: Vec::new(),
            students: BTreeMap::new(),
            current_question: None,
            timer: 0,
            poll_timer: None,
        }
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.current_question.and_then(|idx| self.questions.get(idx))
    }

    /// Serializable copy of the room as it is right now.
    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            code: self.code.clone(),
            admin: self.admin.clone(),
            questions: self.questions.clone(),
            students: self.students.clone(),
            current_question: self.current_question().cloned(),
            timer: self.timer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub code: String,
    pub admin: String,
    pub questions: Vec<Question>,
    pub students: BTreeMap<String, Student>,
    pub current_question: Option<Question>,
    pub timer: u32,
}

/// Process-wide room table, owned by the server and shared with every handler.
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Room>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Generate a random room code
    fn generate_room_code() -> String {
        let mut rng = rand::thread_rng();
        (0..ROOM_CODE_LENGTH)
            .map(|_| ROOM_CODE_CHARSET[rng.gen_range(0..ROOM_CODE_CHARSET.len())] as char)
            .collect()
    }

    /// Create a new room and return its code. Codes are unique among live rooms.
    pub async fn create_room(&self, admin_name: &str) -> Result<String> {
        let admin_name = admin_name.trim();
        if admin_name.is_empty() {
            return Err(PollError::invalid_input("Admin name required"));
        }

        let mut rooms = self.rooms.write().await;

        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = Self::generate_room_code();
            if rooms.contains_key(&code) {
                tracing::debug!(room_code = %code, "Room code collision, regenerating");
                continue;
            }

            rooms.insert(code.clone(), Room::new(code.clone(), admin_name.to_string()));
            tracing::info!(room_code = %code, admin = %admin_name, "Room created");
            return Ok(code);
        }

        Err(PollError::internal("Could not allocate a unique room code"))
    }

    /// Get a snapshot of a room
    pub async fn get_room(&self, code: &str) -> Result<RoomSnapshot> {
        let rooms = self.rooms.read().await;
        rooms
            .get(code)
            .map(Room::snapshot)
            .ok_or_else(|| PollError::RoomNotFound(code.to_string()))
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Exclusive access to the room table. Callers broadcast while holding it
    /// so that event order matches mutation order.
    pub async fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Room>> {
        self.rooms.write().await
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
