use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use warp::ws::Message;

use super::connection::{Binding, ConnectionId, ConnectionRegistry};
use super::messages::{ClientMessage, PollEvent};
use super::room::{Question, RoomRegistry, RoomSnapshot};
use super::session::TickResult;
use super::timer::{PollTimer, TimerStep};
use crate::error::{PollError, Result};

/// Why a real-time operation had no effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    RoomNotFound,
    NoOpenQuestion,
    StudentNotFound,
    /// The connection never sent a join message
    NotBound,
    /// Admin disconnects leave the room untouched
    AdminConnection,
}

/// Outcome of a real-time operation. Skips are never reported to the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Skipped(SkipReason),
}

pub struct PollServer {
    rooms: RoomRegistry,
    connections: ConnectionRegistry,
    tick_interval: Duration,
    timer_generation: AtomicU64,
}

impl PollServer {
    pub fn new(tick_interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            rooms: RoomRegistry::new(),
            connections: ConnectionRegistry::new(),
            tick_interval,
            timer_generation: AtomicU64::new(0),
        })
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    pub async fn create_room(&self, admin_name: &str) -> Result<String> {
        self.rooms.create_room(admin_name).await
    }

    pub async fn get_room(&self, room_code: &str) -> Result<RoomSnapshot> {
        self.rooms.get_room(room_code).await
    }

    /// Add a student to a room and fan out the new roster.
    /// Names are stored exactly as sent so that answers and disconnects,
    /// which carry the raw name, find the same student.
    pub async fn join_room(&self, room_code: &str, student_name: &str) -> Result<()> {
        if room_code.is_empty() || student_name.trim().is_empty() {
            return Err(PollError::invalid_input("Room code and name required"));
        }

        let mut rooms = self.rooms.write().await;
        let room = rooms
            .get_mut(room_code)
            .ok_or_else(|| PollError::RoomNotFound(room_code.to_string()))?;

        room.add_student(student_name)?;
        tracing::info!(room_code = %room_code, student = %student_name, "Student joined room");

        let event = PollEvent::Update {
            room: room.snapshot(),
        };
        self.connections.broadcast(room_code, &event).await;
        Ok(())
    }

    /// Remove a room, stop its countdown and tell everyone bound to it.
    pub async fn end_room(&self, room_code: &str) -> Result<()> {
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .remove(room_code)
            .ok_or_else(|| PollError::RoomNotFound(room_code.to_string()))?;

        if let Some(timer) = &room.poll_timer {
            timer.cancel();
        }

        let notified = self.connections.broadcast(room_code, &PollEvent::End).await;
        tracing::info!(room_code = %room_code, notified, "Room ended");
        Ok(())
    }

    /// Track a freshly accepted WebSocket.
    pub async fn connect(&self, sender: mpsc::UnboundedSender<Message>) -> ConnectionId {
        let id = self.connections.register(sender).await;
        tracing::debug!(connection_id = id, "Connection registered");
        id
    }

    /// Parse and apply one raw WebSocket text frame.
    pub async fn handle_text(self: &Arc<Self>, connection_id: ConnectionId, text: &str) -> Result<Outcome> {
        let message = serde_json::from_str::<ClientMessage>(text)?;
        Ok(self.handle_message(connection_id, message).await)
    }

    pub async fn handle_message(self: &Arc<Self>, connection_id: ConnectionId, message: ClientMessage) -> Outcome {
        let outcome = match message {
            ClientMessage::Join {
                room_code,
                user,
                is_admin,
            } => {
                self.bind(
                    connection_id,
                    Binding {
                        room_code,
                        user,
                        is_admin,
                    },
                )
                .await
            }
            ClientMessage::Poll {
                room_code,
                question,
            } => self.post_question(&room_code, question).await,
            ClientMessage::Answer {
                room_code,
                user,
                answer,
            } => self.submit_answer(&room_code, &user, answer).await,
        };

        if let Outcome::Skipped(reason) = outcome {
            tracing::debug!(connection_id, ?reason, "Real-time message skipped");
        }
        outcome
    }

    pub async fn bind(&self, connection_id: ConnectionId, binding: Binding) -> Outcome {
        let room_code = binding.room_code.clone();
        let is_admin = binding.is_admin;

        if self.connections.bind(connection_id, binding).await {
            tracing::info!(connection_id, room_code = %room_code, is_admin, "Connection joined room");
            Outcome::Applied
        } else {
            Outcome::Skipped(SkipReason::NotBound)
        }
    }

    /// Open `question` in a room and start its countdown, cancelling any
    /// countdown the previous question still had running.
    pub async fn post_question(self: &Arc<Self>, room_code: &str, question: Question) -> Outcome {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(room_code) else {
            return Outcome::Skipped(SkipReason::RoomNotFound);
        };

        if let Some(previous) = room.poll_timer.take() {
            previous.cancel();
        }

        let index = room.open_question(question);
        let question = room.current_question().cloned();
        tracing::info!(room_code = %room_code, question_index = index, timer = room.timer, "Question posted");

        self.connections
            .broadcast(room_code, &PollEvent::Poll { question })
            .await;

        let generation = self.timer_generation.fetch_add(1, Ordering::Relaxed) + 1;
        room.poll_timer = Some(self.start_timer(room_code.to_string(), generation));

        Outcome::Applied
    }

    fn start_timer(self: &Arc<Self>, room_code: String, generation: u64) -> PollTimer {
        let server: Weak<Self> = Arc::downgrade(self);

        PollTimer::start(self.tick_interval, generation, move || {
            let server = server.clone();
            let room_code = room_code.clone();
            async move {
                match server.upgrade() {
                    Some(server) => server.tick(&room_code, generation).await,
                    None => TimerStep::Stop,
                }
            }
        })
    }

    /// One countdown step for a room's open question.
    pub(crate) async fn tick(&self, room_code: &str, generation: u64) -> TimerStep {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(room_code) else {
            tracing::debug!(room_code = %room_code, "Timer fired for a room that no longer exists");
            return TimerStep::Stop;
        };

        let current = room.poll_timer.as_ref().map(PollTimer::generation);
        if current != Some(generation) {
            return TimerStep::Stop;
        }

        match room.tick() {
            TickResult::Ticked(timer) => {
                self.connections
                    .broadcast(room_code, &PollEvent::Timer { timer })
                    .await;
                TimerStep::Continue
            }
            TickResult::TickedAndClosed(timer) => {
                room.poll_timer = None;
                self.connections
                    .broadcast(room_code, &PollEvent::Timer { timer })
                    .await;
                self.connections
                    .broadcast(room_code, &PollEvent::Poll { question: None })
                    .await;
                tracing::info!(room_code = %room_code, "Question closed");
                TimerStep::Stop
            }
            TickResult::Closed => {
                room.poll_timer = None;
                self.connections
                    .broadcast(room_code, &PollEvent::Poll { question: None })
                    .await;
                tracing::info!(room_code = %room_code, "Question closed");
                TimerStep::Stop
            }
            TickResult::Idle => {
                room.poll_timer = None;
                TimerStep::Stop
            }
        }
    }

    /// Record a student's answer to the open question and fan out the room.
    pub async fn submit_answer(&self, room_code: &str, student: &str, answer: Value) -> Outcome {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(room_code) else {
            return Outcome::Skipped(SkipReason::RoomNotFound);
        };
        match room.record_answer(student, answer) {
            Ok(index) => {
                tracing::debug!(room_code = %room_code, student = %student, question_index = index, "Answer recorded");
            }
            Err(reason) => return Outcome::Skipped(reason),
        }

        let event = PollEvent::Update {
            room: room.snapshot(),
        };
        self.connections.broadcast(room_code, &event).await;
        Outcome::Applied
    }

    /// Drop a closed connection. A bound student is removed from its room.
    pub async fn disconnect(&self, connection_id: ConnectionId) -> Outcome {
        let Some(binding) = self.connections.unregister(connection_id).await else {
            return Outcome::Skipped(SkipReason::NotBound);
        };
        if binding.is_admin {
            return Outcome::Skipped(SkipReason::AdminConnection);
        }
        if binding.user.is_empty() {
            return Outcome::Skipped(SkipReason::NotBound);
        }

        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(&binding.room_code) else {
            return Outcome::Skipped(SkipReason::RoomNotFound);
        };

        if room.remove_student(&binding.user).is_some() {
            tracing::info!(room_code = %binding.room_code, student = %binding.user, "Student left room");
        }

        let event = PollEvent::Update {
            room: room.snapshot(),
        };
        self.connections.broadcast(&binding.room_code, &event).await;
        Outcome::Applied
    }
}
