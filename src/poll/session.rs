//! Question/answer state machine for a single room.
//!
//! A room is either idle (no open question) or has exactly one open question
//! counting down. These transitions are synchronous and never touch the
//! network; `PollServer` applies them under the registry lock and then
//! broadcasts the result.

use serde_json::Value;

use super::room::{Question, Room, Student};
use super::server::SkipReason;
use crate::error::{PollError, Result};

/// Result of advancing the countdown by one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickResult {
    /// Countdown moved; the question stays open
    Ticked(u32),
    /// Countdown moved to zero and the question closed
    TickedAndClosed(u32),
    /// The question was already at zero and closed without a tick
    Closed,
    /// Nothing open to tick
    Idle,
}

impl Room {
    /// Register a student by name. Names are unique within a room.
    pub fn add_student(&mut self, name: &str) -> Result<()> {
        if self.students.contains_key(name) {
            return Err(PollError::StudentNameTaken(name.to_string()));
        }
        self.students.insert(name.to_string(), Student::default());
        Ok(())
    }

    pub fn remove_student(&mut self, name: &str) -> Option<Student> {
        self.students.remove(name)
    }

    /// Append `question` to the history and make it the open question,
    /// closing whatever was open before. Returns its index.
    pub fn open_question(&mut self, mut question: Question) -> usize {
        question.responses.clear();
        self.timer = question.timer_seconds;
        self.questions.push(question);

        let index = self.questions.len() - 1;
        self.current_question = Some(index);
        index
    }

    /// Record `answer` for `student` against the open question. A rejected
    /// answer leaves the room untouched.
    pub fn record_answer(
        &mut self,
        student: &str,
        answer: Value,
    ) -> std::result::Result<usize, SkipReason> {
        let index = self.current_question.ok_or(SkipReason::NoOpenQuestion)?;

        let record = self
            .students
            .get_mut(student)
            .ok_or(SkipReason::StudentNotFound)?;
        record.answers.insert(index, answer.clone());

        if let Some(question) = self.questions.get_mut(index) {
            question.responses.insert(student.to_string(), answer);
        }
        Ok(index)
    }

    pub fn close_question(&mut self) {
        self.current_question = None;
    }

    /// Advance the countdown by one second.
    pub fn tick(&mut self) -> TickResult {
        if self.current_question.is_none() {
            return TickResult::Idle;
        }

        if self.timer == 0 {
            self.close_question();
            return TickResult::Closed;
        }

        self.timer -= 1;
        if self.timer == 0 {
            self.close_question();
            TickResult::TickedAndClosed(self.timer)
        } else {
            TickResult::Ticked(self.timer)
        }
    }
}
