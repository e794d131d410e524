use super::AppState;
use crate::error::{RoomError, RoomResult};
use crate::types::*;
use std::collections::BTreeMap;

/// Everything a reconnecting client needs to rebuild its exam screen
#[derive(Debug, Clone, PartialEq)]
pub struct ResumedExam {
    pub remaining_secs: i64,
    pub questions: Vec<Question>,
    /// Saved answers as persisted, keyed by question
    pub answers: BTreeMap<QuestionId, u8>,
}

impl ResumedExam {
    pub fn saved(&self, question_id: &str) -> Option<u8> {
        self.answers.get(question_id).copied()
    }
}

impl AppState {
    /// Pick an exam back up after a disconnect.
    ///
    /// Remaining time always comes from the room's start time, and resume is
    /// refused once the deadline has passed even if no sweep has ended the
    /// room yet. A refused resume leaves the client with the submit path.
    pub async fn resume_exam(&self, user_id: &str, room_id: &str) -> RoomResult<ResumedExam> {
        let now = self.now();
        let (record, participant) = {
            let registry = self.registry.read().await;
            let room = registry
                .rooms
                .get(room_id)
                .ok_or_else(|| RoomError::NotFound(format!("room {}", room_id)))?;
            let participant = room.participants.get(user_id).ok_or_else(|| {
                RoomError::PermissionDenied(format!("not a participant of room {}", room_id))
            })?;
            (room.record.clone(), participant.clone())
        };

        if record.status != RoomStatus::Started {
            return Err(RoomError::InvalidState(format!(
                "room {} is {}",
                room_id, record.status
            )));
        }
        if participant.started_at.is_none() {
            return Err(RoomError::InvalidState(
                "exam not begun, nothing to resume".to_string(),
            ));
        }
        if record.is_expired(now) {
            return Err(RoomError::InvalidState("exam time is over".to_string()));
        }
        if participant.has_taken_exam || self.store.get_result(user_id, room_id).await?.is_some() {
            return Err(RoomError::InvalidState(
                "exam already submitted".to_string(),
            ));
        }

        let questions = self.store.get_questions(&record.question_ids).await?;
        let answers = self.store.answers_for(user_id, room_id).await?;
        let remaining_secs = record.remaining_secs(now);

        tracing::info!(
            "User {} resumed room {} with {} saved answer(s), {}s left",
            user_id,
            room_id,
            answers.len(),
            remaining_secs
        );
        Ok(ResumedExam {
            remaining_secs,
            questions,
            answers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;

    #[tokio::test]
    async fn test_resume_restores_saved_answers_and_time() {
        let (state, clock, _store) = seeded_state().await;
        let room = room_with_two(&state).await;
        state.start_room("host", &room.id).await.unwrap();
        state.begin_exam("alice", &room.id).await.unwrap();
        state.save_answer("alice", &room.id, "e1", 2).await.unwrap();

        clock.advance(12);
        let resumed = state.resume_exam("alice", &room.id).await.unwrap();
        assert_eq!(resumed.remaining_secs, 48);
        assert_eq!(resumed.saved("e1"), Some(2));
        assert_eq!(resumed.saved("e2"), None);
        assert_eq!(resumed.questions.len(), 5);
    }

    #[tokio::test]
    async fn test_remaining_decreases_then_resume_is_refused() {
        let (state, clock, _store) = seeded_state().await;
        let room = room_with_two(&state).await;
        state.start_room("host", &room.id).await.unwrap();
        state.begin_exam("bob", &room.id).await.unwrap();

        let mut last = i64::MAX;
        for _ in 0..5 {
            clock.advance(11);
            let resumed = state.resume_exam("bob", &room.id).await.unwrap();
            assert!(resumed.remaining_secs < last);
            last = resumed.remaining_secs;
        }

        // Deadline passed, no sweep has run
        clock.advance(5);
        assert_eq!(state.room(&room.id).await.unwrap().status, RoomStatus::Started);
        let err = state.resume_exam("bob", &room.id).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");
    }

    #[tokio::test]
    async fn test_resume_refused_after_submit_or_before_begin() {
        let (state, _clock, _store) = seeded_state().await;
        let room = room_with_two(&state).await;
        state.start_room("host", &room.id).await.unwrap();

        let err = state.resume_exam("alice", &room.id).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");

        state.begin_exam("alice", &room.id).await.unwrap();
        state.submit("alice", &room.id).await.unwrap();
        let err = state.resume_exam("alice", &room.id).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");
    }
}
