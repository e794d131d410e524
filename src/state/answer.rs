use super::AppState;
use crate::error::{RoomError, RoomResult};
use crate::metrics::Metrics;
use crate::types::*;
use futures::future::join_all;

/// What an auto-submit pass did for one room
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutoSubmitReport {
    /// New results written
    pub inserted: usize,
    /// Participants who already had a result
    pub existing: usize,
    pub failed: usize,
}

fn time_taken(record: &RoomRecord, participant: &Participant, now: Timestamp) -> i64 {
    let started = participant
        .started_at
        .or(record.start_time)
        .unwrap_or(now);
    (now - started).clamp(0, record.duration_secs())
}

impl AppState {
    /// Save one answer; a later save for the same question replaces it
    pub async fn save_answer(
        &self,
        user_id: &str,
        room_id: &str,
        question_id: &str,
        option: u8,
    ) -> RoomResult<()> {
        if !(1..=OPTION_COUNT).contains(&option) {
            return Err(RoomError::InvalidInput(format!(
                "option must be between 1 and {}",
                OPTION_COUNT
            )));
        }

        let now = self.now();
        // The read lock keeps the room from ending between the checks and the write
        let registry = self.registry.read().await;
        let room = registry
            .rooms
            .get(room_id)
            .ok_or_else(|| RoomError::NotFound(format!("room {}", room_id)))?;
        let participant = room.participants.get(user_id).ok_or_else(|| {
            RoomError::PermissionDenied(format!("not a participant of room {}", room_id))
        })?;

        if room.record.status != RoomStatus::Started {
            return Err(RoomError::InvalidState(format!(
                "room {} is {}",
                room_id, room.record.status
            )));
        }
        if participant.has_taken_exam {
            return Err(RoomError::InvalidState(
                "exam already submitted".to_string(),
            ));
        }
        if room.record.is_expired(now) {
            return Err(RoomError::InvalidState("exam time is over".to_string()));
        }
        if !room.record.question_ids.iter().any(|q| q == question_id) {
            return Err(RoomError::NotFound(format!("question {}", question_id)));
        }

        self.store
            .upsert_answer(user_id, room_id, question_id, option)
            .await?;
        tracing::debug!(
            "User {} answered {} = {} in room {}",
            user_id,
            question_id,
            option,
            room_id
        );
        Ok(())
    }

    /// Score and record the caller's exam. Submitting again returns the
    /// stored result unchanged.
    pub async fn submit(&self, user_id: &str, room_id: &str) -> RoomResult<ExamResult> {
        let (record, participant) = {
            let registry = self.registry.read().await;
            let room = registry
                .rooms
                .get(room_id)
                .ok_or_else(|| RoomError::NotFound(format!("room {}", room_id)))?;
            let participant = room.participants.get(user_id).ok_or_else(|| {
                RoomError::PermissionDenied(format!("not a participant of room {}", room_id))
            })?;
            if room.record.status == RoomStatus::Waiting {
                return Err(RoomError::InvalidState(format!(
                    "room {} has not started",
                    room_id
                )));
            }
            (room.record.clone(), participant.clone())
        };

        if let Some(existing) = self.store.get_result(user_id, room_id).await? {
            tracing::debug!("User {} resubmitted room {}, keeping result", user_id, room_id);
            if !participant.has_taken_exam {
                self.mark_taken(room_id, &[user_id.to_string()]).await?;
            }
            return Ok(existing);
        }

        let result = self
            .score_participant(&record, &participant, self.now(), false)
            .await?;
        let result = if self.store.insert_result(&result).await? {
            result
        } else {
            // Lost the race with an auto-submit; the stored one stands
            self.store
                .get_result(user_id, room_id)
                .await?
                .ok_or_else(|| RoomError::NotFound(format!("result for {}", user_id)))?
        };
        self.mark_taken(room_id, &[user_id.to_string()]).await?;

        tracing::info!(
            "User {} submitted room {}: {}/{} in {}s",
            user_id,
            room_id,
            result.score,
            result.total_questions,
            result.time_taken
        );
        Ok(result)
    }

    /// Build a result from the answers persisted for `participant`
    pub(crate) async fn score_participant(
        &self,
        record: &RoomRecord,
        participant: &Participant,
        now: Timestamp,
        auto_submitted: bool,
    ) -> RoomResult<ExamResult> {
        let answers = self
            .store
            .answers_for(&participant.user_id, &record.id)
            .await?;
        let asked = self.store.get_questions(&record.question_ids).await?;
        Ok(ExamResult {
            user_id: participant.user_id.clone(),
            room_id: record.id.clone(),
            score: score_answers(&asked, &answers),
            total_questions: record.question_ids.len() as u32,
            time_taken: time_taken(record, participant, now),
            submitted_at: now,
            auto_submitted,
        })
    }

    /// Set `has_taken_exam` in the registry, then persist it outside the lock
    pub(crate) async fn mark_taken(&self, room_id: &str, users: &[UserId]) -> RoomResult<()> {
        let updated: Vec<Participant> = {
            let mut registry = self.registry.write().await;
            let Some(room) = registry.rooms.get_mut(room_id) else {
                // Deleted meanwhile
                return Ok(());
            };
            let mut updated = Vec::with_capacity(users.len());
            for user in users {
                if let Some(p) = room.participants.get_mut(user) {
                    p.has_taken_exam = true;
                    updated.push(p.clone());
                }
            }
            updated
        };

        for participant in &updated {
            self.store.upsert_participant(participant).await?;
        }
        Ok(())
    }

    /// Write a result for every participant in `pending` that lacks one.
    ///
    /// Must be called without the registry lock held. Insert-if-absent in the
    /// store keeps this safe against a concurrent manual submit.
    pub(crate) async fn auto_submit_pending(
        &self,
        record: &RoomRecord,
        pending: &[Participant],
        now: Timestamp,
    ) -> AutoSubmitReport {
        let outcomes = join_all(pending.iter().map(|participant| async move {
            let result = self.score_participant(record, participant, now, true).await?;
            let inserted = self.store.insert_result(&result).await?;
            Ok::<_, RoomError>((participant.user_id.clone(), inserted))
        }))
        .await;

        let mut report = AutoSubmitReport::default();
        let mut done = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok((user_id, true)) => {
                    report.inserted += 1;
                    Metrics::incr(&self.metrics.auto_submits);
                    tracing::info!("Auto-submitted {} in room {}", user_id, record.id);
                    done.push(user_id);
                }
                Ok((user_id, false)) => {
                    report.existing += 1;
                    done.push(user_id);
                }
                Err(e) => {
                    report.failed += 1;
                    Metrics::incr(&self.metrics.sweeper_failures);
                    tracing::error!("Auto-submit in room {} failed: {}", record.id, e);
                }
            }
        }

        if let Err(e) = self.mark_taken(&record.id, &done).await {
            report.failed += 1;
            Metrics::incr(&self.metrics.sweeper_failures);
            tracing::error!("Marking room {} participants as done failed: {}", record.id, e);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use crate::clock::Clock;
    use crate::store::Store;

    #[tokio::test]
    async fn test_last_write_wins() {
        let (state, _clock, store) = seeded_state().await;
        let room = room_with_two(&state).await;
        state.start_room("host", &room.id).await.unwrap();

        state.save_answer("alice", &room.id, "e1", 3).await.unwrap();
        state.save_answer("alice", &room.id, "e1", 1).await.unwrap();

        let answers = store.answers_for("alice", &room.id).await.unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers.get("e1"), Some(&1));
    }

    #[tokio::test]
    async fn test_save_answer_validation() {
        let (state, clock, _store) = seeded_state().await;
        let room = room_with_two(&state).await;

        let err = state.save_answer("alice", &room.id, "e1", 1).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");

        state.start_room("host", &room.id).await.unwrap();
        let err = state.save_answer("alice", &room.id, "e1", 5).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
        let err = state.save_answer("alice", &room.id, "m1", 1).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
        let err = state.save_answer("carol", &room.id, "e1", 1).await.unwrap_err();
        assert_eq!(err.code(), "PERMISSION_DENIED");

        clock.advance(60);
        let err = state.save_answer("alice", &room.id, "e1", 1).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");
    }

    #[tokio::test]
    async fn test_double_submit_keeps_one_result() {
        let (state, clock, store) = seeded_state().await;
        let room = room_with_two(&state).await;
        state.start_room("host", &room.id).await.unwrap();
        state.begin_exam("alice", &room.id).await.unwrap();
        state.save_answer("alice", &room.id, "e1", 1).await.unwrap();
        state.save_answer("alice", &room.id, "e2", 1).await.unwrap();

        clock.advance(10);
        let first = state.submit("alice", &room.id).await.unwrap();
        assert_eq!(first.score, 2);
        assert_eq!(first.total_questions, 5);
        assert_eq!(first.time_taken, 10);
        assert!(!first.auto_submitted);

        clock.advance(5);
        let second = state.submit("alice", &room.id).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(store.results_for_room(&room.id).await.unwrap().len(), 1);

        let err = state.save_answer("alice", &room.id, "e3", 1).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");
    }

    #[tokio::test]
    async fn test_submit_before_start_is_invalid() {
        let (state, _clock, _store) = seeded_state().await;
        let room = room_with_two(&state).await;
        let err = state.submit("alice", &room.id).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");
    }

    #[tokio::test]
    async fn test_time_taken_is_capped_at_duration() {
        let (state, clock, _store) = seeded_state().await;
        let room = room_with_two(&state).await;
        state.start_room("host", &room.id).await.unwrap();
        state.begin_exam("bob", &room.id).await.unwrap();

        clock.advance(300);
        let result = state.submit("bob", &room.id).await.unwrap();
        assert_eq!(result.time_taken, 60);
        assert_eq!(result.score, 0);
    }

    #[tokio::test]
    async fn test_auto_submit_skips_existing_results() {
        let (state, clock, store) = seeded_state().await;
        let room = room_with_two(&state).await;
        state.start_room("host", &room.id).await.unwrap();
        state.save_answer("bob", &room.id, "e4", 1).await.unwrap();
        let alice = state.submit("alice", &room.id).await.unwrap();

        clock.advance(61);
        let record = state.room(&room.id).await.unwrap();
        let pending: Vec<Participant> = ["alice", "bob"]
            .iter()
            .map(|u| Participant {
                room_id: room.id.clone(),
                user_id: u.to_string(),
                joined_at: T0,
                started_at: None,
                has_taken_exam: false,
            })
            .collect();
        let report = state
            .auto_submit_pending(&record, &pending, clock.now())
            .await;

        assert_eq!(report.inserted, 1);
        assert_eq!(report.existing, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(store.get_result("alice", &room.id).await.unwrap(), Some(alice));
        let bob = store.get_result("bob", &room.id).await.unwrap().unwrap();
        assert!(bob.auto_submitted);
        assert_eq!(bob.score, 1);
        assert_eq!(bob.time_taken, 60);
        assert_eq!(state.metrics.snapshot().auto_submits, 1);
    }

    #[tokio::test]
    async fn test_auto_submit_counts_storage_failures() {
        let (state, _clock, store) = seeded_state().await;
        let room = room_with_two(&state).await;
        state.start_room("host", &room.id).await.unwrap();
        let record = state.room(&room.id).await.unwrap();
        let pending = vec![state.participant(&room.id, "bob").await.unwrap()];

        store.set_unavailable(true);
        let report = state.auto_submit_pending(&record, &pending, T0 + 61).await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.inserted, 0);
        assert!(state.metrics.snapshot().sweeper_failures >= 1);
        assert!(!state.participant(&room.id, "bob").await.unwrap().has_taken_exam);
    }
}
