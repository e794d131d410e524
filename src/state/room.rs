use super::{pick_questions, AppState};
use crate::error::{RoomError, RoomResult};
use crate::protocol::{Event, RoomSummary};
use crate::types::*;

/// Outcome of `begin_exam`
#[derive(Debug, Clone, PartialEq)]
pub enum ExamStart {
    /// Host has not started yet; a ROOM_STARTED push will follow
    Waiting,
    Started {
        remaining_secs: i64,
        questions: Vec<Question>,
    },
}

fn require_host(room: &Room, user_id: &str, action: &str) -> RoomResult<()> {
    if room.record.host_id != user_id {
        return Err(RoomError::PermissionDenied(format!(
            "only the host can {} this room",
            action
        )));
    }
    Ok(())
}

fn transition(record: &RoomRecord, to: RoomStatus) -> RoomResult<RoomRecord> {
    if !record.status.can_transition_to(to) {
        return Err(RoomError::InvalidState(format!(
            "room {} is {}, cannot become {}",
            record.id, record.status, to
        )));
    }
    let mut next = record.clone();
    next.status = to;
    Ok(next)
}

impl AppState {
    /// Create a WAITING exam room with a random question set
    pub async fn create_room(
        &self,
        host_id: &str,
        name: &str,
        duration_minutes: u32,
        counts: Option<DifficultyCounts>,
    ) -> RoomResult<RoomRecord> {
        self.privileged_user(host_id, "create rooms").await?;

        let name = name.trim();
        if name.is_empty() {
            return Err(RoomError::InvalidInput("room name is empty".to_string()));
        }
        let max = self.config.max_duration_minutes;
        if duration_minutes == 0 || duration_minutes > max {
            return Err(RoomError::InvalidInput(format!(
                "duration must be between 1 and {} minutes",
                max
            )));
        }

        let counts = counts.unwrap_or(self.config.default_counts);
        let bank = self.store.list_questions().await?;
        let question_ids = pick_questions(&bank, counts)?;

        let record = RoomRecord {
            id: ulid::Ulid::new().to_string(),
            name: name.to_string(),
            host_id: host_id.to_string(),
            duration_minutes,
            status: RoomStatus::Waiting,
            start_time: None,
            counts,
            question_ids,
            created_at: self.now(),
        };
        self.store.upsert_room(&record).await?;

        self.registry
            .write()
            .await
            .rooms
            .insert(record.id.clone(), Room::new(record.clone()));

        tracing::info!(
            "Room {} '{}' created by {} ({} questions, {} min)",
            record.id,
            record.name,
            host_id,
            record.question_ids.len(),
            duration_minutes
        );
        Ok(record)
    }

    /// Join a room before it starts; joining twice is a no-op
    pub async fn join_room(&self, user_id: &str, room_id: &str) -> RoomResult<()> {
        self.user(user_id).await?;

        let mut registry = self.registry.write().await;
        let room = registry
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| RoomError::NotFound(format!("room {}", room_id)))?;

        if room.record.status != RoomStatus::Waiting {
            return Err(RoomError::InvalidState(format!(
                "room {} is {}, joining is closed",
                room_id, room.record.status
            )));
        }
        if room.participants.contains_key(user_id) {
            return Ok(());
        }
        if room.participants.len() >= self.config.max_participants {
            return Err(RoomError::Full);
        }

        let participant = Participant {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            joined_at: self.now(),
            started_at: None,
            has_taken_exam: false,
        };
        self.store.upsert_participant(&participant).await?;
        room.participants.insert(user_id.to_string(), participant);

        tracing::info!(
            "User {} joined room {} ({} participants)",
            user_id,
            room_id,
            room.participants.len()
        );
        Ok(())
    }

    /// Host starts the exam; the start time fixes every participant's deadline
    pub async fn start_room(&self, host_id: &str, room_id: &str) -> RoomResult<Timestamp> {
        let now = self.now();
        let (participants, waiting) = {
            let mut registry = self.registry.write().await;
            let room = registry
                .rooms
                .get_mut(room_id)
                .ok_or_else(|| RoomError::NotFound(format!("room {}", room_id)))?;
            require_host(room, host_id, "start")?;

            let mut next = transition(&room.record, RoomStatus::Started)?;
            next.start_time = Some(now);
            self.store.upsert_room(&next).await?;
            room.record = next;

            let waiting = room.waiting.len();
            room.waiting.clear();
            (room.participant_ids(), waiting)
        };

        tracing::info!(
            "Room {} started at {} ({} waiting)",
            room_id,
            now,
            waiting
        );
        self.broadcaster
            .push(
                &participants,
                &Event::RoomStarted {
                    room_id: room_id.to_string(),
                    start_time: now,
                },
            )
            .await;
        Ok(now)
    }

    /// Host ends the room early; a started exam is auto-submitted for everyone
    /// who has not submitted yet
    pub async fn close_room(&self, host_id: &str, room_id: &str) -> RoomResult<()> {
        let (record, pending, participants, was_started) = {
            let mut registry = self.registry.write().await;
            let room = registry
                .rooms
                .get_mut(room_id)
                .ok_or_else(|| RoomError::NotFound(format!("room {}", room_id)))?;
            require_host(room, host_id, "close")?;

            let was_started = room.record.status == RoomStatus::Started;
            let next = transition(&room.record, RoomStatus::Ended)?;
            self.store.upsert_room(&next).await?;
            room.record = next;
            room.waiting.clear();

            let pending: Vec<Participant> = room
                .participants
                .values()
                .filter(|p| !p.has_taken_exam)
                .cloned()
                .collect();
            (room.record.clone(), pending, room.participant_ids(), was_started)
        };

        if was_started {
            let report = self.auto_submit_pending(&record, &pending, self.now()).await;
            tracing::info!(
                "Room {} closed by host, {} auto-submitted, {} failed",
                room_id,
                report.inserted,
                report.failed
            );
        } else {
            tracing::info!("Room {} closed before start", room_id);
        }

        self.broadcaster
            .push(
                &participants,
                &Event::RoomEnded {
                    room_id: room_id.to_string(),
                },
            )
            .await;
        Ok(())
    }

    /// Host removes the room and everything recorded for it
    pub async fn delete_room(&self, host_id: &str, room_id: &str) -> RoomResult<()> {
        let participants = {
            let mut registry = self.registry.write().await;
            let room = registry
                .rooms
                .get(room_id)
                .ok_or_else(|| RoomError::NotFound(format!("room {}", room_id)))?;
            require_host(room, host_id, "delete")?;

            self.store.delete_room(room_id).await?;
            registry
                .rooms
                .remove(room_id)
                .map(|room| room.participant_ids())
                .unwrap_or_default()
        };

        tracing::info!("Room {} deleted by {}", room_id, host_id);
        self.broadcaster
            .push(
                &participants,
                &Event::RoomDeleted {
                    room_id: room_id.to_string(),
                },
            )
            .await;
        Ok(())
    }

    /// Enter the exam, or wait for the host if the room has not started.
    ///
    /// Repeated calls return the time left on the room's clock and never
    /// extend it.
    pub async fn begin_exam(&self, user_id: &str, room_id: &str) -> RoomResult<ExamStart> {
        let now = self.now();
        let (remaining_secs, question_ids) = {
            let mut registry = self.registry.write().await;

            let busy_elsewhere = registry.rooms.values().any(|other| {
                other.record.id != room_id
                    && other.record.status == RoomStatus::Started
                    && !other.record.is_expired(now)
                    && other
                        .participants
                        .get(user_id)
                        .is_some_and(|p| p.started_at.is_some() && !p.has_taken_exam)
            });

            let room = registry
                .rooms
                .get_mut(room_id)
                .ok_or_else(|| RoomError::NotFound(format!("room {}", room_id)))?;
            let participant = room.participants.get(user_id).ok_or_else(|| {
                RoomError::PermissionDenied(format!("not a participant of room {}", room_id))
            })?;

            if participant.has_taken_exam {
                return Err(RoomError::InvalidState(
                    "exam already submitted".to_string(),
                ));
            }

            match room.record.status {
                RoomStatus::Ended => {
                    return Err(RoomError::InvalidState(format!(
                        "room {} has ended",
                        room_id
                    )));
                }
                RoomStatus::Waiting => {
                    room.waiting.insert(user_id.to_string());
                    tracing::debug!("User {} waiting for room {}", user_id, room_id);
                    return Ok(ExamStart::Waiting);
                }
                RoomStatus::Started => {}
            }

            if room.record.is_expired(now) {
                return Err(RoomError::InvalidState("exam time is over".to_string()));
            }
            if busy_elsewhere {
                return Err(RoomError::InvalidState(
                    "another exam is already in progress".to_string(),
                ));
            }

            if participant.started_at.is_none() {
                let mut started = participant.clone();
                started.started_at = Some(now);
                self.store.upsert_participant(&started).await?;
                room.participants.insert(user_id.to_string(), started);
            }
            room.waiting.remove(user_id);

            (
                room.record.remaining_secs(now),
                room.record.question_ids.clone(),
            )
        };

        let questions = self.store.get_questions(&question_ids).await?;
        tracing::info!(
            "User {} began exam in room {} ({}s left)",
            user_id,
            room_id,
            remaining_secs
        );
        Ok(ExamStart::Started {
            remaining_secs,
            questions,
        })
    }

    /// Stop waiting for the host to start
    pub async fn cancel_wait(&self, user_id: &str, room_id: &str) -> RoomResult<()> {
        let mut registry = self.registry.write().await;
        let room = registry
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| RoomError::NotFound(format!("room {}", room_id)))?;
        if room.waiting.remove(user_id) {
            tracing::debug!("User {} stopped waiting for room {}", user_id, room_id);
        }
        Ok(())
    }

    /// Remove a disconnected user from every waiting set
    pub async fn drop_waits(&self, user_id: &str) -> usize {
        let mut registry = self.registry.write().await;
        let mut dropped = 0;
        for room in registry.rooms.values_mut() {
            if room.waiting.remove(user_id) {
                dropped += 1;
            }
        }
        dropped
    }

    pub async fn list_rooms(&self) -> Vec<RoomSummary> {
        let registry = self.registry.read().await;
        let mut rooms: Vec<RoomSummary> = registry
            .rooms
            .values()
            .map(|room| RoomSummary {
                id: room.record.id.clone(),
                name: room.record.name.clone(),
                status: room.record.status,
                duration_minutes: room.record.duration_minutes,
                participants: room.participants.len(),
            })
            .collect();
        // ULIDs sort by creation time
        rooms.sort_by(|a, b| a.id.cmp(&b.id));
        rooms
    }

    /// Users currently blocked in `begin_exam` for a room
    pub async fn waiting_count(&self, room_id: &str) -> usize {
        self.registry
            .read()
            .await
            .rooms
            .get(room_id)
            .map(|room| room.waiting.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use crate::config::Config;
    use crate::store::Store;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_students_cannot_create_rooms() {
        let (state, _clock, _store) = seeded_state().await;
        let err = state.create_room("alice", "Quiz", 10, None).await.unwrap_err();
        assert_eq!(err.code(), "PERMISSION_DENIED");
    }

    #[tokio::test]
    async fn test_create_room_uses_default_counts() {
        let (state, _clock, store) = seeded_state().await;
        let room = state.create_room("admin", "Final", 30, None).await.unwrap();
        assert_eq!(room.status, RoomStatus::Waiting);
        assert_eq!(room.counts, Config::default().default_counts);
        assert_eq!(room.question_ids.len(), 10);

        let persisted = store.load_rooms().await.unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].0, room);
    }

    #[tokio::test]
    async fn test_create_room_validates_input() {
        let (state, _clock, _store) = seeded_state().await;
        let err = state.create_room("host", "Quiz", 0, None).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
        let err = state.create_room("host", "  ", 5, None).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
        let err = state
            .create_room("host", "Quiz", 5, Some(DifficultyCounts::new(0, 0, 3)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
    }

    #[tokio::test]
    async fn test_join_is_idempotent_and_closed_after_start() {
        let (state, _clock, _store) = seeded_state().await;
        let room = room_with_two(&state).await;
        state.join_room("alice", &room.id).await.unwrap();
        assert_eq!(state.list_rooms().await[0].participants, 2);

        state.start_room("host", &room.id).await.unwrap();
        let err = state.join_room("carol", &room.id).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");
    }

    #[tokio::test]
    async fn test_join_unknown_room() {
        let (state, _clock, _store) = seeded_state().await;
        let err = state.join_room("alice", "nope").await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_room_full() {
        let (state, clock, store) = seeded_state().await;
        let config = Config {
            max_participants: 1,
            ..Config::default()
        };
        let state = AppState::new(config, store, Arc::new(clock));
        let room = state.create_room("host", "Tiny", 5, None).await.unwrap();
        state.join_room("alice", &room.id).await.unwrap();
        let err = state.join_room("bob", &room.id).await.unwrap_err();
        assert!(matches!(err, RoomError::Full));
    }

    #[tokio::test]
    async fn test_status_only_moves_forward() {
        let (state, _clock, _store) = seeded_state().await;
        let room = room_with_two(&state).await;

        state.start_room("host", &room.id).await.unwrap();
        let err = state.start_room("host", &room.id).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");

        state.close_room("host", &room.id).await.unwrap();
        let err = state.start_room("host", &room.id).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");
        let err = state.close_room("host", &room.id).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");
        assert_eq!(state.room(&room.id).await.unwrap().status, RoomStatus::Ended);
    }

    #[tokio::test]
    async fn test_non_host_close_is_denied_and_leaves_status() {
        let (state, _clock, _store) = seeded_state().await;
        let room = room_with_two(&state).await;
        state.start_room("host", &room.id).await.unwrap();

        // Privileged, but not the host of this room
        let err = state.close_room("admin", &room.id).await.unwrap_err();
        assert_eq!(err.code(), "PERMISSION_DENIED");
        let err = state.close_room("alice", &room.id).await.unwrap_err();
        assert_eq!(err.code(), "PERMISSION_DENIED");
        assert_eq!(
            state.room(&room.id).await.unwrap().status,
            RoomStatus::Started
        );
    }

    #[tokio::test]
    async fn test_start_pushes_to_waiting_participants() {
        let (state, _clock, _store) = seeded_state().await;
        let room = room_with_two(&state).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        state.broadcaster.register("alice", 1, tx).await.unwrap();

        assert_eq!(
            state.begin_exam("alice", &room.id).await.unwrap(),
            ExamStart::Waiting
        );
        assert_eq!(state.waiting_count(&room.id).await, 1);

        let start_time = state.start_room("host", &room.id).await.unwrap();
        assert_eq!(state.waiting_count(&room.id).await, 0);
        assert_eq!(
            rx.recv().await,
            Some(Event::RoomStarted {
                room_id: room.id.clone(),
                start_time,
            })
        );
    }

    #[tokio::test]
    async fn test_begin_exam_never_extends_time() {
        let (state, clock, _store) = seeded_state().await;
        let room = room_with_two(&state).await;
        state.start_room("host", &room.id).await.unwrap();

        clock.advance(20);
        let ExamStart::Started {
            remaining_secs,
            questions,
        } = state.begin_exam("alice", &room.id).await.unwrap()
        else {
            panic!("expected a started exam");
        };
        assert_eq!(remaining_secs, 40);
        assert_eq!(questions.len(), 5);
        assert_eq!(
            state.participant(&room.id, "alice").await.unwrap().started_at,
            Some(T0 + 20)
        );

        clock.advance(15);
        let again = state.begin_exam("alice", &room.id).await.unwrap();
        assert!(matches!(again, ExamStart::Started { remaining_secs: 25, .. }));
        // First start time sticks
        assert_eq!(
            state.participant(&room.id, "alice").await.unwrap().started_at,
            Some(T0 + 20)
        );

        clock.advance(25);
        let err = state.begin_exam("alice", &room.id).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");
    }

    #[tokio::test]
    async fn test_begin_exam_requires_membership() {
        let (state, _clock, _store) = seeded_state().await;
        let room = room_with_two(&state).await;
        let err = state.begin_exam("carol", &room.id).await.unwrap_err();
        assert_eq!(err.code(), "PERMISSION_DENIED");
    }

    #[tokio::test]
    async fn test_only_one_exam_in_progress() {
        let (state, _clock, _store) = seeded_state().await;
        let first = room_with_two(&state).await;
        let second = state
            .create_room("host", "Other", 5, Some(DifficultyCounts::new(1, 0, 0)))
            .await
            .unwrap();
        state.join_room("alice", &second.id).await.unwrap();

        state.start_room("host", &first.id).await.unwrap();
        state.start_room("host", &second.id).await.unwrap();
        state.begin_exam("alice", &first.id).await.unwrap();

        let err = state.begin_exam("alice", &second.id).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");

        state.submit("alice", &first.id).await.unwrap();
        assert!(matches!(
            state.begin_exam("alice", &second.id).await.unwrap(),
            ExamStart::Started { .. }
        ));
    }

    #[tokio::test]
    async fn test_cancel_wait() {
        let (state, _clock, _store) = seeded_state().await;
        let room = room_with_two(&state).await;
        state.begin_exam("bob", &room.id).await.unwrap();
        state.cancel_wait("bob", &room.id).await.unwrap();
        assert_eq!(state.waiting_count(&room.id).await, 0);
        // Not waiting at all is fine too
        state.cancel_wait("bob", &room.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_drop_waits_clears_every_room() {
        let (state, _clock, _store) = seeded_state().await;
        let first = room_with_two(&state).await;
        let second = room_with_two(&state).await;
        for room in [&first, &second] {
            state.begin_exam("bob", &room.id).await.unwrap();
        }
        state.begin_exam("alice", &first.id).await.unwrap();

        assert_eq!(state.drop_waits("bob").await, 2);
        assert_eq!(state.waiting_count(&first.id).await, 1);
        assert_eq!(state.waiting_count(&second.id).await, 0);
        assert_eq!(state.drop_waits("bob").await, 0);
    }

    #[tokio::test]
    async fn test_delete_room_pushes_and_cascades() {
        let (state, _clock, store) = seeded_state().await;
        let room = room_with_two(&state).await;
        state.start_room("host", &room.id).await.unwrap();
        state.begin_exam("bob", &room.id).await.unwrap();
        state.save_answer("bob", &room.id, "e1", 1).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        state.broadcaster.register("bob", 7, tx).await.unwrap();

        let err = state.delete_room("alice", &room.id).await.unwrap_err();
        assert_eq!(err.code(), "PERMISSION_DENIED");

        state.delete_room("host", &room.id).await.unwrap();
        assert!(state.room(&room.id).await.is_none());
        assert!(store.load_rooms().await.unwrap().is_empty());
        assert!(store.answers_for("bob", &room.id).await.unwrap().is_empty());
        assert_eq!(
            rx.recv().await,
            Some(Event::RoomDeleted {
                room_id: room.id.clone()
            })
        );
    }

    #[tokio::test]
    async fn test_close_started_room_auto_submits_pending() {
        let (state, clock, store) = seeded_state().await;
        let room = room_with_two(&state).await;
        state.start_room("host", &room.id).await.unwrap();
        state.begin_exam("alice", &room.id).await.unwrap();
        state.save_answer("alice", &room.id, "e2", 1).await.unwrap();
        state.begin_exam("bob", &room.id).await.unwrap();
        state.submit("bob", &room.id).await.unwrap();

        clock.advance(30);
        state.close_room("host", &room.id).await.unwrap();

        let results = store.results_for_room(&room.id).await.unwrap();
        assert_eq!(results.len(), 2);
        let alice = store.get_result("alice", &room.id).await.unwrap().unwrap();
        assert!(alice.auto_submitted);
        assert_eq!(alice.score, 1);
        assert!(state.participant(&room.id, "alice").await.unwrap().has_taken_exam);
    }

    #[tokio::test]
    async fn test_close_waiting_room_creates_no_results() {
        let (state, _clock, store) = seeded_state().await;
        let room = room_with_two(&state).await;
        state.close_room("host", &room.id).await.unwrap();
        assert!(store.results_for_room(&room.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_start_leaves_room_waiting() {
        let (state, _clock, store) = seeded_state().await;
        let room = room_with_two(&state).await;
        store.set_unavailable(true);
        let err = state.start_room("host", &room.id).await.unwrap_err();
        assert_eq!(err.code(), "STORAGE");
        assert_eq!(
            state.room(&room.id).await.unwrap().status,
            RoomStatus::Waiting
        );
    }
}
