mod answer;
mod practice;
mod question;
mod resume;
mod room;

pub use answer::AutoSubmitReport;
pub use resume::ResumedExam;
pub use room::ExamStart;

use crate::broadcast::Broadcaster;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{RoomError, RoomResult};
use crate::metrics::Metrics;
use crate::store::{DocumentStore, Store};
use crate::types::*;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Every exam room, practice room and practice session.
///
/// Guarded by the single process-wide lock in [`AppState::registry`].
#[derive(Debug, Default)]
pub struct Registry {
    pub rooms: HashMap<RoomId, Room>,
    pub practices: HashMap<PracticeId, PracticeRoom>,
    pub sessions: HashMap<SessionId, PracticeSession>,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RwLock<Registry>>,
    pub store: Arc<dyn Store>,
    pub broadcaster: Arc<Broadcaster>,
    pub clock: Arc<dyn Clock>,
    pub metrics: Arc<Metrics>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        let metrics = Arc::new(Metrics::default());
        Self {
            registry: Arc::new(RwLock::new(Registry::default())),
            store,
            broadcaster: Arc::new(Broadcaster::new(metrics.clone())),
            clock,
            metrics,
            config: Arc::new(config),
        }
    }

    /// Default config, system clock and an in-memory store
    pub fn in_memory() -> Self {
        Self::new(
            Config::default(),
            Arc::new(DocumentStore::in_memory()),
            Arc::new(SystemClock),
        )
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Rebuild the room registry from the store after a restart.
    ///
    /// Started rooms keep their original start time, so a deadline that passed
    /// while the server was down is picked up by the next sweep.
    pub async fn restore(&self) -> RoomResult<usize> {
        let persisted = self.store.load_rooms().await?;
        let mut registry = self.registry.write().await;
        for (record, participants) in persisted {
            let mut room = Room::new(record);
            for participant in participants {
                room.participants
                    .insert(participant.user_id.clone(), participant);
            }
            registry.rooms.insert(room.record.id.clone(), room);
        }
        let count = registry.rooms.len();
        tracing::info!("Restored {} room(s) from store", count);
        Ok(count)
    }

    /// Look up a user known to the store
    pub async fn user(&self, user_id: &str) -> RoomResult<User> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| RoomError::NotFound(format!("user {}", user_id)))
    }

    pub(crate) async fn privileged_user(&self, user_id: &str, action: &str) -> RoomResult<User> {
        let user = self.user(user_id).await?;
        if !user.role.is_privileged() {
            return Err(RoomError::PermissionDenied(format!(
                "only teachers and admins can {}",
                action
            )));
        }
        Ok(user)
    }

    /// Current persisted-shape snapshot of one room
    pub async fn room(&self, room_id: &str) -> Option<RoomRecord> {
        self.registry
            .read()
            .await
            .rooms
            .get(room_id)
            .map(|r| r.record.clone())
    }

    pub async fn participant(&self, room_id: &str, user_id: &str) -> Option<Participant> {
        self.registry
            .read()
            .await
            .rooms
            .get(room_id)
            .and_then(|r| r.participants.get(user_id).cloned())
    }
}

/// Pick `counts` random questions per difficulty from `bank`
pub(crate) fn pick_questions(
    bank: &[Question],
    counts: DifficultyCounts,
) -> RoomResult<Vec<QuestionId>> {
    use rand::seq::SliceRandom;

    if counts.total() == 0 {
        return Err(RoomError::InvalidInput(
            "at least one question is required".to_string(),
        ));
    }

    let mut rng = rand::rng();
    let mut selected = Vec::with_capacity(bank.len().min(counts.total() as usize));
    for difficulty in Difficulty::ALL {
        let wanted = counts.get(difficulty) as usize;
        let mut pool: Vec<&Question> = bank.iter().filter(|q| q.difficulty == difficulty).collect();
        if pool.len() < wanted {
            return Err(RoomError::InvalidInput(format!(
                "only {} {:?} question(s) available, {} requested",
                pool.len(),
                difficulty,
                wanted
            )));
        }
        pool.shuffle(&mut rng);
        selected.extend(pool.into_iter().take(wanted).map(|q| q.id.clone()));
    }
    Ok(selected)
}


#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;

    #[test]
    fn test_pick_questions_respects_counts() {
        let bank = vec![
            question("e1", Difficulty::Easy, 1),
            question("e2", Difficulty::Easy, 1),
            question("m1", Difficulty::Medium, 1),
            question("h1", Difficulty::Hard, 1),
        ];
        let picked = pick_questions(&bank, DifficultyCounts::new(2, 1, 0)).unwrap();
        assert_eq!(picked.len(), 3);
        assert!(picked.contains(&"e1".to_string()));
        assert!(picked.contains(&"e2".to_string()));
        assert!(picked.contains(&"m1".to_string()));
    }

    #[test]
    fn test_pick_questions_rejects_short_bank() {
        let bank = vec![question("h1", Difficulty::Hard, 1)];
        let err = pick_questions(&bank, DifficultyCounts::new(0, 0, 2)).unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
        let err = pick_questions(&bank, DifficultyCounts::default()).unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
    }

    #[tokio::test]
    async fn test_huge_counts_are_rejected() {
        let (state, _clock, _store) = seeded_state().await;
        for counts in [
            DifficultyCounts::new(u32::MAX, 1, 0),
            DifficultyCounts::new(4_000_000_000, 0, 0),
            DifficultyCounts::new(1, 1, u32::MAX),
        ] {
            let err = state
                .create_room("host", "Huge", 5, Some(counts))
                .await
                .unwrap_err();
            assert_eq!(err.code(), "INVALID_INPUT");
            let err = state
                .create_practice("host", "Huge", false, Some(counts))
                .await
                .unwrap_err();
            assert_eq!(err.code(), "INVALID_INPUT");
        }
        assert!(state.list_rooms().await.is_empty());
    }

    #[tokio::test]
    async fn test_restore_rebuilds_rooms_and_participants() {
        let (state, _clock, store) = seeded_state().await;
        let room = room_with_two(&state).await;
        state.start_room("host", &room.id).await.unwrap();

        let restarted = AppState::new(Config::default(), store, state.clock.clone());
        assert_eq!(restarted.restore().await.unwrap(), 1);

        let restored = restarted.room(&room.id).await.unwrap();
        assert_eq!(restored.status, RoomStatus::Started);
        assert_eq!(restored.start_time, Some(T0));
        assert!(restarted.participant(&room.id, "alice").await.is_some());
        assert!(restarted.participant(&room.id, "bob").await.is_some());
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let (state, _clock, _store) = seeded_state().await;
        let err = state.user("mallory").await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }
}
