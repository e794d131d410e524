//! Durable store seam.
//!
//! The registry treats persistence as an upsert/query surface. The store is
//! the single source of truth for answers and results: submit, resume and the
//! deadline sweeper all read answers through [`Store::answers_for`], and
//! [`Store::insert_result`] is insert-if-absent so that at most one result
//! ever exists per (user, room).

mod document;
mod file;

pub use document::{StoreDocument, STORE_SCHEMA_VERSION};
pub use file::DocumentStore;

use crate::error::StoreError;
use crate::types::*;
use async_trait::async_trait;
use std::collections::BTreeMap;

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_user(&self, user_id: &str) -> StoreResult<Option<User>>;

    async fn upsert_user(&self, user: User) -> StoreResult<()>;

    async fn list_questions(&self) -> StoreResult<Vec<Question>>;

    /// Questions in the order of `ids`; unknown ids are skipped
    async fn get_questions(&self, ids: &[QuestionId]) -> StoreResult<Vec<Question>>;

    async fn insert_question(&self, question: Question) -> StoreResult<()>;

    /// Every persisted room with its participants, for restoring the registry
    async fn load_rooms(&self) -> StoreResult<Vec<(RoomRecord, Vec<Participant>)>>;

    async fn upsert_room(&self, room: &RoomRecord) -> StoreResult<()>;

    /// Remove a room together with its participants, answers and results
    async fn delete_room(&self, room_id: &str) -> StoreResult<()>;

    async fn upsert_participant(&self, participant: &Participant) -> StoreResult<()>;

    /// Last write wins per (user, room, question)
    async fn upsert_answer(
        &self,
        user_id: &str,
        room_id: &str,
        question_id: &str,
        option: u8,
    ) -> StoreResult<()>;

    async fn answers_for(&self, user_id: &str, room_id: &str)
        -> StoreResult<BTreeMap<QuestionId, u8>>;

    async fn get_result(&self, user_id: &str, room_id: &str) -> StoreResult<Option<ExamResult>>;

    /// Returns `false` and leaves the stored result untouched if one exists
    async fn insert_result(&self, result: &ExamResult) -> StoreResult<bool>;

    async fn results_for_room(&self, room_id: &str) -> StoreResult<Vec<ExamResult>>;

    async fn insert_practice_result(&self, result: &PracticeResult) -> StoreResult<()>;

    async fn practice_results_for(&self, user_id: &str) -> StoreResult<Vec<PracticeResult>>;
}
