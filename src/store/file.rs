use super::{Store, StoreDocument, StoreResult};
use crate::error::StoreError;
use crate::types::*;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

/// Store backed by a single [`StoreDocument`].
///
/// With a path, the document is rewritten to disk (temp file + rename) after
/// every mutation while the document lock is held, so the file never sees
/// writes out of order. A failed write rolls the in-memory document back.
#[derive(Debug)]
pub struct DocumentStore {
    doc: Mutex<StoreDocument>,
    path: Option<PathBuf>,
    /// When set, every write fails with `StoreError::Unavailable`
    unavailable: AtomicBool,
}

impl DocumentStore {
    pub fn in_memory() -> Self {
        Self::from_document(StoreDocument::default())
    }

    pub fn from_document(doc: StoreDocument) -> Self {
        Self {
            doc: Mutex::new(doc),
            path: None,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Open (or create) the JSON document at `path`
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let doc = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let doc: StoreDocument = serde_json::from_slice(&bytes)?;
                doc.validate().map_err(StoreError::Unavailable)?;
                tracing::info!(
                    "Loaded store from {} ({} rooms, {} questions, {} users)",
                    path.display(),
                    doc.rooms.len(),
                    doc.questions.len(),
                    doc.users.len()
                );
                doc
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("No store at {}, starting empty", path.display());
                let doc = StoreDocument::default();
                persist(&path, &doc).await?;
                doc
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            doc: Mutex::new(doc),
            path: Some(path),
            unavailable: AtomicBool::new(false),
        })
    }

    /// Simulate an outage of the backing storage
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn snapshot(&self) -> StoreDocument {
        self.doc.lock().await.clone()
    }

    async fn write<R>(&self, f: impl FnOnce(&mut StoreDocument) -> R) -> StoreResult<R> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes are disabled".to_string()));
        }

        let mut doc = self.doc.lock().await;
        let Some(path) = &self.path else {
            return Ok(f(&mut doc));
        };

        let before = doc.clone();
        let out = f(&mut doc);
        if let Err(e) = persist(path, &doc).await {
            *doc = before;
            return Err(e);
        }
        Ok(out)
    }

    async fn read<R>(&self, f: impl FnOnce(&StoreDocument) -> R) -> R {
        let doc = self.doc.lock().await;
        f(&doc)
    }
}

async fn persist(path: &Path, doc: &StoreDocument) -> StoreResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec(doc)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl Store for DocumentStore {
    async fn get_user(&self, user_id: &str) -> StoreResult<Option<User>> {
        Ok(self.read(|doc| doc.users.get(user_id).cloned()).await)
    }

    async fn upsert_user(&self, user: User) -> StoreResult<()> {
        self.write(|doc| {
            doc.users.insert(user.id.clone(), user);
        })
        .await
    }

    async fn list_questions(&self) -> StoreResult<Vec<Question>> {
        Ok(self.read(|doc| doc.questions.values().cloned().collect()).await)
    }

    async fn get_questions(&self, ids: &[QuestionId]) -> StoreResult<Vec<Question>> {
        Ok(self.read(|doc| doc.get_questions(ids)).await)
    }

    async fn insert_question(&self, question: Question) -> StoreResult<()> {
        self.write(|doc| {
            doc.questions.insert(question.id.clone(), question);
        })
        .await
    }

    async fn load_rooms(&self) -> StoreResult<Vec<(RoomRecord, Vec<Participant>)>> {
        Ok(self.read(|doc| doc.load_rooms()).await)
    }

    async fn upsert_room(&self, room: &RoomRecord) -> StoreResult<()> {
        self.write(|doc| {
            doc.rooms.insert(room.id.clone(), room.clone());
        })
        .await
    }

    async fn delete_room(&self, room_id: &str) -> StoreResult<()> {
        self.write(|doc| doc.delete_room(room_id)).await
    }

    async fn upsert_participant(&self, participant: &Participant) -> StoreResult<()> {
        self.write(|doc| doc.upsert_participant(participant)).await
    }

    async fn upsert_answer(
        &self,
        user_id: &str,
        room_id: &str,
        question_id: &str,
        option: u8,
    ) -> StoreResult<()> {
        self.write(|doc| doc.upsert_answer(user_id, room_id, question_id, option))
            .await
    }

    async fn answers_for(
        &self,
        user_id: &str,
        room_id: &str,
    ) -> StoreResult<BTreeMap<QuestionId, u8>> {
        Ok(self.read(|doc| doc.answers_for(user_id, room_id)).await)
    }

    async fn get_result(&self, user_id: &str, room_id: &str) -> StoreResult<Option<ExamResult>> {
        Ok(self.read(|doc| doc.get_result(user_id, room_id)).await)
    }

    async fn insert_result(&self, result: &ExamResult) -> StoreResult<bool> {
        self.write(|doc| doc.insert_result(result)).await
    }

    async fn results_for_room(&self, room_id: &str) -> StoreResult<Vec<ExamResult>> {
        Ok(self.read(|doc| doc.results_for_room(room_id)).await)
    }

    async fn insert_practice_result(&self, result: &PracticeResult) -> StoreResult<()> {
        self.write(|doc| doc.practice_results.push(result.clone()))
            .await
    }

    async fn practice_results_for(&self, user_id: &str) -> StoreResult<Vec<PracticeResult>> {
        Ok(self
            .read(|doc| {
                doc.practice_results
                    .iter()
                    .filter(|r| r.user_id == user_id)
                    .cloned()
                    .collect()
            })
            .await)
    }
}
