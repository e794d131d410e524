use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Schema version of the persisted document
pub const STORE_SCHEMA_VERSION: u32 = 1;

/// All persisted tables in one serializable value.
///
/// Both store implementations operate on this; the file store additionally
/// writes it to disk after every mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreDocument {
    pub schema_version: u32,
    #[serde(default)]
    pub users: BTreeMap<UserId, User>,
    #[serde(default)]
    pub questions: BTreeMap<QuestionId, Question>,
    #[serde(default)]
    pub rooms: BTreeMap<RoomId, RoomRecord>,
    /// room -> user -> participant
    #[serde(default)]
    pub participants: BTreeMap<RoomId, BTreeMap<UserId, Participant>>,
    /// room -> user -> question -> option
    #[serde(default)]
    pub answers: BTreeMap<RoomId, BTreeMap<UserId, BTreeMap<QuestionId, u8>>>,
    /// room -> user -> result
    #[serde(default)]
    pub results: BTreeMap<RoomId, BTreeMap<UserId, ExamResult>>,
    #[serde(default)]
    pub practice_results: Vec<PracticeResult>,
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self {
            schema_version: STORE_SCHEMA_VERSION,
            users: BTreeMap::new(),
            questions: BTreeMap::new(),
            rooms: BTreeMap::new(),
            participants: BTreeMap::new(),
            answers: BTreeMap::new(),
            results: BTreeMap::new(),
            practice_results: Vec::new(),
        }
    }
}

impl StoreDocument {
    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version > STORE_SCHEMA_VERSION {
            return Err(format!(
                "Store schema version {} is newer than supported version {}",
                self.schema_version, STORE_SCHEMA_VERSION
            ));
        }

        for (room_id, room) in &self.rooms {
            for qid in &room.question_ids {
                if !self.questions.contains_key(qid) {
                    return Err(format!(
                        "Room '{}' references question '{}' which doesn't exist",
                        room_id, qid
                    ));
                }
            }
        }

        for room_id in self.participants.keys() {
            if !self.rooms.contains_key(room_id) {
                return Err(format!(
                    "Participants reference room '{}' which doesn't exist",
                    room_id
                ));
            }
        }

        Ok(())
    }

    pub fn get_questions(&self, ids: &[QuestionId]) -> Vec<Question> {
        ids.iter()
            .filter_map(|id| self.questions.get(id).cloned())
            .collect()
    }

    pub fn load_rooms(&self) -> Vec<(RoomRecord, Vec<Participant>)> {
        self.rooms
            .values()
            .map(|room| {
                let participants = self
                    .participants
                    .get(&room.id)
                    .map(|m| m.values().cloned().collect())
                    .unwrap_or_default();
                (room.clone(), participants)
            })
            .collect()
    }

    pub fn delete_room(&mut self, room_id: &str) {
        self.rooms.remove(room_id);
        self.participants.remove(room_id);
        self.answers.remove(room_id);
        self.results.remove(room_id);
    }

    pub fn upsert_participant(&mut self, participant: &Participant) {
        self.participants
            .entry(participant.room_id.clone())
            .or_default()
            .insert(participant.user_id.clone(), participant.clone());
    }

    pub fn upsert_answer(&mut self, user_id: &str, room_id: &str, question_id: &str, option: u8) {
        self.answers
            .entry(room_id.to_string())
            .or_default()
            .entry(user_id.to_string())
            .or_default()
            .insert(question_id.to_string(), option);
    }

    pub fn answers_for(&self, user_id: &str, room_id: &str) -> BTreeMap<QuestionId, u8> {
        self.answers
            .get(room_id)
            .and_then(|users| users.get(user_id))
            .cloned()
            .unwrap_or_default()
    }

    pub fn get_result(&self, user_id: &str, room_id: &str) -> Option<ExamResult> {
        self.results
            .get(room_id)
            .and_then(|users| users.get(user_id))
            .cloned()
    }

    pub fn insert_result(&mut self, result: &ExamResult) -> bool {
        let room_results = self.results.entry(result.room_id.clone()).or_default();
        if room_results.contains_key(&result.user_id) {
            return false;
        }
        room_results.insert(result.user_id.clone(), result.clone());
        true
    }

    pub fn results_for_room(&self, room_id: &str) -> Vec<ExamResult> {
        self.results
            .get(room_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }
}
