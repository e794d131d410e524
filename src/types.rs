use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Opaque ID types
pub type UserId = String;
pub type RoomId = String;
pub type QuestionId = String;
pub type PracticeId = String;
pub type SessionId = String;

/// Seconds since the Unix epoch
pub type Timestamp = i64;

/// Answer options are numbered 1..=4 on the wire
pub const OPTION_COUNT: u8 = 4;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl Role {
    /// Admins and teachers may create rooms and questions
    pub fn is_privileged(&self) -> bool {
        matches!(self, Role::Admin | Role::Teacher)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" | "med" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    pub id: QuestionId,
    pub text: String,
    pub options: [String; 4],
    /// 1-based index into `options`
    pub correct_answer: u8,
    pub difficulty: Difficulty,
}

/// How many questions of each difficulty a room asks
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DifficultyCounts {
    pub easy: u32,
    pub medium: u32,
    pub hard: u32,
}

impl DifficultyCounts {
    pub fn new(easy: u32, medium: u32, hard: u32) -> Self {
        Self { easy, medium, hard }
    }

    pub fn get(&self, difficulty: Difficulty) -> u32 {
        match difficulty {
            Difficulty::Easy => self.easy,
            Difficulty::Medium => self.medium,
            Difficulty::Hard => self.hard,
        }
    }

    /// Saturates instead of overflowing on absurd wire values
    pub fn total(&self) -> u32 {
        self.easy.saturating_add(self.medium).saturating_add(self.hard)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomStatus {
    Waiting,
    Started,
    Ended,
}

impl RoomStatus {
    /// Status only ever moves forward
    pub fn can_transition_to(&self, to: RoomStatus) -> bool {
        matches!(
            (self, to),
            (RoomStatus::Waiting, RoomStatus::Started)
                | (RoomStatus::Waiting, RoomStatus::Ended)
                | (RoomStatus::Started, RoomStatus::Ended)
        )
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RoomStatus::Waiting => "WAITING",
            RoomStatus::Started => "STARTED",
            RoomStatus::Ended => "ENDED",
        };
        f.write_str(s)
    }
}

/// Persisted shape of an exam room
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomRecord {
    pub id: RoomId,
    pub name: String,
    pub host_id: UserId,
    pub duration_minutes: u32,
    pub status: RoomStatus,
    pub start_time: Option<Timestamp>,
    pub counts: DifficultyCounts,
    pub question_ids: Vec<QuestionId>,
    pub created_at: Timestamp,
}

impl RoomRecord {
    pub fn duration_secs(&self) -> i64 {
        i64::from(self.duration_minutes) * 60
    }

    /// Deadline derived from the host's start time, the only clock that counts
    pub fn deadline(&self) -> Option<Timestamp> {
        self.start_time.map(|start| start + self.duration_secs())
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.deadline().is_some_and(|deadline| deadline <= now)
    }

    /// Seconds left for everyone in this room, clamped at zero
    pub fn remaining_secs(&self, now: Timestamp) -> i64 {
        self.deadline()
            .map(|deadline| (deadline - now).max(0))
            .unwrap_or_else(|| self.duration_secs())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub joined_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub has_taken_exam: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExamResult {
    pub user_id: UserId,
    pub room_id: RoomId,
    pub score: u32,
    pub total_questions: u32,
    pub time_taken: i64,
    pub submitted_at: Timestamp,
    #[serde(default)]
    pub auto_submitted: bool,
}

/// In-memory room: the persisted record plus connection-only bookkeeping
#[derive(Debug, Clone)]
pub struct Room {
    pub record: RoomRecord,
    pub participants: BTreeMap<UserId, Participant>,
    /// Participants blocked in `begin_exam` waiting for the host
    pub waiting: HashSet<UserId>,
}

impl Room {
    pub fn new(record: RoomRecord) -> Self {
        Self {
            record,
            participants: BTreeMap::new(),
            waiting: HashSet::new(),
        }
    }

    pub fn participant_ids(&self) -> Vec<UserId> {
        self.participants.keys().cloned().collect()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PracticeStatus {
    Open,
    Closed,
}

impl fmt::Display for PracticeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PracticeStatus::Open => f.write_str("OPEN"),
            PracticeStatus::Closed => f.write_str("CLOSED"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PracticeRoom {
    pub id: PracticeId,
    pub name: String,
    pub host_id: UserId,
    pub status: PracticeStatus,
    pub show_answers: bool,
    pub question_ids: Vec<QuestionId>,
}

/// An attempt in progress; finished sessions live on only as a stored
/// [`PracticeResult`]
#[derive(Debug, Clone)]
pub struct PracticeSession {
    pub id: SessionId,
    pub practice_id: PracticeId,
    pub user_id: UserId,
    pub started_at: Timestamp,
    pub answers: BTreeMap<QuestionId, u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PracticeResult {
    pub session_id: SessionId,
    pub practice_id: PracticeId,
    pub user_id: UserId,
    pub score: u32,
    pub total_questions: u32,
    pub time_taken: i64,
}

/// Score a set of saved answers against the asked questions.
///
/// Answers to questions outside `asked` never count.
pub fn score_answers(asked: &[Question], answers: &BTreeMap<QuestionId, u8>) -> u32 {
    asked
        .iter()
        .filter(|q| answers.get(&q.id) == Some(&q.correct_answer))
        .count() as u32
}
