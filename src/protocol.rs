//! Line protocol.
//!
//! Client → server: one `|`-delimited command per line.
//! Server → client: every line starts with a frame header, `RPL|` for the
//! reply to the last command and `EVT|` for pushed events, so pushes can
//! arrive at any time without being mistaken for a reply.

use crate::types::*;
use std::fmt;

pub const REPLY_HEADER: &str = "RPL";
pub const EVENT_HEADER: &str = "EVT";

/// Longest accepted command line in bytes
pub const MAX_LINE_LEN: usize = 8 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Login {
        user_id: UserId,
    },
    Ping,
    Quit,
    ListRooms,
    CreateRoom {
        name: String,
        duration_minutes: u32,
        counts: Option<DifficultyCounts>,
    },
    JoinRoom {
        room_id: RoomId,
    },
    StartRoom {
        room_id: RoomId,
    },
    BeginExam {
        room_id: RoomId,
    },
    CancelWait {
        room_id: RoomId,
    },
    ResumeExam {
        room_id: RoomId,
    },
    SaveAnswer {
        room_id: RoomId,
        question_id: QuestionId,
        option: u8,
    },
    SubmitTest {
        room_id: RoomId,
    },
    CloseRoom {
        room_id: RoomId,
    },
    DeleteRoom {
        room_id: RoomId,
    },
    AddQuestion {
        difficulty: Difficulty,
        text: String,
        options: [String; 4],
        correct_answer: u8,
    },
    ListPractice,
    CreatePractice {
        name: String,
        show_answers: bool,
        counts: Option<DifficultyCounts>,
    },
    StartPractice {
        practice_id: PracticeId,
    },
    RestartPractice {
        practice_id: PracticeId,
    },
    PracticeAnswer {
        session_id: SessionId,
        question_id: QuestionId,
        option: u8,
    },
    FinishPractice {
        session_id: SessionId,
    },
    ClosePractice {
        practice_id: PracticeId,
    },
}

/// Why a line could not be turned into a [`Command`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}'")]
    Unknown(String),
    #[error("{command} expects {expected}")]
    Arity {
        command: &'static str,
        expected: &'static str,
    },
    #[error("invalid {field}: '{value}'")]
    InvalidField { field: &'static str, value: String },
}

fn field<'a>(parts: &[&'a str], idx: usize) -> &'a str {
    parts.get(idx).map(|s| s.trim()).unwrap_or("")
}

fn non_empty(value: &str, name: &'static str) -> Result<String, ParseError> {
    if value.is_empty() {
        return Err(ParseError::InvalidField {
            field: name,
            value: value.to_string(),
        });
    }
    Ok(value.to_string())
}

fn number<T: std::str::FromStr>(value: &str, name: &'static str) -> Result<T, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidField {
        field: name,
        value: value.to_string(),
    })
}

fn option_number(value: &str) -> Result<u8, ParseError> {
    let option: u8 = number(value, "option")?;
    if !(1..=OPTION_COUNT).contains(&option) {
        return Err(ParseError::InvalidField {
            field: "option",
            value: value.to_string(),
        });
    }
    Ok(option)
}

fn flag(value: &str) -> Result<bool, ParseError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ParseError::InvalidField {
            field: "flag",
            value: value.to_string(),
        }),
    }
}

fn counts(parts: &[&str], from: usize) -> Result<Option<DifficultyCounts>, ParseError> {
    match parts.len().saturating_sub(from) {
        0 => Ok(None),
        3 => Ok(Some(DifficultyCounts::new(
            number(field(parts, from), "easy count")?,
            number(field(parts, from + 1), "medium count")?,
            number(field(parts, from + 2), "hard count")?,
        ))),
        _ => Err(ParseError::Arity {
            command: "counts",
            expected: "easy|medium|hard",
        }),
    }
}

macro_rules! arity {
    ($parts:expr, $n:expr, $command:expr, $expected:expr) => {
        if $parts.len() != $n {
            return Err(ParseError::Arity {
                command: $command,
                expected: $expected,
            });
        }
    };
}

impl Command {
    /// Parse one command line (without the trailing newline)
    pub fn parse(line: &str) -> Result<Command, ParseError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Err(ParseError::Empty);
        }
        let parts: Vec<&str> = line.split('|').collect();
        let verb = parts[0].trim().to_ascii_uppercase();

        let cmd = match verb.as_str() {
            "LOGIN" => {
                arity!(parts, 2, "LOGIN", "LOGIN|user_id");
                Command::Login {
                    user_id: non_empty(field(&parts, 1), "user_id")?,
                }
            }
            "PING" => Command::Ping,
            "QUIT" => Command::Quit,
            "LIST_ROOMS" => Command::ListRooms,
            "CREATE_ROOM" => {
                if parts.len() != 3 && parts.len() != 6 {
                    return Err(ParseError::Arity {
                        command: "CREATE_ROOM",
                        expected: "CREATE_ROOM|name|duration[|easy|medium|hard]",
                    });
                }
                Command::CreateRoom {
                    name: non_empty(field(&parts, 1), "name")?,
                    duration_minutes: number(field(&parts, 2), "duration")?,
                    counts: counts(&parts, 3)?,
                }
            }
            "JOIN_ROOM" | "START_ROOM" | "BEGIN_EXAM" | "CANCEL_WAIT" | "RESUME_EXAM"
            | "SUBMIT_TEST" | "CLOSE_ROOM" | "DELETE_ROOM" => {
                arity!(parts, 2, "room command", "COMMAND|room_id");
                let room_id = non_empty(field(&parts, 1), "room_id")?;
                match verb.as_str() {
                    "JOIN_ROOM" => Command::JoinRoom { room_id },
                    "START_ROOM" => Command::StartRoom { room_id },
                    "BEGIN_EXAM" => Command::BeginExam { room_id },
                    "CANCEL_WAIT" => Command::CancelWait { room_id },
                    "RESUME_EXAM" => Command::ResumeExam { room_id },
                    "SUBMIT_TEST" => Command::SubmitTest { room_id },
                    "CLOSE_ROOM" => Command::CloseRoom { room_id },
                    _ => Command::DeleteRoom { room_id },
                }
            }
            "SAVE_ANSWER" => {
                arity!(parts, 4, "SAVE_ANSWER", "SAVE_ANSWER|room_id|question_id|option");
                Command::SaveAnswer {
                    room_id: non_empty(field(&parts, 1), "room_id")?,
                    question_id: non_empty(field(&parts, 2), "question_id")?,
                    option: option_number(field(&parts, 3))?,
                }
            }
            "ADD_QUESTION" => {
                arity!(
                    parts,
                    8,
                    "ADD_QUESTION",
                    "ADD_QUESTION|difficulty|text|A|B|C|D|correct"
                );
                let difficulty =
                    field(&parts, 1)
                        .parse()
                        .map_err(|_| ParseError::InvalidField {
                            field: "difficulty",
                            value: field(&parts, 1).to_string(),
                        })?;
                Command::AddQuestion {
                    difficulty,
                    text: non_empty(field(&parts, 2), "text")?,
                    options: [
                        non_empty(field(&parts, 3), "option A")?,
                        non_empty(field(&parts, 4), "option B")?,
                        non_empty(field(&parts, 5), "option C")?,
                        non_empty(field(&parts, 6), "option D")?,
                    ],
                    correct_answer: option_number(field(&parts, 7))?,
                }
            }
            "LIST_PRACTICE" => Command::ListPractice,
            "CREATE_PRACTICE" => {
                if parts.len() != 3 && parts.len() != 6 {
                    return Err(ParseError::Arity {
                        command: "CREATE_PRACTICE",
                        expected: "CREATE_PRACTICE|name|show_answers[|easy|medium|hard]",
                    });
                }
                Command::CreatePractice {
                    name: non_empty(field(&parts, 1), "name")?,
                    show_answers: flag(field(&parts, 2))?,
                    counts: counts(&parts, 3)?,
                }
            }
            "START_PRACTICE" | "RESTART_PRACTICE" | "CLOSE_PRACTICE" => {
                arity!(parts, 2, "practice command", "COMMAND|practice_id");
                let practice_id = non_empty(field(&parts, 1), "practice_id")?;
                match verb.as_str() {
                    "START_PRACTICE" => Command::StartPractice { practice_id },
                    "RESTART_PRACTICE" => Command::RestartPractice { practice_id },
                    _ => Command::ClosePractice { practice_id },
                }
            }
            "PRACTICE_ANSWER" => {
                arity!(
                    parts,
                    4,
                    "PRACTICE_ANSWER",
                    "PRACTICE_ANSWER|session_id|question_id|option"
                );
                Command::PracticeAnswer {
                    session_id: non_empty(field(&parts, 1), "session_id")?,
                    question_id: non_empty(field(&parts, 2), "question_id")?,
                    option: option_number(field(&parts, 3))?,
                }
            }
            "FINISH_PRACTICE" => {
                arity!(parts, 2, "FINISH_PRACTICE", "FINISH_PRACTICE|session_id");
                Command::FinishPractice {
                    session_id: non_empty(field(&parts, 1), "session_id")?,
                }
            }
            other => return Err(ParseError::Unknown(other.to_string())),
        };
        Ok(cmd)
    }

    /// Wire form of this command, used by the client
    pub fn encode(&self) -> String {
        match self {
            Command::Login { user_id } => format!("LOGIN|{}", user_id),
            Command::Ping => "PING".to_string(),
            Command::Quit => "QUIT".to_string(),
            Command::ListRooms => "LIST_ROOMS".to_string(),
            Command::CreateRoom {
                name,
                duration_minutes,
                counts,
            } => {
                let mut line = format!("CREATE_ROOM|{}|{}", sanitize(name), duration_minutes);
                if let Some(c) = counts {
                    line.push_str(&format!("|{}|{}|{}", c.easy, c.medium, c.hard));
                }
                line
            }
            Command::JoinRoom { room_id } => format!("JOIN_ROOM|{}", room_id),
            Command::StartRoom { room_id } => format!("START_ROOM|{}", room_id),
            Command::BeginExam { room_id } => format!("BEGIN_EXAM|{}", room_id),
            Command::CancelWait { room_id } => format!("CANCEL_WAIT|{}", room_id),
            Command::ResumeExam { room_id } => format!("RESUME_EXAM|{}", room_id),
            Command::SaveAnswer {
                room_id,
                question_id,
                option,
            } => format!("SAVE_ANSWER|{}|{}|{}", room_id, question_id, option),
            Command::SubmitTest { room_id } => format!("SUBMIT_TEST|{}", room_id),
            Command::CloseRoom { room_id } => format!("CLOSE_ROOM|{}", room_id),
            Command::DeleteRoom { room_id } => format!("DELETE_ROOM|{}", room_id),
            Command::AddQuestion {
                difficulty,
                text,
                options,
                correct_answer,
            } => format!(
                "ADD_QUESTION|{:?}|{}|{}|{}|{}|{}|{}",
                difficulty,
                sanitize(text),
                sanitize(&options[0]),
                sanitize(&options[1]),
                sanitize(&options[2]),
                sanitize(&options[3]),
                correct_answer
            ),
            Command::ListPractice => "LIST_PRACTICE".to_string(),
            Command::CreatePractice {
                name,
                show_answers,
                counts,
            } => {
                let mut line = format!(
                    "CREATE_PRACTICE|{}|{}",
                    sanitize(name),
                    u8::from(*show_answers)
                );
                if let Some(c) = counts {
                    line.push_str(&format!("|{}|{}|{}", c.easy, c.medium, c.hard));
                }
                line
            }
            Command::StartPractice { practice_id } => format!("START_PRACTICE|{}", practice_id),
            Command::RestartPractice { practice_id } => {
                format!("RESTART_PRACTICE|{}", practice_id)
            }
            Command::PracticeAnswer {
                session_id,
                question_id,
                option,
            } => format!("PRACTICE_ANSWER|{}|{}|{}", session_id, question_id, option),
            Command::FinishPractice { session_id } => format!("FINISH_PRACTICE|{}", session_id),
            Command::ClosePractice { practice_id } => format!("CLOSE_PRACTICE|{}", practice_id),
        }
    }
}

/// Replace characters that would break the framing of a text field
pub fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '|' => '/',
            ':' => ';',
            '\r' | '\n' => ' ',
            other => other,
        })
        .collect()
}

/// Question as shown to a participant: never carries the correct answer
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionView {
    pub id: QuestionId,
    pub text: String,
    pub options: [String; 4],
    /// Saved option for resume, 0 when unanswered
    pub saved: Option<u8>,
}

impl QuestionView {
    pub fn from_question(q: &Question, saved: Option<u8>) -> Self {
        Self {
            id: q.id.clone(),
            text: q.text.clone(),
            options: q.options.clone(),
            saved,
        }
    }

    fn encode(&self) -> String {
        let mut out = format!(
            "{}:{}:{}:{}:{}:{}",
            self.id,
            sanitize(&self.text),
            sanitize(&self.options[0]),
            sanitize(&self.options[1]),
            sanitize(&self.options[2]),
            sanitize(&self.options[3])
        );
        if let Some(saved) = self.saved {
            out.push_str(&format!(":{}", saved));
        }
        out
    }

    /// Inverse of the wire form; `with_saved` selects the resume layout
    pub fn decode(raw: &str, with_saved: bool) -> Option<Self> {
        let parts: Vec<&str> = raw.split(':').collect();
        let expected = if with_saved { 7 } else { 6 };
        if parts.len() != expected {
            return None;
        }
        let saved = if with_saved {
            Some(parts[6].parse().ok()?)
        } else {
            None
        };
        Some(Self {
            id: parts[0].to_string(),
            text: parts[1].to_string(),
            options: [
                parts[2].to_string(),
                parts[3].to_string(),
                parts[4].to_string(),
                parts[5].to_string(),
            ],
            saved,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomSummary {
    pub id: RoomId,
    pub name: String,
    pub status: RoomStatus,
    pub duration_minutes: u32,
    pub participants: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PracticeSummary {
    pub id: PracticeId,
    pub name: String,
    pub status: PracticeStatus,
    pub questions: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    LoginOk {
        user: User,
    },
    Pong,
    Bye,
    ListRoomsOk {
        rooms: Vec<RoomSummary>,
    },
    CreateRoomOk {
        room_id: RoomId,
        question_count: usize,
    },
    JoinRoomOk {
        room_id: RoomId,
    },
    StartRoomOk {
        room_id: RoomId,
        start_time: Timestamp,
    },
    ExamWaiting {
        room_id: RoomId,
    },
    BeginExamOk {
        remaining_secs: i64,
        questions: Vec<QuestionView>,
    },
    CancelWaitOk {
        room_id: RoomId,
    },
    ResumeExamOk {
        remaining_secs: i64,
        questions: Vec<QuestionView>,
    },
    SaveAnswerOk,
    SubmitTestOk {
        score: u32,
        total: u32,
        time_taken: i64,
    },
    CloseRoomOk {
        room_id: RoomId,
    },
    DeleteRoomOk {
        room_id: RoomId,
    },
    AddQuestionOk {
        question_id: QuestionId,
    },
    ListPracticeOk {
        practices: Vec<PracticeSummary>,
    },
    CreatePracticeOk {
        practice_id: PracticeId,
        question_count: usize,
    },
    PracticeSessionOk {
        restarted: bool,
        session_id: SessionId,
        questions: Vec<QuestionView>,
    },
    PracticeAnswerOk {
        /// (was the answer correct, the correct option) when answers are revealed
        reveal: Option<(bool, u8)>,
    },
    FinishPracticeOk {
        score: u32,
        total: u32,
        time_taken: i64,
    },
    ClosePracticeOk {
        practice_id: PracticeId,
    },
    Error {
        code: String,
        msg: String,
    },
}

impl Reply {
    pub fn error(code: &str, msg: impl Into<String>) -> Self {
        Reply::Error {
            code: code.to_string(),
            msg: msg.into(),
        }
    }

    /// Reply body without the frame header
    pub fn encode(&self) -> String {
        fn join(items: impl Iterator<Item = String>) -> String {
            items.map(|i| format!("|{}", i)).collect()
        }

        match self {
            Reply::LoginOk { user } => format!(
                "LOGIN_OK|{}|{}|{}",
                user.id,
                sanitize(&user.name),
                user.role.as_str()
            ),
            Reply::Pong => "PONG".to_string(),
            Reply::Bye => "BYE".to_string(),
            Reply::ListRoomsOk { rooms } => format!(
                "LIST_ROOMS_OK{}",
                join(rooms.iter().map(|r| format!(
                    "{}:{}:{}:{}:{}",
                    r.id,
                    sanitize(&r.name),
                    r.status,
                    r.duration_minutes,
                    r.participants
                )))
            ),
            Reply::CreateRoomOk {
                room_id,
                question_count,
            } => format!("CREATE_ROOM_OK|{}|{}", room_id, question_count),
            Reply::JoinRoomOk { room_id } => format!("JOIN_ROOM_OK|{}", room_id),
            Reply::StartRoomOk {
                room_id,
                start_time,
            } => format!("START_ROOM_OK|{}|{}", room_id, start_time),
            Reply::ExamWaiting { room_id } => format!("EXAM_WAITING|{}", room_id),
            Reply::BeginExamOk {
                remaining_secs,
                questions,
            } => format!(
                "BEGIN_EXAM_OK|{}{}",
                remaining_secs,
                join(questions.iter().map(QuestionView::encode))
            ),
            Reply::CancelWaitOk { room_id } => format!("CANCEL_WAIT_OK|{}", room_id),
            Reply::ResumeExamOk {
                remaining_secs,
                questions,
            } => format!(
                "RESUME_EXAM_OK|{}{}",
                remaining_secs,
                join(questions.iter().map(QuestionView::encode))
            ),
            Reply::SaveAnswerOk => "SAVE_ANSWER_OK".to_string(),
            Reply::SubmitTestOk {
                score,
                total,
                time_taken,
            } => format!("SUBMIT_TEST_OK|{}|{}|{}", score, total, time_taken),
            Reply::CloseRoomOk { room_id } => format!("CLOSE_ROOM_OK|{}", room_id),
            Reply::DeleteRoomOk { room_id } => format!("DELETE_ROOM_OK|{}", room_id),
            Reply::AddQuestionOk { question_id } => format!("ADD_QUESTION_OK|{}", question_id),
            Reply::ListPracticeOk { practices } => format!(
                "LIST_PRACTICE_OK{}",
                join(practices.iter().map(|p| format!(
                    "{}:{}:{}:{}",
                    p.id,
                    sanitize(&p.name),
                    p.status,
                    p.questions
                )))
            ),
            Reply::CreatePracticeOk {
                practice_id,
                question_count,
            } => format!("CREATE_PRACTICE_OK|{}|{}", practice_id, question_count),
            Reply::PracticeSessionOk {
                restarted,
                session_id,
                questions,
            } => format!(
                "{}|{}{}",
                if *restarted {
                    "RESTART_PRACTICE_OK"
                } else {
                    "START_PRACTICE_OK"
                },
                session_id,
                join(questions.iter().map(QuestionView::encode))
            ),
            Reply::PracticeAnswerOk { reveal } => match reveal {
                Some((correct, option)) => {
                    format!("PRACTICE_ANSWER_OK|{}|{}", u8::from(*correct), option)
                }
                None => "PRACTICE_ANSWER_OK".to_string(),
            },
            Reply::FinishPracticeOk {
                score,
                total,
                time_taken,
            } => format!("FINISH_PRACTICE_OK|{}|{}|{}", score, total, time_taken),
            Reply::ClosePracticeOk { practice_id } => format!("CLOSE_PRACTICE_OK|{}", practice_id),
            Reply::Error { code, msg } => format!("ERROR|{}|{}", code, sanitize(msg)),
        }
    }

    /// Full wire line including the frame header, without newline
    pub fn frame(&self) -> String {
        format!("{}|{}", REPLY_HEADER, self.encode())
    }
}

/// Unsolicited notification pushed to participants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    RoomStarted {
        room_id: RoomId,
        start_time: Timestamp,
    },
    RoomDeleted {
        room_id: RoomId,
    },
    RoomEnded {
        room_id: RoomId,
    },
    PracticeClosed {
        practice_id: PracticeId,
        name: String,
    },
}

impl Event {
    pub fn encode(&self) -> String {
        match self {
            Event::RoomStarted {
                room_id,
                start_time,
            } => format!("ROOM_STARTED|{}|{}", room_id, start_time),
            Event::RoomDeleted { room_id } => format!("ROOM_DELETED|{}", room_id),
            Event::RoomEnded { room_id } => format!("ROOM_ENDED|{}", room_id),
            Event::PracticeClosed { practice_id, name } => {
                format!("PRACTICE_CLOSED|{}|{}", practice_id, sanitize(name))
            }
        }
    }

    pub fn decode(body: &str) -> Option<Event> {
        let parts: Vec<&str> = body.split('|').collect();
        match parts.as_slice() {
            ["ROOM_STARTED", room_id, start_time] => Some(Event::RoomStarted {
                room_id: room_id.to_string(),
                start_time: start_time.parse().ok()?,
            }),
            ["ROOM_DELETED", room_id] => Some(Event::RoomDeleted {
                room_id: room_id.to_string(),
            }),
            ["ROOM_ENDED", room_id] => Some(Event::RoomEnded {
                room_id: room_id.to_string(),
            }),
            ["PRACTICE_CLOSED", practice_id, name] => Some(Event::PracticeClosed {
                practice_id: practice_id.to_string(),
                name: name.to_string(),
            }),
            _ => None,
        }
    }

    /// Room or practice room this event concerns
    pub fn target(&self) -> &str {
        match self {
            Event::RoomStarted { room_id, .. }
            | Event::RoomDeleted { room_id }
            | Event::RoomEnded { room_id } => room_id,
            Event::PracticeClosed { practice_id, .. } => practice_id,
        }
    }

    pub fn frame(&self) -> String {
        format!("{}|{}", EVENT_HEADER, self.encode())
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// A server line split by its frame header
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Reply body, e.g. `SAVE_ANSWER_OK`
    Reply(String),
    Event(Event),
}

impl Frame {
    pub fn decode(line: &str) -> Option<Frame> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (header, body) = line.split_once('|')?;
        match header {
            REPLY_HEADER => Some(Frame::Reply(body.to_string())),
            EVENT_HEADER => Event::decode(body).map(Frame::Event),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_create_room_with_and_without_counts() {
        assert_eq!(
            Command::parse("CREATE_ROOM|Midterm|30").unwrap(),
            Command::CreateRoom {
                name: "Midterm".to_string(),
                duration_minutes: 30,
                counts: None,
            }
        );
        assert_eq!(
            Command::parse("CREATE_ROOM|Midterm|30|2|1|0\r\n").unwrap(),
            Command::CreateRoom {
                name: "Midterm".to_string(),
                duration_minutes: 30,
                counts: Some(DifficultyCounts::new(2, 1, 0)),
            }
        );
        assert!(matches!(
            Command::parse("CREATE_ROOM|Midterm|30|2"),
            Err(ParseError::Arity { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_bad_options() {
        assert!(matches!(
            Command::parse("SAVE_ANSWER|r1|q1|5"),
            Err(ParseError::InvalidField { field: "option", .. })
        ));
        assert!(matches!(
            Command::parse("SAVE_ANSWER|r1|q1|two"),
            Err(ParseError::InvalidField { .. })
        ));
        assert_eq!(
            Command::parse("save_answer|r1|q1|2").unwrap(),
            Command::SaveAnswer {
                room_id: "r1".to_string(),
                question_id: "q1".to_string(),
                option: 2,
            }
        );
    }

    #[test]
    fn test_parse_garbage() {
        assert_eq!(Command::parse("   "), Err(ParseError::Empty));
        assert!(matches!(
            Command::parse("FLY_TO_MOON|now"),
            Err(ParseError::Unknown(_))
        ));
        assert!(matches!(
            Command::parse("JOIN_ROOM"),
            Err(ParseError::Arity { .. })
        ));
        assert!(matches!(
            Command::parse("JOIN_ROOM|"),
            Err(ParseError::InvalidField { .. })
        ));
    }

    #[test]
    fn test_encoded_commands_parse_back() {
        let commands = vec![
            Command::CreatePractice {
                name: "Warmup".to_string(),
                show_answers: true,
                counts: Some(DifficultyCounts::new(1, 0, 0)),
            },
            Command::AddQuestion {
                difficulty: Difficulty::Hard,
                text: "Capital of France".to_string(),
                options: [
                    "Paris".to_string(),
                    "Lyon".to_string(),
                    "Nice".to_string(),
                    "Lille".to_string(),
                ],
                correct_answer: 1,
            },
            Command::SaveAnswer {
                room_id: "r1".to_string(),
                question_id: "q1".to_string(),
                option: 4,
            },
        ];
        for cmd in commands {
            assert_eq!(Command::parse(&cmd.encode()).unwrap(), cmd);
        }
    }

    #[test]
    fn test_begin_exam_reply_layout() {
        let reply = Reply::BeginExamOk {
            remaining_secs: 42,
            questions: vec![QuestionView {
                id: "q1".to_string(),
                text: "a|b: c".to_string(),
                options: ["1".into(), "2".into(), "3".into(), "4".into()],
                saved: None,
            }],
        };
        assert_eq!(reply.frame(), "RPL|BEGIN_EXAM_OK|42|q1:a/b; c:1:2:3:4");
    }

    #[test]
    fn test_resume_reply_carries_saved_answers() {
        let reply = Reply::ResumeExamOk {
            remaining_secs: 7,
            questions: vec![QuestionView {
                id: "q1".to_string(),
                text: "t".to_string(),
                options: ["a".into(), "b".into(), "c".into(), "d".into()],
                saved: Some(2),
            }],
        };
        let encoded = reply.encode();
        assert_eq!(encoded, "RESUME_EXAM_OK|7|q1:t:a:b:c:d:2");
        let view = QuestionView::decode(encoded.split('|').nth(2).unwrap(), true).unwrap();
        assert_eq!(view.saved, Some(2));
    }

    #[test]
    fn test_frames_are_distinguishable() {
        let event = Event::RoomStarted {
            room_id: "r1".to_string(),
            start_time: 1_700_000_000,
        };
        assert_eq!(event.frame(), "EVT|ROOM_STARTED|r1|1700000000");
        assert_eq!(Frame::decode(&event.frame()), Some(Frame::Event(event)));
        assert_eq!(
            Frame::decode("RPL|SAVE_ANSWER_OK\n"),
            Some(Frame::Reply("SAVE_ANSWER_OK".to_string()))
        );
        assert_eq!(Frame::decode("ROOM_STARTED|r1|5"), None);
    }

    #[test]
    fn test_error_reply_sanitizes_message() {
        let reply = Reply::error("INVALID_STATE", "bad|news\nhere");
        assert_eq!(reply.encode(), "ERROR|INVALID_STATE|bad/news here");
    }
}
