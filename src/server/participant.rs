//! Participant handlers: joining, taking and resuming exams

use crate::protocol::{QuestionView, Reply};
use crate::state::{AppState, ExamStart};
use crate::types::*;
use std::sync::Arc;

use super::handlers::reject;

pub async fn handle_list_rooms(state: &Arc<AppState>) -> Reply {
    Reply::ListRoomsOk {
        rooms: state.list_rooms().await,
    }
}

pub async fn handle_join_room(state: &Arc<AppState>, user_id: &str, room_id: RoomId) -> Reply {
    match state.join_room(user_id, &room_id).await {
        Ok(()) => Reply::JoinRoomOk { room_id },
        Err(e) => reject(state, "JOIN_ROOM", e),
    }
}

pub async fn handle_begin_exam(state: &Arc<AppState>, user_id: &str, room_id: RoomId) -> Reply {
    match state.begin_exam(user_id, &room_id).await {
        Ok(ExamStart::Waiting) => Reply::ExamWaiting { room_id },
        Ok(ExamStart::Started {
            remaining_secs,
            questions,
        }) => Reply::BeginExamOk {
            remaining_secs,
            questions: questions
                .iter()
                .map(|q| QuestionView::from_question(q, None))
                .collect(),
        },
        Err(e) => reject(state, "BEGIN_EXAM", e),
    }
}

pub async fn handle_cancel_wait(state: &Arc<AppState>, user_id: &str, room_id: RoomId) -> Reply {
    match state.cancel_wait(user_id, &room_id).await {
        Ok(()) => Reply::CancelWaitOk { room_id },
        Err(e) => reject(state, "CANCEL_WAIT", e),
    }
}

pub async fn handle_resume_exam(state: &Arc<AppState>, user_id: &str, room_id: &str) -> Reply {
    match state.resume_exam(user_id, room_id).await {
        Ok(resumed) => Reply::ResumeExamOk {
            remaining_secs: resumed.remaining_secs,
            questions: resumed
                .questions
                .iter()
                .map(|q| QuestionView::from_question(q, Some(resumed.saved(&q.id).unwrap_or(0))))
                .collect(),
        },
        Err(e) => reject(state, "RESUME_EXAM", e),
    }
}

pub async fn handle_save_answer(
    state: &Arc<AppState>,
    user_id: &str,
    room_id: &str,
    question_id: &str,
    option: u8,
) -> Reply {
    match state.save_answer(user_id, room_id, question_id, option).await {
        Ok(()) => Reply::SaveAnswerOk,
        Err(e) => reject(state, "SAVE_ANSWER", e),
    }
}

pub async fn handle_submit_test(state: &Arc<AppState>, user_id: &str, room_id: &str) -> Reply {
    match state.submit(user_id, room_id).await {
        Ok(result) => Reply::SubmitTestOk {
            score: result.score,
            total: result.total_questions,
            time_taken: result.time_taken,
        },
        Err(e) => reject(state, "SUBMIT_TEST", e),
    }
}
