//! Host handlers: room and practice lifecycle, question bank

use crate::protocol::Reply;
use crate::state::AppState;
use crate::types::*;
use std::sync::Arc;

use super::handlers::reject;

pub async fn handle_create_room(
    state: &Arc<AppState>,
    user_id: &str,
    name: &str,
    duration_minutes: u32,
    counts: Option<DifficultyCounts>,
) -> Reply {
    match state
        .create_room(user_id, name, duration_minutes, counts)
        .await
    {
        Ok(room) => Reply::CreateRoomOk {
            room_id: room.id,
            question_count: room.question_ids.len(),
        },
        Err(e) => reject(state, "CREATE_ROOM", e),
    }
}

pub async fn handle_start_room(state: &Arc<AppState>, user_id: &str, room_id: RoomId) -> Reply {
    match state.start_room(user_id, &room_id).await {
        Ok(start_time) => Reply::StartRoomOk {
            room_id,
            start_time,
        },
        Err(e) => reject(state, "START_ROOM", e),
    }
}

pub async fn handle_close_room(state: &Arc<AppState>, user_id: &str, room_id: RoomId) -> Reply {
    match state.close_room(user_id, &room_id).await {
        Ok(()) => Reply::CloseRoomOk { room_id },
        Err(e) => reject(state, "CLOSE_ROOM", e),
    }
}

pub async fn handle_delete_room(state: &Arc<AppState>, user_id: &str, room_id: RoomId) -> Reply {
    match state.delete_room(user_id, &room_id).await {
        Ok(()) => Reply::DeleteRoomOk { room_id },
        Err(e) => reject(state, "DELETE_ROOM", e),
    }
}

pub async fn handle_add_question(
    state: &Arc<AppState>,
    user_id: &str,
    difficulty: Difficulty,
    text: &str,
    options: [String; 4],
    correct_answer: u8,
) -> Reply {
    match state
        .add_question(user_id, difficulty, text, options, correct_answer)
        .await
    {
        Ok(question) => Reply::AddQuestionOk {
            question_id: question.id,
        },
        Err(e) => reject(state, "ADD_QUESTION", e),
    }
}

pub async fn handle_create_practice(
    state: &Arc<AppState>,
    user_id: &str,
    name: &str,
    show_answers: bool,
    counts: Option<DifficultyCounts>,
) -> Reply {
    match state
        .create_practice(user_id, name, show_answers, counts)
        .await
    {
        Ok(practice) => Reply::CreatePracticeOk {
            practice_id: practice.id,
            question_count: practice.question_ids.len(),
        },
        Err(e) => reject(state, "CREATE_PRACTICE", e),
    }
}

pub async fn handle_close_practice(
    state: &Arc<AppState>,
    user_id: &str,
    practice_id: PracticeId,
) -> Reply {
    match state.close_practice(user_id, &practice_id).await {
        Ok(()) => Reply::ClosePracticeOk { practice_id },
        Err(e) => reject(state, "CLOSE_PRACTICE", e),
    }
}
