//! Practice handlers

use crate::protocol::{QuestionView, Reply};
use crate::state::AppState;
use std::sync::Arc;

use super::handlers::reject;

pub async fn handle_list_practice(state: &Arc<AppState>) -> Reply {
    Reply::ListPracticeOk {
        practices: state.list_practice().await,
    }
}

pub async fn handle_start_practice(
    state: &Arc<AppState>,
    user_id: &str,
    practice_id: &str,
    restarted: bool,
) -> Reply {
    let outcome = if restarted {
        state.restart_practice(user_id, practice_id).await
    } else {
        state.start_practice(user_id, practice_id).await
    };
    match outcome {
        Ok((session, questions)) => Reply::PracticeSessionOk {
            restarted,
            session_id: session.id,
            questions: questions
                .iter()
                .map(|q| QuestionView::from_question(q, None))
                .collect(),
        },
        Err(e) if restarted => reject(state, "RESTART_PRACTICE", e),
        Err(e) => reject(state, "START_PRACTICE", e),
    }
}

pub async fn handle_practice_answer(
    state: &Arc<AppState>,
    user_id: &str,
    session_id: &str,
    question_id: &str,
    option: u8,
) -> Reply {
    match state
        .practice_answer(user_id, session_id, question_id, option)
        .await
    {
        Ok(reveal) => Reply::PracticeAnswerOk { reveal },
        Err(e) => reject(state, "PRACTICE_ANSWER", e),
    }
}

pub async fn handle_finish_practice(state: &Arc<AppState>, user_id: &str, session_id: &str) -> Reply {
    match state.finish_practice(user_id, session_id).await {
        Ok(result) => Reply::FinishPracticeOk {
            score: result.score,
            total: result.total_questions,
            time_taken: result.time_taken,
        },
        Err(e) => reject(state, "FINISH_PRACTICE", e),
    }
}
