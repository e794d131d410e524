//! Command dispatch
//!
//! Parses a line, checks the connection is logged in, then hands the command
//! to the host, participant or practice handler module. Every outcome becomes
//! exactly one [`Reply`].

use crate::broadcast::ConnectionId;
use crate::error::RoomError;
use crate::metrics::Metrics;
use crate::protocol::{Command, Event, Reply};
use crate::state::AppState;
use crate::types::User;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::{host, participant, practice};

/// Per-connection state owned by the connection task
#[derive(Debug)]
pub struct Session {
    pub conn_id: ConnectionId,
    pub user: Option<User>,
    events: mpsc::UnboundedSender<Event>,
}

impl Session {
    pub fn new(conn_id: ConnectionId, events: mpsc::UnboundedSender<Event>) -> Self {
        Self {
            conn_id,
            user: None,
            events,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }
}

/// Macro to require a logged-in connection and bind the caller's id
macro_rules! require_login {
    ($session:expr) => {
        match $session.user_id() {
            Some(id) => id.to_string(),
            None => return Reply::error("NOT_LOGGED_IN", "log in first"),
        }
    };
}

/// Turn a rejected operation into an error reply
pub(super) fn reject(state: &AppState, action: &str, err: RoomError) -> Reply {
    match &err {
        RoomError::Storage(e) => {
            Metrics::incr(&state.metrics.storage_errors);
            tracing::error!("{} failed on storage: {}", action, e);
        }
        other => tracing::debug!("{} rejected: {}", action, other),
    }
    Reply::error(err.code(), err.client_message())
}

/// Parse and handle one raw command line
pub async fn handle_line(line: &str, session: &mut Session, state: &Arc<AppState>) -> Reply {
    match Command::parse(line) {
        Ok(cmd) => handle_command(cmd, session, state).await,
        Err(e) => {
            tracing::debug!("Unparseable line from connection {}: {}", session.conn_id, e);
            Reply::error("PARSE_ERROR", e.to_string())
        }
    }
}

/// Handle a parsed command and return its reply
pub async fn handle_command(cmd: Command, session: &mut Session, state: &Arc<AppState>) -> Reply {
    Metrics::incr(&state.metrics.commands_handled);

    match cmd {
        Command::Ping => Reply::Pong,
        Command::Quit => Reply::Bye,
        Command::Login { user_id } => handle_login(state, session, user_id).await,

        // Participant commands
        Command::ListRooms => {
            require_login!(session);
            participant::handle_list_rooms(state).await
        }
        Command::JoinRoom { room_id } => {
            let user = require_login!(session);
            participant::handle_join_room(state, &user, room_id).await
        }
        Command::BeginExam { room_id } => {
            let user = require_login!(session);
            participant::handle_begin_exam(state, &user, room_id).await
        }
        Command::CancelWait { room_id } => {
            let user = require_login!(session);
            participant::handle_cancel_wait(state, &user, room_id).await
        }
        Command::ResumeExam { room_id } => {
            let user = require_login!(session);
            participant::handle_resume_exam(state, &user, &room_id).await
        }
        Command::SaveAnswer {
            room_id,
            question_id,
            option,
        } => {
            let user = require_login!(session);
            participant::handle_save_answer(state, &user, &room_id, &question_id, option).await
        }
        Command::SubmitTest { room_id } => {
            let user = require_login!(session);
            participant::handle_submit_test(state, &user, &room_id).await
        }

        // Host commands (role and ownership are checked by the registry)
        Command::CreateRoom {
            name,
            duration_minutes,
            counts,
        } => {
            let user = require_login!(session);
            host::handle_create_room(state, &user, &name, duration_minutes, counts).await
        }
        Command::StartRoom { room_id } => {
            let user = require_login!(session);
            host::handle_start_room(state, &user, room_id).await
        }
        Command::CloseRoom { room_id } => {
            let user = require_login!(session);
            host::handle_close_room(state, &user, room_id).await
        }
        Command::DeleteRoom { room_id } => {
            let user = require_login!(session);
            host::handle_delete_room(state, &user, room_id).await
        }
        Command::AddQuestion {
            difficulty,
            text,
            options,
            correct_answer,
        } => {
            let user = require_login!(session);
            host::handle_add_question(state, &user, difficulty, &text, options, correct_answer)
                .await
        }
        Command::CreatePractice {
            name,
            show_answers,
            counts,
        } => {
            let user = require_login!(session);
            host::handle_create_practice(state, &user, &name, show_answers, counts).await
        }
        Command::ClosePractice { practice_id } => {
            let user = require_login!(session);
            host::handle_close_practice(state, &user, practice_id).await
        }

        // Practice commands
        Command::ListPractice => {
            require_login!(session);
            practice::handle_list_practice(state).await
        }
        Command::StartPractice { practice_id } => {
            let user = require_login!(session);
            practice::handle_start_practice(state, &user, &practice_id, false).await
        }
        Command::RestartPractice { practice_id } => {
            let user = require_login!(session);
            practice::handle_start_practice(state, &user, &practice_id, true).await
        }
        Command::PracticeAnswer {
            session_id,
            question_id,
            option,
        } => {
            let user = require_login!(session);
            practice::handle_practice_answer(state, &user, &session_id, &question_id, option)
                .await
        }
        Command::FinishPractice { session_id } => {
            let user = require_login!(session);
            practice::handle_finish_practice(state, &user, &session_id).await
        }
    }
}

async fn handle_login(state: &Arc<AppState>, session: &mut Session, user_id: String) -> Reply {
    if let Some(current) = &session.user {
        if current.id == user_id {
            return Reply::LoginOk {
                user: current.clone(),
            };
        }
        return Reply::error(
            "CONFLICT",
            format!("connection already logged in as {}", current.id),
        );
    }

    let user = match state.user(&user_id).await {
        Ok(user) => user,
        Err(e) => return reject(state, "LOGIN", e),
    };
    if let Err(e) = state
        .broadcaster
        .register(&user.id, session.conn_id, session.events.clone())
        .await
    {
        return reject(state, "LOGIN", e);
    }

    tracing::info!(
        "User {} ({}) logged in on connection {}",
        user.id,
        user.role.as_str(),
        session.conn_id
    );
    session.user = Some(user.clone());
    Reply::LoginOk { user }
}
