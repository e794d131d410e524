use super::{pick_questions, AppState};
use crate::error::{RoomError, RoomResult};
use crate::protocol::{Event, PracticeSummary};
use crate::types::*;
use std::collections::BTreeMap;

fn session_mut<'a>(
    sessions: &'a mut std::collections::HashMap<SessionId, PracticeSession>,
    user_id: &str,
    session_id: &str,
) -> RoomResult<&'a mut PracticeSession> {
    let session = sessions
        .get_mut(session_id)
        .ok_or_else(|| RoomError::NotFound(format!("session {}", session_id)))?;
    if session.user_id != user_id {
        return Err(RoomError::PermissionDenied(
            "session belongs to another user".to_string(),
        ));
    }
    Ok(session)
}

impl AppState {
    /// Create an untimed practice room, open immediately
    pub async fn create_practice(
        &self,
        host_id: &str,
        name: &str,
        show_answers: bool,
        counts: Option<DifficultyCounts>,
    ) -> RoomResult<PracticeRoom> {
        self.privileged_user(host_id, "create practice rooms").await?;
        let name = name.trim();
        if name.is_empty() {
            return Err(RoomError::InvalidInput("practice name is empty".to_string()));
        }

        let counts = counts.unwrap_or(self.config.default_counts);
        let bank = self.store.list_questions().await?;
        let practice = PracticeRoom {
            id: ulid::Ulid::new().to_string(),
            name: name.to_string(),
            host_id: host_id.to_string(),
            status: PracticeStatus::Open,
            show_answers,
            question_ids: pick_questions(&bank, counts)?,
        };

        self.registry
            .write()
            .await
            .practices
            .insert(practice.id.clone(), practice.clone());
        tracing::info!(
            "Practice {} '{}' created by {} ({} questions)",
            practice.id,
            practice.name,
            host_id,
            practice.question_ids.len()
        );
        Ok(practice)
    }

    /// Open a fresh session; earlier sessions are left untouched
    pub async fn start_practice(
        &self,
        user_id: &str,
        practice_id: &str,
    ) -> RoomResult<(PracticeSession, Vec<Question>)> {
        self.user(user_id).await?;

        let session = {
            let mut registry = self.registry.write().await;
            let practice = registry
                .practices
                .get(practice_id)
                .ok_or_else(|| RoomError::NotFound(format!("practice {}", practice_id)))?;
            if practice.status != PracticeStatus::Open {
                return Err(RoomError::InvalidState(format!(
                    "practice {} is closed",
                    practice_id
                )));
            }
            let session = PracticeSession {
                id: ulid::Ulid::new().to_string(),
                practice_id: practice_id.to_string(),
                user_id: user_id.to_string(),
                started_at: self.now(),
                answers: BTreeMap::new(),
            };
            registry.sessions.insert(session.id.clone(), session.clone());
            session
        };

        let question_ids = self
            .registry
            .read()
            .await
            .practices
            .get(practice_id)
            .map(|p| p.question_ids.clone())
            .unwrap_or_default();
        let questions = self.store.get_questions(&question_ids).await?;

        tracing::info!(
            "User {} started practice {} (session {})",
            user_id,
            practice_id,
            session.id
        );
        Ok((session, questions))
    }

    /// Start over with a brand-new session
    pub async fn restart_practice(
        &self,
        user_id: &str,
        practice_id: &str,
    ) -> RoomResult<(PracticeSession, Vec<Question>)> {
        tracing::debug!("User {} restarting practice {}", user_id, practice_id);
        self.start_practice(user_id, practice_id).await
    }

    /// Record an answer. Returns (correct, correct option) when the room
    /// reveals answers.
    pub async fn practice_answer(
        &self,
        user_id: &str,
        session_id: &str,
        question_id: &str,
        option: u8,
    ) -> RoomResult<Option<(bool, u8)>> {
        if !(1..=OPTION_COUNT).contains(&option) {
            return Err(RoomError::InvalidInput(format!(
                "option must be between 1 and {}",
                OPTION_COUNT
            )));
        }

        let show_answers = {
            let mut registry = self.registry.write().await;
            let registry = &mut *registry;
            let session = match session_mut(&mut registry.sessions, user_id, session_id) {
                Ok(session) => session,
                Err(RoomError::NotFound(msg)) => {
                    if self.finished_result(user_id, session_id).await?.is_some() {
                        return Err(RoomError::InvalidState(
                            "session already finished".to_string(),
                        ));
                    }
                    return Err(RoomError::NotFound(msg));
                }
                Err(e) => return Err(e),
            };
            let practice = registry
                .practices
                .get(&session.practice_id)
                .ok_or_else(|| RoomError::NotFound(format!("practice {}", session.practice_id)))?;
            if practice.status != PracticeStatus::Open {
                return Err(RoomError::InvalidState(
                    "practice is closed to new answers".to_string(),
                ));
            }
            if !practice.question_ids.iter().any(|q| q == question_id) {
                return Err(RoomError::NotFound(format!("question {}", question_id)));
            }
            session.answers.insert(question_id.to_string(), option);
            practice.show_answers
        };

        if !show_answers {
            return Ok(None);
        }
        let question = self
            .store
            .get_questions(&[question_id.to_string()])
            .await?
            .pop()
            .ok_or_else(|| RoomError::NotFound(format!("question {}", question_id)))?;
        Ok(Some((question.correct_answer == option, question.correct_answer)))
    }

    /// Stored result of a session this user already finished
    async fn finished_result(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> RoomResult<Option<PracticeResult>> {
        Ok(self
            .store
            .practice_results_for(user_id)
            .await?
            .into_iter()
            .find(|r| r.session_id == session_id))
    }

    /// Score the session and persist its result; finishing twice returns the
    /// same result. The session leaves the registry once its result is stored.
    pub async fn finish_practice(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> RoomResult<PracticeResult> {
        let now = self.now();
        let mut registry = self.registry.write().await;
        let registry = &mut *registry;
        let session = match session_mut(&mut registry.sessions, user_id, session_id) {
            Ok(session) => session,
            Err(RoomError::NotFound(msg)) => {
                return self
                    .finished_result(user_id, session_id)
                    .await?
                    .ok_or(RoomError::NotFound(msg));
            }
            Err(e) => return Err(e),
        };

        let question_ids = registry
            .practices
            .get(&session.practice_id)
            .map(|p| p.question_ids.clone())
            .unwrap_or_default();
        let asked = self.store.get_questions(&question_ids).await?;
        let result = PracticeResult {
            session_id: session.id.clone(),
            practice_id: session.practice_id.clone(),
            user_id: user_id.to_string(),
            score: score_answers(&asked, &session.answers),
            total_questions: question_ids.len() as u32,
            time_taken: (now - session.started_at).max(0),
        };
        self.store.insert_practice_result(&result).await?;
        registry.sessions.remove(session_id);

        tracing::info!(
            "User {} finished practice {}: {}/{}",
            user_id,
            result.practice_id,
            result.score,
            result.total_questions
        );
        Ok(result)
    }

    /// Host closes a practice room. Unfinished sessions can still finish.
    pub async fn close_practice(&self, host_id: &str, practice_id: &str) -> RoomResult<()> {
        let (name, unfinished) = {
            let mut registry = self.registry.write().await;
            let practice = registry
                .practices
                .get_mut(practice_id)
                .ok_or_else(|| RoomError::NotFound(format!("practice {}", practice_id)))?;
            if practice.host_id != host_id {
                return Err(RoomError::PermissionDenied(
                    "only the host can close this practice room".to_string(),
                ));
            }
            if practice.status == PracticeStatus::Closed {
                return Err(RoomError::InvalidState(format!(
                    "practice {} is already closed",
                    practice_id
                )));
            }
            practice.status = PracticeStatus::Closed;
            let name = practice.name.clone();

            let mut unfinished: Vec<UserId> = registry
                .sessions
                .values()
                .filter(|s| s.practice_id == practice_id)
                .map(|s| s.user_id.clone())
                .collect();
            unfinished.sort();
            unfinished.dedup();
            (name, unfinished)
        };

        tracing::info!(
            "Practice {} closed, {} user(s) mid-session",
            practice_id,
            unfinished.len()
        );
        self.broadcaster
            .push(
                &unfinished,
                &Event::PracticeClosed {
                    practice_id: practice_id.to_string(),
                    name,
                },
            )
            .await;
        Ok(())
    }

    pub async fn list_practice(&self) -> Vec<PracticeSummary> {
        let registry = self.registry.read().await;
        let mut practices: Vec<PracticeSummary> = registry
            .practices
            .values()
            .map(|p| PracticeSummary {
                id: p.id.clone(),
                name: p.name.clone(),
                status: p.status,
                questions: p.question_ids.len(),
            })
            .collect();
        practices.sort_by(|a, b| a.id.cmp(&b.id));
        practices
    }
}
