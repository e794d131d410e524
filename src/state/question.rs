use super::AppState;
use crate::error::{RoomError, RoomResult};
use crate::types::*;

impl AppState {
    /// Add a question to the shared bank
    pub async fn add_question(
        &self,
        user_id: &str,
        difficulty: Difficulty,
        text: &str,
        options: [String; 4],
        correct_answer: u8,
    ) -> RoomResult<Question> {
        self.privileged_user(user_id, "add questions").await?;

        let text = text.trim();
        if text.is_empty() {
            return Err(RoomError::InvalidInput("question text is empty".to_string()));
        }
        if options.iter().any(|o| o.trim().is_empty()) {
            return Err(RoomError::InvalidInput("every option needs text".to_string()));
        }
        if !(1..=OPTION_COUNT).contains(&correct_answer) {
            return Err(RoomError::InvalidInput(format!(
                "correct answer must be between 1 and {}",
                OPTION_COUNT
            )));
        }

        let question = Question {
            id: ulid::Ulid::new().to_string(),
            text: text.to_string(),
            options: options.map(|o| o.trim().to_string()),
            correct_answer,
            difficulty,
        };
        self.store.insert_question(question.clone()).await?;
        tracing::info!(
            "Question {} ({:?}) added by {}",
            question.id,
            difficulty,
            user_id
        );
        Ok(question)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use crate::store::Store;

    fn options() -> [String; 4] {
        ["a".into(), "b".into(), "c".into(), "d".into()]
    }

    #[tokio::test]
    async fn test_add_question_grows_the_bank() {
        let (state, _clock, store) = seeded_state().await;
        let q = state
            .add_question("host", Difficulty::Hard, " Why? ", options(), 4)
            .await
            .unwrap();
        assert_eq!(q.text, "Why?");
        assert_eq!(store.list_questions().await.unwrap().len(), 11);

        // The new question makes a third hard one available
        state
            .create_room("host", "Hard", 5, Some(DifficultyCounts::new(0, 0, 3)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_add_question_validation() {
        let (state, _clock, _store) = seeded_state().await;
        let err = state
            .add_question("alice", Difficulty::Easy, "Q", options(), 1)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PERMISSION_DENIED");
        let err = state
            .add_question("host", Difficulty::Easy, "Q", options(), 0)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
        let mut blank = options();
        blank[2] = " ".to_string();
        let err = state
            .add_question("host", Difficulty::Easy, "Q", blank, 1)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
    }
}
