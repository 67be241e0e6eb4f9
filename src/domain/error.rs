#[derive(Debug, thiserror::Error)]
pub enum KanbanError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("card already blocked: {0}")]
    CardAlreadyBlocked(String),

    #[error("card not blocked: {0}")]
    CardNotBlocked(String),

    #[error("card is blocked: {0}")]
    CardBlocked(String),

    #[error("card is in a terminal column: {0}")]
    CardTerminal(String),

    #[error("malformed history: {0}")]
    MalformedHistory(String),

    #[error("invalid board: {0}")]
    InvalidBoard(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl KanbanError {
    /// Rejections caused by the card's workflow state rather than by storage.
    pub fn is_workflow_violation(&self) -> bool {
        matches!(
            self,
            KanbanError::InvalidTransition(_)
                | KanbanError::CardAlreadyBlocked(_)
                | KanbanError::CardNotBlocked(_)
                | KanbanError::CardBlocked(_)
                | KanbanError::CardTerminal(_)
        )
    }
}
