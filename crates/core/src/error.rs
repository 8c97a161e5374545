use thiserror::Error;

use crate::model::{QuestionError, QuizError};
use crate::validate::ValidationError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Quiz(#[from] QuizError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}
