mod attempt;
mod ids;
mod leaderboard;
mod question;
mod quiz;

pub use attempt::{Answer, Attempt};
pub use ids::{AttemptId, QuestionId, QuizId, UserId};
pub use leaderboard::{LeaderboardDocument, LeaderboardEntry, MAX_ENTRIES};
pub use question::{Choice, Question, QuestionError, QuestionKind};
pub use quiz::{Quiz, QuizError, QuizKind};
