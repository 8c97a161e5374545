#![forbid(unsafe_code)]

pub mod autosave;
pub mod countdown;
pub mod error;
pub mod session;
pub mod workflow;

pub use quiz_core::Clock;

pub use autosave::{AUTOSAVE_INTERVAL, AutosaveHandle, Autosaver};
pub use countdown::{Countdown, CountdownEvent, CountdownHandle, CountdownScheduler, Warning};
pub use error::SessionError;
pub use session::{QuizSession, SessionPhase, SubmitOutcome};
pub use workflow::{QuizFlowService, StartedSession};
