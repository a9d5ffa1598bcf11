//! Game earnings behind the anti-fraud gate.
//!
//! Problems and answers are generated server-side by a `ProblemSource` and
//! stored at session start; the client only ever sees prompts. A submission is graded here and paid from
//! the class treasury only after every check passes.

pub mod error;
pub mod gate;
pub mod problems;
pub mod rate_limit;
pub mod service;
pub mod types;

#[cfg(test)]
mod service_props;
#[cfg(test)]
mod tests;

pub use error::EarningsError;
pub use problems::{ArithmeticProblems, MAX_PROBLEMS_PER_SESSION, ProblemSource};
pub use service::EarningsService;
pub use types::{
    Difficulty, GameSession, Problem, ProblemPrompt, SessionStart, SessionStatus, Submission,
    SubmissionOutcome,
};
