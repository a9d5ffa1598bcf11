//! Game session types.

use chrono::{DateTime, Utc};
use classbank_shared::types::{AccountId, GameSessionId, TenantId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Difficulty chosen at session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    /// x1.0
    Easy,
    /// x1.5
    Medium,
    /// x2.0
    Hard,
}

impl Difficulty {
    /// Earnings multiplier.
    #[must_use]
    pub fn multiplier(self) -> Decimal {
        match self {
            Self::Easy => Decimal::ONE,
            Self::Medium => Decimal::new(15, 1),
            Self::Hard => Decimal::TWO,
        }
    }

    /// Returns the difficulty as stored.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

/// A generated problem. The answer never leaves the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    /// Text shown to the student.
    pub prompt: String,
    /// Expected answer.
    pub answer: String,
}

/// Session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Waiting for a submission.
    Open,
    /// Submitted and paid.
    Credited,
    /// Submitted with nothing to pay.
    Completed,
    /// Submitted and refused by the gate.
    Rejected,
}

impl SessionStatus {
    /// Returns the status as stored.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Credited => "credited",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }

    /// True for submissions that count towards play limits.
    #[must_use]
    pub const fn counts_as_play(self) -> bool {
        matches!(self, Self::Credited | Self::Completed)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-side state of one game play.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSession {
    /// Session ID.
    pub id: GameSessionId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Player.
    pub user_id: UserId,
    /// Player's account.
    pub account_id: AccountId,
    /// Class whose treasury pays.
    pub class_name: String,
    /// Game identifier.
    pub game: String,
    /// Difficulty.
    pub difficulty: Difficulty,
    /// Problems with answers.
    pub problems: Vec<Problem>,
    /// Status.
    pub status: SessionStatus,
    /// Start timestamp.
    pub started_at: DateTime<Utc>,
    /// Submission timestamp.
    pub submitted_at: Option<DateTime<Utc>>,
    /// Amount credited.
    pub earnings: Option<Decimal>,
    /// Gate error code when rejected.
    pub rejection_code: Option<String>,
}

/// Prompt returned to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemPrompt {
    /// Position in the session.
    pub index: usize,
    /// Text shown to the student.
    pub prompt: String,
}

/// Result of starting a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStart {
    /// New session.
    pub session_id: GameSessionId,
    /// Prompts only.
    pub prompts: Vec<ProblemPrompt>,
    /// Start timestamp.
    pub started_at: DateTime<Utc>,
}

/// What the game client sends back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Session being submitted.
    pub session_id: GameSessionId,
    /// One answer per problem.
    pub answers: Vec<String>,
    /// Client's view of which answers were right, one per problem.
    pub claimed_results: Vec<bool>,
    /// Client's score. Never trusted.
    #[serde(default)]
    pub claimed_score: Option<u32>,
}

/// Result of an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    /// Submitted session.
    pub session_id: GameSessionId,
    /// Final status.
    pub status: SessionStatus,
    /// Correct answers recomputed server-side.
    pub correct: u32,
    /// Problems in the session.
    pub total: u32,
    /// Longest run of consecutive correct answers.
    pub longest_streak: u32,
    /// Amount credited.
    pub earnings: Decimal,
    /// Account balance after the credit.
    pub balance: Decimal,
}
