//! Game earnings error types.

use classbank_shared::types::GameSessionId;
use thiserror::Error;

use super::types::SessionStatus;
use crate::ledger::LedgerError;
use crate::store::StoreError;

/// Errors that can occur while starting or submitting a game session.
#[derive(Debug, Error)]
pub enum EarningsError {
    // ========== Validation Errors ==========
    /// A session needs at least one problem.
    #[error("A game session needs at least one problem")]
    NoProblems,

    /// No problem generator serves this game.
    #[error("Unknown game: {0}")]
    UnknownGame(String),

    /// More problems requested than one session may hold.
    #[error("At most {max} problems per session")]
    TooManyProblems {
        /// Ceiling per session.
        max: usize,
    },

    /// Caller is not in a class, so no treasury can pay.
    #[error("Player is not enrolled in a class")]
    NoClass,

    // ========== Not Found ==========
    /// Session not found in the tenant.
    #[error("Game session not found: {0}")]
    SessionNotFound(GameSessionId),

    /// No account has been opened for the caller.
    #[error("No account opened for this user")]
    NoAccount,

    // ========== Permission Errors ==========
    /// Session belongs to someone else.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    // ========== Conflict Errors ==========
    /// Session was already submitted.
    #[error("Game session already submitted ({0})")]
    AlreadySubmitted(SessionStatus),

    // ========== Gate Rejections ==========
    /// Submitted faster than the minimum duration.
    #[error("Submitted after {elapsed_secs}s; at least {required_secs}s required")]
    TooFast {
        /// Seconds since start.
        elapsed_secs: i64,
        /// Minimum seconds.
        required_secs: i64,
    },

    /// Answer list does not match the problem set.
    #[error("Expected {expected} answers, got {received}")]
    AnswerCountMismatch {
        /// Problems in the session.
        expected: usize,
        /// Answers submitted.
        received: usize,
    },

    /// Client-reported results disagree with the server's grading.
    #[error("Reported results do not match the answers")]
    ClaimMismatch,

    /// Too many plays inside the burst window.
    #[error("Too many games in the last {window_secs} seconds")]
    RateLimited {
        /// Burst window length.
        window_secs: i64,
    },

    /// Daily play ceiling reached.
    #[error("Daily limit of {limit} games reached")]
    DailyLimitReached {
        /// Plays allowed per day.
        limit: u32,
    },

    // ========== Delegated ==========
    /// Movement failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EarningsError {
    /// True for gate rejections, which close the session without paying.
    #[must_use]
    pub fn burns_session(&self) -> bool {
        matches!(
            self,
            Self::TooFast { .. }
                | Self::AnswerCountMismatch { .. }
                | Self::ClaimMismatch
                | Self::RateLimited { .. }
                | Self::DailyLimitReached { .. }
        )
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NoProblems => "NO_PROBLEMS",
            Self::UnknownGame(_) => "UNKNOWN_GAME",
            Self::TooManyProblems { .. } => "TOO_MANY_PROBLEMS",
            Self::NoClass => "NO_CLASS",
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::NoAccount => "NO_ACCOUNT",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::AlreadySubmitted(_) => "ALREADY_SUBMITTED",
            Self::TooFast { .. } => "TOO_FAST",
            Self::AnswerCountMismatch { .. } => "ANSWER_COUNT_MISMATCH",
            Self::ClaimMismatch => "CLAIM_MISMATCH",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::DailyLimitReached { .. } => "DAILY_LIMIT_REACHED",
            Self::Ledger(e) => e.error_code(),
            Self::Store(e) => e.error_code(),
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::NoProblems | Self::UnknownGame(_) | Self::TooManyProblems { .. } => 400,
            Self::Forbidden(_) => 403,
            Self::SessionNotFound(_) | Self::NoAccount => 404,
            Self::AlreadySubmitted(_) => 409,
            Self::NoClass
            | Self::TooFast { .. }
            | Self::AnswerCountMismatch { .. }
            | Self::ClaimMismatch => 422,
            Self::RateLimited { .. } | Self::DailyLimitReached { .. } => 429,
            Self::Ledger(e) => e.http_status_code(),
            Self::Store(e) => e.http_status_code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_rejections_burn_the_session() {
        assert!(EarningsError::ClaimMismatch.burns_session());
        assert!(EarningsError::DailyLimitReached { limit: 10 }.burns_session());
        assert!(!EarningsError::AlreadySubmitted(SessionStatus::Credited).burns_session());
        assert!(!EarningsError::NoAccount.burns_session());
    }

    #[test]
    fn test_limits_map_to_too_many_requests() {
        let err = EarningsError::RateLimited { window_secs: 300 };
        assert_eq!(err.http_status_code(), 429);
        assert_eq!(err.error_code(), "RATE_LIMITED");
    }
}
