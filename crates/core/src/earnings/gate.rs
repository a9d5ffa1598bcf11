//! Server-side grading and earnings for game submissions.
//!
//! Checks run in a fixed order: minimum duration, answer count, grading,
//! reported results, then earnings. Client-reported scores are never used.

use chrono::{DateTime, Duration, Utc};
use classbank_shared::types::round_money;
use rust_decimal::Decimal;

use super::error::EarningsError;
use super::types::{Difficulty, GameSession, Problem, Submission};
use crate::settings::GameLimits;

/// Grading of one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grade {
    /// Per-answer correctness, in problem order.
    pub results: Vec<bool>,
    /// Number of correct answers.
    pub correct: u32,
    /// Longest run of consecutive correct answers.
    pub longest_streak: u32,
}

/// Outcome of the gate for a submission that passed every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    /// Server grading.
    pub grade: Grade,
    /// Amount to credit, already capped.
    pub earnings: Decimal,
}

/// Shortest acceptable session for `problems` problems.
#[must_use]
pub fn minimum_duration(limits: &GameLimits, problems: usize) -> Duration {
    let per_problem = limits.min_per_problem * i32::try_from(problems).unwrap_or(i32::MAX);
    per_problem.max(limits.min_session)
}

fn normalize(answer: &str) -> String {
    answer.trim().to_lowercase()
}

/// Grades answers against the stored problems.
#[must_use]
pub fn grade(problems: &[Problem], answers: &[String]) -> Grade {
    let results: Vec<bool> = problems
        .iter()
        .zip(answers)
        .map(|(problem, answer)| normalize(&problem.answer) == normalize(answer))
        .collect();

    let mut correct = 0u32;
    let mut streak = 0u32;
    let mut longest_streak = 0u32;
    for &right in &results {
        if right {
            correct += 1;
            streak += 1;
            longest_streak = longest_streak.max(streak);
        } else {
            streak = 0;
        }
    }

    Grade {
        results,
        correct,
        longest_streak,
    }
}

/// Streak bonus: x1.25 from 3 in a row, x1.5 from 5, x2 from 10.
#[must_use]
pub fn streak_multiplier(longest_streak: u32) -> Decimal {
    match longest_streak {
        0..=2 => Decimal::ONE,
        3..=4 => Decimal::new(125, 2),
        5..=9 => Decimal::new(15, 1),
        _ => Decimal::TWO,
    }
}

/// `correct * base_reward * streak * difficulty`, rounded and capped.
///
/// A product too large for `Decimal` pays the cap.
#[must_use]
pub fn session_earnings(grade: &Grade, difficulty: Difficulty, limits: &GameLimits) -> Decimal {
    Decimal::from(grade.correct)
        .checked_mul(limits.base_reward)
        .and_then(|raw| raw.checked_mul(streak_multiplier(grade.longest_streak)))
        .and_then(|raw| raw.checked_mul(difficulty.multiplier()))
        .map_or(limits.max_session_earnings, round_money)
        .min(limits.max_session_earnings)
}

/// Runs every per-session check on an open session.
///
/// # Errors
///
/// Returns the first gate rejection: `TooFast`, `AnswerCountMismatch`, or
/// `ClaimMismatch`.
pub fn assess(
    session: &GameSession,
    submission: &Submission,
    limits: &GameLimits,
    now: DateTime<Utc>,
) -> Result<Assessment, EarningsError> {
    let elapsed = now - session.started_at;
    let required = minimum_duration(limits, session.problems.len());
    if elapsed < required {
        return Err(EarningsError::TooFast {
            elapsed_secs: elapsed.num_seconds(),
            required_secs: required.num_seconds(),
        });
    }

    if submission.answers.len() != session.problems.len() {
        return Err(EarningsError::AnswerCountMismatch {
            expected: session.problems.len(),
            received: submission.answers.len(),
        });
    }

    let grade = grade(&session.problems, &submission.answers);

    let claimed_correct = submission.claimed_results.iter().filter(|&&r| r).count();
    if submission.claimed_results.len() != grade.results.len()
        || claimed_correct != grade.correct as usize
    {
        return Err(EarningsError::ClaimMismatch);
    }

    let earnings = session_earnings(&grade, session.difficulty, limits);
    Ok(Assessment { grade, earnings })
}
