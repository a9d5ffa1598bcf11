//! Server-side problem generation.
//!
//! Answers are produced here and stored with the session; clients only pick
//! a game, a difficulty and a problem count.

use rand::Rng;

use super::error::EarningsError;
use super::types::{Difficulty, Problem};

/// Most problems one session may hold.
pub const MAX_PROBLEMS_PER_SESSION: usize = 50;

/// Produces the problems, with answers, for a new session.
pub trait ProblemSource: Send + Sync {
    /// Generates `count` problems for `game` at `difficulty`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownGame` for a game the source cannot produce.
    fn generate(
        &self,
        game: &str,
        difficulty: Difficulty,
        count: usize,
    ) -> Result<Vec<Problem>, EarningsError>;
}

/// Random arithmetic drills: `addition`, `subtraction` and `multiplication`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArithmeticProblems;

impl ArithmeticProblems {
    /// Game identifiers this source serves.
    pub const GAMES: [&'static str; 3] = ["addition", "subtraction", "multiplication"];

    fn operand_ceiling(difficulty: Difficulty) -> u64 {
        match difficulty {
            Difficulty::Easy => 10,
            Difficulty::Medium => 50,
            Difficulty::Hard => 200,
        }
    }
}

impl ProblemSource for ArithmeticProblems {
    fn generate(
        &self,
        game: &str,
        difficulty: Difficulty,
        count: usize,
    ) -> Result<Vec<Problem>, EarningsError> {
        let op = match game {
            "addition" => '+',
            "subtraction" => '-',
            "multiplication" => 'x',
            other => return Err(EarningsError::UnknownGame(other.to_string())),
        };
        let ceiling = Self::operand_ceiling(difficulty);
        let mut rng = rand::rng();
        let problems = (0..count)
            .map(|_| {
                let a = rng.random_range(1..=ceiling);
                let b = rng.random_range(1..=ceiling);
                // Subtraction never goes below zero.
                let (a, b) = if op == '-' { (a.max(b), a.min(b)) } else { (a, b) };
                let answer = match op {
                    '+' => a + b,
                    '-' => a - b,
                    _ => a * b,
                };
                Problem {
                    prompt: format!("{a} {op} {b}"),
                    answer: answer.to_string(),
                }
            })
            .collect();
        Ok(problems)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn solve(prompt: &str) -> u64 {
        let parts: Vec<&str> = prompt.split(' ').collect();
        let a: u64 = parts[0].parse().unwrap();
        let b: u64 = parts[2].parse().unwrap();
        match parts[1] {
            "+" => a + b,
            "-" => a - b,
            "x" => a * b,
            op => panic!("unexpected operator {op}"),
        }
    }

    #[rstest]
    #[case("addition", Difficulty::Easy, 10)]
    #[case("subtraction", Difficulty::Medium, 50)]
    #[case("multiplication", Difficulty::Hard, 200)]
    fn test_answers_match_prompts(
        #[case] game: &str,
        #[case] difficulty: Difficulty,
        #[case] ceiling: u64,
    ) {
        let problems = ArithmeticProblems.generate(game, difficulty, 40).unwrap();
        assert_eq!(problems.len(), 40);
        for problem in &problems {
            assert_eq!(problem.answer, solve(&problem.prompt).to_string());
            let a: u64 = problem.prompt.split(' ').next().unwrap().parse().unwrap();
            assert!((1..=ceiling).contains(&a));
        }
    }

    #[test]
    fn test_unknown_game_rejected() {
        let err = ArithmeticProblems
            .generate("chess", Difficulty::Easy, 3)
            .unwrap_err();
        assert!(matches!(err, EarningsError::UnknownGame(game) if game == "chess"));
    }
}
