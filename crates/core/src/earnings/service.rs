//! Game session start and submission.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use classbank_shared::types::{GameSessionId, TenantId};
use rust_decimal::Decimal;
use tracing::{info, warn};

use super::error::EarningsError;
use super::gate::{self, Assessment};
use super::problems::{ArithmeticProblems, MAX_PROBLEMS_PER_SESSION, ProblemSource};
use super::rate_limit::check_play_limits;
use super::types::{
    Difficulty, GameSession, ProblemPrompt, SessionStart, SessionStatus, Submission,
    SubmissionOutcome,
};
use crate::actor::Actor;
use crate::clock::Clock;
use crate::ledger::{
    DebitPolicy, LedgerEngine, LedgerError, Movement, MovementRequest, Party, TransactionKind,
    TreasuryKey, TreasuryScope,
};
use crate::settings::{GameLimits, SettingsProvider};
use crate::store::{EconomyStore, LedgerUnit, complete};

/// Game earnings operations.
#[derive(Clone)]
pub struct EarningsService {
    store: Arc<dyn EconomyStore>,
    settings: Arc<dyn SettingsProvider>,
    clock: Arc<dyn Clock>,
    problems: Arc<dyn ProblemSource>,
}

impl EarningsService {
    /// Creates the service with the built-in arithmetic games.
    pub fn new(
        store: Arc<dyn EconomyStore>,
        settings: Arc<dyn SettingsProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            settings,
            clock,
            problems: Arc::new(ArithmeticProblems),
        }
    }

    /// Replaces the problem generator.
    #[must_use]
    pub fn with_problem_source(mut self, problems: Arc<dyn ProblemSource>) -> Self {
        self.problems = problems;
        self
    }

    /// Generates and stores a new session, returning the prompts only.
    ///
    /// # Errors
    ///
    /// Returns `NoProblems`, `TooManyProblems`, `UnknownGame`, `NoClass` or
    /// `NoAccount`.
    pub async fn start_session(
        &self,
        actor: &Actor,
        game: &str,
        difficulty: Difficulty,
        count: usize,
    ) -> Result<SessionStart, EarningsError> {
        if count == 0 {
            return Err(EarningsError::NoProblems);
        }
        if count > MAX_PROBLEMS_PER_SESSION {
            return Err(EarningsError::TooManyProblems {
                max: MAX_PROBLEMS_PER_SESSION,
            });
        }
        let class_name = actor.class_name.clone().ok_or(EarningsError::NoClass)?;
        let account = self
            .store
            .find_account_by_user(actor.tenant_id, actor.user_id)
            .await?
            .ok_or(EarningsError::NoAccount)?;
        let problems = self.problems.generate(game, difficulty, count)?;

        let session = GameSession {
            id: GameSessionId::new(),
            tenant_id: actor.tenant_id,
            user_id: actor.user_id,
            account_id: account.id,
            class_name,
            game: game.to_string(),
            difficulty,
            problems,
            status: SessionStatus::Open,
            started_at: self.clock.now(),
            submitted_at: None,
            earnings: None,
            rejection_code: None,
        };
        self.store.create_session(&session).await?;

        info!(
            tenant_id = %session.tenant_id,
            session_id = %session.id,
            game = %session.game,
            difficulty = session.difficulty.as_str(),
            problems = session.problems.len(),
            "Game session started"
        );
        Ok(SessionStart {
            session_id: session.id,
            prompts: session
                .problems
                .iter()
                .enumerate()
                .map(|(index, problem)| ProblemPrompt {
                    index,
                    prompt: problem.prompt.clone(),
                })
                .collect(),
            started_at: session.started_at,
        })
    }

    /// Grades a submission and credits the earnings from the class treasury.
    ///
    /// A gate rejection closes the session as `rejected`; a treasury shortfall
    /// leaves it open.
    ///
    /// # Errors
    ///
    /// Returns an `EarningsError`; the balance is unchanged on every error.
    pub async fn submit(
        &self,
        actor: &Actor,
        submission: &Submission,
    ) -> Result<SubmissionOutcome, EarningsError> {
        let tenant = actor.tenant_id;
        let session = self
            .store
            .find_session(tenant, submission.session_id)
            .await?
            .ok_or(EarningsError::SessionNotFound(submission.session_id))?;
        if session.user_id != actor.user_id {
            return Err(EarningsError::Forbidden(
                "session belongs to another player".to_string(),
            ));
        }
        if session.status != SessionStatus::Open {
            return Err(EarningsError::AlreadySubmitted(session.status));
        }

        let limits = self.settings.game_limits(tenant).await?;
        let now = self.clock.now();
        let mut unit = self.store.begin().await?;
        let result = submit_in(unit.as_mut(), tenant, submission, &limits, now).await;

        match complete(unit, result).await? {
            Ok(outcome) => {
                info!(
                    tenant_id = %tenant,
                    session_id = %outcome.session_id,
                    correct = outcome.correct,
                    total = outcome.total,
                    earnings = %outcome.earnings,
                    "Game session submitted"
                );
                Ok(outcome)
            }
            Err(rejection) => {
                warn!(
                    tenant_id = %tenant,
                    session_id = %submission.session_id,
                    user_id = %actor.user_id,
                    code = rejection.error_code(),
                    "Game submission rejected"
                );
                Err(rejection)
            }
        }
    }

    /// A session of the caller, without its answers.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` or `Forbidden`.
    pub async fn session(
        &self,
        actor: &Actor,
        session_id: GameSessionId,
    ) -> Result<GameSession, EarningsError> {
        let mut session = self
            .store
            .find_session(actor.tenant_id, session_id)
            .await?
            .ok_or(EarningsError::SessionNotFound(session_id))?;
        if session.user_id != actor.user_id && !actor.is_staff() {
            return Err(EarningsError::Forbidden(
                "session belongs to another player".to_string(),
            ));
        }
        if session.status == SessionStatus::Open {
            for problem in &mut session.problems {
                problem.answer.clear();
            }
        }
        Ok(session)
    }
}

/// Runs a submission inside `unit`.
///
/// The outer `Err` rolls the unit back. An inner `Err` is a gate rejection:
/// the session is closed and the unit must still be committed.
async fn submit_in(
    unit: &mut dyn LedgerUnit,
    tenant: TenantId,
    submission: &Submission,
    limits: &GameLimits,
    now: DateTime<Utc>,
) -> Result<Result<SubmissionOutcome, EarningsError>, EarningsError> {
    let mut session = unit
        .lock_session(tenant, submission.session_id)
        .await?
        .ok_or(EarningsError::SessionNotFound(submission.session_id))?;
    if session.status != SessionStatus::Open {
        return Err(EarningsError::AlreadySubmitted(session.status));
    }

    let assessment = match gate::assess(&session, submission, limits, now) {
        Ok(assessment) => assessment,
        Err(rejection) => return reject(unit, &mut session, rejection, now).await,
    };

    let scope = TreasuryScope::Class(session.class_name.clone());
    if assessment.earnings > Decimal::ZERO {
        unit.lock_treasury(&TreasuryKey::new(tenant, scope.clone()))
            .await?;
    }
    let account = unit
        .lock_account(tenant, session.account_id)
        .await?
        .ok_or(LedgerError::AccountNotFound(session.account_id))?;

    if let Err(rejection) = check_play_limits(unit, tenant, session.user_id, limits, now).await {
        if !rejection.burns_session() {
            return Err(rejection);
        }
        return reject(unit, &mut session, rejection, now).await;
    }

    let Assessment { grade, earnings } = assessment;
    let balance = if earnings > Decimal::ZERO {
        let receipt = LedgerEngine::apply_in(
            unit,
            &MovementRequest {
                tenant_id: tenant,
                movement: Movement::Transfer {
                    from: Party::Treasury(scope),
                    to: Party::Account(account.id),
                    policy: DebitPolicy::Ordinary,
                },
                amount: earnings,
                kind: TransactionKind::GameEarnings,
                description: format!("Earnings from {}", session.game),
            },
            now,
        )
        .await?;
        receipt.destination_balance.unwrap_or(account.balance + earnings)
    } else {
        account.balance
    };

    session.status = if earnings > Decimal::ZERO {
        SessionStatus::Credited
    } else {
        SessionStatus::Completed
    };
    session.submitted_at = Some(now);
    session.earnings = Some(earnings);
    unit.update_session(&session).await?;

    Ok(Ok(SubmissionOutcome {
        session_id: session.id,
        status: session.status,
        correct: grade.correct,
        total: u32::try_from(session.problems.len()).unwrap_or(u32::MAX),
        longest_streak: grade.longest_streak,
        earnings,
        balance,
    }))
}

async fn reject(
    unit: &mut dyn LedgerUnit,
    session: &mut GameSession,
    rejection: EarningsError,
    now: DateTime<Utc>,
) -> Result<Result<SubmissionOutcome, EarningsError>, EarningsError> {
    session.status = SessionStatus::Rejected;
    session.submitted_at = Some(now);
    session.earnings = Some(Decimal::ZERO);
    session.rejection_code = Some(rejection.error_code().to_string());
    unit.update_session(session).await?;
    Ok(Err(rejection))
}
