//! Game submission tests against the in-memory store.

use std::sync::Arc;

use chrono::Duration;
use classbank_shared::EconomyConfig;
use classbank_shared::config::GameConfig;
use classbank_shared::types::PageRequest;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::error::EarningsError;
use super::service::EarningsService;
use super::types::{Difficulty, SessionStatus, Submission};
use crate::actor::Actor;
use crate::ledger::LedgerError;
use crate::settings::StaticSettings;
use crate::store::{AccountRepository, GameSessionRepository};
use crate::test_support::{DoublingProblems, Fixture};

fn service(fx: &Fixture) -> EarningsService {
    EarningsService::new(fx.store.clone(), fx.settings(), fx.clock())
        .with_problem_source(Arc::new(DoublingProblems))
}

fn service_with_games(fx: &Fixture, games: GameConfig) -> EarningsService {
    let config = EconomyConfig {
        games,
        ..EconomyConfig::default()
    };
    let settings = StaticSettings::from_config(&config).unwrap().shared();
    EarningsService::new(fx.store.clone(), settings, fx.clock())
        .with_problem_source(Arc::new(DoublingProblems))
}

fn all_correct(session_id: classbank_shared::types::GameSessionId) -> Submission {
    Submission {
        session_id,
        answers: vec!["2", "4", "6", "8", "10"]
            .into_iter()
            .map(String::from)
            .collect(),
        claimed_results: vec![true; 5],
        claimed_score: Some(5),
    }
}

async fn start(service: &EarningsService, actor: &Actor) -> classbank_shared::types::GameSessionId {
    service
        .start_session(actor, "math", Difficulty::Easy, 5)
        .await
        .unwrap()
        .session_id
}

#[tokio::test]
async fn test_start_hides_answers() {
    let fx = Fixture::new();
    let student = fx.account_with(Decimal::ZERO).await;
    let actor = fx.student(&student);
    let games = service(&fx);

    let start = games
        .start_session(&actor, "math", Difficulty::Hard, 5)
        .await
        .unwrap();
    assert_eq!(start.prompts.len(), 5);
    assert_eq!(start.prompts[2].prompt, "3 x 2");

    let session = games.session(&actor, start.session_id).await.unwrap();
    assert!(session.problems.iter().all(|p| p.answer.is_empty()));
    assert_eq!(session.status, SessionStatus::Open);
}

#[tokio::test]
async fn test_correct_submission_is_credited_from_treasury() {
    let fx = Fixture::new();
    fx.fund_class(dec!(1000)).await;
    let student = fx.account_with(Decimal::ZERO).await;
    let actor = fx.student(&student);
    let games = service(&fx);

    let session_id = start(&games, &actor).await;
    fx.clock.advance(Duration::seconds(30));
    let outcome = games.submit(&actor, &all_correct(session_id)).await.unwrap();

    // 5 correct * R5 * 1.5 streak bonus
    assert_eq!(outcome.status, SessionStatus::Credited);
    assert_eq!(outcome.correct, 5);
    assert_eq!(outcome.longest_streak, 5);
    assert_eq!(outcome.earnings, dec!(37.50));
    assert_eq!(outcome.balance, dec!(37.50));
    assert_eq!(fx.balance(&student).await, dec!(37.50));
    assert_eq!(fx.class_balance().await, dec!(962.50));
}

#[tokio::test]
async fn test_second_submission_credits_nothing() {
    let fx = Fixture::new();
    fx.fund_class(dec!(1000)).await;
    let student = fx.account_with(Decimal::ZERO).await;
    let actor = fx.student(&student);
    let games = service(&fx);

    let session_id = start(&games, &actor).await;
    fx.clock.advance(Duration::seconds(30));
    games.submit(&actor, &all_correct(session_id)).await.unwrap();
    let err = games
        .submit(&actor, &all_correct(session_id))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EarningsError::AlreadySubmitted(SessionStatus::Credited)
    ));
    assert_eq!(fx.balance(&student).await, dec!(37.50));
}

#[tokio::test]
async fn test_concurrent_submissions_credit_once() {
    let fx = Fixture::new();
    fx.fund_class(dec!(1000)).await;
    let student = fx.account_with(Decimal::ZERO).await;
    let actor = fx.student(&student);
    let games = Arc::new(service(&fx));

    let session_id = start(&games, &actor).await;
    fx.clock.advance(Duration::seconds(30));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let games = games.clone();
        let actor = actor.clone();
        handles.push(tokio::spawn(async move {
            games.submit(&actor, &all_correct(session_id)).await
        }));
    }
    let mut credited = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => credited += 1,
            Err(EarningsError::AlreadySubmitted(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(credited, 1);
    assert_eq!(fx.balance(&student).await, dec!(37.50));
    let history = fx
        .memory
        .list_transactions(fx.tenant, student.id, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(history.meta.total, 1);
}

#[tokio::test]
async fn test_fast_submission_burns_session() {
    let fx = Fixture::new();
    fx.fund_class(dec!(1000)).await;
    let student = fx.account_with(Decimal::ZERO).await;
    let actor = fx.student(&student);
    let games = service(&fx);

    let session_id = start(&games, &actor).await;
    fx.clock.advance(Duration::seconds(3));
    let err = games
        .submit(&actor, &all_correct(session_id))
        .await
        .unwrap_err();
    assert!(matches!(err, EarningsError::TooFast { .. }));

    let session = fx
        .memory
        .find_session(fx.tenant, session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.status, SessionStatus::Rejected);
    assert_eq!(session.rejection_code.as_deref(), Some("TOO_FAST"));

    fx.clock.advance(Duration::seconds(60));
    let err = games
        .submit(&actor, &all_correct(session_id))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EarningsError::AlreadySubmitted(SessionStatus::Rejected)
    ));
    assert_eq!(fx.balance(&student).await, Decimal::ZERO);
    assert_eq!(fx.class_balance().await, dec!(1000));
}

#[tokio::test]
async fn test_inflated_claims_are_rejected() {
    let fx = Fixture::new();
    fx.fund_class(dec!(1000)).await;
    let student = fx.account_with(Decimal::ZERO).await;
    let actor = fx.student(&student);
    let games = service(&fx);

    let session_id = start(&games, &actor).await;
    fx.clock.advance(Duration::seconds(30));
    let mut submission = all_correct(session_id);
    submission.answers[4] = "11".to_string();

    let err = games.submit(&actor, &submission).await.unwrap_err();
    assert!(matches!(err, EarningsError::ClaimMismatch));
    assert_eq!(fx.balance(&student).await, Decimal::ZERO);
}

#[tokio::test]
async fn test_no_correct_answers_completes_without_credit() {
    let fx = Fixture::new();
    fx.fund_class(dec!(1000)).await;
    let student = fx.account_with(Decimal::ZERO).await;
    let actor = fx.student(&student);
    let games = service(&fx);

    let session_id = start(&games, &actor).await;
    fx.clock.advance(Duration::seconds(30));
    let submission = Submission {
        session_id,
        answers: vec!["0".to_string(); 5],
        claimed_results: vec![false; 5],
        claimed_score: Some(5),
    };

    let outcome = games.submit(&actor, &submission).await.unwrap();
    assert_eq!(outcome.status, SessionStatus::Completed);
    assert_eq!(outcome.earnings, Decimal::ZERO);
    assert_eq!(fx.class_balance().await, dec!(1000));
    let history = fx
        .memory
        .list_transactions(fx.tenant, student.id, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(history.meta.total, 0);
}

#[tokio::test]
async fn test_treasury_shortfall_leaves_session_open() {
    let fx = Fixture::new();
    fx.fund_class(dec!(10)).await;
    let student = fx.account_with(Decimal::ZERO).await;
    let actor = fx.student(&student);
    let games = service(&fx);

    let session_id = start(&games, &actor).await;
    fx.clock.advance(Duration::seconds(30));
    let err = games
        .submit(&actor, &all_correct(session_id))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EarningsError::Ledger(LedgerError::TreasuryInsufficientFunds { .. })
    ));
    assert_eq!(fx.balance(&student).await, Decimal::ZERO);

    fx.fund_class(dec!(100)).await;
    let outcome = games.submit(&actor, &all_correct(session_id)).await.unwrap();
    assert_eq!(outcome.earnings, dec!(37.50));
}

#[tokio::test]
async fn test_burst_limit() {
    let fx = Fixture::new();
    fx.fund_class(dec!(1000)).await;
    let student = fx.account_with(Decimal::ZERO).await;
    let actor = fx.student(&student);
    let games = service(&fx);

    let mut sessions = Vec::new();
    for _ in 0..4 {
        sessions.push(start(&games, &actor).await);
    }
    fx.clock.advance(Duration::seconds(30));
    for session_id in &sessions[..3] {
        games.submit(&actor, &all_correct(*session_id)).await.unwrap();
    }
    let err = games
        .submit(&actor, &all_correct(sessions[3]))
        .await
        .unwrap_err();
    assert!(matches!(err, EarningsError::RateLimited { window_secs: 300 }));
    assert_eq!(fx.balance(&student).await, dec!(112.50));

    // Once the window has passed the player may continue.
    let session_id = start(&games, &actor).await;
    fx.clock.advance(Duration::seconds(301));
    games.submit(&actor, &all_correct(session_id)).await.unwrap();
}

#[tokio::test]
async fn test_daily_limit_resets_at_local_midnight() {
    let fx = Fixture::new();
    fx.fund_class(dec!(1000)).await;
    let student = fx.account_with(Decimal::ZERO).await;
    let actor = fx.student(&student);
    let games = service_with_games(
        &fx,
        GameConfig {
            burst_max_sessions: 100,
            daily_play_limit: 2,
            ..GameConfig::default()
        },
    );

    for _ in 0..2 {
        let session_id = start(&games, &actor).await;
        fx.clock.advance(Duration::seconds(30));
        games.submit(&actor, &all_correct(session_id)).await.unwrap();
    }
    let session_id = start(&games, &actor).await;
    fx.clock.advance(Duration::seconds(30));
    let err = games
        .submit(&actor, &all_correct(session_id))
        .await
        .unwrap_err();
    assert!(matches!(err, EarningsError::DailyLimitReached { limit: 2 }));

    // Past 22:00 UTC, which is midnight in Johannesburg.
    let session_id = start(&games, &actor).await;
    fx.clock.advance(Duration::minutes(13 * 60 + 30));
    games.submit(&actor, &all_correct(session_id)).await.unwrap();
}

#[tokio::test]
async fn test_session_owner_only() {
    let fx = Fixture::new();
    fx.fund_class(dec!(1000)).await;
    let owner = fx.account_with(Decimal::ZERO).await;
    let other = fx.account_with(Decimal::ZERO).await;
    let games = service(&fx);

    let session_id = start(&games, &fx.student(&owner)).await;
    fx.clock.advance(Duration::seconds(30));
    let err = games
        .submit(&fx.student(&other), &all_correct(session_id))
        .await
        .unwrap_err();
    assert!(matches!(err, EarningsError::Forbidden(_)));
}

#[tokio::test]
async fn test_start_requires_class_and_problems() {
    let fx = Fixture::new();
    let student = fx.account_with(Decimal::ZERO).await;
    let games = service(&fx);

    let mut actor = fx.student(&student);
    let err = games
        .start_session(&actor, "math", Difficulty::Easy, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, EarningsError::NoProblems));

    let err = games
        .start_session(&actor, "math", Difficulty::Easy, 51)
        .await
        .unwrap_err();
    assert!(matches!(err, EarningsError::TooManyProblems { max: 50 }));

    actor.class_name = None;
    let err = games
        .start_session(&actor, "math", Difficulty::Easy, 5)
        .await
        .unwrap_err();
    assert!(matches!(err, EarningsError::NoClass));
}

#[tokio::test]
async fn test_default_games_are_generated_server_side() {
    let fx = Fixture::new();
    let student = fx.account_with(Decimal::ZERO).await;
    let actor = fx.student(&student);
    let games = EarningsService::new(fx.store.clone(), fx.settings(), fx.clock());

    let start = games
        .start_session(&actor, "addition", Difficulty::Medium, 8)
        .await
        .unwrap();
    assert_eq!(start.prompts.len(), 8);
    let stored = fx
        .memory
        .find_session(fx.tenant, start.session_id)
        .await
        .unwrap()
        .unwrap();
    for (prompt, problem) in start.prompts.iter().zip(&stored.problems) {
        assert_eq!(prompt.prompt, problem.prompt);
        let sum: u64 = problem
            .prompt
            .split(" + ")
            .map(|n| n.parse::<u64>().unwrap())
            .sum();
        assert_eq!(problem.answer, sum.to_string());
    }

    let err = games
        .start_session(&actor, "chess", Difficulty::Easy, 3)
        .await
        .unwrap_err();
    assert!(matches!(err, EarningsError::UnknownGame(_)));
    assert_eq!(err.http_status_code(), 400);
}
