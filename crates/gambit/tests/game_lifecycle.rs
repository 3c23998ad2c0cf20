//! End-to-end turn cycles against scripted collaborators.
//!
//! Tests run under paused time: a `Hang` step never answers, and tokio
//! advances the clock to the coordinator's deadline instead of sleeping.

use gambit::board::Color;
use gambit::event::OperatorAction;
use gambit::game::{EndReason, GameConfig, GameFault, GamePhase, GameState, Mover, PendingRequest};
use gambit::gateway::RequestKind;
use gambit::testing::{ExecutorStep, TestRig};
use gambit::types::{BoardId, CorrelationId, GameId};

fn standard_game() -> GameConfig {
    GameConfig::new(Color::White, 3)
}

#[tokio::test(start_paused = true)]
async fn full_turn_cycle_commits_both_moves() {
    let rig = TestRig::new();
    rig.detector.push_move("e2e4", 0.98);
    rig.decider.push_move("e7e5");
    rig.executor.push(ExecutorStep::Succeed);

    let game_id = rig.create_game("cell-1", &standard_game()).unwrap();
    rig.wait_for_phase(game_id, GamePhase::AwaitingHumanMove).await;

    rig.registry.notify_move_suspected(game_id).unwrap();
    let snapshot = rig
        .wait_until(game_id, |s| {
            s.phase == GamePhase::AwaitingHumanMove && s.move_count == 2
        })
        .await;

    let last = snapshot.last_move.unwrap();
    assert_eq!(last.mover, Mover::Engine);
    assert_eq!(last.uci.as_str(), "e7e5");
    assert_eq!(snapshot.to_move, Color::White);
    assert!(snapshot.fault.is_none());

    let executed = rig.executor.executed();
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0].from.to_string(), "e7");
    assert_eq!(executed[0].to.to_string(), "e5");
}

#[tokio::test(start_paused = true)]
async fn engine_opens_when_human_plays_black() {
    let rig = TestRig::new();
    rig.decider.push_move("e2e4");
    rig.executor.push(ExecutorStep::Succeed);

    let game_id = rig
        .create_game("cell-1", &GameConfig::new(Color::Black, 3))
        .unwrap();

    let snapshot = rig
        .wait_until(game_id, |s| {
            s.phase == GamePhase::AwaitingHumanMove && s.move_count == 1
        })
        .await;

    let last = snapshot.last_move.unwrap();
    assert_eq!(last.mover, Mover::Engine);
    assert_eq!(last.color, Color::White);
    assert_eq!(snapshot.to_move, Color::Black);
}

#[tokio::test(start_paused = true)]
async fn resignation_ends_the_game() {
    let rig = TestRig::new();
    let game_id = rig.create_game("cell-1", &standard_game()).unwrap();
    rig.wait_for_phase(game_id, GamePhase::AwaitingHumanMove).await;

    rig.registry
        .submit(game_id, OperatorAction::Resign)
        .unwrap();
    let snapshot = rig.wait_for_phase(game_id, GamePhase::GameOver).await;

    assert_eq!(
        snapshot.end_reason,
        Some(EndReason::Resignation {
            winner: Color::Black
        })
    );
    assert_eq!(snapshot.move_count, 0);
}

#[tokio::test(start_paused = true)]
async fn abort_is_deferred_while_robot_is_mid_move() {
    let rig = TestRig::new();
    rig.detector.push_move("e2e4", 0.95);
    rig.decider.push_move("e7e5");
    rig.executor.push(ExecutorStep::Hang);

    let game_id = rig.create_game("cell-1", &standard_game()).unwrap();
    rig.wait_for_phase(game_id, GamePhase::AwaitingHumanMove).await;
    rig.registry.notify_move_suspected(game_id).unwrap();
    rig.wait_for_phase(game_id, GamePhase::ExecutingRobotMove)
        .await;

    // Abort while the arm is in flight: honored only once the execution
    // resolves (here, by its deadline), never mid-trajectory.
    rig.registry.submit(game_id, OperatorAction::Abort).unwrap();
    let snapshot = rig.wait_for_phase(game_id, GamePhase::GameOver).await;

    assert_eq!(snapshot.end_reason, Some(EndReason::Aborted));
    // No retry was attempted after the deferred abort.
    assert_eq!(rig.executor.executed().len(), 1);
    // The engine move stays committed; execution is physical catch-up.
    assert_eq!(snapshot.move_count, 2);
}

#[tokio::test(start_paused = true)]
async fn checkmate_is_declared_after_the_robot_plays_the_mating_move() {
    let rig = TestRig::new();
    // Fool's mate: 1. f3 e5 2. g4 Qh4#.
    rig.detector.push_move("f2f3", 0.95);
    rig.detector.push_move("g2g4", 0.95);
    rig.decider.push_move("e7e5");
    rig.decider.push_move("d8h4");

    let game_id = rig.create_game("cell-1", &standard_game()).unwrap();
    rig.wait_for_phase(game_id, GamePhase::AwaitingHumanMove).await;

    rig.registry.notify_move_suspected(game_id).unwrap();
    rig.wait_until(game_id, |s| {
        s.phase == GamePhase::AwaitingHumanMove && s.move_count == 2
    })
    .await;

    rig.registry.notify_move_suspected(game_id).unwrap();
    let snapshot = rig.wait_for_phase(game_id, GamePhase::GameOver).await;

    assert_eq!(
        snapshot.end_reason,
        Some(EndReason::Checkmate {
            winner: Color::Black
        })
    );
    assert_eq!(snapshot.move_count, 4);
    // Both engine moves, including the mating one, were physically played.
    assert_eq!(rig.executor.executed().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn difficulty_changes_between_moves() {
    let rig = TestRig::new();
    let game_id = rig.create_game("cell-1", &standard_game()).unwrap();
    rig.wait_for_phase(game_id, GamePhase::AwaitingHumanMove).await;

    rig.registry
        .submit(game_id, OperatorAction::SetDifficulty(9))
        .unwrap();
    let snapshot = rig.wait_until(game_id, |s| s.difficulty == 9).await;
    assert_eq!(snapshot.difficulty, 9);

    // Out-of-range values are clamped.
    rig.registry
        .submit(game_id, OperatorAction::SetDifficulty(42))
        .unwrap();
    rig.wait_until(game_id, |s| s.difficulty == 10).await;
}

#[tokio::test(start_paused = true)]
async fn snapshot_feed_mirrors_committed_transitions() {
    let rig = TestRig::new();
    rig.detector.push_move("e2e4", 0.98);
    rig.decider.push_move("e7e5");

    let mut feed = rig.registry.subscribe();
    let game_id = rig.create_game("cell-1", &standard_game()).unwrap();
    rig.wait_for_phase(game_id, GamePhase::AwaitingHumanMove).await;
    rig.registry.notify_move_suspected(game_id).unwrap();
    rig.wait_until(game_id, |s| {
        s.phase == GamePhase::AwaitingHumanMove && s.move_count == 2
    })
    .await;

    let mut phases = Vec::new();
    while let Ok(snapshot) = feed.try_recv() {
        phases.push(snapshot.phase);
    }
    // The transient applying phases are observable on the feed.
    assert!(phases.contains(&GamePhase::ConfirmingHumanMove));
    assert!(phases.contains(&GamePhase::ApplyingHumanMove));
    assert!(phases.contains(&GamePhase::ApplyingEngineMove));
    assert!(phases.contains(&GamePhase::ExecutingRobotMove));
}

#[tokio::test(start_paused = true)]
async fn restore_demotes_in_flight_game_to_paused() {
    let rig = TestRig::new();

    // A game persisted while its engine request was in flight (engine opens
    // because the human plays black).
    let mut state = GameState::new(
        GameId::new(),
        BoardId::new("cell-1"),
        &GameConfig::new(Color::Black, 3),
    )
    .unwrap();
    state.phase = GamePhase::AwaitingEngineMove;
    state.pending_request = Some(PendingRequest {
        correlation_id: CorrelationId::new(),
        kind: RequestKind::ComputeMove,
        issued_at: chrono::Utc::now(),
        deadline: std::time::Duration::from_secs(30),
        attempt: 1,
    });

    let game_id = rig.registry.restore(state).unwrap();
    let snapshot = rig.wait_for_phase(game_id, GamePhase::Paused).await;
    assert_eq!(snapshot.fault, Some(GameFault::RecoveryRequired));

    // The board claim is held: no second game on the same cell.
    assert!(rig.create_game("cell-1", &standard_game()).is_err());

    // Operator confirms the physical board and resumes; the engine request
    // is re-issued and the game proceeds.
    rig.decider.push_move("e2e4");
    rig.registry
        .submit(game_id, OperatorAction::Resume)
        .unwrap();
    let snapshot = rig
        .wait_until(game_id, |s| {
            s.phase == GamePhase::AwaitingHumanMove && s.move_count == 1
        })
        .await;
    assert!(snapshot.fault.is_none());
}

#[tokio::test(start_paused = true)]
async fn restore_archives_terminal_games() {
    let rig = TestRig::new();
    let mut state = GameState::new(
        GameId::new(),
        BoardId::new("cell-1"),
        &standard_game(),
    )
    .unwrap();
    state.phase = GamePhase::GameOver;
    state.end_reason = Some(EndReason::Aborted);

    let game_id = rig.registry.restore(state).unwrap();
    let snapshot = rig.registry.get_status(game_id).unwrap();
    assert_eq!(snapshot.phase, GamePhase::GameOver);

    // Terminal games hold no claim.
    rig.create_game("cell-1", &standard_game()).unwrap();
}
