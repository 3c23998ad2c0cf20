//! Retry bounds, fallback ladders, fault surfacing, and idempotent event
//! delivery.

use std::time::Duration;

use gambit::board::Color;
use gambit::event::{GameEvent, OperatorAction};
use gambit::game::{GameConfig, GameFault, GamePhase};
use gambit::gateway::{GatewayError, MechanicalFault};
use gambit::testing::{DetectorStep, ExecutorStep, TestRig};
use gambit::types::CorrelationId;
use gambit::OrchestratorConfig;

fn standard_game() -> GameConfig {
    GameConfig::new(Color::White, 3)
}

/// Let in-flight events settle without disturbing pending deadlines.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test(start_paused = true)]
async fn detection_timeout_pauses_after_exactly_the_retry_bound() {
    let rig = TestRig::new();
    // No detector script: every attempt hangs until its deadline.
    let game_id = rig.create_game("cell-1", &standard_game()).unwrap();
    rig.wait_for_phase(game_id, GamePhase::AwaitingHumanMove).await;

    rig.registry.notify_move_suspected(game_id).unwrap();
    let snapshot = rig.wait_for_phase(game_id, GamePhase::Paused).await;

    assert_eq!(snapshot.fault, Some(GameFault::DetectionTimeout));
    assert_eq!(snapshot.move_count, 0);
    assert_eq!(rig.detector.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn paused_detection_resumes_on_operator_action() {
    let rig = TestRig::new();
    let game_id = rig.create_game("cell-1", &standard_game()).unwrap();
    rig.wait_for_phase(game_id, GamePhase::AwaitingHumanMove).await;
    rig.registry.notify_move_suspected(game_id).unwrap();
    rig.wait_for_phase(game_id, GamePhase::Paused).await;

    // Operator confirms the board; the re-issued detection succeeds.
    rig.detector.push_move("e2e4", 0.95);
    rig.decider.push_hang();
    rig.registry
        .submit(game_id, OperatorAction::Resume)
        .unwrap();

    let snapshot = rig.wait_until(game_id, |s| s.move_count == 1).await;
    assert!(snapshot.fault.is_none());
    assert_eq!(rig.detector.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn illegal_detection_is_rejected_and_redetected() {
    let rig = TestRig::new();
    // First report claims an illegal pawn move; the second corrects it.
    rig.detector.push_move("e2e5", 0.95);
    rig.detector.push_move("e2e4", 0.97);
    rig.decider.push_hang();

    let game_id = rig.create_game("cell-1", &standard_game()).unwrap();
    rig.wait_for_phase(game_id, GamePhase::AwaitingHumanMove).await;
    rig.registry.notify_move_suspected(game_id).unwrap();

    let snapshot = rig.wait_until(game_id, |s| s.move_count == 1).await;
    assert_eq!(snapshot.last_move.unwrap().uci.as_str(), "e2e4");
    assert_eq!(rig.detector.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn persistent_board_mismatch_pauses_with_fault() {
    let rig = TestRig::new();
    for _ in 0..3 {
        rig.detector.push_move("e2e5", 0.95);
    }

    let game_id = rig.create_game("cell-1", &standard_game()).unwrap();
    rig.wait_for_phase(game_id, GamePhase::AwaitingHumanMove).await;
    rig.registry.notify_move_suspected(game_id).unwrap();

    let snapshot = rig.wait_for_phase(game_id, GamePhase::Paused).await;
    assert_eq!(snapshot.fault, Some(GameFault::BoardMismatch));
    // The illegal claim never reached the move log.
    assert_eq!(snapshot.move_count, 0);
}

#[tokio::test(start_paused = true)]
async fn low_confidence_detection_is_retried() {
    let rig = TestRig::new();
    rig.detector.push_move("e2e4", 0.20);
    rig.detector.push_move("e2e4", 0.95);
    rig.decider.push_hang();

    let game_id = rig.create_game("cell-1", &standard_game()).unwrap();
    rig.wait_for_phase(game_id, GamePhase::AwaitingHumanMove).await;
    rig.registry.notify_move_suspected(game_id).unwrap();

    rig.wait_until(game_id, |s| s.move_count == 1).await;
    assert_eq!(rig.detector.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn unchanged_report_returns_to_waiting_without_consuming_attempts() {
    let rig = TestRig::new();
    rig.detector.push_unchanged();

    let mut feed = rig.registry.subscribe();
    let game_id = rig.create_game("cell-1", &standard_game()).unwrap();
    rig.wait_for_phase(game_id, GamePhase::AwaitingHumanMove).await;
    rig.registry.notify_move_suspected(game_id).unwrap();

    // The game dips into confirmation and comes straight back.
    let mut saw_confirming = false;
    loop {
        let snapshot = feed.recv().await.unwrap();
        if snapshot.phase == GamePhase::ConfirmingHumanMove {
            saw_confirming = true;
        }
        if saw_confirming && snapshot.phase == GamePhase::AwaitingHumanMove {
            break;
        }
    }
    assert_eq!(rig.detector.calls(), 1);

    // A real move is still accepted afterwards with a fresh attempt budget.
    rig.detector.push_move("e2e4", 0.95);
    rig.decider.push_hang();
    rig.registry.notify_move_suspected(game_id).unwrap();
    rig.wait_until(game_id, |s| s.move_count == 1).await;
}

#[tokio::test(start_paused = true)]
async fn grasp_failures_retry_without_recommitting_the_move() {
    let rig = TestRig::new();
    rig.detector.push_move("e2e4", 0.95);
    rig.decider.push_move("e7e5");
    rig.executor.push_failures(
        GatewayError::Mechanical(MechanicalFault::GraspFailure),
        2,
    );
    rig.executor.push(ExecutorStep::Succeed);

    let game_id = rig.create_game("cell-1", &standard_game()).unwrap();
    rig.wait_for_phase(game_id, GamePhase::AwaitingHumanMove).await;
    rig.registry.notify_move_suspected(game_id).unwrap();

    let snapshot = rig
        .wait_until(game_id, |s| {
            s.phase == GamePhase::AwaitingHumanMove && s.move_count == 2
        })
        .await;

    // Three physical attempts of the same command, one committed move.
    let executed = rig.executor.executed();
    assert_eq!(executed.len(), 3);
    assert!(executed.iter().all(|c| c == &executed[0]));
    assert_eq!(snapshot.move_count, 2);
    assert!(snapshot.fault.is_none());
}

#[tokio::test(start_paused = true)]
async fn exhausted_grasp_failures_pause_with_the_mechanical_fault() {
    let rig = TestRig::new();
    rig.detector.push_move("e2e4", 0.95);
    rig.decider.push_move("e7e5");
    rig.executor.push_failures(
        GatewayError::Mechanical(MechanicalFault::GraspFailure),
        3,
    );

    let game_id = rig.create_game("cell-1", &standard_game()).unwrap();
    rig.wait_for_phase(game_id, GamePhase::AwaitingHumanMove).await;
    rig.registry.notify_move_suspected(game_id).unwrap();

    let snapshot = rig.wait_for_phase(game_id, GamePhase::Paused).await;
    assert_eq!(snapshot.fault, Some(GameFault::GraspFailure));
    // Digital state stays ahead of the physical board until the operator
    // reconciles: the move remains committed.
    assert_eq!(snapshot.move_count, 2);

    // Operator clears the jam and resumes; the same move is re-executed.
    rig.registry
        .submit(game_id, OperatorAction::Resume)
        .unwrap();
    rig.wait_until(game_id, |s| {
        s.phase == GamePhase::AwaitingHumanMove && s.move_count == 2
    })
    .await;
    assert_eq!(rig.executor.executed().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn engine_timeouts_walk_the_fallback_ladder() {
    let rig = TestRig::new();
    rig.detector.push_move("e2e4", 0.95);
    rig.decider.push_hang();
    rig.decider.push_hang();
    rig.decider.push_move("e7e5");

    let game_id = rig.create_game("cell-1", &standard_game()).unwrap();
    rig.wait_for_phase(game_id, GamePhase::AwaitingHumanMove).await;
    rig.registry.notify_move_suspected(game_id).unwrap();

    rig.wait_until(game_id, |s| {
        s.phase == GamePhase::AwaitingHumanMove && s.move_count == 2
    })
    .await;

    let full = OrchestratorConfig::default().engine_time_budget;
    assert_eq!(
        rig.decider.requests(),
        vec![(3, full), (3, full / 2), (1, full / 2)]
    );
}

#[tokio::test(start_paused = true)]
async fn engine_exhaustion_pauses_and_resume_retries() {
    let rig = TestRig::new();
    rig.detector.push_move("e2e4", 0.95);
    // Empty decider script: all three ladder rungs time out.

    let game_id = rig.create_game("cell-1", &standard_game()).unwrap();
    rig.wait_for_phase(game_id, GamePhase::AwaitingHumanMove).await;
    rig.registry.notify_move_suspected(game_id).unwrap();

    let snapshot = rig.wait_for_phase(game_id, GamePhase::Paused).await;
    assert_eq!(snapshot.fault, Some(GameFault::EngineUnavailable));
    assert_eq!(rig.decider.requests().len(), 3);

    rig.decider.push_move("e7e5");
    rig.registry
        .submit(game_id, OperatorAction::Resume)
        .unwrap();
    rig.wait_until(game_id, |s| {
        s.phase == GamePhase::AwaitingHumanMove && s.move_count == 2
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn duplicate_move_suspicion_triggers_one_detection() {
    let rig = TestRig::new();
    rig.detector.push_move("e2e4", 0.95);
    rig.decider.push_hang();

    let game_id = rig.create_game("cell-1", &standard_game()).unwrap();
    rig.wait_for_phase(game_id, GamePhase::AwaitingHumanMove).await;

    // The vision layer fires twice for the same physical move.
    rig.registry.notify_move_suspected(game_id).unwrap();
    rig.registry.notify_move_suspected(game_id).unwrap();

    let snapshot = rig.wait_until(game_id, |s| s.move_count == 1).await;
    assert_eq!(rig.detector.calls(), 1);
    assert_eq!(snapshot.move_count, 1);
}

#[tokio::test(start_paused = true)]
async fn stale_deadline_events_are_discarded() {
    let rig = TestRig::new();
    rig.detector.push_move("e2e4", 0.95);
    rig.decider.push_hang();

    let game_id = rig.create_game("cell-1", &standard_game()).unwrap();
    rig.wait_for_phase(game_id, GamePhase::AwaitingHumanMove).await;
    rig.registry.notify_move_suspected(game_id).unwrap();
    rig.wait_until(game_id, |s| s.move_count == 1).await;

    // A deadline for a correlation ID that matches nothing must not disturb
    // the in-flight engine request.
    let sender = rig.registry.event_sender(game_id).unwrap();
    sender.publish(GameEvent::DeadlineExpired {
        correlation_id: CorrelationId::new(),
    });
    settle().await;

    let snapshot = rig.registry.get_status(game_id).unwrap();
    assert_eq!(snapshot.phase, GamePhase::AwaitingEngineMove);
    assert_eq!(snapshot.move_count, 1);
}

#[tokio::test(start_paused = true)]
async fn late_detector_answer_is_discarded_after_timeout() {
    let rig = TestRig::new();
    // The first answer arrives at t=20s, well past the 10s deadline; the
    // retried attempt answers immediately.
    rig.detector.push(DetectorStep::Delayed(
        gambit::gateway::DetectionReport::moved(
            "e2e4".parse().unwrap(),
            0.95,
        ),
        Duration::from_secs(20),
    ));
    rig.detector.push_move("e2e4", 0.95);
    rig.decider.push_hang();

    let game_id = rig.create_game("cell-1", &standard_game()).unwrap();
    rig.wait_for_phase(game_id, GamePhase::AwaitingHumanMove).await;
    rig.registry.notify_move_suspected(game_id).unwrap();

    rig.wait_until(game_id, |s| s.move_count == 1).await;

    // Let the late first answer arrive and be discarded.
    tokio::time::sleep(Duration::from_secs(15)).await;
    let snapshot = rig.registry.get_status(game_id).unwrap();
    // Still exactly one committed move: the late answer did not double-apply.
    assert_eq!(snapshot.move_count, 1);
    assert_eq!(rig.detector.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn custom_retry_bound_is_respected() {
    let rig = TestRig::with_config(OrchestratorConfig {
        detection_max_attempts: 5,
        ..Default::default()
    });

    let game_id = rig.create_game("cell-1", &standard_game()).unwrap();
    rig.wait_for_phase(game_id, GamePhase::AwaitingHumanMove).await;
    rig.registry.notify_move_suspected(game_id).unwrap();

    rig.wait_for_phase(game_id, GamePhase::Paused).await;
    assert_eq!(rig.detector.calls(), 5);
}
