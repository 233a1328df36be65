use led_race::domain::{ConfigPatch, MonotonicClock, Player, RacePhase, TrackConfig};
use led_race::use_cases::{RaceCommand, RaceEvent, RaceHandle, RaceSettings, RaceTiming, spawn_race};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

fn settings() -> RaceSettings {
    RaceSettings {
        command_channel_capacity: 64,
        event_broadcast_capacity: 256,
        timing: RaceTiming {
            tick_interval: Duration::from_millis(16),
            countdown: Duration::from_millis(2000),
            win_delay: Duration::from_millis(3000),
        },
    }
}

fn spawn(config: TrackConfig) -> RaceHandle {
    spawn_race(&settings(), config, Arc::new(MonotonicClock::new()))
}

fn drain(events: &mut broadcast::Receiver<RaceEvent>) -> Vec<RaceEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

async fn wait_for_event(
    events: &mut broadcast::Receiver<RaceEvent>,
    wanted: impl Fn(&RaceEvent) -> bool,
) -> RaceEvent {
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            match events.recv().await {
                Ok(event) if wanted(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("race events closed"),
            }
        }
    })
    .await
    .expect("event in time")
}

#[tokio::test(start_paused = true)]
async fn countdown_turns_green_after_two_seconds() {
    let race = spawn(TrackConfig::default());
    let mut events = race.subscribe_events();

    race.send(RaceCommand::Start).await.expect("send start");
    tokio::time::sleep(Duration::from_millis(1900)).await;
    assert_eq!(race.snapshot().phase, RacePhase::Countdown);
    assert!(!race.snapshot().start_enabled);

    tokio::time::sleep(Duration::from_millis(200)).await;
    let snapshot = race.snapshot();
    assert_eq!(snapshot.phase, RacePhase::Running);
    assert_eq!(snapshot.race_elapsed_ms.map(|ms| ms < 500.0), Some(true));

    let seen = drain(&mut events);
    assert_eq!(
        seen,
        vec![
            RaceEvent::CountdownStarted { green_in_ms: 2000 },
            RaceEvent::Green
        ]
    );
    race.shutdown.notify_one();
}

#[tokio::test(start_paused = true)]
async fn reset_mid_countdown_cancels_the_green_light() {
    let race = spawn(TrackConfig::default());
    let mut events = race.subscribe_events();

    race.send(RaceCommand::Start).await.expect("send start");
    tokio::time::sleep(Duration::from_millis(1000)).await;
    race.send(RaceCommand::Reset).await.expect("send reset");
    tokio::time::sleep(Duration::from_millis(5000)).await;

    assert_eq!(race.snapshot().phase, RacePhase::Idle);
    assert!(!drain(&mut events).contains(&RaceEvent::Green));
    race.shutdown.notify_one();
}

#[tokio::test(start_paused = true)]
async fn restarted_countdown_ignores_the_stale_deadline() {
    let race = spawn(TrackConfig::default());

    race.send(RaceCommand::Start).await.expect("send start");
    tokio::time::sleep(Duration::from_millis(1000)).await;
    race.send(RaceCommand::Reset).await.expect("send reset");
    race.send(RaceCommand::Start).await.expect("send start again");

    // The first countdown would have ended at 2s.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(race.snapshot().phase, RacePhase::Countdown);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(race.snapshot().phase, RacePhase::Running);
    race.shutdown.notify_one();
}

#[tokio::test(start_paused = true)]
async fn winner_is_announced_then_race_resets() {
    let race = spawn(TrackConfig {
        length: 20,
        laps_to_win: 1,
        accel_impulse: 5.0,
        friction: 0.0,
        gravity: 0.0,
        ramp_height: 0.0,
        ..TrackConfig::default()
    });
    let mut events = race.subscribe_events();

    race.send(RaceCommand::Start).await.expect("send start");
    wait_for_event(&mut events, |event| *event == RaceEvent::Green).await;

    race.send(RaceCommand::Press { player: Player::Two })
        .await
        .expect("send press");

    let lap = wait_for_event(&mut events, |event| {
        matches!(event, RaceEvent::LapCompleted { .. })
    })
    .await;
    assert!(matches!(
        lap,
        RaceEvent::LapCompleted {
            player: Player::Two,
            lap: 1,
            cue: true,
            ..
        }
    ));

    let winner = wait_for_event(&mut events, |event| {
        matches!(event, RaceEvent::Winner { .. })
    })
    .await;
    assert_eq!(winner, RaceEvent::Winner { player: Player::Two });

    let finished = race.snapshot();
    assert_eq!(finished.phase, RacePhase::Finished);
    assert_eq!(finished.winner, Some(Player::Two));
    assert_eq!(finished.racer2.laps, 1);
    assert!(!finished.start_enabled);

    wait_for_event(&mut events, |event| *event == RaceEvent::Reset).await;
    let idle = race.snapshot();
    assert_eq!(idle.phase, RacePhase::Idle);
    assert_eq!(idle.racer2.laps, 0);
    assert_eq!(idle.winner, None);
    race.shutdown.notify_one();
}

#[tokio::test(start_paused = true)]
async fn reset_during_announcement_keeps_the_next_race_alive() {
    let race = spawn(TrackConfig {
        length: 20,
        laps_to_win: 1,
        accel_impulse: 5.0,
        friction: 0.0,
        gravity: 0.0,
        ramp_height: 0.0,
        ..TrackConfig::default()
    });
    let mut events = race.subscribe_events();

    race.send(RaceCommand::Start).await.expect("send start");
    wait_for_event(&mut events, |event| *event == RaceEvent::Green).await;
    race.send(RaceCommand::Press { player: Player::One })
        .await
        .expect("send press");
    wait_for_event(&mut events, |event| {
        matches!(event, RaceEvent::Winner { .. })
    })
    .await;
    assert_eq!(race.snapshot().phase, RacePhase::Finished);

    race.send(RaceCommand::Reset).await.expect("send reset");
    race.send(RaceCommand::Start).await.expect("send start again");
    wait_for_event(&mut events, |event| *event == RaceEvent::Green).await;

    // The announcement armed by the win would have ended by now.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(race.snapshot().phase, RacePhase::Running);
    assert!(!drain(&mut events).contains(&RaceEvent::Reset));
    race.shutdown.notify_one();
}

#[tokio::test(start_paused = true)]
async fn staged_length_change_publishes_new_terrain_on_reset() {
    let race = spawn(TrackConfig::default());
    race.send(RaceCommand::Start).await.expect("send start");
    tokio::time::sleep(Duration::from_millis(100)).await;

    race.send(RaceCommand::ApplyConfig {
        patch: ConfigPatch {
            length: Some(240.0),
            ..ConfigPatch::default()
        },
        reply: None,
    })
    .await
    .expect("send config");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(race.terrain().len(), 100);

    race.send(RaceCommand::Reset).await.expect("send reset");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(race.terrain().len(), 240);
    assert_eq!(race.snapshot().config.length, 240);
    race.shutdown.notify_one();
}
