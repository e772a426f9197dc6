mod common;

use std::time::Duration;

use cadenza_core::playback::{Player, PlayerEvent};
use cadenza_core::{Engine, PipelineState, PlayerCommand, Reply, TrackId};

use common::{FakePlayerPipeline, UUID, add_track, library, secs};

fn append(player: &mut Player<FakePlayerPipeline>, track: u32, seconds: u64) {
    let mut replies = Vec::new();
    player
        .handle_command(
            PlayerCommand::AppendQueue {
                uuid: UUID.to_string(),
                track_id: TrackId::new(0, track),
                duration_ns: secs(seconds).as_nanos() as u64,
            },
            &mut replies,
        )
        .unwrap();
    assert!(replies.is_empty());
}

fn command(player: &mut Player<FakePlayerPipeline>, command: PlayerCommand) -> Vec<Reply> {
    let mut replies = Vec::new();
    player.handle_command(command, &mut replies).unwrap();
    replies
}

fn event(player: &mut Player<FakePlayerPipeline>, event: PlayerEvent) -> Vec<Reply> {
    let mut replies = Vec::new();
    player.handle_event(event, &mut replies).unwrap();
    replies
}

fn tick(player: &mut Player<FakePlayerPipeline>) -> Vec<Reply> {
    let mut replies = Vec::new();
    player.handle_tick(&mut replies).unwrap();
    replies
}

fn started(replies: &[Reply]) -> Vec<TrackId> {
    replies
        .iter()
        .filter_map(|r| match r {
            Reply::TrackStarted { track_id, .. } => Some(*track_id),
            _ => None,
        })
        .collect()
}

#[test]
fn ready_play_announces_set_then_first_track() {
    let dir = tempfile::tempdir().unwrap();
    let mut player = Player::new(FakePlayerPipeline::default(), library(dir.path()));
    append(&mut player, 0, 120);
    append(&mut player, 1, 180);

    let replies = command(&mut player, PlayerCommand::ReadyPlay);
    assert_eq!(
        replies,
        vec![
            Reply::SetReady { duration: 300.0 },
            Reply::TrackStarted {
                duration: 120.0,
                more_tracks: true,
                track_id: TrackId::new(0, 0),
            },
        ]
    );
    assert_eq!(player.pipeline().state, PipelineState::Null);
}

#[test]
fn set_duration_does_not_depend_on_append_order() {
    let dir = tempfile::tempdir().unwrap();
    let durations = [45, 300, 7, 180];
    let mut totals = Vec::new();
    for order in [[0, 1, 2, 3], [3, 1, 0, 2]] {
        let mut player = Player::new(FakePlayerPipeline::default(), library(dir.path()));
        for i in order {
            append(&mut player, i as u32, durations[i]);
        }
        totals.push(command(&mut player, PlayerCommand::ReadyPlay)[0].clone());
    }
    assert_eq!(totals[0], Reply::SetReady { duration: 532.0 });
    assert_eq!(totals[0], totals[1]);
}

#[test]
fn empty_set_only_reports_ready() {
    let dir = tempfile::tempdir().unwrap();
    let mut player = Player::new(FakePlayerPipeline::default(), library(dir.path()));
    assert_eq!(
        command(&mut player, PlayerCommand::ReadyPlay),
        vec![Reply::SetReady { duration: 0.0 }]
    );
    assert!(command(&mut player, PlayerCommand::Play).is_empty());
}

#[test]
fn play_binds_the_library_file() {
    let dir = tempfile::tempdir().unwrap();
    let lib = library(dir.path());
    let path = add_track(&lib, TrackId::new(0, 0));
    let mut player = Player::new(FakePlayerPipeline::default(), lib);
    append(&mut player, 0, 120);
    command(&mut player, PlayerCommand::ReadyPlay);

    assert_eq!(
        command(&mut player, PlayerCommand::Play),
        vec![Reply::State(PipelineState::Playing)]
    );
    assert_eq!(player.pipeline().source.as_ref(), Some(&path));
    assert!(player.current().unwrap().valid);
    assert!(player.timer_running());
}

#[test]
fn missing_file_plays_the_alert_sound() {
    let dir = tempfile::tempdir().unwrap();
    let mut player = Player::new(FakePlayerPipeline::default(), library(dir.path()));
    append(&mut player, 4, 60);
    command(&mut player, PlayerCommand::ReadyPlay);

    let replies = command(&mut player, PlayerCommand::Play);
    assert_eq!(replies, vec![Reply::State(PipelineState::Playing)]);
    assert_eq!(
        player.pipeline().source.as_deref(),
        Some(dir.path().join("alert.ogg").as_path())
    );
    assert!(!player.current().unwrap().valid);
}

#[test]
fn next_track_finishes_before_starting() {
    let dir = tempfile::tempdir().unwrap();
    let mut player = Player::new(FakePlayerPipeline::default(), library(dir.path()));
    for (n, s) in [(0, 100), (1, 200), (2, 300)] {
        append(&mut player, n, s);
    }
    command(&mut player, PlayerCommand::ReadyPlay);
    command(&mut player, PlayerCommand::Play);

    let replies = command(&mut player, PlayerCommand::NextTrack);
    assert_eq!(
        replies,
        vec![
            Reply::TrackFinished {
                remaining: 2,
                track_id: TrackId::new(0, 0),
            },
            Reply::TrackStarted {
                duration: 200.0,
                more_tracks: true,
                track_id: TrackId::new(0, 1),
            },
        ]
    );
    assert_eq!(player.pipeline().state, PipelineState::Playing);
    assert_eq!(player.segment_start(), secs(100));
}

#[test]
fn next_track_while_stopped_pre_rolls_paused() {
    let dir = tempfile::tempdir().unwrap();
    let mut player = Player::new(FakePlayerPipeline::default(), library(dir.path()));
    append(&mut player, 0, 100);
    append(&mut player, 1, 200);
    command(&mut player, PlayerCommand::ReadyPlay);

    let replies = command(&mut player, PlayerCommand::NextTrack);
    assert_eq!(
        replies,
        vec![
            Reply::TrackFinished {
                remaining: 1,
                track_id: TrackId::new(0, 0),
            },
            Reply::TrackStarted {
                duration: 200.0,
                more_tracks: false,
                track_id: TrackId::new(0, 1),
            },
            Reply::State(PipelineState::Paused),
        ]
    );
    assert_eq!(player.pipeline().seeks, vec![Duration::ZERO]);
    assert_eq!(
        command(&mut player, PlayerCommand::GetState),
        vec![Reply::State(PipelineState::Paused)]
    );

    // Already paused: the pre-roll changes nothing worth reporting.
    append(&mut player, 2, 50);
    let replies = command(&mut player, PlayerCommand::NextTrack);
    assert_eq!(started(&replies), vec![TrackId::new(0, 2)]);
    assert!(!replies.iter().any(|r| matches!(r, Reply::State(_))));
}

#[test]
fn second_set_starts_from_zero() {
    let dir = tempfile::tempdir().unwrap();
    let mut player = Player::new(FakePlayerPipeline::default(), library(dir.path()));
    append(&mut player, 0, 120);
    command(&mut player, PlayerCommand::ReadyPlay);
    command(&mut player, PlayerCommand::Play);
    event(&mut player, PlayerEvent::EndOfStream);

    append(&mut player, 1, 60);
    assert_eq!(
        command(&mut player, PlayerCommand::ReadyPlay)[0],
        Reply::SetReady { duration: 60.0 }
    );
    command(&mut player, PlayerCommand::Play);
    player.pipeline_mut().position = Some(secs(10));
    assert_eq!(
        tick(&mut player),
        vec![Reply::Position {
            position: 10.0,
            duration: 60.0,
            set_position: 10.0,
            set_duration: 60.0,
        }]
    );
}

#[test]
fn ready_play_mid_set_requeues_the_current_track() {
    let dir = tempfile::tempdir().unwrap();
    let mut player = Player::new(FakePlayerPipeline::default(), library(dir.path()));
    append(&mut player, 0, 100);
    append(&mut player, 1, 100);
    command(&mut player, PlayerCommand::ReadyPlay);
    command(&mut player, PlayerCommand::Play);
    event(&mut player, PlayerEvent::AboutToFinish);
    append(&mut player, 2, 50);

    let replies = command(&mut player, PlayerCommand::ReadyPlay);
    assert_eq!(
        replies,
        vec![
            Reply::State(PipelineState::Null),
            Reply::SetReady { duration: 250.0 },
            Reply::TrackStarted {
                duration: 100.0,
                more_tracks: true,
                track_id: TrackId::new(0, 0),
            },
        ]
    );
    assert_eq!(player.queue().len(), 2);
    assert_eq!(player.segment_start(), Duration::ZERO);
    assert!(!player.is_about_to_finish());
    assert!(!player.timer_running());
}

#[test]
fn next_track_on_the_last_track_finishes_the_set() {
    let dir = tempfile::tempdir().unwrap();
    let mut player = Player::new(FakePlayerPipeline::default(), library(dir.path()));
    append(&mut player, 0, 100);
    command(&mut player, PlayerCommand::ReadyPlay);
    command(&mut player, PlayerCommand::Play);

    let replies = command(&mut player, PlayerCommand::NextTrack);
    assert_eq!(
        replies,
        vec![
            Reply::TrackFinished {
                remaining: 0,
                track_id: TrackId::new(0, 0),
            },
            Reply::SetFinished,
        ]
    );
    assert_eq!(player.pipeline().state, PipelineState::Null);
    assert!(!player.timer_running());
}

#[test]
fn set_ratio_from_null_pre_rolls_paused() {
    let dir = tempfile::tempdir().unwrap();
    let mut player = Player::new(FakePlayerPipeline::default(), library(dir.path()));
    append(&mut player, 0, 200);
    command(&mut player, PlayerCommand::ReadyPlay);

    let replies = command(&mut player, PlayerCommand::SetRatio(0.25));
    assert_eq!(replies, vec![Reply::State(PipelineState::Paused)]);
    assert_eq!(player.pipeline().state, PipelineState::Paused);
    assert_eq!(player.pipeline().seeks, vec![secs(50)]);
    assert!(!player.timer_running());
}

#[test]
fn set_ratio_is_ignored_while_about_to_finish() {
    let dir = tempfile::tempdir().unwrap();
    let mut player = Player::new(FakePlayerPipeline::default(), library(dir.path()));
    append(&mut player, 0, 100);
    append(&mut player, 1, 100);
    command(&mut player, PlayerCommand::ReadyPlay);
    command(&mut player, PlayerCommand::Play);
    event(&mut player, PlayerEvent::AboutToFinish);

    assert!(command(&mut player, PlayerCommand::SetRatio(0.1)).is_empty());
    assert!(player.pipeline().seeks.is_empty());
}

#[test]
fn tick_reports_track_and_set_position() {
    let dir = tempfile::tempdir().unwrap();
    let mut player = Player::new(FakePlayerPipeline::default(), library(dir.path()));
    append(&mut player, 0, 120);
    append(&mut player, 1, 180);
    command(&mut player, PlayerCommand::ReadyPlay);
    command(&mut player, PlayerCommand::Play);

    player.pipeline_mut().position = Some(secs(30));
    assert_eq!(
        tick(&mut player),
        vec![Reply::Position {
            position: 30.0,
            duration: 120.0,
            set_position: 30.0,
            set_duration: 300.0,
        }]
    );
}

#[test]
fn position_going_down_after_about_to_finish_is_a_rollover() {
    let dir = tempfile::tempdir().unwrap();
    let lib = library(dir.path());
    add_track(&lib, TrackId::new(0, 0));
    let second = add_track(&lib, TrackId::new(0, 1));
    let mut player = Player::new(FakePlayerPipeline::default(), lib);
    append(&mut player, 0, 120);
    append(&mut player, 1, 180);
    command(&mut player, PlayerCommand::ReadyPlay);
    command(&mut player, PlayerCommand::Play);

    player.pipeline_mut().position = Some(secs(119));
    tick(&mut player);
    assert!(event(&mut player, PlayerEvent::AboutToFinish).is_empty());
    assert!(player.is_about_to_finish());
    assert_eq!(player.pipeline().next_source.as_ref(), Some(&second));

    player.pipeline_mut().position = Some(Duration::from_millis(400));
    assert_eq!(
        tick(&mut player),
        vec![
            Reply::TrackFinished {
                remaining: 0,
                track_id: TrackId::new(0, 0),
            },
            Reply::TrackStarted {
                duration: 180.0,
                more_tracks: false,
                track_id: TrackId::new(0, 1),
            },
        ]
    );
    assert!(!player.is_about_to_finish());

    player.pipeline_mut().position = Some(secs(2));
    assert_eq!(
        tick(&mut player),
        vec![Reply::Position {
            position: 2.0,
            duration: 180.0,
            set_position: 122.0,
            set_duration: 300.0,
        }]
    );
}

#[test]
fn end_of_stream_finishes_the_set() {
    let dir = tempfile::tempdir().unwrap();
    let mut player = Player::new(FakePlayerPipeline::default(), library(dir.path()));
    append(&mut player, 0, 60);
    command(&mut player, PlayerCommand::ReadyPlay);
    command(&mut player, PlayerCommand::Play);
    event(&mut player, PlayerEvent::AboutToFinish);

    assert_eq!(
        event(&mut player, PlayerEvent::EndOfStream),
        vec![
            Reply::TrackFinished {
                remaining: 0,
                track_id: TrackId::new(0, 0),
            },
            Reply::SetFinished,
        ]
    );
    assert_eq!(player.pipeline().state, PipelineState::Null);
}

#[test]
fn stop_keeps_the_pre_bound_track_queued() {
    let dir = tempfile::tempdir().unwrap();
    let mut player = Player::new(FakePlayerPipeline::default(), library(dir.path()));
    append(&mut player, 0, 60);
    append(&mut player, 1, 60);
    command(&mut player, PlayerCommand::ReadyPlay);
    command(&mut player, PlayerCommand::Play);
    event(&mut player, PlayerEvent::AboutToFinish);
    assert!(player.queue().is_empty());

    assert_eq!(
        command(&mut player, PlayerCommand::Stop),
        vec![Reply::State(PipelineState::Null)]
    );
    assert_eq!(player.queue().len(), 1);
    assert!(!player.is_about_to_finish());
}

#[test]
fn random_order_neither_loses_nor_repeats_tracks() {
    let dir = tempfile::tempdir().unwrap();
    let mut player = Player::new(FakePlayerPipeline::default(), library(dir.path()));
    for n in 0..6 {
        append(&mut player, n, 10 + n as u64);
    }
    command(&mut player, PlayerCommand::ReadyPlay);
    command(&mut player, PlayerCommand::Pause);
    assert!(command(&mut player, PlayerCommand::Random(true)).is_empty());
    assert!(player.current().is_none());
    assert_eq!(player.queue().len(), 6);

    let mut replies = command(&mut player, PlayerCommand::ReadyPlay);
    assert_eq!(replies[0], Reply::SetReady { duration: 75.0 });
    command(&mut player, PlayerCommand::Play);
    for _ in 0..6 {
        replies.extend(event(&mut player, PlayerEvent::EndOfStream));
    }

    let mut played: Vec<u32> = started(&replies).into_iter().map(|t| t.track_num).collect();
    played.sort_unstable();
    assert_eq!(played, (0..6).collect::<Vec<_>>());
    assert_eq!(replies.last(), Some(&Reply::SetFinished));
}

#[test]
fn random_while_paused_returns_to_null() {
    let dir = tempfile::tempdir().unwrap();
    let mut player = Player::new(FakePlayerPipeline::default(), library(dir.path()));
    append(&mut player, 0, 60);
    append(&mut player, 1, 60);
    command(&mut player, PlayerCommand::ReadyPlay);
    command(&mut player, PlayerCommand::Play);
    command(&mut player, PlayerCommand::Pause);

    assert_eq!(
        command(&mut player, PlayerCommand::Random(true)),
        vec![Reply::State(PipelineState::Null)]
    );
    assert_eq!(player.queue().len(), 2);
}

#[test]
fn pipeline_failure_resets_to_null_and_reports() {
    let dir = tempfile::tempdir().unwrap();
    let mut player = Player::new(FakePlayerPipeline::default(), library(dir.path()));
    append(&mut player, 0, 60);
    command(&mut player, PlayerCommand::ReadyPlay);
    player.pipeline_mut().fail_play = true;

    let replies = command(&mut player, PlayerCommand::Play);
    assert_eq!(replies[0], Reply::State(PipelineState::Null));
    assert!(matches!(&replies[1], Reply::Error(msg) if msg.contains("device unplugged")));
    assert!(!player.timer_running());

    let replies = event(&mut player, PlayerEvent::Error("decoder crashed".into()));
    assert_eq!(
        replies,
        vec![
            Reply::State(PipelineState::Null),
            Reply::Error("decoder crashed".into()),
        ]
    );
}

#[test]
fn volume_is_clamped_and_state_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let mut player = Player::new(FakePlayerPipeline::default(), library(dir.path()));
    assert!(command(&mut player, PlayerCommand::Volume(1.7)).is_empty());
    assert_eq!(player.pipeline().volume, Some(1.0));
    assert_eq!(
        command(&mut player, PlayerCommand::GetState),
        vec![Reply::State(PipelineState::Null)]
    );
}

#[test]
fn late_events_without_a_track_are_harmless() {
    let dir = tempfile::tempdir().unwrap();
    let mut player = Player::new(FakePlayerPipeline::default(), library(dir.path()));
    assert!(event(&mut player, PlayerEvent::AboutToFinish).is_empty());
    assert!(event(&mut player, PlayerEvent::EndOfStream).is_empty());
    assert!(tick(&mut player).is_empty());
}
