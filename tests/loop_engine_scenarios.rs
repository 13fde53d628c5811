//! End-to-end scenarios driving a real [`LoopEngine`] through its public
//! command/telemetry surface, rather than exercising its collaborators in
//! isolation (see each module's own `#[cfg(test)]` block for that).
//!
//! [`LoopEngine`]: loopforge::loop_engine::LoopEngine

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use loopforge::commands::Command;
use loopforge::ipc::{ChannelCommandSource, ChannelStateSink, TelemetryEvent};
use loopforge::ir::{CompiledSession, Event, EventSequence, Track, TrackMeta};
use loopforge::loop_engine::LoopEngine;
use loopforge::note_scheduler::NoteScheduler;
use loopforge::output::mock::RecordingMidiOutput;
use loopforge::output::MidiOutput;
use loopforge::param_value::{ParamMap, ParamValue};
use loopforge::router::DestinationRouter;
use loopforge::runtime_state::RuntimeState;
use loopforge::scheduler::{MessageScheduler, ScheduledMessage, ScheduledMessageBatch};
use loopforge::senders::DestinationSender;

/// Tempo fast enough that a handful of real-time steps fit in a test's
/// sleep budget, near the engine's clamped upper bound.
const FAST_BPM: f64 = 960.0;

/// A [`MidiOutput`] that forwards every call through a shared lock so test
/// code keeps a handle on what the engine sent after it owns the original.
/// [`NoteScheduler`] takes exclusive ownership of its output, so this is the
/// only way to observe calls made through it once handed over.
#[derive(Clone, Default)]
struct SharedMidi(Arc<StdMutex<RecordingMidiOutput>>);

impl SharedMidi {
    fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().calls.clone()
    }
}

impl MidiOutput for SharedMidi {
    fn connect(&mut self) -> bool {
        self.0.lock().unwrap().connect()
    }
    fn disconnect(&mut self) {
        self.0.lock().unwrap().disconnect()
    }
    fn send_note_on(&mut self, channel: u8, note: u8, velocity: u8) -> bool {
        self.0.lock().unwrap().send_note_on(channel, note, velocity)
    }
    fn send_note_off(&mut self, channel: u8, note: u8) -> bool {
        self.0.lock().unwrap().send_note_off(channel, note)
    }
    fn send_cc(&mut self, channel: u8, cc: u8, value: u8) -> bool {
        self.0.lock().unwrap().send_cc(channel, cc, value)
    }
    fn send_pitch_bend(&mut self, channel: u8, value: i16) -> bool {
        self.0.lock().unwrap().send_pitch_bend(channel, value)
    }
    fn send_aftertouch(&mut self, channel: u8, value: u8) -> bool {
        self.0.lock().unwrap().send_aftertouch(channel, value)
    }
    fn send_clock(&mut self) -> bool {
        self.0.lock().unwrap().send_clock()
    }
    fn send_start(&mut self) -> bool {
        self.0.lock().unwrap().send_start()
    }
    fn send_stop(&mut self) -> bool {
        self.0.lock().unwrap().send_stop()
    }
    fn send_continue(&mut self) -> bool {
        self.0.lock().unwrap().send_continue()
    }
    fn all_notes_off(&mut self, channel: Option<u8>) -> bool {
        self.0.lock().unwrap().all_notes_off(channel)
    }
    fn is_connected(&self) -> bool {
        self.0.lock().unwrap().is_connected()
    }
    fn port_name(&self) -> Option<&str> {
        // The trait ties the return lifetime to `&self`, but the real data
        // lives behind a lock guard that cannot outlive this call; no
        // scenario here depends on the connected port's name.
        None
    }
    fn set_port(&mut self, port_name: &str) -> bool {
        self.0.lock().unwrap().set_port(port_name)
    }
}

/// A [`DestinationSender`] recording every params map it receives.
#[derive(Clone, Default)]
struct RecordingSender(Arc<StdMutex<Vec<ParamMap>>>);

impl DestinationSender for RecordingSender {
    fn send_message(&mut self, params: &ParamMap) -> bool {
        self.0.lock().unwrap().push(params.clone());
        true
    }

    fn kind(&self) -> loopforge::senders::SenderKind {
        loopforge::senders::SenderKind::Osc
    }

    fn is_connected(&self) -> bool {
        true
    }
}

fn track(id: &str) -> Track {
    Track {
        meta: TrackMeta {
            track_id: id.to_string(),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Builds an engine over a connected [`SharedMidi`], an empty router, and a
/// fresh command/telemetry channel pair, returning the pieces a test needs
/// to drive and inspect it.
fn build_engine(
    session: CompiledSession,
    scheduler: MessageScheduler,
    router: DestinationRouter,
) -> (
    Arc<LoopEngine>,
    tokio::sync::mpsc::UnboundedSender<Command>,
    Arc<ChannelStateSink>,
    SharedMidi,
) {
    let mut runtime = RuntimeState::new();
    runtime.load_session(session);

    let midi = RecordingMidiOutput {
        connected: true,
        ..Default::default()
    };
    let shared_midi = SharedMidi(Arc::new(StdMutex::new(midi)));
    let notes = NoteScheduler::new(Box::new(shared_midi.clone()));

    let (command_tx, command_source) = ChannelCommandSource::channel();
    let state_sink = Arc::new(ChannelStateSink::default());

    let engine = Arc::new(LoopEngine::new(
        runtime,
        scheduler,
        router,
        notes,
        Arc::new(command_source),
        state_sink.clone(),
        Vec::new(),
    ));

    (engine, command_tx, state_sink, shared_midi)
}

/// S1: playing a session with a scheduled note emits MIDI Start on the
/// first Play, then fires the note-on once the playhead reaches its step,
/// and reports playhead position through telemetry.
#[tokio::test]
async fn s1_simple_playback_emits_start_and_note_on() {
    let mut session = CompiledSession::default();
    session.environment.bpm = FAST_BPM;
    session.tracks.insert("kick".to_string(), track("kick"));
    session.sequences.insert(
        "kick".to_string(),
        EventSequence::from_events(
            "kick",
            vec![Event {
                step: 1,
                velocity: 1.0,
                note: Some(60),
                gate: 1.0,
            }],
        ),
    );

    let (engine, command_tx, state_sink, shared_midi) =
        build_engine(session, MessageScheduler::new(), DestinationRouter::new());

    let run_engine = engine.clone();
    let handle = tokio::spawn(async move { run_engine.run().await });

    command_tx.send(Command::Play(Default::default())).unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;
    engine.stop();
    handle.await.unwrap();

    let calls = shared_midi.calls();
    assert!(calls.iter().any(|c| c == "start"), "expected a MIDI Start call, got {calls:?}");
    assert!(
        calls.iter().any(|c| c.starts_with("note_on") && c.contains(" 60 ")),
        "expected a note_on for note 60, got {calls:?}"
    );

    let events = state_sink.drain();
    assert!(
        events.iter().any(|e| matches!(e, TelemetryEvent::Position(_))),
        "expected at least one Position telemetry event"
    );
    assert!(
        events.iter().any(|e| matches!(e, TelemetryEvent::Connected)),
        "expected the initial Connected event"
    );
}

/// S2: pausing mid-playback and resuming sends Stop then Continue, never a
/// second Start — the transition table is keyed off the transport state
/// the command observed immediately before mutating it.
#[tokio::test]
async fn s2_pause_then_resume_emits_stop_then_continue_not_start() {
    let mut session = CompiledSession::default();
    session.environment.bpm = FAST_BPM;

    let (engine, command_tx, _state_sink, shared_midi) =
        build_engine(session, MessageScheduler::new(), DestinationRouter::new());

    let run_engine = engine.clone();
    let handle = tokio::spawn(async move { run_engine.run().await });

    command_tx.send(Command::Play(Default::default())).unwrap();
    tokio::time::sleep(Duration::from_millis(40)).await;
    command_tx.send(Command::Pause(Default::default())).unwrap();
    tokio::time::sleep(Duration::from_millis(40)).await;
    command_tx.send(Command::Play(Default::default())).unwrap();
    tokio::time::sleep(Duration::from_millis(40)).await;

    engine.stop();
    handle.await.unwrap();

    let transport: Vec<String> = shared_midi
        .calls()
        .into_iter()
        .filter(|c| matches!(c.as_str(), "start" | "stop" | "continue"))
        .collect();
    assert_eq!(transport, vec!["start", "stop", "continue"], "unexpected transport sequence");
}

/// S2b: stopping (rather than pausing) and playing again sends Stop then a
/// fresh Start, since `Stop` resets the playhead and the transition out of
/// `Stopped` is always a Start, never a Continue.
#[tokio::test]
async fn s2b_stop_then_play_emits_stop_then_start_again() {
    let mut session = CompiledSession::default();
    session.environment.bpm = FAST_BPM;

    let (engine, command_tx, _state_sink, shared_midi) =
        build_engine(session, MessageScheduler::new(), DestinationRouter::new());

    let run_engine = engine.clone();
    let handle = tokio::spawn(async move { run_engine.run().await });

    command_tx.send(Command::Play(Default::default())).unwrap();
    tokio::time::sleep(Duration::from_millis(40)).await;
    command_tx.send(Command::Stop(Default::default())).unwrap();
    tokio::time::sleep(Duration::from_millis(40)).await;
    command_tx.send(Command::Play(Default::default())).unwrap();
    tokio::time::sleep(Duration::from_millis(40)).await;

    engine.stop();
    handle.await.unwrap();

    let transport: Vec<String> = shared_midi
        .calls()
        .into_iter()
        .filter(|c| matches!(c.as_str(), "start" | "stop" | "continue"))
        .collect();
    assert_eq!(transport, vec!["start", "stop", "start"], "unexpected transport sequence");
}

/// S6: scheduled messages are fanned out only to registered destinations;
/// an unregistered one is dropped rather than panicking the step loop.
#[tokio::test]
async fn s6_routes_scheduled_messages_to_registered_destinations_only() {
    let mut session = CompiledSession::default();
    session.environment.bpm = FAST_BPM;

    let mut params = ParamMap::new();
    params.insert("n".to_string(), ParamValue::Int(3));

    let mut scheduler = MessageScheduler::new();
    scheduler.load_messages(ScheduledMessageBatch {
        messages: vec![
            ScheduledMessage {
                destination_id: "synth".to_string(),
                cycle: 0.0,
                step: 1,
                params: params.clone(),
            },
            ScheduledMessage {
                destination_id: "ghost".to_string(),
                cycle: 0.0,
                step: 1,
                params,
            },
        ],
        bpm: FAST_BPM,
        pattern_length: 4.0,
    });

    let recorded = Arc::new(StdMutex::new(Vec::new()));
    let mut router = DestinationRouter::new();
    router.register_destination("synth", Box::new(RecordingSender(recorded.clone())));

    let (engine, command_tx, _state_sink, _shared_midi) = build_engine(session, scheduler, router);

    let run_engine = engine.clone();
    let handle = tokio::spawn(async move { run_engine.run().await });

    command_tx.send(Command::Play(Default::default())).unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;
    engine.stop();
    handle.await.unwrap();

    let received = recorded.lock().unwrap();
    assert_eq!(received.len(), 1, "only the registered destination should have received a message");
    assert_eq!(received[0].get("n"), Some(&ParamValue::Int(3)));
}

/// Panic stops playback, clears pending note-offs (an immediate
/// `all_notes_off` rather than individual note-offs), and clears any
/// scheduled messages so nothing from the old session fires after resuming.
#[tokio::test]
async fn panic_clears_notes_and_scheduled_messages() {
    let mut session = CompiledSession::default();
    session.environment.bpm = FAST_BPM;
    session.tracks.insert("kick".to_string(), track("kick"));
    session.sequences.insert(
        "kick".to_string(),
        EventSequence::from_events(
            "kick",
            vec![Event {
                step: 1,
                velocity: 1.0,
                note: Some(60),
                gate: 100.0,
            }],
        ),
    );

    let (engine, command_tx, _state_sink, shared_midi) =
        build_engine(session, MessageScheduler::new(), DestinationRouter::new());

    let run_engine = engine.clone();
    let handle = tokio::spawn(async move { run_engine.run().await });

    command_tx.send(Command::Play(Default::default())).unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    command_tx.send(Command::Panic(Default::default())).unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    engine.stop();
    handle.await.unwrap();

    let calls = shared_midi.calls();
    assert!(
        calls.iter().any(|c| c.starts_with("all_notes_off")),
        "panic should send all_notes_off, got {calls:?}"
    );
    assert!(
        !calls.iter().any(|c| c == "note_off 0 60"),
        "panic clears notes via all_notes_off, not individual note-offs: {calls:?}"
    );
}

/// A `compile` sent while stopped (no `apply`, so it defaults to `now`
/// timing) lands immediately: the new track/sequence is audible on the
/// very next `play`, with no separate deferred step required.
#[tokio::test]
async fn compile_while_stopped_lands_immediately() {
    let session = CompiledSession::default();
    let (engine, command_tx, _state_sink, shared_midi) =
        build_engine(session, MessageScheduler::new(), DestinationRouter::new());

    let mut compiled = CompiledSession::default();
    compiled.environment.bpm = FAST_BPM;
    compiled.tracks.insert("kick".to_string(), track("kick"));
    compiled.sequences.insert(
        "kick".to_string(),
        EventSequence::from_events(
            "kick",
            vec![Event {
                step: 1,
                velocity: 1.0,
                note: Some(60),
                gate: 1.0,
            }],
        ),
    );

    let run_engine = engine.clone();
    let handle = tokio::spawn(async move { run_engine.run().await });

    command_tx
        .send(Command::Compile(loopforge::commands::CompileCommand { session: compiled }))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    command_tx.send(Command::Play(Default::default())).unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;
    engine.stop();
    handle.await.unwrap();

    let calls = shared_midi.calls();
    assert!(
        calls.iter().any(|c| c.starts_with("note_on") && c.contains(" 60 ")),
        "compile's new track/sequence should be audible without a further apply, got {calls:?}"
    );
}

/// `session` replaces the destination-routed [`MessageScheduler`]'s
/// contents wholesale, adopts the batch's tempo, and reports status —
/// distinct from `compile`, which lands on the track/sequence IR instead.
#[tokio::test]
async fn session_loads_batch_sets_bpm_and_routes_to_registered_destination() {
    let mut params = ParamMap::new();
    params.insert("n".to_string(), ParamValue::Int(7));

    let mut router = DestinationRouter::new();
    let recorded = Arc::new(StdMutex::new(Vec::new()));
    router.register_destination("synth", Box::new(RecordingSender(recorded.clone())));

    let (engine, command_tx, state_sink, _shared_midi) =
        build_engine(CompiledSession::default(), MessageScheduler::new(), router);

    let run_engine = engine.clone();
    let handle = tokio::spawn(async move { run_engine.run().await });

    command_tx
        .send(Command::Session(loopforge::commands::SessionCommand {
            batch: ScheduledMessageBatch {
                messages: vec![ScheduledMessage {
                    destination_id: "synth".to_string(),
                    cycle: 0.0,
                    step: 1,
                    params,
                }],
                bpm: FAST_BPM,
                pattern_length: 4.0,
            },
        }))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    command_tx.send(Command::Play(Default::default())).unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;
    engine.stop();
    handle.await.unwrap();

    let received = recorded.lock().unwrap();
    assert_eq!(received.len(), 1, "session's batch should be routed once play reaches its step");
    assert_eq!(received[0].get("n"), Some(&ParamValue::Int(7)));
    drop(received);

    assert!(
        state_sink.drain().iter().any(|event| matches!(
            event,
            TelemetryEvent::Status(status) if (status.bpm - FAST_BPM).abs() < f64::EPSILON
        )),
        "session should publish a status update reflecting the adopted bpm"
    );
}

/// `session` is rejected outright when no destination is registered yet,
/// since its whole purpose is routing messages to one; the runtime's tempo
/// is left untouched rather than adopting the rejected batch's bpm.
#[tokio::test]
async fn session_rejected_with_no_destinations_registered() {
    let (engine, command_tx, state_sink, _shared_midi) = build_engine(
        CompiledSession::default(),
        MessageScheduler::new(),
        DestinationRouter::new(),
    );

    let run_engine = engine.clone();
    let handle = tokio::spawn(async move { run_engine.run().await });

    command_tx
        .send(Command::Session(loopforge::commands::SessionCommand {
            batch: ScheduledMessageBatch {
                messages: Vec::new(),
                bpm: FAST_BPM,
                pattern_length: 4.0,
            },
        }))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    command_tx.send(Command::Play(Default::default())).unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    engine.stop();
    handle.await.unwrap();

    assert!(
        !state_sink
            .drain()
            .iter()
            .any(|event| matches!(event, TelemetryEvent::Status(status) if (status.bpm - FAST_BPM).abs() < f64::EPSILON)),
        "a rejected session command must not land its bpm on the runtime"
    );
}

/// `session` rejects a non-positive bpm or pattern_length before touching
/// either the scheduler or the runtime's tempo.
#[tokio::test]
async fn session_rejects_non_positive_bpm_and_pattern_length() {
    let mut router = DestinationRouter::new();
    router.register_destination("synth", Box::new(RecordingSender::default()));
    let (engine, command_tx, state_sink, _shared_midi) =
        build_engine(CompiledSession::default(), MessageScheduler::new(), router);

    let run_engine = engine.clone();
    let handle = tokio::spawn(async move { run_engine.run().await });

    command_tx
        .send(Command::Session(loopforge::commands::SessionCommand {
            batch: ScheduledMessageBatch {
                messages: Vec::new(),
                bpm: 0.0,
                pattern_length: 4.0,
            },
        }))
        .unwrap();
    command_tx
        .send(Command::Session(loopforge::commands::SessionCommand {
            batch: ScheduledMessageBatch {
                messages: Vec::new(),
                bpm: FAST_BPM,
                pattern_length: 0.0,
            },
        }))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    command_tx.send(Command::Play(Default::default())).unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    engine.stop();
    handle.await.unwrap();

    assert!(
        !state_sink
            .drain()
            .iter()
            .any(|event| matches!(event, TelemetryEvent::Status(status) if (status.bpm - FAST_BPM).abs() < f64::EPSILON)),
        "neither invalid session command should have landed its bpm on the runtime"
    );
}
