//! The orchestrator: five cooperative loops sharing [`RuntimeState`],
//! [`MessageScheduler`], [`DestinationRouter`], and a [`NoteScheduler`].
//!
//! Each loop is caught and logged rather than allowed to end the process:
//! a panic or error inside one iteration is reported through tracing and
//! (where it represents a recoverable runtime condition) through the
//! telemetry sink, and the loop continues on its next tick.

use crate::clock_generator::{ClockGenerator, DriftStats};
use crate::commands::{Command, CommandResult};
use crate::constants::{
    STEPS_PER_BAR, STEPS_PER_BEAT, STEP_DRIFT_RESET_THRESHOLD_MS, STEP_DRIFT_WARNING_THRESHOLD_MS,
};
use crate::ipc::{CommandSource, ErrorTelemetry, PositionTelemetry, StateSink, StatusTelemetry, TelemetryEvent, TracksTelemetry};
use crate::note_scheduler::NoteScheduler;
use crate::router::DestinationRouter;
use crate::runtime_state::RuntimeState;
use crate::scheduler::MessageScheduler;
use crate::scheduler::ScheduledMessage;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// A pre-supplied, ordered transform applied to a step's outgoing messages
/// before routing. Stands in for the coroutine-based extension hooks of the
/// source this was ported from: the engine itself stays agnostic to how
/// hooks are authored, only that they are plain synchronous functions.
pub type MessageHook = Box<dyn Fn(Vec<ScheduledMessage>, f64, u8) -> Vec<ScheduledMessage> + Send + Sync>;

/// Encodes which of 16 consecutive steps starting at `window_start` carry an
/// event, as `'x'` followed by four hex nibbles — each nibble covering four
/// steps, with bit `3 - (step % 4)` set when that step has an event. Used to
/// keep the `tracks` telemetry event compact instead of sending every step
/// index explicitly.
pub fn encode_track_pattern(sequence: &crate::ir::EventSequence, window_start: u8) -> String {
    let mut nibbles = [0u8; 4];
    for offset in 0..16u16 {
        let step = window_start.wrapping_add(offset as u8);
        if sequence.has_events_at(step) {
            let nibble_index = (offset / 4) as usize;
            let local_step = (offset % 4) as u8;
            let bit_pos = 3 - local_step;
            nibbles[nibble_index] |= 1 << bit_pos;
        }
    }
    let mut encoded = String::with_capacity(5);
    encoded.push('x');
    for nibble in nibbles {
        encoded.push(std::char::from_digit(nibble as u32, 16).expect("nibble fits in one hex digit"));
    }
    encoded
}

/// A step-loop-local drift corrector, structurally identical to
/// [`ClockGenerator`] but over steps rather than pulses and with the
/// step loop's wider thresholds (50ms reset / 20ms warning, vs. the clock
/// loop's 30ms / 15ms — steps are six times coarser than pulses, so they
/// tolerate more slack before a reset is warranted). Tracks the same
/// cumulative [`DriftStats`] `ClockGenerator` does, at the step grain.
struct StepTimer {
    anchor: Instant,
    tick_count: u64,
    suppress_next_reset: bool,
    stats: DriftStats,
}

/// Outcome of advancing [`StepTimer`] by one step.
#[derive(Debug, Clone, Copy, PartialEq)]
struct StepTickOutcome {
    drift_ms: f64,
    /// Whether this tick reset the anchor (large drift, or a latched suppression).
    reset: bool,
    /// Whether a reset (if any) was silenced by a prior [`StepTimer::suppress_next`] latch.
    suppressed: bool,
    /// Steps skipped by a non-suppressed reset: `floor(|drift| / step_duration)`.
    /// Zero when `reset` is false or the reset was suppressed.
    skipped_steps: u64,
}

impl StepTimer {
    fn new(now: Instant) -> Self {
        Self {
            anchor: now,
            tick_count: 0,
            suppress_next_reset: false,
            stats: DriftStats::default(),
        }
    }

    /// Re-anchors immediately and latches a flag forcing the next regular
    /// tick to reset silently, rather than evaluate drift normally. Used
    /// when playback stops/pauses (old anchor is meaningless) and when BPM
    /// changes while playing (the step duration just changed, so the next
    /// apparent drift is an artifact, not a real timing anomaly).
    fn suppress_next(&mut self, now: Instant) {
        self.anchor = now;
        self.tick_count = 0;
        self.suppress_next_reset = true;
    }

    fn tick(&mut self, now: Instant, step_duration: Duration) -> StepTickOutcome {
        let expected = self.anchor + step_duration * self.tick_count as u32;
        let late = now.saturating_duration_since(expected).as_secs_f64() * 1000.0;
        let early = expected.saturating_duration_since(now).as_secs_f64() * 1000.0;
        let drift_ms = late - early;
        self.stats.max_drift_ms = self.stats.max_drift_ms.max(drift_ms.abs());

        let breaches_threshold = drift_ms.abs() > STEP_DRIFT_RESET_THRESHOLD_MS;
        let suppressed = self.suppress_next_reset;

        if suppressed || breaches_threshold {
            let skipped_steps = (drift_ms.abs() / 1000.0 / step_duration.as_secs_f64()).floor() as u64;
            self.anchor = now;
            self.tick_count = 1;
            self.suppress_next_reset = false;
            if !suppressed {
                self.stats.reset_count += 1;
                tracing::warn!(
                    drift_ms,
                    skipped_steps,
                    direction = if drift_ms >= 0.0 { "behind" } else { "ahead" },
                    "step drift reset"
                );
            }
            StepTickOutcome { drift_ms, reset: true, suppressed, skipped_steps }
        } else {
            self.tick_count += 1;
            if drift_ms.abs() > STEP_DRIFT_WARNING_THRESHOLD_MS {
                tracing::warn!(drift_ms, "step drift warning");
            }
            StepTickOutcome { drift_ms, reset: false, suppressed: false, skipped_steps: 0 }
        }
    }

    /// Cumulative drift statistics since this timer was created.
    fn get_drift_stats(&self) -> DriftStats {
        self.stats
    }
}

fn step_duration(bpm: f64) -> Duration {
    Duration::from_secs_f64(60.0 / bpm / STEPS_PER_BEAT as f64)
}

/// Ties together [`RuntimeState`], [`MessageScheduler`], [`DestinationRouter`],
/// a [`ClockGenerator`], and a [`NoteScheduler`] into the five concurrent
/// loops described by the engine's design: command intake, step playback,
/// MIDI clock, note-off scheduling, and a liveness heartbeat.
pub struct LoopEngine {
    runtime: Arc<Mutex<RuntimeState>>,
    scheduler: Arc<Mutex<MessageScheduler>>,
    router: Arc<Mutex<DestinationRouter>>,
    notes: Arc<Mutex<NoteScheduler>>,
    command_source: Arc<dyn CommandSource>,
    state_sink: Arc<dyn StateSink>,
    running: Arc<AtomicBool>,
    hooks: Arc<Vec<MessageHook>>,
    /// Latched by a BPM change made while playing; consumed by the step loop
    /// on its next iteration to re-anchor [`StepTimer`] and silence the
    /// resulting apparent drift.
    step_bpm_changed: Arc<AtomicBool>,
    /// Same latch as `step_bpm_changed`, consumed by the clock loop for
    /// [`ClockGenerator`].
    clock_bpm_changed: Arc<AtomicBool>,
}

impl LoopEngine {
    /// Builds an engine from its collaborators. `hooks` run, in order, on
    /// each step's outgoing message batch before routing.
    pub fn new(
        runtime: RuntimeState,
        scheduler: MessageScheduler,
        router: DestinationRouter,
        notes: NoteScheduler,
        command_source: Arc<dyn CommandSource>,
        state_sink: Arc<dyn StateSink>,
        hooks: Vec<MessageHook>,
    ) -> Self {
        Self {
            runtime: Arc::new(Mutex::new(runtime)),
            scheduler: Arc::new(Mutex::new(scheduler)),
            router: Arc::new(Mutex::new(router)),
            notes: Arc::new(Mutex::new(notes)),
            command_source,
            state_sink,
            running: Arc::new(AtomicBool::new(false)),
            hooks: Arc::new(hooks),
            step_bpm_changed: Arc::new(AtomicBool::new(false)),
            clock_bpm_changed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Latches the BPM-change suppress signal for both loops, if currently playing.
    async fn signal_bpm_changed_if_playing(&self) {
        if self.runtime.lock().await.playback().is_advancing() {
            self.step_bpm_changed.store(true, Ordering::SeqCst);
            self.clock_bpm_changed.store(true, Ordering::SeqCst);
        }
    }

    /// Publishes a transport/tempo summary, for command handlers whose
    /// effect is documented as "status update" (`spec.md` §4.7) rather than
    /// the periodic per-bar emission [`LoopEngine::run_step_iteration`] does
    /// on its own.
    async fn publish_status(&self) {
        let mut runtime = self.runtime.lock().await;
        let transport = match runtime.playback() {
            crate::runtime_state::PlaybackState::Stopped => "stopped",
            crate::runtime_state::PlaybackState::Playing => "playing",
            crate::runtime_state::PlaybackState::Paused => "paused",
        };
        let status = StatusTelemetry {
            transport: transport.to_string(),
            bpm: runtime.effective_bpm(),
            active_tracks: runtime.get_active_tracks(),
        };
        drop(runtime);
        self.state_sink.send(TelemetryEvent::Status(status)).await;
    }

    /// Publishes the current per-track pattern-presence snapshot, for
    /// command handlers whose effect is documented as "tracks update"
    /// (`spec.md` §4.7), independent of the step loop's own per-step emission.
    async fn publish_tracks(&self) {
        let mut runtime = self.runtime.lock().await;
        let active_tracks = runtime.get_active_tracks();
        let position = runtime.position();
        let sequences = runtime.get_effective().sequences.clone();
        drop(runtime);

        let tracks_pattern: BTreeMap<String, String> = sequences
            .iter()
            .filter(|(id, _)| active_tracks.contains(id))
            .map(|(id, seq)| (id.clone(), encode_track_pattern(seq, position.step)))
            .collect();
        self.state_sink
            .send(TelemetryEvent::Tracks(TracksTelemetry { tracks: tracks_pattern }))
            .await;
    }

    /// Signals every loop to wind down on its next iteration.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Runs every loop concurrently until [`LoopEngine::stop`] is called (or
    /// the process is asked to shut down). Each loop is independent: a
    /// failure in one does not stop the others.
    pub async fn run(&self) {
        self.running.store(true, Ordering::SeqCst);
        self.state_sink.send(TelemetryEvent::Connected).await;

        tokio::join!(
            self.run_command_loop(),
            self.run_step_loop(),
            self.run_clock_loop(),
            self.run_note_off_loop(),
            self.run_heartbeat_loop(),
        );
    }

    async fn run_command_loop(&self) {
        use crate::constants::{COMMAND_BACKOFF_CEILING_MS, COMMAND_BACKOFF_FLOOR_MS};
        self.command_source.connect().await;
        let mut backoff_ms = COMMAND_BACKOFF_FLOOR_MS;
        while self.running.load(Ordering::SeqCst) {
            match self.command_source.receive().await {
                Some(command) => {
                    backoff_ms = COMMAND_BACKOFF_FLOOR_MS;
                    let result = self.handle_command(command).await;
                    if !result.success {
                        tracing::warn!(message = ?result.message, "command failed");
                    }
                }
                None => {
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms = (backoff_ms * 2).min(COMMAND_BACKOFF_CEILING_MS);
                }
            }
        }
    }

    async fn handle_command(&self, command: Command) -> CommandResult {
        match command {
            Command::Session(cmd) => {
                if cmd.batch.bpm <= 0.0 {
                    return CommandResult::error("bpm must be positive", None);
                }
                if cmd.batch.pattern_length <= 0.0 {
                    return CommandResult::error("pattern_length must be positive", None);
                }
                if self.router.lock().await.get_registered_destinations().is_empty() {
                    return CommandResult::error("no destinations configured; session command is disabled", None);
                }

                let bpm = cmd.batch.bpm;
                self.scheduler.lock().await.load_messages(cmd.batch);
                self.runtime.lock().await.set_bpm(bpm);
                self.publish_status().await;
                CommandResult::ok(Some("session loaded"), None)
            }
            Command::Compile(cmd) => {
                let session = cmd.session;
                let apply = session.apply.clone();
                let mut runtime = self.runtime.lock().await;
                let land_immediately = !runtime.playback().is_advancing()
                    || matches!(apply.as_ref().map(|a| a.timing), None | Some(crate::ir::ApplyTiming::Now));

                let pending = crate::runtime_state::PendingApply {
                    timing: apply.as_ref().map(|a| a.timing).unwrap_or_default(),
                    environment: Some(session.environment),
                    tracks: session.tracks,
                    tracks_midi: session.tracks_midi,
                    mixer_lines: session.mixer_lines,
                    sequences: session.sequences,
                    scenes: session.scenes,
                    track_ids: apply.as_ref().map(|a| a.track_ids.clone()).unwrap_or_default(),
                    scene_name: apply.and_then(|a| a.scene_name),
                    passed_non_zero: false,
                };
                runtime.queue_pending(pending);
                if land_immediately {
                    if let Err(message) = runtime.execute_pending() {
                        return CommandResult::error(message, None);
                    }
                }
                CommandResult::ok(Some("compile accepted"), None)
            }
            Command::Play(_) => {
                let mut runtime = self.runtime.lock().await;
                let was = runtime.playback();
                runtime.play();
                drop(runtime);
                let mut notes = self.notes.lock().await;
                match was {
                    crate::runtime_state::PlaybackState::Stopped => notes.output_mut().send_start(),
                    crate::runtime_state::PlaybackState::Paused => notes.output_mut().send_continue(),
                    crate::runtime_state::PlaybackState::Playing => {}
                }
                CommandResult::ok(Some("playing"), None)
            }
            Command::Stop(_) => {
                let mut runtime = self.runtime.lock().await;
                let was = runtime.playback();
                runtime.stop();
                drop(runtime);
                let mut notes = self.notes.lock().await;
                notes.clear_all();
                if was == crate::runtime_state::PlaybackState::Playing {
                    notes.output_mut().send_stop();
                }
                CommandResult::ok(Some("stopped"), None)
            }
            Command::Pause(_) => {
                let mut runtime = self.runtime.lock().await;
                let was = runtime.playback();
                runtime.pause();
                drop(runtime);
                if was == crate::runtime_state::PlaybackState::Playing {
                    self.notes.lock().await.output_mut().send_stop();
                }
                CommandResult::ok(Some("paused"), None)
            }
            Command::Mute(cmd) => {
                let mut runtime = self.runtime.lock().await;
                if !runtime.track_exists(&cmd.track_id) {
                    return CommandResult::error(format!("no such track: {}", cmd.track_id), None);
                }
                runtime.set_mute(&cmd.track_id, cmd.mute);
                CommandResult::ok(Some("mute updated"), None)
            }
            Command::Solo(cmd) => {
                let mut runtime = self.runtime.lock().await;
                if !runtime.track_exists(&cmd.track_id) {
                    return CommandResult::error(format!("no such track: {}", cmd.track_id), None);
                }
                runtime.set_solo(&cmd.track_id, cmd.solo);
                CommandResult::ok(Some("solo updated"), None)
            }
            Command::Bpm(cmd) => {
                if cmd.bpm <= 0.0 {
                    return CommandResult::error("bpm must be positive", None);
                }
                self.runtime.lock().await.set_bpm(cmd.bpm);
                self.signal_bpm_changed_if_playing().await;
                CommandResult::ok(Some("bpm updated"), None)
            }
            Command::MidiPort(cmd) => {
                if self.notes.lock().await.output_mut().set_port(&cmd.port_name) {
                    CommandResult::ok(Some("midi port connected"), None)
                } else {
                    CommandResult::error(format!("could not open midi port {}", cmd.port_name), None)
                }
            }
            Command::MidiPanic(_) => {
                self.notes.lock().await.output_mut().all_notes_off(None);
                CommandResult::ok(Some("midi panic sent"), None)
            }
            Command::Panic(_) => {
                let mut runtime = self.runtime.lock().await;
                let was = runtime.playback();
                runtime.stop();
                drop(runtime);
                let mut notes = self.notes.lock().await;
                notes.clear_all();
                if was == crate::runtime_state::PlaybackState::Playing {
                    notes.output_mut().send_stop();
                }
                drop(notes);
                self.scheduler.lock().await.clear();
                CommandResult::ok(Some("panic: stopped and cleared"), None)
            }
            Command::Scene(cmd) => {
                let applied = self.runtime.lock().await.apply_scene(&cmd.name);
                match applied {
                    Ok(()) => {
                        self.publish_status().await;
                        self.publish_tracks().await;
                        CommandResult::ok(Some("scene activated"), None)
                    }
                    Err(message) => CommandResult::error(message, None),
                }
            }
            Command::Scenes(_) => {
                let names: Vec<String> = self
                    .runtime
                    .lock()
                    .await
                    .scene_names()
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                self.publish_status().await;
                CommandResult::ok(None::<String>, Some(serde_json::json!({ "scenes": names })))
            }
        }
    }

    async fn run_step_loop(&self) {
        let mut timer = StepTimer::new(Instant::now());
        loop {
            if !self.running.load(Ordering::SeqCst) {
                return;
            }

            let is_playing = self.runtime.lock().await.playback().is_advancing();
            if !is_playing {
                tokio::time::sleep(Duration::from_millis(5)).await;
                timer.suppress_next(Instant::now());
                continue;
            }

            let bpm = self.runtime.lock().await.effective_bpm();
            let duration = step_duration(bpm);
            if self.step_bpm_changed.swap(false, Ordering::SeqCst) {
                timer.suppress_next(Instant::now());
            }
            let now = Instant::now();
            let outcome = timer.tick(now, duration);
            if outcome.reset && !outcome.suppressed {
                let stats = timer.get_drift_stats();
                tracing::debug!(
                    reset_count = stats.reset_count,
                    max_drift_ms = stats.max_drift_ms,
                    "cumulative step drift stats"
                );
            }

            if let Err(error) = self.run_step_iteration(bpm, outcome).await {
                tracing::error!(%error, "step iteration failed");
                self.state_sink
                    .send(TelemetryEvent::Error(ErrorTelemetry {
                        code: "STEP_ERROR".to_string(),
                        message: error.to_string(),
                    }))
                    .await;
            }

            let next_tick = now + duration;
            tokio::time::sleep_until(tokio::time::Instant::from_std(next_tick.max(Instant::now()))).await;
        }
    }

    async fn run_step_iteration(&self, bpm: f64, step_tick: StepTickOutcome) -> anyhow::Result<()> {
        if step_tick.reset && !step_tick.suppressed {
            self.state_sink
                .send(TelemetryEvent::Error(ErrorTelemetry {
                    code: "CLOCK_DRIFT_RESET".to_string(),
                    message: format!(
                        "step loop drift reset at {:.1}ms, skipped {} step(s)",
                        step_tick.drift_ms, step_tick.skipped_steps
                    ),
                }))
                .await;
        }

        // Everything below plays the step the playhead is *currently* on
        // (spec.md §4.2 step 7: query at `position.step`, route, then only
        // afterward advance). `runtime.advance_step()` is the very last
        // thing this iteration does to `RuntimeState`, moving the playhead
        // to the step the *next* iteration will play.
        let mut runtime = self.runtime.lock().await;
        let mut bpm_changed_by_apply = false;
        let apply_error = if runtime.should_apply_pending() {
            let bpm_before = runtime.effective_bpm();
            match runtime.execute_pending() {
                Ok(()) => {
                    bpm_changed_by_apply = (runtime.effective_bpm() - bpm_before).abs() > f64::EPSILON;
                    None
                }
                Err(message) => Some(message),
            }
        } else {
            None
        };

        let position = runtime.position();
        let active_tracks = runtime.get_active_tracks();
        let gate_default = runtime.get_effective().environment.default_gate;
        let sequences = runtime.get_effective().sequences.clone();
        runtime.advance_step();
        drop(runtime);

        if let Some(message) = apply_error {
            anyhow::bail!(message);
        }

        if bpm_changed_by_apply {
            // The step duration just changed; the next apparent drift on
            // both loops is an artifact of the new anchor math, not real
            // scheduler jitter, so silence the coming reset.
            self.step_bpm_changed.store(true, Ordering::SeqCst);
            self.clock_bpm_changed.store(true, Ordering::SeqCst);
        }

        let messages: Vec<ScheduledMessage> = {
            let scheduler = self.scheduler.lock().await;
            scheduler.get_messages_at_step(position.step).to_vec()
        };
        let messages = self.hooks.iter().fold(messages, |msgs, hook| hook(msgs, bpm, position.step));
        self.router.lock().await.send_messages(&messages);

        let step_dur = step_duration(bpm);
        let mut notes = self.notes.lock().await;
        for track_id in &active_tracks {
            if let Some(sequence) = sequences.get(track_id) {
                for event in sequence.get_events_at(position.step) {
                    if let Some(note) = event.note {
                        let velocity = (event.velocity.clamp(0.0, 1.0) * 127.0).round() as u8;
                        let gate = if event.gate > 0.0 { event.gate } else { gate_default };
                        notes.schedule_note_on(0, note, velocity, step_dur, gate);
                    }
                }
            }
        }
        drop(notes);

        // spec.md §4.2 step 9: Position only on quarter-note boundaries,
        // Tracks (and the per-bar status summary) only on bar boundaries.
        if position.step % STEPS_PER_BEAT as u8 == 0 {
            self.state_sink
                .send(TelemetryEvent::Position(PositionTelemetry {
                    step: position.step,
                    beat: position.beat,
                    bar: position.bar,
                    bpm: Some(bpm),
                    transport: None,
                }))
                .await;
        }

        if position.step % STEPS_PER_BAR as u8 == 0 {
            let tracks_pattern: BTreeMap<String, String> = sequences
                .iter()
                .filter(|(id, _)| active_tracks.contains(id))
                .map(|(id, seq)| (id.clone(), encode_track_pattern(seq, position.step)))
                .collect();
            self.state_sink
                .send(TelemetryEvent::Tracks(TracksTelemetry { tracks: tracks_pattern }))
                .await;
            self.state_sink
                .send(TelemetryEvent::Status(StatusTelemetry {
                    transport: "playing".to_string(),
                    bpm,
                    active_tracks,
                }))
                .await;
        }

        Ok(())
    }

    async fn run_clock_loop(&self) {
        let mut generator = ClockGenerator::new(Instant::now());
        loop {
            if !self.running.load(Ordering::SeqCst) {
                return;
            }

            let is_playing = self.runtime.lock().await.playback().is_advancing();
            if !is_playing {
                tokio::time::sleep(Duration::from_millis(5)).await;
                generator.suppress_next_drift_reset(Instant::now());
                continue;
            }

            let bpm = self.runtime.lock().await.effective_bpm();
            let pulse_duration = ClockGenerator::pulse_duration(bpm);
            if self.clock_bpm_changed.swap(false, Ordering::SeqCst) {
                generator.suppress_next_drift_reset(Instant::now());
            }
            let now = Instant::now();
            let outcome = generator.tick(now, bpm);
            if outcome.reset && !outcome.suppressed {
                self.state_sink
                    .send(TelemetryEvent::Error(ErrorTelemetry {
                        code: "CLOCK_DRIFT_RESET".to_string(),
                        message: format!("clock loop drift reset at {:.1}ms", outcome.drift_ms),
                    }))
                    .await;
            }

            self.notes.lock().await.output_mut().send_clock();

            let next_tick = now + pulse_duration;
            tokio::time::sleep_until(tokio::time::Instant::from_std(next_tick.max(Instant::now()))).await;
        }
    }

    async fn run_note_off_loop(&self) {
        use crate::constants::{NOTE_OFF_SLEEP_CEILING_MS, NOTE_OFF_SLEEP_FLOOR_MS};
        while self.running.load(Ordering::SeqCst) {
            let mut notes = self.notes.lock().await;
            notes.process_due(Instant::now());
            let sleep_ms = match notes.next_off_time() {
                Some(next) => {
                    let remaining = next.saturating_duration_since(Instant::now()).as_millis() as u64;
                    remaining.clamp(NOTE_OFF_SLEEP_FLOOR_MS, NOTE_OFF_SLEEP_CEILING_MS)
                }
                None => NOTE_OFF_SLEEP_CEILING_MS,
            };
            drop(notes);
            tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
        }
    }

    /// Every period, diffs the router's connection snapshot against the
    /// previous one and emits a `CONNECTION_LOST_*` error for any
    /// destination that was connected last time and is not now, before
    /// publishing the heartbeat itself.
    async fn run_heartbeat_loop(&self) {
        use crate::constants::HEARTBEAT_PERIOD_SECS;
        use crate::senders::SenderKind;
        let mut previously_connected: BTreeMap<String, bool> = BTreeMap::new();
        while self.running.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(HEARTBEAT_PERIOD_SECS)).await;

            let snapshot = self.router.lock().await.connection_snapshot();
            for (destination_id, (kind, connected)) in &snapshot {
                let was_connected = previously_connected.get(destination_id).copied().unwrap_or(true);
                if was_connected && !connected {
                    let code = match kind {
                        SenderKind::Midi => "CONNECTION_LOST_MIDI",
                        SenderKind::Osc => "CONNECTION_LOST_OSC",
                    };
                    tracing::error!(destination_id, code, "destination connection lost");
                    self.state_sink
                        .send(TelemetryEvent::Error(ErrorTelemetry {
                            code: code.to_string(),
                            message: format!("destination {destination_id} disconnected"),
                        }))
                        .await;
                }
            }
            previously_connected = snapshot.into_iter().map(|(id, (_, connected))| (id, connected)).collect();

            self.state_sink
                .send(TelemetryEvent::Heartbeat(serde_json::json!({ "alive": true })))
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Event, EventSequence};

    #[test]
    fn nibble_beats_encodes_sixteen_step_window() {
        let sequence = EventSequence::from_events("kick", vec![Event::new(0), Event::new(3), Event::new(7)]);
        let encoded = encode_track_pattern(&sequence, 0);
        assert!(encoded.starts_with('x'));
        assert_eq!(encoded.len(), 5);
        // step 0 and step 3 both fall in nibble 0 (steps 0..4): bits 3 and 0.
        assert_eq!(&encoded[1..2], "9");
        // step 7 falls in nibble 1 (steps 4..8), local step 3, bit 0.
        assert_eq!(&encoded[2..3], "1");
    }

    #[test]
    fn nibble_beats_empty_window_is_all_zero() {
        let sequence = EventSequence::from_events("kick", vec![]);
        assert_eq!(encode_track_pattern(&sequence, 0), "x0000");
    }

    #[test]
    fn step_timer_on_time_tick_does_not_reset() {
        let start = Instant::now();
        let mut timer = StepTimer::new(start);
        let duration = step_duration(120.0);
        let outcome = timer.tick(start + duration, duration);
        assert!(!outcome.reset);
        assert!(!outcome.suppressed);
    }

    #[test]
    fn step_timer_large_drift_resets_and_is_not_suppressed() {
        let start = Instant::now();
        let mut timer = StepTimer::new(start);
        let outcome = timer.tick(start + Duration::from_millis(500), step_duration(120.0));
        assert!(outcome.reset);
        assert!(!outcome.suppressed);
    }

    #[test]
    fn step_timer_suppressed_reset_is_flagged_so_telemetry_can_be_silenced() {
        let start = Instant::now();
        let mut timer = StepTimer::new(start);
        timer.suppress_next(start);
        let duration = step_duration(120.0);
        let outcome = timer.tick(start + duration, duration);
        assert!(outcome.reset);
        assert!(outcome.suppressed);
    }
}
