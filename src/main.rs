//! Demonstration wiring for the loop engine: parses a handful of CLI flags,
//! loads a destinations file, builds real MIDI/OSC senders, and runs a
//! [`LoopEngine`] until Ctrl-C. This binary is not an HTTP API, dashboard,
//! or general-purpose CLI — those remain out of scope per `spec.md` §1; it
//! exists only to give the library something to run.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use loopforge::commands::Command;
use loopforge::destination::{load_destinations_from_file, DestinationConfig};
use loopforge::ipc::{ChannelCommandSource, ChannelStateSink};
use loopforge::loop_engine::LoopEngine;
use loopforge::note_scheduler::NoteScheduler;
use loopforge::output::{MidirMidiOutput, UdpOscOutput};
use loopforge::router::DestinationRouter;
use loopforge::runtime_state::RuntimeState;
use loopforge::scheduler::MessageScheduler;
use loopforge::senders::{MidiSender, OscSender};

/// Real-time loop engine for a live-coding music performance system.
#[derive(Debug, Parser)]
#[command(name = "loopforge", version, about)]
struct Cli {
    /// Path to a destinations file (`.yaml`/`.yml`/`.json`); see spec.md §6.
    #[arg(long, value_name = "FILE")]
    destinations: Option<PathBuf>,

    /// MIDI output port to connect on startup, used for scheduled note-offs.
    #[arg(long, value_name = "NAME")]
    midi_port: Option<String>,

    /// Log verbosity (`error`, `warn`, `info`, `debug`, `trace`), honored
    /// through `RUST_LOG` if that's set.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Disables ANSI colors in console log output.
    #[arg(long)]
    disable_colors: bool,
}

/// Cache/log directory, following OS convention (same spot harmonia.rs used
/// for both cache and logs, to keep a single directory entry for bug reports).
fn log_path() -> PathBuf {
    let path = dirs::cache_dir()
        .expect("documentation states that this function should work on all platforms")
        .join("loopforge");
    std::fs::create_dir_all(&path).ok();
    path
}

/// Installs a console layer plus a daily-rolling file layer, exactly as
/// `harmonia.rs::setup_logging_system` does. The returned guard must be kept
/// alive for the process lifetime or the non-blocking file writer stops
/// flushing.
fn setup_logging_system(cli: &Cli) -> tracing_appender::non_blocking::WorkerGuard {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let (log_file_appender, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(log_path(), "logs"));

    let disable_colors = cli.disable_colors || std::env::var("NO_COLOR").map(|v| !v.is_empty()).unwrap_or(false);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(!disable_colors)
                .and_then(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(log_file_appender)),
        )
        .init();

    guard
}

/// Opens real senders for every configured destination and registers them
/// with `router`. Failures (bad port name, OSC socket bind failure) are
/// logged and the destination is simply left unregistered, per spec.md
/// §7's "fatal startup errors" policy: the engine still starts.
fn wire_destinations(
    destinations: &std::collections::BTreeMap<String, DestinationConfig>,
    router: &mut DestinationRouter,
) {
    for (id, config) in destinations {
        match config {
            DestinationConfig::Osc(osc) => match UdpOscOutput::new(&osc.host, osc.port) {
                Ok(output) => {
                    router.register_destination(id.clone(), Box::new(OscSender::new(osc.address.clone(), Box::new(output))));
                }
                Err(error) => {
                    tracing::error!(destination = %id, %error, "failed to open OSC destination");
                }
            },
            DestinationConfig::Midi(midi) => {
                let mut output = MidirMidiOutput::new("loopforge");
                if output.set_port(&midi.port_name) {
                    router.register_destination(id.clone(), Box::new(MidiSender::new(midi.default_channel, Box::new(output))));
                } else {
                    tracing::error!(destination = %id, port = %midi.port_name, "failed to open MIDI destination");
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = setup_logging_system(&cli);
    tracing::info!("starting up loopforge {}", env!("CARGO_PKG_VERSION"));

    let destinations = match &cli.destinations {
        Some(path) => {
            let loaded = load_destinations_from_file(path)
                .map_err(|error| anyhow::anyhow!("loading destinations file {}: {error}", path.display()))?;
            tracing::info!(count = loaded.len(), path = %path.display(), "loaded destinations");
            loaded
        }
        None => {
            tracing::warn!("no --destinations file given; the session command will have nowhere to route messages");
            Default::default()
        }
    };

    let mut router = DestinationRouter::new();
    wire_destinations(&destinations, &mut router);

    let mut note_output = MidirMidiOutput::new("loopforge-notes");
    if let Some(port_name) = &cli.midi_port {
        if !note_output.set_port(port_name) {
            tracing::error!(port = %port_name, "failed to open note-off MIDI port; note-offs will be dropped");
        }
    }
    let notes = NoteScheduler::new(Box::new(note_output));

    let (command_tx, command_source) = ChannelCommandSource::channel();
    let state_sink = Arc::new(ChannelStateSink::default());

    let engine = Arc::new(LoopEngine::new(
        RuntimeState::new(),
        MessageScheduler::new(),
        router,
        notes,
        Arc::new(command_source),
        state_sink,
        Vec::new(),
    ));

    // Demonstration-only: accept Play on startup so a submitted session is
    // audible without a separate command transport wired up. A real
    // deployment drives `command_tx` from its own transport.
    let _ = command_tx.send(Command::Play(Default::default()));

    let run_engine = engine.clone();
    let run_handle = tokio::spawn(async move { run_engine.run().await });

    tokio::signal::ctrl_c().await?;
    tracing::info!("ctrl-c received, stopping");
    engine.stop();
    run_handle.await?;

    Ok(())
}
