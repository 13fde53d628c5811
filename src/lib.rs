//! Real-time loop engine for a live-coding music performance system.
//!
//! This crate is the timing, scheduling, and concurrency core: a
//! drift-corrected step sequencer, a 24-PPQ MIDI clock, deferred
//! apply-on-bar/beat/seq semantics, and a destination router fanning
//! messages out to OSC and MIDI senders. It does not parse a performance
//! DSL, synthesize audio, or serve an HTTP API; see `SPEC_FULL.md` for the
//! exact boundary.

pub mod clock_generator;
pub mod commands;
pub mod constants;
pub mod destination;
pub mod ipc;
pub mod ir;
pub mod loop_engine;
pub mod note_scheduler;
pub mod output;
pub mod param_value;
pub mod router;
pub mod runtime_state;
pub mod scheduler;
pub mod senders;
