//! The Session IR: the 3-layer data model (environment, tracks, sequences)
//! that a compiled performance is expressed in.
//!
//! See `SPEC_FULL.md` §C for the rationale behind fields present here but
//! abbreviated in the core specification.

pub mod environment;
pub mod mixer_line;
pub mod modulation;
pub mod scene;
pub mod sequence;
pub mod session;
pub mod track;
pub mod track_midi;

pub use environment::{Chord, Environment};
pub use mixer_line::{MixerLine, MixerLineDynamics, MixerLineFx};
pub use modulation::{Modulation, ModulationType};
pub use scene::Scene;
pub use sequence::{Event, EventSequence};
pub use session::{ApplyCommand, ApplyTiming, CompiledSession};
pub use track::{FxParams, Send, Track, TrackFxParams, TrackMeta, TrackParams};
pub use track_midi::TrackMidi;
