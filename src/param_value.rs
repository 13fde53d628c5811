//! Heterogeneous parameter values.
//!
//! `ScheduledMessage::params` and most of the tone-shaping track fields are
//! producer-validated, untyped bags (see spec design note on "Dynamic typing
//! in `params`"). [`ParamValue`] is the tagged-union replacement for that
//! dynamic typing; the engine never branches on its variants beyond the
//! dispatch keys (`note`, `cc`, `pitch_bend`) that [`crate::senders`] reads.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single dynamically-typed parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// UTF-8 string value (e.g. a sound name).
    Str(String),
    /// Signed integer value (e.g. a MIDI note number, step index).
    Int(i64),
    /// Floating point value (e.g. gain, pan).
    Float(f64),
    /// Boolean flag.
    Bool(bool),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Str(s) => write!(f, "{s}"),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(x) => write!(f, "{x}"),
            ParamValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl ParamValue {
    /// Returns the value as `f64` if it is numeric, else `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(i) => Some(*i as f64),
            ParamValue::Float(x) => Some(*x),
            _ => None,
        }
    }

    /// Returns the value as `i64` if it is an integer (truncating floats), else `None`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            ParamValue::Float(x) => Some(*x as i64),
            _ => None,
        }
    }

    /// Returns the value as `&str` if it is a string, else `None`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// An ordered, string-keyed bag of [`ParamValue`]s.
///
/// `BTreeMap` is used (rather than `HashMap`) so OSC argument flattening
/// (`[key, value, key, value, ...]`) has a deterministic order across runs,
/// which matters for reproducible tests of [`crate::senders::OscSender`].
pub type ParamMap = BTreeMap<String, ParamValue>;
