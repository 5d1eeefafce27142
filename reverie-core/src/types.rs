//! Core type definitions shared by every part of the engine.
//!
//! All types are serializable so that agent and world state can be
//! snapshotted between sessions.

use chrono::{Duration, NaiveDateTime, Timelike};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Spatial
// ---------------------------------------------------------------------------

/// A tile coordinate `(x, y)` on the world grid.
///
/// Serialized as a two-element array, matching the movement exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coord(pub usize, pub usize);

impl Coord {
    /// Column index.
    #[must_use]
    pub fn x(self) -> usize {
        self.0
    }

    /// Row index.
    #[must_use]
    pub fn y(self) -> usize {
        self.1
    }

    /// Euclidean distance to another tile.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        let dx = self.0.abs_diff(other.0) as f64;
        let dy = self.1.abs_diff(other.1) as f64;
        (dx * dx + dy * dy).sqrt()
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.0, self.1)
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Substrings that mark an event description as a hazard.
pub const ACCIDENT_MARKERS: [&str; 3] = ["fire", "burn", "flame"];

/// The state of a subject placed on a tile.
///
/// A `None` predicate/object/description is the subject's idle form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Event {
    /// Colon-joined address or agent name.
    pub subject: String,
    /// Verb phrase, `None` when idle.
    pub predicate: Option<String>,
    /// Object of the verb, `None` when idle.
    pub object: Option<String>,
    /// Free-text description, `None` when idle.
    pub description: Option<String>,
}

impl Event {
    /// A fully specified event.
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: Some(predicate.into()),
            object: Some(object.into()),
            description: Some(description.into()),
        }
    }

    /// The idle form `(subject, none, none, none)`.
    #[must_use]
    pub fn idle(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            predicate: None,
            object: None,
            description: None,
        }
    }

    /// Whether this is the idle form of its subject.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.predicate.is_none() && self.object.is_none() && self.description.is_none()
    }

    /// Whether the description mentions fire. Such events are never idled.
    #[must_use]
    pub fn describes_fire(&self) -> bool {
        self.description.as_deref().is_some_and(|d| d.contains("fire"))
    }

    /// Whether the description marks a hazard that overrides planning.
    #[must_use]
    pub fn is_accident(&self) -> bool {
        self.description
            .as_deref()
            .is_some_and(|d| ACCIDENT_MARKERS.iter().any(|m| d.contains(m)))
    }

    /// The `(subject, predicate, object)` triple.
    #[must_use]
    pub fn spo(&self) -> Triple {
        Triple {
            subject: self.subject.clone(),
            predicate: self.predicate.clone().unwrap_or_default(),
            object: self.object.clone().unwrap_or_default(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn opt(v: Option<&str>) -> &str {
            v.unwrap_or("None")
        }
        write!(
            f,
            "({}, {}, {}, {})",
            self.subject,
            opt(self.predicate.as_deref()),
            opt(self.object.as_deref()),
            opt(self.description.as_deref())
        )
    }
}

/// A subject/predicate/object triple as stored in memory nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Triple {
    /// Who or what.
    pub subject: String,
    /// Does what.
    pub predicate: String,
    /// To what.
    pub object: String,
}

impl Triple {
    /// Build a triple from anything string-like.
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Memory Embedding Vector
// ---------------------------------------------------------------------------

/// A dense vector embedding for semantic similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    /// Cosine similarity between two embeddings.
    /// Returns 0.0 on a length mismatch or a zero-length vector.
    #[must_use]
    pub fn cosine_similarity(&self, other: &Self) -> f32 {
        if self.0.len() != other.0.len() || self.0.is_empty() {
            return 0.0;
        }
        let (mut dot, mut norm_a, mut norm_b) = (0.0_f32, 0.0_f32, 0.0_f32);
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }
        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom < f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }

    /// Dimensionality of the embedding.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.0.len()
    }
}

// ---------------------------------------------------------------------------
// Retrieval Score
// ---------------------------------------------------------------------------

/// Composite score used to rank memory nodes during retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct RetrievalScore(pub OrderedFloat<f64>);

impl RetrievalScore {
    /// Create a retrieval score from a raw value.
    #[must_use]
    pub fn new(score: f64) -> Self {
        Self(OrderedFloat(score))
    }

    /// Get the raw score value.
    #[must_use]
    pub fn value(self) -> f64 {
        self.0.into_inner()
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Simulation wall clock. Local, timezone-free.
pub type SimTime = NaiveDateTime;

/// Datetime layout used by agent scratch snapshots and movement records.
pub const SCRATCH_TIME_FORMAT: &str = "%B %d, %Y, %H:%M:%S";

/// Datetime layout used by memory node snapshots.
pub const NODE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Minutes elapsed since midnight of `t`'s day.
#[must_use]
pub fn minutes_since_midnight(t: SimTime) -> u32 {
    t.hour() * 60 + t.minute()
}

/// Round up to the next whole minute; whole minutes are unchanged.
#[must_use]
pub fn ceil_to_minute(t: SimTime) -> SimTime {
    if t.second() == 0 {
        t
    } else {
        t + Duration::seconds(i64::from(60 - t.second()))
    }
}

/// Format a time the way scratch snapshots and movement records do.
#[must_use]
pub fn format_scratch_time(t: SimTime) -> String {
    t.format(SCRATCH_TIME_FORMAT).to_string()
}

/// Serde adapters for the two datetime layouts.
pub mod serde_time {
    use super::{NODE_TIME_FORMAT, SCRATCH_TIME_FORMAT, SimTime};
    use serde::{Deserialize, Deserializer, Serializer};

    fn parse<'de, D: Deserializer<'de>>(d: D, layout: &str) -> Result<SimTime, D::Error> {
        let s = String::deserialize(d)?;
        SimTime::parse_from_str(&s, layout).map_err(serde::de::Error::custom)
    }

    fn parse_opt<'de, D: Deserializer<'de>>(
        d: D,
        layout: &str,
    ) -> Result<Option<SimTime>, D::Error> {
        let s: Option<String> = Option::deserialize(d)?;
        s.map(|s| SimTime::parse_from_str(&s, layout).map_err(serde::de::Error::custom))
            .transpose()
    }

    /// `"%Y-%m-%d %H:%M:%S"`.
    pub mod node {
        use super::*;

        /// Serialize.
        pub fn serialize<S: Serializer>(t: &SimTime, s: S) -> Result<S::Ok, S::Error> {
            s.serialize_str(&t.format(NODE_TIME_FORMAT).to_string())
        }

        /// Deserialize.
        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<SimTime, D::Error> {
            parse(d, NODE_TIME_FORMAT)
        }
    }

    /// Optional `"%Y-%m-%d %H:%M:%S"`.
    pub mod node_opt {
        use super::*;

        /// Serialize.
        pub fn serialize<S: Serializer>(t: &Option<SimTime>, s: S) -> Result<S::Ok, S::Error> {
            match t {
                Some(t) => s.serialize_some(&t.format(NODE_TIME_FORMAT).to_string()),
                None => s.serialize_none(),
            }
        }

        /// Deserialize.
        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<SimTime>, D::Error> {
            parse_opt(d, NODE_TIME_FORMAT)
        }
    }

    /// `"%B %d, %Y, %H:%M:%S"`.
    pub mod scratch {
        use super::*;

        /// Serialize.
        pub fn serialize<S: Serializer>(t: &SimTime, s: S) -> Result<S::Ok, S::Error> {
            s.serialize_str(&t.format(SCRATCH_TIME_FORMAT).to_string())
        }

        /// Deserialize.
        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<SimTime, D::Error> {
            parse(d, SCRATCH_TIME_FORMAT)
        }
    }

    /// Optional `"%B %d, %Y, %H:%M:%S"`.
    pub mod scratch_opt {
        use super::*;

        /// Serialize.
        pub fn serialize<S: Serializer>(t: &Option<SimTime>, s: S) -> Result<S::Ok, S::Error> {
            match t {
                Some(t) => s.serialize_some(&t.format(SCRATCH_TIME_FORMAT).to_string()),
                None => s.serialize_none(),
            }
        }

        /// Deserialize.
        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<SimTime>, D::Error> {
            parse_opt(d, SCRATCH_TIME_FORMAT)
        }
    }
}
