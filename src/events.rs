//! Mix-side event stream.
//!
//! The mixer reports source lifecycle transitions through an unbounded
//! channel owned by the context. Consuming the events is optional; the
//! channel is drained lazily by whoever holds the receiver.

/// Key a source was played under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceKey {
    Name(String),
    Index(i32),
}

impl From<&str> for SourceKey {
    fn from(name: &str) -> Self {
        SourceKey::Name(name.to_owned())
    }
}

impl From<i32> for SourceKey {
    fn from(index: i32) -> Self {
        SourceKey::Index(index)
    }
}

/// Events emitted by the mixer during `process`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinauraEvent {
    /// A non-looping source played to completion (or finished its fade-out)
    /// and was reaped.
    SourceCompleted { object: u64, key: SourceKey },
    /// A looping source wrapped around its sample or stream.
    SourceLooped { object: u64, key: SourceKey },
    /// An auto-deleted object ran out of sources and was removed.
    ObjectRemoved { object: u64 },
}

impl BinauraEvent {
    pub fn object(&self) -> u64 {
        match self {
            Self::SourceCompleted { object, .. }
            | Self::SourceLooped { object, .. }
            | Self::ObjectRemoved { object } => *object,
        }
    }
}
