use shared::DecodeError;
use std::fmt;
use std::io;
use std::time::Duration;

/// Which request of a cycle an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Info,
    Challenge,
    Players,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Challenge => write!(f, "challenge"),
            Self::Players => write!(f, "player list"),
        }
    }
}

/// Why a poll cycle was abandoned. None of these stop the poller.
#[derive(Debug)]
pub enum PollError {
    Decode { step: Step, source: DecodeError },
    Io(io::Error),
    Timeout { step: Step, waited: Duration },
}

impl PollError {
    pub fn decode(step: Step) -> impl FnOnce(DecodeError) -> PollError {
        move |source| PollError::Decode { step, source }
    }

    pub fn step(&self) -> Option<Step> {
        match self {
            Self::Decode { step, .. } | Self::Timeout { step, .. } => Some(*step),
            Self::Io(_) => None,
        }
    }
}

impl fmt::Display for PollError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode { step, source } => write!(f, "invalid {} response: {}", step, source),
            Self::Io(e) => write!(f, "network error: {}", e),
            Self::Timeout { step, waited } => write!(
                f,
                "no {} response within {:.1}s",
                step,
                waited.as_secs_f32()
            ),
        }
    }
}

impl std::error::Error for PollError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Decode { source, .. } => Some(source),
            Self::Io(e) => Some(e),
            Self::Timeout { .. } => None,
        }
    }
}

impl From<io::Error> for PollError {
    fn from(e: io::Error) -> Self {
        PollError::Io(e)
    }
}

/// Failures that keep the poller from starting at all.
#[derive(Debug)]
pub enum StartupError {
    Resolve(String),
    Bind(io::Error),
    Spawn(io::Error),
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolve(target) => write!(f, "could not resolve server address {}", target),
            Self::Bind(e) => write!(f, "could not bind local query socket: {}", e),
            Self::Spawn(e) => write!(f, "could not start poller thread: {}", e),
        }
    }
}

impl std::error::Error for StartupError {}
