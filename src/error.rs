//! Unified error types for the FullWash controller.
//!
//! A single `Error` enum that every subsystem converts into, so the
//! top-level loop can log any failure uniformly. All variants are `Copy`;
//! none of them is fatal to the control loop.
//!
//! | Domain     | Recovery                                         |
//! |------------|--------------------------------------------------|
//! | `Bus`      | side-effect skipped, retried on a later cycle    |
//! | `Message`  | inbound message dropped, no state change         |
//! | `Load`     | reported on the loader status channel            |
//! | `Publish`  | outbound notification dropped                    |
//! | `Config`   | settings rejected, previous values kept          |

use core::fmt;

use crate::app::ports::ConfigError;

// ---------------------------------------------------------------------------
// Top-level controller error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The shared I/O expander could not be accessed.
    Bus(BusError),
    /// An inbound backend message was malformed or unroutable.
    Message(MessageError),
    /// A session-load request failed authorization.
    Load(LoadError),
    /// An outbound notification could not be queued or delivered.
    Publish(PublishError),
    /// Machine settings are invalid or could not be persisted.
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus(e) => write!(f, "bus: {e}"),
            Self::Message(e) => write!(f, "message: {e}"),
            Self::Load(e) => write!(f, "load: {e}"),
            Self::Publish(e) => write!(f, "publish: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Bus errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// The bus lock was not acquired within the bounded wait.
    LockTimeout,
    /// The I2C transaction itself failed (NACK, arbitration loss, ...).
    Transfer,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LockTimeout => write!(f, "lock timeout"),
            Self::Transfer => write!(f, "I2C transfer failed"),
        }
    }
}

impl From<BusError> for Error {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}

// ---------------------------------------------------------------------------
// Inbound message errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageError {
    /// Topic does not belong to this machine or is not handled.
    UnknownTopic,
    /// Payload is not valid JSON for the topic's schema.
    Malformed,
    /// A required field is absent or empty.
    MissingField(&'static str),
    /// A timestamp field could not be parsed as ISO-8601.
    BadTimestamp,
    /// A session load arrived while a session is already active.
    AlreadyLoaded,
}

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTopic => write!(f, "unknown topic"),
            Self::Malformed => write!(f, "malformed payload"),
            Self::MissingField(name) => write!(f, "missing field '{name}'"),
            Self::BadTimestamp => write!(f, "bad timestamp"),
            Self::AlreadyLoaded => write!(f, "machine already loaded"),
        }
    }
}

impl From<MessageError> for Error {
    fn from(e: MessageError) -> Self {
        Self::Message(e)
    }
}

// ---------------------------------------------------------------------------
// Session-load errors
// ---------------------------------------------------------------------------

/// Reasons a remote session load is refused. The `Display` text is what
/// the loader's status channel shows after the `Error: ` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadError {
    InvalidUserId,
    InvalidUserName,
    InvalidTokenCount,
    UserIdNotSet,
    UserNameNotSet,
    AuthTokenNotSet,
    MissingAuthToken,
    UnknownCommand,
    /// Token does not have exactly five `|`-separated fields.
    TokenFormat,
    /// A token field disagrees with the request (`user_id`, `machine_id`, `tokens`).
    TokenMismatch(&'static str),
    /// Token was received too long ago.
    TokenExpired,
    /// Signed timestamp is outside the plausible range.
    TimestampOutOfRange,
    SignatureMismatch,
    /// The machine already has an active session.
    MachineBusy,
}

impl LoadError {
    /// True for failures of the authorization token itself.
    pub fn is_auth_failure(self) -> bool {
        matches!(
            self,
            Self::TokenFormat
                | Self::TokenMismatch(_)
                | Self::TokenExpired
                | Self::TimestampOutOfRange
                | Self::SignatureMismatch
        )
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUserId => write!(f, "Invalid user ID"),
            Self::InvalidUserName => write!(f, "Invalid user name"),
            Self::InvalidTokenCount => write!(f, "Invalid token count"),
            Self::UserIdNotSet => write!(f, "User ID not set"),
            Self::UserNameNotSet => write!(f, "User name not set"),
            Self::AuthTokenNotSet => write!(f, "Authorization token not set"),
            Self::MissingAuthToken => {
                write!(f, "Load command must include auth token (LOAD|token)")
            }
            Self::UnknownCommand => write!(f, "Unknown command. Use LOAD|authToken"),
            Self::TokenFormat
            | Self::TokenMismatch(_)
            | Self::TokenExpired
            | Self::TimestampOutOfRange
            | Self::SignatureMismatch => write!(f, "Invalid or expired authorization token"),
            Self::MachineBusy => write!(f, "Machine is not available"),
        }
    }
}

impl From<LoadError> for Error {
    fn from(e: LoadError) -> Self {
        Self::Load(e)
    }
}

// ---------------------------------------------------------------------------
// Publish errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishError {
    /// The outbound queue is at capacity.
    QueueFull,
    /// Serialized payload exceeds the queue slot size.
    PayloadTooLarge,
    /// The event could not be serialized.
    Serialize,
    /// The network transport refused the message.
    Transport,
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull => write!(f, "queue full"),
            Self::PayloadTooLarge => write!(f, "payload too large"),
            Self::Serialize => write!(f, "serialization failed"),
            Self::Transport => write!(f, "transport error"),
        }
    }
}

impl From<PublishError> for Error {
    fn from(e: PublishError) -> Self {
        Self::Publish(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}
