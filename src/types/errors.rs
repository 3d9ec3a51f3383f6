use std::fmt;

// === HostError ===

/// Errors reported by the editor host while probing or restoring.
#[derive(Debug, Clone, PartialEq)]
pub enum HostError {
    /// The host connection is gone or never answered.
    Unavailable(String),
    /// A document could not be opened.
    OpenFailed { key: String, reason: String },
    /// A host command failed.
    CommandFailed { command: String, reason: String },
    /// The host answered with something that could not be interpreted.
    InvalidResponse(String),
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::Unavailable(msg) => write!(f, "Editor host unavailable: {}", msg),
            HostError::OpenFailed { key, reason } => {
                write!(f, "Failed to open {}: {}", key, reason)
            }
            HostError::CommandFailed { command, reason } => {
                write!(f, "Host command {} failed: {}", command, reason)
            }
            HostError::InvalidResponse(msg) => write!(f, "Invalid host response: {}", msg),
        }
    }
}

impl std::error::Error for HostError {}

// === CodecError ===

/// Errors raised while decoding persisted tab groups.
///
/// Callers of the codec never see these: decoding degrades to an empty result and
/// the error is only logged.
#[derive(Debug, Clone, PartialEq)]
pub enum CodecError {
    /// The stored value was neither base64 nor JSON.
    Encoding(String),
    /// The JSON did not match any known layout.
    Format(String),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Encoding(msg) => write!(f, "Codec encoding error: {}", msg),
            CodecError::Format(msg) => write!(f, "Codec format error: {}", msg),
        }
    }
}

impl std::error::Error for CodecError {}

// === StorageError ===

/// Errors related to the key-value store backing the groups.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageError {
    /// Database operation failed.
    DatabaseError(String),
    /// The store lock was poisoned by a panicking writer.
    LockPoisoned,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::DatabaseError(msg) => write!(f, "Storage database error: {}", msg),
            StorageError::LockPoisoned => write!(f, "Storage lock poisoned"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::DatabaseError(err.to_string())
    }
}

// === StoreError ===

/// Errors related to the named group store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Group with the given name was not found.
    NotFound(String),
    /// Persisting the groups failed.
    Storage(StorageError),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(name) => write!(f, "Tab group not found: {}", name),
            StoreError::Storage(err) => write!(f, "Tab group storage failed: {}", err),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Storage(err) => Some(err),
            StoreError::NotFound(_) => None,
        }
    }
}

impl From<StorageError> for StoreError {
    fn from(err: StorageError) -> Self {
        StoreError::Storage(err)
    }
}

// === SettingsError ===

/// Errors related to extension settings management.
#[derive(Debug)]
pub enum SettingsError {
    /// An I/O error occurred while reading or writing settings.
    IoError(String),
    /// Failed to serialize or deserialize settings.
    SerializationError(String),
    /// The provided settings key is invalid.
    InvalidKey(String),
    /// The provided settings value is invalid.
    InvalidValue(String),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::IoError(msg) => write!(f, "Settings I/O error: {}", msg),
            SettingsError::SerializationError(msg) => {
                write!(f, "Settings serialization error: {}", msg)
            }
            SettingsError::InvalidKey(key) => write!(f, "Invalid settings key: {}", key),
            SettingsError::InvalidValue(msg) => {
                write!(f, "Invalid settings value: {}", msg)
            }
        }
    }
}

impl std::error::Error for SettingsError {}

// === CommandError ===

/// Errors surfaced by extension commands.
///
/// Cancelled prompts and informational outcomes are not errors; only failures of
/// the underlying host or store end up here.
#[derive(Debug)]
pub enum CommandError {
    /// The editor host failed in a way the command could not recover from.
    Host(HostError),
    /// The group store failed.
    Store(StoreError),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Host(err) => write!(f, "{}", err),
            CommandError::Store(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for CommandError {}

impl From<HostError> for CommandError {
    fn from(err: HostError) -> Self {
        CommandError::Host(err)
    }
}

impl From<StoreError> for CommandError {
    fn from(err: StoreError) -> Self {
        CommandError::Store(err)
    }
}
