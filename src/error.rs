/// [Result] alias for return types of the crate API
pub type Result<T> = std::result::Result<T, Error>;

/// Error enum type
#[derive(Debug)]
pub enum Error {
    /// Error returned by the Crazyflie library. Returns the [error from the lib](crazyflie_lib::Error).
    Lib(crazyflie_lib::Error),
    /// Crazyflie link error. Returns the [error from the Link](crazyflie_link::Error).
    Link(crazyflie_link::Error),
    /// Invalid configuration. The String contains the reason.
    Config(String),
    /// An argument passed to a commander or logger is out of range. The String contains the reason.
    InvalidArgument(String),
    /// A take-off was requested while the commander is already flying.
    AlreadyFlying,
    /// A movement was requested while the commander is not flying.
    NotFlying,
    /// The required deck was not detected. The String contains the deck name.
    DeckNotAttached(String),
    /// Log configuration error. The String contains the reason.
    LogConfig(String),
    /// Variable not found in the TOC. The String contains the variable name.
    VariableNotFound(String),
    /// The vehicle session is disconnected.
    Disconnected,
    /// I/O error, for example while accessing the TOC cache directory.
    Io(std::io::Error),
    /// TOC cache serialization error.
    Cache(serde_json::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Lib(e) => write!(f, "crazyflie error: {:?}", e),
            Error::Link(e) => write!(f, "link error: {:?}", e),
            Error::Config(reason) => write!(f, "invalid configuration: {}", reason),
            Error::InvalidArgument(reason) => write!(f, "invalid argument: {}", reason),
            Error::AlreadyFlying => f.write_str("already flying"),
            Error::NotFlying => f.write_str("not flying"),
            Error::DeckNotAttached(deck) => write!(f, "deck {} is not attached", deck),
            Error::LogConfig(reason) => write!(f, "log configuration error: {}", reason),
            Error::VariableNotFound(name) => write!(f, "variable {} not found", name),
            Error::Disconnected => f.write_str("disconnected"),
            Error::Io(e) => write!(f, "i/o error: {}", e),
            Error::Cache(e) => write!(f, "TOC cache error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Cache(e) => Some(e),
            _ => None,
        }
    }
}

impl From<crazyflie_lib::Error> for Error {
    fn from(error: crazyflie_lib::Error) -> Self {
        Self::Lib(error)
    }
}

impl From<crazyflie_link::Error> for Error {
    fn from(error: crazyflie_link::Error) -> Self {
        Self::Link(error)
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error)
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::Cache(error)
    }
}

impl<T> From<flume::SendError<T>> for Error {
    fn from(_: flume::SendError<T>) -> Self {
        self::Error::Disconnected
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(_: tokio::task::JoinError) -> Self {
        self::Error::Disconnected
    }
}
