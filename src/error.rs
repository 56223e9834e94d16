use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("couldn't identify a platform: {0}")]
    PlatformDiscovery(String),

    #[error("couldn't access any devices: {0}")]
    DeviceUnavailable(String),

    #[error("couldn't create a context: {0}")]
    ContextCreation(String),

    #[error("couldn't create a command queue: {0}")]
    QueueCreation(String),

    #[error("couldn't find the program file {}: {source}", path.display())]
    SourceNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("program build failed:\n{log}")]
    Compile { log: String },

    #[error("couldn't create kernel `{entry_point}`: {reason}")]
    KernelCreation { entry_point: String, reason: String },

    #[error("buffer allocation failed: {0}")]
    Allocation(String),

    #[error("buffer transfer failed: {0}")]
    Transfer(String),

    #[error("couldn't bind argument {index}: {reason}")]
    ArgumentBind { index: usize, reason: String },

    #[error("kernel dispatch failed: {0}")]
    Dispatch(String),

    #[error("output mismatch at element {index}: expected {expected}, got {actual}")]
    Verification {
        index: usize,
        expected: i32,
        actual: i32,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error("report error: {0}")]
    Report(String),
}

impl Error {
    pub fn platform<S: Into<String>>(msg: S) -> Self {
        Error::PlatformDiscovery(msg.into())
    }

    pub fn device_unavailable<S: Into<String>>(msg: S) -> Self {
        Error::DeviceUnavailable(msg.into())
    }

    pub fn context<S: Into<String>>(msg: S) -> Self {
        Error::ContextCreation(msg.into())
    }

    pub fn queue<S: Into<String>>(msg: S) -> Self {
        Error::QueueCreation(msg.into())
    }

    pub fn compile<S: Into<String>>(log: S) -> Self {
        Error::Compile { log: log.into() }
    }

    pub fn kernel<E: Into<String>, S: Into<String>>(entry_point: E, reason: S) -> Self {
        Error::KernelCreation {
            entry_point: entry_point.into(),
            reason: reason.into(),
        }
    }

    pub fn allocation<S: Into<String>>(msg: S) -> Self {
        Error::Allocation(msg.into())
    }

    pub fn transfer<S: Into<String>>(msg: S) -> Self {
        Error::Transfer(msg.into())
    }

    pub fn bind<S: Into<String>>(index: usize, reason: S) -> Self {
        Error::ArgumentBind {
            index,
            reason: reason.into(),
        }
    }

    pub fn dispatch<S: Into<String>>(msg: S) -> Self {
        Error::Dispatch(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn report<S: Into<String>>(msg: S) -> Self {
        Error::Report(msg.into())
    }

    /// Backend build log carried by a compile failure.
    pub fn compile_log(&self) -> Option<&str> {
        match self {
            Error::Compile { log } => Some(log),
            _ => None,
        }
    }

    /// Every error is fatal for the run and maps to the same status.
    pub fn exit_code(&self) -> u8 {
        1
    }
}
