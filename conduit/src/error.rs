use std::io;

/// Errors returned by fallible operations of this crate.
///
/// Failures of a live connection are not reported through this type but
/// through the connection's sticky error flag.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
    #[error("Transport has no descriptor")]
    NoDescriptor,
    #[error("Transport already released")]
    Released,
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),
    #[error("Unsupported address family: {0}")]
    AddressFamily(i32),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
