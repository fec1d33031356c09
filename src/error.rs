//! Error type.
//!
//! Shared error type for the engine core. Graph structural problems are not
//! errors; they invalidate the graph and are reported on the `graph` log
//! target instead.

use std::{error, fmt, io};

#[derive(Debug)]
pub enum Error {
    Asset(AssetError),
    ShaderCompile(String),
    Io(io::Error),
}

#[derive(Debug)]
pub enum AssetError {
    BadMagic { found: u32 },
    WrongTypeName { expected: String, found: String },
    UnsupportedVersion { found: u32 },
    Truncated,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Asset(e) => write!(f, "asset error: {}", e),
            Error::ShaderCompile(msg) => write!(f, "shader compilation failed: {}", msg),
            Error::Io(e) => write!(f, "io error: {}", e),
        }
    }
}

impl fmt::Display for AssetError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AssetError::BadMagic { found } => write!(f, "bad magic number {:#x}", found),
            AssetError::WrongTypeName { expected, found } => {
                write!(f, "expected asset type `{}`, found `{}`", expected, found)
            }
            AssetError::UnsupportedVersion { found } => {
                write!(f, "unsupported asset version {}", found)
            }
            AssetError::Truncated => write!(f, "truncated asset data"),
        }
    }
}

impl error::Error for Error {}

impl From<AssetError> for Error {
    fn from(e: AssetError) -> Error {
        Error::Asset(e)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
