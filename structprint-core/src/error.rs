use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Format syntax error in {format:?} at position {position}: {message}")]
    FormatSyntax {
        format: String,
        position: usize,
        message: String,
    },

    #[error("Couldn't find raw offset for virtual address {address:#010x}")]
    AddressTranslation { address: u64 },

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Read of {len} bytes at offset {offset:#x} exceeds image size {size:#x}")]
    OutOfBounds { offset: u64, len: u64, size: u64 },

    #[error("Non-ASCII byte {byte:#04x} in string at offset {offset:#x}")]
    InvalidText { offset: u64, byte: u8 },

    #[error("Not a PE image: {0}")]
    NotPortableExecutable(String),

    #[error("Malformed binary: {0}")]
    Goblin(#[from] goblin::error::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
