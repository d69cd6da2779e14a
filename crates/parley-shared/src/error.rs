use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Frame too large: {0} bytes exceeds the 1 MiB limit")]
    FrameTooLarge(u32),

    #[error("Unknown frame type code: {0}")]
    UnknownType(i64),

    #[error("Frame encode error: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Frame decode error: {0}")]
    Decode(#[source] serde_json::Error),
}
