pub mod constants;
pub mod crypto;
pub mod frame;
pub mod framing;
pub mod types;

mod error;

pub use error::ProtocolError;
pub use frame::Frame;
pub use framing::{encode, FrameBuffer};
pub use types::*;
