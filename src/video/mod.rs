//! Shared video pipeline types: sizes, frames, and encoded packets.

pub mod format;
pub mod frame;
pub mod packet;

pub use format::{ColorProfile, Size};
pub use frame::{Frame, RenderedFrame};
pub use packet::EncodedPacket;
