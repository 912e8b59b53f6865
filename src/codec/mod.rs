//! # HDHomeRun Codec Module
//!
//! Frame and tagged-value encoding shared by UDP discovery and TCP control.
//!
//! ## Key Types
//!
//! - [`seal_frame`] / [`open_frame`] - type + length + payload + CRC32 envelope
//! - [`FrameDecodeResult`] - `Incomplete`, `Invalid` or a decoded frame
//! - [`TagWriter`] / [`TagReader`] - tag/length/value records inside a payload
//! - [`crc32`] - IEEE CRC-32 used by the frame trailer
//!
//! ## Example
//!
//! ```ignore
//! use hdhomerun_tuner::codec::{seal_frame, open_frame, FrameType, FrameDecodeResult};
//!
//! let bytes = seal_frame(&[0x01, 0x02], FrameType::DISCOVER_REQUEST);
//! match open_frame(&bytes, bytes.len()) {
//!     FrameDecodeResult::Frame(frame_type, payload) => { /* ... */ }
//!     _ => {}
//! }
//! ```

pub mod crc;
pub mod frame;
pub mod tlv;

pub use crc::crc32;
pub use frame::{open_frame, seal_frame, FrameDecodeResult, FrameType, MAX_FRAME_PAYLOAD};
pub use tlv::{Tag, TagReader, TagWriter, MAX_TAG_LENGTH};
