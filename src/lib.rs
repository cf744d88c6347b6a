//! Vendor-neutral session and parser engine for recreational dive
//! computers: per-family wire protocols that enumerate a device's dive
//! ring buffer and hand back opaque blobs, and per-family decoders that
//! turn those blobs into a typed sample stream and summary fields. See
//! the crate's `SPEC_FULL.md` for the full contract; `DESIGN.md` for how
//! each module is grounded against the device drivers it's modeled on.

pub mod bytes;
pub mod checksum;
pub mod ringbuf;
pub mod buffer;
pub mod channel;
pub mod context;
pub mod event;
pub mod datetime;
pub mod sample;
pub mod error;
pub mod session;
pub mod parser;
pub mod dispatch;
pub mod firmware;

pub use error::{Error, Result};
