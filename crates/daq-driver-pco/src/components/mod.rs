//! Acquisition pipeline components, bottom-up:
//!
//! - Connection: open handle and status translation
//! - Geometry, timing, transfer: camera settings and their validation
//! - Buffer pool, queue, frame wait: driver buffers and the wait state machine
//! - Acquisition: session controller tying them together

pub mod acquisition;
pub mod buffer_pool;
pub mod cache;
pub mod connection;
pub mod frame;
pub mod frame_wait;
pub mod geometry;
pub mod queue;
pub mod timing;
pub mod transfer;
