//! # Camera abstraction
//!
//! The camera and its hardware encoder live outside of this crate. They are reached through
//! the [`Camera`] trait, and feed motion vectors to a registered [`MotionHandler`].

use crate::motion_field::MotionVectorFrame;
use anyhow::Result;
use std::path::Path;
use std::time::Duration;

/// Capture device, as seen by the recorder and the ancillary threads.
pub trait Camera: Send + Sync {
    /// Whether the encoder is currently running.
    fn is_capturing(&self) -> bool;

    /// Sleep for up to `timeout`.
    ///
    /// Must return early once capture stops, and immediately if it is not capturing at all.
    fn wait(&self, timeout: Duration);

    /// Switch the indicator light.
    fn set_led(&self, _on: bool) {}

    /// Capture a still image from the video port into `path`.
    fn capture_still(&self, path: &Path) -> Result<()>;
}

/// Per-frame motion vector callback.
///
/// The camera invokes this once per encoded frame, in frame order, from its encoder thread.
/// Implementations must finish well within one frame interval.
pub trait MotionHandler: Send {
    /// Process motion vectors of a single frame.
    ///
    /// Returns whether this frame on its own contained motion.
    fn on_motion_vectors(&mut self, frame: &MotionVectorFrame) -> bool;
}

impl<T: MotionHandler + ?Sized> MotionHandler for Box<T> {
    fn on_motion_vectors(&mut self, frame: &MotionVectorFrame) -> bool {
        (**self).on_motion_vectors(frame)
    }
}
