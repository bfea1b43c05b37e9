//! # Motion vector sources

use crate::prelude::v1::*;

/// Stream of motion vector frames, such as a recorded capture log.
pub trait MotionSource {
    /// Process a single frame in the stream.
    ///
    /// This function will read in a single frame worth of motion vectors into `frame`. If a
    /// frame was read, `Ok(true)` is returned. At the end of the stream `Ok(false)` is
    /// returned, and if there is an error while reading, `Err` is returned.
    fn process_frame(&mut self, frame: &mut MotionVectorFrame) -> Result<bool>;

    /// Get the framerate of the stream.
    ///
    /// This will return `Some(framerate)` if it is known. Capture logs do not store timing
    /// information, in such cases, `None` is returned.
    fn get_framerate(&self) -> Option<f64>;

    /// Get motion vector grid dimensions as `(rows, cols)`.
    ///
    /// Returns `None` until the first frame is processed.
    fn get_grid(&self) -> Option<(usize, usize)>;
}
