//! # In-memory circular video buffer
//!
//! The encoder keeps appending frames of its elementary stream, and the oldest ones fall out
//! once the buffer spans more than its capacity. When motion is detected, the recorder drains
//! the buffer into the output file, so the recording starts some time before the motion did.

use anyhow::Result;
use log::*;
use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::settings::Settings;

/// Type of an encoded frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    /// Stream parameter header, immediately followed by a key frame.
    ///
    /// A stream starting at this frame is decodable on its own.
    Header,
    /// Intra-coded frame.
    Key,
    /// Frame predicted from earlier frames.
    Delta,
}

/// A single frame of the encoded stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedFrame {
    pub kind: FrameKind,
    /// Presentation time since the start of the stream.
    pub timestamp: Duration,
    pub data: Vec<u8>,
}

impl EncodedFrame {
    pub fn new(kind: FrameKind, timestamp: Duration, data: Vec<u8>) -> Self {
        Self {
            kind,
            timestamp,
            data,
        }
    }
}

#[derive(Default)]
struct BufferState {
    frames: VecDeque<EncodedFrame>,
    bytes: usize,
}

impl BufferState {
    fn span(&self) -> Duration {
        match (self.frames.front(), self.frames.back()) {
            (Some(first), Some(last)) => last.timestamp.saturating_sub(first.timestamp),
            _ => Duration::ZERO,
        }
    }
}

/// Time bounded ring of encoded video.
///
/// Appends and drains exclude each other through a single lock, which is only held to move
/// frames in or out, never during file I/O.
pub struct CircularVideoBuffer {
    state: Mutex<BufferState>,
    capacity: Duration,
}

impl CircularVideoBuffer {
    /// Create a new buffer.
    ///
    /// # Arguments
    ///
    /// * `capacity` - maximum time span of buffered video.
    pub fn new(capacity: Duration) -> Self {
        Self {
            state: Default::default(),
            capacity,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.buffer_capacity())
    }

    fn lock(&self) -> MutexGuard<BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> Duration {
        self.capacity
    }

    /// Append the next frame of the stream, evicting frames older than the capacity.
    pub fn append(&self, frame: EncodedFrame) {
        let mut state = self.lock();

        state.bytes += frame.data.len();
        state.frames.push_back(frame);

        while state.span() > self.capacity {
            if let Some(old) = state.frames.pop_front() {
                state.bytes -= old.data.len();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().frames.is_empty()
    }

    /// Total size of buffered frames, in bytes.
    pub fn bytes(&self) -> usize {
        self.lock().bytes
    }

    /// Time span of buffered frames.
    pub fn duration(&self) -> Duration {
        self.lock().span()
    }

    /// Remove the latest `seconds` of video, clearing the rest of the buffer.
    ///
    /// If `first_frame` is set, frames before the first frame of that kind are dropped as
    /// well.
    pub fn take(&self, seconds: Duration, first_frame: Option<FrameKind>) -> Vec<EncodedFrame> {
        let BufferState { frames, .. } = std::mem::take(&mut *self.lock());

        let cutoff = frames
            .back()
            .map(|f| f.timestamp.saturating_sub(seconds))
            .unwrap_or_default();

        let mut frames = frames
            .into_iter()
            .skip_while(|f| f.timestamp < cutoff)
            .peekable();

        if let Some(kind) = first_frame {
            while frames.next_if(|f| f.kind != kind).is_some() {}
        }

        frames.collect()
    }

    /// Copy the latest `seconds` of video to `out`, then clear the buffer.
    ///
    /// With `first_frame` set, the copy starts at the first frame of that kind. If there is
    /// none, nothing is written. Returns the number of bytes written.
    pub fn drain_into(
        &self,
        out: &mut impl Write,
        seconds: Duration,
        first_frame: Option<FrameKind>,
    ) -> Result<usize> {
        let frames = self.take(seconds, first_frame);

        if frames.is_empty() {
            if first_frame.is_some() {
                debug!("no {:?} frame in the video buffer", first_frame);
            }
            return Ok(0);
        }

        let mut written = 0;

        for frame in &frames {
            out.write_all(&frame.data)?;
            written += frame.data.len();
        }

        trace!(
            "drained {} frames ({} bytes) from the video buffer",
            frames.len(),
            written
        );

        Ok(written)
    }
}
