//! # Motion vector capture log
//!
//! Binary, append-only record of analyzed frames. Each record is laid out as:
//!
//! | field           | size         |
//! |-----------------|--------------|
//! | `frameno\0` tag | 8            |
//! | frame index     | 4, BE `u32`  |
//! | trigger state   | 1            |
//! | `mvarray\0` tag | 8            |
//! | block rows      | 1            |
//! | block columns   | 1            |
//! | block size      | 1            |
//! | block array     | rows * cols * block size |
//!
//! The block array is the encoder's raw motion vector buffer.

use crate::motion_field::{MotionVector, MotionVectorFrame};
use anyhow::{anyhow, Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::Path;

pub const FRAME_TAG: [u8; 8] = *b"frameno\0";
pub const ARRAY_TAG: [u8; 8] = *b"mvarray\0";

const HEADER_LEN: usize = 8 + 4 + 1 + 8 + 3;
const BLOCK_LEN: usize = std::mem::size_of::<MotionVector>();

/// A single frame read back from a capture log.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoggedFrame {
    pub index: u32,
    pub trigger: bool,
    pub frame: MotionVectorFrame,
}

/// Capture log writer.
pub struct CaptureLogWriter<W> {
    out: W,
}

impl CaptureLogWriter<BufWriter<File>> {
    /// Open a log file for appending, creating it if needed.
    pub fn append(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("unable to open capture log {}", path.display()))?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> CaptureLogWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Append a frame record.
    ///
    /// # Arguments
    ///
    /// * `index` - index of the frame in the stream.
    /// * `trigger` - trigger state before analysing the frame.
    /// * `frame` - motion vectors of the frame.
    pub fn write_frame(
        &mut self,
        index: u32,
        trigger: bool,
        frame: &MotionVectorFrame,
    ) -> Result<()> {
        let (rows, cols) = frame.dim();
        let rows =
            u8::try_from(rows).map_err(|_| anyhow!("{} block rows do not fit a record", rows))?;
        let cols =
            u8::try_from(cols).map_err(|_| anyhow!("{} block columns do not fit a record", cols))?;

        let mut header = [0u8; HEADER_LEN];
        header[0..8].copy_from_slice(&FRAME_TAG);
        header[8..12].copy_from_slice(&index.to_be_bytes());
        header[12] = trigger as u8;
        header[13..21].copy_from_slice(&ARRAY_TAG);
        header[21] = rows;
        header[22] = cols;
        header[23] = BLOCK_LEN as u8;

        self.out.write_all(&header)?;
        self.out.write_all(frame.as_bytes())?;

        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush().map_err(Into::into)
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Capture log reader.
pub struct CaptureLogReader<R> {
    input: R,
    buf: Vec<u8>,
}

impl<R: Read> CaptureLogReader<R> {
    pub fn new(input: R) -> Self {
        Self { input, buf: vec![] }
    }

    /// Read the next record into `out`.
    ///
    /// Returns `Ok(false)` on a clean end of the log.
    pub fn read_into(&mut self, out: &mut LoggedFrame) -> Result<bool> {
        let mut header = [0u8; HEADER_LEN];

        // A log may only end at a record boundary.
        match self.input.read_exact(&mut header[..1]) {
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(false),
            r => r?,
        }

        self.input
            .read_exact(&mut header[1..])
            .context("truncated record header")?;

        if header[0..8] != FRAME_TAG || header[13..21] != ARRAY_TAG {
            return Err(anyhow!("invalid record tags"));
        }

        let mut index = [0u8; 4];
        index.copy_from_slice(&header[8..12]);

        let (rows, cols, block_len) = (
            header[21] as usize,
            header[22] as usize,
            header[23] as usize,
        );

        if block_len != BLOCK_LEN {
            return Err(anyhow!("unsupported block size {}", block_len));
        }

        self.buf.resize(rows * cols * block_len, 0);
        self.input
            .read_exact(&mut self.buf)
            .context("truncated block array")?;

        out.index = u32::from_be_bytes(index);
        out.trigger = header[12] != 0;
        out.frame.fill_from_bytes(rows, cols, &self.buf)?;

        Ok(true)
    }

    /// Read the next record.
    pub fn read_frame(&mut self) -> Result<Option<LoggedFrame>> {
        let mut frame = LoggedFrame::default();
        Ok(self.read_into(&mut frame)?.then(|| frame))
    }
}

impl<R: Read> Iterator for CaptureLogReader<R> {
    type Item = Result<LoggedFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_frame().transpose()
    }
}
