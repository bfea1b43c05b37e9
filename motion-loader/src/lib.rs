//! Common `MotionSource` instance loader.

use log::*;
use mvcam::prelude::v1::*;
use std::io::{BufReader, Read};

/// Create a motion vector source depending on the input.
///
/// The input is read as a capture log written by the motion analyzer. `tcp://` will be
/// interpreted as a TCP network stream rather than a regular file.
pub fn create_source(input: &str) -> Result<Box<dyn MotionSource>> {
    let reader = mvcam::utils::open_file(input)?;
    let source = MvlogFile::new(BufReader::new(reader));
    debug!("reading capture log from {}", input);
    Ok(Box::new(source))
}

/// Capture log being replayed as a motion vector stream.
pub struct MvlogFile<T> {
    reader: CaptureLogReader<T>,
    grid: Option<(usize, usize)>,
    last: LoggedFrame,
}

impl<T: Read> MvlogFile<T> {
    pub fn new(reader: T) -> Self {
        Self {
            reader: CaptureLogReader::new(reader),
            grid: None,
            last: Default::default(),
        }
    }

    /// Frame index and trigger state recorded along the last frame.
    pub fn last_record(&self) -> (u32, bool) {
        (self.last.index, self.last.trigger)
    }
}

impl<T: Read> MotionSource for MvlogFile<T> {
    fn process_frame(&mut self, frame: &mut MotionVectorFrame) -> Result<bool> {
        std::mem::swap(&mut self.last.frame, frame);
        let read = self.reader.read_into(&mut self.last);
        std::mem::swap(&mut self.last.frame, frame);

        if read? {
            self.grid = Some(frame.dim());
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn get_framerate(&self) -> Option<f64> {
        None
    }

    fn get_grid(&self) -> Option<(usize, usize)> {
        self.grid
    }
}
