//! # Per-block noise estimation
//!
//! The SAD value of a single frame says little about motion, but averaged over a longer
//! timeframe in a mostly still scene it tracks sensor and compression noise well. The model
//! keeps a geometrically decaying accumulator of it per block.

use crate::motion_field::MotionVectorFrame;
use log::*;
use nalgebra as na;

/// Decay shift used for a given temporal window, in frames.
///
/// Larger windows decay slower, averaging the noise over a longer time.
pub fn decay_shift(window: usize) -> u32 {
    let bit_length = usize::BITS - window.leading_zeros();
    bit_length.saturating_sub(2)
}

/// Decaying per-block noise field.
pub struct NoiseModel {
    field: na::DMatrix<u32>,
    shift: u32,
}

impl NoiseModel {
    /// Create a new noise model.
    ///
    /// # Arguments
    ///
    /// * `window` - temporal window size, in frames.
    pub fn new(window: usize) -> Self {
        Self {
            field: na::DMatrix::zeros(0, 0),
            shift: decay_shift(window),
        }
    }

    pub fn shift(&self) -> u32 {
        self.shift
    }

    /// Current noise estimates, in `(row, col)` block coordinates.
    pub fn field(&self) -> &na::DMatrix<u32> {
        &self.field
    }

    /// Noise estimate at given block.
    pub fn get(&self, row: usize, col: usize) -> u32 {
        self.field[(row, col)]
    }

    /// Decay the field and accumulate the SAD values of the next frame.
    pub fn update(&mut self, frame: &MotionVectorFrame) {
        let dim = frame.dim();

        if self.field.shape() != dim {
            debug!("noise field reset to {}x{} blocks", dim.0, dim.1);
            self.field = na::DMatrix::zeros(dim.0, dim.1);
        }

        let shift = self.shift;

        for (row, col, block) in frame.iter() {
            let noise = &mut self.field[(row, col)];
            let decayed = noise.saturating_sub((*noise >> shift) + 1);
            *noise = decayed.saturating_add(u32::from(block.sad) >> shift);
        }
    }
}
