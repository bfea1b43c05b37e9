//! # Macroblock motion vector fields

use anyhow::{anyhow, Result};
use bytemuck::{Pod, Zeroable};
use nalgebra as na;

/// Per-block motion magnitude, in `(row, col)` block coordinates.
pub type MagnitudeField = na::DMatrix<u8>;

/// Per-block activity flags, in `(row, col)` block coordinates.
pub type ActivityMask = na::DMatrix<bool>;

/// Side of a single macroblock, in pixels.
pub const BLOCK_SIZE: usize = 16;

/// A single macroblock entry emitted by the encoder.
///
/// The layout matches the encoder's motion vector output: horizontal and vertical displacement
/// followed by the sum of absolute differences for the block.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct MotionVector {
    pub x: i8,
    pub y: i8,
    pub sad: u16,
}

impl MotionVector {
    pub fn new(x: i8, y: i8, sad: u16) -> Self {
        Self { x, y, sad }
    }

    /// Rounded length of the displacement, saturated to `u8`.
    pub fn magnitude(&self) -> u8 {
        let (x, y) = (f32::from(self.x), f32::from(self.y));
        (x * x + y * y).sqrt().round().min(u8::MAX as f32) as u8
    }
}

/// One frame worth of motion vectors.
///
/// Blocks are stored in row-major order, `rows * cols` entries in total.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MotionVectorFrame {
    rows: usize,
    cols: usize,
    blocks: Vec<MotionVector>,
}

impl MotionVectorFrame {
    /// Create a still (all-zero) frame.
    ///
    /// # Arguments
    ///
    /// * `rows` - number of block rows.
    /// * `cols` - number of block columns.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            blocks: vec![MotionVector::default(); rows * cols],
        }
    }

    /// Create a frame from row-major blocks.
    pub fn from_blocks(rows: usize, cols: usize, blocks: Vec<MotionVector>) -> Result<Self> {
        if blocks.len() != rows * cols {
            return Err(anyhow!(
                "expected {} blocks for a {}x{} grid, got {}",
                rows * cols,
                rows,
                cols,
                blocks.len()
            ));
        }

        Ok(Self { rows, cols, blocks })
    }

    /// Create a frame from the encoder's raw motion vector buffer.
    pub fn from_bytes(rows: usize, cols: usize, bytes: &[u8]) -> Result<Self> {
        let mut frame = Self::default();
        frame.fill_from_bytes(rows, cols, bytes)?;
        Ok(frame)
    }

    /// Replace the contents of the frame with a raw motion vector buffer, reusing the allocation.
    pub fn fill_from_bytes(&mut self, rows: usize, cols: usize, bytes: &[u8]) -> Result<()> {
        let expected = rows * cols * std::mem::size_of::<MotionVector>();

        if bytes.len() != expected {
            return Err(anyhow!(
                "expected {} bytes of motion vectors, got {}",
                expected,
                bytes.len()
            ));
        }

        self.rows = rows;
        self.cols = cols;
        self.blocks.clear();
        self.blocks.resize(rows * cols, MotionVector::default());
        bytemuck::cast_slice_mut::<MotionVector, u8>(&mut self.blocks).copy_from_slice(bytes);

        Ok(())
    }

    /// Raw bytes of the block array, in the encoder's layout.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.blocks)
    }

    /// Get the number of block rows and columns.
    pub fn dim(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn blocks(&self) -> &[MotionVector] {
        &self.blocks
    }

    /// Get the block at given coordinates.
    pub fn get(&self, row: usize, col: usize) -> MotionVector {
        self.blocks[row * self.cols + col]
    }

    /// Set the block at given coordinates.
    pub fn set(&mut self, row: usize, col: usize, block: MotionVector) {
        self.blocks[row * self.cols + col] = block;
    }

    /// Iterate every block of the frame.
    ///
    /// The resulting iterator yields `(row, col, block)` entries.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, MotionVector)> + '_ {
        let cols = self.cols.max(1);
        self.blocks
            .iter()
            .enumerate()
            .map(move |(i, b)| (i / cols, i % cols, *b))
    }

    /// Compute the per-block motion magnitude.
    pub fn magnitude(&self) -> MagnitudeField {
        MagnitudeField::from_fn(self.rows, self.cols, |r, c| self.get(r, c).magnitude())
    }
}

/// Motion vector grid dimensions for a given resolution.
///
/// The encoder rounds the resolution up to whole macroblocks and emits one extra column per
/// row. Returns `(rows, cols)`.
pub fn grid_dim(width: usize, height: usize) -> (usize, usize) {
    let cols = (width + BLOCK_SIZE - 1) / BLOCK_SIZE + 1;
    let rows = (height + BLOCK_SIZE - 1) / BLOCK_SIZE;
    (rows, cols)
}
