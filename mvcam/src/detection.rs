//! Motion detection module

use crate::motion_field::{ActivityMask, MagnitudeField};
use crate::noise::NoiseModel;

/// Right shift applied to the noise estimate to get the per-block activity threshold.
pub const NOISE_SENSITIVITY_SHIFT: u32 = 4;

/// Flag every block whose motion exceeds the noise threshold at that block.
///
/// Noisier regions need proportionally stronger motion vectors to count as active.
pub fn activity_mask(magnitude: &MagnitudeField, noise: &NoiseModel) -> ActivityMask {
    let (rows, cols) = magnitude.shape();
    assert_eq!(noise.field().shape(), (rows, cols));

    ActivityMask::from_fn(rows, cols, |r, c| {
        u32::from(magnitude[(r, c)]) > noise.get(r, c) >> NOISE_SENSITIVITY_SHIFT
    })
}

/// Neighbourhood used when joining active blocks into regions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Connectivity {
    /// Edge-adjacent blocks only.
    #[default]
    Four,
    /// Edge and corner adjacent blocks.
    Eight,
}

impl Connectivity {
    fn offsets(self) -> &'static [(isize, isize)] {
        match self {
            Self::Four => &[(-1, 0), (1, 0), (0, -1), (0, 1)],
            Self::Eight => &[
                (-1, -1),
                (-1, 0),
                (-1, 1),
                (0, -1),
                (0, 1),
                (1, -1),
                (1, 0),
                (1, 1),
            ],
        }
    }
}

/// Connected region detector.
///
/// Labels the active blocks of a mask into connected regions and reports the size of the
/// biggest one. The fill stack is kept between frames.
#[derive(Default)]
pub struct RegionDetector {
    connectivity: Connectivity,
    to_fill: Vec<(usize, usize)>,
}

impl RegionDetector {
    pub fn new(connectivity: Connectivity) -> Self {
        Self {
            connectivity,
            to_fill: vec![],
        }
    }

    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    /// Block count of the biggest connected region, 0 if there are no active blocks.
    ///
    /// The mask is consumed, since visited blocks get cleared while filling.
    pub fn largest_region(&mut self, mut map: ActivityMask) -> usize {
        let (rows, cols) = map.shape();
        let offsets = self.connectivity.offsets();

        // Flood fill compute the area of the biggest motion.
        let mut biggest_area = 0;

        for x in 0..cols {
            for y in 0..rows {
                if !map[(y, x)] {
                    continue;
                }

                let mut area = 0;

                map[(y, x)] = false;
                self.to_fill.push((y, x));

                while let Some((y, x)) = self.to_fill.pop() {
                    area += 1;

                    for (y, x) in offsets
                        .iter()
                        .map(|&(oy, ox)| (y as isize + oy, x as isize + ox))
                        .filter(|&(y, x)| {
                            (0..rows as isize).contains(&y) && (0..cols as isize).contains(&x)
                        })
                        .map(|(y, x)| (y as usize, x as usize))
                    {
                        if map[(y, x)] {
                            self.to_fill.push((y, x));
                            map[(y, x)] = false;
                        }
                    }
                }

                biggest_area = std::cmp::max(biggest_area, area);
            }
        }

        biggest_area
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion_field::{MotionVector, MotionVectorFrame};

    fn mask(rows: &[&str]) -> ActivityMask {
        ActivityMask::from_fn(rows.len(), rows[0].len(), |r, c| {
            rows[r].as_bytes()[c] == b'#'
        })
    }

    #[test]
    fn empty_mask_has_no_region() {
        let mut detector = RegionDetector::default();
        assert_eq!(detector.largest_region(ActivityMask::repeat(8, 8, false)), 0);
        assert_eq!(detector.largest_region(ActivityMask::repeat(0, 0, false)), 0);
    }

    #[test]
    fn picks_biggest_region() {
        let map = mask(&[
            "##....", //
            "##..#.", //
            "....##", //
            "#...##", //
        ]);

        assert_eq!(RegionDetector::default().largest_region(map), 5);
    }

    #[test]
    fn diagonal_blocks_depend_on_connectivity() {
        let map = mask(&[
            "#...", //
            ".#..", //
            "..#.", //
            "...#", //
        ]);

        assert_eq!(
            RegionDetector::new(Connectivity::Four).largest_region(map.clone()),
            1
        );
        assert_eq!(
            RegionDetector::new(Connectivity::Eight).largest_region(map),
            4
        );
    }

    #[test]
    fn full_mask_is_one_region() {
        let mut detector = RegionDetector::default();
        assert_eq!(detector.largest_region(ActivityMask::repeat(61, 82, true)), 61 * 82);
        // Scratch state does not leak into the next frame.
        assert_eq!(detector.largest_region(ActivityMask::repeat(3, 3, true)), 9);
    }

    #[test]
    fn noise_raises_threshold() {
        let mut frame = MotionVectorFrame::new(1, 2);
        frame.set(0, 0, MotionVector::new(3, 0, 0));
        frame.set(0, 1, MotionVector::new(3, 0, 1600));

        // Shift of 0 makes the noise equal to the SAD of the first frame.
        let mut noise = NoiseModel::new(1);
        noise.update(&frame);

        let active = activity_mask(&frame.magnitude(), &noise);

        // 3 > 0 >> 4, but 3 <= 1600 >> 4.
        assert!(active[(0, 0)]);
        assert!(!active[(0, 1)]);
    }

    #[test]
    fn still_block_is_never_active() {
        let frame = MotionVectorFrame::new(2, 2);
        let mut noise = NoiseModel::new(50);
        noise.update(&frame);

        let active = activity_mask(&frame.magnitude(), &noise);
        assert!(active.iter().all(|&a| !a));
    }
}
