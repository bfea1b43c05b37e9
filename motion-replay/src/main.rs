//! Replay a motion vector capture log through the motion analyzer.

use clap::*;
use itertools::*;
use log::*;
use mvcam::prelude::v1::{Result, *};

/// Merge motion ranges separated by at most `max_frame_gap` frames, and drop the ones shorter
/// than `min_frames`.
fn filtered_motion_ranges(
    ranges: &[(usize, usize)],
    max_frame_gap: usize,
    min_frames: usize,
) -> impl Iterator<Item = (usize, usize)> + '_ {
    ranges
        .iter()
        .copied()
        .coalesce(move |(a1, a2), (b1, b2)| {
            if b1 - a2 <= max_frame_gap {
                Ok((a1, b2))
            } else {
                Err(((a1, a2), (b1, b2)))
            }
        })
        .filter(move |(s, e)| e - s >= min_frames)
}

fn timestamp(frame: usize, fps: Option<f64>) -> String {
    match fps {
        Some(fps) => format!("{frame} ({:.2}s)", frame as f64 / fps),
        None => frame.to_string(),
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let defaults = Settings::default();
    let (area, frames, window) = (
        defaults.area.to_string(),
        defaults.frames.to_string(),
        defaults.window().to_string(),
    );

    let matches = Command::new("motion-replay")
        .version(crate_version!())
        .arg(Arg::new("input").takes_value(true).required(true))
        .arg(
            Arg::new("area")
                .long("area")
                .short('a')
                .takes_value(true)
                .default_value(&area),
        )
        .arg(
            Arg::new("frames")
                .long("frames")
                .short('f')
                .takes_value(true)
                .default_value(&frames),
        )
        .arg(
            Arg::new("window")
                .long("window")
                .short('w')
                .takes_value(true)
                .default_value(&window),
        )
        .arg(Arg::new("fps").long("fps").takes_value(true))
        .arg(
            Arg::new("eight")
                .long("eight")
                .help("Connect diagonally adjacent blocks"),
        )
        .arg(
            Arg::new("max-gap")
                .long("max-gap")
                .takes_value(true)
                .default_value("0"),
        )
        .arg(
            Arg::new("min-frames")
                .long("min-frames")
                .takes_value(true)
                .default_value("0"),
        )
        .arg(Arg::new("save").long("save").short('s').takes_value(true))
        .get_matches();

    let input = matches
        .value_of("input")
        .ok_or_else(|| anyhow!("Please supply a capture log!"))?;
    let area: usize = matches.value_of_t("area")?;
    let frames: usize = matches.value_of_t("frames")?;
    let window: usize = matches.value_of_t("window")?;
    let max_gap: usize = matches.value_of_t("max-gap")?;
    let min_frames: usize = matches.value_of_t("min-frames")?;
    let fps: Option<f64> = matches.value_of("fps").map(str::parse).transpose()?;

    if frames == 0 || frames > window {
        return Err(anyhow!(
            "frame threshold {} must be within the {} frame window",
            frames,
            window
        ));
    }

    let mut source = motion_loader::create_source(input)?;
    let fps = fps.or_else(|| source.get_framerate());

    let connectivity = if matches.is_present("eight") {
        Connectivity::Eight
    } else {
        Connectivity::Four
    };

    let mut analyzer = MotionAnalyzer::new(window, area, frames).with_connectivity(connectivity);

    if let Some(save) = matches.value_of("save") {
        analyzer.save_motion_vectors(save)?;
    }

    let trigger = analyzer.trigger();

    let mut frame = MotionVectorFrame::default();
    let mut ranges = vec![];
    let mut start = None;
    let mut cnt = 0usize;

    while source.process_frame(&mut frame)? {
        analyzer.analyze(&frame);

        match (start, trigger.is_set()) {
            (None, true) => {
                println!("{}: motion ({} blocks)", timestamp(cnt, fps), analyzer.last_largest());
                start = Some(cnt);
            }
            (Some(s), false) => {
                println!("{}: still", timestamp(cnt, fps));
                ranges.push((s, cnt));
                start = None;
            }
            _ => {}
        }

        cnt += 1;
    }

    if let Some(s) = start {
        ranges.push((s, cnt));
    }

    info!("{} frames analyzed", cnt);

    if let Some((rows, cols)) = source.get_grid() {
        info!("{}x{} grid, noise shift {}", rows, cols, analyzer.noise().shift());
    }

    println!("Motion ranges:");

    for (s, e) in filtered_motion_ranges(&ranges, max_gap, min_frames) {
        println!("{} - {}", timestamp(s, fps), timestamp(e, fps));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coalesces_ranges() {
        let ranges = [(0, 10), (12, 20), (40, 42), (60, 80)];

        let merged = filtered_motion_ranges(&ranges, 5, 0).collect::<Vec<_>>();
        assert_eq!(merged, [(0, 20), (40, 42), (60, 80)]);

        let long = filtered_motion_ranges(&ranges, 5, 10).collect::<Vec<_>>();
        assert_eq!(long, [(0, 20), (60, 80)]);
    }

    #[test]
    fn formats_timestamps() {
        assert_eq!(timestamp(25, Some(10.0)), "25 (2.50s)");
        assert_eq!(timestamp(25, None), "25");
    }
}
