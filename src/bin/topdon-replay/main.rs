mod args;

use std::{
    fs::{self, File},
    io::{self, Write},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};

use args::Args;
use topdon::{
    capture::{CaptureHandle, FrameReader},
    cli::{progress_bar, stop_on_signal},
    logger,
    pipeline::FrameLoop,
    record::StatsRecord,
    session::Command,
};

fn main() -> Result<()> {
    logger::init();
    let Args {
        settings,
        input,
        stats,
        record,
        snapshot_every,
    } = Args::from_cmd_line()?;

    let geometry = settings.geometry();
    let total = fs::metadata(&input)
        .with_context(|| format!("could not read {}", input.display()))?
        .len()
        / geometry.frame_len() as u64;
    let bar = progress_bar(total);

    let session = Arc::new(settings.session());
    stop_on_signal(session.clone())?;
    if record {
        session.apply(Command::ToggleRecording)?;
    }

    let reader = FrameReader::open(&input, geometry, settings.capture_fps)?;
    let mut capture = CaptureHandle::new(&input.display().to_string(), Box::new(reader));

    let out: Box<dyn Write> = match &stats {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(io::stdout()),
    };
    let mut wtr = csv::Writer::from_writer(out);

    let frame_time = 1. / settings.capture_fps;
    let mut index = 0usize;
    let mut frames = FrameLoop::new(&settings, session.clone());
    let count = frames.run(&mut capture, |out| {
        let elapsed = Duration::from_secs_f64(index as f64 * frame_time);
        wtr.serialize(StatsRecord::new(&out.stats, elapsed))?;
        index += 1;
        if let Some(n) = snapshot_every {
            if index % n == 0 {
                session.apply(Command::Snapshot)?;
            }
        }
        bar.inc(1);
        Ok(())
    })?;
    wtr.flush()?;
    bar.finish();

    eprintln!("Processed {} of {} frames", count, total);
    Ok(())
}
