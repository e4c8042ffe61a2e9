mod args;

use std::{
    io::{self, BufRead, Write},
    sync::Arc,
    thread,
};

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use tracing::{info, warn};

use args::Args;
use topdon::{
    capture,
    cli::stop_on_signal,
    logger,
    pipeline::FrameLoop,
    session::{Command, SessionState},
    stream::{
        encode_jpeg, mjpeg_content_type, write_mjpeg_part, FrameThrottle, LatestFrame,
        DEFAULT_QUALITY,
    },
};

fn main() -> Result<()> {
    logger::init();
    let Args { settings, device } = Args::from_cmd_line()?;

    let session = Arc::new(settings.session());
    let mut capture = capture::open(&device, settings.geometry(), settings.capture_fps)
        .with_context(|| format!("could not open camera {}", device))?;

    stop_on_signal(session.clone())?;
    spawn_control(session.clone());
    let latest = LatestFrame::new();
    let writer = spawn_writer(latest.subscribe(), session.clone());
    info!("streaming {} to stdout", mjpeg_content_type());

    let mut throttle = FrameThrottle::new(settings.stream_fps);
    let mut frames = FrameLoop::new(&settings, session);
    let count = frames.run(&mut capture, |out| {
        if throttle.ready() {
            latest.publish(encode_jpeg(&out.image, DEFAULT_QUALITY)?);
        }
        Ok(())
    })?;

    drop(latest);
    if writer.join().is_err() {
        warn!("stream writer panicked");
    }
    info!("processed {} frames", count);
    Ok(())
}

/// Apply one JSON command per stdin line.
fn spawn_control(session: Arc<SessionState>) {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("control input closed: {}", e);
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Command>(&line) {
                Ok(cmd) => {
                    if let Err(e) = session.apply(cmd) {
                        warn!("{:?} failed: {}", cmd, e);
                    }
                }
                Err(e) => warn!("invalid command {:?}: {}", line, e),
            }
        }
    });
}

fn spawn_writer(frames: Receiver<Vec<u8>>, session: Arc<SessionState>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        for jpeg in frames.iter() {
            let written = write_mjpeg_part(&mut out, &jpeg).and_then(|_| Ok(out.flush()?));
            if let Err(e) = written {
                warn!("stream closed: {}", e);
                session.request_stop();
                break;
            }
        }
    })
}
