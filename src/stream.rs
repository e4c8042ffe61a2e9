//! Live delivery: JPEG encoding, a latest-frame slot and a
//! send-rate throttle.
use std::{
    io::Write,
    time::{Duration, Instant},
};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use image::{codecs::jpeg::JpegEncoder, ColorType, RgbImage};
use tracing::debug;

use crate::error::Result;

pub const BOUNDARY: &str = "frame";
pub const DEFAULT_QUALITY: u8 = 90;

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).encode(
        image.as_raw(),
        image.width(),
        image.height(),
        ColorType::Rgb8,
    )?;
    Ok(buf)
}

/// Write one `multipart/x-mixed-replace` part.
pub fn write_mjpeg_part<W: Write>(out: &mut W, jpeg: &[u8]) -> Result<()> {
    write!(out, "--{}\r\nContent-Type: image/jpeg\r\n\r\n", BOUNDARY)?;
    out.write_all(jpeg)?;
    out.write_all(b"\r\n")?;
    Ok(())
}

pub fn mjpeg_content_type() -> String {
    format!("multipart/x-mixed-replace; boundary={}", BOUNDARY)
}

/// JPEG as base64 text, for push transports that carry
/// strings.
pub fn base64_payload(jpeg: &[u8]) -> String {
    base64::encode(jpeg)
}

/// Single-slot broadcaster. Publishing never blocks: when
/// the slot is full the older frame is dropped.
#[derive(Clone, Debug)]
pub struct LatestFrame<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Default for LatestFrame<T> {
    fn default() -> Self {
        let (tx, rx) = bounded(1);
        LatestFrame { tx, rx }
    }
}

impl<T> LatestFrame<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, frame: T) {
        let mut frame = frame;
        loop {
            match self.tx.try_send(frame) {
                Ok(()) => return,
                Err(TrySendError::Full(f)) => {
                    if self.rx.try_recv().is_ok() {
                        debug!("dropped stale frame");
                    }
                    frame = f;
                }
                // unreachable while `self.rx` is alive
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    pub fn subscribe(&self) -> Receiver<T> {
        self.rx.clone()
    }

    pub fn take(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

/// Pure time gate: passes at most one frame per interval.
#[derive(Clone, Debug)]
pub struct FrameThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl FrameThrottle {
    /// `fps <= 0` disables throttling.
    pub fn new(fps: f64) -> Self {
        let interval = if fps > 0. {
            Duration::from_secs_f64(1. / fps)
        } else {
            Duration::default()
        };
        FrameThrottle {
            interval,
            last: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn ready_at(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    pub fn ready(&mut self) -> bool {
        self.ready_at(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::thread;

    #[test]
    fn keeps_only_latest() {
        let slot = LatestFrame::new();
        for i in 0..5 {
            slot.publish(i);
        }
        assert_eq!(slot.take(), Some(4));
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn slow_consumer_does_not_block_producer() {
        let slot = LatestFrame::new();
        let rx = slot.subscribe();
        let producer = {
            let slot = slot.clone();
            thread::spawn(move || {
                for i in 0..1000 {
                    slot.publish(i);
                }
            })
        };
        producer.join().unwrap();
        assert_eq!(rx.try_recv().ok(), Some(999));
    }

    #[test]
    fn throttle_gates_by_time() {
        let mut throttle = FrameThrottle::new(10.);
        let t0 = Instant::now();
        assert!(throttle.ready_at(t0));
        assert!(!throttle.ready_at(t0 + Duration::from_millis(50)));
        assert!(throttle.ready_at(t0 + Duration::from_millis(100)));
        assert!(!throttle.ready_at(t0 + Duration::from_millis(150)));

        let mut open = FrameThrottle::new(0.);
        assert!(open.ready_at(t0));
        assert!(open.ready_at(t0));
    }

    #[test]
    fn multipart_framing() {
        let mut out = Vec::new();
        write_mjpeg_part(&mut out, b"JPEG").unwrap();
        assert_eq!(out, b"--frame\r\nContent-Type: image/jpeg\r\n\r\nJPEG\r\n".to_vec());
        assert_eq!(mjpeg_content_type(), "multipart/x-mixed-replace; boundary=frame");
    }

    #[test]
    fn jpeg_roundtrips_dimensions() {
        let img = RgbImage::from_pixel(32, 24, Rgb([200, 10, 10]));
        let jpeg = encode_jpeg(&img, DEFAULT_QUALITY).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
        assert!(base64_payload(&jpeg).starts_with("/9j/"));
    }
}
