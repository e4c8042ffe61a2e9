//! Find the thermal camera among the video devices.
//!
//! On Linux the USB vendor/product of every video4linux node
//! is read from sysfs. Where that fails, device indices are
//! probed and the camera is recognised by its characteristic
//! resolution and frame rate.
use std::{
    fs,
    path::{Path, PathBuf},
};

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info};

use super::CaptureFormat;

pub const SYSFS_VIDEO: &str = "/sys/class/video4linux";

/// Consecutive failed probes after which probing stops.
pub const MAX_PROBE_FAILURES: usize = 10;
const MAX_PROBE_INDEX: u32 = 64;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KnownCamera {
    pub name: &'static str,
    pub vendor: u16,
    pub product: u16,
    pub format: CaptureFormat,
}

pub const KNOWN_CAMERAS: &[KnownCamera] = &[KnownCamera {
    name: "TC001",
    vendor: 0x0bda,
    product: 0x5830,
    format: CaptureFormat::TC001,
}];

lazy_static! {
    static ref PRODUCT_RE: Regex =
        Regex::new(r"(?m)^PRODUCT=([0-9a-fA-F]{1,4})/([0-9a-fA-F]{1,4})").unwrap();
}

/// USB vendor and product from a sysfs `uevent` file.
pub fn parse_uevent(content: &str) -> Option<(u16, u16)> {
    let caps = PRODUCT_RE.captures(content)?;
    let vendor = u16::from_str_radix(&caps[1], 16).ok()?;
    let product = u16::from_str_radix(&caps[2], 16).ok()?;
    Some((vendor, product))
}

/// A matched device node.
#[derive(Clone, Debug, PartialEq)]
pub struct Discovered {
    pub camera: KnownCamera,
    pub node: PathBuf,
}

/// Scan `root` (normally [`SYSFS_VIDEO`]) for a known
/// camera. Only capture nodes (`index` 0, when reported)
/// are considered.
pub fn scan_sysfs(root: &Path, cameras: &[KnownCamera]) -> Option<Discovered> {
    let mut entries: Vec<PathBuf> = match fs::read_dir(root) {
        Ok(dir) => dir.filter_map(|e| e.ok().map(|e| e.path())).collect(),
        Err(e) => {
            debug!("cannot read {}: {}", root.display(), e);
            return None;
        }
    };
    entries.sort();

    for path in entries {
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) if n.starts_with("video") => n.to_string(),
            _ => continue,
        };
        let ids = match fs::read_to_string(path.join("device/uevent")) {
            Ok(content) => parse_uevent(&content),
            Err(_) => continue,
        };
        let (vendor, product) = match ids {
            Some(ids) => ids,
            None => continue,
        };
        if let Ok(index) = fs::read_to_string(path.join("index")) {
            if index.trim() != "0" {
                continue;
            }
        }
        if let Some(camera) = cameras
            .iter()
            .find(|c| c.vendor == vendor && c.product == product)
        {
            info!("found {} at {}", camera.name, name);
            return Some(Discovered {
                camera: *camera,
                node: Path::new("/dev").join(&name),
            });
        }
    }
    None
}

/// Probe indices `0, 1, ..` with `probe` until
/// [`MAX_PROBE_FAILURES`] consecutive indices fail, then
/// match the working devices against `cameras`.
pub fn probe_indices<F>(cameras: &[KnownCamera], mut probe: F) -> Option<(u32, KnownCamera)>
where
    F: FnMut(u32) -> Option<CaptureFormat>,
{
    let mut working = vec![];
    let mut failures = 0;
    let mut index = 0;
    while failures < MAX_PROBE_FAILURES && index < MAX_PROBE_INDEX {
        match probe(index) {
            Some(format) => {
                debug!(
                    "device {}: {}x{} @ {:.1} fps",
                    index, format.width, format.height, format.fps
                );
                working.push((index, format));
                failures = 0;
            }
            None => failures += 1,
        }
        index += 1;
    }

    cameras.iter().find_map(|camera| {
        working
            .iter()
            .find(|(_, format)| format.matches(&camera.format))
            .map(|(index, _)| (*index, *camera))
    })
}
