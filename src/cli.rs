//! Helpers to parse CLI arguments in the accompanying
//! binaries.
//!
//! APIs here shouldn't be considered stable / used as a
//! library.
use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use anyhow::{Context, Result};
pub use clap::{App, Arg, ArgMatches};
use indicatif::{ProgressBar, ProgressStyle};
pub use inflector::Inflector;

use tracing::{info, warn};

use crate::{config::Settings, session::SessionState};

#[macro_export]
macro_rules! args_parser {
    ($name:expr) => {{
        $crate::cli::App::new($name)
            .version(clap::crate_version!())
            .author(clap::crate_authors!())
    }};
}

#[macro_export]
macro_rules! arg {
    ($name:expr) => {{
        use $crate::cli::Inflector;
        $crate::cli::Arg::with_name($name).value_name(&$name.to_screaming_snake_case())
    }};
}

#[macro_export]
macro_rules! opt {
    ($name:expr) => {{
        use $crate::cli::Inflector;
        $crate::cli::Arg::with_name($name)
            .long(&$name.to_kebab_case())
            .value_name(&$name.to_screaming_snake_case())
    }};
}

fn parse_value<T>(matches: &ArgMatches, name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    matches
        .value_of(name)
        .map(|v| {
            v.parse::<T>()
                .with_context(|| format!("invalid --{}: {}", name.to_kebab_case(), v))
        })
        .transpose()
}

/// Load the settings file (`--config`, default
/// `topdon.json`) and apply the overrides common to the
/// binaries: `--scale`, `--colormap`, `--output-dir` and
/// `--temp-offset`.
pub fn load_settings(matches: &ArgMatches) -> Result<Settings> {
    let path = matches.value_of("config").unwrap_or("topdon.json");
    let mut settings =
        Settings::load(Path::new(path)).with_context(|| format!("could not load {}", path))?;

    if let Some(scale) = parse_value(matches, "scale")? {
        settings.scale = scale;
    }
    if let Some(colormap) = parse_value(matches, "colormap")? {
        settings.colormap = colormap;
    }
    if let Some(dir) = matches.value_of("output dir") {
        settings.output_dir = dir.into();
    }
    if let Some(offset) = parse_value(matches, "temp offset")? {
        settings.temp_offset = offset;
    }
    settings.validate()?;
    Ok(settings)
}

pub fn progress_bar(len: u64) -> ProgressBar {
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {wide_bar:cyan/blue} {pos:>7}/{len:7}"),
    );
    bar
}

/// Turn SIGINT / SIGTERM into a stop request so the frame
/// loop ends through its normal teardown. A second signal
/// exits immediately.
pub fn stop_on_signal(session: Arc<SessionState>) -> Result<()> {
    let signals = AtomicUsize::new(0);
    ctrlc::set_handler(move || {
        if signals.fetch_add(1, Ordering::SeqCst) == 0 {
            info!("got interrupt, stopping");
            session.request_stop();
        } else {
            warn!("second interrupt, exiting without cleanup");
            std::process::exit(130);
        }
    })
    .context("could not install signal handler")
}
