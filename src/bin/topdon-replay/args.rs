use anyhow::{ensure, Result};
use clap::value_t_or_exit;
use std::path::PathBuf;
use topdon::{arg, args_parser, cli::load_settings, config::Settings, opt};

pub struct Args {
    pub settings: Settings,
    pub input: PathBuf,
    pub stats: Option<PathBuf>,
    pub record: bool,
    pub snapshot_every: Option<usize>,
}

impl Args {
    pub fn from_cmd_line() -> Result<Args> {
        let matches = args_parser!("topdon-replay")
            .setting(clap::AppSettings::AllowLeadingHyphen)
            .about("Decode a raw frame dump offline and write per-frame statistics as CSV.")
            .arg(
                opt!("config")
                    .short("c")
                    .help("JSON settings file (default: topdon.json if present)"),
            )
            .arg(opt!("scale").short("s").help("Display scale factor, 1 to 5"))
            .arg(opt!("colormap").help("Palette index, 0 to 10"))
            .arg(
                opt!("output dir")
                    .short("o")
                    .help("Directory for recordings and snapshots"),
            )
            .arg(opt!("temp offset").help("Offset added to every temperature"))
            .arg(
                opt!("stats")
                    .help("Write statistics to this file (default: stdout)"),
            )
            .arg(
                opt!("record")
                    .short("r")
                    .takes_value(false)
                    .help("Record the rendered frames to the output directory"),
            )
            .arg(
                opt!("snapshot every")
                    .help("Take a snapshot after every N frames"),
            )
            .arg(
                arg!("input")
                    .required(true)
                    .help("Raw frame dump (frames of 2 * H * W * 2 bytes)"),
            )
            .get_matches();

        let settings = load_settings(&matches)?;
        let input = value_t_or_exit!(matches, "input", PathBuf);
        let stats = matches.value_of("stats").map(PathBuf::from);
        let record = matches.is_present("record");
        let snapshot_every = matches
            .is_present("snapshot every")
            .then(|| value_t_or_exit!(matches.value_of("snapshot every"), usize));
        if let Some(n) = snapshot_every {
            ensure!(n > 0, "--snapshot-every must be positive");
        }

        Ok(Args {
            settings,
            input,
            stats,
            record,
            snapshot_every,
        })
    }
}
