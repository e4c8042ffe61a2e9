use anyhow::Result;
use topdon::{
    arg, args_parser, capture::DeviceSelector, cli::load_settings, config::Settings, opt,
};

pub struct Args {
    pub settings: Settings,
    pub device: DeviceSelector,
}

impl Args {
    pub fn from_cmd_line() -> Result<Args> {
        let matches = args_parser!("topdon-stream")
            .setting(clap::AppSettings::AllowLeadingHyphen)
            .about(
                "Stream the annotated thermal view as MJPEG on stdout. \
                 Reads JSON control commands from stdin.",
            )
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
            .arg(opt!("fps").help("Cap on streamed frames per second (default: no cap)"))
            .arg(
                arg!("camera")
                    .help("Device: -1 to scan, an index, a device path or a raw frame dump"),
            )
            .get_matches();

        let mut settings = load_settings(&matches)?;
        if let Some(fps) = matches.value_of("fps") {
            settings.stream_fps = fps.parse()?;
        }
        if let Some(camera) = matches.value_of("camera") {
            settings.camera = camera.into();
        }
        let device = settings.device()?;

        Ok(Args { settings, device })
    }
}
