use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "rttview",
    author,
    version,
    about = "Render a demo scene offscreen and composite it into a window"
)]
pub struct Cli {
    /// Session configuration file (TOML).
    #[arg(long, value_name = "PATH", env = "RTTVIEW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Logical window size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_dimensions)]
    pub size: Option<(u32, u32)>,

    /// Physical pixels per logical pixel for the offscreen target.
    #[arg(long, value_name = "FACTOR")]
    pub scale: Option<f64>,

    /// Flip the composited image vertically.
    #[arg(long)]
    pub invert_y: bool,

    /// Exit after rendering this many frames (0 runs until closed).
    #[arg(long, value_name = "N")]
    pub frames: Option<u64>,

    /// Write the last rendered frame to a PNG file.
    #[arg(long, value_name = "PATH")]
    pub capture: Option<PathBuf>,

    /// Print the resolved configuration as TOML and exit.
    #[arg(long)]
    pub print_config: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}

fn parse_dimensions(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WIDTHxHEIGHT".to_string())?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| "invalid width".to_string())?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| "invalid height".to_string())?;
    if width == 0 || height == 0 {
        return Err("dimensions must be greater than zero".into());
    }
    Ok((width, height))
}
