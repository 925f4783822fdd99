use anyhow::{Context, Result};
use rttconfig::SessionConfig;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::window;

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli)?;
    tracing::debug!(
        width = config.display.width,
        height = config.display.height,
        scale = config.display.scale,
        invert_y = config.blit.invert_y,
        frames = config.run.frames,
        "resolved session configuration"
    );

    if cli.print_config {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    window::run(&config)
}

/// The configuration file (or defaults), with command-line flags on top.
fn resolve_config(cli: &Cli) -> Result<SessionConfig> {
    let mut config = match &cli.config {
        Some(path) => SessionConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => SessionConfig::default(),
    };

    if let Some((width, height)) = cli.size {
        config.display.width = f64::from(width);
        config.display.height = f64::from(height);
    }
    if let Some(scale) = cli.scale {
        config.display.scale = scale;
    }
    if cli.invert_y {
        config.blit.invert_y = true;
    }
    if let Some(frames) = cli.frames {
        config.run.frames = frames;
    }
    if let Some(capture) = &cli.capture {
        config.run.capture = Some(capture.clone());
    }

    config.validate().context("invalid command-line override")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use clap::Parser;

    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("rttview").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_apply_without_a_config_file() {
        let config = resolve_config(&cli(&[])).unwrap();
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn flags_override_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        fs::write(
            &path,
            "version = 1\n[display]\nwidth = 640\nheight = 480\nscale = 2.0\n[run]\nframes = 10\n",
        )
        .unwrap();

        let config = resolve_config(&cli(&[
            "--config",
            path.to_str().unwrap(),
            "--size",
            "100x50",
            "--capture",
            "out.png",
        ]))
        .unwrap();

        assert_eq!(config.display.width, 100.0);
        assert_eq!(config.display.height, 50.0);
        assert_eq!(config.display.scale, 2.0);
        assert_eq!(config.run.frames, 10);
        assert_eq!(config.run.capture.as_deref(), Some(Path::new("out.png")));
    }

    #[test]
    fn invalid_override_is_rejected() {
        let err = resolve_config(&cli(&["--scale", "0"])).unwrap_err();
        assert!(format!("{err:#}").contains("display.scale"));
    }
}
