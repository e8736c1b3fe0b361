#[cfg(not(target_arch = "wasm32"))]
use std::env;

#[cfg(not(target_arch = "wasm32"))]
use anyhow::{anyhow, Context, Result};
#[cfg(not(target_arch = "wasm32"))]
use log::{error, info};

#[cfg(not(target_arch = "wasm32"))]
use xr_viewer::ViewerConfig;

#[cfg(not(target_arch = "wasm32"))]
const USAGE: &str = "Usage: xr-viewer [--config <file.json>] [--flat] [--no-antialias] [--print-config]";

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::init();
    if let Err(err) = run() {
        error!("{err:#}");
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
fn run() -> Result<()> {
    let options = CliOptions::parse(env::args().skip(1))?;
    let config = options.resolve_config()?;

    if options.print_config {
        println!("{}", config.to_json_pretty()?);
        return Ok(());
    }

    info!("Starting viewer on surface `{}`", config.canvas_id);
    xr_viewer::app::run(config)
}

#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Default, PartialEq)]
struct CliOptions {
    config_path: Option<String>,
    flat: bool,
    no_antialias: bool,
    print_config: bool,
}

#[cfg(not(target_arch = "wasm32"))]
impl CliOptions {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut options = Self::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    let Some(path) = args.next() else {
                        return Err(anyhow!("--config expects a file path\n{USAGE}"));
                    };
                    options.config_path = Some(path);
                }
                "--flat" => options.flat = true,
                "--no-antialias" => options.no_antialias = true,
                "--print-config" => options.print_config = true,
                "-h" | "--help" => return Err(anyhow!("{USAGE}")),
                other => return Err(anyhow!("Unknown argument: {other}\n{USAGE}")),
            }
        }
        Ok(options)
    }

    /// Loads the config file, if any, then applies flag overrides.
    fn resolve_config(&self) -> Result<ViewerConfig> {
        let mut config = match self.config_path.as_deref() {
            Some(path) => ViewerConfig::load(path)
                .with_context(|| format!("failed to load config {path}"))?,
            None => ViewerConfig::default(),
        };
        if self.flat {
            config.xr.flat_fallback = true;
        }
        if self.no_antialias {
            config.engine.antialias = false;
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}
