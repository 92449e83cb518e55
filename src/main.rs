use clap::Parser;
use env_logger::Env;
use log::{error, info};
use snare::configuration::config::{parse_port_list, Config};
use snare::controller::controller_handler::Controller;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "snare")]
#[command(version)]
#[command(about = "A low-interaction SSH/RDP honeypot with live event streaming")]
struct Args {
    /// TOML configuration file; built-in defaults when absent
    #[arg(env = "SNARE_CONFIG")]
    config_file: Option<PathBuf>,

    /// Comma separated ports, only matching services stay enabled
    #[arg(long, env = "HONEYPOT_PORTS")]
    ports: Option<String>,

    /// SQLite database file
    #[arg(long, env = "DB_PATH")]
    db_path: Option<PathBuf>,

    /// Capture byte budget of every emulator
    #[arg(long, env = "PAYLOAD_PREVIEW_BYTES")]
    payload_preview_bytes: Option<usize>,

    #[arg(long)]
    web_port: Option<u16>,
}

fn load_config(args: &Args) -> Result<Config, snare::error_handling::types::ConfigError> {
    let mut config = match &args.config_file {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    if let Some(ports) = &args.ports {
        config.restrict_to_ports(&parse_port_list(ports)?);
    }
    if let Some(path) = &args.db_path {
        config.set_database_path(path);
    }
    if let Some(bytes) = args.payload_preview_bytes {
        config.set_capture_bytes(bytes);
    }
    if let Some(port) = args.web_port {
        config.web.port = port;
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_target(false)
        .init();

    println!(
        "
==============================================================================
   ___ _ __   __ _ _ __ ___
  / __| '_ \\ / _` | '__/ _ \\
  \\__ \\ | | | (_| | | |  __/
  |___/_| |_|\\__,_|_|  \\___|      low-interaction honeypot v{}
==============================================================================
",
        env!("CARGO_PKG_VERSION")
    );

    let args = Args::parse();

    info!("Importing configuration");
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Unable to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!("Configuration imported successfully");

    let controller = match Controller::new(config).await {
        Ok(controller) => controller,
        Err(e) => {
            error!("Unable to create a controller instance: {}, exiting...", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = controller.run().await {
        error!("Error occured in the controller process: {}, exiting...", e);
        std::process::exit(1);
    }
}
