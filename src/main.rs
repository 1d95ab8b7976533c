//! typemq - a schema-aware MQTT broker.

use std::path::Path;
use std::sync::Arc;

use log::{error, info, warn};

use typemq::config::Config;
use typemq::registry::SchemaRegistry;
use typemq::server::Server;

const HELP: &str = "\
typemq - Schema-aware MQTT broker

Usage: typemq [OPTIONS]

Options:
  -c, --config <FILE>     Config file path (default: typemq.toml)
  -h, --help              Show this help message

The config file is TOML. Any setting can be overridden through the
environment with a TYPEMQ__ prefix and __ between nesting levels:

  TYPEMQ__SERVER__BIND=0.0.0.0:1884
  TYPEMQ__SCHEMA__DIR=/etc/typemq/schemas
  TYPEMQ__LOG__LEVEL=debug
";

fn usage_error(msg: &str) -> ! {
    eprintln!("{}", msg);
    eprintln!("Use --help for usage information");
    std::process::exit(1);
}

/// Returns the config file path. Everything else lives in the config file
/// or the environment.
fn parse_args() -> String {
    let mut config_path = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print!("{}", HELP);
                std::process::exit(0);
            }
            "-c" | "--config" => match args.next() {
                Some(path) => config_path = Some(path),
                None => usage_error("Error: -c requires a file path"),
            },
            other => usage_error(&format!("Unknown argument: {}", other)),
        }
    }

    config_path.unwrap_or_else(|| "typemq.toml".to_string())
}

fn main() {
    let config_path = parse_args();

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(&config.log.level),
    )
    .init();

    // Load schemas before the listener comes up so discovery answers are
    // complete from the first connection on.
    let mut registry = SchemaRegistry::new(Path::new(&config.schema.dir));
    match registry.load_from_directory() {
        Ok(loaded) => info!(
            "loaded {} schema files from {} ({} message types)",
            loaded,
            config.schema.dir,
            registry.schema_count()
        ),
        Err(e) => warn!("schema directory {}: {}", config.schema.dir, e),
    }

    for binding in &config.schema.bindings {
        match registry.bind_topic(&binding.topic, &binding.message_type) {
            Ok(()) => info!("bound topic {} to {}", binding.topic, binding.message_type),
            Err(e) => warn!("skipping binding for {}: {}", binding.topic, e),
        }
    }

    let config = Arc::new(config);

    let mut server = match Server::new(config, registry) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
