use std::{env, process, str::FromStr as _};

use clap::Parser as _;
use tracing::{debug, trace};

use crate::{
    app_info::AppInfo,
    cli::{Cli, Commands},
    commands::{config as config_command, serve, sync, version},
    config::Config,
    environment::Environment,
    log_shipper::LogShipper,
    module::Module,
    setup_tracing::setup_tracing_for_command,
};

const ENVIRONMENT_VARIABLE: &str = "APP_ENVIRONMENT";

/// Configuration for bootstrapping a service.
///
/// Contains the service metadata and the modules that make up its API.
pub struct BootConfig {
    pub app_info: AppInfo,
    pub modules: Vec<Module>,
}

impl BootConfig {
    #[must_use]
    pub const fn new(app_info: AppInfo, modules: Vec<Module>) -> Self {
        Self { app_info, modules }
    }
}

pub async fn boot(config: BootConfig) {
    let cli = Cli::parse();

    if matches!(cli.command, Some(Commands::Version)) {
        version::print_version_info(config.app_info);
        return;
    }

    let dotenv = dotenvy::dotenv();

    let environment = set_environment();

    let app_config = match Config::load(&environment, config.app_info.name) {
        Ok(app_config) => app_config,
        Err(error) => {
            eprintln!("❌ Configuration error: {error}");
            process::exit(1);
        }
    };

    let log_shipper = setup_tracing_for_command(
        &cli.command,
        environment,
        &app_config.tracing,
        &app_config.service.name,
    );

    match dotenv {
        Ok(path) => debug!("Loaded environment from {}", path.display()),
        Err(error) if error.not_found() => trace!("No .env file found"),
        Err(error) => tracing::warn!("Failed to load .env file: {error}"),
    }

    debug!("Environment set to: {:?}", environment);
    trace!("Configuration loaded: {:?}", app_config.redacted());

    handle_command(environment, app_config, cli, config, log_shipper).await;
}

#[must_use]
pub fn set_environment() -> Environment {
    env::var(ENVIRONMENT_VARIABLE)
        .ok()
        .and_then(|s| Environment::from_str(&s).ok())
        .unwrap_or_default()
}

pub async fn handle_command(
    environment: Environment,
    app_config: Config,
    cli: Cli,
    boot_config: BootConfig,
    log_shipper: Option<LogShipper>,
) {
    match cli.command {
        Some(Commands::Sync { alter }) => {
            sync::handle_sync_command(&app_config, &boot_config.modules, alter).await;
        }
        Some(Commands::Config) => {
            config_command::print_config(&app_config, environment);
        }
        Some(Commands::Version) => {
            version::print_version_info(boot_config.app_info);
        }
        Some(Commands::Serve) | None => {
            serve::handle_serve_command(
                environment,
                app_config,
                boot_config.app_info,
                boot_config.modules,
                log_shipper,
            )
            .await;
        }
    }
}
