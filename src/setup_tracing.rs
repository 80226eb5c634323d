use time::{macros::format_description, UtcOffset};
use tracing_subscriber::{
    filter::Directive,
    fmt::time::OffsetTime,
    layer::{Layered, SubscriberExt as _},
    util::SubscriberInitExt as _,
    EnvFilter, Layer, Registry,
};

use crate::{
    cli::Commands, config::TracingConfig, environment::Environment, log_shipper::LogShipper,
};

type BoxedLayer = Box<dyn Layer<Layered<EnvFilter, Registry>> + Send + Sync>;

// Noisy third-party targets
const DIRECTIVES: &[&str] = &["sqlx::postgres::notice=warn", "sqlx::query=warn"];

/// Installs the global subscriber.
///
/// Returns the remote log shipper when `LOGGER_URL` is configured and the
/// command runs the server.
pub fn setup_tracing_for_command(
    command: &Option<Commands>,
    environment: Environment,
    config: &TracingConfig,
    service_name: &str,
) -> Option<LogShipper> {
    // CLI commands stay quiet; RUST_LOG overrides everything
    let default_level = match command {
        Some(Commands::Sync { .. }) => "warn",
        Some(Commands::Config | Commands::Version) => "error",
        Some(Commands::Serve) | None => config.log_level.as_str(),
    };

    let env_filter = DIRECTIVES
        .iter()
        .filter_map(|directive| directive.parse::<Directive>().ok())
        .fold(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
            EnvFilter::add_directive,
        );

    let fmt_layer: BoxedLayer = if environment.is_production() {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_ansi(true)
            .with_timer(OffsetTime::new(
                UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC),
                format_description!("[hour]:[minute]:[second].[subsecond digits:2]"),
            ))
            .compact()
            .boxed()
    };

    let shipper = match (&config.logger_url, command) {
        (Some(url), Some(Commands::Serve) | None) => {
            match LogShipper::spawn(url.clone(), config.logger_api_key.clone(), service_name) {
                Ok(shipper) => Some(shipper),
                Err(error) => {
                    eprintln!("⚠️  Remote logging disabled: {error}");
                    None
                }
            }
        }
        _ => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(shipper.as_ref().map(LogShipper::layer))
        .init();

    shipper
}
