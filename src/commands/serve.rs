use std::{io, net::SocketAddr, process, time::Duration};

use axum::Router;
use tokio::{net::TcpListener, signal};
use tracing::{error, info, warn};

use crate::{
    app::App,
    app_info::AppInfo,
    config::Config,
    database::{DatabaseManager, SyncOptions},
    environment::Environment,
    log_shipper::LogShipper,
    module::Module,
    router::router,
};

const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Connects to the database and registers the models of every module.
pub async fn connect_database(
    config: &Config,
    modules: &[Module],
) -> Result<DatabaseManager, sea_orm::DbErr> {
    let mut db = DatabaseManager::connect(&config.database).await?;
    for module in modules {
        db.register_models(&module.models);
    }

    Ok(db)
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Failed to connect to the database: {0}")]
    Connect(#[source] sea_orm::DbErr),
    #[error("Database is not reachable: {0}")]
    Unreachable(#[source] sea_orm::DbErr),
    #[error("Database sync failed: {0}")]
    Sync(#[source] sea_orm::DbErr),
}

/// Connects, verifies the connection and syncs tables when `DB_SYNC` is set.
pub async fn prepare_database(
    config: &Config,
    modules: &[Module],
) -> Result<DatabaseManager, StartupError> {
    let db = connect_database(config, modules)
        .await
        .map_err(StartupError::Connect)?;

    db.health_check().await.map_err(StartupError::Unreachable)?;
    info!("✅ Database connection established");

    if config.database.sync.on_startup {
        let options = SyncOptions {
            alter: config.database.sync.alter,
        };
        db.sync(options).await.map_err(StartupError::Sync)?;
    }

    Ok(db)
}

pub async fn handle_serve_command(
    environment: Environment,
    config: Config,
    app_info: AppInfo,
    modules: Vec<Module>,
    log_shipper: Option<LogShipper>,
) {
    let port = config.service.port;

    info!(
        "🚀 Starting {} v{} ({environment})",
        config.service.name, app_info.version
    );

    let db = match prepare_database(&config, &modules).await {
        Ok(db) => db,
        Err(e) => {
            error!("❌ {}", e);
            process::exit(1);
        }
    };

    let app = App::new(config, environment, app_info, db.clone());

    let cleanup_task = tokio::spawn(cleanup_rate_limits(app.clone()));

    let router = router(app, &modules);
    let result = start_server(router, port).await;

    cleanup_task.abort();

    info!("Closing database connection");
    if let Err(e) = db.close().await {
        warn!("Failed to close database connection: {}", e);
    }

    if let Some(shipper) = log_shipper {
        shipper.shutdown().await;
    }

    if let Err(e) = result {
        error!("❌ Server error: {}", e);
        process::exit(1);
    }

    info!("👋 Server stopped");
}

async fn cleanup_rate_limits(app: App) {
    let mut interval = tokio::time::interval(RATE_LIMIT_CLEANUP_INTERVAL);
    loop {
        interval.tick().await;
        app.rate_limit_state.cleanup_expired_entries();
    }
}

async fn start_server(router: Router, port: u16) -> io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!("🌐 Server starting on http://{}", addr);
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::{ActiveModelTrait as _, Set};

    use super::*;
    use crate::example::{self, entity as example_record};

    fn sqlite_config(variables: &[(&str, &str)]) -> Config {
        let defaults = [("DB_DIALECT", "sqlite"), ("DB_NAME", ":memory:")];
        Config::from_source("serve-test", defaults.iter().chain(variables).copied()).unwrap()
    }

    async fn insert_record(db: &DatabaseManager) -> Result<(), sea_orm::DbErr> {
        example_record::ActiveModel {
            name: Set("startup".to_string()),
            ..Default::default()
        }
        .insert(db.connection())
        .await
        .map(|_| ())
    }

    #[tokio::test]
    async fn syncs_module_tables_when_enabled() {
        let config = sqlite_config(&[("DB_SYNC", "true"), ("DB_SYNC_ALTER", "true")]);

        let db = prepare_database(&config, &[example::module()]).await.unwrap();

        assert_eq!(db.models().len(), 1);
        assert!(insert_record(&db).await.is_ok());
    }

    #[tokio::test]
    async fn leaves_schema_alone_when_sync_is_disabled() {
        let config = sqlite_config(&[]);

        let db = prepare_database(&config, &[example::module()]).await.unwrap();

        assert!(insert_record(&db).await.is_err());
    }

    #[tokio::test]
    async fn reports_unreachable_database() {
        let config = sqlite_config(&[("DB_NAME", "/nonexistent-dir/keel/test.sqlite")]);

        let err = prepare_database(&config, &[]).await.unwrap_err();

        assert!(matches!(
            err,
            StartupError::Connect(_) | StartupError::Unreachable(_)
        ));
    }
}
