use std::time::{Duration, Instant};

use sea_orm::DatabaseConnection;

use crate::{
    app_info::AppInfo, config::Config, database::DatabaseManager, environment::Environment,
    rate_limiting::RateLimitState,
};

/// Shared state handed to every handler.
#[derive(Clone, Debug)]
pub struct App {
    pub config: Config,
    pub environment: Environment,
    pub app_info: AppInfo,
    pub db: DatabaseManager,
    pub rate_limit_state: RateLimitState,
    pub started_at: Instant,
}

impl App {
    #[must_use]
    pub fn new(
        config: Config,
        environment: Environment,
        app_info: AppInfo,
        db: DatabaseManager,
    ) -> Self {
        let rate_limit_state = RateLimitState::new(config.rate_limiting.clone());

        Self {
            config,
            environment,
            app_info,
            db,
            rate_limit_state,
            started_at: Instant::now(),
        }
    }

    #[must_use]
    pub const fn connection(&self) -> &DatabaseConnection {
        self.db.connection()
    }

    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}
