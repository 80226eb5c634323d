use std::fmt;

use sea_orm::{
    sea_query::{Table, TableAlterStatement, TableCreateStatement},
    ConnectOptions, ConnectionTrait, DatabaseBackend, DatabaseConnection, DbErr, EntityTrait,
    Iterable as _, Schema,
};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;

/// SQL dialects the scaffold can connect to and generate services for.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Dialect {
    #[default]
    #[strum(to_string = "postgres", serialize = "postgresql")]
    Postgres,
    Mysql,
    Sqlite,
}

impl Dialect {
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Postgres => 5432,
            Self::Mysql => 3306,
            Self::Sqlite => 0,
        }
    }

    #[must_use]
    pub const fn requires_credentials(self) -> bool {
        !matches!(self, Self::Sqlite)
    }

    #[must_use]
    pub const fn scheme(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
            Self::Sqlite => "sqlite",
        }
    }
}

/// A data model registered for schema sync.
///
/// Holds monomorphized builders for the entity so the manager can keep a
/// heterogeneous list of models.
#[derive(Clone)]
pub struct ModelRegistration {
    pub table: String,
    create_table: fn(&Schema) -> TableCreateStatement,
    add_columns: fn(&Schema) -> Vec<TableAlterStatement>,
}

impl ModelRegistration {
    #[must_use]
    pub fn of<E: EntityTrait>() -> Self {
        Self {
            table: E::default().table_name().to_string(),
            create_table: create_table_statement::<E>,
            add_columns: add_column_statements::<E>,
        }
    }
}

impl fmt::Debug for ModelRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRegistration")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

fn create_table_statement<E: EntityTrait>(schema: &Schema) -> TableCreateStatement {
    let mut statement = schema.create_table_from_entity(E::default());
    statement.if_not_exists();
    statement
}

fn add_column_statements<E: EntityTrait>(schema: &Schema) -> Vec<TableAlterStatement> {
    E::Column::iter()
        .map(|column| {
            Table::alter()
                .table(E::default())
                .add_column_if_not_exists(schema.get_column_def::<E>(column))
                .to_owned()
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Add columns that exist on the model but not in the table
    pub alter: bool,
}

/// Owns the connection pool and the set of registered models.
#[derive(Debug, Clone)]
pub struct DatabaseManager {
    connection: DatabaseConnection,
    models: Vec<ModelRegistration>,
}

impl DatabaseManager {
    /// Opens the connection pool. The pool enforces its own acquisition timeout.
    pub async fn connect(db_config: &DatabaseConfig) -> Result<Self, DbErr> {
        let mut options = ConnectOptions::new(db_config.url());

        options
            .sqlx_logging(db_config.logging)
            .sqlx_logging_level(LevelFilter::Debug)
            .acquire_timeout(db_config.acquire_timeout());

        if db_config.is_in_memory() {
            // Every sqlite connection to :memory: is a separate database
            options.max_connections(1).min_connections(1);
        } else {
            options
                .max_connections(db_config.pool.max_connections)
                .min_connections(db_config.pool.min_connections)
                .idle_timeout(db_config.idle_timeout());
        }

        debug!(
            dialect = %db_config.dialect,
            host = %db_config.host,
            database = %db_config.name,
            "Connecting to database"
        );

        let connection = sea_orm::Database::connect(options).await?;

        Ok(Self::from_connection(connection))
    }

    #[must_use]
    pub const fn from_connection(connection: DatabaseConnection) -> Self {
        Self {
            connection,
            models: Vec::new(),
        }
    }

    #[must_use]
    pub const fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }

    #[must_use]
    pub fn backend(&self) -> DatabaseBackend {
        self.connection.get_database_backend()
    }

    #[must_use]
    pub fn models(&self) -> &[ModelRegistration] {
        &self.models
    }

    pub fn register_model<E: EntityTrait>(&mut self) {
        self.register(ModelRegistration::of::<E>());
    }

    pub fn register(&mut self, model: ModelRegistration) {
        if self.models.iter().any(|m| m.table == model.table) {
            debug!(table = %model.table, "Model already registered, skipping");
            return;
        }

        debug!(table = %model.table, "Registering model");
        self.models.push(model);
    }

    pub fn register_models(&mut self, models: &[ModelRegistration]) {
        for model in models {
            self.register(model.clone());
        }
    }

    /// Verifies that the database accepts queries.
    pub async fn health_check(&self) -> Result<(), DbErr> {
        self.connection.ping().await
    }

    /// Creates tables for registered models that do not exist yet.
    pub async fn sync(&self, options: SyncOptions) -> Result<(), DbErr> {
        let backend = self.backend();
        let schema = Schema::new(backend);

        for model in &self.models {
            debug!(table = %model.table, "Syncing table");
            self.connection
                .execute(backend.build(&(model.create_table)(&schema)))
                .await?;

            if options.alter {
                if backend == DatabaseBackend::Postgres {
                    for statement in (model.add_columns)(&schema) {
                        self.connection.execute(backend.build(&statement)).await?;
                    }
                } else {
                    warn!(
                        table = %model.table,
                        "Altering columns during sync is only supported on PostgreSQL"
                    );
                }
            }
        }

        info!(models = self.models.len(), "Database sync completed");

        Ok(())
    }

    pub async fn close(self) -> Result<(), DbErr> {
        self.connection.close().await
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::{ActiveModelTrait as _, Set};

    use super::*;
    use crate::{config::Config, example::entity as example_record};

    async fn memory_manager() -> DatabaseManager {
        let config = Config::from_source(
            "db-test",
            [("DB_DIALECT", "sqlite"), ("DB_NAME", ":memory:")],
        )
        .unwrap();

        DatabaseManager::connect(&config.database).await.unwrap()
    }

    #[test]
    fn parses_dialect_aliases() {
        assert_eq!("postgresql".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("MySQL".parse::<Dialect>().unwrap(), Dialect::Mysql);
        assert_eq!(Dialect::Sqlite.to_string(), "sqlite");
        assert_eq!(Dialect::Mysql.default_port(), 3306);
    }

    #[tokio::test]
    async fn health_check_succeeds_on_open_connection() {
        let manager = memory_manager().await;

        assert!(manager.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn registration_is_idempotent() {
        let mut manager = memory_manager().await;

        manager.register_model::<example_record::Entity>();
        manager.register_model::<example_record::Entity>();

        assert_eq!(manager.models().len(), 1);
        assert_eq!(manager.models()[0].table, "example_records");
    }

    #[tokio::test]
    async fn sync_creates_registered_tables_and_is_repeatable() {
        let mut manager = memory_manager().await;
        manager.register_model::<example_record::Entity>();

        manager.sync(SyncOptions::default()).await.unwrap();
        manager.sync(SyncOptions { alter: true }).await.unwrap();

        example_record::ActiveModel {
            name: Set("first".to_string()),
            ..Default::default()
        }
        .insert(manager.connection())
        .await
        .unwrap();

        let count = example_record::Entity::find()
            .all(manager.connection())
            .await
            .unwrap()
            .len();
        assert_eq!(count, 1);
    }
}
