use std::process;

use tracing::error;

use super::serve::connect_database;
use crate::{config::Config, database::SyncOptions, module::Module};

pub async fn handle_sync_command(config: &Config, modules: &[Module], alter: bool) {
    let db = match connect_database(config, modules).await {
        Ok(db) => db,
        Err(e) => {
            error!("❌ Failed to connect to the database: {}", e);
            process::exit(1);
        }
    };

    let options = SyncOptions {
        alter: alter || config.database.sync.alter,
    };

    match db.sync(options).await {
        Ok(()) => {
            for model in db.models() {
                println!("  📋 {}", model.table);
            }
            println!("✅ Synced {} table(s)", db.models().len());
        }
        Err(e) => {
            error!("❌ Database sync failed: {}", e);
            process::exit(1);
        }
    }

    if let Err(e) = db.close().await {
        error!("Failed to close database connection: {}", e);
    }
}
