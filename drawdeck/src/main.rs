use std::{env, sync::Arc};

use colored::Colorize;
use log::{error, info};
use thiserror::Error;

use drawdeck_collab::{Collab, DatabaseError, PgDatabase};
use drawdeck_server::{run_server, ServerContext};

mod logging;

#[derive(Debug, Error)]
enum StartupError {
    #[error("DATABASE_URL is not set")]
    MissingDatabaseUrl,

    #[error("Could not initialize database: {0}")]
    Database(#[from] DatabaseError),
}

impl StartupError {
    fn hint(&self) -> String {
        match self {
            StartupError::MissingDatabaseUrl => {
                "Set the DATABASE_URL environment variable to a PostgreSQL connection string."
                    .to_string()
            }
            StartupError::Database(_) => {
                "This is a database error. Make sure the PostgreSQL instance is running and reachable, then try again."
                    .to_string()
            }
        }
    }
}

async fn init() -> Result<ServerContext, StartupError> {
    let database_url = env::var("DATABASE_URL").map_err(|_| StartupError::MissingDatabaseUrl)?;

    info!("Connecting to database...");
    let database = PgDatabase::new(&database_url).await?;

    let collab = Collab::new(database);

    Ok(ServerContext {
        collab: Arc::new(collab),
    })
}

#[tokio::main]
async fn main() {
    logging::init_logger();

    match init().await {
        Ok(context) => {
            info!("Initialized successfully.");
            run_server(context).await;
        }
        Err(error) => {
            error!(
                "{} Read the error below to troubleshoot the issue.",
                "drawdeck failed to start!".bold().red()
            );
            error!("{}", error);
            error!("{}", format!("Hint: {}", error.hint()).dimmed().italic());
        }
    }
}
