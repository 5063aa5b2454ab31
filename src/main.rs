//! Carnet daemon
//!
//! ```text
//! carnet                     run the scheduled publication loop
//! carnet migrate             apply database migrations and exit
//! carnet publish-scheduled   run one publication sweep and exit
//! ```

use anyhow::{bail, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use carnet::{
    clock::SystemClock,
    config::Config,
    db::{self, repositories::SqlxPostRepository},
    services::{PublicationScheduler, PublicationService},
};

enum Command {
    Run,
    Migrate,
    PublishScheduled,
}

impl Command {
    fn parse(arg: Option<&str>) -> Result<Self> {
        match arg {
            None | Some("run") => Ok(Command::Run),
            Some("migrate") => Ok(Command::Migrate),
            Some("publish-scheduled") => Ok(Command::PublishScheduled),
            Some(other) => bail!(
                "Unknown command '{}', expected one of: run, migrate, publish-scheduled",
                other
            ),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "carnet=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let command = Command::parse(std::env::args().nth(1).as_deref())?;

    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    if let Command::Migrate = command {
        return Ok(());
    }

    let publication = Arc::new(PublicationService::new(
        SqlxPostRepository::boxed(pool.clone()),
        SystemClock::shared(),
    ));

    match command {
        Command::PublishScheduled => {
            let report = publication.run_sweep().await?;
            println!("{}", report.summary());
        }
        Command::Run => {
            if !config.scheduler.enabled {
                tracing::warn!("Scheduler disabled in configuration, nothing to do");
                return Ok(());
            }

            let scheduler = PublicationScheduler::new(
                publication,
                Duration::from_secs(config.scheduler.interval_seconds),
            );
            scheduler
                .run(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!("Failed to listen for shutdown signal: {}", e);
                    }
                })
                .await;
        }
        Command::Migrate => {}
    }

    pool.close().await;
    Ok(())
}
