use std::{process, sync::Arc};

use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;
use vellum::{
    application::{
        error::{AppError, ErrorReport},
        repos::CollectionsRepo,
        system_collections::{SystemCollectionManager, SystemCollectionSettings},
    },
    cache::{FileFreshnessCache, FreshnessCache, MemoryFreshnessCache},
    config::{self, CacheBackend, Command, LoadError, Settings, StoreBackend},
    domain::collections::SystemCollectionMap,
    infra::{db::PostgresRepositories, error::InfraError, memory::InMemoryCollections, telemetry},
};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    let report = ErrorReport::from_error("vellum::main", error);
    if dispatcher::has_been_set() {
        error!(source = report.source, chain = ?report.messages, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(source = report.source, chain = ?report.messages, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli().map_err(InfraError::from)?;

    telemetry::init(&settings.logging)?;

    match cli_args.command.unwrap_or(Command::List) {
        Command::Migrate => run_migrate(&settings).await,
        Command::WarmUp => {
            let manager = build_manager(&settings).await?;
            manager.warm_up().await?;
            print_map(&*manager.system_collections().await?);
            Ok(())
        }
        Command::Get(args) => {
            let manager = build_manager(&settings).await?;
            println!("{}", manager.get_system_collection(&args.key).await?);
            Ok(())
        }
        Command::Check(args) => {
            let manager = build_manager(&settings).await?;
            println!("{}", manager.is_system_collection(args.id).await?);
            Ok(())
        }
        Command::List => {
            let manager = build_manager(&settings).await?;
            print_map(&*manager.system_collections().await?);
            Ok(())
        }
    }
}

async fn run_migrate(settings: &Settings) -> Result<(), AppError> {
    if settings.database.backend == StoreBackend::Memory {
        info!(
            target = "vellum::main",
            "In-memory store selected; no migrations to apply"
        );
        return Ok(());
    }
    let repositories = connect(settings).await?;
    PostgresRepositories::run_migrations(repositories.pool())
        .await
        .map_err(|source| InfraError::database("migration", source))?;
    info!(target = "vellum::main", "Database migrations applied");
    Ok(())
}

async fn connect(settings: &Settings) -> Result<PostgresRepositories, AppError> {
    let url = settings
        .database
        .url
        .as_deref()
        .ok_or_else(|| {
            InfraError::from(LoadError::Invalid {
                key: "database.url",
                reason: "a connection URL is required for the postgres backend".to_string(),
            })
        })?;
    let pool = PostgresRepositories::connect(url, settings.database.max_connections.get())
        .await
        .map_err(|source| InfraError::database("connect", source))?;
    Ok(PostgresRepositories::new(pool))
}

async fn build_manager(settings: &Settings) -> Result<SystemCollectionManager, AppError> {
    let repo: Arc<dyn CollectionsRepo> = match settings.database.backend {
        StoreBackend::Postgres => Arc::new(connect(settings).await?),
        StoreBackend::Memory => Arc::new(InMemoryCollections::new()),
    };
    let cache: Arc<dyn FreshnessCache> = match settings.cache.backend {
        CacheBackend::File => Arc::new(FileFreshnessCache::new(settings.cache.path.clone())),
        CacheBackend::Memory => Arc::new(MemoryFreshnessCache::new()),
    };

    Ok(SystemCollectionManager::new(
        settings.collections.tree.clone(),
        repo,
        cache,
        SystemCollectionSettings {
            locale: settings.collections.locale.clone(),
            actor: settings.collections.actor,
        },
    ))
}

fn print_map(map: &SystemCollectionMap) {
    for (key, id) in map.iter() {
        println!("{key}\t{id}");
    }
}
