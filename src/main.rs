//! pgferry - PostgreSQL logical replication migrations
//!
//! This is the composition root that wires adapters into the application
//! services and maps their results to the process exit code: 0 on full
//! success, 1 on any detected failure.

use clap::Parser;
use pgferry::adapters::outbound::{
    DiffFileRenderer, FileSecretStore, PgDatabase, PgDumpSchemaDumper,
};
use pgferry::application::{
    CheckService, CreateOptions, DropOptions, ReplicationService, SequenceService, StartOptions,
    StopOptions, SyncMode, SyncOptions,
};
use pgferry::cli::{Cli, Command, ReplicationCommand};
use pgferry::config::{Config, SECRETS_DIR};
use pgferry::domain::entities::Severity;
use pgferry::domain::ports::Database;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = cli
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Run one subcommand. `Ok(false)` is a cleanly detected failure (failed
/// check, unhealthy replication); `Err` is a fault.
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = cli.config();

    match cli.command {
        Command::Check => {
            let (source, target) = connect_pair(&config).await?;
            let checks = check_service(&config, source, target);

            let mut ok = true;
            for result in checks.run_all().await? {
                match &result.error {
                    None => tracing::debug!("{}", result.description),
                    Some(error) => {
                        tracing::error!("{}: {}", result.name, error);
                        ok = false;
                    }
                }
            }
            Ok(ok)
        }

        Command::Replication { command } => {
            let (source, target) = connect_pair(&config).await?;
            let service = replication_service(&config, source, target);

            match command {
                ReplicationCommand::Create(args) => {
                    service
                        .create(&CreateOptions {
                            skip_checks: args.skip_checks,
                            drop_existing_role: args.drop_existing_role,
                            publication_name: args.publication_name,
                            subscription_name: args.subscription_name,
                            replication_password: args.replication_password,
                        })
                        .await?;
                    Ok(true)
                }
                ReplicationCommand::Start(args) => {
                    service
                        .start(&StartOptions {
                            subscription_name: args.subscription_name,
                            fail_on_already_started: args.fail_on_already_started,
                            skip_refresh: args.no_refresh,
                        })
                        .await?;
                    Ok(true)
                }
                ReplicationCommand::Stop(args) => {
                    service
                        .stop(&StopOptions {
                            subscription_name: args.subscription_name,
                            fail_on_already_stopped: args.fail_on_already_stopped,
                        })
                        .await?;
                    Ok(true)
                }
                ReplicationCommand::Status(args) => {
                    let report = service.status(&args.subscription_name).await?;
                    for finding in &report.findings {
                        match finding.severity {
                            Severity::Info => tracing::info!("{}", finding.message),
                            Severity::Warning => tracing::warn!("{}", finding.message),
                            Severity::Error => tracing::error!("{}", finding.message),
                        }
                    }
                    Ok(report.healthy())
                }
                ReplicationCommand::Drop(args) => {
                    service
                        .drop(&DropOptions {
                            publication_name: args.publication_name,
                            subscription_name: args.subscription_name,
                        })
                        .await?;
                    Ok(true)
                }
            }
        }

        Command::Syncsequences(args) => {
            let (source, target) = connect_pair(&config).await?;
            let service = SequenceService::new(source, target);
            service
                .run(&SyncOptions {
                    mode: if args.equal {
                        SyncMode::Equal
                    } else {
                        SyncMode::Offset
                    },
                    fixed_offset: args.fixed_offset,
                    sequence_offsets: args.sequence_offsets.into_iter().collect(),
                    sample_pause: Duration::from_secs(args.sample_pause),
                    dry_run: args.dry_run,
                })
                .await?;
            Ok(true)
        }
    }
}

async fn connect_pair(config: &Config) -> anyhow::Result<(Arc<dyn Database>, Arc<dyn Database>)> {
    let source: Arc<dyn Database> = Arc::new(PgDatabase::connect(&config.source).await?);
    let target: Arc<dyn Database> = Arc::new(PgDatabase::connect(&config.target).await?);
    Ok((source, target))
}

fn check_service(
    config: &Config,
    source: Arc<dyn Database>,
    target: Arc<dyn Database>,
) -> CheckService {
    CheckService::new(
        source,
        target,
        Arc::new(PgDumpSchemaDumper::new(config.source.clone())),
        Arc::new(PgDumpSchemaDumper::new(config.target.clone())),
        Arc::new(DiffFileRenderer),
    )
}

fn replication_service(
    config: &Config,
    source: Arc<dyn Database>,
    target: Arc<dyn Database>,
) -> ReplicationService {
    let checks = check_service(config, source.clone(), target.clone());
    ReplicationService::new(
        source,
        target,
        checks,
        Arc::new(FileSecretStore::new(SECRETS_DIR)),
        config.source.clone(),
    )
}
