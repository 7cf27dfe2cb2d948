//! CLI argument definitions using clap
//!
//! Connection flags are global and default from `SOURCE_*`/`TARGET_*`
//! environment variables; this is the only place the environment is read.
//!
//! Commands:
//! - pgferry check
//! - pgferry replication create|start|stop|status|drop
//! - pgferry syncsequences

use crate::config::{
    Config, ConnectionSettings, DEFAULT_PUBLICATION_NAME, DEFAULT_SUBSCRIPTION_NAME,
};
use clap::{Args, Parser, Subcommand};

/// Manages PostgreSQL logical replication migrations.
#[derive(Parser, Debug)]
#[command(name = "pgferry")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Level to log at.
    #[arg(short = 'l', long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(flatten)]
    pub source: SourceOptions,

    #[command(flatten)]
    pub target: TargetOptions,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
#[command(next_help_heading = "Source database options")]
pub struct SourceOptions {
    /// Source database host to connect to.
    #[arg(long, global = true, env = "SOURCE_HOST", default_value = "localhost")]
    pub source_host: String,

    /// Source database port to connect to.
    #[arg(long, global = true, env = "SOURCE_PORT", default_value_t = 5432)]
    pub source_port: u16,

    /// Source database user to use for operations.
    #[arg(long, global = true, env = "SOURCE_USER", default_value = "postgres")]
    pub source_user: String,

    /// Matching password for the source database user.
    #[arg(long, global = true, env = "SOURCE_PASSWORD", default_value = "")]
    pub source_password: String,

    /// Source database name to connect to.
    #[arg(long, global = true, env = "SOURCE_DBNAME", default_value = "postgres")]
    pub source_dbname: String,
}

#[derive(Args, Debug, Clone)]
#[command(next_help_heading = "Target database options")]
pub struct TargetOptions {
    /// Target database host to connect to.
    #[arg(long, global = true, env = "TARGET_HOST", default_value = "localhost")]
    pub target_host: String,

    /// Target database port to connect to.
    #[arg(long, global = true, env = "TARGET_PORT", default_value_t = 5432)]
    pub target_port: u16,

    /// Target database user to use for operations.
    #[arg(long, global = true, env = "TARGET_USER", default_value = "postgres")]
    pub target_user: String,

    /// Matching password for the target database user.
    #[arg(long, global = true, env = "TARGET_PASSWORD", default_value = "")]
    pub target_password: String,

    /// Target database name to connect to.
    #[arg(long, global = true, env = "TARGET_DBNAME", default_value = "postgres")]
    pub target_dbname: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Verify that the databases are ready for the replication process.
    Check,

    /// Manage logical replication between the databases.
    Replication {
        #[command(subcommand)]
        command: ReplicationCommand,
    },

    /// Synchronize sequence values from the source to the target database.
    Syncsequences(SyncSequencesArgs),
}

#[derive(Subcommand, Debug)]
pub enum ReplicationCommand {
    /// Set up logical replication from the source to the target database.
    Create(CreateArgs),
    /// Start logical replication if it is not already started.
    Start(StartArgs),
    /// Stop logical replication if it is not already stopped.
    Stop(StopArgs),
    /// Display the current status of replication.
    Status(StatusArgs),
    /// Drop logical replication between the source and target database.
    Drop(DropArgs),
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Skip pre-flight check execution. Only use this switch if you know
    /// what you are doing: ignoring a REPLICA IDENTITY failure, for
    /// instance, will result in errors on affected tables.
    #[arg(long)]
    pub skip_checks: bool,

    /// Drop the replication role if it exists before doing anything else.
    #[arg(long)]
    pub drop_existing_role: bool,

    /// The name of the publication created on the source database.
    #[arg(long, default_value = DEFAULT_PUBLICATION_NAME)]
    pub publication_name: String,

    /// The name of the subscription created on the target database.
    #[arg(long, default_value = DEFAULT_SUBSCRIPTION_NAME)]
    pub subscription_name: String,

    /// Specific password to use for the replication role. By default a
    /// password is generated and persisted under the secrets directory.
    #[arg(long, env = "REPLICATION_PASSWORD")]
    pub replication_password: Option<String>,
}

#[derive(Args, Debug)]
pub struct StartArgs {
    /// The name of the subscription on the target database.
    #[arg(long, default_value = DEFAULT_SUBSCRIPTION_NAME)]
    pub subscription_name: String,

    /// Exit with code 1 if the subscription is already started.
    #[arg(long)]
    pub fail_on_already_started: bool,

    /// Skip the publication refresh that normally follows enabling the
    /// subscription.
    #[arg(long)]
    pub no_refresh: bool,
}

#[derive(Args, Debug)]
pub struct StopArgs {
    /// The name of the subscription on the target database.
    #[arg(long, default_value = DEFAULT_SUBSCRIPTION_NAME)]
    pub subscription_name: String,

    /// Exit with code 1 if the subscription is already stopped.
    #[arg(long)]
    pub fail_on_already_stopped: bool,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// The name of the subscription on the target database.
    #[arg(long, default_value = DEFAULT_SUBSCRIPTION_NAME)]
    pub subscription_name: String,
}

#[derive(Args, Debug)]
pub struct DropArgs {
    /// The name of the publication on the source database.
    #[arg(long, default_value = DEFAULT_PUBLICATION_NAME)]
    pub publication_name: String,

    /// The name of the subscription on the target database.
    #[arg(long, default_value = DEFAULT_SUBSCRIPTION_NAME)]
    pub subscription_name: String,
}

#[derive(Args, Debug)]
pub struct SyncSequencesArgs {
    /// Fixed offset to apply for all sequences.
    #[arg(long, default_value_t = 100)]
    pub fixed_offset: i64,

    /// Per-sequence fixed offset in the form `sequence:offset`, for
    /// example `foo_id_seq:30`. Repeatable. Sequences without one get an
    /// offset measured by taking a second sample after the first.
    #[arg(long = "sequence-offset", value_parser = parse_sequence_offset)]
    pub sequence_offsets: Vec<(String, i64)>,

    /// Sleep this many seconds before taking the second sample.
    #[arg(long, default_value_t = 1)]
    pub sample_pause: u64,

    /// Instead of creating an offset between the sequences on the source
    /// and target databases, assume their values will no longer change
    /// and set them to equal values.
    #[arg(long)]
    pub equal: bool,

    /// Only print values being set. Source sequences are still
    /// incremented, since the current value is fetched via `nextval`.
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}

fn parse_sequence_offset(value: &str) -> Result<(String, i64), String> {
    let (sequence, offset) = value
        .split_once(':')
        .ok_or_else(|| "expected colon-separated `sequence:offset` value".to_string())?;
    let offset = offset
        .parse::<i64>()
        .map_err(|err| format!("invalid offset `{offset}`: {err}"))?;
    Ok((sequence.to_string(), offset))
}

impl Cli {
    /// Build the explicit configuration handed to the core components.
    pub fn config(&self) -> Config {
        Config {
            source: ConnectionSettings {
                host: self.source.source_host.clone(),
                port: self.source.source_port,
                dbname: self.source.source_dbname.clone(),
                user: self.source.source_user.clone(),
                password: self.source.source_password.clone(),
            },
            target: ConnectionSettings {
                host: self.target.target_host.clone(),
                port: self.target.target_port,
                dbname: self.target.target_dbname.clone(),
                user: self.target.target_user.clone(),
                password: self.target.target_password.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_connection_flags_into_config() {
        let cli = Cli::try_parse_from([
            "pgferry",
            "--source-host",
            "src.internal",
            "--source-port",
            "5433",
            "--target-host",
            "dst.internal",
            "check",
        ])
        .unwrap();

        let config = cli.config();
        assert_eq!(config.source.host, "src.internal");
        assert_eq!(config.source.port, 5433);
        assert_eq!(config.target.host, "dst.internal");
        assert_eq!(config.target.port, 5432);
    }

    #[test]
    fn connection_flags_are_global() {
        // Flags may follow the subcommand, argparse-style.
        let cli = Cli::try_parse_from([
            "pgferry",
            "replication",
            "status",
            "--source-host",
            "src.internal",
        ])
        .unwrap();
        assert_eq!(cli.source.source_host, "src.internal");
    }

    #[test]
    fn sequence_offset_values_are_parsed() {
        let cli = Cli::try_parse_from([
            "pgferry",
            "syncsequences",
            "--sequence-offset",
            "foo_id_seq:30",
            "--sequence-offset",
            "bar_id_seq:-2",
        ])
        .unwrap();

        let Command::Syncsequences(args) = cli.command else {
            panic!("expected syncsequences");
        };
        assert_eq!(
            args.sequence_offsets,
            vec![("foo_id_seq".to_string(), 30), ("bar_id_seq".to_string(), -2)]
        );
        assert_eq!(args.fixed_offset, 100);
        assert_eq!(args.sample_pause, 1);
    }

    #[test]
    fn malformed_sequence_offset_is_rejected() {
        let result = Cli::try_parse_from(["pgferry", "syncsequences", "--sequence-offset", "foo"]);
        assert!(result.is_err());
    }
}
