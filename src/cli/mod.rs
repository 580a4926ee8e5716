//! # Command Line Interface
//!
//! Every subcommand follows the same shape: log in to Vault, issue one leased
//! credential, hand it to the operator, and (when the session is held open)
//! revoke it through a [`SessionGuard`] on completion or interrupt.

pub mod aws;
pub mod config;
pub mod docker;
pub mod mysql;
pub mod output;
pub mod ssh;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::broker::{SecretString, SecretsBroker, VaultSession};
use crate::config::{validate_path_component, BrokerConfig, SessionSettings};
use crate::errors::Error;
use crate::guard::{termination_signal, CleanupResult, ListenerHandle, SessionGuard};
use crate::issuer::CredentialIssuer;
use crate::lease::Lease;
use crate::observability::{init_logging, LogFormat};
use crate::targets::shell::InteractiveSession;
use config::{resolve_broker_config, resolve_session_settings, CliConfig, ConnectionArgs};
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "breakglass")]
#[command(about = "Short-lived credentials from Vault, revoked when you are done")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Config file (default is $HOME/.breakglass/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Open a connection with the credentials and revoke them when it ends
    #[arg(long, global = true)]
    pub exec: bool,

    /// Output format for issued credentials
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Get temporary AWS credentials, optionally with a console login
    Aws(aws::AwsArgs),

    /// Get temporary MySQL credentials
    Mysql(mysql::MysqlArgs),

    /// Get a one-time SSH password for a Linux server
    Ssh(ssh::SshArgs),

    /// Get a Docker client TLS certificate
    Docker(docker::DockerArgs),
}

/// Everything a subcommand needs after login.
pub struct CommandContext {
    pub broker: Arc<dyn SecretsBroker>,
    /// Vault username the session was opened for
    pub username: String,
    pub settings: SessionSettings,
    pub output: OutputFormat,
    pub exec: bool,
}

impl CommandContext {
    pub fn issuer(&self) -> CredentialIssuer {
        CredentialIssuer::new(Arc::clone(&self.broker))
    }

    /// Wrap `lease` in a guard whose listener reacts to Ctrl-C and SIGTERM.
    pub fn guard(&self, lease: Lease) -> (Arc<SessionGuard>, ListenerHandle) {
        let guard = Arc::new(SessionGuard::new(
            Arc::clone(&self.broker),
            lease,
            self.settings.teardown_policy(),
        ));
        let listener = guard.spawn_listener(termination_signal());
        (guard, listener)
    }
}

/// Run CLI commands
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug, cli.log_format);

    let file = CliConfig::discover(cli.config.as_deref())?;
    let broker_config = resolve_broker_config(&cli.connection, &file);
    broker_config.validate()?;
    let settings = resolve_session_settings(&cli.connection, &file);

    let password = prompt_password(&broker_config)?;
    let session = VaultSession::open(&broker_config, password)
        .await
        .with_context(|| format!("Could not log in to Vault at {}", broker_config.endpoint()))?;
    info!(
        session_id = %session.session_id(),
        token_ttl_secs = session.token_ttl().as_secs(),
        "Logged in to Vault"
    );

    let ctx = CommandContext {
        broker: Arc::new(session),
        username: broker_config.username.clone(),
        settings,
        output: cli.output,
        exec: cli.exec,
    };

    match cli.command {
        Commands::Aws(args) => aws::run(args, &ctx).await,
        Commands::Mysql(args) => mysql::run(args, &ctx).await,
        Commands::Ssh(args) => ssh::run(args, &ctx).await,
        Commands::Docker(args) => docker::run(args, &ctx).await,
    }
}

fn prompt_password(config: &BrokerConfig) -> anyhow::Result<SecretString> {
    let password = dialoguer::Password::new()
        .with_prompt(format!("Vault password for {}", config.username))
        .interact()
        .context("Failed to read password")?;
    Ok(SecretString::new(password))
}

/// Validate each segment of a slash-separated broker path.
pub(crate) fn validate_broker_path(path: &str, name: &str) -> crate::errors::Result<()> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Err(Error::config(format!("{} cannot be empty", name)));
    }
    trimmed.split('/').try_for_each(|segment| validate_path_component(segment, name))
}

/// Run an interactive client while the guard keeps the lease, then clean up.
///
/// An interrupt stops the client and triggers the same cleanup as a normal exit.
pub(crate) async fn exec_guarded<F>(ctx: &CommandContext, lease: Lease, client: F) -> anyhow::Result<()>
where
    F: FnOnce(&Lease) -> crate::errors::Result<InteractiveSession>,
{
    let (guard, listener) = ctx.guard(lease);
    guard.go_live();

    let outcome = async {
        let session = client(guard.lease())?;
        let mut child = session.spawn()?;

        tokio::select! {
            status = child.wait() => {
                let status = status?;
                if !status.success() {
                    warn!(%status, "Client exited with an error");
                }
            }
            _ = listener.interrupted() => {
                if let Err(err) = child.kill().await {
                    warn!(%err, "Failed to stop client");
                }
            }
        }
        Ok::<(), Error>(())
    }
    .await;

    listener.complete();
    finish(outcome, listener.join().await)
}

/// Combine the foreground outcome with the cleanup result. Cleanup failures win.
pub(crate) fn finish(outcome: crate::errors::Result<()>, cleanup: CleanupResult) -> anyhow::Result<()> {
    let result = match (outcome, cleanup) {
        (outcome, Err(err)) => {
            if let Err(foreground) = outcome {
                error!(error = %foreground, "Session ended with an error before cleanup");
            }
            Err(Error::from(err))
        }
        (Err(err), Ok(report)) => {
            info!(lease_id = %report.lease_id, "Lease revoked");
            Err(err)
        }
        (Ok(()), Ok(report)) => {
            if let Some(resource) = &report.secondary_torn_down {
                info!(resource = %resource, "Removed");
            }
            info!(lease_id = %report.lease_id, "Vault lease revoked");
            Ok(())
        }
    };

    if let Err(err) = &result {
        if err.needs_manual_remediation() {
            error!(error = %err, "Credentials may still be live; manual cleanup required");
        }
    }
    result.map_err(Into::into)
}
