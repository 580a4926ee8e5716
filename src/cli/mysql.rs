//! `breakglass mysql`: dynamic database credentials.

use anyhow::{Context, Result};
use clap::Args;
use tracing::Instrument;

use super::output::{print_credential, CredentialView};
use super::{exec_guarded, CommandContext};
use crate::config::validate_path_component;
use crate::credentials::{Credential, CredentialKind};
use crate::errors::Error;
use crate::issuer::IssueRequest;
use crate::lease_span;
use crate::targets::shell::InteractiveSession;

#[derive(Args, Debug)]
pub struct MysqlArgs {
    /// MySQL host to get credentials for
    #[arg(short = 'H', long)]
    pub host: String,

    /// Vault database role
    #[arg(short, long, default_value = "readonly")]
    pub role: String,
}

impl MysqlArgs {
    pub fn broker_path(&self) -> String {
        format!("mysql/{}/creds/{}", self.host, self.role)
    }
}

pub async fn run(args: MysqlArgs, ctx: &CommandContext) -> Result<()> {
    validate_path_component(&args.host, "MySQL host")?;
    validate_path_component(&args.role, "MySQL role")?;

    let path = args.broker_path();
    let lease = ctx
        .issuer()
        .issue(IssueRequest::new(&path, CredentialKind::DatabaseLogin))
        .await
        .with_context(|| format!("Could not get MySQL credentials for {}", args.host))?;

    let span = lease_span!(lease.lease_id(), lease.credential().kind(), path = %path);
    async move {
        print_credential(&CredentialView::from_lease(&lease), ctx.output)?;

        if !ctx.exec {
            return Ok(());
        }

        exec_guarded(ctx, lease, |lease| match lease.credential() {
            Credential::DatabaseLogin(login) => Ok(InteractiveSession::mysql(&args.host, login)?),
            other => Err(Error::config(format!("Expected database credentials, got {}", other.kind()))),
        })
        .await
    }
    .instrument(span)
    .await
}
