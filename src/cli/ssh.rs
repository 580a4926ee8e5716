//! `breakglass ssh`: one-time SSH passwords.

use anyhow::{Context, Result};
use clap::Args;
use serde_json::{json, Map};
use std::collections::BTreeSet;
use std::net::IpAddr;
use tracing::{debug, Instrument};

use super::output::{print_credential, CredentialView};
use super::{exec_guarded, CommandContext};
use crate::config::validate_path_component;
use crate::credentials::{Credential, CredentialKind};
use crate::errors::Error;
use crate::issuer::IssueRequest;
use crate::lease_span;
use crate::targets::shell::InteractiveSession;

#[derive(Args, Debug)]
pub struct SshArgs {
    /// SSH host to get credentials for
    #[arg(short = 'H', long)]
    pub host: String,

    /// SSH user to get credentials for
    #[arg(short, long, default_value = "breakglass")]
    pub user: String,

    /// Vault SSH role
    #[arg(short, long, default_value = "breakglass")]
    pub role: String,
}

pub async fn run(args: SshArgs, ctx: &CommandContext) -> Result<()> {
    validate_path_component(&args.role, "SSH role")?;

    let ip = resolve_single_ip(&args.host).await?;
    debug!(host = %args.host, %ip, "Resolved SSH host");

    let mut params = Map::new();
    params.insert("ip".into(), json!(ip.to_string()));
    params.insert("username".into(), json!(args.user));

    let path = format!("ssh/creds/{}", args.role);
    let lease = ctx
        .issuer()
        .issue(IssueRequest::new(&path, CredentialKind::RemoteShellKey).with_params(params))
        .await
        .with_context(|| format!("Could not get SSH credentials for {}", args.host))?;

    let span = lease_span!(lease.lease_id(), lease.credential().kind(), host = %args.host);
    async move {
        print_credential(&CredentialView::from_lease(&lease), ctx.output)?;

        if !ctx.exec {
            return Ok(());
        }

        exec_guarded(ctx, lease, |lease| match lease.credential() {
            Credential::RemoteShellKey(key) => Ok(InteractiveSession::ssh(key)),
            other => Err(Error::config(format!("Expected an SSH key, got {}", other.kind()))),
        })
        .await
    }
    .instrument(span)
    .await
}

/// Resolve `host` to exactly one address; one-time keys are bound to a single IP.
async fn resolve_single_ip(host: &str) -> Result<IpAddr> {
    if host.is_empty() {
        anyhow::bail!("No SSH host specified. See --help");
    }

    let addrs: BTreeSet<IpAddr> = tokio::net::lookup_host((host, 22))
        .await
        .with_context(|| format!("Error getting host IP for {}", host))?
        .map(|addr| addr.ip())
        .collect();

    single_ip(host, addrs)
}

fn single_ip(host: &str, addrs: BTreeSet<IpAddr>) -> Result<IpAddr> {
    let mut iter = addrs.iter();
    match (iter.next(), iter.next()) {
        (Some(ip), None) => Ok(*ip),
        (None, _) => anyhow::bail!("{} did not resolve to any address", host),
        (Some(_), Some(_)) => anyhow::bail!(
            "{} resolved to more than one address ({:?}); check DNS or pass an IP",
            host,
            addrs
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ip_literal_resolves_to_itself() {
        let ip = resolve_single_ip("10.1.2.3").await.unwrap();
        assert_eq!(ip, "10.1.2.3".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_multiple_addresses_are_rejected() {
        let addrs: BTreeSet<IpAddr> =
            ["10.0.0.1", "10.0.0.2"].iter().map(|s| s.parse().unwrap()).collect();
        let err = single_ip("web", addrs).unwrap_err();
        assert!(err.to_string().contains("more than one address"));
    }

    #[test]
    fn test_no_addresses_is_error() {
        assert!(single_ip("web", BTreeSet::new()).is_err());
    }
}
