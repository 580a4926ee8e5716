//! `breakglass docker`: Docker client TLS certificates from the Vault PKI.

use anyhow::{Context, Result};
use clap::Args;
use serde_json::{json, Map};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, Instrument};

use super::output::{print_credential, CredentialView};
use super::{validate_broker_path, CommandContext};
use crate::credentials::{Credential, CredentialKind, TlsKeyPair};
use crate::issuer::IssueRequest;
use crate::lease_span;

#[derive(Args, Debug)]
pub struct DockerArgs {
    /// Vault PKI issue path
    #[arg(long, default_value = "ca/issue/docker")]
    pub path: String,

    /// Certificate common name (defaults to the Vault username)
    #[arg(long)]
    pub common_name: Option<String>,

    /// Directory the PEM files are written to (defaults to ~/.docker)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}

/// Where each PEM file was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PemFiles {
    pub certificate: PathBuf,
    pub private_key: PathBuf,
    pub ca: PathBuf,
}

pub async fn run(args: DockerArgs, ctx: &CommandContext) -> Result<()> {
    validate_broker_path(&args.path, "PKI path")?;

    let common_name = args.common_name.clone().unwrap_or_else(|| ctx.username.clone());
    let mut params = Map::new();
    params.insert("format".into(), json!("pem"));
    params.insert("common_name".into(), json!(common_name));

    let lease = ctx
        .issuer()
        .issue(IssueRequest::new(&args.path, CredentialKind::TlsKeyPair).with_params(params))
        .await
        .context("Could not get a Docker client certificate")?;

    let span = lease_span!(lease.lease_id(), lease.credential().kind(), path = %args.path);
    async move {
        let Credential::TlsKeyPair(pair) = lease.credential() else {
            anyhow::bail!("Expected a TLS key pair, got {}", lease.credential().kind());
        };

        let dir = match args.output_dir {
            Some(dir) => dir,
            None => docker_dir()?,
        };
        let files = write_pem_files(&dir, pair)?;
        info!(dir = %dir.display(), "Docker client certificate written");

        print_credential(&CredentialView::from_lease(&lease), ctx.output)?;
        eprintln!(
            "Certificates saved to {}. Connect with: docker -H tcp://<host>:4243 --tlsverify --tlscacert {} --tlscert {} --tlskey {} ...",
            dir.display(),
            files.ca.display(),
            files.certificate.display(),
            files.private_key.display()
        );
        Ok(())
    }
    .instrument(span)
    .await
}

fn docker_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .context("Unable to determine home directory")?;
    Ok(PathBuf::from(home).join(".docker"))
}

/// Write `cert.pem`, `key.pem` (owner-only) and `ca.pem` into `dir`.
pub fn write_pem_files(dir: &Path, pair: &TlsKeyPair) -> Result<PemFiles> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let files = PemFiles {
        certificate: dir.join("cert.pem"),
        private_key: dir.join("key.pem"),
        ca: dir.join("ca.pem"),
    };

    write_file(&files.certificate, &pair.certificate, false)?;
    write_file(&files.private_key, pair.private_key.expose_secret(), true)?;
    write_file(&files.ca, &pair.ca_bundle(), false)?;

    Ok(files)
}

fn write_file(path: &Path, contents: &str, private: bool) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(if private { 0o600 } else { 0o644 });
    }

    let mut file = options
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    // Creation mode only covers new files. Narrow an existing key before writing.
    #[cfg(unix)]
    if private {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to restrict permissions on {}", path.display()))?;
    }
    #[cfg(not(unix))]
    let _ = private;

    file.set_len(0)
        .and_then(|_| file.write_all(contents.as_bytes()))
        .and_then(|_| file.write_all(b"\n"))
        .and_then(|_| file.sync_all())
        .with_context(|| format!("Failed to write {}", path.display()))
}
