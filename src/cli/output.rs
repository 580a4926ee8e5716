//! Output formatting for issued credentials
//!
//! Credentials go to stdout as a table, JSON or YAML. Logs stay on stderr so
//! the output can be piped. The broker session token is never part of it.

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::lease::Lease;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Yaml,
}

/// Operator-facing view of an issued lease.
#[derive(Debug, Serialize)]
pub struct CredentialView {
    pub kind: String,
    pub lease_id: String,
    pub lease_duration: u64,
    pub fields: BTreeMap<String, String>,
}

impl CredentialView {
    pub fn from_lease(lease: &Lease) -> Self {
        Self {
            kind: lease.credential().kind().to_string(),
            lease_id: lease.lease_id().to_string(),
            lease_duration: lease.lease_duration(),
            fields: lease
                .credential()
                .printable_fields()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    /// Add a field not carried by the credential itself (e.g. a generated console password).
    pub fn with_field(mut self, name: &str, value: impl Into<String>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }
}

pub fn print_credential(view: &CredentialView, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(view),
        OutputFormat::Yaml => print_yaml(view),
        OutputFormat::Table => {
            print!("{}", render_table(view));
            Ok(())
        }
    }
}

/// Print data as JSON
pub fn print_json<T: Serialize>(data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data).context("Failed to serialize to JSON")?;
    println!("{}", json);
    Ok(())
}

/// Print data as YAML
pub fn print_yaml<T: Serialize>(data: &T) -> Result<()> {
    let yaml = serde_yaml::to_string(data).context("Failed to serialize to YAML")?;
    println!("{}", yaml);
    Ok(())
}

fn render_table(view: &CredentialView) -> String {
    let width = view.fields.keys().map(String::len).max().unwrap_or(0).max("lease".len());
    let mut out = format!("\n{} credentials\n", view.kind.bold());

    for (name, value) in &view.fields {
        out.push_str(&format!(" {:<width$}  {}\n", name, value, width = width));
    }
    out.push_str(&format!(
        " {:<width$}  {} ({}s)\n",
        "lease",
        view.lease_id.dimmed(),
        view.lease_duration,
        width = width
    ));
    out
}
