//! Typed credentials decoded from broker payloads.
//!
//! Each [`CredentialKind`] has a fixed schema. Decoding checks every required
//! field for presence, type and non-emptiness before a [`Credential`] exists,
//! so nothing downstream ever inspects untyped JSON.

mod fields;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::broker::SecretString;
use fields::Fields;

/// The credential variants the broker can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialKind {
    /// Cloud IAM access key pair
    CloudIdentity,
    /// Database username/password
    DatabaseLogin,
    /// One-time SSH key for a specific host
    RemoteShellKey,
    /// X.509 certificate, private key and CA bundle
    TlsKeyPair,
}

impl CredentialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CloudIdentity => "cloud-identity",
            Self::DatabaseLogin => "database-login",
            Self::RemoteShellKey => "remote-shell-key",
            Self::TlsKeyPair => "tls-key-pair",
        }
    }

    /// Whether the target system accepts this credential only after a propagation delay.
    pub fn requires_activation(&self) -> bool {
        matches!(self, Self::CloudIdentity)
    }

    /// Whether issuance takes request parameters (and so goes through a broker write).
    pub fn requires_params(&self) -> bool {
        matches!(self, Self::RemoteShellKey | Self::TlsKeyPair)
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A broker payload that does not match the requested credential schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("{kind} credential is missing required field '{field}'")]
    MissingField { kind: CredentialKind, field: &'static str },

    #[error("{kind} credential field '{field}' is empty")]
    EmptyField { kind: CredentialKind, field: &'static str },

    #[error("{kind} credential field '{field}' has the wrong type (expected {expected})")]
    Mistyped { kind: CredentialKind, field: &'static str, expected: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudIdentity {
    pub access_key: String,
    pub secret_key: SecretString,
    pub security_token: Option<SecretString>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseLogin {
    pub username: String,
    pub password: SecretString,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteShellKey {
    pub key: SecretString,
    pub key_type: Option<String>,
    pub username: String,
    pub ip: String,
    pub port: u16,
}

#[derive(Clone, PartialEq, Eq)]
pub struct TlsKeyPair {
    pub certificate: String,
    pub private_key: SecretString,
    pub issuing_ca: String,
    pub ca_chain: Option<Vec<String>>,
    pub serial_number: Option<String>,
}

impl TlsKeyPair {
    /// PEM bundle of the issuing chain, falling back to the issuing CA alone.
    pub fn ca_bundle(&self) -> String {
        match &self.ca_chain {
            Some(chain) if !chain.is_empty() => chain.join("\n"),
            _ => self.issuing_ca.clone(),
        }
    }
}

impl fmt::Debug for TlsKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsKeyPair")
            .field("certificate", &format!("[{} bytes PEM]", self.certificate.len()))
            .field("private_key", &self.private_key)
            .field("issuing_ca", &format!("[{} bytes PEM]", self.issuing_ca.len()))
            .field("ca_chain", &self.ca_chain.as_ref().map(Vec::len))
            .field("serial_number", &self.serial_number)
            .finish()
    }
}

/// A decoded, immutable credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    CloudIdentity(CloudIdentity),
    DatabaseLogin(DatabaseLogin),
    RemoteShellKey(RemoteShellKey),
    TlsKeyPair(TlsKeyPair),
}

impl Credential {
    /// Decode `data` as `kind`, checking the variant's schema.
    pub fn decode(kind: CredentialKind, data: &Map<String, Value>) -> Result<Self, DecodeError> {
        let f = Fields::new(kind, data);

        let credential = match kind {
            CredentialKind::CloudIdentity => Self::CloudIdentity(CloudIdentity {
                access_key: f.required("access_key")?,
                secret_key: f.required("secret_key")?.into(),
                security_token: f.optional("security_token")?.map(SecretString::from),
            }),
            CredentialKind::DatabaseLogin => Self::DatabaseLogin(DatabaseLogin {
                username: f.required("username")?,
                password: f.required("password")?.into(),
            }),
            CredentialKind::RemoteShellKey => Self::RemoteShellKey(RemoteShellKey {
                key: f.required("key")?.into(),
                key_type: f.optional("key_type")?,
                username: f.required("username")?,
                ip: f.required("ip")?,
                port: f.port("port")?,
            }),
            CredentialKind::TlsKeyPair => Self::TlsKeyPair(TlsKeyPair {
                certificate: f.required("certificate")?,
                private_key: f.required("private_key")?.into(),
                issuing_ca: f.required("issuing_ca")?,
                ca_chain: f.string_list("ca_chain")?,
                serial_number: f.optional("serial_number")?,
            }),
        };

        Ok(credential)
    }

    pub fn kind(&self) -> CredentialKind {
        match self {
            Self::CloudIdentity(_) => CredentialKind::CloudIdentity,
            Self::DatabaseLogin(_) => CredentialKind::DatabaseLogin,
            Self::RemoteShellKey(_) => CredentialKind::RemoteShellKey,
            Self::TlsKeyPair(_) => CredentialKind::TlsKeyPair,
        }
    }

    /// Re-encode the known fields in broker payload shape. Exposes secrets.
    ///
    /// Optional fields the broker sent empty come back empty; only absent or
    /// null fields are omitted.
    pub fn to_payload(&self) -> Map<String, Value> {
        let mut out = Map::new();
        let mut put = |k: &str, v: Value| {
            out.insert(k.to_string(), v);
        };

        match self {
            Self::CloudIdentity(c) => {
                put("access_key", c.access_key.clone().into());
                put("secret_key", c.secret_key.expose_secret().into());
                if let Some(token) = &c.security_token {
                    put("security_token", token.expose_secret().into());
                }
            }
            Self::DatabaseLogin(c) => {
                put("username", c.username.clone().into());
                put("password", c.password.expose_secret().into());
            }
            Self::RemoteShellKey(c) => {
                put("key", c.key.expose_secret().into());
                if let Some(key_type) = &c.key_type {
                    put("key_type", key_type.clone().into());
                }
                put("username", c.username.clone().into());
                put("ip", c.ip.clone().into());
                put("port", c.port.into());
            }
            Self::TlsKeyPair(c) => {
                put("certificate", c.certificate.clone().into());
                put("private_key", c.private_key.expose_secret().into());
                put("issuing_ca", c.issuing_ca.clone().into());
                if let Some(chain) = &c.ca_chain {
                    put("ca_chain", chain.clone().into());
                }
                if let Some(serial) = &c.serial_number {
                    put("serial_number", serial.clone().into());
                }
            }
        }

        out
    }

    /// Field/value pairs shown to the operator. Exposes secrets; never log the result.
    pub fn printable_fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::CloudIdentity(c) => {
                let mut fields = vec![
                    ("access_key", c.access_key.clone()),
                    ("secret_key", c.secret_key.expose_secret().to_string()),
                ];
                if let Some(token) = c.security_token.as_ref().filter(|t| !t.expose_secret().is_empty()) {
                    fields.push(("security_token", token.expose_secret().to_string()));
                }
                fields
            }
            Self::DatabaseLogin(c) => vec![
                ("username", c.username.clone()),
                ("password", c.password.expose_secret().to_string()),
            ],
            Self::RemoteShellKey(c) => vec![
                ("username", c.username.clone()),
                ("password", c.key.expose_secret().to_string()),
                ("ip", c.ip.clone()),
                ("port", c.port.to_string()),
            ],
            Self::TlsKeyPair(c) => {
                let mut fields = vec![("certificate", c.certificate.clone())];
                if let Some(serial) = &c.serial_number {
                    fields.push(("serial_number", serial.clone()));
                }
                fields
            }
        }
    }
}
