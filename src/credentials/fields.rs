use serde_json::{Map, Value};

use super::{CredentialKind, DecodeError};

/// Typed accessors over a raw payload, tagged with the kind being decoded.
pub(super) struct Fields<'a> {
    kind: CredentialKind,
    data: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    pub(super) fn new(kind: CredentialKind, data: &'a Map<String, Value>) -> Self {
        Self { kind, data }
    }

    fn present(&self, field: &'static str) -> Option<&'a Value> {
        match self.data.get(field) {
            None | Some(Value::Null) => None,
            Some(value) => Some(value),
        }
    }

    fn mistyped(&self, field: &'static str, expected: &'static str) -> DecodeError {
        DecodeError::Mistyped { kind: self.kind, field, expected }
    }

    pub(super) fn required(&self, field: &'static str) -> Result<String, DecodeError> {
        match self.present(field) {
            None => Err(DecodeError::MissingField { kind: self.kind, field }),
            Some(Value::String(s)) if s.is_empty() => {
                Err(DecodeError::EmptyField { kind: self.kind, field })
            }
            Some(Value::String(s)) => Ok(s.clone()),
            Some(_) => Err(self.mistyped(field, "string")),
        }
    }

    pub(super) fn optional(&self, field: &'static str) -> Result<Option<String>, DecodeError> {
        match self.present(field) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(self.mistyped(field, "string")),
        }
    }

    /// Ports arrive as numbers from some backends and strings from others.
    pub(super) fn port(&self, field: &'static str) -> Result<u16, DecodeError> {
        let value = self
            .present(field)
            .ok_or(DecodeError::MissingField { kind: self.kind, field })?;

        let parsed = match value {
            Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
            Value::String(s) if s.is_empty() => {
                return Err(DecodeError::EmptyField { kind: self.kind, field })
            }
            Value::String(s) => s.parse::<u16>().ok(),
            _ => None,
        };

        match parsed {
            Some(port) if port > 0 => Ok(port),
            _ => Err(self.mistyped(field, "port number")),
        }
    }

    pub(super) fn string_list(
        &self,
        field: &'static str,
    ) -> Result<Option<Vec<String>>, DecodeError> {
        match self.present(field) {
            None => Ok(None),
            Some(Value::Array(items)) => {
                let list = items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => Ok(s.clone()),
                        _ => Err(self.mistyped(field, "array of strings")),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Some(list))
            }
            Some(_) => Err(self.mistyped(field, "array of strings")),
        }
    }
}
