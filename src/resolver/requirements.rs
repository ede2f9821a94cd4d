//! What a block needs and what a step provides.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::{CredentialError, CredentialResult};

/// Where a required credential is looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialScope {
    /// Platform-wide credential, looked up by name
    System,
    /// Tenant credential, looked up through the step's binding
    #[default]
    Tenant,
}

/// A credential slot declared by a block definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredCredential {
    pub name: String,
    #[serde(default)]
    pub scope: CredentialScope,
    #[serde(default)]
    pub required: bool,
}

impl RequiredCredential {
    pub fn required(name: impl Into<String>, scope: CredentialScope) -> Self {
        Self {
            name: name.into(),
            scope,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, scope: CredentialScope) -> Self {
        Self {
            name: name.into(),
            scope,
            required: false,
        }
    }
}

/// Requirement name -> bound tenant credential id.
pub type CredentialBindings = BTreeMap<String, Uuid>;

/// Anything that declares the credentials it needs.
pub trait BlockDefinition {
    /// Requirements in declaration order.
    fn required_credentials(&self) -> CredentialResult<Vec<RequiredCredential>>;
}

/// Anything that binds requirement names to tenant credentials.
pub trait StepDefinition {
    fn credential_bindings(&self) -> CredentialResult<CredentialBindings>;
}

impl BlockDefinition for [RequiredCredential] {
    fn required_credentials(&self) -> CredentialResult<Vec<RequiredCredential>> {
        Ok(self.to_vec())
    }
}

impl BlockDefinition for Vec<RequiredCredential> {
    fn required_credentials(&self) -> CredentialResult<Vec<RequiredCredential>> {
        Ok(self.clone())
    }
}

impl StepDefinition for CredentialBindings {
    fn credential_bindings(&self) -> CredentialResult<CredentialBindings> {
        Ok(self.clone())
    }
}

/// A block definition as stored: an id plus its JSON schema.
///
/// Requirements are read from `schema.credentials`, or from the schema
/// itself when it is a bare array. A schema without either declares none.
#[derive(Debug, Clone)]
pub struct Block {
    pub id: String,
    pub schema: Value,
}

impl Block {
    pub fn new(id: impl Into<String>, schema: Value) -> Self {
        Self {
            id: id.into(),
            schema,
        }
    }
}

impl BlockDefinition for Block {
    fn required_credentials(&self) -> CredentialResult<Vec<RequiredCredential>> {
        let declared = match &self.schema {
            Value::Array(_) => &self.schema,
            Value::Object(fields) => match fields.get("credentials") {
                Some(credentials) => credentials,
                None => return Ok(Vec::new()),
            },
            Value::Null => return Ok(Vec::new()),
            _ => {
                return Err(CredentialError::validation(
                    "schema",
                    format!("block '{}' schema must be an object or an array", self.id),
                ))
            }
        };
        if declared.is_null() {
            return Ok(Vec::new());
        }

        let requirements: Vec<RequiredCredential> = serde_json::from_value(declared.clone())
            .map_err(|e| {
                CredentialError::validation(
                    "credentials",
                    format!("block '{}' declares malformed credentials: {}", self.id, e),
                )
            })?;

        if let Some(blank) = requirements.iter().position(|r| r.name.trim().is_empty()) {
            return Err(CredentialError::validation(
                "credentials",
                format!("block '{}' credential #{} has no name", self.id, blank),
            ));
        }
        Ok(requirements)
    }
}

/// A step as stored: an id plus its JSON config. Bindings live in
/// `config.credentials` as `{ "<requirement>": "<credential uuid>" }`.
#[derive(Debug, Clone)]
pub struct Step {
    pub id: String,
    pub config: Value,
}

impl Step {
    pub fn new(id: impl Into<String>, config: Value) -> Self {
        Self {
            id: id.into(),
            config,
        }
    }
}

impl StepDefinition for Step {
    fn credential_bindings(&self) -> CredentialResult<CredentialBindings> {
        let bound = match self.config.get("credentials") {
            None | Some(Value::Null) => return Ok(CredentialBindings::new()),
            Some(Value::Object(bound)) => bound,
            Some(_) => {
                return Err(CredentialError::validation(
                    "credentials",
                    format!("step '{}' credentials must be an object", self.id),
                ))
            }
        };

        let mut bindings = CredentialBindings::new();
        for (name, value) in bound {
            let id = value
                .as_str()
                .and_then(|s| Uuid::parse_str(s).ok())
                .ok_or_else(|| {
                    CredentialError::validation(
                        "credentials",
                        format!("step '{}' binds '{}' to an invalid credential id", self.id, name),
                    )
                })?;
            bindings.insert(name.clone(), id);
        }
        Ok(bindings)
    }
}
