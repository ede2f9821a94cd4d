//! Turns a block's declared credential requirements and a step's bindings
//! into the decrypted secrets the step runs with.
//!
//! Requirements are walked in declaration order. A failure on a required
//! entry aborts the whole resolution; a failure on an optional entry is
//! logged and the entry is left out. Callers must not run a step whose
//! resolution failed.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::credentials::{CredentialData, CredentialManager};
use crate::error::{CredentialError, CredentialResult};

mod requirements;


pub use requirements::{
    Block, BlockDefinition, CredentialBindings, CredentialScope, RequiredCredential, Step,
    StepDefinition,
};

/// Requirement name -> decrypted secret.
pub type ResolvedCredentials = BTreeMap<String, CredentialData>;

pub struct CredentialResolver {
    manager: Arc<CredentialManager>,
}

impl CredentialResolver {
    pub fn new(manager: Arc<CredentialManager>) -> Self {
        Self { manager }
    }

    /// Resolves the credentials a block declares against a step's bindings.
    pub fn resolve_for_step<B, S>(
        &self,
        block: &B,
        step: &S,
        tenant_id: Uuid,
    ) -> CredentialResult<ResolvedCredentials>
    where
        B: BlockDefinition + ?Sized,
        S: StepDefinition + ?Sized,
    {
        let required = block.required_credentials()?;
        let bindings = step.credential_bindings()?;
        self.resolve(&required, &bindings, tenant_id)
    }

    /// Resolves each requirement in order. The result holds exactly the
    /// entries that resolved.
    ///
    /// A name declared more than once is resolved once, at its first
    /// position, and is required if any declaration requires it.
    /// Declarations of one name with different scopes are rejected.
    pub fn resolve(
        &self,
        required: &[RequiredCredential],
        bindings: &CredentialBindings,
        tenant_id: Uuid,
    ) -> CredentialResult<ResolvedCredentials> {
        let requirements = merge_requirements(required)?;
        let mut resolved = ResolvedCredentials::new();

        for requirement in &requirements {
            match self.resolve_one(requirement, bindings, tenant_id) {
                Ok(Some(data)) => {
                    resolved.insert(requirement.name.clone(), data);
                }
                Ok(None) => {
                    debug!(credential = %requirement.name, "Optional credential not bound");
                }
                Err(e) if requirement.required => {
                    warn!(
                        tenant_id = %tenant_id,
                        credential = %requirement.name,
                        terminal = e.is_terminal(),
                        error = %e,
                        "Required credential failed to resolve"
                    );
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        tenant_id = %tenant_id,
                        credential = %requirement.name,
                        terminal = e.is_terminal(),
                        error = %e,
                        "Optional credential failed to resolve, skipping"
                    );
                }
            }
        }

        info!(
            tenant_id = %tenant_id,
            declared = required.len(),
            resolved = resolved.len(),
            "Credentials resolved"
        );
        Ok(resolved)
    }

    fn resolve_one(
        &self,
        requirement: &RequiredCredential,
        bindings: &CredentialBindings,
        tenant_id: Uuid,
    ) -> CredentialResult<Option<CredentialData>> {
        match requirement.scope {
            CredentialScope::System => {
                let credential = self.manager.get_system_decrypted(&requirement.name)?;
                Ok(Some(credential.data))
            }
            CredentialScope::Tenant => {
                let Some(&id) = bindings.get(&requirement.name) else {
                    if requirement.required {
                        return Err(CredentialError::MissingBinding {
                            name: requirement.name.clone(),
                        });
                    }
                    return Ok(None);
                };
                match self.manager.get_decrypted(tenant_id, id) {
                    Ok(credential) => Ok(Some(credential.data)),
                    // The bound id means nothing to the caller; name the slot.
                    Err(CredentialError::NotFound { .. }) => Err(CredentialError::not_found(
                        "credential",
                        requirement.name.clone(),
                    )),
                    Err(e) => Err(e),
                }
            }
        }
    }
}

/// Collapses repeated names into one requirement kept at its first position.
fn merge_requirements(declared: &[RequiredCredential]) -> CredentialResult<Vec<RequiredCredential>> {
    let mut merged: Vec<RequiredCredential> = Vec::with_capacity(declared.len());
    let mut positions: BTreeMap<&str, usize> = BTreeMap::new();

    for requirement in declared {
        match positions.get(requirement.name.as_str()) {
            Some(&index) => {
                let existing = &mut merged[index];
                if existing.scope != requirement.scope {
                    return Err(CredentialError::validation(
                        "credentials",
                        format!(
                            "credential '{}' is declared with conflicting scopes",
                            requirement.name
                        ),
                    ));
                }
                existing.required |= requirement.required;
                debug!(credential = %requirement.name, "Merged duplicate credential requirement");
            }
            None => {
                positions.insert(requirement.name.as_str(), merged.len());
                merged.push(requirement.clone());
            }
        }
    }
    Ok(merged)
}
