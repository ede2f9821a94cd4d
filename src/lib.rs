// Envelope encryption of secret payloads
pub mod crypto;

// Credential records, payloads and lifecycle
pub mod credentials;

// Delegation of credentials to other users
pub mod sharing;

// Block requirements + step bindings -> decrypted secrets
pub mod resolver;

// Outbound auth header synthesis
pub mod auth;

// Persistence adapters (SQLite, in-memory)
pub mod store;

// Configuration loading
pub mod config;

pub mod error;

pub use auth::{get_auth_header, AuthHeader};
pub use credentials::{
    AuthSecret, Credential, CredentialData, CredentialManager, CredentialStatus, CredentialType,
    SystemCredential, TokenSecret,
};
pub use crypto::{EnvelopeCipher, MasterKey};
pub use error::{CredentialError, CredentialResult};
pub use resolver::{
    Block, BlockDefinition, CredentialBindings, CredentialResolver, CredentialScope,
    RequiredCredential, ResolvedCredentials, Step, StepDefinition,
};
pub use sharing::{SharePermission, SharingService};
