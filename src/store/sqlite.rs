//! Encrypted credential storage using SQLite.
//!
//! Secret components are stored base64-encoded; nothing in these tables can
//! be read without the master key.

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{CredentialStore, ShareStore, StoreError, StoreResult, SystemCredentialStore};
use crate::credentials::{Credential, CredentialStatus, CredentialType, SystemCredential};
use crate::crypto::EncryptedSecret;
use crate::sharing::{CredentialShare, SharePermission};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS credentials (
        id                 TEXT PRIMARY KEY,
        tenant_id          TEXT NOT NULL,
        name               TEXT NOT NULL,
        description        TEXT NOT NULL DEFAULT '',
        credential_type    TEXT NOT NULL,
        ciphertext         TEXT NOT NULL,
        encrypted_data_key TEXT NOT NULL,
        data_nonce         TEXT NOT NULL,
        data_key_nonce     TEXT NOT NULL,
        metadata           TEXT NOT NULL,
        expires_at         TEXT,
        status             TEXT NOT NULL,
        created_at         TEXT NOT NULL,
        updated_at         TEXT NOT NULL,
        UNIQUE(tenant_id, name)
    );
    CREATE INDEX IF NOT EXISTS idx_credentials_tenant ON credentials(tenant_id);

    CREATE TABLE IF NOT EXISTS system_credentials (
        id                 TEXT PRIMARY KEY,
        name               TEXT UNIQUE NOT NULL,
        description        TEXT NOT NULL DEFAULT '',
        credential_type    TEXT NOT NULL,
        ciphertext         TEXT NOT NULL,
        encrypted_data_key TEXT NOT NULL,
        data_nonce         TEXT NOT NULL,
        data_key_nonce     TEXT NOT NULL,
        metadata           TEXT NOT NULL,
        expires_at         TEXT,
        status             TEXT NOT NULL,
        created_at         TEXT NOT NULL,
        updated_at         TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS credential_shares (
        id                  TEXT PRIMARY KEY,
        credential_id       TEXT NOT NULL,
        shared_with_user_id TEXT NOT NULL,
        permission          TEXT NOT NULL,
        shared_by_user_id   TEXT NOT NULL,
        note                TEXT NOT NULL DEFAULT '',
        created_at          TEXT NOT NULL,
        expires_at          TEXT,
        UNIQUE(credential_id, shared_with_user_id)
    );
"#;

const CREDENTIAL_COLUMNS: &str = "id, tenant_id, name, description, credential_type, \
     ciphertext, encrypted_data_key, data_nonce, data_key_nonce, \
     metadata, expires_at, status, created_at, updated_at";

const SYSTEM_COLUMNS: &str = "id, name, description, credential_type, \
     ciphertext, encrypted_data_key, data_nonce, data_key_nonce, \
     metadata, expires_at, status, created_at, updated_at";

const SHARE_COLUMNS: &str = "id, credential_id, shared_with_user_id, permission, \
     shared_by_user_id, note, created_at, expires_at";

/// Credential, system credential and share records backed by SQLite.
///
/// # Thread Safety
/// - Connection is wrapped in Mutex for safe concurrent access
/// - UNIQUE constraints settle racing inserts of the same name
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Creates or opens a store and ensures the schema exists.
    ///
    /// Pass `":memory:"` for a throwaway database.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open credential DB at {}", path.display()))?;
        conn.execute_batch(SCHEMA)
            .context("Failed to create credential tables")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("credential store connection lock poisoned"))
    }
}

/// Maps a UNIQUE violation to [`StoreError::Duplicate`].
fn insert_error(err: rusqlite::Error, name: &str, what: &str) -> StoreError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &err {
        if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE {
            return StoreError::Duplicate {
                name: name.to_string(),
            };
        }
    }
    StoreError::Backend(anyhow::Error::new(err).context(format!("Failed to write {}", what)))
}

fn encode_bytes(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

fn decode_bytes(value: &str, column: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(value)
        .with_context(|| format!("Column {} is not valid base64", column))
}

fn parse_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Failed to parse {} timestamp", column))
}

fn parse_optional_timestamp(value: Option<String>, column: &str) -> Result<Option<DateTime<Utc>>> {
    value.map(|s| parse_timestamp(&s, column)).transpose()
}

fn parse_uuid(value: &str, column: &str) -> Result<Uuid> {
    Uuid::parse_str(value).with_context(|| format!("Column {} is not a valid UUID", column))
}

/// Raw text columns shared by tenant and system credential rows.
struct SecretColumns {
    description: String,
    credential_type: String,
    ciphertext: String,
    encrypted_data_key: String,
    data_nonce: String,
    data_key_nonce: String,
    metadata: String,
    expires_at: Option<String>,
    status: String,
    created_at: String,
    updated_at: String,
}

impl SecretColumns {
    /// Reads eleven columns starting at `offset`.
    fn read(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            description: row.get(offset)?,
            credential_type: row.get(offset + 1)?,
            ciphertext: row.get(offset + 2)?,
            encrypted_data_key: row.get(offset + 3)?,
            data_nonce: row.get(offset + 4)?,
            data_key_nonce: row.get(offset + 5)?,
            metadata: row.get(offset + 6)?,
            expires_at: row.get(offset + 7)?,
            status: row.get(offset + 8)?,
            created_at: row.get(offset + 9)?,
            updated_at: row.get(offset + 10)?,
        })
    }

    fn secret(&self) -> Result<EncryptedSecret> {
        Ok(EncryptedSecret {
            ciphertext: decode_bytes(&self.ciphertext, "ciphertext")?,
            encrypted_data_key: decode_bytes(&self.encrypted_data_key, "encrypted_data_key")?,
            data_nonce: decode_bytes(&self.data_nonce, "data_nonce")?,
            data_key_nonce: decode_bytes(&self.data_key_nonce, "data_key_nonce")?,
        })
    }
}

struct CredentialRow {
    id: String,
    tenant_id: String,
    name: String,
    columns: SecretColumns,
}

impl CredentialRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            name: row.get(2)?,
            columns: SecretColumns::read(row, 3)?,
        })
    }

    fn into_credential(self) -> Result<Credential> {
        let c = &self.columns;
        Ok(Credential {
            id: parse_uuid(&self.id, "id")?,
            tenant_id: parse_uuid(&self.tenant_id, "tenant_id")?,
            credential_type: c.credential_type.parse::<CredentialType>()?,
            secret: c.secret()?,
            metadata: serde_json::from_str(&c.metadata).context("Invalid metadata JSON")?,
            expires_at: parse_optional_timestamp(c.expires_at.clone(), "expires_at")?,
            status: c.status.parse::<CredentialStatus>()?,
            created_at: parse_timestamp(&c.created_at, "created_at")?,
            updated_at: parse_timestamp(&c.updated_at, "updated_at")?,
            description: self.columns.description,
            name: self.name,
        })
    }
}

struct SystemRow {
    id: String,
    name: String,
    columns: SecretColumns,
}

impl SystemRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            columns: SecretColumns::read(row, 2)?,
        })
    }

    fn into_credential(self) -> Result<SystemCredential> {
        let c = &self.columns;
        Ok(SystemCredential {
            id: parse_uuid(&self.id, "id")?,
            credential_type: c.credential_type.parse::<CredentialType>()?,
            secret: c.secret()?,
            metadata: serde_json::from_str(&c.metadata).context("Invalid metadata JSON")?,
            expires_at: parse_optional_timestamp(c.expires_at.clone(), "expires_at")?,
            status: c.status.parse::<CredentialStatus>()?,
            created_at: parse_timestamp(&c.created_at, "created_at")?,
            updated_at: parse_timestamp(&c.updated_at, "updated_at")?,
            description: self.columns.description,
            name: self.name,
        })
    }
}

struct ShareRow {
    id: String,
    credential_id: String,
    shared_with_user_id: String,
    permission: String,
    shared_by_user_id: String,
    note: String,
    created_at: String,
    expires_at: Option<String>,
}

impl ShareRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            credential_id: row.get(1)?,
            shared_with_user_id: row.get(2)?,
            permission: row.get(3)?,
            shared_by_user_id: row.get(4)?,
            note: row.get(5)?,
            created_at: row.get(6)?,
            expires_at: row.get(7)?,
        })
    }

    fn into_share(self) -> Result<CredentialShare> {
        Ok(CredentialShare {
            id: parse_uuid(&self.id, "id")?,
            credential_id: parse_uuid(&self.credential_id, "credential_id")?,
            shared_with_user_id: parse_uuid(&self.shared_with_user_id, "shared_with_user_id")?,
            permission: self.permission.parse::<SharePermission>()?,
            shared_by_user_id: parse_uuid(&self.shared_by_user_id, "shared_by_user_id")?,
            note: self.note,
            created_at: parse_timestamp(&self.created_at, "created_at")?,
            expires_at: parse_optional_timestamp(self.expires_at, "expires_at")?,
        })
    }
}

impl CredentialStore for SqliteStore {
    fn get_credential(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<Option<Credential>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM credentials WHERE tenant_id = ?1 AND id = ?2",
                    CREDENTIAL_COLUMNS
                ),
                params![tenant_id.to_string(), id.to_string()],
                CredentialRow::read,
            )
            .optional()
            .context("Failed to query credential")?;
        Ok(row.map(CredentialRow::into_credential).transpose()?)
    }

    fn list_credentials(&self, tenant_id: Uuid) -> StoreResult<Vec<Credential>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM credentials WHERE tenant_id = ?1 ORDER BY name",
                CREDENTIAL_COLUMNS
            ))
            .context("Failed to prepare query")?;
        let rows = stmt
            .query_map(params![tenant_id.to_string()], CredentialRow::read)
            .context("Failed to execute query")?;

        let mut credentials = Vec::new();
        for row in rows {
            let row = row.context("Failed to read credential row")?;
            credentials.push(row.into_credential()?);
        }
        Ok(credentials)
    }

    fn insert_credential(&self, credential: &Credential) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO credentials ({}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                CREDENTIAL_COLUMNS
            ),
            params![
                credential.id.to_string(),
                credential.tenant_id.to_string(),
                credential.name,
                credential.description,
                credential.credential_type.as_str(),
                encode_bytes(&credential.secret.ciphertext),
                encode_bytes(&credential.secret.encrypted_data_key),
                encode_bytes(&credential.secret.data_nonce),
                encode_bytes(&credential.secret.data_key_nonce),
                credential.metadata.to_string(),
                credential.expires_at.map(|dt| dt.to_rfc3339()),
                credential.status.as_str(),
                credential.created_at.to_rfc3339(),
                credential.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| insert_error(e, &credential.name, "credential"))?;
        Ok(())
    }

    fn update_credential(&self, credential: &Credential) -> StoreResult<bool> {
        let conn = self.conn()?;
        let rows_affected = conn
            .execute(
                r#"
                UPDATE credentials SET
                    name = ?3,
                    description = ?4,
                    ciphertext = ?5,
                    encrypted_data_key = ?6,
                    data_nonce = ?7,
                    data_key_nonce = ?8,
                    metadata = ?9,
                    expires_at = ?10,
                    status = ?11,
                    updated_at = ?12
                WHERE tenant_id = ?1 AND id = ?2
                "#,
                params![
                    credential.tenant_id.to_string(),
                    credential.id.to_string(),
                    credential.name,
                    credential.description,
                    encode_bytes(&credential.secret.ciphertext),
                    encode_bytes(&credential.secret.encrypted_data_key),
                    encode_bytes(&credential.secret.data_nonce),
                    encode_bytes(&credential.secret.data_key_nonce),
                    credential.metadata.to_string(),
                    credential.expires_at.map(|dt| dt.to_rfc3339()),
                    credential.status.as_str(),
                    credential.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| insert_error(e, &credential.name, "credential"))?;
        Ok(rows_affected > 0)
    }

    fn set_credential_status(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        status: CredentialStatus,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let conn = self.conn()?;
        let rows_affected = conn
            .execute(
                "UPDATE credentials SET status = ?3, updated_at = ?4 WHERE tenant_id = ?1 AND id = ?2",
                params![
                    tenant_id.to_string(),
                    id.to_string(),
                    status.as_str(),
                    updated_at.to_rfc3339()
                ],
            )
            .context("Failed to update credential status")?;
        Ok(rows_affected > 0)
    }

    fn mark_expired_if(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        expected_expires_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let conn = self.conn()?;
        let rows_affected = conn
            .execute(
                "UPDATE credentials SET status = ?3, updated_at = ?5 \
                 WHERE tenant_id = ?1 AND id = ?2 AND status = ?4 AND expires_at = ?6",
                params![
                    tenant_id.to_string(),
                    id.to_string(),
                    CredentialStatus::Expired.as_str(),
                    CredentialStatus::Active.as_str(),
                    updated_at.to_rfc3339(),
                    expected_expires_at.to_rfc3339()
                ],
            )
            .context("Failed to record credential expiry")?;
        Ok(rows_affected > 0)
    }

    fn delete_credential(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().context("Failed to begin transaction")?;
        let rows_affected = tx
            .execute(
                "DELETE FROM credentials WHERE tenant_id = ?1 AND id = ?2",
                params![tenant_id.to_string(), id.to_string()],
            )
            .context("Failed to delete credential")?;
        if rows_affected > 0 {
            tx.execute(
                "DELETE FROM credential_shares WHERE credential_id = ?1",
                params![id.to_string()],
            )
            .context("Failed to delete credential shares")?;
        }
        tx.commit().context("Failed to commit credential delete")?;
        Ok(rows_affected > 0)
    }
}

impl SystemCredentialStore for SqliteStore {
    fn get_system_credential(&self, name: &str) -> StoreResult<Option<SystemCredential>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM system_credentials WHERE name = ?1",
                    SYSTEM_COLUMNS
                ),
                params![name],
                SystemRow::read,
            )
            .optional()
            .context("Failed to query system credential")?;
        Ok(row.map(SystemRow::into_credential).transpose()?)
    }

    fn insert_system_credential(&self, credential: &SystemCredential) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO system_credentials ({}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                SYSTEM_COLUMNS
            ),
            params![
                credential.id.to_string(),
                credential.name,
                credential.description,
                credential.credential_type.as_str(),
                encode_bytes(&credential.secret.ciphertext),
                encode_bytes(&credential.secret.encrypted_data_key),
                encode_bytes(&credential.secret.data_nonce),
                encode_bytes(&credential.secret.data_key_nonce),
                credential.metadata.to_string(),
                credential.expires_at.map(|dt| dt.to_rfc3339()),
                credential.status.as_str(),
                credential.created_at.to_rfc3339(),
                credential.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| insert_error(e, &credential.name, "system credential"))?;
        Ok(())
    }

    fn set_system_credential_status(
        &self,
        name: &str,
        status: CredentialStatus,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let conn = self.conn()?;
        let rows_affected = conn
            .execute(
                "UPDATE system_credentials SET status = ?2, updated_at = ?3 WHERE name = ?1",
                params![name, status.as_str(), updated_at.to_rfc3339()],
            )
            .context("Failed to update system credential status")?;
        Ok(rows_affected > 0)
    }

    fn delete_system_credential(&self, name: &str) -> StoreResult<bool> {
        let conn = self.conn()?;
        let rows_affected = conn
            .execute(
                "DELETE FROM system_credentials WHERE name = ?1",
                params![name],
            )
            .context("Failed to delete system credential")?;
        Ok(rows_affected > 0)
    }
}

impl ShareStore for SqliteStore {
    fn upsert_share(&self, share: &CredentialShare) -> StoreResult<CredentialShare> {
        {
            let conn = self.conn()?;
            conn.execute(
                &format!(
                    r#"
                    INSERT INTO credential_shares ({})
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    ON CONFLICT(credential_id, shared_with_user_id) DO UPDATE SET
                        permission = excluded.permission,
                        shared_by_user_id = excluded.shared_by_user_id,
                        note = excluded.note,
                        expires_at = excluded.expires_at
                    "#,
                    SHARE_COLUMNS
                ),
                params![
                    share.id.to_string(),
                    share.credential_id.to_string(),
                    share.shared_with_user_id.to_string(),
                    share.permission.as_str(),
                    share.shared_by_user_id.to_string(),
                    share.note,
                    share.created_at.to_rfc3339(),
                    share.expires_at.map(|dt| dt.to_rfc3339()),
                ],
            )
            .context("Failed to store credential share")?;
        }

        self.get_share(share.credential_id, share.shared_with_user_id)?
            .ok_or_else(|| StoreError::Backend(anyhow!("credential share vanished after upsert")))
    }

    fn get_share(&self, credential_id: Uuid, user_id: Uuid) -> StoreResult<Option<CredentialShare>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM credential_shares \
                     WHERE credential_id = ?1 AND shared_with_user_id = ?2",
                    SHARE_COLUMNS
                ),
                params![credential_id.to_string(), user_id.to_string()],
                ShareRow::read,
            )
            .optional()
            .context("Failed to query credential share")?;
        Ok(row.map(ShareRow::into_share).transpose()?)
    }

    fn list_shares(&self, credential_id: Uuid) -> StoreResult<Vec<CredentialShare>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM credential_shares WHERE credential_id = ?1 ORDER BY created_at",
                SHARE_COLUMNS
            ))
            .context("Failed to prepare query")?;
        let rows = stmt
            .query_map(params![credential_id.to_string()], ShareRow::read)
            .context("Failed to execute query")?;

        let mut shares = Vec::new();
        for row in rows {
            let row = row.context("Failed to read share row")?;
            shares.push(row.into_share()?);
        }
        Ok(shares)
    }

    fn delete_share(&self, credential_id: Uuid, share_id: Uuid) -> StoreResult<bool> {
        let conn = self.conn()?;
        let rows_affected = conn
            .execute(
                "DELETE FROM credential_shares WHERE credential_id = ?1 AND id = ?2",
                params![credential_id.to_string(), share_id.to_string()],
            )
            .context("Failed to delete credential share")?;
        Ok(rows_affected > 0)
    }
}
