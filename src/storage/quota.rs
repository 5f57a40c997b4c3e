//! Quota Store
//!
//! Durable side of the API key gateway: key records, owning accounts and the
//! per-key usage counter. The gateway talks to the `QuotaStore` trait; the
//! bundled `InMemoryQuotaStore` backs single-process deployments and tests.
//!
//! Plaintext keys never reach the store. Only the SHA-256 hex digest and a
//! short visible prefix are kept.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use crate::models::{resolve_plan, AppError, AppResult, ErrorCode};

/// Prefix of every issued key
pub const KEY_PREFIX: &str = "sg_";

/// Random characters after the prefix
pub const KEY_RANDOM_LEN: usize = 40;

/// Characters of the raw key kept for display
pub const VISIBLE_PREFIX_LEN: usize = 10;

// ============================================
// RECORDS
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Pending,
    Banned,
    Suspended,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Pending => "pending",
            AccountStatus::Banned => "banned",
            AccountStatus::Suspended => "suspended",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, AccountStatus::Active)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(email: impl Into<String>, status: AccountStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            status,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub id: Uuid,
    pub account_id: Uuid,
    pub name: String,
    /// SHA-256 hex of the raw key, unique across all records
    pub key_hash: String,
    /// First characters of the raw key, for display only
    pub prefix: String,
    pub plan_id: String,
    pub usage: u64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Active key joined with its owning account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyWithAccount {
    pub key: ApiKeyRecord,
    pub account: Account,
}

/// Returned once at issuance; `raw_key` is not recoverable afterwards
#[derive(Debug, Clone)]
pub struct IssuedKey {
    pub raw_key: String,
    pub record: ApiKeyRecord,
}

// ============================================
// KEY MATERIAL
// ============================================

/// Surrounding whitespace is never part of a key; blank means no key
pub fn normalize_key(raw_key: &str) -> Option<&str> {
    Some(raw_key.trim()).filter(|key| !key.is_empty())
}

/// One-way hash used as the lookup identity
pub fn hash_key(raw_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// `sg_` followed by random alphanumerics
pub fn generate_raw_key() -> String {
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(KEY_RANDOM_LEN)
        .map(char::from)
        .collect();
    format!("{}{}", KEY_PREFIX, random)
}

/// Logged and stored in the clear, so never more than half the key
pub fn visible_prefix(raw_key: &str) -> String {
    let shown = VISIBLE_PREFIX_LEN.min(raw_key.chars().count() / 2);
    raw_key.chars().take(shown).collect()
}

// ============================================
// STORE TRAIT
// ============================================

#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Active key whose hash matches, joined with its account
    async fn find_active_by_hash(&self, key_hash: &str) -> AppResult<Option<KeyWithAccount>>;

    /// Atomically add one to usage and stamp `last_used_at`; returns the new count
    async fn increment_usage(&self, key_id: Uuid) -> AppResult<u64>;

    /// Fails with `STORE_CONFLICT` when the hash is already taken
    async fn insert_key(&self, record: ApiKeyRecord) -> AppResult<()>;

    /// Deactivate a key; `false` if it does not exist
    async fn revoke(&self, key_id: Uuid) -> AppResult<bool>;

    async fn upsert_account(&self, account: Account) -> AppResult<()>;

    async fn set_account_status(&self, account_id: Uuid, status: AccountStatus) -> AppResult<bool>;

    async fn get_key(&self, key_id: Uuid) -> AppResult<Option<ApiKeyRecord>>;
}

/// Issue a fresh key for an account. The plaintext is only in the return value.
pub async fn issue_key(
    store: &dyn QuotaStore,
    account_id: Uuid,
    name: &str,
    plan_id: &str,
) -> AppResult<IssuedKey> {
    let raw_key = generate_raw_key();
    let record = register_raw_key(store, account_id, &raw_key, name, plan_id).await?;
    Ok(IssuedKey { raw_key, record })
}

/// Store a caller-chosen raw key (bootstrap and tests)
pub async fn register_raw_key(
    store: &dyn QuotaStore,
    account_id: Uuid,
    raw_key: &str,
    name: &str,
    plan_id: &str,
) -> AppResult<ApiKeyRecord> {
    let raw_key = normalize_key(raw_key).ok_or_else(|| AppError::bad_request("API key must not be empty"))?;

    let record = ApiKeyRecord {
        id: Uuid::new_v4(),
        account_id,
        name: name.to_string(),
        key_hash: hash_key(raw_key),
        prefix: visible_prefix(raw_key),
        plan_id: resolve_plan(plan_id).id.to_string(),
        usage: 0,
        active: true,
        created_at: Utc::now(),
        last_used_at: None,
    };
    store.insert_key(record.clone()).await?;

    info!(key_prefix = %record.prefix, plan = %record.plan_id, "🔑 API key registered");
    Ok(record)
}

// ============================================
// IN-MEMORY STORE
// ============================================

#[derive(Debug, Default)]
pub struct InMemoryQuotaStore {
    keys: DashMap<Uuid, ApiKeyRecord>,
    by_hash: DashMap<String, Uuid>,
    accounts: DashMap<Uuid, Account>,
}

impl InMemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a key's usage counter (seeding and admin resets)
    pub fn set_usage(&self, key_id: Uuid, usage: u64) -> bool {
        match self.keys.get_mut(&key_id) {
            Some(mut record) => {
                record.usage = usage;
                true
            }
            None => false,
        }
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }
}

#[async_trait]
impl QuotaStore for InMemoryQuotaStore {
    async fn find_active_by_hash(&self, key_hash: &str) -> AppResult<Option<KeyWithAccount>> {
        let Some(key_id) = self.by_hash.get(key_hash).map(|id| *id) else {
            return Ok(None);
        };
        let Some(key) = self.keys.get(&key_id).map(|r| r.clone()) else {
            return Ok(None);
        };
        if !key.active {
            return Ok(None);
        }
        let Some(account) = self.accounts.get(&key.account_id).map(|a| a.clone()) else {
            return Ok(None);
        };
        Ok(Some(KeyWithAccount { key, account }))
    }

    async fn increment_usage(&self, key_id: Uuid) -> AppResult<u64> {
        let mut record = self
            .keys
            .get_mut(&key_id)
            .ok_or_else(|| AppError::new(ErrorCode::ApiNotFound, format!("Unknown key {}", key_id)))?;
        record.usage = record.usage.saturating_add(1);
        record.last_used_at = Some(Utc::now());
        Ok(record.usage)
    }

    async fn insert_key(&self, record: ApiKeyRecord) -> AppResult<()> {
        match self.by_hash.entry(record.key_hash.clone()) {
            Entry::Occupied(_) => Err(AppError::new(
                ErrorCode::StoreConflict,
                "An API key with this hash already exists",
            )),
            Entry::Vacant(slot) => {
                slot.insert(record.id);
                self.keys.insert(record.id, record);
                Ok(())
            }
        }
    }

    async fn revoke(&self, key_id: Uuid) -> AppResult<bool> {
        match self.keys.get_mut(&key_id) {
            Some(mut record) => {
                record.active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn upsert_account(&self, account: Account) -> AppResult<()> {
        self.accounts.insert(account.id, account);
        Ok(())
    }

    async fn set_account_status(&self, account_id: Uuid, status: AccountStatus) -> AppResult<bool> {
        match self.accounts.get_mut(&account_id) {
            Some(mut account) => {
                account.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_key(&self, key_id: Uuid) -> AppResult<Option<ApiKeyRecord>> {
        Ok(self.keys.get(&key_id).map(|r| r.clone()))
    }
}
