//! Identity resolution: turning submitted emails into user ids.
//!
//! Resolution always happens before a transaction opens, so a directory
//! failure aborts the request without any write.

use async_trait::async_trait;
use capstone_core::error::CoreError;
use capstone_core::types::DbId;
use capstone_db::repositories::UserRepo;
use capstone_db::DbPool;

/// A resolved user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: DbId,
    pub email: String,
    pub role: String,
}

/// Looks users up by email.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// `Ok(None)` when no user has that email; `Err` only when the lookup
    /// itself failed.
    async fn resolve(&self, email: &str) -> Result<Option<Identity>, CoreError>;
}

/// Resolves against the `users` table.
pub struct DirectoryResolver {
    pool: DbPool,
}

impl DirectoryResolver {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityResolver for DirectoryResolver {
    async fn resolve(&self, email: &str) -> Result<Option<Identity>, CoreError> {
        let user = UserRepo::find_by_email(&self.pool, email)
            .await
            .map_err(|e| CoreError::Upstream(format!("identity lookup failed: {e}")))?;
        Ok(user.map(|u| Identity {
            id: u.id,
            email: u.email,
            role: u.role,
        }))
    }
}

/// Resolve every email in `emails`, reporting the first unknown one as a
/// field error on `field`. Repeated users collapse to their first position.
pub async fn resolve_all(
    resolver: &dyn IdentityResolver,
    field: &str,
    emails: &[String],
) -> Result<Vec<Identity>, CoreError> {
    let mut resolved: Vec<Identity> = Vec::with_capacity(emails.len());
    for email in emails {
        let identity = resolver
            .resolve(email)
            .await?
            .ok_or_else(|| CoreError::field(field, format!("No user found with email {email}")))?;
        if !resolved.iter().any(|r| r.id == identity.id) {
            resolved.push(identity);
        }
    }
    Ok(resolved)
}
