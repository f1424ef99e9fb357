use async_trait::async_trait;

use shared_database::{StoreClient, StoreError};
use shared_models::SessionRecord;

/// Boundary to the external session store.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// `Ok(None)` when the store answered but does not know the token.
    async fn lookup(&self, token: &str) -> Result<Option<SessionRecord>, StoreError>;

    async fn refresh(&self, token: &str) -> Result<SessionRecord, StoreError>;
}

#[async_trait]
impl SessionStore for StoreClient {
    async fn lookup(&self, token: &str) -> Result<Option<SessionRecord>, StoreError> {
        self.fetch_session(token).await
    }

    async fn refresh(&self, token: &str) -> Result<SessionRecord, StoreError> {
        self.refresh_session(token).await
    }
}
