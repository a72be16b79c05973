//! Analytics read service used by the HTTP API.

use async_trait::async_trait;
use teleharvest_models::{
    ChannelActivityItem, DetectionRow, MessageRow, MessageWithObject, TopObjectItem,
};

use crate::db::{self, DbPool, DetectionFilter, MessageObjectFilter};
use crate::Result;

/// Read access to the analytics views.
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    async fn search_messages(&self, q: &str, limit: i64) -> Result<Vec<MessageRow>>;

    async fn detections(&self, filter: &DetectionFilter) -> Result<Vec<DetectionRow>>;

    async fn channel_activity(&self, channel: &str, days: i32) -> Result<Vec<ChannelActivityItem>>;

    async fn top_objects(&self, limit: i64) -> Result<Vec<TopObjectItem>>;

    async fn messages_with_objects(
        &self,
        filter: &MessageObjectFilter,
    ) -> Result<Vec<MessageWithObject>>;

    /// Fails when the backing store cannot be reached.
    async fn ping(&self) -> Result<()>;
}

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgAnalyticsStore {
    pool: DbPool,
    schema: String,
}

impl PgAnalyticsStore {
    pub fn new(pool: DbPool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }
}

#[async_trait]
impl AnalyticsStore for PgAnalyticsStore {
    async fn search_messages(&self, q: &str, limit: i64) -> Result<Vec<MessageRow>> {
        db::search_messages(&self.pool, &self.schema, q, limit).await
    }

    async fn detections(&self, filter: &DetectionFilter) -> Result<Vec<DetectionRow>> {
        db::list_detections(&self.pool, &self.schema, filter).await
    }

    async fn channel_activity(&self, channel: &str, days: i32) -> Result<Vec<ChannelActivityItem>> {
        db::channel_activity(&self.pool, &self.schema, channel, days).await
    }

    async fn top_objects(&self, limit: i64) -> Result<Vec<TopObjectItem>> {
        db::top_objects(&self.pool, &self.schema, limit).await
    }

    async fn messages_with_objects(
        &self,
        filter: &MessageObjectFilter,
    ) -> Result<Vec<MessageWithObject>> {
        db::messages_with_objects(&self.pool, &self.schema, filter).await
    }

    async fn ping(&self) -> Result<()> {
        db::ping(&self.pool).await
    }
}
