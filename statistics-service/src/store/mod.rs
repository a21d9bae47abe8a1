//! Aggregate query execution.

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use diesel_async::{pooled_connection::bb8::Pool, AsyncPgConnection};
use shared::*;
use tracing::debug;

use crate::queries;

type DbPool = Pool<AsyncPgConnection>;

/// Read-only aggregates over the shop database.
#[async_trait]
pub trait StatisticsStore: Send + Sync {
    async fn count_all(&self, entity: Entity) -> Result<i64, QueryError>;

    /// `None` when no row matched.
    async fn sum_field(&self, query: &SumQuery) -> Result<Option<BigDecimal>, QueryError>;

    async fn group_count(&self, query: &GroupCountQuery) -> Result<Vec<GroupRow<i64>>, QueryError>;

    async fn group_sum(&self, query: &GroupSumQuery)
        -> Result<Vec<GroupRow<BigDecimal>>, QueryError>;

    async fn joined_group_sum(
        &self,
        query: &JoinedGroupSumQuery,
    ) -> Result<Vec<GroupRow<BigDecimal>>, QueryError>;
}

pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn connection_error(err: impl std::fmt::Display) -> QueryError {
    QueryError::Connection(err.to_string())
}

#[async_trait]
impl StatisticsStore for PgStore {
    async fn count_all(&self, entity: Entity) -> Result<i64, QueryError> {
        debug!(%entity, "counting rows");
        let mut conn = self.pool.get().await.map_err(connection_error)?;
        queries::count_all(&mut conn, entity).await
    }

    async fn sum_field(&self, query: &SumQuery) -> Result<Option<BigDecimal>, QueryError> {
        debug!(?query, "running sum query");
        let mut conn = self.pool.get().await.map_err(connection_error)?;
        queries::sum_field(&mut conn, query).await
    }

    async fn group_count(&self, query: &GroupCountQuery) -> Result<Vec<GroupRow<i64>>, QueryError> {
        debug!(?query, "running grouped count query");
        let mut conn = self.pool.get().await.map_err(connection_error)?;
        queries::group_count(&mut conn, query).await
    }

    async fn group_sum(
        &self,
        query: &GroupSumQuery,
    ) -> Result<Vec<GroupRow<BigDecimal>>, QueryError> {
        debug!(?query, "running grouped sum query");
        let mut conn = self.pool.get().await.map_err(connection_error)?;
        queries::group_sum(&mut conn, query).await
    }

    async fn joined_group_sum(
        &self,
        query: &JoinedGroupSumQuery,
    ) -> Result<Vec<GroupRow<BigDecimal>>, QueryError> {
        debug!(?query, "running joined sum query");
        let mut conn = self.pool.get().await.map_err(connection_error)?;
        queries::joined_group_sum(&mut conn, query).await
    }
}
