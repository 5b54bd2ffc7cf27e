//! Postgres row sink.
//!
//! [`PostgresRowSink`] implements [`RowSink`] over a `deadpool-postgres`
//! pool: each batch becomes one parameterized multi-row `INSERT ... VALUES`
//! statement built from the configured statement prefix.

use async_trait::async_trait;
use bytes::BytesMut;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use tracing::debug;

use crate::error::{BridgeError, BridgeResult};

use super::config::PostgresSinkConfig;
use super::row::{PersistRow, SqlValue};

impl ToSql for SqlValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            Self::Null => Ok(IsNull::Yes),
            Self::Bool(v) => v.to_sql(ty, out),
            Self::BigInt(v) => v.to_sql(ty, out),
            Self::Double(v) => v.to_sql(ty, out),
            Self::Text(v) => v.to_sql(ty, out),
        }
    }

    // Column types come from the configured statement; mismatches surface
    // as insert errors from the server.
    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// [`RowSink`] backed by a pooled Postgres connection.
pub struct PostgresRowSink {
    pool: Pool,
    insert_statement: String,
}

impl PostgresRowSink {
    /// Creates a sink with a connection pool for the configured database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection string cannot be parsed or the
    /// pool cannot be built.
    pub fn new(config: &PostgresSinkConfig) -> BridgeResult<Self> {
        let pg_config: tokio_postgres::Config = config.connection_string.parse()?;

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let mgr = Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config);
        let pool = Pool::builder(mgr)
            .max_size(config.max_pool_size)
            .build()
            .map_err(|err| BridgeError::Storage(err.to_string()))?;

        Ok(Self {
            pool,
            insert_statement: config.insert_statement.clone(),
        })
    }

    /// Builds the statement text for `row_count` rows of `width` parameters.
    fn bulk_statement(&self, row_count: usize, width: usize) -> String {
        let mut sql = String::with_capacity(self.insert_statement.len() + row_count * width * 4);
        sql.push_str(&self.insert_statement);
        sql.push_str(" VALUES ");
        let mut param = 1;
        for row in 0..row_count {
            if row > 0 {
                sql.push_str(", ");
            }
            sql.push('(');
            for col in 0..width {
                if col > 0 {
                    sql.push_str(", ");
                }
                sql.push('$');
                sql.push_str(&param.to_string());
                param += 1;
            }
            sql.push(')');
        }
        sql
    }
}

#[async_trait]
impl crate::sink::RowSink for PostgresRowSink {
    async fn insert_rows(&self, rows: &[PersistRow]) -> BridgeResult<()> {
        let Some(first) = rows.first() else {
            return Ok(());
        };
        let width = first.len();
        if rows.iter().any(|row| row.len() != width) {
            return Err(BridgeError::Storage(
                "rows in a batch must have equal widths".into(),
            ));
        }

        let statement = self.bulk_statement(rows.len(), width);
        let params: Vec<&(dyn ToSql + Sync)> = rows
            .iter()
            .flat_map(|row| row.iter().map(|value| value as &(dyn ToSql + Sync)))
            .collect();

        let client = self
            .pool
            .get()
            .await
            .map_err(|err| BridgeError::Storage(err.to_string()))?;
        let inserted = client.execute(statement.as_str(), &params).await?;
        debug!(rows = inserted, "bulk insert committed");
        Ok(())
    }
}

impl std::fmt::Debug for PostgresRowSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresRowSink")
            .field("insert_statement", &self.insert_statement)
            .finish_non_exhaustive()
    }
}
