// データベース接続アダプター
//
// SQLxを使用したデータベース接続プールの作成を行います。
// PostgreSQL、MySQL、SQLiteに対応した統一されたインターフェースを提供します。

use crate::core::config::{DatabaseConfig, Dialect};
use crate::core::error::DatabaseError;
use sqlx::pool::PoolOptions;
use sqlx::{Any, AnyPool};
use std::time::Duration;
use tracing::debug;

/// 接続取得のデフォルトタイムアウト（秒）
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// データベース接続サービス
#[derive(Debug, Clone, Default)]
pub struct DatabaseConnectionService {}

impl DatabaseConnectionService {
    /// 新しいDatabaseConnectionServiceを作成
    pub fn new() -> Self {
        Self {}
    }

    /// データベース接続プールを作成
    ///
    /// `timeout` は設定ファイルの値より優先されます。
    pub async fn create_pool(
        &self,
        dialect: Dialect,
        config: &DatabaseConfig,
        timeout: Option<u64>,
    ) -> Result<AnyPool, DatabaseError> {
        let connection_string = config.to_connection_string(dialect);
        let timeout_secs = timeout.or(config.timeout);
        debug!(%dialect, database = %config.database, "Connecting to database");

        self.create_pool_options(dialect, timeout_secs)
            .connect(&connection_string)
            .await
            .map_err(|e| DatabaseError::Connection {
                message: format!("Failed to create {} connection pool", dialect),
                cause: e.to_string(),
            })
    }

    /// プールオプションを作成
    ///
    /// SQLiteは単一接続に制限し、書き込みのロック競合を避けます。
    pub fn create_pool_options(&self, dialect: Dialect, timeout_secs: Option<u64>) -> PoolOptions<Any> {
        let max_connections = match dialect {
            Dialect::SQLite => 1,
            Dialect::PostgreSQL | Dialect::MySQL => 5,
        };
        PoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(
                timeout_secs.unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS),
            ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_service() {
        let service = DatabaseConnectionService::new();
        assert!(format!("{:?}", service).contains("DatabaseConnectionService"));
    }

    #[test]
    fn test_create_pool_options() {
        let service = DatabaseConnectionService::new();
        let options = service.create_pool_options(Dialect::SQLite, Some(5));
        assert_eq!(options.get_max_connections(), 1);
        assert_eq!(options.get_acquire_timeout(), Duration::from_secs(5));

        let options = service.create_pool_options(Dialect::PostgreSQL, None);
        assert_eq!(options.get_max_connections(), 5);
        assert_eq!(
            options.get_acquire_timeout(),
            Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS)
        );
    }
}
