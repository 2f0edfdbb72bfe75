// SQL台帳ストア
//
// 台帳テーブルの管理とトランザクション制御を担当するストア。
// データベース固有のSQL構文を抽象化し、マイグレーションの適用と取り消しを
// SQL文の実行と台帳の更新を1つのトランザクションで行います。
//
// MySQLではDDLが暗黙的にコミットされるため、トランザクションでは原子性を
// 保証できません。その場合は先に「pending」状態の行を書き込み、SQL文の実行後に
// 状態を確定させます。途中で失敗して残った行は次回の読み込みで検出されます。

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Any, AnyConnection, AnyPool, Connection, Row, Transaction};
use tracing::{debug, warn};

use crate::core::config::{Dialect, TABLE_NAME_PATTERN};
use crate::core::error::DatabaseError;
use crate::core::ledger::LedgerStore;
use crate::core::migration::{LedgerEntry, Statement};
use crate::core::module::ModuleName;

/// 台帳行の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerRowState {
    /// 適用済み
    Applied,
    /// 適用または取り消しの途中
    Pending,
}

impl LedgerRowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerRowState::Applied => "applied",
            LedgerRowState::Pending => "pending",
        }
    }
}

/// SQL台帳ストア
#[derive(Debug, Clone)]
pub struct SqlLedgerStore {
    pool: AnyPool,
    dialect: Dialect,
    table: String,
    write_ahead: bool,
}

impl SqlLedgerStore {
    /// 新しいSqlLedgerStoreを作成
    ///
    /// テーブル名はSQLに直接埋め込まれるため、識別子として検証します。
    /// DDLをトランザクションで巻き戻せない方言では先行書き込みを使用します。
    pub fn new(pool: AnyPool, dialect: Dialect, table: &str) -> Result<Self, DatabaseError> {
        Ok(Self {
            pool,
            dialect,
            table: validate_table_name(table)?,
            write_ahead: !supports_transactional_ddl(dialect),
        })
    }

    /// 先行書き込み（pending行）を使うかどうかを設定
    pub fn with_write_ahead(mut self, enabled: bool) -> Self {
        self.write_ahead = enabled;
        self
    }

    /// 先行書き込みを使用しているか
    pub fn uses_write_ahead(&self) -> bool {
        self.write_ahead
    }

    /// 台帳テーブル作成SQLを生成
    pub fn generate_create_table_sql(&self) -> String {
        let text = match self.dialect {
            Dialect::PostgreSQL | Dialect::MySQL => "VARCHAR(255)",
            Dialect::SQLite => "TEXT",
        };
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (\n    module {text} NOT NULL,\n    version {text} NOT NULL,\n    applied_at {text} NOT NULL,\n    checksum {text} NOT NULL,\n    state {text} NOT NULL,\n    PRIMARY KEY (module, version)\n)",
            table = self.table,
            text = text
        )
    }

    /// テーブル存在確認SQLを生成
    ///
    /// 接続中のスキーマに限定し、別スキーマの同名テーブルを拾わないようにします。
    pub fn generate_table_exists_sql(&self) -> String {
        match self.dialect {
            Dialect::PostgreSQL => format!(
                "SELECT table_name FROM information_schema.tables WHERE table_schema = current_schema() AND table_name = '{}'",
                self.table
            ),
            Dialect::MySQL => format!(
                "SELECT table_name FROM information_schema.tables WHERE table_schema = DATABASE() AND table_name = '{}'",
                self.table
            ),
            Dialect::SQLite => format!(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = '{}'",
                self.table
            ),
        }
    }

    /// 台帳読み込みSQLを生成
    pub fn generate_select_sql(&self) -> String {
        format!(
            "SELECT version, applied_at, checksum, state FROM {} WHERE module = {} ORDER BY applied_at, version",
            self.table,
            self.placeholder(1)
        )
    }

    /// 台帳末尾取得SQLを生成
    pub fn generate_select_head_sql(&self) -> String {
        format!(
            "SELECT version FROM {} WHERE module = {} ORDER BY applied_at DESC, version DESC LIMIT 1",
            self.table,
            self.placeholder(1)
        )
    }

    /// エントリ追加SQLとバインドパラメータを生成
    pub fn generate_insert_query(
        &self,
        module: &ModuleName,
        entry: &LedgerEntry,
        state: LedgerRowState,
    ) -> (String, Vec<String>) {
        let sql = format!(
            "INSERT INTO {} (module, version, applied_at, checksum, state) VALUES ({}, {}, {}, {}, {})",
            self.table,
            self.placeholder(1),
            self.placeholder(2),
            self.placeholder(3),
            self.placeholder(4),
            self.placeholder(5)
        );
        let params = vec![
            module.to_string(),
            entry.unit_id.clone(),
            format_timestamp(entry.applied_at),
            entry.checksum.clone().unwrap_or_default(),
            state.as_str().to_string(),
        ];
        (sql, params)
    }

    /// 状態更新SQLとバインドパラメータを生成
    pub fn generate_update_state_query(
        &self,
        module: &ModuleName,
        unit_id: &str,
        state: LedgerRowState,
    ) -> (String, Vec<String>) {
        let sql = format!(
            "UPDATE {} SET state = {} WHERE module = {} AND version = {}",
            self.table,
            self.placeholder(1),
            self.placeholder(2),
            self.placeholder(3)
        );
        (
            sql,
            vec![
                state.as_str().to_string(),
                module.to_string(),
                unit_id.to_string(),
            ],
        )
    }

    /// エントリ削除SQLとバインドパラメータを生成
    pub fn generate_delete_query(&self, module: &ModuleName, unit_id: &str) -> (String, Vec<String>) {
        let sql = format!(
            "DELETE FROM {} WHERE module = {} AND version = {}",
            self.table,
            self.placeholder(1),
            self.placeholder(2)
        );
        (sql, vec![module.to_string(), unit_id.to_string()])
    }

    fn placeholder(&self, index: usize) -> String {
        match self.dialect {
            Dialect::PostgreSQL => format!("${}", index),
            Dialect::MySQL | Dialect::SQLite => "?".to_string(),
        }
    }

    /// 台帳テーブルが存在するか確認
    pub async fn table_exists(&self) -> Result<bool, DatabaseError> {
        let sql = self.generate_table_exists_sql();
        let row = sqlx::query(&sql)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| query_error("Failed to check ledger table", &sql, e))?;
        Ok(row.is_some())
    }

    async fn acquire(&self) -> Result<sqlx::pool::PoolConnection<Any>, DatabaseError> {
        self.pool
            .acquire()
            .await
            .map_err(|e| DatabaseError::Connection {
                message: "Failed to acquire connection".to_string(),
                cause: e.to_string(),
            })
    }

    /// 末尾以外のエントリは取り消さない
    async fn ensure_head(
        &self,
        conn: &mut AnyConnection,
        module: &ModuleName,
        unit_id: &str,
    ) -> Result<(), DatabaseError> {
        let head_sql = self.generate_select_head_sql();
        let head: Option<String> = sqlx::query(&head_sql)
            .bind(module.to_string())
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| query_error("Failed to read ledger head", &head_sql, e))?
            .map(|row| row.try_get(0))
            .transpose()
            .map_err(|e| query_error("Failed to decode ledger head", &head_sql, e))?;
        if head.as_deref() != Some(unit_id) {
            return Err(DatabaseError::Transaction {
                message: format!(
                    "Migration {} is not the last applied migration of {} (head: {})",
                    unit_id,
                    module,
                    head.as_deref().unwrap_or("none")
                ),
            });
        }
        Ok(())
    }

    /// pending行を書き込んでから適用する
    async fn apply_with_marker(
        &self,
        module: &ModuleName,
        entry: &LedgerEntry,
        statements: &[Statement],
    ) -> Result<(), DatabaseError> {
        let mut conn = self.acquire().await?;
        let (sql, params) = self.generate_insert_query(module, entry, LedgerRowState::Pending);
        execute_with_params(&mut conn, &sql, &params, "Failed to record pending migration")
            .await?;

        let mut tx = begin(&mut conn).await?;
        if let Err((executed, error)) = execute_statements(&mut tx, statements).await {
            rollback(tx).await;
            return Err(self
                .abandon_marker(&mut conn, module, &entry.unit_id, executed, None, error)
                .await);
        }

        let (sql, params) =
            self.generate_update_state_query(module, &entry.unit_id, LedgerRowState::Applied);
        execute_with_params(&mut tx, &sql, &params, "Failed to finalize migration record")
            .await?;
        commit(tx).await?;
        debug!(module = %module, version = %entry.unit_id, "Ledger entry appended (write-ahead)");
        Ok(())
    }

    /// 行をpendingに戻してから取り消す
    async fn revert_with_marker(
        &self,
        module: &ModuleName,
        unit_id: &str,
        statements: &[Statement],
    ) -> Result<(), DatabaseError> {
        let mut conn = self.acquire().await?;
        self.ensure_head(&mut conn, module, unit_id).await?;

        let (sql, params) = self.generate_update_state_query(module, unit_id, LedgerRowState::Pending);
        execute_with_params(&mut conn, &sql, &params, "Failed to mark migration pending").await?;

        let mut tx = begin(&mut conn).await?;
        if let Err((executed, error)) = execute_statements(&mut tx, statements).await {
            rollback(tx).await;
            return Err(self
                .abandon_marker(
                    &mut conn,
                    module,
                    unit_id,
                    executed,
                    Some(LedgerRowState::Applied),
                    error,
                )
                .await);
        }

        let (sql, params) = self.generate_delete_query(module, unit_id);
        let removed =
            execute_with_params(&mut tx, &sql, &params, "Failed to remove migration record")
                .await?;
        ensure_single_removal(unit_id, removed)?;
        commit(tx).await?;
        debug!(module = %module, version = %unit_id, "Ledger entry removed (write-ahead)");
        Ok(())
    }

    /// 実行に失敗したpending行の後始末
    ///
    /// 最初の文で失敗した場合はスキーマが変わっていないため、行を元に戻します。
    /// それ以外はpendingのまま残し、次回の読み込みで中断として報告させます。
    async fn abandon_marker(
        &self,
        conn: &mut AnyConnection,
        module: &ModuleName,
        unit_id: &str,
        executed: usize,
        restore: Option<LedgerRowState>,
        error: DatabaseError,
    ) -> DatabaseError {
        if executed > 0 {
            warn!(
                module = %module,
                version = %unit_id,
                executed,
                "Migration failed after partial execution; ledger row left pending"
            );
            return error;
        }

        let (sql, params) = match restore {
            Some(state) => self.generate_update_state_query(module, unit_id, state),
            None => self.generate_delete_query(module, unit_id),
        };
        if let Err(cleanup) =
            execute_with_params(conn, &sql, &params, "Failed to clear pending migration").await
        {
            warn!(module = %module, version = %unit_id, error = %cleanup, "Pending ledger row could not be cleared");
        }
        error
    }
}

#[async_trait]
impl LedgerStore for SqlLedgerStore {
    async fn prepare(&self) -> Result<(), DatabaseError> {
        let sql = self.generate_create_table_sql();
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| query_error("Failed to create ledger table", &sql, e))?;
        Ok(())
    }

    async fn read(&self, module: &ModuleName) -> Result<Vec<LedgerEntry>, DatabaseError> {
        if !self.table_exists().await? {
            return Ok(Vec::new());
        }

        let sql = self.generate_select_sql();
        let rows = sqlx::query(&sql)
            .bind(module.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| query_error("Failed to read ledger", &sql, e))?;

        rows.iter()
            .map(|row| -> Result<LedgerEntry, DatabaseError> {
                let version: String = row
                    .try_get(0)
                    .map_err(|e| query_error("Failed to decode version", &sql, e))?;
                let applied_at: String = row
                    .try_get(1)
                    .map_err(|e| query_error("Failed to decode applied_at", &sql, e))?;
                let checksum: String = row
                    .try_get(2)
                    .map_err(|e| query_error("Failed to decode checksum", &sql, e))?;
                let state: String = row
                    .try_get(3)
                    .map_err(|e| query_error("Failed to decode state", &sql, e))?;

                if state != LedgerRowState::Applied.as_str() {
                    return Err(DatabaseError::Interrupted {
                        module: module.to_string(),
                        version,
                    });
                }

                Ok(LedgerEntry::new(version, parse_timestamp(&applied_at)?)
                    .with_checksum(Some(checksum).filter(|c| !c.is_empty())))
            })
            .collect()
    }

    async fn apply(
        &self,
        module: &ModuleName,
        entry: &LedgerEntry,
        statements: &[Statement],
    ) -> Result<(), DatabaseError> {
        if self.write_ahead {
            return self.apply_with_marker(module, entry, statements).await;
        }

        let mut conn = self.acquire().await?;
        let mut tx = begin(&mut conn).await?;
        execute_statements(&mut tx, statements)
            .await
            .map_err(|(_, e)| e)?;

        let (sql, params) = self.generate_insert_query(module, entry, LedgerRowState::Applied);
        execute_with_params(&mut tx, &sql, &params, "Failed to record migration").await?;

        commit(tx).await?;
        debug!(module = %module, version = %entry.unit_id, "Ledger entry appended");
        Ok(())
    }

    async fn revert(
        &self,
        module: &ModuleName,
        unit_id: &str,
        statements: &[Statement],
    ) -> Result<(), DatabaseError> {
        if self.write_ahead {
            return self.revert_with_marker(module, unit_id, statements).await;
        }

        let mut conn = self.acquire().await?;
        let mut tx = begin(&mut conn).await?;
        self.ensure_head(&mut tx, module, unit_id).await?;

        execute_statements(&mut tx, statements)
            .await
            .map_err(|(_, e)| e)?;

        let (sql, params) = self.generate_delete_query(module, unit_id);
        let removed =
            execute_with_params(&mut tx, &sql, &params, "Failed to remove migration record")
                .await?;
        ensure_single_removal(unit_id, removed)?;

        commit(tx).await?;
        debug!(module = %module, version = %unit_id, "Ledger entry removed");
        Ok(())
    }

    async fn execute(&self, statements: &[Statement]) -> Result<(), DatabaseError> {
        for statement in statements {
            sqlx::query(statement.sql())
                .execute(&self.pool)
                .await
                .map_err(|e| query_error("Failed to execute statement", statement.sql(), e))?;
        }
        Ok(())
    }
}

/// DDLをトランザクション内で巻き戻せるか
fn supports_transactional_ddl(dialect: Dialect) -> bool {
    !matches!(dialect, Dialect::MySQL)
}

/// 文を順に実行し、失敗した場合は失敗した文の位置を返す
async fn execute_statements(
    conn: &mut AnyConnection,
    statements: &[Statement],
) -> Result<(), (usize, DatabaseError)> {
    for (index, statement) in statements.iter().enumerate() {
        sqlx::query(statement.sql())
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                (
                    index,
                    query_error("Failed to execute statement", statement.sql(), e),
                )
            })?;
    }
    Ok(())
}

async fn execute_with_params(
    conn: &mut AnyConnection,
    sql: &str,
    params: &[String],
    context: &str,
) -> Result<u64, DatabaseError> {
    let mut query = sqlx::query(sql);
    for param in params {
        query = query.bind(param.as_str());
    }
    let result = query
        .execute(&mut *conn)
        .await
        .map_err(|e| query_error(context, sql, e))?;
    Ok(result.rows_affected())
}

fn ensure_single_removal(unit_id: &str, removed: u64) -> Result<(), DatabaseError> {
    if removed != 1 {
        return Err(DatabaseError::Transaction {
            message: format!(
                "Expected to remove one ledger entry for {}, removed {}",
                unit_id, removed
            ),
        });
    }
    Ok(())
}

async fn begin(conn: &mut AnyConnection) -> Result<Transaction<'_, Any>, DatabaseError> {
    conn.begin().await.map_err(|e| DatabaseError::Transaction {
        message: format!("Failed to start transaction: {}", e),
    })
}

async fn commit(tx: Transaction<'_, Any>) -> Result<(), DatabaseError> {
    tx.commit().await.map_err(|e| DatabaseError::Transaction {
        message: format!("Failed to commit transaction: {}", e),
    })
}

async fn rollback(tx: Transaction<'_, Any>) {
    if let Err(e) = tx.rollback().await {
        warn!(error = %e, "Failed to roll back transaction");
    }
}

/// テーブル名を検証
fn validate_table_name(table: &str) -> Result<String, DatabaseError> {
    if TABLE_NAME_PATTERN.is_match(table) {
        Ok(table.to_string())
    } else {
        Err(DatabaseError::InvalidTableName {
            name: table.to_string(),
            reason: "must start with a letter or underscore and contain only letters, digits and underscores".to_string(),
        })
    }
}

/// 台帳に保存する日時の形式（固定長のため文字列順と時系列順が一致する）
fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Query {
            message: format!("Invalid applied_at value '{}': {}", value, e),
            sql: None,
        })
}

fn query_error(context: &str, sql: &str, error: sqlx::Error) -> DatabaseError {
    DatabaseError::Query {
        message: format!("{}: {}", context, error),
        sql: Some(sql.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sqlx::any::install_default_drivers;
    use sqlx::pool::PoolOptions;

    fn store(dialect: Dialect) -> SqlLedgerStore {
        install_default_drivers();
        let pool = PoolOptions::<sqlx::Any>::new()
            .connect_lazy("sqlite::memory:")
            .unwrap();
        SqlLedgerStore::new(pool, dialect, "module_migrations").unwrap()
    }

    fn module() -> ModuleName {
        ModuleName::parse("acme/shop").unwrap()
    }

    #[tokio::test]
    async fn test_create_table_sql() {
        let sql = store(Dialect::PostgreSQL).generate_create_table_sql();
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS module_migrations"));
        assert!(sql.contains("VARCHAR(255)"));
        assert!(sql.contains("state VARCHAR(255) NOT NULL"));
        assert!(sql.contains("PRIMARY KEY (module, version)"));

        let sql = store(Dialect::SQLite).generate_create_table_sql();
        assert!(sql.contains("version TEXT NOT NULL"));
    }

    #[tokio::test]
    async fn test_insert_query_uses_placeholders() {
        let entry = LedgerEntry::new(
            "20230101_init",
            Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
        );

        let (sql, params) = store(Dialect::PostgreSQL).generate_insert_query(
            &module(),
            &entry,
            LedgerRowState::Applied,
        );
        assert!(sql.contains("VALUES ($1, $2, $3, $4, $5)"));
        assert!(!sql.contains("20230101_init"));
        assert_eq!(
            params,
            vec![
                "acme/shop".to_string(),
                "20230101_init".to_string(),
                "2023-01-01T00:00:00.000000Z".to_string(),
                String::new(),
                "applied".to_string(),
            ]
        );

        let (sql, params) =
            store(Dialect::MySQL).generate_insert_query(&module(), &entry, LedgerRowState::Pending);
        assert!(sql.contains("VALUES (?, ?, ?, ?, ?)"));
        assert_eq!(params[4], "pending");
    }

    #[tokio::test]
    async fn test_update_state_query() {
        let (sql, params) = store(Dialect::PostgreSQL).generate_update_state_query(
            &module(),
            "20230101_init",
            LedgerRowState::Pending,
        );
        assert_eq!(
            sql,
            "UPDATE module_migrations SET state = $1 WHERE module = $2 AND version = $3"
        );
        assert_eq!(params, vec!["pending", "acme/shop", "20230101_init"]);
    }

    #[tokio::test]
    async fn test_delete_and_select_sql() {
        let store = store(Dialect::SQLite);
        let (sql, params) = store.generate_delete_query(&module(), "20230101_init");
        assert_eq!(
            sql,
            "DELETE FROM module_migrations WHERE module = ? AND version = ?"
        );
        assert_eq!(params[1], "20230101_init");

        assert!(store
            .generate_select_sql()
            .contains("ORDER BY applied_at, version"));
        assert!(store.generate_select_head_sql().contains("LIMIT 1"));
        assert!(store.generate_table_exists_sql().contains("sqlite_master"));
    }

    #[tokio::test]
    async fn test_table_exists_sql_is_scoped_to_current_schema() {
        let sql = store(Dialect::PostgreSQL).generate_table_exists_sql();
        assert!(sql.contains("table_schema = current_schema()"));
        assert!(sql.contains("table_name = 'module_migrations'"));

        let sql = store(Dialect::MySQL).generate_table_exists_sql();
        assert!(sql.contains("table_schema = DATABASE()"));
        assert!(sql.contains("table_name = 'module_migrations'"));
    }

    #[tokio::test]
    async fn test_write_ahead_defaults_by_dialect() {
        assert!(store(Dialect::MySQL).uses_write_ahead());
        assert!(!store(Dialect::PostgreSQL).uses_write_ahead());
        assert!(!store(Dialect::SQLite).uses_write_ahead());
        assert!(store(Dialect::SQLite).with_write_ahead(true).uses_write_ahead());
    }

    #[tokio::test]
    async fn test_invalid_table_name() {
        install_default_drivers();
        let pool = PoolOptions::<sqlx::Any>::new()
            .connect_lazy("sqlite::memory:")
            .unwrap();
        let result = SqlLedgerStore::new(pool, Dialect::SQLite, "ledger; DROP TABLE x");
        assert!(matches!(result, Err(DatabaseError::InvalidTableName { .. })));
    }

    #[test]
    fn test_timestamp_round_trip_keeps_order() {
        let early = Utc.with_ymd_and_hms(2023, 1, 1, 9, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2023, 1, 1, 10, 0, 0).unwrap();
        assert!(format_timestamp(early) < format_timestamp(late));
        assert_eq!(parse_timestamp(&format_timestamp(early)).unwrap(), early);
        assert!(parse_timestamp("yesterday").is_err());
    }
}
