// SQL台帳ストアの結合テスト
//
// SQLiteの一時ファイルデータベースを使い、ファイルシステムのマイグレーションを
// 実際に適用・取り消しして、台帳テーブルとスキーマの状態を確認します。

use modmig::adapters::database::DatabaseConnectionService;
use modmig::adapters::filesystem_loader::FilesystemSource;
use modmig::adapters::sql_ledger_store::SqlLedgerStore;
use modmig::core::config::{DatabaseConfig, Dialect};
use modmig::core::error::MigrationError;
use modmig::core::ledger::LedgerStore;
use modmig::core::module::ModuleName;
use modmig::services::migration_engine::{EngineOptions, MigrationEngine};
use sqlx::any::install_default_drivers;
use sqlx::{AnyPool, Row};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

struct Fixture {
    _temp: TempDir,
    pool: AnyPool,
    store: Arc<SqlLedgerStore>,
    source: Arc<FilesystemSource>,
}

fn write_unit(root: &Path, id: &str, up: &str, down: &str) {
    let dir = root.join("acme").join("shop").join(id);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("up.sql"), up).unwrap();
    fs::write(dir.join("down.sql"), down).unwrap();
}

async fn fixture() -> Fixture {
    fixture_with(false).await
}

/// write_ahead: MySQLと同じpending行方式で台帳を更新する
async fn fixture_with(write_ahead: bool) -> Fixture {
    install_default_drivers();
    let temp = TempDir::new().unwrap();
    let migrations = temp.path().join("migrations");
    let seeders = temp.path().join("seeders");

    write_unit(
        &migrations,
        "20230101_init",
        "CREATE TABLE products (id INTEGER PRIMARY KEY, name TEXT NOT NULL);",
        "DROP TABLE products;",
    );
    write_unit(
        &migrations,
        "20230215_add_col",
        "ALTER TABLE products ADD COLUMN price INTEGER;",
        "ALTER TABLE products DROP COLUMN price;",
    );
    write_unit(
        &migrations,
        "20230310_index",
        "CREATE INDEX idx_products_name ON products (name);",
        "DROP INDEX idx_products_name;",
    );
    fs::create_dir_all(seeders.join("acme/shop")).unwrap();
    fs::write(
        seeders.join("acme/shop/products.sql"),
        "INSERT INTO products (name) VALUES ('chair'); INSERT INTO products (name) VALUES ('table;desk');",
    )
    .unwrap();

    let config = DatabaseConfig {
        host: "localhost".to_string(),
        port: None,
        database: temp.path().join("shop.db").to_string_lossy().into_owned(),
        user: None,
        password: None,
        timeout: Some(5),
    };
    let pool = DatabaseConnectionService::new()
        .create_pool(Dialect::SQLite, &config, None)
        .await
        .unwrap();
    let store = SqlLedgerStore::new(pool.clone(), Dialect::SQLite, "module_migrations")
        .unwrap()
        .with_write_ahead(write_ahead);

    Fixture {
        _temp: temp,
        pool,
        store: Arc::new(store),
        source: Arc::new(FilesystemSource::new(migrations, seeders)),
    }
}

impl Fixture {
    fn engine(&self) -> MigrationEngine {
        MigrationEngine::new(self.source.clone(), self.store.clone())
    }

    async fn ledger_versions(&self) -> Vec<String> {
        self.store
            .read(&shop())
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.unit_id)
            .collect()
    }

    async fn object_exists(&self, kind: &str, name: &str) -> bool {
        sqlx::query("SELECT name FROM sqlite_master WHERE type = ? AND name = ?")
            .bind(kind)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .unwrap()
            .is_some()
    }

    async fn ledger_states(&self) -> Vec<(String, String)> {
        sqlx::query("SELECT version, state FROM module_migrations ORDER BY version")
            .fetch_all(&self.pool)
            .await
            .unwrap()
            .iter()
            .map(|r| (r.get::<String, _>(0), r.get::<String, _>(1)))
            .collect()
    }
}

fn shop() -> ModuleName {
    ModuleName::parse("acme/shop").unwrap()
}

#[tokio::test]
async fn test_read_before_prepare_is_empty() {
    let fixture = fixture().await;
    assert!(!fixture.store.table_exists().await.unwrap());
    assert!(fixture.ledger_versions().await.is_empty());
}

#[tokio::test]
async fn test_migrate_and_reset_against_sqlite() {
    let fixture = fixture().await;
    let engine = fixture.engine();

    let report = engine.migrate(&shop(), None).await.unwrap();
    assert_eq!(report.count(), 3);
    assert!(fixture.object_exists("table", "products").await);
    assert!(fixture.object_exists("index", "idx_products_name").await);
    assert_eq!(
        fixture.ledger_versions().await,
        vec!["20230101_init", "20230215_add_col", "20230310_index"]
    );

    let status = engine.status(&shop(), false).await.unwrap();
    assert_eq!(status.summary.applied, 3);
    assert!(status.units.iter().all(|u| !u.checksum_mismatch));

    engine.reset(&shop()).await.unwrap();
    assert!(!fixture.object_exists("table", "products").await);
    assert!(fixture.ledger_versions().await.is_empty());
}

#[tokio::test]
async fn test_rollback_to_target_against_sqlite() {
    let fixture = fixture().await;
    let engine = fixture.engine();
    engine.migrate(&shop(), None).await.unwrap();

    let report = engine
        .rollback(&shop(), Some("20230101_init"), None)
        .await
        .unwrap();

    assert_eq!(report.ids(), vec!["20230310_index", "20230215_add_col"]);
    assert!(fixture.object_exists("table", "products").await);
    assert!(!fixture.object_exists("index", "idx_products_name").await);
    assert_eq!(fixture.ledger_versions().await, vec!["20230101_init"]);
}

#[tokio::test]
async fn test_failed_unit_is_rolled_back_atomically() {
    let fixture = fixture().await;
    let root = fixture.source.migrations_dir().to_path_buf();
    write_unit(
        &root,
        "20230401_broken",
        "CREATE TABLE audit (id INTEGER); INSERT INTO missing_table VALUES (1);",
        "DROP TABLE audit;",
    );

    let err = fixture.engine().migrate(&shop(), None).await.unwrap_err();

    assert!(matches!(
        err,
        MigrationError::ExecutionFailure { ref unit, .. } if unit == "20230401_broken"
    ));
    assert!(!fixture.object_exists("table", "audit").await);
    assert_eq!(fixture.ledger_versions().await.len(), 3);
}

#[tokio::test]
async fn test_revert_rejects_non_tail_entry() {
    let fixture = fixture().await;
    fixture.engine().migrate(&shop(), None).await.unwrap();

    let result = fixture.store.revert(&shop(), "20230101_init", &[]).await;

    assert!(result.unwrap_err().is_transaction());
    assert_eq!(fixture.ledger_versions().await.len(), 3);
}

#[tokio::test]
async fn test_checksum_mismatch_is_reported() {
    let fixture = fixture().await;
    let engine = fixture.engine();
    engine.migrate(&shop(), Some("20230101_init")).await.unwrap();

    let root = fixture.source.migrations_dir().to_path_buf();
    fs::write(
        root.join("acme/shop/20230101_init/up.sql"),
        "CREATE TABLE products (id INTEGER PRIMARY KEY, name TEXT);",
    )
    .unwrap();

    let status = engine.status(&shop(), false).await.unwrap();
    assert!(status.units[0].checksum_mismatch);
    assert!(!status.units[1].checksum_mismatch);
}

#[tokio::test]
async fn test_dry_run_creates_nothing() {
    let fixture = fixture().await;
    let engine = fixture.engine().with_options(EngineOptions {
        dry_run: true,
        mute: true,
    });

    let report = engine.migrate(&shop(), None).await.unwrap();

    assert_eq!(report.count(), 3);
    assert!(!fixture.store.table_exists().await.unwrap());
    assert!(!fixture.object_exists("table", "products").await);
}

#[tokio::test]
async fn test_seed_against_sqlite() {
    let fixture = fixture().await;
    let engine = fixture.engine();
    engine.migrate(&shop(), None).await.unwrap();

    let report = engine.seed(&shop(), None).await.unwrap();
    assert_eq!(report.seeders[0].statements, 2);

    let rows = sqlx::query("SELECT name FROM products ORDER BY id")
        .fetch_all(&fixture.pool)
        .await
        .unwrap();
    let names: Vec<String> = rows.iter().map(|r| r.get::<String, _>(0)).collect();
    assert_eq!(names, vec!["chair", "table;desk"]);
    assert_eq!(fixture.ledger_versions().await.len(), 3);
}

#[tokio::test]
async fn test_write_ahead_apply_and_revert_against_sqlite() {
    let fixture = fixture_with(true).await;
    let engine = fixture.engine();

    engine.migrate(&shop(), None).await.unwrap();
    assert!(fixture
        .ledger_states()
        .await
        .iter()
        .all(|(_, state)| state == "applied"));
    assert!(fixture.object_exists("index", "idx_products_name").await);

    engine.reset(&shop()).await.unwrap();
    assert!(fixture.ledger_states().await.is_empty());
    assert!(!fixture.object_exists("table", "products").await);
}

#[tokio::test]
async fn test_write_ahead_failure_on_first_statement_leaves_ledger_clean() {
    let fixture = fixture_with(true).await;
    let root = fixture.source.migrations_dir().to_path_buf();
    write_unit(
        &root,
        "20230401_broken",
        "INSERT INTO missing_table VALUES (1);",
        "SELECT 1;",
    );

    let err = fixture.engine().migrate(&shop(), None).await.unwrap_err();

    assert!(matches!(
        err,
        MigrationError::ExecutionFailure { ref unit, .. } if unit == "20230401_broken"
    ));
    assert_eq!(fixture.ledger_states().await.len(), 3);
    assert_eq!(fixture.ledger_versions().await.len(), 3);
}

#[tokio::test]
async fn test_write_ahead_partial_failure_is_reported_as_interrupted() {
    let fixture = fixture_with(true).await;
    let root = fixture.source.migrations_dir().to_path_buf();
    write_unit(
        &root,
        "20230401_broken",
        "CREATE TABLE audit (id INTEGER); INSERT INTO missing_table VALUES (1);",
        "DROP TABLE audit;",
    );
    let engine = fixture.engine();

    assert!(engine.migrate(&shop(), None).await.is_err());

    // 2文目以降で失敗した場合はpending行が残る
    assert!(fixture
        .ledger_states()
        .await
        .contains(&("20230401_broken".to_string(), "pending".to_string())));
    let read = fixture.store.read(&shop()).await.unwrap_err();
    assert!(read.is_interrupted());

    // 修復されるまで以降の操作は拒否される
    for result in [
        engine.migrate(&shop(), None).await.map(|_| ()),
        engine.rollback(&shop(), None, None).await.map(|_| ()),
        engine.status(&shop(), false).await.map(|_| ()),
    ] {
        assert!(matches!(
            result,
            Err(MigrationError::Store(ref e)) if e.is_interrupted()
        ));
    }
}

#[tokio::test]
async fn test_write_ahead_revert_failure() {
    let fixture = fixture_with(true).await;
    let engine = fixture.engine();
    engine.migrate(&shop(), None).await.unwrap();
    let down = fixture
        .source
        .migrations_dir()
        .join("acme/shop/20230310_index/down.sql");

    // 最初の文で失敗した場合は適用済みに戻る
    fs::write(&down, "DROP INDEX missing_index;").unwrap();
    assert!(engine.rollback(&shop(), None, None).await.is_err());
    assert_eq!(fixture.ledger_versions().await.len(), 3);

    // 途中で失敗した場合はpendingのまま残る
    fs::write(&down, "SELECT 1; DROP INDEX missing_index;").unwrap();
    assert!(engine.rollback(&shop(), None, None).await.is_err());
    assert!(fixture
        .ledger_states()
        .await
        .contains(&("20230310_index".to_string(), "pending".to_string())));
    assert!(fixture.store.read(&shop()).await.unwrap_err().is_interrupted());
}
