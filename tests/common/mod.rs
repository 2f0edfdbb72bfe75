// 結合テスト共通ヘルパー

#![allow(dead_code)]

use modmig::adapters::memory_store::MemoryLedgerStore;
use modmig::adapters::static_source::StaticMigrationSource;
use modmig::core::error::BoxError;
use modmig::core::migration::{Migration, Statement};
use modmig::core::module::ModuleName;
use modmig::core::seeder::Seeder;
use modmig::services::migration_engine::{EngineOptions, MigrationEngine};
use std::sync::Arc;

pub const SHOP_UNITS: [&str; 3] = ["20230101_init", "20230215_add_col", "20230310_index"];

pub fn shop() -> ModuleName {
    ModuleName::parse("acme/shop").unwrap()
}

/// テスト用のマイグレーション
///
/// `fail_up` / `fail_down` を立てると、SQL文を返す代わりにエラーを返します。
#[derive(Debug, Clone)]
pub struct TableMigration {
    pub id: String,
    pub fail_up: bool,
    pub fail_down: bool,
}

impl TableMigration {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            fail_up: false,
            fail_down: false,
        }
    }

    pub fn failing_up(id: &str) -> Self {
        Self {
            fail_up: true,
            ..Self::new(id)
        }
    }

    pub fn failing_down(id: &str) -> Self {
        Self {
            fail_down: true,
            ..Self::new(id)
        }
    }
}

impl Migration for TableMigration {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        "table"
    }

    fn up(&self) -> Result<Vec<Statement>, BoxError> {
        if self.fail_up {
            return Err(format!("up of {} exploded", self.id).into());
        }
        Ok(vec![Statement::new(format!("CREATE TABLE t_{} (id INT)", self.id))])
    }

    fn down(&self) -> Result<Vec<Statement>, BoxError> {
        if self.fail_down {
            return Err(format!("down of {} exploded", self.id).into());
        }
        Ok(vec![Statement::new(format!("DROP TABLE t_{}", self.id))])
    }
}

/// テスト用のシーダー
#[derive(Debug, Clone)]
pub struct InsertSeeder {
    pub name: String,
    pub fail: bool,
}

impl InsertSeeder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fail: false,
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fail: true,
        }
    }
}

impl Seeder for InsertSeeder {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self) -> Result<Vec<Statement>, BoxError> {
        if self.fail {
            return Err(format!("seeder {} exploded", self.name).into());
        }
        Ok(vec![Statement::new(format!("INSERT INTO {} VALUES (1)", self.name))])
    }
}

/// 指定したマイグレーションを持つ acme/shop のソース
pub fn source_with(migrations: Vec<TableMigration>) -> StaticMigrationSource {
    let mut source = StaticMigrationSource::new();
    source.add_module(shop());
    for migration in migrations {
        source.add_migration(shop(), migration);
    }
    source
}

/// acme/shop の3つのマイグレーションを持つソース
pub fn shop_source() -> StaticMigrationSource {
    source_with(SHOP_UNITS.iter().map(|id| TableMigration::new(id)).collect())
}

pub fn engine(source: StaticMigrationSource, store: Arc<MemoryLedgerStore>) -> MigrationEngine {
    MigrationEngine::new(Arc::new(source), store)
}

pub fn dry_run_engine(
    source: StaticMigrationSource,
    store: Arc<MemoryLedgerStore>,
) -> MigrationEngine {
    engine(source, store).with_options(EngineOptions {
        dry_run: true,
        mute: true,
    })
}

/// 台帳のマイグレーションID（台帳順）
pub fn ledger_ids(store: &MemoryLedgerStore) -> Vec<String> {
    store
        .entries(&shop())
        .into_iter()
        .map(|e| e.unit_id)
        .collect()
}
