// コードで登録するマイグレーションソース
//
// マイグレーションとシーダーをプログラムから登録します。
// 読み込みごとに登録されたファクトリから新しいインスタンスを生成します。

use std::collections::BTreeMap;

use crate::core::error::MigrationError;
use crate::core::migration::Migration;
use crate::core::migration_set::{MigrationSet, MigrationSource};
use crate::core::module::ModuleName;
use crate::core::seeder::Seeder;

type MigrationFactory = Box<dyn Fn() -> Box<dyn Migration> + Send + Sync>;
type SeederFactory = Box<dyn Fn() -> Box<dyn Seeder> + Send + Sync>;

#[derive(Default)]
struct Registry {
    migrations: Vec<MigrationFactory>,
    seeders: Vec<SeederFactory>,
}

/// 登録済みのマイグレーションとシーダーを返すソース
#[derive(Default)]
pub struct StaticMigrationSource {
    modules: BTreeMap<ModuleName, Registry>,
}

impl StaticMigrationSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// マイグレーションを持たないモジュールを登録
    pub fn add_module(&mut self, module: ModuleName) -> &mut Self {
        self.modules.entry(module).or_default();
        self
    }

    /// マイグレーションを登録
    pub fn add_migration<M>(&mut self, module: ModuleName, migration: M) -> &mut Self
    where
        M: Migration + Clone + 'static,
    {
        self.modules
            .entry(module)
            .or_default()
            .migrations
            .push(Box::new(move || -> Box<dyn Migration> { Box::new(migration.clone()) }));
        self
    }

    /// シーダーを登録
    pub fn add_seeder<S>(&mut self, module: ModuleName, seeder: S) -> &mut Self
    where
        S: Seeder + Clone + 'static,
    {
        self.modules
            .entry(module)
            .or_default()
            .seeders
            .push(Box::new(move || -> Box<dyn Seeder> { Box::new(seeder.clone()) }));
        self
    }

    fn registry(&self, module: &ModuleName) -> Result<&Registry, MigrationError> {
        self.modules
            .get(module)
            .ok_or_else(|| MigrationError::UnknownModule {
                module: module.to_string(),
            })
    }
}

impl MigrationSource for StaticMigrationSource {
    fn load(&self, module: &ModuleName) -> Result<MigrationSet, MigrationError> {
        let registry = self.registry(module)?;
        let migrations = registry.migrations.iter().map(|factory| factory()).collect();
        MigrationSet::new(module.clone(), migrations)
    }

    fn seeders(&self, module: &ModuleName) -> Result<Vec<Box<dyn Seeder>>, MigrationError> {
        let registry = self.registry(module)?;
        let mut seeders: Vec<Box<dyn Seeder>> =
            registry.seeders.iter().map(|factory| factory()).collect();
        seeders.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(seeders)
    }

    fn modules(&self) -> Result<Vec<ModuleName>, MigrationError> {
        Ok(self.modules.keys().cloned().collect())
    }
}
