// ファイルシステムからのマイグレーション読み込み
//
// 以下のディレクトリ構成からマイグレーションとシーダーを読み込みます。
//
//   {migrations_dir}/{vendor}/{package}/{id}/up.sql
//   {migrations_dir}/{vendor}/{package}/{id}/down.sql   (任意)
//   {seeders_dir}/{vendor}/{package}/{name}.sql

use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::adapters::sql_migration::{SqlMigration, SqlSeeder};
use crate::core::error::MigrationError;
use crate::core::migration::Migration;
use crate::core::migration_set::{MigrationSet, MigrationSource};
use crate::core::module::ModuleName;
use crate::core::naming;
use crate::core::seeder::Seeder;

/// マイグレーションディレクトリ名: 8桁以上の数字 + 任意の `_説明`
static UNIT_DIR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{8,})(?:_(.+))?$").expect("valid regex"));

/// ファイルシステムベースのマイグレーションソース
#[derive(Debug, Clone)]
pub struct FilesystemSource {
    migrations_dir: PathBuf,
    seeders_dir: PathBuf,
}

impl FilesystemSource {
    /// 新しいFilesystemSourceを作成
    pub fn new(migrations_dir: impl Into<PathBuf>, seeders_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
            seeders_dir: seeders_dir.into(),
        }
    }

    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    pub fn seeders_dir(&self) -> &Path {
        &self.seeders_dir
    }

    fn module_dir(root: &Path, module: &ModuleName) -> PathBuf {
        root.join(module.vendor()).join(module.package())
    }

    /// どちらのルートにもモジュールディレクトリが無ければ UnknownModule
    fn ensure_known(&self, module: &ModuleName) -> Result<(), MigrationError> {
        let known = Self::module_dir(&self.migrations_dir, module).is_dir()
            || Self::module_dir(&self.seeders_dir, module).is_dir();
        if known {
            Ok(())
        } else {
            Err(MigrationError::UnknownModule {
                module: module.to_string(),
            })
        }
    }

    fn read_file(module: &ModuleName, path: &Path) -> Result<String, MigrationError> {
        fs::read_to_string(path).map_err(|e| MigrationError::Source {
            module: module.to_string(),
            message: format!("Failed to read {}: {}", path.display(), e),
        })
    }

    fn read_dir(module: &ModuleName, dir: &Path) -> Result<Vec<PathBuf>, MigrationError> {
        let entries = fs::read_dir(dir).map_err(|e| MigrationError::Source {
            module: module.to_string(),
            message: format!("Failed to read directory {}: {}", dir.display(), e),
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| MigrationError::Source {
                module: module.to_string(),
                message: format!("Failed to read directory {}: {}", dir.display(), e),
            })?;
            paths.push(entry.path());
        }
        paths.sort();
        Ok(paths)
    }

    fn load_unit(module: &ModuleName, dir: &Path) -> Result<Option<SqlMigration>, MigrationError> {
        let Some(dir_name) = dir.file_name().and_then(|n| n.to_str()) else {
            return Ok(None);
        };
        if dir_name.starts_with('.') {
            return Ok(None);
        }

        let Some(captures) = UNIT_DIR_PATTERN.captures(dir_name) else {
            warn!(
                module = %module,
                directory = dir_name,
                "Skipping directory: expected '{{digits}}_{{description}}'"
            );
            return Ok(None);
        };
        let description = captures
            .get(2)
            .map(|m| m.as_str().replace('_', " "))
            .unwrap_or_default();

        let up_path = dir.join(naming::UP_FILE);
        if !up_path.is_file() {
            warn!(module = %module, directory = dir_name, "Skipping directory: missing up.sql");
            return Ok(None);
        }
        let up_sql = Self::read_file(module, &up_path)?;

        let down_path = dir.join(naming::DOWN_FILE);
        let down_sql = if down_path.is_file() {
            Some(Self::read_file(module, &down_path)?)
        } else {
            None
        };

        Ok(Some(SqlMigration::new(dir_name, description, up_sql, down_sql)))
    }

    fn scan_modules(root: &Path, found: &mut Vec<ModuleName>) {
        let Ok(vendors) = fs::read_dir(root) else {
            return;
        };
        for vendor in vendors.flatten() {
            let vendor_path = vendor.path();
            if !vendor_path.is_dir() {
                continue;
            }
            let Ok(packages) = fs::read_dir(&vendor_path) else {
                continue;
            };
            for package in packages.flatten() {
                if !package.path().is_dir() {
                    continue;
                }
                let name = format!(
                    "{}/{}",
                    vendor.file_name().to_string_lossy(),
                    package.file_name().to_string_lossy()
                );
                match ModuleName::parse(&name) {
                    Ok(module) => found.push(module),
                    Err(_) => debug!(directory = %name, "Ignoring non-module directory"),
                }
            }
        }
    }
}

impl MigrationSource for FilesystemSource {
    fn load(&self, module: &ModuleName) -> Result<MigrationSet, MigrationError> {
        self.ensure_known(module)?;

        let dir = Self::module_dir(&self.migrations_dir, module);
        let mut migrations: Vec<Box<dyn Migration>> = Vec::new();
        if dir.is_dir() {
            for path in Self::read_dir(module, &dir)? {
                if !path.is_dir() {
                    continue;
                }
                if let Some(migration) = Self::load_unit(module, &path)? {
                    migrations.push(Box::new(migration));
                }
            }
        }

        debug!(module = %module, count = migrations.len(), "Loaded migrations");
        MigrationSet::new(module.clone(), migrations)
    }

    fn seeders(&self, module: &ModuleName) -> Result<Vec<Box<dyn Seeder>>, MigrationError> {
        self.ensure_known(module)?;

        let dir = Self::module_dir(&self.seeders_dir, module);
        let mut seeders: Vec<Box<dyn Seeder>> = Vec::new();
        if !dir.is_dir() {
            return Ok(seeders);
        }

        for path in Self::read_dir(module, &dir)? {
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("sql") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            let sql = Self::read_file(module, &path)?;
            seeders.push(Box::new(SqlSeeder::new(name, sql)));
        }

        seeders.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(seeders)
    }

    fn modules(&self) -> Result<Vec<ModuleName>, MigrationError> {
        let mut modules = Vec::new();
        Self::scan_modules(&self.migrations_dir, &mut modules);
        Self::scan_modules(&self.seeders_dir, &mut modules);
        modules.sort();
        modules.dedup();
        Ok(modules)
    }
}
