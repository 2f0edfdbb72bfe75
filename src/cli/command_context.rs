// コマンド共通コンテキスト
//
// 設定ファイル読み込み、パス解決、エンジンの組み立てをCLI層で集約する。

use crate::adapters::database::DatabaseConnectionService;
use crate::adapters::filesystem_loader::FilesystemSource;
use crate::adapters::sql_ledger_store::SqlLedgerStore;
use crate::core::config::{Config, DatabaseConfig, Dialect};
use crate::services::migration_engine::{EngineOptions, MigrationEngine};
use crate::services::reporter::ConsoleReporter;
use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// CLIコマンド共通の実行コンテキスト
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub project_path: PathBuf,
    pub config_path: PathBuf,
    pub config: Config,
}

impl CommandContext {
    /// 設定を読み込んでコンテキストを作成
    ///
    /// `config_path` を省略した場合はプロジェクトルートの `.modmig.yaml` を使用します。
    pub fn load(project_path: PathBuf, config_path: Option<PathBuf>) -> Result<Self> {
        let config_path = match config_path {
            Some(path) if path.is_absolute() => path,
            Some(path) => project_path.join(path),
            None => project_path.join(Config::DEFAULT_CONFIG_PATH),
        };
        if !config_path.exists() {
            return Err(anyhow!("Config file not found: {:?}", config_path));
        }

        let config = Config::from_file(&config_path)
            .with_context(|| format!("Failed to load config file: {:?}", config_path))?;
        debug!(config = %config_path.display(), dialect = %config.dialect, "Loaded config");

        Ok(Self {
            project_path,
            config_path,
            config,
        })
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_path.join(path)
        }
    }

    /// マイグレーションディレクトリの絶対パス
    pub fn migrations_dir(&self) -> PathBuf {
        self.resolve(&self.config.migrations_dir)
    }

    /// シーダーディレクトリの絶対パス
    pub fn seeders_dir(&self) -> PathBuf {
        self.resolve(&self.config.seeders_dir)
    }

    /// ファイルシステムのマイグレーションソース
    pub fn source(&self) -> FilesystemSource {
        FilesystemSource::new(self.migrations_dir(), self.seeders_dir())
    }

    /// 環境のデータベース設定
    ///
    /// SQLiteの相対パスはプロジェクトルートからの相対パスとして解決します。
    pub fn database_config(&self, env: &str) -> Result<DatabaseConfig> {
        let mut db_config = self.config.get_database_config(env)?;
        if self.config.dialect == Dialect::SQLite && db_config.database != ":memory:" {
            db_config.database = self
                .resolve(Path::new(&db_config.database))
                .to_string_lossy()
                .into_owned();
        }
        Ok(db_config)
    }

    /// 台帳ストアに接続
    pub async fn connect_store(&self, env: &str) -> Result<SqlLedgerStore> {
        let db_config = self.database_config(env)?;
        let pool = DatabaseConnectionService::new()
            .create_pool(self.config.dialect, &db_config, None)
            .await
            .with_context(|| format!("Failed to connect to database for environment '{}'", env))?;

        SqlLedgerStore::new(pool, self.config.dialect, &self.config.ledger_table)
            .with_context(|| "Invalid ledger table")
    }

    /// データベースに接続してエンジンを組み立てる
    pub async fn engine(&self, env: &str, options: EngineOptions) -> Result<MigrationEngine> {
        let store = self.connect_store(env).await?;
        Ok(
            MigrationEngine::new(Arc::new(self.source()), Arc::new(store))
                .with_reporter(Arc::new(ConsoleReporter::new()))
                .with_options(options),
        )
    }
}
