// 設定ファイル管理
//
// プロジェクトの設定ファイル（YAML形式）の読み込み、検証、
// 環境別のデータベース接続設定の管理を行います。

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use crate::adapters::connection_string;

/// 台帳テーブル名として許可されるパターン
pub(crate) static TABLE_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("table name pattern is valid")
});

/// データベース方言
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[serde(rename = "postgresql")]
    PostgreSQL,
    #[serde(rename = "mysql")]
    MySQL,
    #[serde(rename = "sqlite")]
    SQLite,
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dialect::PostgreSQL => write!(f, "postgresql"),
            Dialect::MySQL => write!(f, "mysql"),
            Dialect::SQLite => write!(f, "sqlite"),
        }
    }
}

impl FromStr for Dialect {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "postgresql" | "postgres" => Ok(Dialect::PostgreSQL),
            "mysql" => Ok(Dialect::MySQL),
            "sqlite" => Ok(Dialect::SQLite),
            other => Err(anyhow!(
                "Unsupported database dialect: {}. Please specify one of: postgresql, mysql, sqlite.",
                other
            )),
        }
    }
}

/// プロジェクト設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// 設定ファイルのバージョン
    pub version: String,

    /// データベース方言
    pub dialect: Dialect,

    /// マイグレーションディレクトリ（`{dir}/{vendor}/{package}/{id}/`）
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: PathBuf,

    /// シーダーディレクトリ（`{dir}/{vendor}/{package}/{name}.sql`）
    #[serde(default = "default_seeders_dir")]
    pub seeders_dir: PathBuf,

    /// 台帳テーブル名
    #[serde(default = "default_ledger_table")]
    pub ledger_table: String,

    /// 環境別のデータベース設定
    pub environments: HashMap<String, DatabaseConfig>,
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_seeders_dir() -> PathBuf {
    PathBuf::from("seeders")
}

fn default_ledger_table() -> String {
    crate::core::naming::LEDGER_TABLE.to_string()
}

impl Config {
    /// デフォルトの設定ファイルパス
    pub const DEFAULT_CONFIG_PATH: &'static str = crate::core::naming::CONFIG_FILE;

    /// 設定ファイルを読み込んで検証
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config = content.parse()?;
        config.validate()?;
        Ok(config)
    }

    /// YAML文字列に変換
    pub fn to_yaml(&self) -> Result<String> {
        serde_saphyr::to_string(self).with_context(|| "Failed to serialize config")
    }

    /// 指定された環境のデータベース設定を取得
    pub fn get_database_config(&self, environment: &str) -> Result<DatabaseConfig> {
        self.environments.get(environment).cloned().ok_or_else(|| {
            let mut available: Vec<_> = self.environments.keys().collect();
            available.sort();
            anyhow!(
                "Environment '{}' not found. Available environments: {:?}",
                environment,
                available
            )
        })
    }

    /// 設定の妥当性を検証
    pub fn validate(&self) -> Result<()> {
        if self.version.is_empty() {
            return Err(anyhow!("Config file version is not specified"));
        }

        if !TABLE_NAME_PATTERN.is_match(&self.ledger_table) {
            return Err(anyhow!(
                "Invalid ledger_table '{}': must be a plain SQL identifier",
                self.ledger_table
            ));
        }

        if self.environments.is_empty() {
            return Err(anyhow!(
                "At least one environment configuration is required"
            ));
        }

        for (env_name, db_config) in &self.environments {
            db_config
                .validate()
                .with_context(|| format!("Invalid config for environment '{}'", env_name))?;
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(yaml: &str) -> Result<Self, Self::Err> {
        serde_saphyr::from_str(yaml).with_context(|| "Failed to parse config file")
    }
}

/// データベース接続設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// ホスト名（SQLiteの場合は不要）
    #[serde(default = "default_host")]
    pub host: String,

    /// ポート番号（省略時は方言のデフォルト）
    #[serde(default)]
    pub port: Option<u16>,

    /// データベース名（SQLiteの場合はファイルパス）
    pub database: String,

    /// ユーザー名
    pub user: Option<String>,

    /// パスワード
    pub password: Option<String>,

    /// 接続タイムアウト（秒）
    pub timeout: Option<u64>,
}

fn default_host() -> String {
    "localhost".to_string()
}

impl DatabaseConfig {
    /// 接続設定を検証
    pub fn validate(&self) -> Result<()> {
        if self.database.is_empty() {
            return Err(anyhow!("Database name is not specified"));
        }

        Ok(())
    }

    /// 方言に応じたポート番号
    pub fn port_for(&self, dialect: Dialect) -> u16 {
        self.port.unwrap_or(match dialect {
            Dialect::PostgreSQL => 5432,
            Dialect::MySQL => 3306,
            Dialect::SQLite => 0,
        })
    }

    /// 接続文字列を生成
    pub fn to_connection_string(&self, dialect: Dialect) -> String {
        connection_string::build_connection_string(dialect, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version: "1.0"
dialect: sqlite
environments:
  development:
    database: dev.db
"#;

    #[test]
    fn test_dialect_from_str() {
        assert_eq!("postgres".parse::<Dialect>().unwrap(), Dialect::PostgreSQL);
        assert_eq!("sqlite".parse::<Dialect>().unwrap(), Dialect::SQLite);
        assert!("oracle".parse::<Dialect>().is_err());
        assert_eq!(Dialect::MySQL.to_string().parse::<Dialect>().unwrap(), Dialect::MySQL);
    }

    #[test]
    fn test_parse_applies_defaults() {
        let config: Config = SAMPLE.parse().unwrap();

        assert_eq!(config.dialect, Dialect::SQLite);
        assert_eq!(config.migrations_dir, PathBuf::from("migrations"));
        assert_eq!(config.seeders_dir, PathBuf::from("seeders"));
        assert_eq!(config.ledger_table, "module_migrations");
        assert!(config.validate().is_ok());

        let db = config.get_database_config("development").unwrap();
        assert_eq!(db.host, "localhost");
        assert_eq!(db.port_for(Dialect::PostgreSQL), 5432);
    }

    #[test]
    fn test_unknown_environment() {
        let config: Config = SAMPLE.parse().unwrap();
        let error = config.get_database_config("production").unwrap_err();
        assert!(error.to_string().contains("production"));
    }

    #[test]
    fn test_invalid_ledger_table_is_rejected() {
        let mut config: Config = SAMPLE.parse().unwrap();
        config.ledger_table = "ledger; DROP TABLE users".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_database_is_rejected() {
        let mut config: Config = SAMPLE.parse().unwrap();
        if let Some(db) = config.environments.get_mut("development") {
            db.database = String::new();
        }
        assert!(config.validate().is_err());
    }
}
