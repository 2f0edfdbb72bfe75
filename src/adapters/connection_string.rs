// 接続文字列ビルダー
//
// DatabaseConfig と Dialect から sqlx の接続文字列を生成する。

use crate::core::config::{DatabaseConfig, Dialect};

/// 接続文字列を生成
///
/// SQLiteはファイルが存在しない場合に作成する（`mode=rwc`）。
pub fn build_connection_string(dialect: Dialect, config: &DatabaseConfig) -> String {
    let port = config.port_for(dialect);
    match dialect {
        Dialect::PostgreSQL => format!(
            "postgresql://{}@{}:{}/{}",
            credentials(config, "postgres"),
            config.host,
            port,
            config.database
        ),
        Dialect::MySQL => format!(
            "mysql://{}@{}:{}/{}",
            credentials(config, "root"),
            config.host,
            port,
            config.database
        ),
        Dialect::SQLite if config.database == ":memory:" => "sqlite::memory:".to_string(),
        Dialect::SQLite => format!("sqlite://{}?mode=rwc", config.database),
    }
}

fn credentials(config: &DatabaseConfig, default_user: &str) -> String {
    let user = config.user.as_deref().unwrap_or(default_user);
    match config.password.as_deref() {
        Some(password) if !password.is_empty() => format!("{}:{}", user, password),
        _ => user.to_string(),
    }
}
