// 命名ポリシー
//
// アプリケーション名と関連パスの単一ソースを提供します。

/// 現行アプリケーション名
pub const APP_NAME: &str = "modmig";

/// 既定の設定ファイル名
pub const CONFIG_FILE: &str = ".modmig.yaml";

/// 既定のマイグレーション履歴テーブル名
pub const LEDGER_TABLE: &str = "module_migrations";

/// バイナリ名
pub const BINARY_NAME: &str = "modmig";

/// マイグレーションユニット内のファイル名
pub const UP_FILE: &str = "up.sql";
pub const DOWN_FILE: &str = "down.sql";

/// 詳細ログを有効にする環境変数
pub const VERBOSE_ENV: &str = "MODMIG_VERBOSE";
