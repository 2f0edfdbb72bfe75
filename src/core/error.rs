// エラー型定義
//
// マイグレーションエンジン全体で使用されるカスタムエラー型を提供します。
// thiserrorを使用して、MigrationError と DatabaseError を定義します。

use crate::core::migration::Operation;
use thiserror::Error;

/// マイグレーションやシーダーが返す任意のエラー
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// マイグレーションエラー
///
/// エンジンの各操作（migrate / rollback / reset / seed / status）で発生するエラーを表現します。
/// どのバリアントもモジュール名を保持し、呼び出し側が正確に報告できるようにします。
#[derive(Debug, Error)]
pub enum MigrationError {
    /// モジュール名が `vendor/package` 形式ではない
    #[error("Invalid module name '{name}': expected 'vendor/package' syntax")]
    InvalidModuleName {
        /// 入力されたモジュール名
        name: String,
    },

    /// ローダーがモジュールを解決できない
    #[error("Unknown module '{module}'")]
    UnknownModule {
        /// モジュール名
        module: String,
    },

    /// 指定されたバージョンがマイグレーションセットに存在しない
    #[error("Unknown version '{version}' for module '{module}'")]
    UnknownVersion {
        /// モジュール名
        module: String,
        /// 指定されたバージョン
        version: String,
    },

    /// 同一モジュール内で重複したバージョン
    #[error("Duplicate migration version '{version}' in module '{module}'")]
    DuplicateVersion {
        /// モジュール名
        module: String,
        /// 重複したバージョン
        version: String,
    },

    /// rollback に target と date が同時に指定された
    #[error("Conflicting arguments: specify either a target version or a date, not both")]
    ConflictingArguments,

    /// ロールバック対象がない
    #[error("Nothing to rollback for module '{module}'")]
    NothingToRollback {
        /// モジュール名
        module: String,
    },

    /// マイグレーションの up / down が失敗した
    #[error("Migration {unit} of module '{module}' failed during {operation}: {source}")]
    ExecutionFailure {
        /// モジュール名
        module: String,
        /// 失敗したマイグレーションのID
        unit: String,
        /// 実行していた操作
        operation: Operation,
        /// 失敗原因
        source: BoxError,
    },

    /// 台帳に現在のマイグレーションセットに存在しないエントリがある
    #[error(
        "Ledger of module '{module}' references migrations missing from the migration set: {}",
        .units.join(", ")
    )]
    LedgerDivergence {
        /// モジュール名
        module: String,
        /// 孤立したマイグレーションID
        units: Vec<String>,
    },

    /// 台帳の適用順がIDの昇順と一致しない
    #[error(
        "Ledger of module '{module}' records {unit} after {previous}, out of version order"
    )]
    LedgerOutOfOrder {
        /// モジュール名
        module: String,
        /// 後から記録されたマイグレーションID
        unit: String,
        /// 先に記録されたマイグレーションID
        previous: String,
    },

    /// 適用済みのマイグレーションより古い未適用マイグレーションがある
    #[error(
        "Migration {unit} of module '{module}' sorts before the applied migration {head}"
    )]
    OutOfOrder {
        /// モジュール名
        module: String,
        /// 未適用のマイグレーションID
        unit: String,
        /// 適用済みの最大のマイグレーションID
        head: String,
    },

    /// 指定されたシーダーが存在しない
    #[error("Unknown seeder '{seeder}' for module '{module}'")]
    UnknownSeeder {
        /// モジュール名
        module: String,
        /// シーダー名
        seeder: String,
    },

    /// シーダーの実行に失敗した
    #[error("Seeder '{seeder}' of module '{module}' failed: {source}")]
    SeederFailure {
        /// モジュール名
        module: String,
        /// シーダー名
        seeder: String,
        /// 失敗原因
        source: BoxError,
    },

    /// 台帳ストアの読み書きに失敗した
    #[error(transparent)]
    Store(#[from] DatabaseError),

    /// マイグレーションソースの読み込みに失敗した
    #[error("Failed to load migrations of module '{module}': {message}")]
    Source {
        /// モジュール名
        module: String,
        /// エラーメッセージ
        message: String,
    },
}

impl MigrationError {
    /// ロールバック対象なしエラーかどうか
    ///
    /// CLIはこのエラーを通知として扱い、正常終了します。
    pub fn is_nothing_to_rollback(&self) -> bool {
        matches!(self, MigrationError::NothingToRollback { .. })
    }

    /// 実行失敗エラーかどうか
    pub fn is_execution_failure(&self) -> bool {
        matches!(self, MigrationError::ExecutionFailure { .. })
    }

    /// 台帳不整合エラーかどうか
    ///
    /// 孤立エントリと、ID順に反した適用順の両方を含みます。
    pub fn is_ledger_divergence(&self) -> bool {
        matches!(
            self,
            MigrationError::LedgerDivergence { .. } | MigrationError::LedgerOutOfOrder { .. }
        )
    }

    /// 失敗したマイグレーションのIDを取得
    pub fn unit(&self) -> Option<&str> {
        match self {
            MigrationError::ExecutionFailure { unit, .. }
            | MigrationError::OutOfOrder { unit, .. }
            | MigrationError::LedgerOutOfOrder { unit, .. } => Some(unit),
            MigrationError::UnknownVersion { version, .. }
            | MigrationError::DuplicateVersion { version, .. } => Some(version),
            _ => None,
        }
    }
}

/// データベースエラー
///
/// 台帳ストアの操作時に発生するエラーを表現します。
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Connection error
    #[error("Database connection error: {message} (cause: {cause})")]
    Connection {
        /// エラーメッセージ
        message: String,
        /// エラー原因
        cause: String,
    },

    /// Query execution error
    #[error("Query execution error: {message}")]
    Query {
        /// エラーメッセージ
        message: String,
        /// 失敗したSQL
        sql: Option<String>,
    },

    /// Transaction error
    #[error("Transaction error: {message}")]
    Transaction {
        /// エラーメッセージ
        message: String,
    },

    /// 前回の適用・取り消しが完了しなかった
    #[error(
        "Migration {version} of module '{module}' did not finish; the schema may be partially changed. Repair it and fix the ledger row before continuing"
    )]
    Interrupted {
        /// モジュール名
        module: String,
        /// マイグレーションID
        version: String,
    },

    /// Invalid table name error
    #[error("Invalid table name '{name}': {reason}")]
    InvalidTableName {
        /// テーブル名
        name: String,
        /// 不正な理由
        reason: String,
    },
}

impl DatabaseError {
    /// 接続エラーかどうか
    pub fn is_connection(&self) -> bool {
        matches!(self, DatabaseError::Connection { .. })
    }

    /// クエリエラーかどうか
    pub fn is_query(&self) -> bool {
        matches!(self, DatabaseError::Query { .. })
    }

    /// トランザクションエラーかどうか
    pub fn is_transaction(&self) -> bool {
        matches!(self, DatabaseError::Transaction { .. })
    }

    /// 未完了のマイグレーションが残っているかどうか
    pub fn is_interrupted(&self) -> bool {
        matches!(self, DatabaseError::Interrupted { .. })
    }

    /// 失敗したSQLを取得
    pub fn sql(&self) -> Option<&str> {
        match self {
            DatabaseError::Query { sql, .. } => sql.as_deref(),
            _ => None,
        }
    }
}
