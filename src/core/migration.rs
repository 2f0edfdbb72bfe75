// マイグレーションドメインモデル
//
// マイグレーションユニット、生成されたSQL文、台帳エントリ、
// ステータスと実行結果のレポートを表現する型を提供します。

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;

use crate::core::error::BoxError;
use crate::core::module::ModuleName;

/// マイグレーションの実行方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// 適用
    Up,
    /// 取り消し
    Down,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Up => write!(f, "up"),
            Operation::Down => write!(f, "down"),
        }
    }
}

/// マイグレーションやシーダーが生成したSQL文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    sql: String,
}

impl Statement {
    /// 新しいSQL文を作成
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into() }
    }

    /// SQL文字列
    pub fn sql(&self) -> &str {
        &self.sql
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

impl From<&str> for Statement {
    fn from(sql: &str) -> Self {
        Self::new(sql)
    }
}

impl From<String> for Statement {
    fn from(sql: String) -> Self {
        Self::new(sql)
    }
}

impl Serialize for Statement {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.sql)
    }
}

/// 1つのマイグレーションの定義
///
/// `up` / `down` は実行すべきSQL文を返すだけで、自身では実行しません。
/// 実行と台帳の更新はエンジンが1つのトランザクションで行います。
pub trait Migration: Send + Sync {
    /// モジュール内で一意かつ辞書順に並ぶID
    fn id(&self) -> &str;

    /// マイグレーションの説明
    fn description(&self) -> &str {
        ""
    }

    /// ソースのチェックサム（不明な場合はNone）
    fn checksum(&self) -> Option<String> {
        None
    }

    /// 適用用のSQL文を生成
    fn up(&self) -> Result<Vec<Statement>, BoxError>;

    /// 取り消し用のSQL文を生成
    fn down(&self) -> Result<Vec<Statement>, BoxError>;
}

/// 実行コンテキストが所有するマイグレーションユニット
///
/// ミュート状態と直近に生成されたSQL文を保持します。
/// 実行ごとに新しいインスタンスがロードされるため、状態は共有されません。
pub struct MigrationUnit {
    module: ModuleName,
    migration: Box<dyn Migration>,
    muted: bool,
    up_queries: Vec<Statement>,
    down_queries: Vec<Statement>,
}

impl MigrationUnit {
    /// 新しいマイグレーションユニットを作成
    pub fn new(module: ModuleName, migration: Box<dyn Migration>) -> Self {
        Self {
            module,
            migration,
            muted: false,
            up_queries: Vec::new(),
            down_queries: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        self.migration.id()
    }

    pub fn module(&self) -> &ModuleName {
        &self.module
    }

    pub fn description(&self) -> &str {
        self.migration.description()
    }

    pub fn checksum(&self) -> Option<String> {
        self.migration.checksum()
    }

    /// up を実行し、生成されたSQL文を記録して返す
    pub fn up(&mut self) -> Result<&[Statement], BoxError> {
        self.up_queries.clear();
        self.up_queries = self.migration.up()?;
        Ok(&self.up_queries)
    }

    /// down を実行し、生成されたSQL文を記録して返す
    pub fn down(&mut self) -> Result<&[Statement], BoxError> {
        self.down_queries.clear();
        self.down_queries = self.migration.down()?;
        Ok(&self.down_queries)
    }

    /// 直近の up で生成されたSQL文（未実行なら空）
    pub fn up_queries(&self) -> &[Statement] {
        &self.up_queries
    }

    /// 直近の down で生成されたSQL文（未実行なら空）
    pub fn down_queries(&self) -> &[Statement] {
        &self.down_queries
    }

    /// 進捗表示を抑制するかどうかを設定
    pub fn mute(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }
}

impl fmt::Debug for MigrationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationUnit")
            .field("module", &self.module)
            .field("id", &self.id())
            .field("muted", &self.muted)
            .field("up_queries", &self.up_queries.len())
            .field("down_queries", &self.down_queries.len())
            .finish()
    }
}

/// 台帳エントリ
///
/// 適用済みマイグレーション1件を表現します。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    /// マイグレーションID
    pub unit_id: String,
    /// 適用日時
    pub applied_at: DateTime<Utc>,
    /// 適用時のチェックサム
    pub checksum: Option<String>,
}

impl LedgerEntry {
    /// 新しい台帳エントリを作成
    pub fn new(unit_id: impl Into<String>, applied_at: DateTime<Utc>) -> Self {
        Self {
            unit_id: unit_id.into(),
            applied_at,
            checksum: None,
        }
    }

    /// チェックサムを指定
    pub fn with_checksum(mut self, checksum: Option<String>) -> Self {
        self.checksum = checksum;
        self
    }
}

/// マイグレーションの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    /// 適用済み
    Applied,
    /// 未適用
    Pending,
    /// 台帳にのみ存在する
    Orphaned,
}

/// マイグレーション1件のステータス
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitStatus {
    pub id: String,
    pub description: String,
    pub state: UnitState,
    pub applied_at: Option<DateTime<Utc>>,
    /// 適用後にソースが変更されたかどうか
    pub checksum_mismatch: bool,
}

impl UnitStatus {
    /// 台帳に記録されているかどうか
    pub fn is_applied(&self) -> bool {
        matches!(self.state, UnitState::Applied | UnitState::Orphaned)
    }
}

/// ステータスサマリー
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub total: usize,
    pub applied: usize,
    pub pending: usize,
    pub orphaned: usize,
}

/// モジュールのステータスレポート
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub module: ModuleName,
    pub units: Vec<UnitStatus>,
    pub summary: StatusSummary,
}

impl StatusReport {
    /// 台帳に記録されているマイグレーションID
    pub fn applied_ids(&self) -> Vec<&str> {
        self.units
            .iter()
            .filter(|u| u.is_applied())
            .map(|u| u.id.as_str())
            .collect()
    }

    /// 孤立したエントリがあるかどうか
    pub fn has_orphans(&self) -> bool {
        self.summary.orphaned > 0
    }
}

/// マイグレーション1件の実行結果
#[derive(Debug, Clone, Serialize)]
pub struct UnitOutcome {
    pub id: String,
    pub description: String,
    pub statements: Vec<Statement>,
    pub duration_ms: i64,
}

/// migrate / rollback / reset の実行結果
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub module: ModuleName,
    pub operation: Operation,
    pub dry_run: bool,
    pub units: Vec<UnitOutcome>,
}

impl RunReport {
    /// 空のレポートを作成
    pub fn new(module: ModuleName, operation: Operation, dry_run: bool) -> Self {
        Self {
            module,
            operation,
            dry_run,
            units: Vec::new(),
        }
    }

    /// 処理したマイグレーション数
    pub fn count(&self) -> usize {
        self.units.len()
    }

    /// 処理したマイグレーションID（処理順）
    pub fn ids(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.id.as_str()).collect()
    }

    /// 合計実行時間（ミリ秒）
    pub fn total_duration_ms(&self) -> i64 {
        self.units.iter().map(|u| u.duration_ms).sum()
    }
}

/// シーダー1件の実行結果
#[derive(Debug, Clone, Serialize)]
pub struct SeederOutcome {
    pub name: String,
    pub statements: usize,
}

/// seed の実行結果
#[derive(Debug, Clone, Serialize)]
pub struct SeedReport {
    pub module: ModuleName,
    pub dry_run: bool,
    pub seeders: Vec<SeederOutcome>,
}
