// マイグレーション台帳
//
// モジュールごとの適用済みマイグレーション履歴と、
// それを永続化するストアのトレイトを定義します。

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};

use crate::core::error::DatabaseError;
use crate::core::migration::{LedgerEntry, Statement};
use crate::core::module::ModuleName;

/// 台帳ストア
///
/// 実行シンクと台帳を兼ねるストアです。`apply` と `revert` は
/// SQL文の実行と台帳の更新を1つのトランザクションで行わなければなりません。
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// 台帳の保存先を作成（存在する場合は何もしない）
    async fn prepare(&self) -> Result<(), DatabaseError>;

    /// モジュールの台帳エントリを適用順に読み込む
    async fn read(&self, module: &ModuleName) -> Result<Vec<LedgerEntry>, DatabaseError>;

    /// SQL文を実行し、成功した場合のみエントリを末尾に追加
    async fn apply(
        &self,
        module: &ModuleName,
        entry: &LedgerEntry,
        statements: &[Statement],
    ) -> Result<(), DatabaseError>;

    /// SQL文を実行し、成功した場合のみ末尾のエントリを削除
    async fn revert(
        &self,
        module: &ModuleName,
        unit_id: &str,
        statements: &[Statement],
    ) -> Result<(), DatabaseError>;

    /// 台帳を更新せずにSQL文を実行（シーダー用）
    async fn execute(&self, statements: &[Statement]) -> Result<(), DatabaseError>;
}

/// モジュールの台帳スナップショット
///
/// エントリは適用日時の昇順（同時刻はID順）に並びます。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationLedger {
    module: ModuleName,
    entries: Vec<LedgerEntry>,
}

impl MigrationLedger {
    /// ストアから読み込んだエントリで台帳を作成
    pub fn new(module: ModuleName, mut entries: Vec<LedgerEntry>) -> Self {
        entries.sort_by(|a, b| {
            a.applied_at
                .cmp(&b.applied_at)
                .then_with(|| a.unit_id.cmp(&b.unit_id))
        });
        Self { module, entries }
    }

    pub fn module(&self) -> &ModuleName {
        &self.module
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 最後に適用されたエントリ
    pub fn head(&self) -> Option<&LedgerEntry> {
        self.entries.last()
    }

    pub fn get(&self, unit_id: &str) -> Option<&LedgerEntry> {
        self.entries.iter().find(|e| e.unit_id == unit_id)
    }

    pub fn contains(&self, unit_id: &str) -> bool {
        self.get(unit_id).is_some()
    }

    /// 適用に成功したエントリを末尾に追加
    pub(crate) fn record(&mut self, entry: LedgerEntry) {
        self.entries.push(entry);
    }

    /// 次に追加するエントリの適用日時
    ///
    /// 台帳の日時が減少しないよう、末尾より前の時刻にはしません。
    pub fn next_applied_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let now = now.trunc_subsecs(6);
        match self.head() {
            Some(head) if head.applied_at > now => head.applied_at,
            _ => now,
        }
    }

    /// 末尾から、IDが `target` より大きいエントリを取り出す（取り消し順）
    pub fn tail_after_version(&self, target: &str) -> Vec<&LedgerEntry> {
        self.entries
            .iter()
            .rev()
            .take_while(|e| e.unit_id.as_str() > target)
            .collect()
    }

    /// 末尾から、`date` より後に適用されたエントリを取り出す（取り消し順）
    pub fn tail_after_date(&self, date: DateTime<Utc>) -> Vec<&LedgerEntry> {
        self.entries
            .iter()
            .rev()
            .take_while(|e| e.applied_at > date)
            .collect()
    }

    /// 全エントリを取り消し順に取り出す
    pub fn all_reversed(&self) -> Vec<&LedgerEntry> {
        self.entries.iter().rev().collect()
    }

    /// 台帳の順序がIDの昇順と一致しているかどうか
    pub fn is_in_version_order(&self) -> bool {
        self.first_order_violation().is_none()
    }

    /// ID順に反して記録された最初のエントリの組（前, 後）
    pub fn first_order_violation(&self) -> Option<(&LedgerEntry, &LedgerEntry)> {
        self.entries
            .windows(2)
            .find(|pair| pair[0].unit_id >= pair[1].unit_id)
            .map(|pair| (&pair[0], &pair[1]))
    }

    /// 適用済みの最大のID
    pub fn max_version(&self) -> Option<&str> {
        self.entries.iter().map(|e| e.unit_id.as_str()).max()
    }
}
