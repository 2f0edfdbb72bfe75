// マイグレーションセット
//
// 1つのモジュールに属するマイグレーションをID順に並べた集合と、
// モジュール名からマイグレーションとシーダーを解決するソースのトレイトを定義します。

use crate::core::error::MigrationError;
use crate::core::ledger::MigrationLedger;
use crate::core::migration::{LedgerEntry, Migration, MigrationUnit};
use crate::core::module::ModuleName;
use crate::core::seeder::Seeder;

/// マイグレーションソース
///
/// モジュール名をマイグレーションセットとシーダー一覧に解決します。
/// 呼び出しごとに新しいインスタンスを返します。
pub trait MigrationSource: Send + Sync {
    /// モジュールのマイグレーションセットを読み込む
    fn load(&self, module: &ModuleName) -> Result<MigrationSet, MigrationError>;

    /// モジュールのシーダーを読み込む
    fn seeders(&self, module: &ModuleName) -> Result<Vec<Box<dyn Seeder>>, MigrationError>;

    /// 既知のモジュール一覧
    fn modules(&self) -> Result<Vec<ModuleName>, MigrationError>;
}

/// モジュールのマイグレーションセット
///
/// ユニットはIDの昇順（適用順）に並びます。
#[derive(Debug)]
pub struct MigrationSet {
    module: ModuleName,
    units: Vec<MigrationUnit>,
}

impl MigrationSet {
    /// マイグレーションからセットを作成
    ///
    /// IDでソートし、重複したIDがあればエラーを返します。
    pub fn new(
        module: ModuleName,
        migrations: Vec<Box<dyn Migration>>,
    ) -> Result<Self, MigrationError> {
        let mut units: Vec<MigrationUnit> = migrations
            .into_iter()
            .map(|m| MigrationUnit::new(module.clone(), m))
            .collect();
        units.sort_by(|a, b| a.id().cmp(b.id()));

        if let Some(pair) = units.windows(2).find(|pair| pair[0].id() == pair[1].id()) {
            return Err(MigrationError::DuplicateVersion {
                module: module.to_string(),
                version: pair[0].id().to_string(),
            });
        }

        Ok(Self { module, units })
    }

    pub fn module(&self) -> &ModuleName {
        &self.module
    }

    pub fn units(&self) -> &[MigrationUnit] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<&MigrationUnit> {
        self.units.iter().find(|u| u.id() == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut MigrationUnit> {
        self.units.iter_mut().find(|u| u.id() == id)
    }

    /// 全ユニットのミュート状態を設定
    pub fn mute_all(&mut self, muted: bool) {
        for unit in &mut self.units {
            unit.mute(muted);
        }
    }

    /// 未適用のユニット（ID昇順）
    pub fn pending(&self, ledger: &MigrationLedger) -> Vec<&MigrationUnit> {
        self.units
            .iter()
            .filter(|u| !ledger.contains(u.id()))
            .collect()
    }

    /// 適用済みのユニット（台帳順）
    pub fn applied(&self, ledger: &MigrationLedger) -> Vec<&MigrationUnit> {
        ledger
            .entries()
            .iter()
            .filter_map(|e| self.get(&e.unit_id))
            .collect()
    }

    /// セットに存在しない台帳エントリ
    pub fn orphaned<'a>(&self, ledger: &'a MigrationLedger) -> Vec<&'a LedgerEntry> {
        ledger
            .entries()
            .iter()
            .filter(|e| !self.contains(&e.unit_id))
            .collect()
    }

    /// 台帳がセットと整合しているか確認
    ///
    /// 孤立エントリがある場合と、適用順がIDの昇順と一致しない場合はエラーです。
    pub fn ensure_consistent(&self, ledger: &MigrationLedger) -> Result<(), MigrationError> {
        let orphaned = self.orphaned(ledger);
        if !orphaned.is_empty() {
            return Err(MigrationError::LedgerDivergence {
                module: self.module.to_string(),
                units: orphaned.iter().map(|e| e.unit_id.clone()).collect(),
            });
        }

        if let Some((previous, entry)) = ledger.first_order_violation() {
            return Err(MigrationError::LedgerOutOfOrder {
                module: self.module.to_string(),
                unit: entry.unit_id.clone(),
                previous: previous.unit_id.clone(),
            });
        }

        Ok(())
    }

    /// IDが存在することを確認
    pub fn require(&self, id: &str) -> Result<(), MigrationError> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(MigrationError::UnknownVersion {
                module: self.module.to_string(),
                version: id.to_string(),
            })
        }
    }
}
