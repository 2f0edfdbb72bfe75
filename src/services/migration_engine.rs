// マイグレーションエンジン
//
// モジュール単位でマイグレーションの適用・取り消し・リセット、
// シーダーの実行、ステータスの取得を行います。
// 各ユニットのSQL文の実行と台帳の更新は、ストアが1つのトランザクションで行います。

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::core::error::{BoxError, MigrationError};
use crate::core::ledger::{LedgerStore, MigrationLedger};
use crate::core::migration::{
    LedgerEntry, Operation, RunReport, SeedReport, SeederOutcome, StatusReport, StatusSummary,
    UnitOutcome, UnitState, UnitStatus,
};
use crate::core::migration_set::{MigrationSet, MigrationSource};
use crate::core::module::ModuleName;
use crate::services::reporter::{Reporter, SilentReporter};

/// エンジンの実行オプション
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineOptions {
    /// SQL文を生成するだけで実行せず、台帳も更新しない
    pub dry_run: bool,
    /// ユニットの進捗表示を抑制する
    pub mute: bool,
}

/// マイグレーションエンジン
///
/// 永続的な状態を持たず、操作のたびに台帳を読み直します。
/// 同じモジュールに対する書き込みは1つのエンジンからのみ行う前提です。
pub struct MigrationEngine {
    source: Arc<dyn MigrationSource>,
    store: Arc<dyn LedgerStore>,
    reporter: Arc<dyn Reporter>,
    options: EngineOptions,
}

impl MigrationEngine {
    /// 新しいMigrationEngineを作成
    pub fn new(source: Arc<dyn MigrationSource>, store: Arc<dyn LedgerStore>) -> Self {
        Self {
            source,
            store,
            reporter: Arc::new(SilentReporter),
            options: EngineOptions::default(),
        }
    }

    /// 進捗レポーターを設定
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// 実行オプションを設定
    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// 未適用のマイグレーションを適用
    ///
    /// `target` を指定した場合、ID が `target` 以下のユニットのみ適用します。
    /// 失敗したユニットで停止し、それまでに適用したユニットは台帳に残ります。
    pub async fn migrate(
        &self,
        module: &ModuleName,
        target: Option<&str>,
    ) -> Result<RunReport, MigrationError> {
        let mut set = self.source.load(module)?;
        if let Some(target) = target {
            set.require(target)?;
        }

        let mut ledger = self.read_ledger(module).await?;
        set.ensure_consistent(&ledger)?;

        let pending: Vec<String> = set
            .pending(&ledger)
            .into_iter()
            .map(|u| u.id().to_string())
            .filter(|id| target.is_none_or(|t| id.as_str() <= t))
            .collect();

        if let (Some(first), Some(max)) = (pending.first(), ledger.max_version()) {
            if first.as_str() < max {
                return Err(MigrationError::OutOfOrder {
                    module: module.to_string(),
                    unit: first.clone(),
                    head: max.to_string(),
                });
            }
        }

        let mut report = RunReport::new(module.clone(), Operation::Up, self.options.dry_run);
        if pending.is_empty() {
            debug!(module = %module, "Nothing to migrate");
            return Ok(report);
        }

        info!(
            module = %module,
            count = pending.len(),
            dry_run = self.options.dry_run,
            "Applying migrations"
        );
        if !self.options.dry_run {
            self.store.prepare().await?;
        }
        set.mute_all(self.options.mute);

        for id in pending {
            let outcome = self.apply_unit(&mut set, &mut ledger, &id).await?;
            report.units.push(outcome);
        }

        Ok(report)
    }

    /// 適用済みのマイグレーションを取り消す
    ///
    /// - 引数なし: 最後に適用したユニットのみ
    /// - `target`: ID が `target` より大きいユニット
    /// - `date`: `date` より後に適用されたユニット
    pub async fn rollback(
        &self,
        module: &ModuleName,
        target: Option<&str>,
        date: Option<DateTime<Utc>>,
    ) -> Result<RunReport, MigrationError> {
        if target.is_some() && date.is_some() {
            return Err(MigrationError::ConflictingArguments);
        }

        let mut set = self.source.load(module)?;
        if let Some(target) = target {
            set.require(target)?;
        }

        let ledger = self.read_ledger(module).await?;
        set.ensure_consistent(&ledger)?;
        if ledger.is_empty() {
            if target.is_some() {
                debug!(module = %module, "Ledger is empty, nothing after target");
                return Ok(RunReport::new(
                    module.clone(),
                    Operation::Down,
                    self.options.dry_run,
                ));
            }
            return Err(MigrationError::NothingToRollback {
                module: module.to_string(),
            });
        }

        let entries = match (target, date) {
            (Some(target), _) => ledger.tail_after_version(target),
            (_, Some(date)) => ledger.tail_after_date(date),
            (None, None) => ledger.head().into_iter().collect(),
        };
        self.notify_modified(&set, &entries);
        let ids: Vec<String> = entries.iter().map(|e| e.unit_id.clone()).collect();

        self.revert_units(&mut set, ids).await
    }

    /// 全ての適用済みマイグレーションを取り消す
    pub async fn reset(&self, module: &ModuleName) -> Result<RunReport, MigrationError> {
        let mut set = self.source.load(module)?;
        let ledger = self.read_ledger(module).await?;
        set.ensure_consistent(&ledger)?;

        let entries = ledger.all_reversed();
        self.notify_modified(&set, &entries);
        let ids: Vec<String> = entries.iter().map(|e| e.unit_id.clone()).collect();

        self.revert_units(&mut set, ids).await
    }

    /// シーダーを実行
    ///
    /// 名前を省略した場合は全シーダーを名前順に実行し、最初の失敗で停止します。
    /// 実行済みのシーダーは取り消されません。
    pub async fn seed(
        &self,
        module: &ModuleName,
        seeder: Option<&str>,
    ) -> Result<SeedReport, MigrationError> {
        let mut seeders = self.source.seeders(module)?;
        seeders.sort_by(|a, b| a.name().cmp(b.name()));

        if let Some(name) = seeder {
            seeders.retain(|s| s.name() == name);
            if seeders.is_empty() {
                return Err(MigrationError::UnknownSeeder {
                    module: module.to_string(),
                    seeder: name.to_string(),
                });
            }
        }

        info!(module = %module, count = seeders.len(), "Running seeders");
        let mut report = SeedReport {
            module: module.clone(),
            dry_run: self.options.dry_run,
            seeders: Vec::new(),
        };

        for seeder in &seeders {
            let failure = |source: BoxError| MigrationError::SeederFailure {
                module: module.to_string(),
                seeder: seeder.name().to_string(),
                source,
            };

            let statements = seeder.run().map_err(failure)?;
            if !self.options.dry_run {
                self.store
                    .execute(&statements)
                    .await
                    .map_err(|e| failure(e.into()))?;
            }
            debug!(module = %module, seeder = seeder.name(), statements = statements.len(), "Seeder finished");
            self.reporter
                .seeder_finished(module, seeder.name(), &statements, self.options.dry_run);
            report.seeders.push(SeederOutcome {
                name: seeder.name().to_string(),
                statements: statements.len(),
            });
        }

        Ok(report)
    }

    /// モジュールのステータスを取得
    ///
    /// 台帳にのみ存在するエントリは `orphaned` として報告します。
    /// `only_pending` の場合も、サマリーは全ユニットを集計します。
    pub async fn status(
        &self,
        module: &ModuleName,
        only_pending: bool,
    ) -> Result<StatusReport, MigrationError> {
        let set = self.source.load(module)?;
        let ledger = self.read_ledger(module).await?;

        let mut units: Vec<UnitStatus> = set
            .units()
            .iter()
            .map(|unit| match ledger.get(unit.id()) {
                Some(entry) => UnitStatus {
                    id: unit.id().to_string(),
                    description: unit.description().to_string(),
                    state: UnitState::Applied,
                    applied_at: Some(entry.applied_at),
                    checksum_mismatch: match (&entry.checksum, unit.checksum()) {
                        (Some(recorded), Some(current)) => *recorded != current,
                        _ => false,
                    },
                },
                None => UnitStatus {
                    id: unit.id().to_string(),
                    description: unit.description().to_string(),
                    state: UnitState::Pending,
                    applied_at: None,
                    checksum_mismatch: false,
                },
            })
            .collect();

        for entry in set.orphaned(&ledger) {
            warn!(module = %module, unit = %entry.unit_id, "Ledger entry has no migration");
            units.push(UnitStatus {
                id: entry.unit_id.clone(),
                description: String::new(),
                state: UnitState::Orphaned,
                applied_at: Some(entry.applied_at),
                checksum_mismatch: false,
            });
        }
        units.sort_by(|a, b| a.id.cmp(&b.id));

        let summary = units.iter().fold(
            StatusSummary::default(),
            |mut summary, unit| {
                summary.total += 1;
                match unit.state {
                    UnitState::Applied => summary.applied += 1,
                    UnitState::Pending => summary.pending += 1,
                    UnitState::Orphaned => summary.orphaned += 1,
                }
                summary
            },
        );

        if only_pending {
            units.retain(|u| u.state == UnitState::Pending);
        }

        Ok(StatusReport {
            module: module.clone(),
            units,
            summary,
        })
    }

    /// 適用後にソースが変更されたユニットを取り消す前に通知
    fn notify_modified(&self, set: &MigrationSet, entries: &[&LedgerEntry]) {
        for entry in entries {
            let current = set.get(&entry.unit_id).and_then(|u| u.checksum());
            if let (Some(recorded), Some(current)) = (&entry.checksum, current) {
                if *recorded != current {
                    warn!(module = %set.module(), unit = %entry.unit_id, "Reverting a modified migration");
                    self.reporter.notice(&format!(
                        "Migration {} was modified after being applied; its current down script will be used.",
                        entry.unit_id
                    ));
                }
            }
        }
    }

    async fn read_ledger(&self, module: &ModuleName) -> Result<MigrationLedger, MigrationError> {
        let entries = self.store.read(module).await?;
        Ok(MigrationLedger::new(module.clone(), entries))
    }

    async fn apply_unit(
        &self,
        set: &mut MigrationSet,
        ledger: &mut MigrationLedger,
        id: &str,
    ) -> Result<UnitOutcome, MigrationError> {
        let module = set.module().clone();
        let failure = |source: BoxError| MigrationError::ExecutionFailure {
            module: module.to_string(),
            unit: id.to_string(),
            operation: Operation::Up,
            source,
        };
        let unit = set.get_mut(id).ok_or_else(|| MigrationError::UnknownVersion {
            module: module.to_string(),
            version: id.to_string(),
        })?;

        if !unit.is_muted() {
            self.reporter
                .unit_started(unit, Operation::Up, self.options.dry_run);
        }
        let started = Instant::now();
        let statements = unit.up().map_err(failure)?.to_vec();

        if !self.options.dry_run {
            let entry = LedgerEntry::new(id, ledger.next_applied_at(Utc::now()))
                .with_checksum(unit.checksum());
            self.store
                .apply(&module, &entry, &statements)
                .await
                .map_err(|e| failure(e.into()))?;
            ledger.record(entry);
        }

        let duration_ms = started.elapsed().as_millis() as i64;
        debug!(module = %module, unit = id, statements = statements.len(), duration_ms, "Migration applied");
        if !unit.is_muted() {
            self.reporter.unit_finished(
                unit,
                Operation::Up,
                &statements,
                duration_ms,
                self.options.dry_run,
            );
        }

        Ok(UnitOutcome {
            id: id.to_string(),
            description: unit.description().to_string(),
            statements,
            duration_ms,
        })
    }

    async fn revert_units(
        &self,
        set: &mut MigrationSet,
        ids: Vec<String>,
    ) -> Result<RunReport, MigrationError> {
        let module = set.module().clone();
        let mut report = RunReport::new(module.clone(), Operation::Down, self.options.dry_run);
        if ids.is_empty() {
            debug!(module = %module, "Nothing to revert");
            return Ok(report);
        }

        info!(
            module = %module,
            count = ids.len(),
            dry_run = self.options.dry_run,
            "Reverting migrations"
        );
        set.mute_all(self.options.mute);

        for id in ids {
            let outcome = self.revert_unit(set, &id).await?;
            report.units.push(outcome);
        }

        Ok(report)
    }

    async fn revert_unit(
        &self,
        set: &mut MigrationSet,
        id: &str,
    ) -> Result<UnitOutcome, MigrationError> {
        let module = set.module().clone();
        let failure = |source: BoxError| MigrationError::ExecutionFailure {
            module: module.to_string(),
            unit: id.to_string(),
            operation: Operation::Down,
            source,
        };
        let unit = set.get_mut(id).ok_or_else(|| MigrationError::UnknownVersion {
            module: module.to_string(),
            version: id.to_string(),
        })?;

        if !unit.is_muted() {
            self.reporter
                .unit_started(unit, Operation::Down, self.options.dry_run);
        }
        let started = Instant::now();
        let statements = unit.down().map_err(failure)?.to_vec();

        if !self.options.dry_run {
            self.store
                .revert(&module, id, &statements)
                .await
                .map_err(|e| failure(e.into()))?;
        }

        let duration_ms = started.elapsed().as_millis() as i64;
        debug!(module = %module, unit = id, statements = statements.len(), duration_ms, "Migration reverted");
        if !unit.is_muted() {
            self.reporter.unit_finished(
                unit,
                Operation::Down,
                &statements,
                duration_ms,
                self.options.dry_run,
            );
        }

        Ok(UnitOutcome {
            id: id.to_string(),
            description: unit.description().to_string(),
            statements,
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_store::MemoryLedgerStore;
    use crate::adapters::sql_migration::SqlMigration;
    use crate::adapters::static_source::StaticMigrationSource;

    fn module() -> ModuleName {
        ModuleName::parse("acme/shop").unwrap()
    }

    fn engine(store: Arc<MemoryLedgerStore>) -> MigrationEngine {
        let mut source = StaticMigrationSource::new();
        for id in ["20230101_init", "20230215_add_col", "20230310_index"] {
            source.add_migration(
                module(),
                SqlMigration::new(
                    id,
                    "",
                    format!("CREATE TABLE t_{} (id INT)", id),
                    Some(format!("DROP TABLE t_{}", id)),
                ),
            );
        }
        MigrationEngine::new(Arc::new(source), store)
    }

    #[tokio::test]
    async fn test_migrate_prepares_store() {
        let store = Arc::new(MemoryLedgerStore::new());
        let report = engine(store.clone()).migrate(&module(), None).await.unwrap();

        assert_eq!(report.count(), 3);
        assert!(store.is_prepared());
    }

    #[tokio::test]
    async fn test_dry_run_does_not_prepare_store() {
        let store = Arc::new(MemoryLedgerStore::new());
        let engine = engine(store.clone()).with_options(EngineOptions {
            dry_run: true,
            mute: false,
        });

        let report = engine.migrate(&module(), None).await.unwrap();

        assert!(report.dry_run);
        assert_eq!(report.units[0].statements.len(), 1);
        assert!(!store.is_prepared());
        assert!(store.entries(&module()).is_empty());
    }

    #[tokio::test]
    async fn test_applied_at_never_decreases() {
        let store = Arc::new(MemoryLedgerStore::new());
        let future = Utc::now() + chrono::Duration::hours(1);
        store.insert_entry(&module(), LedgerEntry::new("20230101_init", future));

        engine(store.clone()).migrate(&module(), None).await.unwrap();

        let entries = store.entries(&module());
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.applied_at == future));
    }

    #[derive(Default)]
    struct Notices(std::sync::Mutex<Vec<String>>);

    impl Reporter for Notices {
        fn unit_started(&self, _: &crate::core::migration::MigrationUnit, _: Operation, _: bool) {}

        fn unit_finished(
            &self,
            _: &crate::core::migration::MigrationUnit,
            _: Operation,
            _: &[crate::core::migration::Statement],
            _: i64,
            _: bool,
        ) {
        }

        fn seeder_finished(&self, _: &ModuleName, _: &str, _: &[crate::core::migration::Statement], _: bool) {}

        fn notice(&self, message: &str) {
            self.0.lock().unwrap().push(message.to_string());
        }
    }

    #[tokio::test]
    async fn test_rollback_notices_modified_source() {
        let store = Arc::new(MemoryLedgerStore::new());
        store.insert_entry(
            &module(),
            LedgerEntry::new("20230101_init", Utc::now()).with_checksum(Some("stale".to_string())),
        );
        let notices = Arc::new(Notices::default());
        let engine = engine(store.clone()).with_reporter(notices.clone());

        engine.rollback(&module(), None, None).await.unwrap();

        let notices = notices.0.lock().unwrap();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].contains("20230101_init"));
        assert!(store.entries(&module()).is_empty());
    }
}
