// インメモリ台帳ストア
//
// 実行されたSQL文を記録するだけのストア。テストとSQL文の検査に使用します。
// 指定したパターンを含むSQL文を失敗させることで、実行失敗を再現できます。

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::core::error::DatabaseError;
use crate::core::ledger::LedgerStore;
use crate::core::migration::{LedgerEntry, Statement};
use crate::core::module::ModuleName;

#[derive(Debug, Default)]
struct MemoryState {
    prepared: bool,
    ledgers: HashMap<String, Vec<LedgerEntry>>,
    executed: Vec<Statement>,
    fail_pattern: Option<String>,
}

/// インメモリ台帳ストア
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    state: Mutex<MemoryState>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `pattern` を含むSQL文の実行を失敗させる
    pub fn fail_on(&self, pattern: impl Into<String>) {
        self.lock().fail_pattern = Some(pattern.into());
    }

    /// 失敗パターンを解除
    pub fn clear_failure(&self) {
        self.lock().fail_pattern = None;
    }

    /// これまでに実行されたSQL文
    pub fn executed(&self) -> Vec<Statement> {
        self.lock().executed.clone()
    }

    /// モジュールの台帳エントリ
    pub fn entries(&self, module: &ModuleName) -> Vec<LedgerEntry> {
        self.lock()
            .ledgers
            .get(&module.to_string())
            .cloned()
            .unwrap_or_default()
    }

    /// 台帳エントリを直接追加（外部からの変更を再現する）
    pub fn insert_entry(&self, module: &ModuleName, entry: LedgerEntry) {
        self.lock()
            .ledgers
            .entry(module.to_string())
            .or_default()
            .push(entry);
    }

    pub fn is_prepared(&self) -> bool {
        self.lock().prepared
    }

    /// 失敗パターンに一致するSQL文を探す（実行前に全体を検査し、部分適用を防ぐ）
    fn check(state: &MemoryState, statements: &[Statement]) -> Result<(), DatabaseError> {
        let Some(pattern) = state.fail_pattern.as_deref() else {
            return Ok(());
        };
        match statements.iter().find(|s| s.sql().contains(pattern)) {
            Some(statement) => Err(DatabaseError::Query {
                message: format!("Statement rejected by store (matched '{}')", pattern),
                sql: Some(statement.sql().to_string()),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn prepare(&self) -> Result<(), DatabaseError> {
        self.lock().prepared = true;
        Ok(())
    }

    async fn read(&self, module: &ModuleName) -> Result<Vec<LedgerEntry>, DatabaseError> {
        Ok(self.entries(module))
    }

    async fn apply(
        &self,
        module: &ModuleName,
        entry: &LedgerEntry,
        statements: &[Statement],
    ) -> Result<(), DatabaseError> {
        let mut state = self.lock();
        Self::check(&state, statements)?;

        let ledger = state.ledgers.entry(module.to_string()).or_default();
        if ledger.iter().any(|e| e.unit_id == entry.unit_id) {
            return Err(DatabaseError::Transaction {
                message: format!("Migration {} is already recorded for {}", entry.unit_id, module),
            });
        }
        ledger.push(entry.clone());
        state.executed.extend_from_slice(statements);
        Ok(())
    }

    async fn revert(
        &self,
        module: &ModuleName,
        unit_id: &str,
        statements: &[Statement],
    ) -> Result<(), DatabaseError> {
        let mut state = self.lock();
        Self::check(&state, statements)?;

        let ledger = state.ledgers.entry(module.to_string()).or_default();
        match ledger.last() {
            Some(head) if head.unit_id == unit_id => {
                ledger.pop();
            }
            head => {
                return Err(DatabaseError::Transaction {
                    message: format!(
                        "Migration {} is not the last applied migration of {} (head: {})",
                        unit_id,
                        module,
                        head.map(|e| e.unit_id.as_str()).unwrap_or("none")
                    ),
                });
            }
        }
        state.executed.extend_from_slice(statements);
        Ok(())
    }

    async fn execute(&self, statements: &[Statement]) -> Result<(), DatabaseError> {
        let mut state = self.lock();
        // シーダーは非トランザクションのため、失敗した文より前は実行済みになる
        for statement in statements {
            Self::check(&state, std::slice::from_ref(statement))?;
            state.executed.push(statement.clone());
        }
        Ok(())
    }
}
