// 進捗レポーター
//
// エンジンの進捗表示を受け取るシンク。エンジンの正しさはレポーターに依存しません。

use colored::Colorize;
use std::io::Write;

use crate::core::migration::{MigrationUnit, Operation, Statement};
use crate::core::module::ModuleName;

/// 進捗レポーター
pub trait Reporter: Send + Sync {
    /// ユニットの処理を開始した
    fn unit_started(&self, unit: &MigrationUnit, operation: Operation, dry_run: bool);

    /// ユニットの処理が完了した
    fn unit_finished(
        &self,
        unit: &MigrationUnit,
        operation: Operation,
        statements: &[Statement],
        duration_ms: i64,
        dry_run: bool,
    );

    /// シーダーの実行が完了した
    fn seeder_finished(&self, module: &ModuleName, name: &str, statements: &[Statement], dry_run: bool);

    /// 補足メッセージ
    fn notice(&self, message: &str);
}

/// 何も出力しないレポーター
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentReporter;

impl Reporter for SilentReporter {
    fn unit_started(&self, _unit: &MigrationUnit, _operation: Operation, _dry_run: bool) {}

    fn unit_finished(
        &self,
        _unit: &MigrationUnit,
        _operation: Operation,
        _statements: &[Statement],
        _duration_ms: i64,
        _dry_run: bool,
    ) {
    }

    fn seeder_finished(&self, _module: &ModuleName, _name: &str, _statements: &[Statement], _dry_run: bool) {}

    fn notice(&self, _message: &str) {}
}

/// 標準エラー出力に色付きで進捗を表示するレポーター
///
/// 標準出力はコマンドの結果（JSONを含む）に使うため、進捗は標準エラー出力に書きます。
/// ドライランではユニットが生成したSQL文も表示します。
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleReporter;

impl ConsoleReporter {
    pub fn new() -> Self {
        Self
    }

    fn label(operation: Operation) -> colored::ColoredString {
        match operation {
            Operation::Up => "Migrating".yellow(),
            Operation::Down => "Rolling back".yellow(),
        }
    }

    fn done(operation: Operation) -> colored::ColoredString {
        match operation {
            Operation::Up => "Migrated".green(),
            Operation::Down => "Rolled back".green(),
        }
    }
}

impl Reporter for ConsoleReporter {
    fn unit_started(&self, unit: &MigrationUnit, operation: Operation, dry_run: bool) {
        if dry_run {
            return;
        }
        eprintln!("{}: {} {}", Self::label(operation), unit.module(), unit.id());
    }

    fn unit_finished(
        &self,
        unit: &MigrationUnit,
        operation: Operation,
        statements: &[Statement],
        duration_ms: i64,
        dry_run: bool,
    ) {
        let mut stderr = std::io::stderr().lock();
        if dry_run {
            let _ = writeln!(
                stderr,
                "{} {} {} ({})",
                "[dry-run]".cyan(),
                unit.module(),
                unit.id(),
                operation
            );
            for statement in statements {
                let _ = writeln!(stderr, "  {};", statement.sql().dimmed());
            }
            return;
        }
        let _ = writeln!(
            stderr,
            "{}:  {} {} ({} ms)",
            Self::done(operation),
            unit.module(),
            unit.id(),
            duration_ms
        );
    }

    fn seeder_finished(&self, module: &ModuleName, name: &str, statements: &[Statement], dry_run: bool) {
        let mut stderr = std::io::stderr().lock();
        if dry_run {
            let _ = writeln!(stderr, "{} {} seeder {}", "[dry-run]".cyan(), module, name);
            for statement in statements {
                let _ = writeln!(stderr, "  {};", statement.sql().dimmed());
            }
            return;
        }
        let _ = writeln!(
            stderr,
            "{}: {} {} ({} statements)",
            "Seeded".green(),
            module,
            name,
            statements.len()
        );
    }

    fn notice(&self, message: &str) {
        eprintln!("{}", message.yellow());
    }
}
