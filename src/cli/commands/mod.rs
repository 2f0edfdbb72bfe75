// コマンドハンドラー層
// 各CLIコマンドの実装と、出力の共通処理

pub mod migrate;
pub mod modules;
pub mod reset;
pub mod rollback;
pub mod seed;
pub mod status;

use crate::cli::OutputFormat;
use crate::core::error::MigrationError;
use crate::core::migration::{Operation, RunReport, UnitOutcome};
use crate::core::module::ModuleName;
use crate::services::migration_engine::MigrationEngine;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// コマンド出力の共通トレイト
///
/// `--format json` では構造体をそのままシリアライズし、
/// `--format text` では `to_text` の結果を出力します。
pub trait CommandOutput: Serialize {
    fn to_text(&self) -> String;
}

/// 出力フォーマットに応じて文字列化
pub fn render_output<T: CommandOutput>(output: &T, format: &OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(output.to_text()),
        OutputFormat::Json => {
            serde_json::to_string_pretty(output).with_context(|| "Failed to serialize output")
        }
    }
}

/// 全コマンド共通の入力パラメータ
#[derive(Debug, Clone)]
pub struct GlobalOptions {
    /// プロジェクトのルートパス
    pub project_path: PathBuf,
    /// カスタム設定ファイルパス
    pub config_path: Option<PathBuf>,
    /// 対象環境
    pub env: String,
    /// 出力フォーマット
    pub format: OutputFormat,
    /// ユニットの進捗表示を抑制する
    pub quiet: bool,
}

/// モジュール名をパース
pub(crate) fn parse_module(name: &str) -> Result<ModuleName> {
    ModuleName::parse(name).map_err(anyhow::Error::new)
}

/// `--date` の値をUTC日時としてパース
///
/// RFC 3339、`YYYY-MM-DD HH:MM:SS`、`YYYY-MM-DD`（0時）を受け付けます。
pub fn parse_date(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(value) {
        return Ok(date.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Ok(date.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    Err(anyhow!(
        "Invalid date '{}': expected RFC 3339, 'YYYY-MM-DD HH:MM:SS' or 'YYYY-MM-DD'",
        value
    ))
}

/// migrate / rollback / reset の出力
#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    pub module: String,
    pub operation: Operation,
    pub dry_run: bool,
    pub units: Vec<UnitOutcome>,
    pub total_duration_ms: i64,
    /// 補足メッセージ（ロールバック対象なしなど）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

impl RunOutput {
    pub fn from_report(report: RunReport) -> Self {
        let total_duration_ms = report.total_duration_ms();
        Self {
            module: report.module.to_string(),
            operation: report.operation,
            dry_run: report.dry_run,
            units: report.units,
            total_duration_ms,
            notice: None,
        }
    }

    /// 処理対象がなかったことを示す出力
    pub fn notice(module: &ModuleName, operation: Operation, dry_run: bool, notice: String) -> Self {
        Self {
            module: module.to_string(),
            operation,
            dry_run,
            units: Vec::new(),
            total_duration_ms: 0,
            notice: Some(notice),
        }
    }
}

impl CommandOutput for RunOutput {
    fn to_text(&self) -> String {
        if let Some(notice) = &self.notice {
            return notice.clone();
        }

        let (verb, empty) = match (self.operation, self.dry_run) {
            (Operation::Up, false) => ("Applied", "Nothing to migrate"),
            (Operation::Up, true) => ("Would apply", "Nothing to migrate"),
            (Operation::Down, false) => ("Rolled back", "Nothing to roll back"),
            (Operation::Down, true) => ("Would roll back", "Nothing to roll back"),
        };
        if self.units.is_empty() {
            return format!("{} for {}.", empty, self.module);
        }

        let mut output = format!(
            "{} {} migration(s) of {}",
            verb,
            self.units.len(),
            self.module
        );
        if self.dry_run {
            output.push_str(" (dry run):\n");
        } else {
            output.push_str(&format!(" in {} ms:\n", self.total_duration_ms));
        }
        for unit in &self.units {
            if unit.description.is_empty() {
                output.push_str(&format!("  {}\n", unit.id));
            } else {
                output.push_str(&format!("  {}  {}\n", unit.id, unit.description));
            }
            if self.dry_run {
                for statement in &unit.statements {
                    output.push_str(&format!("    {};\n", statement));
                }
            }
        }
        output.trim_end().to_string()
    }
}

/// 実行失敗後に台帳を読み直し、実際に適用済みのマイグレーションを表示
///
/// 部分的に進んだ状態を利用者が把握できるよう、元のエラーに状態を添えて返します。
pub(crate) async fn fail_with_applied_state(
    engine: &MigrationEngine,
    module: &ModuleName,
    error: MigrationError,
) -> anyhow::Error {
    if error.is_execution_failure() {
        match engine.status(module, false).await {
            Ok(status) => {
                let applied = status.applied_ids();
                if applied.is_empty() {
                    eprintln!("No migrations of {} are applied.", module);
                } else {
                    eprintln!("Applied migrations of {}:", module);
                    for id in applied {
                        eprintln!("  {}", id);
                    }
                }
            }
            Err(e) => eprintln!("Failed to re-read the ledger of {}: {}", module, e),
        }
    }
    anyhow::Error::new(error)
}
