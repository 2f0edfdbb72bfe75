// statusコマンドハンドラー
//
// モジュールのマイグレーション状態を表示します。
// - 適用済み/未適用の状態表示（テーブル形式）
// - 台帳にのみ存在する孤立エントリの検出
// - チェックサム不一致の検出と警告

use crate::cli::command_context::CommandContext;
use crate::cli::commands::{parse_module, render_output, CommandOutput, GlobalOptions};
use crate::core::migration::{StatusReport, StatusSummary, UnitState, UnitStatus};
use crate::services::migration_engine::EngineOptions;
use anyhow::Result;
use serde::Serialize;
use tracing::debug;

/// statusコマンドの出力構造体
#[derive(Debug, Clone, Serialize)]
pub struct StatusOutput {
    pub module: String,
    /// マイグレーション一覧
    pub migrations: Vec<UnitStatus>,
    /// サマリー情報
    pub summary: StatusSummary,
    /// 警告メッセージ
    pub warnings: Vec<String>,
}

impl From<StatusReport> for StatusOutput {
    fn from(report: StatusReport) -> Self {
        let mut warnings = Vec::new();
        if report.units.iter().any(|u| u.checksum_mismatch) {
            warnings.push("Some migrations have mismatched checksums. Migration files may have been modified after being applied.".to_string());
        }
        if report.has_orphans() {
            warnings.push("Orphaned migrations detected. These migrations are recorded in the ledger but missing from the migration set.".to_string());
        }
        Self {
            module: report.module.to_string(),
            migrations: report.units,
            summary: report.summary,
            warnings,
        }
    }
}

impl CommandOutput for StatusOutput {
    fn to_text(&self) -> String {
        let mut output = format!("=== Migration Status: {} ===\n\n", self.module);

        output.push_str(&format!(
            "{:<24} {:<30} {:<32} {}\n",
            "Version", "Description", "Status", "Applied At"
        ));
        output.push_str(&format!("{}\n", "-".repeat(110)));

        for unit in &self.migrations {
            let status = match unit.state {
                UnitState::Applied if unit.checksum_mismatch => "Applied (checksum mismatch)",
                UnitState::Applied => "Applied",
                UnitState::Pending => "Pending",
                UnitState::Orphaned => "Orphaned",
            };
            let applied_at = unit
                .applied_at
                .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default();
            output.push_str(&format!(
                "{:<24} {:<30} {:<32} {}\n",
                unit.id, unit.description, status, applied_at
            ));
        }

        output.push_str(&format!("\n{}\n", "-".repeat(110)));
        let summary = &self.summary;
        if summary.orphaned > 0 {
            output.push_str(&format!(
                "Total: {} (Applied: {}, Pending: {}, Orphaned: {})\n",
                summary.total, summary.applied, summary.pending, summary.orphaned
            ));
        } else {
            output.push_str(&format!(
                "Total: {} (Applied: {}, Pending: {})\n",
                summary.total, summary.applied, summary.pending
            ));
        }

        for warning in &self.warnings {
            output.push_str(&format!("\nWarning: {}", warning));
        }
        output.trim_end().to_string()
    }
}

/// statusコマンドの入力パラメータ
#[derive(Debug, Clone)]
pub struct StatusCommand {
    pub global: GlobalOptions,
    /// モジュール名
    pub module: String,
    /// 未適用のみ表示
    pub pending: bool,
}

/// statusコマンドハンドラー
#[derive(Debug, Clone, Default)]
pub struct StatusCommandHandler {}

impl StatusCommandHandler {
    /// 新しいStatusCommandHandlerを作成
    pub fn new() -> Self {
        Self {}
    }

    /// statusコマンドを実行
    pub async fn execute(&self, command: &StatusCommand) -> Result<String> {
        let module = parse_module(&command.module)?;
        let context = CommandContext::load(
            command.global.project_path.clone(),
            command.global.config_path.clone(),
        )?;
        debug!(module = %module, pending = command.pending, "Executing status command");

        let engine = context
            .engine(&command.global.env, EngineOptions::default())
            .await?;
        let report = engine.status(&module, command.pending).await?;

        render_output(&StatusOutput::from(report), &command.global.format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::module::ModuleName;
    use chrono::{TimeZone, Utc};

    fn report() -> StatusReport {
        let applied_at = Utc.with_ymd_and_hms(2023, 1, 1, 9, 0, 0).unwrap();
        StatusReport {
            module: ModuleName::parse("acme/shop").unwrap(),
            units: vec![
                UnitStatus {
                    id: "20230101_init".to_string(),
                    description: "init".to_string(),
                    state: UnitState::Applied,
                    applied_at: Some(applied_at),
                    checksum_mismatch: true,
                },
                UnitStatus {
                    id: "20230215_add_col".to_string(),
                    description: "add col".to_string(),
                    state: UnitState::Pending,
                    applied_at: None,
                    checksum_mismatch: false,
                },
                UnitStatus {
                    id: "20230220_legacy".to_string(),
                    description: String::new(),
                    state: UnitState::Orphaned,
                    applied_at: Some(applied_at),
                    checksum_mismatch: false,
                },
            ],
            summary: StatusSummary {
                total: 3,
                applied: 1,
                pending: 1,
                orphaned: 1,
            },
        }
    }

    #[test]
    fn test_status_text_table() {
        let text = StatusOutput::from(report()).to_text();

        assert!(text.contains("=== Migration Status: acme/shop ==="));
        assert!(text.contains("Applied (checksum mismatch)"));
        assert!(text.contains("2023-01-01 09:00:00"));
        assert!(text.contains("Total: 3 (Applied: 1, Pending: 1, Orphaned: 1)"));
        assert!(text.contains("Warning: Orphaned migrations detected"));
    }

    #[test]
    fn test_status_json() {
        let output = StatusOutput::from(report());
        let json = render_output(&output, &crate::cli::OutputFormat::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["module"], "acme/shop");
        assert_eq!(parsed["migrations"][0]["state"], "applied");
        assert_eq!(parsed["migrations"][1]["applied_at"], serde_json::Value::Null);
        assert_eq!(parsed["migrations"][2]["state"], "orphaned");
        assert_eq!(parsed["summary"]["orphaned"], 1);
        assert_eq!(parsed["warnings"].as_array().unwrap().len(), 2);
    }
}
