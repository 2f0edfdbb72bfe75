// seedコマンドハンドラー
//
// モジュールのシーダーを実行します。シーダーは台帳に記録されません。

use crate::cli::command_context::CommandContext;
use crate::cli::commands::{parse_module, render_output, CommandOutput, GlobalOptions};
use crate::core::migration::{SeedReport, SeederOutcome};
use crate::services::migration_engine::EngineOptions;
use anyhow::Result;
use serde::Serialize;
use tracing::debug;

/// seedコマンドの出力構造体
#[derive(Debug, Clone, Serialize)]
pub struct SeedOutput {
    pub module: String,
    pub seeders: Vec<SeederOutcome>,
}

impl From<SeedReport> for SeedOutput {
    fn from(report: SeedReport) -> Self {
        Self {
            module: report.module.to_string(),
            seeders: report.seeders,
        }
    }
}

impl CommandOutput for SeedOutput {
    fn to_text(&self) -> String {
        if self.seeders.is_empty() {
            return format!("No seeders found for {}.", self.module);
        }
        let mut output = format!("Ran {} seeder(s) of {}:\n", self.seeders.len(), self.module);
        for seeder in &self.seeders {
            output.push_str(&format!(
                "  {} ({} statements)\n",
                seeder.name, seeder.statements
            ));
        }
        output.trim_end().to_string()
    }
}

/// seedコマンドの入力パラメータ
#[derive(Debug, Clone)]
pub struct SeedCommand {
    pub global: GlobalOptions,
    /// モジュール名
    pub module: String,
    /// 実行するシーダー名（省略時は全て）
    pub seeder: Option<String>,
}

/// seedコマンドハンドラー
#[derive(Debug, Clone, Default)]
pub struct SeedCommandHandler {}

impl SeedCommandHandler {
    /// 新しいSeedCommandHandlerを作成
    pub fn new() -> Self {
        Self {}
    }

    /// seedコマンドを実行
    pub async fn execute(&self, command: &SeedCommand) -> Result<String> {
        let module = parse_module(&command.module)?;
        let context = CommandContext::load(
            command.global.project_path.clone(),
            command.global.config_path.clone(),
        )?;
        debug!(module = %module, seeder = ?command.seeder, "Executing seed command");

        let options = EngineOptions {
            dry_run: false,
            mute: command.global.quiet,
        };
        let engine = context.engine(&command.global.env, options).await?;
        let report = engine.seed(&module, command.seeder.as_deref()).await?;

        render_output(&SeedOutput::from(report), &command.global.format)
    }
}
