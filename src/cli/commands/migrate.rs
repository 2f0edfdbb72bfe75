// migrateコマンドハンドラー
//
// モジュールの未適用マイグレーションを適用します。
// 失敗した場合は台帳を読み直し、実際に適用済みのマイグレーションを表示します。

use crate::cli::command_context::CommandContext;
use crate::cli::commands::{
    fail_with_applied_state, parse_module, render_output, GlobalOptions, RunOutput,
};
use crate::services::migration_engine::EngineOptions;
use anyhow::Result;
use tracing::debug;

/// migrateコマンドの入力パラメータ
#[derive(Debug, Clone)]
pub struct MigrateCommand {
    pub global: GlobalOptions,
    /// モジュール名
    pub module: String,
    /// 適用する最後のマイグレーションID
    pub target: Option<String>,
    /// ドライラン
    pub dry_run: bool,
}

/// migrateコマンドハンドラー
#[derive(Debug, Clone, Default)]
pub struct MigrateCommandHandler {}

impl MigrateCommandHandler {
    /// 新しいMigrateCommandHandlerを作成
    pub fn new() -> Self {
        Self {}
    }

    /// migrateコマンドを実行
    pub async fn execute(&self, command: &MigrateCommand) -> Result<String> {
        let module = parse_module(&command.module)?;
        let context = CommandContext::load(
            command.global.project_path.clone(),
            command.global.config_path.clone(),
        )?;
        debug!(module = %module, target = ?command.target, dry_run = command.dry_run, "Executing migrate command");

        let options = EngineOptions {
            dry_run: command.dry_run,
            mute: command.global.quiet,
        };
        let engine = context.engine(&command.global.env, options).await?;

        match engine.migrate(&module, command.target.as_deref()).await {
            Ok(report) => render_output(&RunOutput::from_report(report), &command.global.format),
            Err(e) => Err(fail_with_applied_state(&engine, &module, e).await),
        }
    }
}
