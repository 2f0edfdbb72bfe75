// resetコマンドハンドラー
//
// モジュールの適用済みマイグレーションを全て取り消します。

use crate::cli::command_context::CommandContext;
use crate::cli::commands::{
    fail_with_applied_state, parse_module, render_output, GlobalOptions, RunOutput,
};
use crate::services::migration_engine::EngineOptions;
use anyhow::Result;
use tracing::debug;

/// resetコマンドの入力パラメータ
#[derive(Debug, Clone)]
pub struct ResetCommand {
    pub global: GlobalOptions,
    /// モジュール名
    pub module: String,
    /// ドライラン
    pub dry_run: bool,
}

/// resetコマンドハンドラー
#[derive(Debug, Clone, Default)]
pub struct ResetCommandHandler {}

impl ResetCommandHandler {
    /// 新しいResetCommandHandlerを作成
    pub fn new() -> Self {
        Self {}
    }

    /// resetコマンドを実行
    pub async fn execute(&self, command: &ResetCommand) -> Result<String> {
        let module = parse_module(&command.module)?;
        let context = CommandContext::load(
            command.global.project_path.clone(),
            command.global.config_path.clone(),
        )?;
        debug!(module = %module, dry_run = command.dry_run, "Executing reset command");

        let options = EngineOptions {
            dry_run: command.dry_run,
            mute: command.global.quiet,
        };
        let engine = context.engine(&command.global.env, options).await?;

        match engine.reset(&module).await {
            Ok(report) => render_output(&RunOutput::from_report(report), &command.global.format),
            Err(e) => Err(fail_with_applied_state(&engine, &module, e).await),
        }
    }
}
