// rollbackコマンドハンドラー
//
// 適用済みマイグレーションを新しいものから取り消します。
// - 引数なし: 最後に適用したマイグレーションのみ
// - --target: 指定したマイグレーションより後のもの
// - --date: 指定日時より後に適用されたもの
// ロールバック対象がない場合は通知を表示して正常終了します。

use crate::cli::command_context::CommandContext;
use crate::cli::commands::{
    fail_with_applied_state, parse_date, parse_module, render_output, GlobalOptions, RunOutput,
};
use crate::core::error::MigrationError;
use crate::core::migration::Operation;
use crate::services::migration_engine::EngineOptions;
use anyhow::Result;
use tracing::{debug, info};

/// rollbackコマンドの入力パラメータ
#[derive(Debug, Clone)]
pub struct RollbackCommand {
    pub global: GlobalOptions,
    /// モジュール名
    pub module: String,
    /// 残す最後のマイグレーションID
    pub target: Option<String>,
    /// この日時より後に適用されたものを取り消す
    pub date: Option<String>,
    /// ドライラン
    pub dry_run: bool,
}

/// rollbackコマンドハンドラー
#[derive(Debug, Clone, Default)]
pub struct RollbackCommandHandler {}

impl RollbackCommandHandler {
    /// 新しいRollbackCommandHandlerを作成
    pub fn new() -> Self {
        Self {}
    }

    /// rollbackコマンドを実行
    pub async fn execute(&self, command: &RollbackCommand) -> Result<String> {
        let module = parse_module(&command.module)?;
        if command.target.is_some() && command.date.is_some() {
            return Err(MigrationError::ConflictingArguments.into());
        }
        let date = command.date.as_deref().map(parse_date).transpose()?;

        let context = CommandContext::load(
            command.global.project_path.clone(),
            command.global.config_path.clone(),
        )?;
        debug!(module = %module, target = ?command.target, date = ?date, "Executing rollback command");

        let options = EngineOptions {
            dry_run: command.dry_run,
            mute: command.global.quiet,
        };
        let engine = context.engine(&command.global.env, options).await?;

        match engine
            .rollback(&module, command.target.as_deref(), date)
            .await
        {
            Ok(report) => render_output(&RunOutput::from_report(report), &command.global.format),
            Err(e) if e.is_nothing_to_rollback() => {
                info!(module = %module, "Nothing to rollback");
                let output =
                    RunOutput::notice(&module, Operation::Down, command.dry_run, e.to_string());
                render_output(&output, &command.global.format)
            }
            Err(e) => Err(fail_with_applied_state(&engine, &module, e).await),
        }
    }
}
