// modulesコマンドハンドラー
//
// マイグレーション・シーダーディレクトリに存在するモジュールを一覧表示します。
// データベースには接続しません。

use crate::cli::command_context::CommandContext;
use crate::cli::commands::{render_output, CommandOutput, GlobalOptions};
use crate::core::migration_set::MigrationSource;
use anyhow::Result;
use serde::Serialize;

/// modulesコマンドの出力構造体
#[derive(Debug, Clone, Serialize)]
pub struct ModulesOutput {
    pub modules: Vec<String>,
}

impl CommandOutput for ModulesOutput {
    fn to_text(&self) -> String {
        if self.modules.is_empty() {
            return "No modules found.".to_string();
        }
        self.modules.join("\n")
    }
}

/// modulesコマンドの入力パラメータ
#[derive(Debug, Clone)]
pub struct ModulesCommand {
    pub global: GlobalOptions,
}

/// modulesコマンドハンドラー
#[derive(Debug, Clone, Default)]
pub struct ModulesCommandHandler {}

impl ModulesCommandHandler {
    pub fn new() -> Self {
        Self {}
    }

    /// modulesコマンドを実行
    pub fn execute(&self, command: &ModulesCommand) -> Result<String> {
        let context = CommandContext::load(
            command.global.project_path.clone(),
            command.global.config_path.clone(),
        )?;
        let modules = context
            .source()
            .modules()?
            .iter()
            .map(|m| m.to_string())
            .collect();

        render_output(&ModulesOutput { modules }, &command.global.format)
    }
}
