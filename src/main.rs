use anyhow::{Context, Result};
use clap::Parser;
use colored::control as color_control;
use modmig::cli::commands::migrate::{MigrateCommand, MigrateCommandHandler};
use modmig::cli::commands::modules::{ModulesCommand, ModulesCommandHandler};
use modmig::cli::commands::reset::{ResetCommand, ResetCommandHandler};
use modmig::cli::commands::rollback::{RollbackCommand, RollbackCommandHandler};
use modmig::cli::commands::seed::{SeedCommand, SeedCommandHandler};
use modmig::cli::commands::status::{StatusCommand, StatusCommandHandler};
use modmig::cli::commands::GlobalOptions;
use modmig::cli::{Cli, Commands};
use modmig::core::naming;
use std::env;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    sqlx::any::install_default_drivers();

    // CLIをパースして実行
    let cli = Cli::parse();
    init_tracing(cli.verbose || env::var_os(naming::VERBOSE_ENV).is_some());

    // 非同期ランタイムを作成して実行
    let runtime = tokio::runtime::Runtime::new()
        .context("Failed to create Tokio runtime")
        .unwrap_or_else(|e| {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        });

    let result = runtime.block_on(run_command(cli));

    match result {
        Ok(output) => {
            if !output.is_empty() {
                println!("{}", output);
            }
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

/// ログ出力を初期化する
///
/// 既定は warn、`--verbose` で debug。`RUST_LOG` が設定されていればそちらを優先します。
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// コマンドを実行する
async fn run_command(cli: Cli) -> Result<String> {
    // --no-color フラグの処理
    if cli.no_color {
        color_control::set_override(false);
    }

    let global = GlobalOptions {
        project_path: env::current_dir()?,
        config_path: cli.config,
        env: cli.env,
        format: cli.format,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Migrate {
            module,
            target,
            dry_run,
        } => {
            let command = MigrateCommand {
                global,
                module,
                target,
                dry_run,
            };
            MigrateCommandHandler::new().execute(&command).await
        }

        Commands::Rollback {
            module,
            target,
            date,
            dry_run,
        } => {
            let command = RollbackCommand {
                global,
                module,
                target,
                date,
                dry_run,
            };
            RollbackCommandHandler::new().execute(&command).await
        }

        Commands::Reset { module, dry_run } => {
            let command = ResetCommand {
                global,
                module,
                dry_run,
            };
            ResetCommandHandler::new().execute(&command).await
        }

        Commands::Seed { module, seeder } => {
            let command = SeedCommand {
                global,
                module,
                seeder,
            };
            SeedCommandHandler::new().execute(&command).await
        }

        Commands::Status { module, pending } => {
            let command = StatusCommand {
                global,
                module,
                pending,
            };
            StatusCommandHandler::new().execute(&command).await
        }

        Commands::Modules => {
            let command = ModulesCommand { global };
            ModulesCommandHandler::new().execute(&command)
        }
    }
}
