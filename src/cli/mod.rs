// CLI Layer
// ユーザー入力の受付とコマンドルーティング

pub mod command_context;
pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// 出力フォーマット
#[derive(Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output (default)
    #[default]
    Text,
    /// Structured JSON output
    Json,
}

/// modmig - Per-module database migration runner
#[derive(Parser, Debug)]
#[command(name = "modmig")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Per-module database migration runner")]
#[command(long_about = "modmig - Per-module database migration runner

Each module (vendor/package) owns an ordered set of migrations and its own
ledger of applied migrations. modmig applies, rolls back and resets them
independently per module, and runs the module's seeders.

Supported databases: PostgreSQL, MySQL, SQLite")]
#[command(propagate_version = true)]
#[command(after_help = "GETTING STARTED:
  1. Create .modmig.yaml with your database settings
  2. Add migrations:          migrations/acme/shop/20230101_init/up.sql
  3. Apply them:              modmig migrate acme/shop
  4. Check what is applied:   modmig status acme/shop

For detailed help on each command, use: modmig <command> --help")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Target environment
    #[arg(short, long, global = true, default_value = "development")]
    pub env: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress per-migration progress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Output format (text or json)
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply pending migrations of a module
    ///
    /// EXAMPLES:
    ///   # Apply everything pending
    ///   modmig migrate acme/shop
    ///
    ///   # Apply up to and including a version
    ///   modmig migrate acme/shop --target 20230215_add_col
    ///
    ///   # Show the SQL without executing it
    ///   modmig migrate acme/shop --dry-run
    Migrate {
        /// Module name (vendor/package)
        module: String,

        /// Last migration to apply
        #[arg(short, long, value_name = "ID")]
        target: Option<String>,

        /// Dry run - show SQL without executing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Roll back applied migrations of a module
    ///
    /// Without options only the most recently applied migration is rolled back.
    ///
    /// EXAMPLES:
    ///   # Roll back the last migration
    ///   modmig rollback acme/shop
    ///
    ///   # Roll back everything after a version
    ///   modmig rollback acme/shop --target 20230101_init
    ///
    ///   # Roll back everything applied after a date
    ///   modmig rollback acme/shop --date 2023-03-01
    Rollback {
        /// Module name (vendor/package)
        module: String,

        /// Keep this migration and everything before it
        #[arg(short, long, value_name = "ID")]
        target: Option<String>,

        /// Roll back migrations applied after this date (UTC)
        #[arg(short, long, value_name = "DATE")]
        date: Option<String>,

        /// Dry run - show SQL without executing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Roll back all applied migrations of a module
    Reset {
        /// Module name (vendor/package)
        module: String,

        /// Dry run - show SQL without executing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Run the seeders of a module
    ///
    /// EXAMPLES:
    ///   # Run all seeders in name order
    ///   modmig seed acme/shop
    ///
    ///   # Run a single seeder
    ///   modmig seed acme/shop --seeder products
    Seed {
        /// Module name (vendor/package)
        module: String,

        /// Seeder to run (default: all)
        #[arg(short, long, value_name = "NAME")]
        seeder: Option<String>,
    },

    /// Show applied and pending migrations of a module
    Status {
        /// Module name (vendor/package)
        module: String,

        /// Only list pending migrations
        #[arg(long)]
        pending: bool,
    },

    /// List modules found in the migrations and seeders directories
    Modules,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_rollback_with_global_flags() {
        let cli = Cli::try_parse_from([
            "modmig",
            "rollback",
            "acme/shop",
            "--target",
            "20230101_init",
            "--env",
            "production",
            "--format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.env, "production");
        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Commands::Rollback {
                module,
                target,
                date,
                dry_run,
            } => {
                assert_eq!(module, "acme/shop");
                assert_eq!(target.as_deref(), Some("20230101_init"));
                assert!(date.is_none());
                assert!(!dry_run);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_env_defaults_to_development() {
        let cli = Cli::try_parse_from(["modmig", "status", "acme/shop"]).unwrap();
        assert_eq!(cli.env, "development");
        assert!(!cli.quiet);
    }
}
