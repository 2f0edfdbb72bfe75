// Adapters
// データベースとファイルシステムへのアクセスを抽象化

pub mod connection_string;
pub mod database;
pub mod filesystem_loader;
pub mod memory_store;
pub mod sql_ledger_store;
pub mod sql_migration;
pub mod static_source;
