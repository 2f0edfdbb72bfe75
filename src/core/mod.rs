// Core Domain
// マイグレーション、台帳、シーダーの純粋なドメインロジック

pub mod config;
pub mod error;
pub mod ledger;
pub mod migration;
pub mod migration_set;
pub mod module;
pub mod naming;
pub mod seeder;
