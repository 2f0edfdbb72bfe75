// Services Layer
// マイグレーションエンジンと進捗表示

pub mod migration_engine;
pub mod reporter;
