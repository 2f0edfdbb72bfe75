// modmigライブラリのエントリーポイント
//
// モジュール構造:
// - cli: CLIレイヤー（ユーザー入力の受付とコマンドルーティング）
// - core: コアドメイン（マイグレーション、台帳、シーダー、設定、エラー）
// - adapters: データベースとファイルシステムへのアクセス
// - services: マイグレーションエンジンと進捗表示

pub mod adapters;
pub mod cli;
pub mod core;
pub mod services;
