// シーダー
//
// 台帳で管理されない、名前で呼び出すデータ投入処理を定義します。

use crate::core::error::BoxError;
use crate::core::migration::Statement;

/// データ投入処理
///
/// シーダーは適用状態を持たず、失敗しても補償処理は行われません。
pub trait Seeder: Send + Sync {
    /// モジュール内で一意な名前
    fn name(&self) -> &str;

    /// 投入用のSQL文を生成
    fn run(&self) -> Result<Vec<Statement>, BoxError>;
}
