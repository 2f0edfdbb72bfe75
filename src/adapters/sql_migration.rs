// SQLファイルベースのマイグレーションとシーダー
//
// up.sql / down.sql の内容をステートメント単位に分割して返すマイグレーションと、
// 1つのSQLファイルを実行するシーダーを提供します。

use sha2::{Digest, Sha256};

use crate::core::error::BoxError;
use crate::core::migration::{Migration, Statement};
use crate::core::seeder::Seeder;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Scan {
    Code,
    Single,
    Double,
    Dollar(String),
    Line,
    Block,
}

/// SQL文字列をセミコロンで分割
///
/// 引用符（`'`, `"`, `$tag$`）内のセミコロンは区切りとして扱いません。
/// コメントは出力から取り除き、空のステートメントは返しません。
pub fn split_sql_statements(sql: &str) -> Vec<Statement> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut scan = Scan::Code;
    let mut chars = sql.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        let next = chars.peek().map(|&(_, n)| n);
        match scan {
            Scan::Code => match (c, next) {
                (';', _) => flush(&mut current, &mut statements),
                ('-', Some('-')) => {
                    chars.next();
                    scan = Scan::Line;
                }
                ('/', Some('*')) => {
                    chars.next();
                    scan = Scan::Block;
                }
                ('\'', _) => {
                    current.push(c);
                    scan = Scan::Single;
                }
                ('"', _) => {
                    current.push(c);
                    scan = Scan::Double;
                }
                ('$', _) => match dollar_tag(&sql[pos..]) {
                    Some(tag) => {
                        current.push_str(&tag);
                        for _ in 1..tag.chars().count() {
                            chars.next();
                        }
                        scan = Scan::Dollar(tag);
                    }
                    None => current.push(c),
                },
                _ => current.push(c),
            },
            Scan::Single | Scan::Double => {
                current.push(c);
                let quote = if scan == Scan::Single { '\'' } else { '"' };
                if c == quote {
                    // 連続した引用符はエスケープ
                    if next == Some(quote) {
                        current.push(quote);
                        chars.next();
                    } else {
                        scan = Scan::Code;
                    }
                }
            }
            Scan::Dollar(ref tag) => {
                if c == '$' && sql[pos..].starts_with(tag.as_str()) {
                    current.push_str(tag);
                    for _ in 1..tag.chars().count() {
                        chars.next();
                    }
                    scan = Scan::Code;
                } else {
                    current.push(c);
                }
            }
            Scan::Line => {
                if c == '\n' {
                    current.push(c);
                    scan = Scan::Code;
                }
            }
            Scan::Block => {
                if c == '*' && next == Some('/') {
                    chars.next();
                    current.push(' ');
                    scan = Scan::Code;
                }
            }
        }
    }

    flush(&mut current, &mut statements);
    statements
}

fn flush(current: &mut String, statements: &mut Vec<Statement>) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        statements.push(Statement::new(trimmed));
    }
    current.clear();
}

/// `$$` または `$tag$` の開始タグを取り出す
fn dollar_tag(rest: &str) -> Option<String> {
    let body = rest.strip_prefix('$')?;
    let end = body.find('$')?;
    let tag = &body[..end];
    if tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !tag.starts_with(|c: char| c.is_ascii_digit())
    {
        Some(format!("${}$", tag))
    } else {
        None
    }
}

/// SQLファイルから読み込んだマイグレーション
#[derive(Debug, Clone)]
pub struct SqlMigration {
    id: String,
    description: String,
    up_sql: String,
    down_sql: Option<String>,
    checksum: String,
}

impl SqlMigration {
    /// 新しいSqlMigrationを作成
    ///
    /// `down_sql` が None の場合、取り消しはエラーになります。
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        up_sql: impl Into<String>,
        down_sql: Option<String>,
    ) -> Self {
        let up_sql = up_sql.into();
        let checksum = calculate_checksum(&up_sql, down_sql.as_deref().unwrap_or(""));
        Self {
            id: id.into(),
            description: description.into(),
            up_sql,
            down_sql,
            checksum,
        }
    }

    pub fn up_sql(&self) -> &str {
        &self.up_sql
    }

    pub fn down_sql(&self) -> Option<&str> {
        self.down_sql.as_deref()
    }
}

/// up / down の内容からSHA-256チェックサムを計算
pub fn calculate_checksum(up_sql: &str, down_sql: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(up_sql.as_bytes());
    hasher.update(b"\n--\n");
    hasher.update(down_sql.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl Migration for SqlMigration {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn checksum(&self) -> Option<String> {
        Some(self.checksum.clone())
    }

    fn up(&self) -> Result<Vec<Statement>, BoxError> {
        Ok(split_sql_statements(&self.up_sql))
    }

    fn down(&self) -> Result<Vec<Statement>, BoxError> {
        match &self.down_sql {
            Some(sql) => Ok(split_sql_statements(sql)),
            None => Err(format!("Migration {} has no down.sql", self.id).into()),
        }
    }
}

/// SQLファイルから読み込んだシーダー
#[derive(Debug, Clone)]
pub struct SqlSeeder {
    name: String,
    sql: String,
}

impl SqlSeeder {
    pub fn new(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
        }
    }
}

impl Seeder for SqlSeeder {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self) -> Result<Vec<Statement>, BoxError> {
        Ok(split_sql_statements(&self.sql))
    }
}
