// モジュール名
//
// `vendor/package` 形式のモジュール名を検証済みの型として表現します。

use crate::core::error::MigrationError;
use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// モジュール名の各セグメントに許可されるパターン
static SEGMENT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([a-z0-9._-]*[a-z0-9])?$").expect("segment pattern is valid")
});

/// 検証済みのモジュール名
///
/// マイグレーションとシーダーはすべてモジュール単位で管理されます。
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleName {
    vendor: String,
    package: String,
}

impl ModuleName {
    /// `vendor/package` 形式の文字列を解析
    pub fn parse(name: &str) -> Result<Self, MigrationError> {
        let invalid = || MigrationError::InvalidModuleName {
            name: name.to_string(),
        };

        let (vendor, package) = name.split_once('/').ok_or_else(invalid)?;
        if !SEGMENT_PATTERN.is_match(vendor) || !SEGMENT_PATTERN.is_match(package) {
            return Err(invalid());
        }

        Ok(Self {
            vendor: vendor.to_string(),
            package: package.to_string(),
        })
    }

    /// ベンダー名
    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    /// パッケージ名
    pub fn package(&self) -> &str {
        &self.package
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.vendor, self.package)
    }
}

impl FromStr for ModuleName {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ModuleName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}
