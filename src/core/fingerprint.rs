//! 指纹与存储 key 推导

use reqwest::Url;
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;

/// 由列表元数据（文件名、时间、大小）计算的指纹，用于不读取内容就判断文件是否变化
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// 指纹长度（十六进制字符数）
    pub const LEN: usize = 32;

    pub fn of(filename: &str, timestamp: &str, size: &str) -> Self {
        let hash = blake3::hash(format!("{}|{}|{}", filename, timestamp, size).as_bytes());
        // 只取前 16 字节（32 个十六进制字符），足够检测变化
        Self(hash.to_hex()[..Self::LEN].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 与对象元数据中保存的指纹比较
    pub fn matches(&self, stored: Option<&str>) -> bool {
        stored == Some(self.0.as_str())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// URL 路径的最后一段
pub fn basename(url: &Url) -> &str {
    url.path().rsplit('/').next().unwrap_or_default()
}

/// 列表中显示的文件名：basename 解码百分号转义后的文本
///
/// 解码结果不是合法 UTF-8 时保留原样。
pub fn listing_name(url: &Url) -> Cow<'_, str> {
    let raw = basename(url);
    urlencoding::decode(raw).unwrap_or(Cow::Borrowed(raw))
}

/// 存储 key = 前缀 + URL 路径 basename
///
/// 不同目录下的同名文件会得到相同的 key。
pub fn store_key(prefix: &str, url: &Url) -> String {
    format!("{}{}", prefix, basename(url))
}
