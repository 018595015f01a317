//! 错误类型
//!
//! 发现阶段（远程索引、存储清单）的错误会中止整次运行；
//! 执行阶段的单项失败只记入报告，由 `PartialItemFailure` 汇总。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MirrorError {
    /// 网络、DNS、超时或非 2xx 状态码
    #[error("请求失败 {url}: {reason}")]
    Transport { url: String, reason: String },

    /// 远程列表无法解析为定长记录
    #[error("远程列表格式错误: {0}")]
    RemoteFormat(String),

    /// 对象存储权限或可用性错误
    #[error("对象存储访问失败 ({op} {key}): {reason}")]
    StoreAccess {
        op: &'static str,
        key: String,
        reason: String,
    },

    #[error("{failed}/{total} 个同步项失败")]
    PartialItemFailure { failed: usize, total: usize },

    #[error("配置错误: {0}")]
    Config(String),
}

impl MirrorError {
    pub fn transport(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Transport {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn store(op: &'static str, key: impl Into<String>, reason: impl ToString) -> Self {
        Self::StoreAccess {
            op,
            key: key.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T, E = MirrorError> = std::result::Result<T, E>;
