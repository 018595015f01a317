use crate::core::listing::{self, ListingEntry};
use crate::error::{MirrorError, Result};
use crate::remote::RemoteSource;
use reqwest::Url;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// 一次扫描得到的远程视图
#[derive(Debug, Clone, Default)]
pub struct RemoteListing {
    /// 文件链接（绝对地址，去重排序）
    pub urls: Vec<Url>,
    /// 文件名 -> 列表元数据
    pub entries: BTreeMap<String, ListingEntry>,
}

impl RemoteListing {
    pub fn entry_for(&self, filename: &str) -> Option<&ListingEntry> {
        self.entries.get(filename)
    }
}

/// 远程目录扫描器
pub struct RemoteScanner {
    remote: Arc<dyn RemoteSource>,
}

impl RemoteScanner {
    pub fn new(remote: Arc<dyn RemoteSource>) -> Self {
        Self { remote }
    }

    /// 获取索引页一次，同时解析链接和列表；任何错误都终止本次运行
    pub async fn scan(&self, index_url: &str) -> Result<RemoteListing> {
        info!("开始扫描远程索引: {}", index_url);

        let base = Url::parse(index_url)
            .map_err(|e| MirrorError::Config(format!("无效的索引地址 {}: {}", index_url, e)))?;
        let html = self.remote.fetch_text(index_url).await?;

        let urls = listing::extract_links(&html, &base)?;
        let entries = listing::parse_listing(&html)?;

        debug!("索引页: {} 个链接, {} 条列表记录", urls.len(), entries.len());
        info!("扫描完成: {} 个远程文件", urls.len());

        Ok(RemoteListing { urls, entries })
    }
}
