use crate::core::fingerprint::{listing_name, store_key, Fingerprint};
use crate::core::scanner::RemoteListing;
use reqwest::Url;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// 待同步项：远程 URL + 目标 key + 指纹
#[derive(Debug, Clone, Serialize)]
pub struct SyncItem {
    #[serde(serialize_with = "serialize_url")]
    pub url: Url,
    pub key: String,
    /// 列表中没有该文件的元数据时为 None
    pub fingerprint: Option<Fingerprint>,
}

fn serialize_url<S: serde::Serializer>(url: &Url, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(url.as_str())
}

/// 对比结果
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPlan {
    /// 所有远程文件，按 key、URL 排序
    pub to_sync: Vec<SyncItem>,
    /// 不再对应任何远程文件的 key，按 key 排序
    pub to_delete: Vec<String>,
}

impl SyncPlan {
    /// 按 key 分组，同一个 key 的多个 URL 必须串行处理
    pub fn sync_groups(&self) -> BTreeMap<&str, Vec<&SyncItem>> {
        let mut groups: BTreeMap<&str, Vec<&SyncItem>> = BTreeMap::new();
        for item in &self.to_sync {
            groups.entry(item.key.as_str()).or_default().push(item);
        }
        groups
    }

    pub fn is_empty(&self) -> bool {
        self.to_sync.is_empty() && self.to_delete.is_empty()
    }
}

/// 计算远程列表与存储清单的差异
pub struct Reconciler {
    prefix: String,
}

impl Reconciler {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn plan(&self, listing: &RemoteListing, inventory: &BTreeSet<String>) -> SyncPlan {
        let mut to_sync: Vec<SyncItem> = listing
            .urls
            .iter()
            .map(|url| {
                let fingerprint = listing
                    .entry_for(&listing_name(url))
                    .map(|e| Fingerprint::of(&e.filename, &e.timestamp, &e.size));
                if fingerprint.is_none() {
                    debug!("列表中没有文件元数据: {}", url);
                }
                SyncItem {
                    url: url.clone(),
                    key: store_key(&self.prefix, url),
                    fingerprint,
                }
            })
            .collect();

        to_sync.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.url.cmp(&b.url)));

        let live_keys: BTreeSet<&str> = to_sync.iter().map(|i| i.key.as_str()).collect();
        if live_keys.len() < to_sync.len() {
            for pair in to_sync.windows(2).filter(|w| w[0].key == w[1].key) {
                warn!(
                    "不同 URL 映射到同一个 key {}: {} / {}",
                    pair[0].key, pair[0].url, pair[1].url
                );
            }
        }

        // inventory 是 BTreeSet，结果天然有序
        let to_delete: Vec<String> = inventory
            .iter()
            .filter(|key| !live_keys.contains(key.as_str()))
            .cloned()
            .collect();

        debug!(
            "对比完成: {} 个待同步, {} 个待删除",
            to_sync.len(),
            to_delete.len()
        );

        SyncPlan { to_sync, to_delete }
    }
}
