//! 同步执行器
//!
//! 每个同步项: PENDING -> METADATA_CHECK -> {SKIP | UPLOAD} -> DONE，失败即终止，不重试。
//! “读取旧指纹、比较、写入新对象”不是原子操作，假设只有本进程写入该前缀。

use crate::core::reconciler::{SyncItem, SyncPlan};
use crate::error::{MirrorError, Result};
use crate::remote::RemoteSource;
use crate::storage::{ObjectStore, WriteOptions};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// 单项结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ItemStatus {
    Skipped,
    Uploaded { bytes: u64 },
    Deleted,
    Failed { reason: String },
}

impl ItemStatus {
    fn failed(err: impl ToString) -> Self {
        Self::Failed {
            reason: err.to_string(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped => f.write_str("skipped"),
            Self::Uploaded { .. } => f.write_str("uploaded"),
            Self::Deleted => f.write_str("deleted"),
            Self::Failed { reason } => write!(f, "failed:{}", reason),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemOutcome {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(flatten)]
    pub status: ItemStatus,
}

/// 一个并发单元：同一个 key 的所有同步项，或一个删除项
enum Task {
    Sync(Vec<SyncItem>),
    Delete(String),
}

impl Task {
    /// 任务异常退出时，为其中每一项生成失败结果
    fn failed_outcomes(&self, reason: &str) -> Vec<ItemOutcome> {
        match self {
            Task::Sync(items) => items
                .iter()
                .map(|item| ItemOutcome {
                    key: item.key.clone(),
                    url: Some(item.url.to_string()),
                    status: ItemStatus::failed(reason),
                })
                .collect(),
            Task::Delete(key) => vec![ItemOutcome {
                key: key.clone(),
                url: None,
                status: ItemStatus::failed(reason),
            }],
        }
    }
}

pub struct SyncExecutor {
    remote: Arc<dyn RemoteSource>,
    store: Arc<dyn ObjectStore>,
    max_concurrent: usize,
}

impl SyncExecutor {
    pub fn new(
        remote: Arc<dyn RemoteSource>,
        store: Arc<dyn ObjectStore>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            remote,
            store,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// 并行执行计划中的全部项目，单项失败不影响其他项目
    pub async fn execute(&self, plan: &SyncPlan) -> Vec<ItemOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));

        let tasks = plan
            .sync_groups()
            .into_values()
            .map(|group| Task::Sync(group.into_iter().cloned().collect()))
            .chain(plan.to_delete.iter().cloned().map(Task::Delete));

        let mut handles = Vec::new();
        for task in tasks {
            let semaphore = semaphore.clone();
            let remote = self.remote.clone();
            let store = self.store.clone();
            let fallback = task.failed_outcomes("任务异常退出");

            let handle = tokio::spawn(async move {
                // 信号量不会被关闭，acquire 失败时直接执行
                let _permit = semaphore.acquire_owned().await;
                match task {
                    Task::Sync(items) => {
                        let mut outcomes = Vec::with_capacity(items.len());
                        for item in &items {
                            let status = Self::sync_item(remote.as_ref(), store.as_ref(), item).await;
                            outcomes.push(ItemOutcome {
                                key: item.key.clone(),
                                url: Some(item.url.to_string()),
                                status,
                            });
                        }
                        outcomes
                    }
                    Task::Delete(key) => {
                        let status = Self::delete_item(store.as_ref(), &key).await;
                        vec![ItemOutcome {
                            key,
                            url: None,
                            status,
                        }]
                    }
                }
            });

            handles.push((handle, fallback));
        }

        let mut outcomes = Vec::new();
        for (handle, fallback) in handles {
            match handle.await {
                Ok(done) => outcomes.extend(done),
                Err(e) => {
                    error!("同步任务异常: {}", e);
                    outcomes.extend(fallback);
                }
            }
        }

        outcomes.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.url.cmp(&b.url)));
        outcomes
    }

    /// 检查指纹，变化时下载并上传
    async fn sync_item(
        remote: &dyn RemoteSource,
        store: &dyn ObjectStore,
        item: &SyncItem,
    ) -> ItemStatus {
        match Self::try_sync_item(remote, store, item).await {
            Ok(status) => status,
            Err(e) => {
                warn!("同步失败: {} - {}", item.key, e);
                ItemStatus::failed(e)
            }
        }
    }

    async fn try_sync_item(
        remote: &dyn RemoteSource,
        store: &dyn ObjectStore,
        item: &SyncItem,
    ) -> Result<ItemStatus> {
        let fingerprint = item.fingerprint.as_ref().ok_or_else(|| {
            MirrorError::RemoteFormat(format!("列表中没有 {} 的元数据", item.url))
        })?;

        // 对象不存在返回 None，表示首次上传
        let stored = store.head(&item.key).await?;
        if let Some(meta) = stored.as_ref().filter(|m| fingerprint.matches(m.fingerprint())) {
            debug!("文件未变化，跳过: {} ({} 字节)", item.key, meta.size);
            return Ok(ItemStatus::Skipped);
        }

        let body = remote.fetch(item.url.as_str()).await?;
        let bytes = body.len() as u64;
        store
            .put(
                &item.key,
                body,
                WriteOptions::with_fingerprint(fingerprint.as_str()),
            )
            .await?;

        info!("已上传: {} ({} 字节)", item.key, bytes);
        Ok(ItemStatus::Uploaded { bytes })
    }

    async fn delete_item(store: &dyn ObjectStore, key: &str) -> ItemStatus {
        match store.delete(key).await {
            Ok(()) => {
                info!("已删除: {}", key);
                ItemStatus::Deleted
            }
            Err(e) => {
                warn!("删除失败: {} - {}", key, e);
                ItemStatus::failed(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fingerprint::Fingerprint;
    use crate::testing::{FakeRemote, MemoryStore};
    use reqwest::Url;

    fn item(name: &str, size: &str) -> SyncItem {
        SyncItem {
            url: Url::parse(&format!("https://download.bls.gov/pr/{}", name)).unwrap(),
            key: format!("raw/bls/{}", name),
            fingerprint: Some(Fingerprint::of(name, "3/13/2025 9:26 AM", size)),
        }
    }

    fn plan(to_sync: Vec<SyncItem>, to_delete: &[&str]) -> SyncPlan {
        SyncPlan {
            to_sync,
            to_delete: to_delete.iter().map(|k| k.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_unchanged_fingerprint_is_skipped_without_transfer() {
        let a = item("A", "1");
        let remote = Arc::new(FakeRemote::new().with_file(a.url.as_str(), b"aaa"));
        let store = Arc::new(MemoryStore::new().with_object(
            &a.key,
            Some(a.fingerprint.as_ref().unwrap().as_str()),
        ));

        let executor = SyncExecutor::new(remote.clone(), store.clone(), 4);
        let outcomes = executor.execute(&plan(vec![a], &[])).await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, ItemStatus::Skipped);
        assert_eq!(remote.total_fetches(), 0);
        assert_eq!(store.put_count(), 0);
    }

    #[tokio::test]
    async fn test_first_upload_fetches_once_and_attaches_fingerprint() {
        let a = item("A", "1");
        let remote = Arc::new(FakeRemote::new().with_file(a.url.as_str(), b"series_id\tyear\n"));
        let store = Arc::new(MemoryStore::new());

        let executor = SyncExecutor::new(remote.clone(), store.clone(), 4);
        let outcomes = executor.execute(&plan(vec![a.clone()], &[])).await;

        assert_eq!(outcomes[0].status, ItemStatus::Uploaded { bytes: 15 });
        assert_eq!(remote.total_fetches(), 1);
        assert_eq!(store.put_count(), 1);
        assert_eq!(
            store.stored_fingerprint(&a.key).as_deref(),
            a.fingerprint.as_ref().map(Fingerprint::as_str)
        );
        assert_eq!(store.body(&a.key).unwrap().as_ref(), b"series_id\tyear\n");
    }

    #[tokio::test]
    async fn test_changed_fingerprint_is_reuploaded() {
        let a = item("A", "2");
        let remote = Arc::new(FakeRemote::new().with_file(a.url.as_str(), b"new"));
        let store = Arc::new(MemoryStore::new().with_object(&a.key, Some("stale")));

        let outcomes = SyncExecutor::new(remote, store.clone(), 1)
            .execute(&plan(vec![a.clone()], &[]))
            .await;

        assert_eq!(outcomes[0].status, ItemStatus::Uploaded { bytes: 3 });
        assert_eq!(
            store.stored_fingerprint(&a.key).as_deref(),
            a.fingerprint.as_ref().map(Fingerprint::as_str)
        );
    }

    #[tokio::test]
    async fn test_one_failed_fetch_does_not_stop_others() {
        let items: Vec<_> = ["A", "B", "C", "D", "E"]
            .iter()
            .map(|n| item(n, "1"))
            .collect();
        let mut remote = FakeRemote::new();
        for it in &items {
            remote = remote.with_file(it.url.as_str(), b"x");
        }
        let remote = Arc::new(remote.failing(items[2].url.as_str()));
        let store = Arc::new(MemoryStore::new().with_object(
            &items[0].key,
            Some(items[0].fingerprint.as_ref().unwrap().as_str()),
        ));

        let outcomes = SyncExecutor::new(remote, store.clone(), 2)
            .execute(&plan(items, &[]))
            .await;

        let failed: Vec<_> = outcomes.iter().filter(|o| o.status.is_failed()).collect();
        assert_eq!(outcomes.len(), 5);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].key, "raw/bls/C");
        assert_eq!(outcomes[0].status, ItemStatus::Skipped);
        assert_eq!(store.put_count(), 3);
    }

    #[tokio::test]
    async fn test_missing_fingerprint_fails_without_upload() {
        let mut a = item("A", "1");
        a.fingerprint = None;
        let remote = Arc::new(FakeRemote::new().with_file(a.url.as_str(), b"x"));
        let store = Arc::new(MemoryStore::new());

        let outcomes = SyncExecutor::new(remote.clone(), store.clone(), 1)
            .execute(&plan(vec![a], &[]))
            .await;

        assert!(outcomes[0].status.is_failed());
        assert_eq!(remote.total_fetches(), 0);
        assert_eq!(store.put_count(), 0);
    }

    #[tokio::test]
    async fn test_deletes_orphans() {
        let store = Arc::new(
            MemoryStore::new()
                .with_object("raw/bls/old", None)
                .with_object("raw/bls/keep", None),
        );
        let outcomes = SyncExecutor::new(Arc::new(FakeRemote::new()), store.clone(), 4)
            .execute(&plan(vec![], &["raw/bls/old"]))
            .await;

        assert_eq!(outcomes[0].status, ItemStatus::Deleted);
        assert_eq!(outcomes[0].status.to_string(), "deleted");
        assert_eq!(store.keys(), vec!["raw/bls/keep".to_string()]);
    }

    fn remote_for(items: &[SyncItem]) -> Arc<FakeRemote> {
        let remote = items
            .iter()
            .fold(FakeRemote::new(), |r, it| r.with_file(it.url.as_str(), b"x"));
        Arc::new(remote)
    }

    #[tokio::test]
    async fn test_failed_head_fails_item_without_upload() {
        let items = vec![item("A", "1"), item("B", "1"), item("C", "1")];
        let remote = remote_for(&items);
        let store = Arc::new(MemoryStore::new().failing_head("raw/bls/B"));

        let outcomes = SyncExecutor::new(remote.clone(), store.clone(), 2)
            .execute(&plan(items, &[]))
            .await;

        assert_eq!(outcomes[0].status, ItemStatus::Uploaded { bytes: 1 });
        assert!(outcomes[1].status.is_failed());
        assert!(outcomes[1].status.to_string().contains("AccessDenied"));
        assert_eq!(outcomes[2].status, ItemStatus::Uploaded { bytes: 1 });
        assert_eq!(remote.fetch_count("https://download.bls.gov/pr/B"), 0);
        assert_eq!(store.body("raw/bls/B"), None);
        assert_eq!(store.put_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_put_fails_only_that_item() {
        let items = vec![item("A", "1"), item("B", "1"), item("C", "1")];
        let store = Arc::new(MemoryStore::new().failing_put("raw/bls/A"));

        let outcomes = SyncExecutor::new(remote_for(&items), store.clone(), 3)
            .execute(&plan(items, &[]))
            .await;

        assert!(matches!(&outcomes[0].status, ItemStatus::Failed { reason } if reason.contains("SlowDown")));
        assert_eq!(outcomes[1].status, ItemStatus::Uploaded { bytes: 1 });
        assert_eq!(outcomes[2].status, ItemStatus::Uploaded { bytes: 1 });
        assert_eq!(store.keys(), vec!["raw/bls/B", "raw/bls/C"]);
    }

    #[tokio::test]
    async fn test_failed_delete_fails_only_that_key() {
        let a = item("A", "1");
        let store = Arc::new(
            MemoryStore::new()
                .with_object("raw/bls/old1", None)
                .with_object("raw/bls/old2", None)
                .failing_delete("raw/bls/old1"),
        );

        let outcomes = SyncExecutor::new(remote_for(&[a.clone()]), store.clone(), 2)
            .execute(&plan(vec![a], &["raw/bls/old1", "raw/bls/old2"]))
            .await;

        let status_of = |key: &str| &outcomes.iter().find(|o| o.key == key).unwrap().status;
        assert_eq!(*status_of("raw/bls/A"), ItemStatus::Uploaded { bytes: 1 });
        assert!(status_of("raw/bls/old1").is_failed());
        assert_eq!(*status_of("raw/bls/old2"), ItemStatus::Deleted);
        assert_eq!(store.keys(), vec!["raw/bls/A", "raw/bls/old1"]);
    }

    #[tokio::test]
    async fn test_panicking_task_becomes_failed_outcome() {
        let items = vec![item("A", "1"), item("B", "1")];
        let store = Arc::new(MemoryStore::new().panicking_put("raw/bls/A"));

        let outcomes = SyncExecutor::new(remote_for(&items), store.clone(), 1)
            .execute(&plan(items, &[]))
            .await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].status.is_failed());
        assert_eq!(outcomes[1].status, ItemStatus::Uploaded { bytes: 1 });
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ItemStatus::Skipped.to_string(), "skipped");
        assert_eq!(ItemStatus::Uploaded { bytes: 1 }.to_string(), "uploaded");
        assert_eq!(ItemStatus::failed("timeout").to_string(), "failed:timeout");
    }
}
