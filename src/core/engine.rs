use crate::core::executor::{ItemOutcome, ItemStatus, SyncExecutor};
use crate::core::inventory::read_inventory;
use crate::core::reconciler::{Reconciler, SyncPlan};
use crate::core::scanner::RemoteScanner;
use crate::error::{MirrorError, Result};
use crate::remote::RemoteSource;
use crate::storage::ObjectStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

/// 引擎配置
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// 远程目录索引
    pub index_url: String,
    /// 目标 key 前缀
    pub prefix: String,
    /// 最大并发数
    pub max_concurrent: usize,
}

/// 同步报告
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub skipped: usize,
    pub uploaded: usize,
    pub deleted: usize,
    pub failed: usize,
    pub bytes_transferred: u64,
    pub outcomes: Vec<ItemOutcome>,
}

impl SyncReport {
    fn new(run_id: String, started_at: DateTime<Utc>, outcomes: Vec<ItemOutcome>) -> Self {
        let mut report = Self {
            run_id,
            started_at,
            finished_at: Utc::now(),
            skipped: 0,
            uploaded: 0,
            deleted: 0,
            failed: 0,
            bytes_transferred: 0,
            outcomes: Vec::new(),
        };
        for outcome in &outcomes {
            match &outcome.status {
                ItemStatus::Skipped => report.skipped += 1,
                ItemStatus::Uploaded { bytes } => {
                    report.uploaded += 1;
                    report.bytes_transferred += bytes;
                }
                ItemStatus::Deleted => report.deleted += 1,
                ItemStatus::Failed { .. } => report.failed += 1,
            }
        }
        report.outcomes = outcomes;
        report
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.outcomes.iter().filter(|o| o.status.is_failed())
    }

    /// 有失败项时转换为 PartialItemFailure
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(MirrorError::PartialItemFailure {
                failed: self.failed,
                total: self.outcomes.len(),
            })
        }
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "skipped {}, uploaded {}, deleted {}, failed {}",
            self.skipped, self.uploaded, self.deleted, self.failed
        )
    }
}

/// 镜像引擎：扫描远程 -> 列举存储 -> 对比 -> 执行
pub struct MirrorEngine {
    remote: Arc<dyn RemoteSource>,
    store: Arc<dyn ObjectStore>,
    config: EngineConfig,
}

impl MirrorEngine {
    pub fn new(
        remote: Arc<dyn RemoteSource>,
        store: Arc<dyn ObjectStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            remote,
            store,
            config,
        }
    }

    /// 只计算差异，不修改存储
    pub async fn plan(&self) -> Result<SyncPlan> {
        let listing = RemoteScanner::new(self.remote.clone())
            .scan(&self.config.index_url)
            .await?;

        // 清单必须完整读取后才能对比
        let inventory = read_inventory(self.store.as_ref(), &self.config.prefix).await?;

        Ok(Reconciler::new(self.config.prefix.as_str()).plan(&listing, &inventory))
    }

    /// 运行一次同步；发现阶段的错误在修改存储之前返回
    pub async fn run(&self) -> Result<SyncReport> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!("开始同步: {} -> {} ({})", self.config.index_url, self.store.name(), run_id);

        let plan = match self.plan().await {
            Ok(p) => p,
            Err(e) => {
                error!("发现阶段失败，未修改存储: {}", e);
                return Err(e);
            }
        };
        info!(
            "准备同步 {} 个文件, 删除 {} 个对象",
            plan.to_sync.len(),
            plan.to_delete.len()
        );

        let outcomes = SyncExecutor::new(
            self.remote.clone(),
            self.store.clone(),
            self.config.max_concurrent,
        )
        .execute(&plan)
        .await;

        let report = SyncReport::new(run_id, started_at, outcomes);
        for failure in report.failures() {
            error!("{} {}", failure.key, failure.status);
        }
        info!("同步完成: {}", report);
        Ok(report)
    }
}
