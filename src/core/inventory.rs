use crate::error::Result;
use crate::storage::ObjectStore;
use std::collections::BTreeSet;
use tracing::info;

/// 读取目标前缀下的完整对象清单
///
/// 列举失败直接返回错误，不会返回部分清单；否则缺失的 key 会被当成“不存在”。
pub async fn read_inventory(store: &dyn ObjectStore, prefix: &str) -> Result<BTreeSet<String>> {
    info!("列举存储对象: {} prefix={}", store.name(), prefix);

    let keys: BTreeSet<String> = store
        .list_keys(prefix)
        .await?
        .into_iter()
        .filter(|k| k.starts_with(prefix))
        .collect();

    info!("存储中已有 {} 个对象", keys.len());
    Ok(keys)
}
