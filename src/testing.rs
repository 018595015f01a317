//! 测试用的远程数据源和内存对象存储

use crate::error::{MirrorError, Result};
use crate::remote::RemoteSource;
use crate::storage::{ObjectMeta, ObjectStore, WriteOptions, FINGERPRINT_META_KEY};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct FakeRemote {
    pages: Mutex<HashMap<String, Bytes>>,
    failing: HashSet<String>,
    fetches: Mutex<HashMap<String, usize>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: &str, html: &str) -> Self {
        self.set_page(url, html);
        self
    }

    pub fn with_file(self, url: &str, body: &[u8]) -> Self {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), Bytes::copy_from_slice(body));
        self
    }

    pub fn failing(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    /// 运行之间修改远程内容
    pub fn set_page(&self, url: &str, html: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), Bytes::copy_from_slice(html.as_bytes()));
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        self.fetches.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.fetches.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl RemoteSource for FakeRemote {
    async fn fetch(&self, url: &str) -> Result<Bytes> {
        *self.fetches.lock().unwrap().entry(url.to_string()).or_default() += 1;
        if self.failing.contains(url) {
            return Err(MirrorError::transport(url, "connection reset"));
        }
        self.pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| MirrorError::transport(url, "HTTP status client error (404 Not Found)"))
    }
}

struct StoredObject {
    body: Bytes,
    options: WriteOptions,
}

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    fail_list: bool,
    fail_head: HashSet<String>,
    fail_put: HashSet<String>,
    fail_delete: HashSet<String>,
    panic_put: HashSet<String>,
    puts: AtomicUsize,
    deletes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(self, key: &str, fingerprint: Option<&str>) -> Self {
        let options = match fingerprint {
            Some(fp) => WriteOptions::with_fingerprint(fp),
            None => WriteOptions::default(),
        };
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                body: Bytes::new(),
                options,
            },
        );
        self
    }

    pub fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    pub fn failing_head(mut self, key: &str) -> Self {
        self.fail_head.insert(key.to_string());
        self
    }

    pub fn failing_put(mut self, key: &str) -> Self {
        self.fail_put.insert(key.to_string());
        self
    }

    pub fn failing_delete(mut self, key: &str) -> Self {
        self.fail_delete.insert(key.to_string());
        self
    }

    /// 写入该 key 时 panic，用于检验任务隔离
    pub fn panicking_put(mut self, key: &str) -> Self {
        self.panic_put.insert(key.to_string());
        self
    }

    /// 成功写入的次数
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// 所有写入和删除的次数
    pub fn mutation_count(&self) -> usize {
        self.put_count() + self.delete_count()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn body(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().get(key).map(|o| o.body.clone())
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .and_then(|o| o.options.content_type.clone())
    }

    pub fn stored_fingerprint(&self, key: &str) -> Option<String> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .and_then(|o| o.options.user_metadata.get(FINGERPRINT_META_KEY).cloned())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        if self.fail_list {
            return Err(MirrorError::store("list", prefix, "AccessDenied"));
        }
        Ok(self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>> {
        if self.fail_head.contains(key) {
            return Err(MirrorError::store("head", key, "AccessDenied"));
        }
        Ok(self.objects.lock().unwrap().get(key).map(|o| ObjectMeta {
            size: o.body.len() as u64,
            user_metadata: o.options.user_metadata.clone(),
        }))
    }

    async fn put(&self, key: &str, body: Bytes, options: WriteOptions) -> Result<()> {
        if self.panic_put.contains(key) {
            panic!("injected panic writing {key}");
        }
        if self.fail_put.contains(key) {
            return Err(MirrorError::store("write", key, "SlowDown"));
        }
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), StoredObject { body, options });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if self.fail_delete.contains(key) {
            return Err(MirrorError::store("delete", key, "AccessDenied"));
        }
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
