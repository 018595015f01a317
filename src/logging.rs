//! 日志模块 - 控制台输出 + 可选的限制大小的日志文件

use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    /// 是否启用日志记录
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 日志级别: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_level")]
    pub level: String,
    /// 日志文件目录，未配置时只输出到控制台
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    /// 最大日志文件大小（MB）
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u32,
}

fn default_enabled() -> bool {
    true
}

fn default_level() -> String {
    "info".to_string()
}

fn default_max_size_mb() -> u32 {
    5 // 默认 5MB
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            level: default_level(),
            dir: None,
            max_size_mb: default_max_size_mb(),
        }
    }
}

impl LogConfig {
    /// 将配置的日志级别转换为 tracing Level
    pub fn tracing_level(&self) -> tracing::Level {
        match self.level.to_lowercase().as_str() {
            "error" => tracing::Level::ERROR,
            "warn" => tracing::Level::WARN,
            "debug" => tracing::Level::DEBUG,
            "trace" => tracing::Level::TRACE,
            _ => tracing::Level::INFO,
        }
    }
}

/// 初始化日志系统，`verbose` 为命令行 -v 的次数
pub fn init_logging(config: &LogConfig, verbose: u8) {
    if !config.enabled {
        let _ = tracing::subscriber::set_global_default(tracing_subscriber::registry());
        return;
    }

    let level = match verbose {
        0 => config.tracing_level(),
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    let mut env_filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=warn", "opendal=warn"] {
        if let Ok(d) = directive.parse() {
            env_filter = env_filter.add_directive(d);
        }
    }

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false);

    let file_layer = config.dir.as_deref().and_then(|dir| {
        match RotatingFile::new(dir, config.max_size_mb) {
            Ok(writer) => Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(false),
            ),
            Err(e) => {
                eprintln!("无法创建日志文件 {:?}: {}", dir, e);
                None
            }
        }
    });

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer);

    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// 超过大小限制时把 app.log 轮转为 app.log.old
#[derive(Clone)]
pub struct RotatingFile {
    path: PathBuf,
    max_size: u64,
    file: Arc<Mutex<File>>,
}

impl RotatingFile {
    pub fn new(dir: &Path, max_size_mb: u32) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join("app.log");
        let max_size = u64::from(max_size_mb) * 1024 * 1024;

        if fs::metadata(&path).map(|m| m.len() > max_size).unwrap_or(false) {
            Self::rotate(&path)?;
        }

        Ok(Self {
            file: Arc::new(Mutex::new(Self::open(&path)?)),
            path,
            max_size,
        })
    }

    fn open(path: &Path) -> io::Result<File> {
        OpenOptions::new().create(true).append(true).open(path)
    }

    fn rotate(path: &Path) -> io::Result<()> {
        let backup = path.with_extension("log.old");
        if backup.exists() {
            fs::remove_file(&backup)?;
        }
        fs::rename(path, backup)
    }

    fn write_locked(&self, buf: &[u8]) -> io::Result<usize> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "日志文件锁已损坏"))?;

        let written = file.write(buf)?;

        if file.metadata().map(|m| m.len() > self.max_size).unwrap_or(false) {
            file.flush()?;
            Self::rotate(&self.path)?;
            *file = Self::open(&self.path)?;
        }

        Ok(written)
    }
}

pub struct RotatingFileWriter<'a> {
    inner: &'a RotatingFile,
}

impl Write for RotatingFileWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write_locked(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.inner.file.lock() {
            Ok(mut file) => file.flush(),
            Err(_) => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for RotatingFile {
    type Writer = RotatingFileWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        RotatingFileWriter { inner: self }
    }
}
