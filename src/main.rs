use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mirrorsync_lib::logging::init_logging;
use mirrorsync_lib::remote::{HttpRemote, RemoteSource};
use mirrorsync_lib::storage::{create_store, ObjectStore};
use mirrorsync_lib::{population, AppConfig, EngineConfig, MirrorEngine, SyncReport};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "mirrorsync", version, about = "Mirror a remote file listing into S3")]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "mirrorsync.json")]
    config: PathBuf,

    /// 覆盖配置中的并发数
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// 以 JSON 输出同步报告
    #[arg(long)]
    json: bool,

    /// -v debug, -vv trace
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 同步远程目录到对象存储
    Sync,
    /// 只显示差异，不修改存储
    Plan,
    /// 获取人口统计 API 数据并存储
    Population,
    /// 依次执行 sync 和 population，互不影响
    Ingest,
}

struct Clients {
    remote: Arc<dyn RemoteSource>,
    store: Arc<dyn ObjectStore>,
}

impl Clients {
    fn new(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            remote: Arc::new(HttpRemote::new(&config.source)?),
            store: create_store(&config.storage)?,
        })
    }

    fn engine(&self, config: &AppConfig) -> MirrorEngine {
        MirrorEngine::new(
            self.remote.clone(),
            self.store.clone(),
            EngineConfig::from(config),
        )
    }
}

fn print_report(report: &SyncReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    for failure in report.failures() {
        println!("  {} {}", failure.key, failure.status);
    }
    println!("{}", report);
    Ok(())
}

async fn run_sync(clients: &Clients, config: &AppConfig, json: bool) -> Result<()> {
    let report = clients
        .engine(config)
        .run()
        .await
        .context("同步中止")?;
    print_report(&report, json)?;
    report.into_result()?;
    Ok(())
}

async fn run_plan(clients: &Clients, config: &AppConfig, json: bool) -> Result<()> {
    let plan = clients.engine(config).plan().await.context("计算差异失败")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }
    if plan.is_empty() {
        println!("nothing to sync");
        return Ok(());
    }
    for item in &plan.to_sync {
        let fingerprint = item
            .fingerprint
            .as_ref()
            .map(|f| f.as_str())
            .unwrap_or("-");
        println!("sync   {} {} <- {}", fingerprint, item.key, item.url);
    }
    for key in &plan.to_delete {
        println!("delete {}", key);
    }
    println!("{} to sync, {} to delete", plan.to_sync.len(), plan.to_delete.len());
    Ok(())
}

async fn run_population(clients: &Clients, config: &AppConfig) -> Result<()> {
    let bytes = population::ingest(
        clients.remote.as_ref(),
        clients.store.as_ref(),
        &config.population,
    )
    .await
    .context("人口统计数据获取失败")?;
    println!("stored {} ({} bytes)", config.population.key, bytes);
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = AppConfig::load(&cli.config)
        .with_context(|| format!("无法加载配置 {:?}", cli.config))?;
    if let Some(n) = cli.max_concurrent {
        config.sync.max_concurrent = n;
    }
    config.validate()?;

    init_logging(&config.log, cli.verbose);

    let clients = Clients::new(&config)?;

    match cli.command {
        Command::Sync => run_sync(&clients, &config, cli.json).await,
        Command::Plan => run_plan(&clients, &config, cli.json).await,
        Command::Population => run_population(&clients, &config).await,
        Command::Ingest => {
            // 一个数据源失败不影响另一个
            let sync = run_sync(&clients, &config, cli.json).await;
            if let Err(e) = &sync {
                tracing::error!("BLS 同步失败: {:#}", e);
            }
            let pop = run_population(&clients, &config).await;
            if let Err(e) = &pop {
                tracing::error!("人口统计数据失败: {:#}", e);
            }
            sync.and(pop)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
