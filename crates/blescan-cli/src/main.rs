//! Blescan CLI
//!
//! 命令行前端，驱动进程内的扫描器单例

mod output;

use anyhow::Result;
use blescan_core::{BleScanner, LogLevel, ScanSettings, ScannerEvent};
use clap::{Parser, Subcommand};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "blescan", version, about = "BLE 外设扫描工具")]
struct Cli {
    /// 日志级别 (error, warn, info, debug, trace)；RUST_LOG 优先
    #[arg(short, long, global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 扫描附近设备
    Scan {
        /// 扫描超时时间 (秒)，默认取配置文件
        #[arg(short, long)]
        timeout: Option<u64>,
        /// 只显示广播了该服务的设备，可重复
        #[arg(short, long = "service")]
        services: Vec<Uuid>,
        /// 实时输出同一设备的重复广播
        #[arg(long)]
        duplicates: bool,
        /// 以 JSON 输出结果
        #[arg(long)]
        json: bool,
    },
    /// 查看当前配置
    Config {
        /// 把当前生效的配置写入配置文件
        #[arg(long)]
        save: bool,
    },
}

fn init_logging(level: Option<LogLevel>, verbose: bool) {
    // 桥接 log crate（blescan-core 的配置模块使用）到 tracing
    let _ = tracing_log::LogTracer::init();

    let level = level.unwrap_or(if verbose {
        LogLevel::Debug
    } else {
        LogLevel::Warn
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(level.filter_directive())),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = ScanSettings::load();
    init_logging(cli.log_level, settings.verbose);

    match cli.command {
        Commands::Scan {
            timeout,
            services,
            duplicates,
            json,
        } => {
            let mut options = settings.scan_options();
            if !services.is_empty() {
                options.services = services;
            }
            options.allow_duplicates |= duplicates;
            let timeout = timeout.unwrap_or(settings.scan_timeout_secs);

            scan(options, Duration::from_secs(timeout), json).await?;
        }
        Commands::Config { save } => {
            println!("配置文件: {}", ScanSettings::config_path().display());
            println!("{settings:#?}");
            if save {
                settings.save()?;
                println!("✅ 已保存");
            }
        }
    }

    Ok(())
}

async fn scan(options: blescan_core::ScanOptions, timeout: Duration, json: bool) -> Result<()> {
    let scanner = BleScanner::shared_instance();
    scanner.attach_default_adapter().await?;

    let mut events = scanner.subscribe();
    let pump = tokio::spawn(async { BleScanner::shared_instance().run_events().await });

    if !json {
        println!("🔍 扫描设备 ({}s)...", timeout.as_secs());
    }
    scanner.start_scan(options).await?;

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            () = &mut deadline => break,
            event = events.recv() => match event {
                Ok(ScannerEvent::PeripheralAdded(p)) if !json => {
                    println!("   + {} ({}) {:?}", p.display_name(), p.id, p.rssi);
                }
                Ok(ScannerEvent::PeripheralUpdated(p)) if !json => {
                    println!("   ~ {} ({}) {:?}", p.display_name(), p.id, p.rssi);
                }
                Ok(ScannerEvent::ScanningChanged(false)) => {
                    tracing::warn!("Scan stopped by the platform");
                    break;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => tracing::debug!("Skipped {} scanner events", n),
                Err(RecvError::Closed) => break,
            },
        }
    }

    scanner.stop_scan().await?;
    pump.abort();

    let summaries = output::summarize(&scanner.peripherals());
    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        println!("发现 {} 个设备:", summaries.len());
        output::print_table(&summaries);
    }

    Ok(())
}
