//! Blescan Core Library
//!
//! BLE Central 的进程级封装：发现附近外设并跟踪其状态。
//!
//! # 模块
//!
//! - **ble**: Central 抽象、回调接口、btleplug 后端、扫描器单例
//! - **config**: 扫描设置持久化
//! - **logging**: 日志级别
//!
//! # 使用示例
//!
//! ```ignore
//! use blescan_core::{BleScanner, ScanOptions};
//!
//! let scanner = BleScanner::shared_instance();
//! scanner.attach_default_adapter().await?;
//!
//! // 事件泵在后台运行，把平台事件交给扫描器的回调
//! tokio::spawn(async { BleScanner::shared_instance().run_events().await });
//!
//! scanner.start_scan(ScanOptions::default()).await?;
//! tokio::time::sleep(Duration::from_secs(5)).await;
//! scanner.stop_scan().await?;
//!
//! for p in scanner.peripherals() {
//!     println!("{} {}", p.id, p.display_name());
//! }
//! ```

pub mod ble;
pub mod config;
pub mod error;
pub mod logging;

pub use ble::{
    Advertisement, BleScanner, BtleplugCentral, CentralEvent, CentralManager,
    CentralManagerDelegate, CentralState, ConnectionState, DiscoveredPeripheral, PeripheralDelegate,
    PeripheralId, ScanOptions, ScannerEvent,
};
pub use config::ScanSettings;
pub use error::ScanError;
pub use logging::LogLevel;
