//! Central Manager 抽象
//!
//! 扫描器只通过 [`CentralManager`] 与平台蓝牙栈交互，
//! 平台事件统一转换为 [`CentralEvent`]。
//!
//! # 状态
//!
//! 本地无线电的状态完全由平台维护：
//! - Unknown / Resetting: 尚未就绪
//! - Unsupported / Unauthorized: 不可用
//! - PoweredOff / PoweredOn: 可用性由用户控制

use crate::ble::{Advertisement, PeripheralId};
use crate::error::Result;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CentralState {
    #[default]
    Unknown,
    Resetting,
    Unsupported,
    Unauthorized,
    PoweredOff,
    PoweredOn,
}

impl CentralState {
    pub fn is_powered_on(&self) -> bool {
        matches!(self, CentralState::PoweredOn)
    }

    pub fn name(&self) -> &'static str {
        match self {
            CentralState::Unknown => "unknown",
            CentralState::Resetting => "resetting",
            CentralState::Unsupported => "unsupported",
            CentralState::Unauthorized => "unauthorized",
            CentralState::PoweredOff => "poweredOff",
            CentralState::PoweredOn => "poweredOn",
        }
    }
}

impl fmt::Display for CentralState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 扫描参数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOptions {
    /// 只报告广播了这些服务的外设，空表示不过滤
    pub services: Vec<Uuid>,
    /// 同一外设的重复广播是否继续上报
    pub allow_duplicates: bool,
}

impl ScanOptions {
    pub fn with_services(services: Vec<Uuid>) -> Self {
        Self {
            services,
            allow_duplicates: false,
        }
    }

    /// 判断一次广播是否通过服务过滤
    pub fn matches(&self, adv: &Advertisement) -> bool {
        self.services.is_empty() || adv.services.iter().any(|s| self.services.contains(s))
    }
}

/// 平台无关的 Central 事件
#[derive(Debug, Clone, PartialEq)]
pub enum CentralEvent {
    StateUpdated(CentralState),
    PeripheralDiscovered(Advertisement),
    PeripheralConnected(PeripheralId),
    PeripheralConnectFailed {
        id: PeripheralId,
        reason: String,
    },
    PeripheralDisconnected(PeripheralId),
    ServicesDiscovered {
        id: PeripheralId,
        services: Vec<Uuid>,
    },
    CharacteristicValueUpdated {
        id: PeripheralId,
        characteristic: Uuid,
        value: Vec<u8>,
    },
}

/// 平台 Central Manager 句柄
#[async_trait::async_trait]
pub trait CentralManager: Send + Sync {
    async fn state(&self) -> CentralState;

    async fn start_scan(&self, options: &ScanOptions) -> Result<()>;

    async fn stop_scan(&self) -> Result<()>;

    /// 平台事件流，流结束表示 Central 已不可用
    async fn events(&self) -> Result<BoxStream<'static, CentralEvent>>;

    async fn connect(&self, id: &PeripheralId) -> Result<()>;

    async fn disconnect(&self, id: &PeripheralId) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filter_matches_everything() {
        let adv = Advertisement {
            id: PeripheralId::from("A"),
            ..Default::default()
        };
        assert!(ScanOptions::default().matches(&adv));
    }

    #[test]
    fn test_service_filter() {
        let hr = Uuid::from_u128(0x0000180d_0000_1000_8000_00805f9b34fb);
        let other = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);
        let options = ScanOptions::with_services(vec![hr]);

        let with_hr = Advertisement {
            id: PeripheralId::from("A"),
            services: vec![other, hr],
            ..Default::default()
        };
        let without_hr = Advertisement {
            id: PeripheralId::from("B"),
            services: vec![other],
            ..Default::default()
        };

        assert!(options.matches(&with_hr));
        assert!(!options.matches(&without_hr));
    }

    #[test]
    fn test_only_powered_on_is_usable() {
        assert!(CentralState::PoweredOn.is_powered_on());
        assert!(!CentralState::PoweredOff.is_powered_on());
        assert!(!CentralState::Unauthorized.is_powered_on());
        assert_eq!(CentralState::default(), CentralState::Unknown);
    }
}
