//! 已发现外设的数据模型

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::SystemTime;
use uuid::Uuid;

/// 外设标识
///
/// 由平台分配，同一设备在一次进程生命周期内保持不变。
/// 外设集合以此为键去重。
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeripheralId(String);

impl PeripheralId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeripheralId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl ConnectionState {
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 一次广播中携带的数据
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Advertisement {
    pub id: PeripheralId,
    pub local_name: Option<String>,
    pub rssi: Option<i16>,
    pub services: Vec<Uuid>,
    pub manufacturer_data: HashMap<u16, Vec<u8>>,
    pub service_data: HashMap<Uuid, Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredPeripheral {
    pub id: PeripheralId,
    pub name: Option<String>,
    pub rssi: Option<i16>,
    pub services: Vec<Uuid>,
    pub manufacturer_data: HashMap<u16, Vec<u8>>,
    pub service_data: HashMap<Uuid, Vec<u8>>,
    pub connection: ConnectionState,
    /// 最近一次收到的特征值，按特征 UUID 索引
    pub characteristic_values: HashMap<Uuid, Vec<u8>>,
    pub last_seen: SystemTime,
}

impl DiscoveredPeripheral {
    pub fn from_advertisement(adv: Advertisement) -> Self {
        Self {
            id: adv.id,
            name: adv.local_name,
            rssi: adv.rssi,
            services: adv.services,
            manufacturer_data: adv.manufacturer_data,
            service_data: adv.service_data,
            connection: ConnectionState::Disconnected,
            characteristic_values: HashMap::new(),
            last_seen: SystemTime::now(),
        }
    }

    /// 用新的广播刷新条目
    ///
    /// 广播中缺失的字段保留旧值，服务列表取并集。
    pub fn merge_advertisement(&mut self, adv: Advertisement) {
        if adv.local_name.is_some() {
            self.name = adv.local_name;
        }
        if adv.rssi.is_some() {
            self.rssi = adv.rssi;
        }
        for uuid in adv.services {
            if !self.services.contains(&uuid) {
                self.services.push(uuid);
            }
        }
        self.manufacturer_data.extend(adv.manufacturer_data);
        self.service_data.extend(adv.service_data);
        self.last_seen = SystemTime::now();
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unknown>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adv(id: &str) -> Advertisement {
        Advertisement {
            id: PeripheralId::from(id),
            ..Default::default()
        }
    }

    #[test]
    fn test_merge_keeps_known_name() {
        let mut p = DiscoveredPeripheral::from_advertisement(Advertisement {
            local_name: Some("HR Strap".to_string()),
            rssi: Some(-70),
            ..adv("A")
        });

        p.merge_advertisement(Advertisement {
            rssi: Some(-55),
            ..adv("A")
        });

        assert_eq!(p.name.as_deref(), Some("HR Strap"));
        assert_eq!(p.rssi, Some(-55));
    }

    #[test]
    fn test_merge_unions_services() {
        let hr = Uuid::from_u128(0x0000180d_0000_1000_8000_00805f9b34fb);
        let battery = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);

        let mut p = DiscoveredPeripheral::from_advertisement(Advertisement {
            services: vec![hr],
            ..adv("A")
        });
        p.merge_advertisement(Advertisement {
            services: vec![hr, battery],
            ..adv("A")
        });

        assert_eq!(p.services, vec![hr, battery]);
    }

    #[test]
    fn test_merge_service_data() {
        let battery = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);
        let mut p = DiscoveredPeripheral::from_advertisement(Advertisement {
            local_name: Some("Tag".to_string()),
            ..adv("A")
        });

        p.merge_advertisement(Advertisement {
            service_data: HashMap::from([(battery, vec![87])]),
            ..adv("A")
        });

        assert_eq!(p.service_data.get(&battery), Some(&vec![87]));
        assert_eq!(p.name.as_deref(), Some("Tag"));
    }

    #[test]
    fn test_display_name_fallback() {
        let p = DiscoveredPeripheral::from_advertisement(adv("B"));
        assert_eq!(p.display_name(), "<unknown>");
        assert_eq!(p.connection, ConnectionState::Disconnected);
    }
}
