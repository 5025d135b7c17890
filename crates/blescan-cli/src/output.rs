//! 扫描结果输出

use blescan_core::DiscoveredPeripheral;
use serde::Serialize;

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PeripheralSummary {
    pub id: String,
    pub name: Option<String>,
    pub rssi: Option<i16>,
    pub services: Vec<String>,
    pub connection: String,
}

impl From<&DiscoveredPeripheral> for PeripheralSummary {
    fn from(p: &DiscoveredPeripheral) -> Self {
        Self {
            id: p.id.to_string(),
            name: p.name.clone(),
            rssi: p.rssi,
            services: p.services.iter().map(ToString::to_string).collect(),
            connection: p.connection.to_string(),
        }
    }
}

/// 按信号强度从强到弱排序，未知 RSSI 排在最后
pub fn summarize(peripherals: &[DiscoveredPeripheral]) -> Vec<PeripheralSummary> {
    let mut summaries: Vec<PeripheralSummary> =
        peripherals.iter().map(PeripheralSummary::from).collect();
    summaries.sort_by(|a, b| b.rssi.cmp(&a.rssi).then_with(|| a.id.cmp(&b.id)));
    summaries
}

pub fn print_table(summaries: &[PeripheralSummary]) {
    if summaries.is_empty() {
        println!("   未发现设备");
        return;
    }
    for (i, p) in summaries.iter().enumerate() {
        let rssi = p
            .rssi
            .map_or_else(|| "?".to_string(), |r| format!("{r} dBm"));
        println!(
            "   [{}] {} ({}) {}",
            i,
            p.name.as_deref().unwrap_or("<unknown>"),
            p.id,
            rssi
        );
        for service in &p.services {
            println!("       service {service}");
        }
    }
}
