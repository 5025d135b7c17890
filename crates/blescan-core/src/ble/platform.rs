//! btleplug 后端
//!
//! 使用第一个可用的适配器作为 Central。
//! 广播事件来自适配器事件流，特征通知来自已连接外设的通知流，
//! 两者合并成一个 [`CentralEvent`] 流。

use crate::ble::{
    Advertisement, CentralEvent, CentralManager, CentralState, PeripheralId, ScanOptions,
};
use crate::error::{Result, ScanError};
use btleplug::api::{
    Central, CentralEvent as BtleEvent, CentralState as BtleState, CharPropFlags, Manager as _,
    Peripheral as _, ScanFilter,
};
use btleplug::platform::{
    Adapter, Manager, Peripheral as PlatformPeripheral, PeripheralId as PlatformId,
};
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

const LOCAL_EVENT_CAPACITY: usize = 256;

pub struct BtleplugCentral {
    adapter: Adapter,
    /// 由本端产生的事件（服务发现、特征通知、连接失败）
    local_tx: broadcast::Sender<CentralEvent>,
}

impl BtleplugCentral {
    pub async fn new() -> Result<Self> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;
        let adapter = adapters.into_iter().next().ok_or(ScanError::NoAdapter)?;
        Ok(Self::with_adapter(adapter))
    }

    pub fn with_adapter(adapter: Adapter) -> Self {
        let (local_tx, _) = broadcast::channel(LOCAL_EVENT_CAPACITY);
        Self { adapter, local_tx }
    }

    async fn find_peripheral(&self, id: &PeripheralId) -> Result<PlatformPeripheral> {
        self.adapter
            .peripherals()
            .await?
            .into_iter()
            .find(|p| p.id().to_string() == id.as_str())
            .ok_or_else(|| ScanError::UnknownPeripheral(id.clone()))
    }

    /// 发现服务并订阅所有可通知的特征
    async fn discover_and_subscribe(&self, peripheral: &PlatformPeripheral) -> Result<()> {
        let id = PeripheralId::new(peripheral.id().to_string());

        peripheral.discover_services().await?;
        let services = peripheral.services().iter().map(|s| s.uuid).collect();
        let _ = self
            .local_tx
            .send(CentralEvent::ServicesDiscovered { id: id.clone(), services });

        for characteristic in peripheral.characteristics() {
            if characteristic.properties.contains(CharPropFlags::NOTIFY) {
                if let Err(e) = peripheral.subscribe(&characteristic).await {
                    warn!("Failed to subscribe to {}: {}", characteristic.uuid, e);
                }
            }
        }

        let mut notifications = peripheral.notifications().await?;
        let tx = self.local_tx.clone();
        tokio::spawn(async move {
            while let Some(n) = notifications.next().await {
                let _ = tx.send(CentralEvent::CharacteristicValueUpdated {
                    id: id.clone(),
                    characteristic: n.uuid,
                    value: n.value,
                });
            }
            debug!("Notification stream for {} closed", id);
        });

        Ok(())
    }
}

async fn advertisement_for(
    adapter: &Adapter,
    id: &PlatformId,
) -> Option<Advertisement> {
    let peripheral = adapter.peripheral(id).await.ok()?;
    let props = peripheral.properties().await.ok()??;
    Some(Advertisement {
        id: PeripheralId::new(id.to_string()),
        local_name: props.local_name,
        rssi: props.rssi,
        services: props.services,
        manufacturer_data: props.manufacturer_data,
        service_data: props.service_data,
    })
}

fn map_state(state: BtleState) -> CentralState {
    match state {
        BtleState::PoweredOn => CentralState::PoweredOn,
        BtleState::PoweredOff => CentralState::PoweredOff,
        _ => CentralState::Unknown,
    }
}

/// 单个 btleplug 事件的去向
enum Translated {
    Event(CentralEvent),
    /// 需要读取外设属性才能生成广播
    Lookup(PlatformId),
    Skip,
}

fn classify(event: BtleEvent) -> Translated {
    match event {
        BtleEvent::StateUpdate(state) => {
            Translated::Event(CentralEvent::StateUpdated(map_state(state)))
        }
        BtleEvent::DeviceDiscovered(id) | BtleEvent::DeviceUpdated(id) => Translated::Lookup(id),
        BtleEvent::DeviceConnected(id) => Translated::Event(CentralEvent::PeripheralConnected(
            PeripheralId::new(id.to_string()),
        )),
        BtleEvent::DeviceDisconnected(id) => Translated::Event(
            CentralEvent::PeripheralDisconnected(PeripheralId::new(id.to_string())),
        ),
        BtleEvent::ServicesAdvertisement { id, services } => {
            Translated::Event(CentralEvent::PeripheralDiscovered(Advertisement {
                id: PeripheralId::new(id.to_string()),
                services,
                ..Default::default()
            }))
        }
        BtleEvent::ManufacturerDataAdvertisement {
            id,
            manufacturer_data,
        } => Translated::Event(CentralEvent::PeripheralDiscovered(Advertisement {
            id: PeripheralId::new(id.to_string()),
            manufacturer_data,
            ..Default::default()
        })),
        BtleEvent::ServiceDataAdvertisement { id, service_data } => {
            Translated::Event(CentralEvent::PeripheralDiscovered(Advertisement {
                id: PeripheralId::new(id.to_string()),
                service_data,
                ..Default::default()
            }))
        }
        #[allow(unreachable_patterns)]
        _ => Translated::Skip,
    }
}

async fn translate(adapter: Adapter, event: BtleEvent) -> Option<CentralEvent> {
    match classify(event) {
        Translated::Event(event) => Some(event),
        Translated::Lookup(id) => advertisement_for(&adapter, &id)
            .await
            .map(CentralEvent::PeripheralDiscovered),
        Translated::Skip => None,
    }
}

#[async_trait::async_trait]
impl CentralManager for BtleplugCentral {
    async fn state(&self) -> CentralState {
        match self.adapter.adapter_state().await {
            Ok(state) => map_state(state),
            Err(btleplug::Error::PermissionDenied) => CentralState::Unauthorized,
            Err(btleplug::Error::NotSupported(_)) => CentralState::Unsupported,
            Err(e) => {
                warn!("Adapter state unavailable: {}", e);
                CentralState::Unknown
            }
        }
    }

    async fn start_scan(&self, options: &ScanOptions) -> Result<()> {
        info!(
            "Starting BLE scan (services={:?}, duplicates={})",
            options.services, options.allow_duplicates
        );
        self.adapter
            .start_scan(ScanFilter {
                services: options.services.clone(),
            })
            .await?;
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        info!("Stopping BLE scan");
        self.adapter.stop_scan().await?;
        Ok(())
    }

    async fn events(&self) -> Result<BoxStream<'static, CentralEvent>> {
        let adapter = self.adapter.clone();
        let platform = self
            .adapter
            .events()
            .await?
            .then(move |event| translate(adapter.clone(), event))
            .filter_map(|event| async move { event });

        let local = BroadcastStream::new(self.local_tx.subscribe())
            .filter_map(|event| async move { event.ok() });

        Ok(stream::select(platform, local).boxed())
    }

    async fn connect(&self, id: &PeripheralId) -> Result<()> {
        let peripheral = self.find_peripheral(id).await?;

        info!("Connecting to {}", id);
        if let Err(e) = peripheral.connect().await {
            let _ = self.local_tx.send(CentralEvent::PeripheralConnectFailed {
                id: id.clone(),
                reason: e.to_string(),
            });
            return Err(e.into());
        }
        let _ = self
            .local_tx
            .send(CentralEvent::PeripheralConnected(id.clone()));

        // 链路已建立，服务发现失败不影响连接结果
        if let Err(e) = self.discover_and_subscribe(&peripheral).await {
            warn!("Service discovery on {} failed: {}", id, e);
        }
        Ok(())
    }

    async fn disconnect(&self, id: &PeripheralId) -> Result<()> {
        let peripheral = self.find_peripheral(id).await?;
        info!("Disconnecting from {}", id);
        peripheral.disconnect().await?;
        Ok(())
    }
}
