//! BLE Scanner - 进程级单例
//!
//! 持有平台 Central Manager 句柄和已发现外设集合，
//! 并作为两组回调 ([`CentralManagerDelegate`]、[`PeripheralDelegate`]) 的接收者。
//!
//! # 生命周期
//!
//! 首次调用 [`BleScanner::shared_instance`] 时创建，直到进程退出。
//! Central 句柄需要单独挂载（[`BleScanner::attach_default_adapter`]
//! 或 [`BleScanner::set_central_manager`]），因为平台初始化是异步的。
//!
//! # 扫描状态
//!
//! `is_scanning` 只在平台接受扫描请求后置位，
//! 在 `stop_scan` 或 Central 离开 PoweredOn 状态时清除。

use crate::ble::delegate::{self, CentralManagerDelegate, PeripheralDelegate};
use crate::ble::platform::BtleplugCentral;
use crate::ble::{
    Advertisement, CentralManager, CentralState, ConnectionState, DiscoveredPeripheral,
    PeripheralId, ScanOptions,
};
use crate::error::{Result, ScanError};
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock, PoisonError, RwLock};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

const EVENT_CAPACITY: usize = 64;

static SHARED: LazyLock<BleScanner> = LazyLock::new(BleScanner::new);

/// 扫描器状态变化，供 UI 等上层订阅
#[derive(Debug, Clone)]
pub enum ScannerEvent {
    CentralStateChanged(CentralState),
    ScanningChanged(bool),
    PeripheralAdded(DiscoveredPeripheral),
    PeripheralUpdated(DiscoveredPeripheral),
    ConnectionChanged {
        id: PeripheralId,
        state: ConnectionState,
    },
}

pub struct BleScanner {
    central: RwLock<Option<Arc<dyn CentralManager>>>,
    peripherals: RwLock<HashMap<PeripheralId, DiscoveredPeripheral>>,
    is_scanning: AtomicBool,
    scan_options: RwLock<ScanOptions>,
    /// 串行化扫描状态切换（启动、停止、替换 Central）
    scan_lock: Mutex<()>,
    events_tx: broadcast::Sender<ScannerEvent>,
}

impl BleScanner {
    pub(crate) fn new() -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            central: RwLock::new(None),
            peripherals: RwLock::new(HashMap::new()),
            is_scanning: AtomicBool::new(false),
            scan_options: RwLock::new(ScanOptions::default()),
            scan_lock: Mutex::new(()),
            events_tx,
        }
    }

    /// 进程内唯一的扫描器实例
    pub fn shared_instance() -> &'static BleScanner {
        &SHARED
    }

    pub fn central_manager(&self) -> Option<Arc<dyn CentralManager>> {
        self.central
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 替换 Central 句柄
    ///
    /// 旧句柄上进行中的扫描会先被停止；停止失败只记录日志，替换照常进行。
    /// 新句柄尚未开始扫描，因此扫描标志会被清除。
    pub async fn set_central_manager(&self, central: Arc<dyn CentralManager>) {
        let _guard = self.scan_lock.lock().await;

        if self.is_scanning() {
            if let Some(old) = self.central_manager() {
                if let Err(e) = old.stop_scan().await {
                    warn!("Failed to stop scan on replaced central: {}", e);
                }
            }
        }

        *self.central.write().unwrap_or_else(PoisonError::into_inner) = Some(central);
        self.set_scanning(false);
    }

    fn is_current(&self, central: &Arc<dyn CentralManager>) -> bool {
        self.central
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|c| std::ptr::addr_eq(Arc::as_ptr(c), Arc::as_ptr(central)))
    }

    /// 使用默认蓝牙适配器创建并挂载 Central
    pub async fn attach_default_adapter(&self) -> Result<Arc<dyn CentralManager>> {
        let central: Arc<dyn CentralManager> = Arc::new(BtleplugCentral::new().await?);
        self.set_central_manager(central.clone()).await;
        info!("Attached default Bluetooth adapter");
        Ok(central)
    }

    pub fn is_scanning(&self) -> bool {
        self.is_scanning.load(Ordering::SeqCst)
    }

    fn set_scanning(&self, scanning: bool) {
        if self.is_scanning.swap(scanning, Ordering::SeqCst) != scanning {
            self.emit(ScannerEvent::ScanningChanged(scanning));
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScannerEvent> {
        self.events_tx.subscribe()
    }

    fn emit(&self, event: ScannerEvent) {
        // 没有订阅者时发送失败是正常的
        let _ = self.events_tx.send(event);
    }

    pub fn peripherals(&self) -> Vec<DiscoveredPeripheral> {
        self.peripherals
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn peripheral(&self, id: &PeripheralId) -> Option<DiscoveredPeripheral> {
        self.peripherals
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn peripheral_count(&self) -> usize {
        self.peripherals
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn clear_peripherals(&self) {
        self.peripherals
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// 对集合中的某个外设执行修改，返回修改后的快照
    fn update_peripheral<F>(&self, id: &PeripheralId, f: F) -> Option<DiscoveredPeripheral>
    where
        F: FnOnce(&mut DiscoveredPeripheral),
    {
        let mut peripherals = self
            .peripherals
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let entry = peripherals.get_mut(id)?;
        f(entry);
        Some(entry.clone())
    }

    fn set_connection(&self, id: &PeripheralId, state: ConnectionState) {
        if self
            .update_peripheral(id, |p| p.connection = state)
            .is_some()
        {
            self.emit(ScannerEvent::ConnectionChanged {
                id: id.clone(),
                state,
            });
        }
    }

    /// 开始扫描
    ///
    /// 需要已挂载且处于 PoweredOn 状态的 Central。已在扫描时直接返回。
    pub async fn start_scan(&self, options: ScanOptions) -> Result<()> {
        let _guard = self.scan_lock.lock().await;
        let central = self.central_manager().ok_or(ScanError::NoCentral)?;

        let state = central.state().await;
        if !state.is_powered_on() {
            return Err(ScanError::NotPoweredOn(state));
        }

        if self.is_scanning() {
            debug!("Scan already in progress");
            return Ok(());
        }

        central.start_scan(&options).await?;
        *self
            .scan_options
            .write()
            .unwrap_or_else(PoisonError::into_inner) = options;
        self.set_scanning(true);
        Ok(())
    }

    pub async fn stop_scan(&self) -> Result<()> {
        let _guard = self.scan_lock.lock().await;
        if !self.is_scanning() {
            return Ok(());
        }
        let central = self.central_manager().ok_or(ScanError::NoCentral)?;
        central.stop_scan().await?;
        self.set_scanning(false);
        info!("Scan stopped: {} peripheral(s) known", self.peripheral_count());
        Ok(())
    }

    pub async fn connect(&self, id: &PeripheralId) -> Result<()> {
        let central = self.central_manager().ok_or(ScanError::NoCentral)?;
        if self.peripheral(id).is_none() {
            return Err(ScanError::UnknownPeripheral(id.clone()));
        }

        self.set_connection(id, ConnectionState::Connecting);
        if let Err(e) = central.connect(id).await {
            self.set_connection(id, ConnectionState::Disconnected);
            return Err(e);
        }
        Ok(())
    }

    pub async fn disconnect(&self, id: &PeripheralId) -> Result<()> {
        let central = self.central_manager().ok_or(ScanError::NoCentral)?;
        let Some(peripheral) = self.peripheral(id) else {
            return Err(ScanError::UnknownPeripheral(id.clone()));
        };
        if peripheral.connection == ConnectionState::Disconnected {
            return Ok(());
        }

        self.set_connection(id, ConnectionState::Disconnecting);
        if let Err(e) = central.disconnect(id).await {
            self.set_connection(id, peripheral.connection);
            return Err(e);
        }
        Ok(())
    }

    /// 消费 Central 事件流并分发给回调，直到事件流结束
    pub async fn run_events(&self) -> Result<()> {
        let central = self.central_manager().ok_or(ScanError::NoCentral)?;

        // 事件流建立前的状态不会再以事件形式到达
        self.central_did_update_state(central.state().await);

        let mut events = central.events().await?;
        while let Some(event) = events.next().await {
            if !self.is_current(&central) {
                debug!("Central replaced, leaving its event stream");
                return Ok(());
            }
            trace!("Central event: {:?}", event);
            delegate::dispatch(event, self, self);
        }

        debug!("Central event stream ended");
        if self.is_current(&central) {
            self.set_scanning(false);
        }
        Ok(())
    }
}

impl CentralManagerDelegate for BleScanner {
    fn central_did_update_state(&self, state: CentralState) {
        info!("Central state: {}", state);
        self.emit(ScannerEvent::CentralStateChanged(state));
        if !state.is_powered_on() {
            self.set_scanning(false);
        }
    }

    fn did_discover_peripheral(&self, advertisement: Advertisement) {
        let options = self
            .scan_options
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let id = advertisement.id.clone();

        let mut peripherals = self
            .peripherals
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = peripherals.get_mut(&id) {
            existing.merge_advertisement(advertisement);
            let snapshot = existing.clone();
            drop(peripherals);
            if options.allow_duplicates {
                self.emit(ScannerEvent::PeripheralUpdated(snapshot));
            }
            return;
        }

        if !self.is_scanning() || !options.matches(&advertisement) {
            return;
        }

        let peripheral = DiscoveredPeripheral::from_advertisement(advertisement);
        debug!(
            "Discovered peripheral: id={}, name='{}', rssi={:?}",
            id,
            peripheral.display_name(),
            peripheral.rssi
        );
        peripherals.insert(id, peripheral.clone());
        drop(peripherals);
        self.emit(ScannerEvent::PeripheralAdded(peripheral));
    }

    fn did_connect_peripheral(&self, id: &PeripheralId) {
        info!("Connected to {}", id);
        self.set_connection(id, ConnectionState::Connected);
    }

    fn did_fail_to_connect_peripheral(&self, id: &PeripheralId, reason: &str) {
        warn!("Failed to connect to {}: {}", id, reason);
        self.set_connection(id, ConnectionState::Disconnected);
    }

    fn did_disconnect_peripheral(&self, id: &PeripheralId) {
        info!("Disconnected from {}", id);
        self.set_connection(id, ConnectionState::Disconnected);
    }
}

impl PeripheralDelegate for BleScanner {
    fn did_discover_services(&self, id: &PeripheralId, services: &[Uuid]) {
        debug!("{}: {} service(s)", id, services.len());
        let updated = self.update_peripheral(id, |p| {
            for uuid in services {
                if !p.services.contains(uuid) {
                    p.services.push(*uuid);
                }
            }
        });
        if let Some(p) = updated {
            self.emit(ScannerEvent::PeripheralUpdated(p));
        }
    }

    fn did_update_value_for_characteristic(
        &self,
        id: &PeripheralId,
        characteristic: Uuid,
        value: &[u8],
    ) {
        trace!("{}: {} = {:02x?}", id, characteristic, value);
        let updated = self.update_peripheral(id, |p| {
            p.characteristic_values
                .insert(characteristic, value.to_vec());
        });
        if let Some(p) = updated {
            self.emit(ScannerEvent::PeripheralUpdated(p));
        }
    }
}
