//! 测试用的内存 Central

use crate::ble::{
    BleScanner, CentralEvent, CentralManager, CentralState, PeripheralId, ScanOptions,
};
use crate::error::Result;
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub(crate) struct MockCentral {
    state: CentralState,
    events: Mutex<Vec<CentralEvent>>,
    connects: Mutex<Vec<PeripheralId>>,
    scan_starts: AtomicUsize,
    scan_stops: AtomicUsize,
    fail_scan: AtomicBool,
    fail_connect: AtomicBool,
    fail_disconnect: AtomicBool,
    replace_with: Mutex<Option<(Arc<BleScanner>, Arc<dyn CentralManager>)>>,
}

impl MockCentral {
    pub(crate) fn new(state: CentralState) -> Self {
        Self {
            state,
            events: Mutex::new(Vec::new()),
            connects: Mutex::new(Vec::new()),
            scan_starts: AtomicUsize::new(0),
            scan_stops: AtomicUsize::new(0),
            fail_scan: AtomicBool::new(false),
            fail_connect: AtomicBool::new(false),
            fail_disconnect: AtomicBool::new(false),
            replace_with: Mutex::new(None),
        }
    }

    /// 排队一个事件，下次 `events()` 时按顺序回放
    pub(crate) fn push_event(&self, event: CentralEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub(crate) fn fail_scan(&self) {
        self.fail_scan.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_connect(&self) {
        self.fail_connect.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_disconnect(&self) {
        self.fail_disconnect.store(true, Ordering::SeqCst);
    }

    /// 事件流开始时先把扫描器切换到 `next` 并在其上重新扫描，再回放排队的事件
    pub(crate) fn replace_on_events(&self, scanner: Arc<BleScanner>, next: Arc<MockCentral>) {
        let next: Arc<dyn CentralManager> = next;
        *self.replace_with.lock().unwrap() = Some((scanner, next));
    }

    pub(crate) fn scan_starts(&self) -> usize {
        self.scan_starts.load(Ordering::SeqCst)
    }

    pub(crate) fn scan_stops(&self) -> usize {
        self.scan_stops.load(Ordering::SeqCst)
    }

    pub(crate) fn connects(&self) -> Vec<PeripheralId> {
        self.connects.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl CentralManager for MockCentral {
    async fn state(&self) -> CentralState {
        self.state
    }

    async fn start_scan(&self, _options: &ScanOptions) -> Result<()> {
        // 让并发调用者有机会交错执行
        tokio::task::yield_now().await;
        if self.fail_scan.load(Ordering::SeqCst) {
            return Err(btleplug::Error::RuntimeError("scan rejected".to_string()).into());
        }
        self.scan_starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.scan_stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn events(&self) -> Result<BoxStream<'static, CentralEvent>> {
        let events = std::mem::take(&mut *self.events.lock().unwrap());
        let replace = self.replace_with.lock().unwrap().take();

        let prelude = stream::iter(replace)
            .then(|(scanner, next)| async move {
                scanner.set_central_manager(next).await;
                let _ = scanner.start_scan(ScanOptions::default()).await;
            })
            .filter_map(|()| async { None::<CentralEvent> });

        Ok(prelude.chain(stream::iter(events)).boxed())
    }

    async fn connect(&self, id: &PeripheralId) -> Result<()> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(btleplug::Error::NotConnected.into());
        }
        self.connects.lock().unwrap().push(id.clone());
        Ok(())
    }

    async fn disconnect(&self, _id: &PeripheralId) -> Result<()> {
        if self.fail_disconnect.load(Ordering::SeqCst) {
            return Err(btleplug::Error::NotConnected.into());
        }
        Ok(())
    }
}
