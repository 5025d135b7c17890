pub mod central;
pub mod delegate;
pub mod peripheral;
pub mod platform;
pub mod scanner;

#[cfg(test)]
pub(crate) mod mock;

pub use central::{CentralEvent, CentralManager, CentralState, ScanOptions};
pub use delegate::{CentralManagerDelegate, PeripheralDelegate};
pub use peripheral::{Advertisement, ConnectionState, DiscoveredPeripheral, PeripheralId};
pub use platform::BtleplugCentral;
pub use scanner::{BleScanner, ScannerEvent};
