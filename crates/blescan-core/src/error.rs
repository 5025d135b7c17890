//! 扫描器错误类型

use crate::ble::{CentralState, PeripheralId};

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("No Bluetooth adapters found")]
    NoAdapter,

    #[error("No central manager attached")]
    NoCentral,

    #[error("Central is not powered on (state: {0})")]
    NotPoweredOn(CentralState),

    #[error("Unknown peripheral: {0}")]
    UnknownPeripheral(PeripheralId),

    #[error("Platform error: {0}")]
    Platform(#[from] btleplug::Error),

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T, E = ScanError> = std::result::Result<T, E>;
