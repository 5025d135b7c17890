//! 扫描配置和持久化
//!
//! 服务过滤、重复广播上报、默认扫描时长等设置的存储和读取。

use crate::ble::ScanOptions;
use crate::error::{Result, ScanError};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// 扫描设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// 只关注广播了这些服务的外设，空表示全部
    pub service_filter: Vec<Uuid>,
    /// 是否上报同一外设的重复广播
    pub allow_duplicates: bool,
    /// 默认扫描时长（秒）
    pub scan_timeout_secs: u64,
    /// 详细日志模式
    pub verbose: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            service_filter: Vec::new(),
            allow_duplicates: false,
            scan_timeout_secs: 10,
            verbose: false,
        }
    }
}

impl ScanSettings {
    /// 获取配置文件路径
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("blescan")
            .join("settings.toml")
    }

    /// 加载设置（如果文件不存在则使用默认值）
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(settings) => {
                        debug!("Loaded settings from {:?}", path);
                        return settings;
                    }
                    Err(e) => {
                        log::warn!("Failed to parse settings: {}, using defaults", e);
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read settings file: {}, using defaults", e);
                }
            }
        }
        Self::default()
    }

    /// 保存设置
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ScanError::Config(e.to_string()))?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ScanError::Config(e.to_string()))?;
        fs::write(path, content).map_err(|e| ScanError::Config(e.to_string()))?;
        debug!("Saved settings to {:?}", path);
        Ok(())
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            services: self.service_filter.clone(),
            allow_duplicates: self.allow_duplicates,
        }
    }
}
