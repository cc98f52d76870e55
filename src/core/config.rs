use crate::core::{PlayerError, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 播放器配置（JSON 文件）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// 期望的输出采样率，None 表示使用设备默认值
    pub sample_rate: Option<u32>,
    /// 期望的回调块大小（帧），None 表示由设备决定
    pub block_size: Option<u32>,
    /// 输出声道数
    pub channels: u16,
    /// 初始音量 0.0 - 1.0
    pub volume: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            sample_rate: None,
            block_size: None,
            channels: 2,
            volume: 1.0,
        }
    }
}

impl PlayerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        info!("已加载配置: {}", path.display());
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let mut config: PlayerConfig =
            serde_json::from_str(text).map_err(|e| PlayerError::Config(e.to_string()))?;

        if config.channels == 0 {
            return Err(PlayerError::Config("channels 不能为 0".to_string()));
        }
        config.volume = config.volume.clamp(0.0, 1.0);
        Ok(config)
    }
}
