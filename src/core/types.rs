use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 传输状态
///
/// Starting / Stopping 是过渡状态：等待引擎确认后才会离开
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportState {
    Stopped,
    Starting,
    Playing,
    Stopping,
}

impl TransportState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportState::Stopped => "stopped",
            TransportState::Starting => "starting",
            TransportState::Playing => "playing",
            TransportState::Stopping => "stopping",
        }
    }
}

impl Default for TransportState {
    fn default() -> Self {
        TransportState::Stopped
    }
}

/// 按钮可用状态（由传输状态推导，不单独保存）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFlags {
    pub play_enabled: bool,
    pub stop_enabled: bool,
}

impl ControlFlags {
    /// 根据当前状态和是否已加载音源推导按钮状态
    pub fn derive(state: TransportState, source_loaded: bool) -> Self {
        match state {
            TransportState::Stopped => Self {
                play_enabled: source_loaded,
                stop_enabled: false,
            },
            TransportState::Starting => Self {
                play_enabled: false,
                stop_enabled: false,
            },
            TransportState::Playing | TransportState::Stopping => Self {
                play_enabled: false,
                stop_enabled: true,
            },
        }
    }
}

/// 设备协商后的输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub block_size: usize,
}

/// 音频回调的输出缓冲（交错 f32）
pub struct OutputBuffer<'a> {
    data: &'a mut [f32],
    channels: usize,
}

impl<'a> OutputBuffer<'a> {
    pub fn new(data: &'a mut [f32], channels: usize) -> Self {
        Self {
            data,
            channels: channels.max(1),
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut *self.data
    }

    /// 整块填充静音
    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }
}

/// 已加载音源的信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInfo {
    pub path: PathBuf,
    pub format: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub length: f64,            // 总时长（秒）
}
