use crate::core::{ControlFlags, PlayerError, Result, SourceInfo, TransportState};
use crate::player::{AudioCallback, ChangeNotifier, FormatManager, TransportSource};
use crossbeam_channel::Receiver;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

type StateListener = Box<dyn FnMut(TransportState) + Send>;

/// 播放管理器 - 传输状态机
///
/// 所有状态变化都经过 `change_state`。Starting / Stopping 是过渡状态，
/// 由传输源的变化通知（引擎确认）推进到 Playing / Stopped。
pub struct PlaybackManager {
    state: TransportState,
    transport: TransportSource,
    formats: FormatManager,
    changes: Receiver<()>,
    listeners: Vec<StateListener>,
    source_info: Option<SourceInfo>,
}

impl PlaybackManager {
    pub fn new() -> Self {
        Self::with_formats(FormatManager::with_default_formats())
    }

    pub fn with_formats(formats: FormatManager) -> Self {
        let (notifier, changes) = ChangeNotifier::channel();
        info!("🎮 创建播放管理器，已注册 {} 种格式", formats.len());
        Self {
            state: TransportState::Stopped,
            transport: TransportSource::with_listener(notifier),
            formats,
            changes,
            listeners: Vec::new(),
            source_info: None,
        }
    }

    pub fn transport(&self) -> &TransportSource {
        &self.transport
    }

    /// 交给设备层的回调适配器
    pub fn audio_callback(&self) -> AudioCallback {
        AudioCallback::new(self.transport.clone())
    }

    pub fn formats(&self) -> &FormatManager {
        &self.formats
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    /// 按钮状态，由当前状态推导
    pub fn controls(&self) -> ControlFlags {
        ControlFlags::derive(self.state, self.transport.has_source())
    }

    /// 订阅状态变化，回调参数为新状态
    pub fn on_state_changed<F>(&mut self, listener: F)
    where
        F: FnMut(TransportState) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// 打开音频文件
    ///
    /// 成功后新音源替换旧音源并强制回到 Stopped，监听者总会收到一次 Stopped；
    /// 失败时状态和音源都不变。
    pub fn open_file<P: AsRef<Path>>(&mut self, path: P) -> Result<SourceInfo> {
        let path = path.as_ref();
        if !self.transport.is_prepared() {
            warn!("设备尚未就绪，拒绝打开: {}", path.display());
            return Err(PlayerError::NotReady);
        }

        let source = self.formats.resolve(path)?;
        let sample_rate = source.sample_rate();
        let info = SourceInfo {
            path: path.to_path_buf(),
            format: source.format_name().to_string(),
            sample_rate,
            channels: source.channels(),
            length: source
                .length_frames()
                .map(|frames| frames as f64 / sample_rate.max(1) as f64)
                .unwrap_or(0.0),
        };

        self.transport.set_source(Some(source));
        self.source_info = Some(info.clone());
        info!(
            "✅ 已打开 {} ({}, {} Hz, {} 声道, {:.2} 秒)",
            path.display(),
            info.format,
            info.sample_rate,
            info.channels,
            info.length
        );

        if self.state == TransportState::Stopped {
            // 状态没变，但按钮可用性变了
            self.notify_listeners();
        } else {
            self.change_state(TransportState::Stopped);
        }
        Ok(info)
    }

    /// 播放：仅在 Stopped、已加载音源且设备就绪时有效
    pub fn play(&mut self) {
        if self.state != TransportState::Stopped
            || !self.transport.has_source()
            || !self.transport.is_prepared()
        {
            debug!("忽略 play（当前状态 {:?}）", self.state);
            return;
        }
        self.change_state(TransportState::Starting);
    }

    /// 停止：仅在 Playing 时有效
    pub fn stop(&mut self) {
        if self.state != TransportState::Playing {
            debug!("忽略 stop（当前状态 {:?}）", self.state);
            return;
        }
        self.change_state(TransportState::Stopping);
    }

    /// Seek（秒）
    pub fn seek(&mut self, seconds: f64) {
        self.transport.set_position(seconds);
    }

    /// 设置音量 (0.0 - 1.0)
    pub fn set_volume(&self, volume: f32) {
        self.transport.set_gain(volume);
    }

    pub fn volume(&self) -> f32 {
        self.transport.gain()
    }

    /// 当前位置（秒）
    pub fn position(&self) -> f64 {
        self.transport.current_position()
    }

    /// 音源时长（秒）
    pub fn length(&self) -> f64 {
        self.transport.length_in_seconds()
    }

    pub fn source_info(&self) -> Option<&SourceInfo> {
        self.source_info.as_ref()
    }

    pub fn current_file(&self) -> Option<PathBuf> {
        self.source_info.as_ref().map(|info| info.path.clone())
    }

    /// 传输源变化通知的接收端，界面层可以在事件循环里 select 它
    pub fn change_events(&self) -> &Receiver<()> {
        &self.changes
    }

    /// 处理所有待处理的变化通知，返回处理的数量
    pub fn process_pending_changes(&mut self) -> usize {
        let mut handled = 0;
        while self.changes.try_recv().is_ok() {
            self.handle_transport_change();
            handled += 1;
        }
        handled
    }

    /// 引擎确认：根据传输源的实际状态推进状态机
    pub fn handle_transport_change(&mut self) {
        if self.transport.is_playing() {
            self.change_state(TransportState::Playing);
        } else {
            self.change_state(TransportState::Stopped);
        }
    }

    /// 唯一的状态修改入口，相同状态之间不做任何事
    fn change_state(&mut self, new_state: TransportState) {
        if self.state == new_state {
            return;
        }

        info!("状态切换: {:?} -> {:?}", self.state, new_state);
        self.state = new_state;

        match new_state {
            TransportState::Stopped => self.transport.set_position(0.0),
            TransportState::Starting => self.transport.start(),
            TransportState::Playing => {}
            TransportState::Stopping => self.transport.stop(),
        }

        self.notify_listeners();
    }

    fn notify_listeners(&mut self) {
        let state = self.state;
        for listener in self.listeners.iter_mut() {
            listener(state);
        }
    }
}

impl Default for PlaybackManager {
    fn default() -> Self {
        Self::new()
    }
}
