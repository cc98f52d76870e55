use crate::core::{OutputBuffer, StreamFormat};
use crate::player::decoder::DecodedSource;
use crossbeam::atomic::AtomicCell;
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 未 prepare 时每次从源读取的帧数
const DEFAULT_CHUNK_FRAMES: usize = 1024;

/// 传输源播放状态变化的监听者
///
/// 可能在音频回调线程上被调用，此时音源锁仍被持有：
/// 实现不得阻塞、分配内存，也不得调用传输源的控制方法。
pub trait ChangeListener: Send + Sync {
    fn transport_changed(&self);
}

/// 基于有界通道的监听者
///
/// 通道容量为 1：连续的多次变化会合并成一次通知，
/// 接收方收到通知后应重新查询 `is_playing()`。
pub struct ChangeNotifier {
    tx: Sender<()>,
}

impl ChangeNotifier {
    pub fn channel() -> (Arc<Self>, Receiver<()>) {
        let (tx, rx) = bounded(1);
        (Arc::new(Self { tx }), rx)
    }
}

impl ChangeListener for ChangeNotifier {
    fn transport_changed(&self) {
        // 通道已满说明已有待处理的通知
        let _ = self.tx.try_send(());
    }
}

/// 传输源 - 持有当前解码流，按需产生音频块
///
/// 可以廉价克隆：所有克隆共享同一个内部状态，
/// 控制线程和音频回调各持有一份。
#[derive(Clone)]
pub struct TransportSource {
    shared: Arc<Shared>,
}

struct Shared {
    // 回调只 try_lock，控制线程持锁期间回调输出静音
    slot: Mutex<Option<ActiveSource>>,
    format: Mutex<Option<StreamFormat>>,
    prepared: AtomicBool,
    playing: AtomicBool,
    finished: AtomicBool,
    has_source: AtomicBool,
    gain: AtomicCell<f32>,
    position: AtomicCell<f64>,  // 秒
    length: AtomicCell<f64>,    // 秒
    listener: Option<Arc<dyn ChangeListener>>,
}

impl TransportSource {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// 创建带监听者的传输源，播放状态每次变化时都会通知它
    pub fn with_listener(listener: Arc<dyn ChangeListener>) -> Self {
        Self::build(Some(listener))
    }

    fn build(listener: Option<Arc<dyn ChangeListener>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(None),
                format: Mutex::new(None),
                prepared: AtomicBool::new(false),
                playing: AtomicBool::new(false),
                finished: AtomicBool::new(false),
                has_source: AtomicBool::new(false),
                gain: AtomicCell::new(1.0),
                position: AtomicCell::new(0.0),
                length: AtomicCell::new(0.0),
                listener,
            }),
        }
    }

    /// 配置输出格式，可重复调用
    pub fn prepare(&self, block_size: usize, sample_rate: u32) {
        let format = StreamFormat {
            sample_rate: sample_rate.max(1),
            block_size: block_size.max(1),
        };
        info!("🔧 传输源就绪: {} Hz, 块大小 {}", format.sample_rate, format.block_size);

        *self.shared.format.lock() = Some(format);
        if let Some(active) = self.shared.slot.lock().as_mut() {
            active.configure(Some(format));
        }
        self.shared.prepared.store(true, Ordering::Release);
    }

    /// 释放内部缓冲，已加载的音源保留
    pub fn release_resources(&self) {
        self.shared.prepared.store(false, Ordering::Release);
        *self.shared.format.lock() = None;
        if let Some(active) = self.shared.slot.lock().as_mut() {
            active.release();
        }
        debug!("传输源缓冲已释放");
    }

    pub fn is_prepared(&self) -> bool {
        self.shared.prepared.load(Ordering::Acquire)
    }

    /// 替换当前音源（None 表示卸载）
    ///
    /// 回调要么看到完整的旧源，要么看到完整的新源。旧源在离开锁之后才被销毁。
    /// 新源从头开始；若正在播放则先停止。
    pub fn set_source(&self, source: Option<Box<dyn DecodedSource>>) {
        let format = *self.shared.format.lock();
        let entry = source.map(|s| ActiveSource::new(s, format));
        let length = entry.as_ref().map(|e| e.length_seconds()).unwrap_or(0.0);
        let loaded = entry.is_some();

        let was_playing = self.shared.playing.swap(false, Ordering::AcqRel);
        let old = std::mem::replace(&mut *self.shared.slot.lock(), entry);

        self.shared.has_source.store(loaded, Ordering::Release);
        self.shared.finished.store(false, Ordering::Release);
        self.shared.position.store(0.0);
        self.shared.length.store(length);

        drop(old);

        if loaded {
            info!("🎵 音源已切换，时长 {:.2} 秒", length);
        } else {
            info!("音源已卸载");
        }

        if was_playing {
            self.notify();
        }
    }

    pub fn has_source(&self) -> bool {
        self.shared.has_source.load(Ordering::Acquire)
    }

    /// 开始播放（没有音源或已在播放时无操作）
    pub fn start(&self) {
        if !self.has_source() {
            debug!("没有音源，忽略 start");
            return;
        }
        if self.shared.playing.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.finished.store(false, Ordering::Release);
        info!("▶️ 传输源开始播放");
        self.notify();
    }

    /// 停止播放，位置保持不变
    pub fn stop(&self) {
        if self.shared.playing.swap(false, Ordering::AcqRel) {
            info!("⏹️ 传输源已停止");
            self.notify();
        }
    }

    pub fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::Acquire)
    }

    /// 音源是否已播放到末尾
    pub fn has_stream_finished(&self) -> bool {
        self.shared.finished.load(Ordering::Acquire)
    }

    /// Seek 到指定位置（秒），超出范围时钳制；失败时保持原位置
    pub fn set_position(&self, seconds: f64) {
        if !self.has_source() {
            return;
        }

        let mut slot = self.shared.slot.lock();
        let Some(active) = slot.as_mut() else {
            return;
        };

        let frame = active.frame_at(seconds);
        match active.seek(frame) {
            Ok(()) => {
                self.shared.position.store(active.position_seconds());
                self.shared.finished.store(false, Ordering::Release);
            }
            Err(e) => warn!("Seek 到 {:.3} 秒失败: {}", seconds, e),
        }
    }

    /// 当前播放位置（秒）
    pub fn current_position(&self) -> f64 {
        self.shared.position.load()
    }

    /// 当前音源时长（秒），没有音源时为 0
    pub fn length_in_seconds(&self) -> f64 {
        self.shared.length.load()
    }

    /// 设置输出增益 (0.0 - 1.0)
    pub fn set_gain(&self, gain: f32) {
        self.shared.gain.store(gain.clamp(0.0, 1.0));
    }

    pub fn gain(&self) -> f32 {
        self.shared.gain.load()
    }

    /// 填充下一块音频（实时路径）
    ///
    /// 不阻塞、不分配。没有音源、未就绪、未播放或已播完时输出静音。
    pub fn get_next_block(&self, buffer: &mut OutputBuffer<'_>) {
        let channels = buffer.channels();
        let data = buffer.data_mut();

        if !self.is_prepared() || !self.is_playing() {
            data.fill(0.0);
            return;
        }

        let Some(mut slot) = self.shared.slot.try_lock() else {
            data.fill(0.0);
            return;
        };
        let Some(active) = slot.as_mut() else {
            data.fill(0.0);
            return;
        };

        let ended = active.render(data, channels, self.shared.gain.load());
        self.shared.position.store(active.position_seconds());

        // 必须在持锁期间清除播放标志：set_source 换源也要拿这把锁，
        // 这样结束标记不会落到刚换上的新音源上
        if ended && self.shared.playing.swap(false, Ordering::AcqRel) {
            self.shared.finished.store(true, Ordering::Release);
            self.notify();
        }
        drop(slot);
    }

    fn notify(&self) {
        if let Some(listener) = &self.shared.listener {
            listener.transport_changed();
        }
    }
}

impl Default for TransportSource {
    fn default() -> Self {
        Self::new()
    }
}

/// 当前激活的音源，以及把它转换为输出格式所需的状态
///
/// 采样率转换使用线性插值：`current` 与 `next` 是相邻两帧，`frac` 是两者之间的位置。
struct ActiveSource {
    source: Box<dyn DecodedSource>,
    channels: usize,
    source_rate: f64,
    ratio: f64,             // 源采样率 / 输出采样率
    scratch: Vec<f32>,
    scratch_len: usize,
    scratch_pos: usize,
    current: Vec<f32>,
    next: Vec<f32>,
    current_valid: bool,
    next_valid: bool,
    frac: f64,
    frame: u64,             // current 对应的源帧号
}

impl ActiveSource {
    fn new(source: Box<dyn DecodedSource>, format: Option<StreamFormat>) -> Self {
        let channels = source.channels().max(1) as usize;
        let source_rate = source.sample_rate().max(1) as f64;
        let mut active = Self {
            source,
            channels,
            source_rate,
            ratio: 1.0,
            scratch: Vec::new(),
            scratch_len: 0,
            scratch_pos: 0,
            current: vec![0.0; channels],
            next: vec![0.0; channels],
            current_valid: false,
            next_valid: false,
            frac: 0.0,
            frame: 0,
        };
        active.set_format(format);
        // 新音源已在开头，直接读取，不需要 seek
        active.prime();
        active
    }

    /// 输出格式变化后调整转换比例和读取缓冲，并在当前位置重新填充
    fn configure(&mut self, format: Option<StreamFormat>) {
        self.set_format(format);
        let frame = self.frame;
        if let Err(e) = self.seek(frame) {
            warn!("重新定位音源失败: {}", e);
        }
    }

    fn set_format(&mut self, format: Option<StreamFormat>) {
        let (ratio, chunk_frames) = match format {
            Some(f) => (self.source_rate / f.sample_rate as f64, f.block_size.max(256)),
            None => (1.0, DEFAULT_CHUNK_FRAMES),
        };
        self.ratio = ratio;
        self.scratch = vec![0.0; chunk_frames * self.channels];
        self.scratch_len = 0;
        self.scratch_pos = 0;
    }

    fn release(&mut self) {
        self.scratch = Vec::new();
        self.scratch_len = 0;
        self.scratch_pos = 0;
    }

    fn length_seconds(&self) -> f64 {
        self.source
            .length_frames()
            .map(|frames| frames as f64 / self.source_rate)
            .unwrap_or(0.0)
    }

    fn position_seconds(&self) -> f64 {
        (self.frame as f64 + self.frac) / self.source_rate
    }

    fn frame_at(&self, seconds: f64) -> u64 {
        let frame = (seconds.max(0.0) * self.source_rate) as u64;
        match self.source.length_frames() {
            Some(len) => frame.min(len),
            None => frame,
        }
    }

    fn seek(&mut self, frame: u64) -> crate::core::Result<()> {
        self.source.seek(frame)?;
        self.frame = frame;
        self.scratch_len = 0;
        self.scratch_pos = 0;
        self.prime();
        Ok(())
    }

    /// 从源的当前读取位置填充 current / next
    fn prime(&mut self) {
        self.frac = 0.0;
        self.next_valid = self.pull_next();
        std::mem::swap(&mut self.current, &mut self.next);
        self.current_valid = self.next_valid;
        self.next_valid = self.pull_next();
    }

    /// 从源读取一帧到 `next`，源结束时填零并返回 false
    fn pull_next(&mut self) -> bool {
        if self.scratch_pos >= self.scratch_len {
            // 读取错误按流结束处理，实时路径没有错误通道
            let frames = self.source.read_frames(&mut self.scratch).unwrap_or(0);
            self.scratch_len = frames * self.channels;
            self.scratch_pos = 0;
            if frames == 0 {
                self.next.fill(0.0);
                return false;
            }
        }

        let end = self.scratch_pos + self.channels;
        self.next.copy_from_slice(&self.scratch[self.scratch_pos..end]);
        self.scratch_pos = end;
        true
    }

    fn advance(&mut self) {
        std::mem::swap(&mut self.current, &mut self.next);
        self.current_valid = self.next_valid;
        if self.current_valid {
            self.frame += 1;
            self.next_valid = self.pull_next();
        }
    }

    /// 渲染交错输出，返回音源是否已结束（剩余部分填充静音）
    fn render(&mut self, out: &mut [f32], out_channels: usize, gain: f32) -> bool {
        let out_channels = out_channels.max(1);
        let frames = out.len() / out_channels;

        for i in 0..frames {
            let start = i * out_channels;
            if !self.current_valid {
                out[start..].fill(0.0);
                return true;
            }

            let t = self.frac as f32;
            for (ch, sample) in out[start..start + out_channels].iter_mut().enumerate() {
                let src = if self.channels == 1 {
                    0
                } else if ch < self.channels {
                    ch
                } else {
                    *sample = 0.0;
                    continue;
                };
                let a = self.current[src];
                let b = self.next[src];
                *sample = (a + (b - a) * t) * gain;
            }

            self.frac += self.ratio;
            while self.frac >= 1.0 && self.current_valid {
                self.frac -= 1.0;
                self.advance();
            }
        }
        out[frames * out_channels..].fill(0.0);

        !self.current_valid
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::{PlayerError, Result};
    use crossbeam_channel::unbounded;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    pub(crate) enum Signal {
        Constant(f32),
        /// 样本值 = 帧号 + 声道号 * 1000
        Ramp,
    }

    /// 内存中的测试音源
    pub(crate) struct TestSource {
        sample_rate: u32,
        channels: u16,
        frames: Option<u64>,
        position: u64,
        signal: Signal,
        seekable: bool,
    }

    impl TestSource {
        pub(crate) fn constant(value: f32, frames: Option<u64>) -> Box<dyn DecodedSource> {
            Box::new(TestSource {
                sample_rate: 48000,
                channels: 2,
                frames,
                position: 0,
                signal: Signal::Constant(value),
                seekable: true,
            })
        }

        pub(crate) fn ramp(sample_rate: u32, channels: u16, frames: u64) -> Box<dyn DecodedSource> {
            Box::new(TestSource {
                sample_rate,
                channels,
                frames: Some(frames),
                position: 0,
                signal: Signal::Ramp,
                seekable: true,
            })
        }

        /// 只能顺序读取的单声道 ramp
        fn unseekable_ramp(sample_rate: u32, frames: u64) -> Box<dyn DecodedSource> {
            Box::new(TestSource {
                sample_rate,
                channels: 1,
                frames: Some(frames),
                position: 0,
                signal: Signal::Ramp,
                seekable: false,
            })
        }

        fn value(&self, frame: u64, ch: usize) -> f32 {
            match self.signal {
                Signal::Constant(v) => v,
                Signal::Ramp => frame as f32 + ch as f32 * 1000.0,
            }
        }
    }

    impl DecodedSource for TestSource {
        fn sample_rate(&self) -> u32 {
            self.sample_rate
        }

        fn channels(&self) -> u16 {
            self.channels
        }

        fn length_frames(&self) -> Option<u64> {
            self.frames
        }

        fn read_frames(&mut self, out: &mut [f32]) -> Result<usize> {
            let channels = self.channels as usize;
            let mut frames = out.len() / channels;
            if let Some(total) = self.frames {
                frames = frames.min(total.saturating_sub(self.position) as usize);
            }
            for i in 0..frames {
                for ch in 0..channels {
                    out[i * channels + ch] = self.value(self.position + i as u64, ch);
                }
            }
            self.position += frames as u64;
            Ok(frames)
        }

        fn seek(&mut self, frame: u64) -> Result<()> {
            if !self.seekable {
                return Err(PlayerError::Decode("stream is not seekable".to_string()));
            }
            self.position = frame;
            Ok(())
        }

        fn format_name(&self) -> &'static str {
            "test"
        }
    }

    #[derive(Default)]
    struct CountingListener {
        calls: AtomicUsize,
    }

    impl ChangeListener for CountingListener {
        fn transport_changed(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// 通知时先报告进入，再停顿一段时间才返回
    struct SlowListener {
        entered: Sender<()>,
        done: AtomicBool,
    }

    impl ChangeListener for SlowListener {
        fn transport_changed(&self) {
            let _ = self.entered.send(());
            thread::sleep(Duration::from_millis(50));
            self.done.store(true, Ordering::SeqCst);
        }
    }

    fn render(transport: &TransportSource, frames: usize, channels: usize) -> Vec<f32> {
        let mut data = vec![1.0f32; frames * channels];
        transport.get_next_block(&mut OutputBuffer::new(&mut data, channels));
        data
    }

    #[test]
    fn test_silence_without_source() {
        let transport = TransportSource::new();
        transport.prepare(512, 48000);
        for frames in [0, 1, 7, 512, 4096] {
            assert!(render(&transport, frames, 2).iter().all(|&s| s == 0.0));
        }

        transport.start();
        assert!(!transport.is_playing());
        assert!(render(&transport, 64, 2).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_silence_when_not_playing_or_not_prepared() {
        let transport = TransportSource::new();
        transport.set_source(Some(TestSource::constant(0.25, None)));
        transport.start();
        // 未 prepare
        assert!(render(&transport, 64, 2).iter().all(|&s| s == 0.0));

        transport.prepare(64, 48000);
        assert!(render(&transport, 64, 2).iter().all(|&s| s == 0.25));

        transport.stop();
        assert!(render(&transport, 64, 2).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_start_stop_notify_on_change_only() {
        let listener = Arc::new(CountingListener::default());
        let transport = TransportSource::with_listener(listener.clone());
        transport.prepare(256, 48000);

        transport.start();
        transport.stop();
        assert_eq!(listener.calls.load(Ordering::SeqCst), 0);

        transport.set_source(Some(TestSource::constant(0.25, None)));
        transport.start();
        transport.start();
        assert!(transport.is_playing());
        assert_eq!(listener.calls.load(Ordering::SeqCst), 1);

        transport.stop();
        transport.stop();
        assert!(!transport.is_playing());
        assert_eq!(listener.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_stop_keeps_position() {
        let transport = TransportSource::new();
        transport.prepare(100, 1000);
        transport.set_source(Some(TestSource::ramp(1000, 1, 10_000)));
        transport.start();
        render(&transport, 500, 1);
        transport.stop();
        assert!((transport.current_position() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_end_of_stream_pads_and_notifies() {
        let listener = Arc::new(CountingListener::default());
        let transport = TransportSource::with_listener(listener.clone());
        transport.prepare(8, 1000);
        transport.set_source(Some(TestSource::ramp(1000, 1, 3)));
        transport.start();

        let block = render(&transport, 6, 1);
        assert_eq!(block, vec![0.0, 1.0, 2.0, 0.0, 0.0, 0.0]);
        assert!(!transport.is_playing());
        assert!(transport.has_stream_finished());
        assert_eq!(listener.calls.load(Ordering::SeqCst), 2);

        // 重新 seek 后可以再次播放
        transport.set_position(0.0);
        assert!(!transport.has_stream_finished());
        transport.start();
        assert_eq!(render(&transport, 2, 1), vec![0.0, 1.0]);
    }

    #[test]
    fn test_end_of_stream_settles_before_next_swap() {
        let (entered, entered_rx) = unbounded();
        let listener = Arc::new(SlowListener { entered, done: AtomicBool::new(false) });
        let transport = TransportSource::with_listener(listener.clone());
        transport.prepare(8, 1000);
        transport.set_source(Some(TestSource::ramp(1000, 1, 3)));
        transport.start();
        entered_rx.recv().unwrap();
        listener.done.store(false, Ordering::SeqCst);

        let renderer = {
            let transport = transport.clone();
            thread::spawn(move || render(&transport, 8, 1))
        };

        // 回调正在处理流结束时换源，换源必须等它处理完
        entered_rx.recv().unwrap();
        transport.set_source(Some(TestSource::constant(0.25, None)));
        assert!(listener.done.load(Ordering::SeqCst));
        transport.start();
        renderer.join().unwrap();

        assert!(transport.is_playing());
        assert!(!transport.has_stream_finished());
        assert!(render(&transport, 4, 2).iter().all(|&s| s == 0.25));
    }

    #[test]
    fn test_unseekable_source_plays_from_start() {
        let transport = TransportSource::new();
        transport.prepare(16, 1000);
        transport.set_source(Some(TestSource::unseekable_ramp(1000, 100)));
        transport.start();
        assert_eq!(render(&transport, 3, 1), vec![0.0, 1.0, 2.0]);

        // seek 失败时保持原位置继续播放
        transport.set_position(0.5);
        assert_eq!(transport.current_position(), 0.003);
        assert_eq!(render(&transport, 2, 1), vec![3.0, 4.0]);
        assert!(transport.is_playing());
    }

    #[test]
    fn test_set_source_resets_position_and_stops() {
        let listener = Arc::new(CountingListener::default());
        let transport = TransportSource::with_listener(listener.clone());
        transport.prepare(16, 1000);
        transport.set_source(Some(TestSource::ramp(1000, 1, 1000)));
        transport.start();
        render(&transport, 100, 1);
        assert!(transport.current_position() > 0.0);

        transport.set_source(Some(TestSource::ramp(1000, 1, 2000)));
        assert!(!transport.is_playing());
        assert_eq!(transport.current_position(), 0.0);
        assert_eq!(transport.length_in_seconds(), 2.0);
        assert_eq!(listener.calls.load(Ordering::SeqCst), 2);

        transport.start();
        assert_eq!(render(&transport, 3, 1), vec![0.0, 1.0, 2.0]);

        transport.set_source(None);
        assert!(!transport.has_source());
        assert_eq!(transport.length_in_seconds(), 0.0);
    }

    #[test]
    fn test_set_position_is_clamped_and_ignored_without_source() {
        let transport = TransportSource::new();
        transport.prepare(16, 1000);
        transport.set_position(3.0);
        assert_eq!(transport.current_position(), 0.0);

        transport.set_source(Some(TestSource::ramp(1000, 1, 1000)));
        transport.set_position(0.25);
        assert_eq!(transport.current_position(), 0.25);
        transport.start();
        assert_eq!(render(&transport, 2, 1), vec![250.0, 251.0]);

        transport.set_position(-4.0);
        assert_eq!(transport.current_position(), 0.0);
        transport.set_position(99.0);
        assert_eq!(transport.current_position(), 1.0);
    }

    #[test]
    fn test_resamples_by_linear_interpolation() {
        let transport = TransportSource::new();
        // 源 1000 Hz -> 输出 2000 Hz，每个源帧之间插入一个中点
        transport.prepare(16, 2000);
        transport.set_source(Some(TestSource::ramp(1000, 1, 100)));
        transport.start();
        assert_eq!(render(&transport, 5, 1), vec![0.0, 0.5, 1.0, 1.5, 2.0]);

        // 输出 500 Hz，每隔一帧取一帧
        transport.prepare(16, 500);
        transport.set_position(0.0);
        assert_eq!(render(&transport, 3, 1), vec![0.0, 2.0, 4.0]);
    }

    #[test]
    fn test_channel_mapping_and_gain() {
        let transport = TransportSource::new();
        transport.prepare(16, 1000);

        // 单声道复制到所有输出声道
        transport.set_source(Some(TestSource::ramp(1000, 1, 100)));
        transport.start();
        assert_eq!(render(&transport, 2, 3), vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);

        // 立体声输出到三声道，多出的声道静音
        transport.set_source(Some(TestSource::ramp(1000, 2, 100)));
        transport.start();
        assert_eq!(render(&transport, 1, 3), vec![0.0, 1000.0, 0.0]);

        // 立体声输出到单声道只取左声道
        transport.set_gain(0.5);
        assert_eq!(render(&transport, 1, 1), vec![0.5]);

        transport.set_gain(7.0);
        assert_eq!(transport.gain(), 1.0);
    }

    #[test]
    fn test_release_then_prepare_again() {
        let transport = TransportSource::new();
        transport.prepare(16, 1000);
        transport.set_source(Some(TestSource::ramp(1000, 1, 100)));
        transport.start();
        assert_eq!(render(&transport, 2, 1), vec![0.0, 1.0]);

        transport.release_resources();
        assert!(!transport.is_prepared());
        assert!(render(&transport, 2, 1).iter().all(|&s| s == 0.0));

        transport.prepare(32, 1000);
        assert!(transport.has_source());
        assert_eq!(render(&transport, 2, 1), vec![2.0, 3.0]);
    }

    #[test]
    fn test_swap_is_atomic_for_concurrent_render() {
        let transport = TransportSource::new();
        transport.prepare(256, 48000);
        transport.set_source(Some(TestSource::constant(0.25, None)));
        transport.start();

        let done = Arc::new(AtomicBool::new(false));
        let renderer = {
            let transport = transport.clone();
            let done = done.clone();
            thread::spawn(move || {
                let mut data = vec![0.0f32; 256 * 2];
                let mut blocks = 0usize;
                while !done.load(Ordering::SeqCst) {
                    transport.get_next_block(&mut OutputBuffer::new(&mut data, 2));
                    let first = data[0];
                    assert!(
                        data.iter().all(|&s| s == first),
                        "block mixes samples from two sources"
                    );
                    assert!(first == 0.0 || first == 0.25 || first == -0.5);
                    blocks += 1;
                }
                blocks
            })
        };

        for i in 0..200 {
            let value = if i % 2 == 0 { -0.5 } else { 0.25 };
            transport.set_source(Some(TestSource::constant(value, None)));
            transport.start();
            thread::yield_now();
        }
        done.store(true, Ordering::SeqCst);

        assert!(renderer.join().unwrap() > 0);
    }
}
