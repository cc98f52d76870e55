use crate::core::{OutputBuffer, StreamFormat};
use crate::player::TransportSource;

/// 音频回调适配器 - 把设备回调接到传输源上
///
/// 除了对传输源的引用之外没有自己的状态。
#[derive(Clone)]
pub struct AudioCallback {
    transport: TransportSource,
}

impl AudioCallback {
    pub fn new(transport: TransportSource) -> Self {
        Self { transport }
    }

    /// 第一次回调之前由设备层调用
    pub fn prepare(&self, format: StreamFormat) {
        self.transport.prepare(format.block_size, format.sample_rate);
    }

    /// 设备关闭时调用
    pub fn release(&self) {
        self.transport.release_resources();
    }

    /// 渲染一块音频，在设备回调线程上运行
    pub fn render(&self, buffer: &mut OutputBuffer<'_>) {
        if !self.transport.has_source() {
            buffer.clear();
            return;
        }
        self.transport.get_next_block(buffer);
    }
}
