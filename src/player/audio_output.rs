use crate::core::{OutputBuffer, PlayerConfig, PlayerError, Result, StreamFormat};
use crate::player::AudioCallback;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BufferSize, Device, FromSample, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig,
    SupportedBufferSize, SupportedStreamConfig, SupportedStreamConfigRange,
};
use log::{debug, error, info, warn};

/// 设备未给出固定块大小时用于 prepare 的估计值
const DEFAULT_BLOCK_SIZE: usize = 512;

/// 音频输出 - 使用 cpal 驱动回调适配器
pub struct AudioOutput {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    block_size: usize,
    stream: Option<Stream>,
    callback: AudioCallback,
}

impl AudioOutput {
    /// 打开默认输出设备（不支持请求的配置时回退到设备默认配置）
    pub fn new(settings: &PlayerConfig, callback: AudioCallback) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlayerError::AudioError("无法找到音频输出设备".to_string()))?;

        debug!("使用音频设备: {}", device.name().unwrap_or_default());

        let supported = Self::negotiate(&device, settings)?;
        let sample_format = supported.sample_format();
        let mut config = supported.config();

        let block_size = match settings.block_size {
            Some(frames) if Self::is_block_size_supported(frames, supported.buffer_size()) => {
                config.buffer_size = BufferSize::Fixed(frames);
                frames as usize
            }
            Some(frames) => {
                warn!("⚠️  设备不支持块大小 {}，使用设备默认值", frames);
                DEFAULT_BLOCK_SIZE
            }
            None => DEFAULT_BLOCK_SIZE,
        };

        info!(
            "初始化音频输出: {} Hz, {} 声道, {:?}",
            config.sample_rate.0, config.channels, sample_format
        );

        Ok(Self {
            device,
            config,
            sample_format,
            block_size,
            stream: None,
            callback,
        })
    }

    /// 选择设备配置：优先请求的采样率和声道数，再优先 f32 样本
    fn negotiate(device: &Device, settings: &PlayerConfig) -> Result<SupportedStreamConfig> {
        let default = device
            .default_output_config()
            .map_err(|e| PlayerError::AudioError(format!("无法获取默认音频配置: {}", e)))?;

        let wanted = StreamConfig {
            channels: settings.channels,
            sample_rate: SampleRate(settings.sample_rate.unwrap_or(default.sample_rate().0)),
            buffer_size: BufferSize::Default,
        };

        let ranges: Vec<SupportedStreamConfigRange> = device
            .supported_output_configs()
            .map_err(|e| PlayerError::AudioError(format!("无法获取支持的音频配置: {}", e)))?
            .filter(|range| Self::is_config_compatible(&wanted, range))
            .collect();

        let chosen = ranges
            .iter()
            .find(|range| range.sample_format() == SampleFormat::F32)
            .or_else(|| ranges.first());

        match chosen {
            Some(range) => Ok(range.clone().with_sample_rate(wanted.sample_rate)),
            None => {
                warn!(
                    "⚠️  音频设备不支持 {} Hz, {} 声道配置，回退到默认配置 ({} Hz, {} 声道)",
                    wanted.sample_rate.0,
                    wanted.channels,
                    default.sample_rate().0,
                    default.channels()
                );
                Ok(default)
            }
        }
    }

    /// 检查配置是否兼容
    fn is_config_compatible(config: &StreamConfig, supported: &SupportedStreamConfigRange) -> bool {
        let rate_in_range = config.sample_rate.0 >= supported.min_sample_rate().0
            && config.sample_rate.0 <= supported.max_sample_rate().0;

        let channels_match = config.channels == supported.channels();

        rate_in_range && channels_match
    }

    fn is_block_size_supported(frames: u32, supported: &SupportedBufferSize) -> bool {
        match supported {
            SupportedBufferSize::Range { min, max } => frames >= *min && frames <= *max,
            SupportedBufferSize::Unknown => false,
        }
    }

    /// 开始输出：先调用 prepare 钩子，再启动设备流
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        self.callback.prepare(StreamFormat {
            sample_rate: self.config.sample_rate.0,
            block_size: self.block_size,
        });

        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_f32_stream()?,
            SampleFormat::I16 => self.build_converting_stream::<i16>()?,
            SampleFormat::U16 => self.build_converting_stream::<u16>()?,
            format => {
                self.callback.release();
                return Err(PlayerError::AudioError(format!("不支持的样本格式: {:?}", format)));
            }
        };

        stream
            .play()
            .map_err(|e| PlayerError::AudioError(format!("启动音频流失败: {}", e)))?;

        self.stream = Some(stream);
        info!("🔊 音频输出已启动");

        Ok(())
    }

    fn build_f32_stream(&self) -> Result<Stream> {
        let callback = self.callback.clone();
        let channels = self.config.channels as usize;

        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    callback.render(&mut OutputBuffer::new(data, channels));
                },
                move |err| {
                    error!("音频流错误: {}", err);
                },
                None,
            )
            .map_err(|e| PlayerError::AudioError(format!("创建音频流失败: {}", e)))
    }

    /// 非 f32 设备：先渲染到预分配的 f32 缓冲再转换
    fn build_converting_stream<T>(&self) -> Result<Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let callback = self.callback.clone();
        let channels = self.config.channels.max(1) as usize;
        let mut scratch = vec![0.0f32; self.block_size.max(1) * channels];

        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    for out in data.chunks_mut(scratch.len()) {
                        let buf = &mut scratch[..out.len()];
                        callback.render(&mut OutputBuffer::new(buf, channels));
                        for (dst, &src) in out.iter_mut().zip(buf.iter()) {
                            *dst = T::from_sample(src);
                        }
                    }
                },
                move |err| {
                    error!("音频流错误: {}", err);
                },
                None,
            )
            .map_err(|e| PlayerError::AudioError(format!("创建音频流失败: {}", e)))
    }

    /// 停止输出并调用 release 钩子
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            self.callback.release();
            info!("音频输出已停止");
        }
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}
