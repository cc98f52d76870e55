use crate::core::{PlayerError, Result};
use crate::player::format_manager::AudioFormat;
use hound::{SampleFormat, WavReader};
use log::{debug, warn};
use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// 已解码的音频流
///
/// 样本统一为交错 f32。实现者由传输源独占持有，
/// 同一时刻只会被音频回调或传输源的控制方法之一访问。
pub trait DecodedSource: Send {
    /// 源采样率
    fn sample_rate(&self) -> u32;

    /// 源声道数
    fn channels(&self) -> u16;

    /// 总帧数（未知时返回 None）
    fn length_frames(&self) -> Option<u64>;

    /// 读取交错样本到 `out`
    ///
    /// `out` 的长度应为声道数的整数倍。返回实际读取的帧数，0 表示流已结束。
    /// 在音频线程上调用，实现不得分配内存或做阻塞 I/O。
    fn read_frames(&mut self, out: &mut [f32]) -> Result<usize>;

    /// Seek 到指定帧
    fn seek(&mut self, frame: u64) -> Result<()>;

    /// 格式名称（用于日志和界面显示）
    fn format_name(&self) -> &'static str;
}

/// 内存中的 PCM 音源
///
/// 打开文件时在控制线程上一次性解码，之后读取只是切片拷贝，seek 只移动下标。
pub struct PcmSource {
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
    position: usize,    // 帧
    format_name: &'static str,
}

impl PcmSource {
    /// 由交错样本创建，末尾不完整的帧会被丢弃
    pub fn new(
        mut samples: Vec<f32>,
        channels: u16,
        sample_rate: u32,
        format_name: &'static str,
    ) -> Result<Self> {
        if channels == 0 {
            return Err(PlayerError::Decode("音频声道数为 0".to_string()));
        }
        if sample_rate == 0 {
            return Err(PlayerError::Decode("音频采样率为 0".to_string()));
        }

        let whole = samples.len() / channels as usize * channels as usize;
        samples.truncate(whole);
        samples.shrink_to_fit();

        Ok(Self {
            samples,
            channels,
            sample_rate,
            position: 0,
            format_name,
        })
    }

    fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }
}

impl DecodedSource for PcmSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn length_frames(&self) -> Option<u64> {
        Some(self.frames() as u64)
    }

    fn read_frames(&mut self, out: &mut [f32]) -> Result<usize> {
        let channels = self.channels as usize;
        let frames = (out.len() / channels).min(self.frames() - self.position);

        let start = self.position * channels;
        let count = frames * channels;
        out[..count].copy_from_slice(&self.samples[start..start + count]);
        self.position += frames;
        Ok(frames)
    }

    fn seek(&mut self, frame: u64) -> Result<()> {
        self.position = frame.min(self.frames() as u64) as usize;
        Ok(())
    }

    fn format_name(&self) -> &'static str {
        self.format_name
    }
}

// ============================================================================
// WAV（hound）
// ============================================================================

/// 解码整个 WAV 文件
pub fn decode_wav(file: File) -> Result<PcmSource> {
    let mut reader = WavReader::new(BufReader::new(file))?;
    let spec = reader.spec();

    debug!(
        "WAV: {} Hz, {} 声道, {} bit {:?}, {} 帧",
        spec.sample_rate,
        spec.channels,
        spec.bits_per_sample,
        spec.sample_format,
        reader.duration()
    );

    let mut samples = Vec::with_capacity(reader.len() as usize);
    match spec.sample_format {
        SampleFormat::Float => collect_samples(reader.samples::<f32>(), &mut samples),
        SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            collect_samples(
                reader.samples::<i32>().map(|s| s.map(|s| s as f32 * scale)),
                &mut samples,
            )
        }
    }

    PcmSource::new(samples, spec.channels, spec.sample_rate, "WAV")
}

/// 文件被截断时保留已读到的样本
fn collect_samples<I>(samples: I, out: &mut Vec<f32>)
where
    I: Iterator<Item = hound::Result<f32>>,
{
    for sample in samples {
        match sample {
            Ok(sample) => out.push(sample),
            Err(e) => {
                warn!("WAV 数据不完整，只读取到 {} 个样本: {}", out.len(), e);
                break;
            }
        }
    }
}

/// WAV 格式（RIFF/WAVE 头）
pub struct WavFormat;

impl AudioFormat for WavFormat {
    fn name(&self) -> &'static str {
        "WAV"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["wav", "wave"]
    }

    fn accepts(&self, header: &[u8]) -> bool {
        header.len() >= 12 && &header[0..4] == b"RIFF" && &header[8..12] == b"WAVE"
    }

    fn open(&self, file: File, _path: &Path) -> Result<Box<dyn DecodedSource>> {
        Ok(Box::new(decode_wav(file)?))
    }
}

// ============================================================================
// 压缩格式（symphonia）
// ============================================================================

/// 解码整个压缩音频文件（FLAC / MP3 / Ogg Vorbis）
pub fn decode_compressed(file: File, path: &Path) -> Result<PcmSource> {
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| PlayerError::Decode("未找到音频轨道".to_string()))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let capacity = track
        .codec_params
        .n_frames
        .zip(track.codec_params.channels)
        .map(|(frames, channels)| frames as usize * channels.count())
        .unwrap_or(0);
    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples: Vec<f32> = Vec::with_capacity(capacity);
    let mut buffer: Option<SampleBuffer<f32>> = None;
    let mut channels = 0u16;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                debug!("跳过损坏的数据包: {}", e);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        if channels == 0 {
            channels = spec.channels.count() as u16;
            sample_rate = spec.rate;
        } else if spec.channels.count() as u16 != channels {
            return Err(PlayerError::Decode("流中途改变了声道数".to_string()));
        }

        // 包比之前的缓冲大时重新分配
        let needed = decoded.capacity() * spec.channels.count();
        if buffer.as_ref().map_or(true, |buf| buf.capacity() < needed) {
            buffer = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
        }
        if let Some(buf) = buffer.as_mut() {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }
    }

    if channels == 0 {
        return Err(PlayerError::Decode("没有可解码的音频数据".to_string()));
    }

    debug!(
        "symphonia: {} Hz, {} 声道, {} 帧",
        sample_rate,
        channels,
        samples.len() / channels as usize
    );

    PcmSource::new(samples, channels, sample_rate, "symphonia")
}

/// 压缩格式（按文件头魔数识别）
pub struct CompressedFormat;

impl AudioFormat for CompressedFormat {
    fn name(&self) -> &'static str {
        "FLAC/MP3/Ogg"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["flac", "mp3", "ogg", "oga"]
    }

    fn accepts(&self, header: &[u8]) -> bool {
        header.starts_with(b"fLaC")
            || header.starts_with(b"OggS")
            || header.starts_with(b"ID3")
            // MPEG 音频帧同步字
            || (header.len() >= 2 && header[0] == 0xFF && header[1] & 0xE0 == 0xE0)
    }

    fn open(&self, file: File, path: &Path) -> Result<Box<dyn DecodedSource>> {
        Ok(Box::new(decode_compressed(file, path)?))
    }
}
