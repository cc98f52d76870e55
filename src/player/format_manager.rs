use crate::core::{PlayerError, Result};
use crate::player::decoder::{CompressedFormat, DecodedSource, WavFormat};
use log::{debug, info};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// 读取文件头的字节数
const HEADER_LEN: u64 = 16;

/// 可注册的音频格式
pub trait AudioFormat: Send + Sync {
    /// 格式名称
    fn name(&self) -> &'static str;

    /// 常见扩展名（不含点）
    fn extensions(&self) -> &'static [&'static str];

    /// 是否能解析以 `header` 开头的文件
    fn accepts(&self, header: &[u8]) -> bool;

    /// 打开音频流，文件句柄归返回的源所有
    fn open(&self, file: File, path: &Path) -> Result<Box<dyn DecodedSource>>;
}

/// 格式管理器 - 按注册顺序把文件解析为解码流
pub struct FormatManager {
    formats: Vec<Box<dyn AudioFormat>>,
}

impl FormatManager {
    /// 创建空的格式管理器
    pub fn new() -> Self {
        Self { formats: Vec::new() }
    }

    /// 注册内置格式：WAV 优先，其次是压缩格式
    pub fn with_default_formats() -> Self {
        let mut manager = Self::new();
        manager.register_format(Box::new(WavFormat));
        manager.register_format(Box::new(CompressedFormat));
        manager
    }

    pub fn register_format(&mut self, format: Box<dyn AudioFormat>) {
        debug!("注册音频格式: {}", format.name());
        self.formats.push(format);
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }

    /// 所有已注册格式的通配符，例如 `*.wav;*.flac`
    pub fn wildcard_extensions(&self) -> String {
        self.formats
            .iter()
            .flat_map(|f| f.extensions().iter())
            .map(|ext| format!("*.{}", ext))
            .collect::<Vec<_>>()
            .join(";")
    }

    /// 解析文件
    ///
    /// 返回：
    /// - Ok(source): 第一个接受文件头的格式打开的流
    /// - Err(Io): 文件不存在或不可读
    /// - Err(UnsupportedFormat): 没有格式接受该文件头
    pub fn resolve(&self, path: &Path) -> Result<Box<dyn DecodedSource>> {
        let mut file = File::open(path)?;

        let mut header = Vec::with_capacity(HEADER_LEN as usize);
        (&mut file).take(HEADER_LEN).read_to_end(&mut header)?;
        file.seek(SeekFrom::Start(0))?;

        let format = self
            .formats
            .iter()
            .find(|f| f.accepts(&header))
            .ok_or_else(|| PlayerError::UnsupportedFormat(path.to_path_buf()))?;

        info!("📂 使用 {} 解码器打开: {}", format.name(), path.display());
        format.open(file, path)
    }
}

impl Default for FormatManager {
    fn default() -> Self {
        Self::with_default_formats()
    }
}
