use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("不支持的音频格式: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("播放尚未就绪（未调用 prepare）")]
    NotReady,

    #[error("解码错误: {0}")]
    Decode(String),

    #[error("音频输出错误: {0}")]
    AudioError(String),

    #[error("配置错误: {0}")]
    Config(String),
}

/// 文件已打开但内容提前结束，属于解码错误而非 IO 错误
fn from_io(err: std::io::Error) -> PlayerError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        PlayerError::Decode(format!("文件不完整: {}", err))
    } else {
        PlayerError::Io(err)
    }
}

impl From<hound::Error> for PlayerError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(e) => from_io(e),
            other => PlayerError::Decode(other.to_string()),
        }
    }
}

impl From<symphonia::core::errors::Error> for PlayerError {
    fn from(err: symphonia::core::errors::Error) -> Self {
        match err {
            symphonia::core::errors::Error::IoError(e) => from_io(e),
            other => PlayerError::Decode(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;
