//! 音频文件播放控制器
//!
//! 加载单个音频文件，通过传输状态机控制播放，由实时音频回调输出。

pub mod core;
pub mod player;
