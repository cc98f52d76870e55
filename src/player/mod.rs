// 播放器核心模块

pub mod decoder;
pub mod format_manager;
pub mod transport;
pub mod callback;
pub mod audio_output;
pub mod manager;

pub use decoder::{DecodedSource, PcmSource};
pub use format_manager::{AudioFormat, FormatManager};
pub use transport::{ChangeListener, ChangeNotifier, TransportSource};
pub use callback::AudioCallback;
pub use audio_output::AudioOutput;
pub use manager::PlaybackManager;
