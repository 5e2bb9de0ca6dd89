pub mod buffer;
pub mod config;
pub mod decode;
pub mod device;
pub mod error;
pub mod gain;
pub mod looper;
pub mod playback;
pub mod source;
pub mod status;
pub mod transport;

pub use buffer::{OutputBlock, SampleBuffer};
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use gain::LevelControl;
pub use looper::LoopPlayer;
pub use source::{AudioSource, FileSource};
pub use transport::{TransportController, TransportEngine, TransportEvent};
