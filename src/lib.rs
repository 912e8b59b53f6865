pub mod codec;
pub mod config;
pub mod discover;
pub mod error;
pub mod logging;
pub mod manager;
pub mod transport;

pub use codec::{open_frame, seal_frame, FrameDecodeResult, FrameType, Tag, TagReader, TagWriter};
pub use config::TunerConfig;
pub use discover::{Device, DiscoveredDevice, DiscoverySocketPool, DEVICE_ID_WILDCARD, DEVICE_TYPE_TUNER, DEVICE_TYPE_WILDCARD};
pub use error::{Error, Result};
pub use manager::{JsonFileStore, MemoryStore, NetworkBackend, SettingsStore, TunerBackend, TunerManager};
pub use transport::{ControlSocket, InterfaceSource, LocalInterface, StaticInterfaces, SystemInterfaces};
