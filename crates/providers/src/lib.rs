//! Provider ports and the HTTP adapters behind them.
//!
//! The pipeline only ever sees the three traits in [`ports`]; each
//! adapter wraps one external API with per-request timeouts and maps
//! its failures onto [`ports::ProviderError`]. Adapters are constructed
//! from environment config and injected -- nothing in this crate is a
//! global.

pub mod ports;
pub mod script;
pub mod video;
pub mod voice;

pub use ports::{ByteStream, ProviderError, ScriptPort, VideoJobState, VideoPort, VoicePort};
pub use script::ScriptClient;
pub use video::VeoClient;
pub use voice::VoiceClient;
