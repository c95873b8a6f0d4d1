pub mod errors;
pub mod serde_helpers;
pub mod config;
pub mod api;
pub mod readiness;
pub mod continuation;
pub mod media;
pub mod buffer_sink;
pub mod socket;
pub mod segment_stream;
pub mod session;
pub mod surfaces;
pub mod wall;
#[cfg(test)]
mod test_support;

pub use errors::*;
pub use config::{PlayerConfig, TransportKind};
pub use session::{PlaybackSession, SessionDeps, SessionEvent, SessionHandle, SessionOptions, SessionState};
pub use wall::CameraWall;
