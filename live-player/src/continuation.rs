use std::sync::Arc;
use common::{CameraId, CameraStreamConfig};
use tracing::debug;
use crate::api::CameraApi;
use crate::errors::ContinuationError;

/// A continuation result stamped with the order it was requested in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Continuation {
    pub seq: u64,
    pub active_playlist: String,
    pub config: CameraStreamConfig,
}

/// Fetches the camera's current record when the playing playlist ends
pub struct PlaylistContinuationClient {
    api: Arc<dyn CameraApi>,
    next_seq: u64,
}

impl PlaylistContinuationClient {
    pub fn new(api: Arc<dyn CameraApi>) -> Self {
        Self { api, next_seq: 0 }
    }

    pub async fn on_segment_end(&mut self, camera_id: CameraId) -> Result<Continuation, ContinuationError> {
        self.next_seq += 1;
        let seq = self.next_seq;

        let config = self
            .api
            .fetch_camera(camera_id)
            .await
            .map_err(|source| ContinuationError::Fetch { camera_id, source })?;

        let active_playlist = config
            .playlist()
            .map(str::to_string)
            .ok_or(ContinuationError::NoActivePlaylist { camera_id })?;

        debug!(camera_id, seq, %active_playlist, "Fetched next playlist");
        Ok(Continuation {
            seq,
            active_playlist,
            config,
        })
    }
}

/// The playlist currently applied to the player
#[derive(Debug, Clone)]
pub struct PlaylistCursor {
    applied_seq: u64,
    playlist: String,
}

impl PlaylistCursor {
    /// Starts from the playlist returned by the readiness poll
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            applied_seq: 0,
            playlist: initial.into(),
        }
    }

    pub fn current(&self) -> &str {
        &self.playlist
    }

    pub fn applied_seq(&self) -> u64 {
        self.applied_seq
    }

    /// Applies `continuation` only when it was requested after the one
    /// currently applied. Returns `false` for stale results.
    pub fn advance(&mut self, continuation: &Continuation) -> bool {
        if continuation.seq <= self.applied_seq {
            return false;
        }
        self.applied_seq = continuation.seq;
        self.playlist = continuation.active_playlist.clone();
        true
    }
}
