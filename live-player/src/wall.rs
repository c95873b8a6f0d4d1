use std::collections::BTreeMap;
use std::sync::Arc;
use common::{CameraId, CameraStreamConfig};
use serde::Serialize;
use tracing::{info, warn};
use crate::errors::PlayerError;
use crate::media::VideoSurface;
use crate::session::{PlaybackSession, SessionDeps, SessionHandle, SessionOptions, SessionState};

/// Creates the surface a camera tile renders into
pub trait SurfaceFactory: Send + Sync {
    fn create(&self, camera: &CameraStreamConfig) -> Box<dyn VideoSurface>;
}

impl<F> SurfaceFactory for F
where
    F: Fn(&CameraStreamConfig) -> Box<dyn VideoSurface> + Send + Sync,
{
    fn create(&self, camera: &CameraStreamConfig) -> Box<dyn VideoSurface> {
        self(camera)
    }
}

/// 摄像头墙中单个画面的状态
#[derive(Debug, Clone, Serialize)]
pub struct TileStatus {
    pub camera_id: CameraId,
    pub name: String,
    pub state: SessionState,
}

struct Tile {
    camera: CameraStreamConfig,
    session: SessionHandle,
}

/// One independent playback session per camera
pub struct CameraWall {
    deps: SessionDeps,
    options: SessionOptions,
    surfaces: Arc<dyn SurfaceFactory>,
    tiles: BTreeMap<CameraId, Tile>,
}

impl CameraWall {
    pub fn new(deps: SessionDeps, options: SessionOptions, surfaces: Arc<dyn SurfaceFactory>) -> Self {
        Self {
            deps,
            options,
            surfaces,
            tiles: BTreeMap::new(),
        }
    }

    /// Cameras known to the backend
    pub async fn discover(&self) -> Result<Vec<CameraStreamConfig>, PlayerError> {
        let cameras = self.deps.api.list_cameras().await?;
        info!("Discovered {} cameras", cameras.len());
        Ok(cameras)
    }

    /// Starts a session for `camera`; `false` when it already has a tile
    pub fn mount(&mut self, camera: CameraStreamConfig) -> bool {
        if self.tiles.contains_key(&camera.id) {
            warn!(camera_id = camera.id, "Camera already mounted");
            return false;
        }

        let surface = self.surfaces.create(&camera);
        let session = PlaybackSession::spawn(camera.id, self.deps.clone(), self.options.clone(), surface);
        info!(camera_id = camera.id, name = %camera.name, session_id = %session.session_id(), "Tile mounted");
        self.tiles.insert(camera.id, Tile { camera, session });
        true
    }

    /// Tears a tile down. `None` when the camera was not mounted.
    pub async fn unmount(&mut self, camera_id: CameraId) -> Option<Option<PlayerError>> {
        let mut tile = self.tiles.remove(&camera_id)?;
        let outcome = tile.session.close().await;
        info!(camera_id, "Tile unmounted");
        Some(outcome)
    }

    pub fn session(&self, camera_id: CameraId) -> Option<&SessionHandle> {
        self.tiles.get(&camera_id).map(|tile| &tile.session)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn statuses(&self) -> Vec<TileStatus> {
        self.tiles
            .values()
            .map(|tile| TileStatus {
                camera_id: tile.camera.id,
                name: tile.camera.name.clone(),
                state: tile.session.state(),
            })
            .collect()
    }

    /// Closes every tile; returns the errors that had stopped sessions
    pub async fn shutdown(&mut self) -> Vec<(CameraId, PlayerError)> {
        let mut failures = Vec::new();
        let ids: Vec<CameraId> = self.tiles.keys().copied().collect();
        for camera_id in ids {
            if let Some(Some(error)) = self.unmount(camera_id).await {
                failures.push((camera_id, error));
            }
        }
        failures
    }
}
