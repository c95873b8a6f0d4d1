use std::time::Duration;
use async_trait::async_trait;
use common::{CameraId, CameraStreamConfig};
use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;
use crate::errors::ApiError;

/// Result of one readiness request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyAnswer {
    /// 200 with a camera record
    Ready(CameraStreamConfig),
    /// Any other status
    NotReady { status: u16 },
}

/// HTTP surface of the camera backend consumed by the player
#[async_trait]
pub trait CameraApi: Send + Sync {
    /// `GET /cameras/`
    async fn list_cameras(&self) -> Result<Vec<CameraStreamConfig>, ApiError>;

    /// `GET /cameras/{id}/ready`
    async fn check_ready(&self, id: CameraId) -> Result<ReadyAnswer, ApiError>;

    /// `GET /cameras/{id}/`
    async fn fetch_camera(&self, id: CameraId) -> Result<CameraStreamConfig, ApiError>;
}

/// URL layout of the backend
#[derive(Debug, Clone)]
pub struct Endpoints {
    base: Url,
}

impl Endpoints {
    /// `base` must be an http(s) URL; a trailing `/` is added when missing
    pub fn new(mut base: Url) -> Self {
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Self { base }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn cameras(&self) -> Result<Url, ApiError> {
        Ok(self.base.join(common::CAMERAS_PATH)?)
    }

    pub fn ready(&self, id: CameraId) -> Result<Url, ApiError> {
        Ok(self.base.join(&common::ready_path(id))?)
    }

    pub fn camera(&self, id: CameraId) -> Result<Url, ApiError> {
        Ok(self.base.join(&common::camera_path(id))?)
    }

    /// Playback URL of an `active_playlist` value
    pub fn playlist(&self, playlist: &str) -> Result<Url, ApiError> {
        let relative = playlist.trim().trim_start_matches('/');
        if relative.is_empty() {
            return Err(ApiError::InvalidUrl {
                message: "empty playlist path".to_string(),
            });
        }
        Ok(self.base.join(relative)?)
    }

    /// `ws(s)://<host>/cameras/{id}/live`
    pub fn live(&self, id: CameraId) -> Result<Url, ApiError> {
        let mut url = self.base.join(&common::live_path(id))?;
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme).map_err(|_| ApiError::InvalidUrl {
            message: format!("cannot switch {} to {}", url, scheme),
        })?;
        Ok(url)
    }
}

/// reqwest-backed implementation
#[derive(Clone)]
pub struct HttpCameraApi {
    client: Client,
    endpoints: Endpoints,
}

impl HttpCameraApi {
    pub fn new(endpoints: Endpoints, request_timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(request_timeout)
            .build()
            .map_err(ApiError::from)?;

        Ok(Self { client, endpoints })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }
}

#[async_trait]
impl CameraApi for HttpCameraApi {
    async fn list_cameras(&self) -> Result<Vec<CameraStreamConfig>, ApiError> {
        let url = self.endpoints.cameras()?;
        let response = self.client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(ApiError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.json().await?)
    }

    async fn check_ready(&self, id: CameraId) -> Result<ReadyAnswer, ApiError> {
        let url = self.endpoints.ready(id)?;
        let response = self.client.get(url).send().await?;
        let status = response.status();
        debug!(camera_id = id, status = status.as_u16(), "readiness response");

        if status != StatusCode::OK {
            return Ok(ReadyAnswer::NotReady {
                status: status.as_u16(),
            });
        }
        let camera: CameraStreamConfig = response.json().await?;
        Ok(ReadyAnswer::Ready(camera))
    }

    async fn fetch_camera(&self, id: CameraId) -> Result<CameraStreamConfig, ApiError> {
        let url = self.endpoints.camera(id)?;
        let response = self.client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(ApiError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints(base: &str) -> Endpoints {
        Endpoints::new(Url::parse(base).unwrap())
    }

    #[test]
    fn test_endpoint_layout() {
        let endpoints = endpoints("http://localhost:8000");

        assert_eq!(endpoints.cameras().unwrap().as_str(), "http://localhost:8000/cameras/");
        assert_eq!(endpoints.ready(7).unwrap().as_str(), "http://localhost:8000/cameras/7/ready");
        assert_eq!(endpoints.camera(7).unwrap().as_str(), "http://localhost:8000/cameras/7/");
        assert_eq!(endpoints.live(7).unwrap().as_str(), "ws://localhost:8000/cameras/7/live");
    }

    #[test]
    fn test_path_prefix_and_tls_are_kept() {
        let endpoints = endpoints("https://nvr.example.com/backend");

        assert_eq!(
            endpoints.live(2).unwrap().as_str(),
            "wss://nvr.example.com/backend/cameras/2/live"
        );
        assert_eq!(
            endpoints.playlist("/cameras/2/segments/2024-05-01/output.m3u8").unwrap().as_str(),
            "https://nvr.example.com/backend/cameras/2/segments/2024-05-01/output.m3u8"
        );
    }

    #[test]
    fn test_empty_playlist_is_rejected() {
        assert!(endpoints("http://localhost:8000/").playlist(" ").is_err());
    }
}
