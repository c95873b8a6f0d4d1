use crate::errors::BackendError;
use crate::live::{serve_live_socket, LiveFeed, LiveOptions};
use crate::registry::{CameraRecord, CameraRegistry};
use crate::storage::{content_type, StorageLayout};
use axum::{
    extract::{ws::WebSocketUpgrade, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use common::{CameraCreate, CameraId};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

type AppState = (CameraRegistry, StorageLayout, LiveOptions);

pub fn create_router(registry: CameraRegistry, layout: StorageLayout, live: LiveOptions) -> Router {
    Router::new()
        // 摄像头管理
        .route("/cameras", get(list_cameras))
        .route("/cameras/", get(list_cameras))
        .route("/cameras/add_camera", post(add_camera))
        .route("/cameras/:id", get(get_camera))
        .route("/cameras/:id/", get(get_camera))
        .route("/cameras/:id/ready", get(camera_ready))

        // 直播分片
        .route("/cameras/:id/live", get(live_socket))

        // 录像文件
        .route("/cameras/:id/segments/:date/:file", get(segment_file))
        .route("/cameras/:id/:date/:playlist", get(playlist_file))

        .with_state((registry, layout, live))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// 获取摄像头列表
async fn list_cameras(State((registry, _, _)): State<AppState>) -> Json<Vec<CameraRecord>> {
    Json(registry.list())
}

/// 获取摄像头详情
async fn get_camera(
    State((registry, _, _)): State<AppState>,
    Path(id): Path<CameraId>,
) -> Result<Json<CameraRecord>, StatusCode> {
    registry
        .get(id)
        .map(Json)
        .map_err(|_| StatusCode::NOT_FOUND)
}

/// 就绪检查：有可播放的播放列表时返回 200
async fn camera_ready(
    State((registry, _, _)): State<AppState>,
    Path(id): Path<CameraId>,
) -> Result<Json<CameraRecord>, StatusCode> {
    let camera = registry.get(id).map_err(|_| StatusCode::NOT_FOUND)?;
    if !camera.config.is_publishable() {
        debug!("Camera {} is not ready", id);
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    Ok(Json(camera))
}

/// 添加摄像头
async fn add_camera(
    State((registry, _, _)): State<AppState>,
    Json(create): Json<CameraCreate>,
) -> Result<Json<CameraRecord>, (StatusCode, String)> {
    registry
        .add(create)
        .map(Json)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
}

/// 直播套接字
async fn live_socket(
    State((registry, layout, live)): State<AppState>,
    Path(id): Path<CameraId>,
    ws: WebSocketUpgrade,
) -> Result<Response, StatusCode> {
    registry.get(id).map_err(|_| StatusCode::NOT_FOUND)?;
    let feed = LiveFeed::new(&layout, id);
    Ok(ws.on_upgrade(move |socket| serve_live_socket(socket, id, feed, registry, live)))
}

async fn segment_file(
    State((_, layout, _)): State<AppState>,
    Path((id, date, file)): Path<(CameraId, String, String)>,
) -> Result<Response, StatusCode> {
    serve_file(&layout, id, &date, &file).await
}

async fn playlist_file(
    State((_, layout, _)): State<AppState>,
    Path((id, date, playlist)): Path<(CameraId, String, String)>,
) -> Result<Response, StatusCode> {
    serve_file(&layout, id, &date, &playlist).await
}

async fn serve_file(
    layout: &StorageLayout,
    id: CameraId,
    date: &str,
    file: &str,
) -> Result<Response, StatusCode> {
    let path = layout.dated_file(id, date, file).map_err(|e| {
        warn!("Rejected file request: {}", e);
        StatusCode::BAD_REQUEST
    })?;

    match tokio::fs::read(&path).await {
        Ok(data) => Ok(([(header::CONTENT_TYPE, content_type(&path))], data).into_response()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            warn!("{}", BackendError::storage(&path, e));
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
