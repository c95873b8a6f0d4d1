pub mod config;
pub mod errors;
pub mod live;
pub mod registry;
pub mod routes;
pub mod scanner;
pub mod storage;

pub use config::Config;
pub use live::LiveOptions;
pub use errors::{BackendError, Result};
pub use registry::{CameraRecord, CameraRegistry};
pub use routes::create_router;
pub use scanner::PlaylistScanner;
pub use storage::StorageLayout;

/// 在给定监听器上运行 HTTP 服务直到取消
pub async fn serve(
    listener: tokio::net::TcpListener,
    registry: CameraRegistry,
    layout: StorageLayout,
    live: LiveOptions,
    cancel: tokio_util::sync::CancellationToken,
) -> std::io::Result<()> {
    let app = create_router(registry, layout, live);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}
