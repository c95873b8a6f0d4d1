use std::path::PathBuf;
use anyhow::Result;
use camera_backend::{serve, CameraRegistry, Config, LiveOptions, PlaylistScanner, StorageLayout};
use clap::{Arg, Command};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let matches = Command::new("Camera Backend")
        .version("1.0")
        .author("Video Streaming Team")
        .about("Serves camera records, recordings and live segments")
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("HTTP listen port")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("storage")
                .short('s')
                .long("storage")
                .value_name("DIR")
                .help("Storage root holding cameras/<id>/..."),
        )
        .get_matches();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("🚀 Camera backend starting...");

    // 加载配置
    let mut config = Config::load()?;
    if let Some(port) = matches.get_one::<u16>("port") {
        config.port = *port;
    }
    if let Some(storage) = matches.get_one::<String>("storage") {
        config.storage_root = PathBuf::from(storage);
    }
    info!("✓ Configuration loaded (storage: {:?})", config.storage_root);

    let registry = CameraRegistry::new();
    let layout = StorageLayout::new(config.storage_root.clone());
    let cancel = CancellationToken::new();

    // 启动播放列表扫描任务
    let scanner = PlaylistScanner::new(layout.clone(), registry.clone());
    let scanner_handle = tokio::spawn(scanner.run(config.scan_interval, cancel.clone()));
    info!("✓ Playlist scanner started");

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    info!("✓ HTTP server listening on {}", listener.local_addr()?);
    info!("✅ Camera backend ready!");

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("🛑 Shutting down...");
        }
        shutdown.cancel();
    });

    let live = LiveOptions {
        poll_interval: config.live_poll_interval,
    };
    if let Err(e) = serve(listener, registry, layout, live, cancel.clone()).await {
        error!("HTTP server error: {}", e);
    }
    cancel.cancel();
    let _ = scanner_handle.await;

    Ok(())
}
