use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use common::{CameraId, CameraStreamConfig};
use tracing::{error, info, warn};

use live_player::api::{Endpoints, HttpCameraApi};
use live_player::config::{ConfigManager, EnvConfigOverride, PlayerConfig, TransportKind};
use live_player::media::VideoSurface;
use live_player::session::{SessionDeps, SessionOptions};
use live_player::socket::WsConnector;
use live_player::surfaces::HeadlessSurface;
use live_player::wall::CameraWall;

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let matches = Command::new("Live Player")
        .version("1.0")
        .author("Video Streaming Team")
        .about("Plays the live streams of every camera on the backend")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Player configuration file")
                .default_value("live-player.toml"),
        )
        .arg(
            Arg::new("backend")
                .short('b')
                .long("backend")
                .value_name("URL")
                .help("Camera backend base URL"),
        )
        .arg(
            Arg::new("transport")
                .short('t')
                .long("transport")
                .value_name("KIND")
                .help("Live transport: playlist or socket"),
        )
        .arg(
            Arg::new("camera")
                .long("camera")
                .value_name("ID")
                .help("Only play these cameras (repeatable)")
                .action(ArgAction::Append)
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("DIR")
                .help("Directory for socket recordings"),
        )
        .get_matches();

    // 加载配置
    let mut manager = ConfigManager::new(PathBuf::from(
        matches.get_one::<String>("config").map(String::as_str).unwrap_or("live-player.toml"),
    ));
    manager.load().await?;
    let config = manager.get_config_mut();
    EnvConfigOverride::apply_overrides(config);

    if let Some(backend) = matches.get_one::<String>("backend") {
        config.backend.base_url = backend.clone();
    }
    if let Some(transport) = matches.get_one::<String>("transport") {
        config.stream.transport = transport.parse::<TransportKind>()?;
    }
    if let Some(output) = matches.get_one::<String>("output") {
        config.output.directory = PathBuf::from(output);
    }
    manager.validate()?;
    let config = manager.into_config();

    // 初始化日志 - 使用环境变量 RUST_LOG 控制级别
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .with_target(config.logging.with_target)
        .init();

    info!("📺 Live player starting...");
    info!("  Backend: {}", config.backend.base_url);
    info!("  Transport: {:?}", config.stream.transport);

    let selected: Vec<CameraId> = matches
        .get_many::<u64>("camera")
        .map(|ids| ids.copied().collect())
        .unwrap_or_default();

    let mut wall = build_wall(&config)?;
    let cameras: Vec<CameraStreamConfig> = wall
        .discover()
        .await
        .context("Failed to list cameras")?
        .into_iter()
        .filter(|camera| selected.is_empty() || selected.contains(&camera.id))
        .collect();

    if cameras.is_empty() {
        warn!("⚠️  No cameras to play");
        return Ok(());
    }

    for camera in cameras {
        wall.mount(camera);
    }
    info!("✅ {} tile(s) mounted, press Ctrl+C to stop", wall.len());

    let mut ticker = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                match serde_json::to_string(&wall.statuses()) {
                    Ok(statuses) => info!("Tiles: {}", statuses),
                    Err(e) => warn!("Failed to render tile status: {}", e),
                }
            }
        }
    }

    info!("Shutting down...");
    for (camera_id, e) in wall.shutdown().await {
        error!("Camera {}: {}", camera_id, e);
    }
    info!("✓ All tiles closed");
    Ok(())
}

fn build_wall(config: &PlayerConfig) -> Result<CameraWall> {
    let endpoints = Endpoints::new(config.backend.base_url()?);
    let api = HttpCameraApi::new(endpoints.clone(), config.backend.request_timeout)?;

    let deps = SessionDeps {
        api: Arc::new(api),
        endpoints,
        connector: Arc::new(WsConnector::new()),
    };

    let client = reqwest::Client::builder()
        .timeout(config.backend.request_timeout)
        .build()?;
    let output_dir = config.output.directory.clone();
    let surfaces = move |camera: &CameraStreamConfig| -> Box<dyn VideoSurface> {
        Box::new(HeadlessSurface::new(camera.id, client.clone(), output_dir.clone()))
    };

    Ok(CameraWall::new(deps, SessionOptions::from_config(config), Arc::new(surfaces)))
}
