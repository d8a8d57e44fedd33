//! Verifies the transcoding binaries are usable with the current config.

use tracing::{error, info};

use audiotk_media::{init_tracing, tools, EngineConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    let config = EngineConfig::from_env();
    info!(
        ffmpeg = %config.ffmpeg_path,
        ffprobe = %config.ffprobe_path,
        "audiotk-selfcheck: starting"
    );

    let report = tools::health_report(&config).await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.is_healthy() {
        error!("audiotk-selfcheck: transcoder tools unavailable");
        std::process::exit(1);
    }

    info!("audiotk-selfcheck: ok");
    Ok(())
}
