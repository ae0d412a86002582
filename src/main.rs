use std::sync::Arc;
use anyhow::{Context, Error};
use clap::Parser;
use log::{info, warn};
use tokio::net::TcpListener;
use rs_face_overlay_svc::config::args::Args;
use rs_face_overlay_svc::config::config::{DriveConfig, PipelineConfig};
use rs_face_overlay_svc::modules::drive_client::DriveClient;
use rs_face_overlay_svc::modules::emotion_client::EmotionClient;
use rs_face_overlay_svc::modules::face_mesh_client::FaceMeshClient;
use rs_face_overlay_svc::pipeline::pipeline::FaceOverlayPipeline;
use rs_face_overlay_svc::server::router;
use rs_face_overlay_svc::triton_client::client::TritonInferenceClient;

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = PipelineConfig::load(args.config.as_deref())?;

    let drive_client = DriveClient::new(&args.drive_credentials, DriveConfig::new(args.drive_folder_id.clone()))
        .context("invalid Google Drive credentials")?;

    let triton_client = TritonInferenceClient::connect(&args.triton_url).await?;
    if !triton_client.server_live().await? {
        warn!("inference server at {} reports it is not live", args.triton_url);
    }
    for model_name in [&config.face_mesh.model_name, &config.emotion.model_name] {
        if !triton_client.model_ready(model_name).await? {
            warn!("model {model_name} is not ready yet");
        }
    }
    let face_mesh_client = FaceMeshClient::connect(triton_client.clone(), config.face_mesh.clone()).await?;
    let emotion_client = if config.emotion.enabled {
        Some(EmotionClient::connect(triton_client, config.emotion.clone()).await?)
    } else {
        info!("emotion detection is disabled");
        None
    };

    let pipeline = FaceOverlayPipeline::new(face_mesh_client, emotion_client, drive_client, config);
    let app = router(Arc::new(pipeline));

    let (host, port) = args.bind_address();
    let listener = TcpListener::bind((host, port))
        .await
        .with_context(|| format!("failed to bind {host}:{port}"))?;
    let addr = listener.local_addr()?;
    info!("face overlay service listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
