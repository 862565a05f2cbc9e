mod mjpeg;
mod page;

use std::path::PathBuf;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderName, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use motion_cam_common::config::{Config, ConfigError};
use motion_cam_pipeline::buffer::SharedFrameBuffer;
use motion_cam_pipeline::capture::CaptureLoop;
use motion_cam_pipeline::detector::annotate::StatusOverlay;
use motion_cam_pipeline::detector::MotionDetector;
use motion_cam_pipeline::encoder::FrameEncoder;
use motion_cam_pipeline::source::{FfmpegSource, OpenError, SourceTarget};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

const CONFIG_ENV: &str = "MOTION_CAM_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "motion-cam.toml";

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("error opening capture device: {0}")]
    Open(#[from] OpenError),
    #[error("failed to spawn capture thread: {0}")]
    CaptureThread(std::io::Error),
    #[error("failed to bind to {0}: {1}")]
    Bind(String, std::io::Error),
}

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

struct AppState {
    frames: Arc<SharedFrameBuffer>,
    boundary: String,
    frame_interval: Duration,
    index_path: Option<String>,
    shutdown: watch::Receiver<bool>,
    viewers: Arc<AtomicUsize>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET / — viewer page embedding the stream
async fn index(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(page::load_index(state.index_path.as_deref()).await)
}

/// GET /video — endless multipart-replace stream of the latest frame
async fn video(State(state): State<Arc<AppState>>) -> Response {
    let parts = mjpeg::frame_stream(
        Arc::clone(&state.frames),
        state.boundary.clone(),
        state.frame_interval,
        state.shutdown.clone(),
        Arc::clone(&state.viewers),
    );
    (
        [
            (header::CONTENT_TYPE, mjpeg::content_type(&state.boundary)),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        Body::from_stream(parts),
    )
        .into_response()
}

/// GET /frame.jpg — the latest frame as a single image, 204 before the first one
async fn latest_frame(State(state): State<Arc<AppState>>) -> Response {
    match state.frames.latest() {
        Some(frame) if !frame.is_empty() => (
            [
                (header::CONTENT_TYPE, "image/jpeg".to_string()),
                (HeaderName::from_static("x-frame-seq"), frame.seq.to_string()),
                (
                    HeaderName::from_static("x-frame-age-ms"),
                    frame.age_now_ms().to_string(),
                ),
            ],
            frame.payload,
        )
            .into_response(),
        _ => StatusCode::NO_CONTENT.into_response(),
    }
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/video", get(video))
        .route("/frame.jpg", get(latest_frame))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Resolves on Ctrl-C after telling the capture loop and every viewer to stop.
async fn shutdown_signal(shutdown: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for Ctrl-C; running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
    let _ = shutdown.send(true);
}

fn load_config() -> Result<Config, ConfigError> {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) => Config::load(&PathBuf::from(path)),
        None => Config::load_or_default(&PathBuf::from(DEFAULT_CONFIG_PATH)),
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    let config = match load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    if let Err(e) = run(config).await {
        error!(error = %e, "motion-cam failed to start");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), StartupError> {
    let target = SourceTarget::from_arg(std::env::args().nth(1));
    let source = FfmpegSource::open(&target, &config.capture)?;

    let frames = Arc::new(SharedFrameBuffer::new());
    let detector = MotionDetector::new(&config.detector, StatusOverlay::load(&config.overlay));
    let encoder = FrameEncoder::from_config(&config.encoder);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let capture = CaptureLoop::new(Box::new(source), detector, encoder, Arc::clone(&frames))
        .spawn(shutdown_rx.clone())
        .map_err(StartupError::CaptureThread)?;

    let state = Arc::new(AppState {
        frames,
        boundary: config.server.boundary.clone(),
        frame_interval: Duration::from_millis(config.server.frame_interval_ms),
        index_path: config.server.index_path.clone(),
        shutdown: shutdown_rx,
        viewers: Arc::new(AtomicUsize::new(0)),
    });

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| StartupError::Bind(addr.clone(), e))?;
    info!(
        addr,
        minimum_area = config.detector.minimum_area,
        scale = config.encoder.scale,
        "capturing; open http://{addr}"
    );

    if let Err(e) = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
    {
        error!(error = %e, "HTTP server error");
    }

    // The loop notices the shutdown flag after its current read returns.
    for _ in 0..20 {
        if capture.is_finished() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    if capture.is_finished() {
        match capture.join() {
            Ok(summary) => info!(?summary, "capture summary"),
            Err(_) => error!("capture thread panicked"),
        }
    } else {
        warn!("capture source still blocked on read; exiting without waiting");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use motion_cam_common::frame::EncodedFrame;

    use futures_util::StreamExt;

    /// The sender must outlive any `/video` stream built from the state.
    fn state(frames: Arc<SharedFrameBuffer>) -> (Arc<AppState>, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let state = Arc::new(AppState {
            frames,
            boundary: "frame".into(),
            frame_interval: Duration::from_millis(5),
            index_path: None,
            shutdown: rx,
            viewers: Arc::new(AtomicUsize::new(0)),
        });
        (state, tx)
    }

    #[tokio::test]
    async fn single_frame_is_no_content_before_capture() {
        let (state, _tx) = state(Arc::new(SharedFrameBuffer::new()));
        let response = latest_frame(State(state)).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn single_frame_carries_sequence_header() {
        let frames = Arc::new(SharedFrameBuffer::new());
        frames.publish(EncodedFrame::new(Bytes::from_static(b"jpeg"), 42, 0));
        let (state, _tx) = state(frames);
        let response = latest_frame(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "image/jpeg");
        assert_eq!(response.headers()["x-frame-seq"], "42");
    }

    #[tokio::test]
    async fn video_response_declares_multipart_boundary() {
        let (state, _tx) = state(Arc::new(SharedFrameBuffer::new()));
        let response = video(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "multipart/x-mixed-replace; boundary=frame"
        );
        assert_eq!(response.headers()["cache-control"], "no-cache");
    }

    #[tokio::test]
    async fn video_body_delivers_parts_until_shutdown() {
        let frames = Arc::new(SharedFrameBuffer::new());
        frames.publish(EncodedFrame::new(Bytes::from_static(b"jpeg"), 1, 0));
        let (state, tx) = state(frames);
        let response = video(State(Arc::clone(&state))).await;
        let mut body = response.into_body().into_data_stream();

        let part = body.next().await.unwrap().unwrap();
        assert_eq!(&part[..], b"--frame\r\nContent-Type: image/jpeg\r\n\r\njpeg\r\n\r\n");
        let part = body.next().await.unwrap().unwrap();
        assert!(part.starts_with(b"--frame\r\n"));

        tx.send(true).unwrap();
        assert!(body.next().await.is_none());
    }
}
