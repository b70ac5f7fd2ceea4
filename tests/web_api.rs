use anyhow::Result;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use rpi_mjpeg_streamer::servo::{HardwareContext, ServoDriver, ServoError};
use rpi_mjpeg_streamer::streaming::{FrameDistributor, PipelineStats};
use rpi_mjpeg_streamer::web::{run_server, AppState};

#[derive(Clone, Default)]
struct RecordingServos(Arc<Mutex<Vec<(f64, f64)>>>);

impl ServoDriver for RecordingServos {
    fn set_angles(&self, x: f64, y: f64) -> Result<(), ServoError> {
        self.0.lock().push((x, y));
        Ok(())
    }
}

/// Starts a server on an ephemeral port with no pipeline behind it.
async fn start(hardware: HardwareContext, site_dir: &str) -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = AppState::new(
        Arc::new(FrameDistributor::new(4)),
        Arc::new(PipelineStats::default()),
        hardware,
        site_dir,
    );
    tokio::spawn(run_server(listener, state));
    Ok(addr)
}

#[tokio::test]
async fn test_health_endpoint() -> Result<()> {
    let addr = start(HardwareContext::without_servos(), "site").await?;

    let resp = reqwest::get(format!("http://{}/health", addr)).await?;
    assert!(resp.status().is_success());

    let body: Value = resp.json().await?;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    Ok(())
}

#[tokio::test]
async fn test_stats_endpoint() -> Result<()> {
    let addr = start(HardwareContext::without_servos(), "site").await?;

    let body: Value = reqwest::get(format!("http://{}/api/stats", addr))
        .await?
        .json()
        .await?;
    assert_eq!(body["pipeline"]["frames_captured"], 0);
    assert_eq!(body["pipeline"]["frames_dropped"], 0);
    assert_eq!(body["distribution"]["waiting"], 0);
    assert_eq!(body["distribution"]["max_waiters"], 4);
    assert_eq!(body["servos"], false);
    Ok(())
}

#[tokio::test]
async fn test_orient_in_range_moves_servos() -> Result<()> {
    let servos = RecordingServos::default();
    let addr = start(HardwareContext::with_servos(Box::new(servos.clone())), "site").await?;

    let resp = reqwest::Client::new()
        .post(format!("http://{}/orient", addr))
        .json(&json!({"alpha": 180.0, "beta": 5.0, "gamma": 45.0}))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 200);

    let body: Value = resp.json().await?;
    assert_eq!(body["x"]["target_angle"], 90.0);
    assert_eq!(body["y"]["target_angle"], 45.0);
    assert_eq!(*servos.0.lock(), vec![(90.0, 45.0)]);
    Ok(())
}

#[tokio::test]
async fn test_orient_out_of_range_answers_210() -> Result<()> {
    let servos = RecordingServos::default();
    let addr = start(HardwareContext::with_servos(Box::new(servos.clone())), "site").await?;

    // pan works out to 270 - 10 = 260 degrees
    let resp = reqwest::Client::new()
        .post(format!("http://{}/orient", addr))
        .json(&json!({"alpha": 10.0, "beta": 0.0, "gamma": 30.0}))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 210);

    let body: Value = resp.json().await?;
    assert_eq!(body["x"]["clamped"], true);
    assert_eq!(body["y"]["clamped"], false);
    assert_eq!(*servos.0.lock(), vec![(180.0, 30.0)]);
    Ok(())
}

#[tokio::test]
async fn test_orient_without_servos_still_answers() -> Result<()> {
    let addr = start(HardwareContext::without_servos(), "site").await?;

    let resp = reqwest::Client::new()
        .post(format!("http://{}/orient", addr))
        .json(&json!({"alpha": 300.0, "beta": 0.0, "gamma": -200.0}))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 210);
    Ok(())
}

#[tokio::test]
async fn test_orient_bad_body_is_400() -> Result<()> {
    let servos = RecordingServos::default();
    let addr = start(HardwareContext::with_servos(Box::new(servos.clone())), "site").await?;
    let client = reqwest::Client::new();

    let garbage = client
        .post(format!("http://{}/orient", addr))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await?;
    assert_eq!(garbage.status().as_u16(), 400);

    let missing_field = client
        .post(format!("http://{}/orient", addr))
        .json(&json!({"alpha": 1.0}))
        .send()
        .await?;
    assert_eq!(missing_field.status().as_u16(), 400);

    assert!(servos.0.lock().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_site_files_fall_back_to_built_in_copies() -> Result<()> {
    let empty = tempfile::tempdir()?;
    let dir = empty.path().to_string_lossy().into_owned();
    let addr = start(HardwareContext::without_servos(), &dir).await?;

    let index = reqwest::get(format!("http://{}/", addr)).await?;
    assert!(index.status().is_success());
    assert!(index.text().await?.contains(r#"src="/video""#));

    let script = reqwest::get(format!("http://{}/script.js", addr)).await?;
    assert_eq!(
        script.headers()["content-type"].to_str()?,
        "application/javascript"
    );
    assert!(script.text().await?.contains("/orient"));
    Ok(())
}

#[tokio::test]
async fn test_site_dir_overrides_index() -> Result<()> {
    let site = tempfile::tempdir()?;
    std::fs::write(site.path().join("index.html"), "<p>custom page</p>")?;
    std::fs::write(site.path().join("logo.txt"), "asset")?;
    let dir = site.path().to_string_lossy().into_owned();
    let addr = start(HardwareContext::without_servos(), &dir).await?;

    let index = reqwest::get(format!("http://{}/", addr)).await?.text().await?;
    assert_eq!(index, "<p>custom page</p>");

    let asset = reqwest::get(format!("http://{}/logo.txt", addr)).await?.text().await?;
    assert_eq!(asset, "asset");
    Ok(())
}
