//! Live overlay: camera -> pose -> torso anchor -> transform -> renderer (OSC).
//!
//! Console commands: `g <id>` select garment, `c` clear, `r` reset tracking,
//! `l` list garments.

use anyhow::{Context, Result};
use log::{error, info, warn};
use std::env;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use garment_overlay::camera::{FrameSource, OpenCvCamera};
use garment_overlay::config::{Config, PoseBackend};
use garment_overlay::error::CaptureError;
use garment_overlay::overlay::OscOverlaySink;
use garment_overlay::pose::{MoveNetSource, PoseSource, RemotePoseSource};
use garment_overlay::render::{Canvas, DebugWindow};
use garment_overlay::scheduler::{LoopCommand, OverlayLoop};
use garment_overlay::BUILD_VERSION;

const CONFIG_PATH: &str = "config.toml";

fn spawn_console(commands: mpsc::UnboundedSender<LoopCommand>, garments: Vec<String>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let parts: Vec<&str> = line.split_whitespace().collect();
            let command = match parts.as_slice() {
                ["g", id] => LoopCommand::SelectGarment(id.to_string()),
                ["c"] => LoopCommand::ClearGarment,
                ["r"] => LoopCommand::ResetTracking,
                ["l"] => {
                    for id in &garments {
                        eprintln!("  {}", id);
                    }
                    continue;
                }
                [] => continue,
                _ => {
                    eprintln!("commands: g <id> | c | r | l");
                    continue;
                }
            };
            if commands.send(command).is_err() {
                break;
            }
        }
    });
}

async fn run<P: PoseSource>(config: Config, camera: OpenCvCamera, poses: P) -> Result<()> {
    let sink = OscOverlaySink::from_config(&config.sink)?;
    info!(
        "[sink] sending transforms to {}, viewport reports on {}",
        config.sink.addr, config.sink.listen_addr
    );

    let (tx, rx) = mpsc::unbounded_channel();
    spawn_console(tx, config.garments.iter().map(|g| g.id.clone()).collect());

    let mut overlay = OverlayLoop::new(&config, camera, poses, sink)?.with_commands(rx);

    let shutdown = CancellationToken::new();
    if config.debug.view {
        let mut window = DebugWindow::new("garment overlay", 640, 360)?;
        let mut canvas = Canvas::new(640, 360);
        let closed = shutdown.clone();
        overlay = overlay.with_observer(move |ctx, frame| {
            canvas.draw_frame(frame);
            canvas.draw_tracking(ctx.tracked(), &ctx.anchor(), frame.dimensions());
            if let Err(e) = window.present(&canvas) {
                warn!("[debug] present failed: {:#}", e);
            }
            if !window.is_open() {
                closed.cancel();
            }
        });
    }

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("ctrl-c, shutting down");
            }
            shutdown.cancel();
        });
    }

    let stats = overlay.run(shutdown).await;
    info!(
        "done: {} inferences, {} detected, {} failed",
        stats.completed, stats.detected, stats.failures
    );
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = env::args().nth(1).unwrap_or_else(|| CONFIG_PATH.to_string());
    let config = Config::load_or_default(&config_path);
    info!("garment overlay ({})", BUILD_VERSION);

    let camera = match OpenCvCamera::start(&config.camera) {
        Ok(camera) => camera,
        Err(e) => {
            match e.downcast_ref::<CaptureError>() {
                Some(CaptureError::PermissionDenied(index)) => {
                    error!("camera {}: permission denied", index)
                }
                Some(CaptureError::Unavailable(index)) => error!("camera {}: unavailable", index),
                _ => error!("camera: {:#}", e),
            }
            return Ok(ExitCode::FAILURE);
        }
    };
    let source = camera.dimensions();
    info!("[camera] {}x{}", source.width, source.height);

    match config.pose.backend {
        PoseBackend::Local => {
            let poses = MoveNetSource::load(&config.pose.model_path)
                .with_context(|| format!("loading {}", config.pose.model_path))?;
            info!("[pose] MoveNet loaded");
            run(config, camera, poses).await?;
        }
        PoseBackend::Remote => {
            let poses = RemotePoseSource::connect(&config.pose.server_addr).await?;
            run(config, camera, poses).await?;
        }
    }
    Ok(ExitCode::SUCCESS)
}
