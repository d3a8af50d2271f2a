//! Pose server: accepts frames over TCP, runs MoveNet, replies with keypoints.
//!
//! Lets the overlay run on a machine without the model (`[pose] backend = "remote"`).

use anyhow::{Context, Result};
use log::{info, warn};
use std::env;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};

use garment_overlay::config::Config;
use garment_overlay::pose::{MoveNetSource, PoseSource};
use garment_overlay::protocol::{self, ClientMessage, ServerMessage};
use garment_overlay::BUILD_VERSION;

const CONFIG_PATH: &str = "config.toml";

async fn serve_client(tcp: TcpStream, addr: SocketAddr, mut source: MoveNetSource) -> Result<()> {
    tcp.set_nodelay(true)?;
    let mut stream = protocol::message_stream(tcp);
    let mut served = 0u64;

    while let Some(message) = protocol::recv_message::<ClientMessage>(&mut stream).await? {
        let ClientMessage::Estimate { request_id, frame } = message;
        let reply = match source.estimate(frame).await {
            Ok(keypoints) => ServerMessage::Keypoints { request_id, keypoints },
            Err(e) => {
                warn!("[{}] request {} failed: {:#}", addr, request_id, e);
                ServerMessage::Error {
                    request_id,
                    message: format!("{:#}", e),
                }
            }
        };
        protocol::send_message(&mut stream, &reply).await?;
        served += 1;
    }

    info!("[{}] disconnected after {} requests", addr, served);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = env::args().nth(1).unwrap_or_else(|| CONFIG_PATH.to_string());
    let config = Config::load_or_default(&config_path);
    info!("pose server ({})", BUILD_VERSION);

    let source = MoveNetSource::load(&config.pose.model_path)
        .with_context(|| format!("loading {}", config.pose.model_path))?;
    info!("MoveNet loaded from {}", config.pose.model_path);

    let bind_addr: SocketAddr = config
        .pose
        .listen_addr
        .parse()
        .context("invalid pose.listen_addr")?;
    let listener = TcpListener::bind(bind_addr).await?;
    info!("listening on {}", bind_addr);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (tcp, addr) = accepted?;
                info!("client connected: {}", addr);
                let source = source.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_client(tcp, addr, source).await {
                        warn!("[{}] {:#}", addr, e);
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c, shutting down");
                break;
            }
        }
    }
    Ok(())
}
