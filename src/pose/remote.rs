use anyhow::{bail, Context, Result};
use futures::FutureExt;
use log::info;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::camera::VideoFrame;
use crate::pose::source::{PoseFuture, PoseSource};
use crate::protocol::{self, ClientMessage, MessageStream, ServerMessage};

/// Pose estimation delegated to a `pose_server` over TCP.
pub struct RemotePoseSource {
    stream: Arc<Mutex<MessageStream>>,
    next_id: u64,
}

impl RemotePoseSource {
    pub async fn connect(addr: &str) -> Result<Self> {
        let tcp = TcpStream::connect(addr)
            .await
            .with_context(|| format!("failed to connect to pose server {}", addr))?;
        tcp.set_nodelay(true)?;
        info!("[pose] connected to {}", addr);
        Ok(Self {
            stream: Arc::new(Mutex::new(protocol::message_stream(tcp))),
            next_id: 0,
        })
    }
}

impl PoseSource for RemotePoseSource {
    fn estimate(&mut self, frame: VideoFrame) -> PoseFuture {
        self.next_id += 1;
        let request_id = self.next_id;
        let stream = self.stream.clone();
        async move {
            // The lock keeps request and reply paired
            let mut stream = stream.lock().await;
            protocol::send_message(&mut *stream, &ClientMessage::Estimate { request_id, frame }).await?;
            let reply: ServerMessage = protocol::recv_message(&mut *stream)
                .await?
                .context("pose server closed the connection")?;
            match reply {
                ServerMessage::Keypoints { request_id: id, keypoints } if id == request_id => Ok(keypoints),
                ServerMessage::Error { message, .. } => bail!("pose server: {}", message),
                ServerMessage::Keypoints { request_id: id, .. } => {
                    bail!("reply for request {} while waiting for {}", id, request_id)
                }
            }
        }
        .boxed()
    }
}
