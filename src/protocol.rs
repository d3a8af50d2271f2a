//! TCP protocol between the overlay loop and a remote pose server.
//!
//! Length-delimited frames carrying bincode-encoded messages. One request is
//! answered by exactly one reply with the same `request_id`.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::camera::VideoFrame;
use crate::pose::Keypoint;

/// Largest accepted frame; a 1080p BGR frame is ~6MB
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Overlay → pose server
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Estimate { request_id: u64, frame: VideoFrame },
}

/// Pose server → overlay
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Keypoints in the pixel space of the submitted frame
    Keypoints { request_id: u64, keypoints: Vec<Keypoint> },
    Error { request_id: u64, message: String },
}

pub type MessageStream = Framed<TcpStream, LengthDelimitedCodec>;

/// Wrap a TCP stream with length-delimited framing.
pub fn message_stream(stream: TcpStream) -> MessageStream {
    let codec = LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec();
    Framed::new(stream, codec)
}

pub fn encode<T: Serialize>(msg: &T) -> anyhow::Result<Bytes> {
    Ok(Bytes::from(bincode::serialize(msg)?))
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> anyhow::Result<T> {
    Ok(bincode::deserialize(bytes)?)
}

/// Send a serializable message (bincode + length prefix).
pub async fn send_message<T: Serialize>(
    stream: &mut MessageStream,
    msg: &T,
) -> anyhow::Result<()> {
    stream.send(encode(msg)?).await?;
    Ok(())
}

/// Receive and deserialize a message. `None` when the peer closed cleanly.
pub async fn recv_message<T: DeserializeOwned>(
    stream: &mut MessageStream,
) -> anyhow::Result<Option<T>> {
    match stream.next().await {
        Some(Ok(bytes)) => Ok(Some(decode(&bytes)?)),
        Some(Err(e)) => Err(e.into()),
        None => Ok(None),
    }
}
