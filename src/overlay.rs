//! Overlay transform and the sinks that hand it to a renderer.

use anyhow::{Context, Result};
use log::{debug, info};
use rosc::{decoder, encoder, OscMessage, OscPacket, OscType};
use std::cell::Cell;
use std::io;
use std::net::{SocketAddr, UdpSocket};

use crate::config::{GarmentEntry, SinkConfig};
use crate::mapping::{Dimensions, Vec3};

/// OSC address the renderer listens on
pub const TRANSFORM_OSC_ADDR: &str = "/garment/transform";

/// OSC address the renderer reports its canvas size on. Args: width, height
pub const VIEWPORT_OSC_ADDR: &str = "/garment/viewport";

const RECV_BUFFER_SIZE: usize = 1536;

/// Position and uniform scale of the garment in render space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    /// Always finite and > 0
    pub scale: f32,
}

impl Transform {
    pub fn new(position: Vec3, scale: f32) -> Self {
        Self { position, scale }
    }

    /// Origin with the given scale
    pub fn at_origin(scale: f32) -> Self {
        Self {
            position: Vec3::default(),
            scale,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.scale.is_finite()
    }
}

/// Consumer of the per-frame transform.
pub trait OverlaySink {
    /// Current render target size. Sampled every frame.
    fn viewport(&self) -> Dimensions;

    /// Place `garment` at `transform`. Called whenever either changes.
    fn apply(&mut self, garment: &GarmentEntry, transform: &Transform) -> Result<()>;
}

/// Build the OSC message for one transform update.
/// Args: id, model, x, y, z, scale
pub fn build_osc_message(garment: &GarmentEntry, transform: &Transform) -> OscMessage {
    OscMessage {
        addr: TRANSFORM_OSC_ADDR.to_string(),
        args: vec![
            OscType::String(garment.id.clone()),
            OscType::String(garment.model.clone()),
            OscType::Float(transform.position.x),
            OscType::Float(transform.position.y),
            OscType::Float(transform.position.z),
            OscType::Float(transform.scale),
        ],
    }
}

pub fn encode_osc_message(msg: &OscMessage) -> Result<Vec<u8>> {
    let packet = OscPacket::Message(msg.clone());
    let encoded = encoder::encode(&packet)?;
    Ok(encoded)
}

/// Canvas size carried by a `/garment/viewport` message, if `packet` holds
/// one with a usable size. The last one wins inside a bundle.
pub fn viewport_from_packet(packet: &OscPacket) -> Option<Dimensions> {
    match packet {
        OscPacket::Message(msg) => viewport_from_message(msg),
        OscPacket::Bundle(bundle) => bundle.content.iter().filter_map(viewport_from_packet).last(),
    }
}

fn viewport_from_message(msg: &OscMessage) -> Option<Dimensions> {
    if msg.addr != VIEWPORT_OSC_ADDR {
        return None;
    }
    let value = |arg: &OscType| match *arg {
        OscType::Float(v) => Some(v),
        OscType::Double(v) => Some(v as f32),
        OscType::Int(v) => Some(v as f32),
        _ => None,
    };
    match msg.args.as_slice() {
        [w, h] => Some(Dimensions::new(value(w)?, value(h)?)).filter(Dimensions::is_usable),
        _ => None,
    }
}

/// Sends transforms to a renderer over OSC/UDP.
///
/// The same socket receives `/garment/viewport` reports from the renderer;
/// they are drained whenever the viewport is sampled, so a resize reaches
/// the next processed frame.
pub struct OscOverlaySink {
    socket: UdpSocket,
    target_addr: String,
    viewport: Cell<Dimensions>,
}

impl OscOverlaySink {
    /// `viewport` is used until the renderer reports its own size.
    pub fn new(bind_addr: &str, target_addr: &str, viewport: Dimensions) -> Result<Self> {
        let socket = UdpSocket::bind(bind_addr)
            .with_context(|| format!("failed to bind OSC socket on {}", bind_addr))?;
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket,
            target_addr: target_addr.to_string(),
            viewport: Cell::new(viewport),
        })
    }

    pub fn from_config(config: &SinkConfig) -> Result<Self> {
        Self::new(
            &config.listen_addr,
            &config.addr,
            Dimensions::new(config.viewport_width, config.viewport_height),
        )
    }

    /// Address the renderer should send viewport reports to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    fn drain_viewport_reports(&self) {
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        loop {
            let (len, from) = match self.socket.recv_from(&mut buf) {
                Ok(received) => received,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    debug!("[sink] receive failed: {}", e);
                    return;
                }
            };
            let packet = match decoder::decode_udp(&buf[..len]) {
                Ok((_, packet)) => packet,
                Err(e) => {
                    debug!("[sink] undecodable OSC packet from {}: {:?}", from, e);
                    continue;
                }
            };
            match viewport_from_packet(&packet) {
                Some(viewport) if viewport != self.viewport.get() => {
                    info!("[sink] viewport {}x{}", viewport.width, viewport.height);
                    self.viewport.set(viewport);
                }
                Some(_) => {}
                None => debug!("[sink] ignoring OSC packet from {}", from),
            }
        }
    }
}

impl OverlaySink for OscOverlaySink {
    fn viewport(&self) -> Dimensions {
        self.drain_viewport_reports();
        self.viewport.get()
    }

    fn apply(&mut self, garment: &GarmentEntry, transform: &Transform) -> Result<()> {
        let msg = build_osc_message(garment, transform);
        let data = encode_osc_message(&msg)?;
        self.socket
            .send_to(&data, &self.target_addr)
            .with_context(|| format!("failed to send transform to {}", self.target_addr))?;
        Ok(())
    }
}

/// Logs every transform; used by the replay tool.
pub struct LogSink {
    viewport: Dimensions,
    applied: usize,
}

impl LogSink {
    pub fn new(viewport: Dimensions) -> Self {
        Self { viewport, applied: 0 }
    }

    pub fn applied(&self) -> usize {
        self.applied
    }
}

impl OverlaySink for LogSink {
    fn viewport(&self) -> Dimensions {
        self.viewport
    }

    fn apply(&mut self, garment: &GarmentEntry, transform: &Transform) -> Result<()> {
        self.applied += 1;
        info!(
            "[sink] {} pos=({:.2}, {:.2}, {:.3}) scale={:.3}",
            garment.id, transform.position.x, transform.position.y, transform.position.z, transform.scale
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn garment() -> GarmentEntry {
        GarmentEntry {
            id: "model-1".to_string(),
            name: "Supreme Shirt".to_string(),
            model: "/3d/1.glb".to_string(),
        }
    }

    #[test]
    fn test_build_osc_message_address() {
        let msg = build_osc_message(&garment(), &Transform::at_origin(1.0));
        assert_eq!(msg.addr, TRANSFORM_OSC_ADDR);
    }

    #[test]
    fn test_build_osc_message_args() {
        let transform = Transform::new(Vec3::new(1.0, 2.0, 3.0), 0.5);
        let msg = build_osc_message(&garment(), &transform);

        // id, model, x, y, z, scale
        assert_eq!(msg.args.len(), 6);
        assert_eq!(msg.args[0], OscType::String("model-1".to_string()));
        assert_eq!(msg.args[1], OscType::String("/3d/1.glb".to_string()));
        assert_eq!(msg.args[2], OscType::Float(1.0));
        assert_eq!(msg.args[3], OscType::Float(2.0));
        assert_eq!(msg.args[4], OscType::Float(3.0));
        assert_eq!(msg.args[5], OscType::Float(0.5));
    }

    #[test]
    fn test_encode_osc_message() {
        let msg = build_osc_message(&garment(), &Transform::at_origin(1.0));
        let encoded = encode_osc_message(&msg).unwrap();
        assert!(!encoded.is_empty());
        // OSC packets are 4-byte aligned
        assert_eq!(encoded.len() % 4, 0);
    }

    #[test]
    fn test_osc_sink_delivers_datagram() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = receiver.local_addr().unwrap().to_string();
        let mut sink = OscOverlaySink::new("127.0.0.1:0", &addr, Dimensions::new(1280.0, 720.0)).unwrap();
        sink.apply(&garment(), &Transform::at_origin(1.0)).unwrap();

        let mut buf = [0u8; 512];
        let (len, _) = receiver.recv_from(&mut buf).unwrap();
        let (_, packet) = rosc::decoder::decode_udp(&buf[..len]).unwrap();
        match packet {
            OscPacket::Message(msg) => assert_eq!(msg.addr, TRANSFORM_OSC_ADDR),
            other => panic!("unexpected packet {:?}", other),
        }
    }

    fn viewport_message(args: Vec<OscType>) -> OscPacket {
        OscPacket::Message(OscMessage {
            addr: VIEWPORT_OSC_ADDR.to_string(),
            args,
        })
    }

    #[test]
    fn test_viewport_from_packet() {
        let packet = viewport_message(vec![OscType::Float(800.0), OscType::Int(600)]);
        assert_eq!(viewport_from_packet(&packet), Some(Dimensions::new(800.0, 600.0)));

        let zero = viewport_message(vec![OscType::Float(0.0), OscType::Float(600.0)]);
        assert_eq!(viewport_from_packet(&zero), None);
        let short = viewport_message(vec![OscType::Float(800.0)]);
        assert_eq!(viewport_from_packet(&short), None);
        let text = viewport_message(vec![OscType::String("800".into()), OscType::Float(600.0)]);
        assert_eq!(viewport_from_packet(&text), None);

        let other = OscPacket::Message(build_osc_message(&garment(), &Transform::at_origin(1.0)));
        assert_eq!(viewport_from_packet(&other), None);
    }

    #[test]
    fn test_viewport_from_bundle_takes_last() {
        let bundle = OscPacket::Bundle(rosc::OscBundle {
            timetag: rosc::OscTime { seconds: 0, fractional: 1 },
            content: vec![
                viewport_message(vec![OscType::Float(640.0), OscType::Float(480.0)]),
                viewport_message(vec![OscType::Float(1920.0), OscType::Float(1080.0)]),
            ],
        });
        assert_eq!(viewport_from_packet(&bundle), Some(Dimensions::new(1920.0, 1080.0)));
    }

    /// Sample the sink until the reported size arrives over loopback.
    fn wait_for_viewport(sink: &OscOverlaySink, expected: Dimensions) -> Dimensions {
        let mut seen = sink.viewport();
        for _ in 0..200 {
            if seen == expected {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
            seen = sink.viewport();
        }
        seen
    }

    #[test]
    fn test_osc_sink_follows_renderer_resize() {
        let renderer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let renderer_addr = renderer.local_addr().unwrap().to_string();
        let sink = OscOverlaySink::new("127.0.0.1:0", &renderer_addr, Dimensions::new(1280.0, 720.0)).unwrap();
        assert_eq!(sink.viewport(), Dimensions::new(1280.0, 720.0));

        let resize = encoder::encode(&viewport_message(vec![OscType::Float(800.0), OscType::Float(600.0)])).unwrap();
        renderer.send_to(&resize, sink.local_addr().unwrap()).unwrap();
        assert_eq!(wait_for_viewport(&sink, Dimensions::new(800.0, 600.0)), Dimensions::new(800.0, 600.0));

        // Garbage and unusable sizes leave the viewport alone
        renderer.send_to(b"not osc", sink.local_addr().unwrap()).unwrap();
        let zero = encoder::encode(&viewport_message(vec![OscType::Float(0.0), OscType::Float(0.0)])).unwrap();
        renderer.send_to(&zero, sink.local_addr().unwrap()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(sink.viewport(), Dimensions::new(800.0, 600.0));
    }

    #[test]
    fn test_resize_changes_target_of_next_frame() {
        use crate::config::Config;
        use crate::pipeline::OverlayContext;
        use crate::pose::{BodyPart, Keypoint};

        let renderer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let renderer_addr = renderer.local_addr().unwrap().to_string();
        let mut sink = OscOverlaySink::new("127.0.0.1:0", &renderer_addr, Dimensions::new(1280.0, 720.0)).unwrap();

        let resize = encoder::encode(&viewport_message(vec![OscType::Float(100.0), OscType::Float(50.0)])).unwrap();
        renderer.send_to(&resize, sink.local_addr().unwrap()).unwrap();
        let target = wait_for_viewport(&sink, Dimensions::new(100.0, 50.0));
        assert_eq!(target, Dimensions::new(100.0, 50.0));

        let mut config = Config::default();
        config.solver.snap_on_first_lock = true;
        let mut ctx = OverlayContext::new(&config).unwrap();
        ctx.select_garment("model-1");
        let torso = [
            Keypoint::new(BodyPart::LeftShoulder, 100.0, 50.0, 0.9),
            Keypoint::new(BodyPart::RightShoulder, 200.0, 50.0, 0.9),
            Keypoint::new(BodyPart::LeftHip, 110.0, 150.0, 0.9),
            Keypoint::new(BodyPart::RightHip, 190.0, 150.0, 0.9),
        ];
        let report = ctx.process(&torso, Dimensions::new(640.0, 480.0), sink.viewport());
        assert!(report.detected);
        // Centre (150, 100) mapped into the 100x50 viewport the renderer reported
        assert!((report.transform.position.x - (150.0 * 100.0 / 640.0 - 50.0)).abs() < 1e-3);
        assert!((report.transform.position.y - (25.0 - 100.0 * 50.0 / 480.0)).abs() < 1e-3);
        assert!(ctx.push_to_sink(&mut sink).unwrap());
    }

    #[test]
    fn test_transform_finite() {
        assert!(Transform::at_origin(1.0).is_finite());
        assert!(!Transform::new(Vec3::new(f32::NAN, 0.0, 0.0), 1.0).is_finite());
        assert!(!Transform::at_origin(f32::INFINITY).is_finite());
    }
}
