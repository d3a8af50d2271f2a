use anyhow::{Context, Result};
use log::{debug, info, warn};
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureAPIs},
};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::camera::backoff::{ReadBackoff, STALL_THRESHOLD};
use crate::camera::frame::{FrameSource, VideoFrame};
use crate::config::CameraConfig;
use crate::error::CaptureError;
use crate::mapping::Dimensions;

/// Blocking OpenCV capture device.
struct Device {
    index: i32,
    capture: VideoCapture,
}

impl Device {
    fn open(index: i32, width: u32, height: u32, fps: u32) -> Result<Self> {
        check_device_access(index)?;

        let capture = VideoCapture::new(index, VideoCaptureAPIs::CAP_ANY as i32)
            .map_err(|e| {
                warn!("[camera] open {} failed: {}", index, e);
                CaptureError::Unavailable(index)
            })?;
        let mut device = Self { index, capture };
        if !device.capture.is_opened()? {
            return Err(CaptureError::Unavailable(index).into());
        }

        device.capture.set(videoio::CAP_PROP_FRAME_WIDTH, width as f64)?;
        device.capture.set(videoio::CAP_PROP_FRAME_HEIGHT, height as f64)?;
        device.capture.set(videoio::CAP_PROP_FPS, fps as f64)?;
        device.capture.set(videoio::CAP_PROP_BUFFERSIZE, 1.0)?;

        let (w, h) = device.resolution()?;
        if w == 0 || h == 0 {
            return Err(CaptureError::InvalidResolution { index, width: w, height: h }.into());
        }
        let actual_fps = device.capture.get(videoio::CAP_PROP_FPS)?;
        info!("[camera] {} opened at {}x{} @ {}fps", index, w, h, actual_fps);
        Ok(device)
    }

    fn resolution(&self) -> Result<(u32, u32)> {
        let w = self.capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32;
        let h = self.capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32;
        Ok((w, h))
    }

    fn read(&mut self) -> Result<VideoFrame> {
        let mut mat = Mat::default();
        self.capture.read(&mut mat).context("failed to read frame")?;
        if mat.empty() {
            anyhow::bail!("empty frame received");
        }
        mat_to_frame(&mat)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if let Err(e) = self.capture.release() {
            warn!("[camera] release {} failed: {}", self.index, e);
        }
    }
}

fn mat_to_frame(mat: &Mat) -> Result<VideoFrame> {
    // A deep copy is always continuous
    let mat = mat.try_clone()?;
    let bytes = mat.data_bytes().context("frame is not continuous")?;
    Ok(VideoFrame::new(mat.cols() as u32, mat.rows() as u32, bytes.to_vec()))
}

#[cfg(target_os = "linux")]
fn check_device_access(index: i32) -> Result<(), CaptureError> {
    let path = format!("/dev/video{}", index);
    match std::fs::File::open(&path) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(CaptureError::PermissionDenied(index))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(CaptureError::Unavailable(index)),
        // Let OpenCV report anything else
        Err(_) => Ok(()),
    }
}

#[cfg(not(target_os = "linux"))]
fn check_device_access(_index: i32) -> Result<(), CaptureError> {
    Ok(())
}

/// Captures on a background thread and hands out the newest frame.
///
/// Dropping the camera stops the thread and releases the device.
pub struct OpenCvCamera {
    latest: Arc<Mutex<Option<VideoFrame>>>,
    frame_id: Arc<AtomicU64>,
    width: Arc<AtomicU32>,
    height: Arc<AtomicU32>,
    running: Arc<AtomicBool>,
    last_taken: u64,
    handle: Option<thread::JoinHandle<()>>,
}

impl OpenCvCamera {
    /// Open the device and start capturing. Acquisition failures carry a
    /// [`CaptureError`] that callers can downcast to.
    pub fn start(config: &CameraConfig) -> Result<Self> {
        let mut device = Device::open(config.index, config.width, config.height, config.fps)?;
        let (w, h) = device.resolution()?;

        let latest = Arc::new(Mutex::new(None::<VideoFrame>));
        let frame_id = Arc::new(AtomicU64::new(0));
        let width = Arc::new(AtomicU32::new(w));
        let height = Arc::new(AtomicU32::new(h));
        let running = Arc::new(AtomicBool::new(true));

        let handle = {
            let latest = latest.clone();
            let frame_id = frame_id.clone();
            let width = width.clone();
            let height = height.clone();
            let running = running.clone();
            thread::spawn(move || {
                let mut backoff = ReadBackoff::default();
                while running.load(Ordering::Acquire) {
                    match device.read() {
                        Ok(frame) => {
                            let streak = backoff.succeeded();
                            if streak >= STALL_THRESHOLD {
                                info!("[camera] reads recovered after {} failures", streak);
                            }
                            width.store(frame.width, Ordering::Release);
                            height.store(frame.height, Ordering::Release);
                            if let Ok(mut slot) = latest.lock() {
                                *slot = Some(frame);
                            }
                            frame_id.fetch_add(1, Ordering::Release);
                        }
                        Err(e) => {
                            let delay = backoff.failed();
                            if backoff.just_stalled() {
                                warn!("[camera] {} consecutive read failures: {:#}", backoff.failures(), e);
                            } else {
                                debug!("[camera] read error: {:#}", e);
                            }
                            thread::sleep(delay);
                        }
                    }
                }
                // device dropped here, releasing the capture
            })
        };

        Ok(Self {
            latest,
            frame_id,
            width,
            height,
            running,
            last_taken: 0,
            handle: Some(handle),
        })
    }
}

impl FrameSource for OpenCvCamera {
    fn dimensions(&self) -> Dimensions {
        Dimensions::new(
            self.width.load(Ordering::Acquire) as f32,
            self.height.load(Ordering::Acquire) as f32,
        )
    }

    fn grab(&mut self) -> Result<Option<VideoFrame>> {
        let id = self.frame_id.load(Ordering::Acquire);
        if id == self.last_taken {
            return Ok(None);
        }
        let frame = self
            .latest
            .lock()
            .map_err(|_| anyhow::anyhow!("capture thread poisoned the frame slot"))?
            .clone();
        self.last_taken = id;
        Ok(frame)
    }
}

impl Drop for OpenCvCamera {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("[camera] capture thread panicked");
            }
        }
        info!("[camera] released");
    }
}
