use anyhow::{ensure, Result};
use ndarray::Array4;
use opencv::{
    core::{AlgorithmHint, Mat, Scalar, Size, CV_32FC3, CV_8UC3},
    imgproc,
    prelude::*,
};

use crate::camera::VideoFrame;

/// MoveNet input edge length
pub const MOVENET_INPUT_SIZE: i32 = 192;

/// Copy a packed BGR frame into an OpenCV Mat.
pub fn frame_to_mat(frame: &VideoFrame) -> Result<Mat> {
    ensure!(frame.is_well_formed(), "frame buffer does not match {}x{}", frame.width, frame.height);
    let mut mat = Mat::new_rows_cols_with_default(
        frame.height as i32,
        frame.width as i32,
        CV_8UC3,
        Scalar::all(0.0),
    )?;
    mat.data_bytes_mut()?.copy_from_slice(&frame.bgr);
    Ok(mat)
}

/// Convert a frame into the MoveNet input tensor.
///
/// - BGR -> RGB
/// - resize to 192x192 (aspect ratio is not preserved; outputs are
///   normalised per axis, so mapping back uses the frame's own size)
/// - [1, 192, 192, 3] f32 tensor (0.0-255.0)
pub fn preprocess_for_movenet(frame: &VideoFrame) -> Result<Array4<f32>> {
    let bgr = frame_to_mat(frame)?;

    let mut rgb = Mat::default();
    imgproc::cvt_color(&bgr, &mut rgb, imgproc::COLOR_BGR2RGB, 0, AlgorithmHint::ALGO_HINT_DEFAULT)?;

    let mut resized = Mat::default();
    imgproc::resize(
        &rgb,
        &mut resized,
        Size::new(MOVENET_INPUT_SIZE, MOVENET_INPUT_SIZE),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )?;

    let mut float_mat = Mat::default();
    resized.convert_to(&mut float_mat, CV_32FC3, 1.0, 0.0)?;

    let size = MOVENET_INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, size, size, 3));
    for y in 0..MOVENET_INPUT_SIZE {
        for x in 0..MOVENET_INPUT_SIZE {
            let pixel = float_mat.at_2d::<opencv::core::Vec3f>(y, x)?;
            for c in 0..3 {
                tensor[[0, y as usize, x as usize, c]] = pixel[c];
            }
        }
    }

    Ok(tensor)
}
