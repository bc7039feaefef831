//! Face cropping between detection and embedding.

use crate::detector::{BoundingBox, DetectedFace};
use crate::frame::Frame;

/// RGB8 crop of a single face.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceImage {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
    /// Rotation reported by the detector, in degrees.
    pub rotation: f32,
}

/// Reports whether `bbox` lies strictly inside a `width` x `height` image.
///
/// Boxes touching any border are rejected, as are empty boxes.
pub fn is_face_on_image(bbox: &BoundingBox, width: u32, height: u32) -> bool {
    let (w, h) = (i64::from(width), i64::from(height));
    bbox.width() > 0
        && bbox.height() > 0
        && bbox.top > 0
        && bbox.left > 0
        && i64::from(bbox.bottom) < h
        && i64::from(bbox.right) < w
}

/// Copies the face region out of `frame`. Returns `None` when the face is not
/// fully on the image.
pub fn crop_face(frame: &Frame, face: &DetectedFace) -> Option<FaceImage> {
    let bbox = &face.bbox;
    if !is_face_on_image(bbox, frame.width(), frame.height()) {
        return None;
    }

    let stride = frame.width() as usize * 3;
    let (left, top) = (bbox.left as usize, bbox.top as usize);
    let (w, h) = (bbox.width() as usize, bbox.height() as usize);

    let src = frame.rgb();
    let mut rgb = Vec::with_capacity(w * h * 3);
    for row in top..top + h {
        let start = row * stride + left * 3;
        rgb.extend_from_slice(&src[start..start + w * 3]);
    }

    Some(FaceImage {
        width: w as u32,
        height: h as u32,
        rgb,
        rotation: face.rotation,
    })
}
