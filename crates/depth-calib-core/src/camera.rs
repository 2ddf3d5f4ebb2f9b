//! Depth camera model: pinhole intrinsics and per-pixel depth lookup.

use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

/// Pinhole intrinsics of the (color-aligned) depth stream, without distortion.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PinholeIntrinsics {
    pub width: u32,
    pub height: u32,
    pub fx: f64,
    pub fy: f64,
    /// Principal point, pixels.
    pub ppx: f64,
    pub ppy: f64,
}

impl PinholeIntrinsics {
    /// Camera-space point for a pixel and a depth reading in meters.
    ///
    /// A zero depth yields the all-zero point.
    #[inline]
    pub fn deproject(&self, pixel: Point2<f64>, depth: f64) -> Point3<f64> {
        let x = (pixel.x - self.ppx) / self.fx;
        let y = (pixel.y - self.ppy) / self.fy;
        Point3::new(x * depth, y * depth, depth)
    }

    /// Pixel of a camera-space point, `None` behind the camera.
    pub fn project(&self, p: &Point3<f64>) -> Option<Point2<f64>> {
        if p.z <= 0.0 {
            return None;
        }
        Some(Point2::new(
            p.x / p.z * self.fx + self.ppx,
            p.y / p.z * self.fy + self.ppy,
        ))
    }
}

/// Depth half of a camera frame.
pub trait DepthField {
    /// Image size `(width, height)` in pixels.
    fn dimensions(&self) -> (u32, u32);

    /// Depth in meters at a pixel; `0.0` when missing or out of range.
    fn distance_at(&self, x: i32, y: i32) -> f64;

    fn deproject(&self, pixel: Point2<i32>, depth: f64) -> Point3<f64>;
}

/// Read depth at a pixel (clamped into the image) and deproject it.
pub fn localize<D: DepthField + ?Sized>(depth: &D, pixel: Point2<i32>) -> Point3<f64> {
    let (w, h) = depth.dimensions();
    let clamped = Point2::new(
        pixel.x.clamp(0, w.saturating_sub(1) as i32),
        pixel.y.clamp(0, h.saturating_sub(1) as i32),
    );
    let d = depth.distance_at(clamped.x, clamped.y);
    depth.deproject(clamped, d)
}

#[derive(thiserror::Error, Debug)]
pub enum DepthImageError {
    #[error("depth buffer has {got} samples, expected {expected} ({width}x{height})")]
    BufferSize {
        width: u32,
        height: u32,
        expected: usize,
        got: usize,
    },
}

/// Dense depth map in meters, row-major.
#[derive(Clone, Debug)]
pub struct DepthImage {
    width: u32,
    height: u32,
    data: Vec<f32>,
    intrinsics: PinholeIntrinsics,
}

impl DepthImage {
    /// Wrap a meter-valued buffer; the size comes from `intrinsics`.
    pub fn new(data: Vec<f32>, intrinsics: PinholeIntrinsics) -> Result<Self, DepthImageError> {
        let (width, height) = (intrinsics.width, intrinsics.height);
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(DepthImageError::BufferSize {
                width,
                height,
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
            intrinsics,
        })
    }

    /// Convert raw 16-bit depth units (`z16`) with the device depth scale (meters per unit).
    pub fn from_raw_z16(
        raw: &[u16],
        depth_scale: f32,
        intrinsics: PinholeIntrinsics,
    ) -> Result<Self, DepthImageError> {
        let data = raw.iter().map(|&d| d as f32 * depth_scale).collect();
        Self::new(data, intrinsics)
    }

    #[inline]
    pub fn intrinsics(&self) -> &PinholeIntrinsics {
        &self.intrinsics
    }

    #[inline]
    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

impl DepthField for DepthImage {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn distance_at(&self, x: i32, y: i32) -> f64 {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return 0.0;
        }
        let d = self.data[y as usize * self.width as usize + x as usize];
        if d.is_finite() && d > 0.0 {
            d as f64
        } else {
            0.0
        }
    }

    fn deproject(&self, pixel: Point2<i32>, depth: f64) -> Point3<f64> {
        self.intrinsics
            .deproject(Point2::new(pixel.x as f64, pixel.y as f64), depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::is_zero_sentinel;
    use approx::assert_relative_eq;

    fn intrinsics() -> PinholeIntrinsics {
        PinholeIntrinsics {
            width: 8,
            height: 6,
            fx: 600.0,
            fy: 600.0,
            ppx: 4.0,
            ppy: 3.0,
        }
    }

    #[test]
    fn principal_point_deprojects_onto_optical_axis() {
        let p = intrinsics().deproject(Point2::new(4.0, 3.0), 1.25);
        assert_eq!(p, Point3::new(0.0, 0.0, 1.25));
    }

    #[test]
    fn project_inverts_deproject() {
        let k = intrinsics();
        let p = k.deproject(Point2::new(7.0, 1.0), 2.0);
        let px = k.project(&p).expect("in front");
        assert_relative_eq!(px.x, 7.0, epsilon = 1e-12);
        assert_relative_eq!(px.y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn missing_depth_gives_zero_sentinel() {
        let mut data = vec![1.0_f32; 48];
        data[6 * 8 / 2] = 0.0;
        let img = DepthImage::new(data, intrinsics()).expect("image");

        assert_eq!(img.distance_at(0, 3), 0.0);
        assert_eq!(img.distance_at(-1, 0), 0.0);
        assert_eq!(img.distance_at(8, 0), 0.0);
        assert!(is_zero_sentinel(&localize(&img, Point2::new(0, 3))));
    }

    #[test]
    fn localize_clamps_into_image() {
        let img = DepthImage::from_raw_z16(&[2000_u16; 48], 0.001, intrinsics()).expect("image");
        let p = localize(&img, Point2::new(50, -4));
        assert_relative_eq!(p.z, 2.0, epsilon = 1e-6);
        assert_relative_eq!(p.x, (7.0 - 4.0) / 600.0 * p.z, epsilon = 1e-9);
    }

    #[test]
    fn buffer_size_is_validated() {
        assert!(matches!(
            DepthImage::new(vec![0.0; 10], intrinsics()),
            Err(DepthImageError::BufferSize { expected: 48, got: 10, .. })
        ));
    }
}
