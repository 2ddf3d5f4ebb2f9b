//! Area-weighted polygon centroid used to reduce a marker quad to one pixel.

use nalgebra::Point2;

/// Polygons with |signed area| below this (px^2) are treated as degenerate.
pub const MIN_POLYGON_AREA: f64 = 1e-9;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CentroidError {
    #[error("degenerate polygon ({vertices} vertices, signed area {signed_area})")]
    DegenerateGeometry { vertices: usize, signed_area: f64 },
}

/// Signed area of a closed polygon (shoelace formula).
///
/// Positive for counter-clockwise traversal in a y-up frame.
pub fn signed_area(vertices: &[Point2<f32>]) -> f64 {
    let n = vertices.len();
    let mut acc = 0.0_f64;
    for i in 0..n {
        let p0 = vertices[i];
        let p1 = vertices[(i + 1) % n];
        acc += p0.x as f64 * p1.y as f64 - p1.x as f64 * p0.y as f64;
    }
    0.5 * acc
}

/// Centroid of a simple polygon, truncated to integer pixel coordinates.
///
/// Vertices must form a simple polygon traversed in one consistent winding
/// order; either direction gives the same result.
pub fn centroid(vertices: &[Point2<f32>]) -> Result<Point2<i32>, CentroidError> {
    let c = centroid_f64(vertices)?;
    Ok(Point2::new(c.x as i32, c.y as i32))
}

/// Sub-pixel centroid of a simple polygon.
pub fn centroid_f64(vertices: &[Point2<f32>]) -> Result<Point2<f64>, CentroidError> {
    let n = vertices.len();
    let degenerate = |signed_area: f64| CentroidError::DegenerateGeometry {
        vertices: n,
        signed_area,
    };

    if n < 3 || vertices.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return Err(degenerate(0.0));
    }

    let mut area2 = 0.0_f64;
    let mut cx = 0.0_f64;
    let mut cy = 0.0_f64;
    for i in 0..n {
        let (x0, y0) = (vertices[i].x as f64, vertices[i].y as f64);
        let (x1, y1) = (vertices[(i + 1) % n].x as f64, vertices[(i + 1) % n].y as f64);
        let cross = x0 * y1 - x1 * y0;
        area2 += cross;
        cx += (x0 + x1) * cross;
        cy += (y0 + y1) * cross;
    }

    let area = 0.5 * area2;
    if area.abs() < MIN_POLYGON_AREA {
        return Err(degenerate(area));
    }

    Ok(Point2::new(cx / (6.0 * area), cy / (6.0 * area)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poly(pts: &[(f32, f32)]) -> Vec<Point2<f32>> {
        pts.iter().map(|&(x, y)| Point2::new(x, y)).collect()
    }

    #[test]
    fn square_centroid_is_its_center() {
        let square = poly(&[(0.0, 0.0), (2.0, 0.0), (2.0, 2.0), (0.0, 2.0)]);
        assert_eq!(centroid(&square).expect("centroid"), Point2::new(1, 1));
    }

    #[test]
    fn winding_direction_does_not_matter() {
        let quad = poly(&[(10.0, 10.0), (50.0, 12.0), (48.0, 44.0), (12.0, 40.0)]);
        let mut reversed = quad.clone();
        reversed.reverse();

        let a = centroid_f64(&quad).expect("ccw");
        let b = centroid_f64(&reversed).expect("cw");
        assert!((a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9);
        assert!(signed_area(&quad) * signed_area(&reversed) < 0.0);
    }

    #[test]
    fn truncates_toward_zero() {
        // Triangle centroid is the vertex mean: (101/3, 200/3) = (33.67, 66.67).
        let tri = poly(&[(0.0, 0.0), (100.0, 100.0), (1.0, 100.0)]);
        assert_eq!(centroid(&tri).expect("centroid"), Point2::new(33, 66));

        let shifted = poly(&[(-3.0, -3.0), (-1.0, -3.0), (-1.0, -1.0), (-3.0, -1.0)]);
        assert_eq!(centroid(&shifted).expect("centroid"), Point2::new(-2, -2));
    }

    #[test]
    fn collinear_polygon_is_degenerate() {
        let line = poly(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (3.0, 3.0)]);
        let err = centroid(&line).expect_err("degenerate");
        assert!(matches!(
            err,
            CentroidError::DegenerateGeometry { vertices: 4, .. }
        ));
    }

    #[test]
    fn too_few_or_non_finite_vertices_are_degenerate() {
        assert!(centroid(&poly(&[(0.0, 0.0), (1.0, 0.0)])).is_err());
        assert!(centroid(&poly(&[(0.0, 0.0), (f32::NAN, 0.0), (1.0, 1.0)])).is_err());
    }
}
