//! Geometric primitives used by gating and the anatomical repairs

use crate::bbox::BoundingBox;
use nalgebra::{Point3, Vector2, Vector3};

/// Returned by [`segment_distance`] when no closest pair exists on the segments
pub const SEGMENT_SENTINEL: f64 = 1_000_000.0;

/// Coordinate plane used by [`projected_intersection`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plane {
    Xy,
    Xz,
}

impl Plane {
    fn project(self, p: &Point3<f64>) -> Vector2<f64> {
        match self {
            Plane::Xy => Vector2::new(p.x, p.y),
            Plane::Xz => Vector2::new(p.x, p.z),
        }
    }
}

/// Closest distance between segments `p0-p1` and `q0-q1`.
///
/// The closest points are computed on the infinite lines. With
/// `infinite = false` the distance is only reported when both closest
/// points fall inside their segments, otherwise [`SEGMENT_SENTINEL`] is
/// returned. Parallel lines (zero denominator) always yield the sentinel.
pub fn segment_distance(
    p0: &Point3<f64>,
    p1: &Point3<f64>,
    q0: &Point3<f64>,
    q1: &Point3<f64>,
    infinite: bool,
) -> f64 {
    let u = p1 - p0;
    let v = q1 - q0;
    let w0 = p0 - q0;

    let a = u.dot(&u);
    let b = u.dot(&v);
    let c = v.dot(&v);
    let d = u.dot(&w0);
    let e = v.dot(&w0);

    let denom = a * c - b * b;
    if denom == 0.0 {
        return SEGMENT_SENTINEL;
    }

    let s = (b * e - c * d) / denom;
    let t = (a * e - b * d) / denom;
    let within = (0.0..=1.0).contains(&s) && (0.0..=1.0).contains(&t);
    if infinite || within {
        (w0 + u * s - v * t).norm()
    } else {
        SEGMENT_SENTINEL
    }
}

/// Tests whether segments `a1-a2` and `b1-b2` cross when projected onto
/// `plane`, and whether the crossing points lifted back onto the original
/// 3D segments lie within `gate` of each other.
pub fn projected_intersection(
    a1: &Point3<f64>,
    a2: &Point3<f64>,
    b1: &Point3<f64>,
    b2: &Point3<f64>,
    plane: Plane,
    gate: f64,
) -> bool {
    let (pa1, pa2) = (plane.project(a1), plane.project(a2));
    let (pb1, pb2) = (plane.project(b1), plane.project(b2));

    let da = pa2 - pa1;
    let db = pb2 - pb1;
    let dp = pa1 - pb1;
    let da_perp = Vector2::new(-da.y, da.x);

    let denom = da_perp.dot(&db);
    if denom == 0.0 {
        return false;
    }
    let hit = pb1 + db * (da_perp.dot(&dp) / denom);

    let within = |p: &Vector2<f64>, q: &Vector2<f64>| {
        hit.x >= p.x.min(q.x)
            && hit.x <= p.x.max(q.x)
            && hit.y >= p.y.min(q.y)
            && hit.y <= p.y.max(q.y)
    };
    if !within(&pa1, &pa2) || !within(&pb1, &pb2) {
        return false;
    }

    let lift = |from: &Point3<f64>, to: &Point3<f64>, start: &Vector2<f64>, dir: &Vector2<f64>| {
        let len = dir.norm();
        let t = if len > 0.0 { (hit - start).norm() / len } else { 0.0 };
        from + (to - from) * t
    };
    let on_a = lift(a1, a2, &pa1, &da);
    let on_b = lift(b1, b2, &pb1, &db);

    (on_a - on_b).norm() < gate
}

/// Angle in `[0, pi]` between two vectors.
///
/// Equal vectors give 0 and exactly opposite vectors give pi. A zero-length
/// vector against any different vector gives pi/2.
pub fn angle_between(v1: &Vector3<f64>, v2: &Vector3<f64>) -> f64 {
    if v1 == v2 {
        return 0.0;
    }
    if *v1 == -v2 {
        return std::f64::consts::PI;
    }

    let n1 = v1.norm();
    let n2 = v2.norm();
    if n1 == 0.0 || n2 == 0.0 {
        return std::f64::consts::FRAC_PI_2;
    }

    let cos = (v1.dot(v2) / (n1 * n2)).clamp(-1.0, 1.0);
    cos.acos()
}

/// Inclusive six-sided containment test
pub fn inside_box(point: &Point3<f64>, bbox: &BoundingBox) -> bool {
    bbox.contains(point)
}
