// Re-export glam for convenience
pub use glam::*;

// SynRad math types
mod aabb;
mod interval;
mod ray;

pub use aabb::Aabb;
pub use interval::Interval;
pub use ray::Ray;

/// Build an orthonormal (u, v) pair perpendicular to `n`.
///
/// `n` must be normalized. The returned basis is right-handed: `u x v = n`.
pub fn orthonormal_basis(n: DVec3) -> (DVec3, DVec3) {
    let helper = if n.x.abs() < 0.9 { DVec3::X } else { DVec3::Y };
    let u = helper.cross(n).normalize();
    let v = n.cross(u);
    (u, v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dvec3_operations() {
        let a = DVec3::new(1.0, 2.0, 3.0);
        let b = DVec3::new(4.0, 5.0, 6.0);
        assert_eq!(a + b, DVec3::new(5.0, 7.0, 9.0));
        assert_eq!(a.dot(b), 32.0);
    }

    #[test]
    fn test_orthonormal_basis() {
        for n in [DVec3::X, DVec3::Y, DVec3::Z, DVec3::new(1.0, 1.0, 1.0).normalize()] {
            let (u, v) = orthonormal_basis(n);
            assert!(u.dot(n).abs() < 1e-12);
            assert!(v.dot(n).abs() < 1e-12);
            assert!(u.dot(v).abs() < 1e-12);
            assert!((u.length() - 1.0).abs() < 1e-12);
            assert!((u.cross(v) - n).length() < 1e-12);
        }
    }
}
