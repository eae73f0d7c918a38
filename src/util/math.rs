//! Math type re-exports and transform helpers.

pub use glam::{DAffine3, DMat3, DQuat, DVec2, DVec3, Mat3, Vec2, Vec3};

/// An affine transform split into the three parts Quipu persists.
///
/// The rotation is assumed orthonormal; nothing here re-validates it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Decomposed {
    pub position: DVec3,
    pub rotation: DMat3,
    pub scale: DVec3,
}

impl Decomposed {
    /// Split `t` into position, rotation and per-axis scale.
    ///
    /// Scale is the length of each basis column; the rotation is the basis
    /// with that scale divided out. A zero-length column leaves its
    /// rotation column untouched.
    pub fn from_affine(t: &DAffine3) -> Self {
        let m = t.matrix3;
        let scale = DVec3::new(m.x_axis.length(), m.y_axis.length(), m.z_axis.length());
        let unscale = |c: DVec3, s: f64| if s > 0.0 { c / s } else { c };
        let rotation = DMat3::from_cols(
            unscale(m.x_axis, scale.x),
            unscale(m.y_axis, scale.y),
            unscale(m.z_axis, scale.z),
        );
        Self {
            position: t.translation,
            rotation,
            scale,
        }
    }

    /// Recombine into `T * R * S`.
    pub fn to_affine(&self) -> DAffine3 {
        DAffine3::from_mat3_translation(
            self.rotation * DMat3::from_diagonal(self.scale),
            self.position,
        )
    }
}

/// Spread of surface normals: mean direction plus the largest angle (radians)
/// any normal makes with it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormalCone {
    pub axis: Vec3,
    pub angle: f32,
}

impl NormalCone {
    /// Cone covering every direction (used when there is nothing to bound).
    pub const FULL: Self = Self {
        axis: Vec3::Z,
        angle: std::f32::consts::PI,
    };

    /// Compute from a set of (not necessarily unit) normals. Zero-length and
    /// non-finite normals are ignored.
    pub fn from_normals<'a>(normals: impl IntoIterator<Item = &'a Vec3>) -> Self {
        let units: Vec<Vec3> = normals
            .into_iter()
            .filter_map(|n| n.try_normalize())
            .collect();
        let Some(axis) = units.iter().copied().sum::<Vec3>().try_normalize() else {
            return Self::FULL;
        };
        let angle = units
            .iter()
            .map(|n| n.dot(axis).clamp(-1.0, 1.0).acos())
            .fold(0.0f32, f32::max);
        Self { axis, angle }
    }
}

impl Default for NormalCone {
    fn default() -> Self {
        Self::FULL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decompose_roundtrip() {
        let t = DAffine3::from_scale_rotation_translation(
            DVec3::new(2.0, 3.0, 0.5),
            DQuat::from_rotation_z(0.7),
            DVec3::new(10.0, -4.0, 1e6),
        );
        let d = Decomposed::from_affine(&t);
        assert!((d.scale - DVec3::new(2.0, 3.0, 0.5)).length() < 1e-12);
        assert!((d.rotation.determinant() - 1.0).abs() < 1e-12);
        assert!(d.to_affine().abs_diff_eq(t, 1e-9));
    }

    #[test]
    fn test_normal_cone_flat() {
        let normals = vec![Vec3::Z; 4];
        let cone = NormalCone::from_normals(&normals);
        assert_eq!(cone.axis, Vec3::Z);
        assert!(cone.angle.abs() < 1e-6);
    }

    #[test]
    fn test_normal_cone_spread() {
        let normals = [Vec3::new(1.0, 0.0, 1.0), Vec3::new(-1.0, 0.0, 1.0)];
        let cone = NormalCone::from_normals(&normals);
        assert!((cone.axis - Vec3::Z).length() < 1e-6);
        assert!((cone.angle - std::f32::consts::FRAC_PI_4).abs() < 1e-5);
    }

    #[test]
    fn test_normal_cone_empty() {
        let cone = NormalCone::from_normals(&[]);
        assert_eq!(cone, NormalCone::FULL);
    }
}
