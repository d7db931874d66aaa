//! Oriented 3D bounding boxes for annotated objects.

// Standard library and external crates
use std::sync::Arc;

use bevy::math::{Mat3, Mat4, Quat, Rect, UVec2, Vec2, Vec3};
use bevy::prelude::Transform;
use capture_constants::geometry::{GEOMETRY_EPSILON, POWER_ITERATION_COUNT, VERTEX_CHUNK_SIZE};
use capture_constants::render_settings::MIN_CLIP_W;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

// Crate modules
use crate::engine::scene::MeshData;

/// How the box is fitted to mesh vertices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CuboidStrategy {
    /// Object-local axis aligned bounds.
    #[default]
    Simple,
    /// Axes from the principal component of the vertex distribution.
    Pca,
}

/// Corner order of every cuboid. Front faces -Z, top faces +Y, right faces +X.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CuboidVertex {
    FrontTopRight,
    FrontTopLeft,
    FrontBottomLeft,
    FrontBottomRight,
    RearTopRight,
    RearTopLeft,
    RearBottomLeft,
    RearBottomRight,
}

impl CuboidVertex {
    pub const ALL: [CuboidVertex; 8] = [
        Self::FrontTopRight,
        Self::FrontTopLeft,
        Self::FrontBottomLeft,
        Self::FrontBottomRight,
        Self::RearTopRight,
        Self::RearTopLeft,
        Self::RearBottomLeft,
        Self::RearBottomRight,
    ];

    /// Unit-cube corner in box axes.
    pub fn sign(self) -> Vec3 {
        match self {
            Self::FrontTopRight => Vec3::new(1.0, 1.0, -1.0),
            Self::FrontTopLeft => Vec3::new(-1.0, 1.0, -1.0),
            Self::FrontBottomLeft => Vec3::new(-1.0, -1.0, -1.0),
            Self::FrontBottomRight => Vec3::new(1.0, -1.0, -1.0),
            Self::RearTopRight => Vec3::new(1.0, 1.0, 1.0),
            Self::RearTopLeft => Vec3::new(-1.0, 1.0, 1.0),
            Self::RearBottomLeft => Vec3::new(-1.0, -1.0, 1.0),
            Self::RearBottomRight => Vec3::new(1.0, -1.0, 1.0),
        }
    }
}

/// Oriented box in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CuboidData {
    pub vertices: [Vec3; 8],
    center: Vec3,
    dimension: Vec3,
    rotation: Quat,
    valid: bool,
}

impl Default for CuboidData {
    fn default() -> Self {
        Self {
            vertices: [Vec3::ZERO; 8],
            center: Vec3::ZERO,
            dimension: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            valid: false,
        }
    }
}

/// Box fitted in object-local space before the object transform is applied.
struct LocalBox {
    center: Vec3,
    half_extent: Vec3,
    axes: Mat3,
}

impl CuboidData {
    /// Fit a box around every valid mesh. Invalid when there are no vertices.
    pub fn from_meshes(
        meshes: &[Arc<MeshData>],
        world_from_local: &Transform,
        strategy: CuboidStrategy,
    ) -> Self {
        let positions: Vec<Vec3> = meshes
            .iter()
            .filter(|mesh| mesh.is_valid())
            .flat_map(|mesh| mesh.positions.iter().copied())
            .collect();
        Self::from_points(&positions, world_from_local, strategy)
    }

    pub fn from_points(
        positions: &[Vec3],
        world_from_local: &Transform,
        strategy: CuboidStrategy,
    ) -> Self {
        if positions.is_empty() {
            return Self::default();
        }

        let local = match strategy {
            CuboidStrategy::Simple => fit_axis_aligned(positions),
            CuboidStrategy::Pca => fit_principal_axes(positions),
        };

        let vertices = CuboidVertex::ALL.map(|corner| {
            let offset = local.axes * (corner.sign() * local.half_extent);
            world_from_local.transform_point(local.center + offset)
        });
        let center = vertices.iter().copied().sum::<Vec3>() / 8.0;

        let vertex = |corner: CuboidVertex| vertices[corner as usize];
        let dimension = Vec3::new(
            vertex(CuboidVertex::FrontTopRight).distance(vertex(CuboidVertex::FrontTopLeft)),
            vertex(CuboidVertex::FrontTopRight).distance(vertex(CuboidVertex::FrontBottomRight)),
            vertex(CuboidVertex::FrontTopRight).distance(vertex(CuboidVertex::RearTopRight)),
        );

        Self {
            vertices,
            center,
            dimension,
            rotation: world_from_local.rotation * Quat::from_mat3(&local.axes),
            valid: true,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn vertex(&self, corner: CuboidVertex) -> Vec3 {
        self.vertices[corner as usize]
    }

    pub fn center(&self) -> Vec3 {
        self.center
    }

    /// Full edge lengths along the box axes.
    pub fn dimension(&self) -> Vec3 {
        self.dimension
    }

    /// Half edge lengths.
    pub fn extent(&self) -> Vec3 {
        self.dimension * 0.5
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    /// Direction the front face points at.
    pub fn direction(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    /// Project into pixel space. `None` when any corner is behind the camera.
    pub fn project(
        &self,
        clip_from_world: &Mat4,
        image_size: UVec2,
        clamp_to_image: bool,
    ) -> Option<ProjectedCuboid> {
        if !self.valid {
            return None;
        }

        let mut vertices = [Vec2::ZERO; 8];
        for (projected, vertex) in vertices.iter_mut().zip(self.vertices) {
            *projected = project_point(clip_from_world, vertex, image_size)?;
        }
        let center = project_point(clip_from_world, self.center, image_size)?;

        let (min, max) = vertices
            .iter()
            .fold((Vec2::MAX, Vec2::MIN), |(min, max), v| (min.min(*v), max.max(*v)));
        let unclamped = Rect::from_corners(min, max);
        let image = Rect::from_corners(Vec2::ZERO, image_size.as_vec2());
        let clamped = unclamped.intersect(image);

        let full_area = unclamped.width() * unclamped.height();
        let visibility = if clamped.is_empty() || full_area <= GEOMETRY_EPSILON {
            0.0
        } else {
            (clamped.width() * clamped.height() / full_area).clamp(0.0, 1.0)
        };

        Some(ProjectedCuboid {
            vertices,
            center,
            bounding_box: if clamp_to_image { clamped } else { unclamped },
            visibility,
        })
    }
}

/// Cuboid in pixel coordinates, origin top-left, y down.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedCuboid {
    pub vertices: [Vec2; 8],
    pub center: Vec2,
    pub bounding_box: Rect,
    /// Fraction of the 2D box inside the image.
    pub visibility: f32,
}

/// World point to pixel coordinates. `None` behind the camera.
pub fn project_point(clip_from_world: &Mat4, point: Vec3, image_size: UVec2) -> Option<Vec2> {
    let clip = *clip_from_world * point.extend(1.0);
    if clip.w < MIN_CLIP_W {
        return None;
    }
    let ndc = clip.truncate() / clip.w;
    let size = image_size.as_vec2();
    Some(Vec2::new(
        (ndc.x * 0.5 + 0.5) * size.x,
        (1.0 - (ndc.y * 0.5 + 0.5)) * size.y,
    ))
}

fn fit_axis_aligned(positions: &[Vec3]) -> LocalBox {
    let (min, max) = positions
        .par_chunks(VERTEX_CHUNK_SIZE)
        .map(|chunk| {
            chunk.iter().fold((Vec3::MAX, Vec3::MIN), |(min, max), p| {
                (min.min(*p), max.max(*p))
            })
        })
        .reduce_with(|a, b| (a.0.min(b.0), a.1.max(b.1)))
        .unwrap_or((Vec3::ZERO, Vec3::ZERO));

    LocalBox {
        center: (min + max) * 0.5,
        half_extent: (max - min) * 0.5,
        axes: Mat3::IDENTITY,
    }
}

fn fit_principal_axes(positions: &[Vec3]) -> LocalBox {
    let count = positions.len() as f32;
    let mean = positions
        .par_chunks(VERTEX_CHUNK_SIZE)
        .map(|chunk| chunk.iter().copied().sum::<Vec3>())
        .reduce_with(|a, b| a + b)
        .unwrap_or(Vec3::ZERO)
        / count;

    let covariance = positions
        .par_chunks(VERTEX_CHUNK_SIZE)
        .map(|chunk| {
            chunk.iter().fold(Mat3::ZERO, |sum, p| {
                let d = *p - mean;
                sum + Mat3::from_cols(d * d.x, d * d.y, d * d.z)
            })
        })
        .reduce_with(|a, b| a + b)
        .unwrap_or(Mat3::ZERO)
        * (1.0 / count);

    let principal = dominant_eigenvector(&covariance);

    let z = -principal;
    let mut y = Vec3::Y - z * Vec3::Y.dot(z);
    if y.length_squared() < GEOMETRY_EPSILON {
        y = Vec3::X - z * Vec3::X.dot(z);
    }
    let y = y.normalize();
    let x = y.cross(z);
    let axes = Mat3::from_cols(x, y, z);

    // Extents along the new axes.
    let inverse = axes.transpose();
    let (min, max) = positions
        .par_chunks(VERTEX_CHUNK_SIZE)
        .map(|chunk| {
            chunk.iter().fold((Vec3::MAX, Vec3::MIN), |(min, max), p| {
                let local = inverse * (*p - mean);
                (min.min(local), max.max(local))
            })
        })
        .reduce_with(|a, b| (a.0.min(b.0), a.1.max(b.1)))
        .unwrap_or((Vec3::ZERO, Vec3::ZERO));

    LocalBox {
        center: mean + axes * ((min + max) * 0.5),
        half_extent: (max - min) * 0.5,
        axes,
    }
}

/// Power iteration seeded from each column of the covariance matrix, keeping
/// the result with the largest Rayleigh quotient. Some column always has a
/// component along the dominant axis. Falls back to +Z for point-like inputs.
fn dominant_eigenvector(matrix: &Mat3) -> Vec3 {
    [matrix.x_axis, matrix.y_axis, matrix.z_axis]
        .into_iter()
        .filter_map(|seed| power_iteration(matrix, seed))
        .map(|vector| (vector.dot(*matrix * vector), vector))
        .max_by(|(a, _), (b, _)| a.total_cmp(b))
        .map_or(Vec3::Z, |(_, vector)| vector)
}

fn power_iteration(matrix: &Mat3, seed: Vec3) -> Option<Vec3> {
    let mut vector = seed.try_normalize()?;
    for _ in 0..POWER_ITERATION_COUNT {
        let next = *matrix * vector;
        let length = next.length();
        if length < GEOMETRY_EPSILON {
            return None;
        }
        vector = next / length;
    }
    Some(vector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::camera::{CameraSettings, ViewInfo};

    fn unit_box() -> Arc<MeshData> {
        Arc::new(MeshData::cuboid("box", Vec3::splat(0.5)))
    }

    #[test]
    fn simple_box_has_ordered_corners() {
        let transform = Transform::from_xyz(1.0, 2.0, 3.0);
        let cuboid = CuboidData::from_meshes(&[unit_box()], &transform, CuboidStrategy::Simple);

        assert!(cuboid.is_valid());
        assert_eq!(cuboid.vertices.len(), 8);
        assert!(cuboid.center().abs_diff_eq(Vec3::new(1.0, 2.0, 3.0), 1e-5));
        assert!(cuboid.dimension().abs_diff_eq(Vec3::ONE, 1e-5));
        assert!(cuboid
            .vertex(CuboidVertex::FrontTopRight)
            .abs_diff_eq(Vec3::new(1.5, 2.5, 2.5), 1e-5));
    }

    #[test]
    fn center_is_mean_of_vertices() {
        let transform = Transform::from_rotation(Quat::from_rotation_y(0.7))
            .with_translation(Vec3::new(-2.0, 0.0, 4.0))
            .with_scale(Vec3::new(2.0, 1.0, 0.5));
        let cuboid = CuboidData::from_meshes(&[unit_box()], &transform, CuboidStrategy::Simple);

        let mean = cuboid.vertices.iter().copied().sum::<Vec3>() / 8.0;
        assert!(cuboid.center().abs_diff_eq(mean, 1e-5));
        assert!(cuboid.dimension().abs_diff_eq(Vec3::new(2.0, 1.0, 0.5), 1e-4));
    }

    #[test]
    fn pca_aligns_depth_axis_with_longest_spread() {
        let rod = Arc::new(MeshData::cuboid("rod", Vec3::new(4.0, 0.5, 0.5)));
        let cuboid = CuboidData::from_meshes(&[rod], &Transform::IDENTITY, CuboidStrategy::Pca);

        assert!((cuboid.dimension().z - 8.0).abs() < 1e-3);
        assert!(cuboid.direction().x.abs() > 0.99);
    }

    #[test]
    fn pca_finds_rod_orthogonal_to_the_diagonal() {
        // Long axis has no component along (1, 1, 1).
        let axis = Vec3::new(1.0, -1.0, 0.0).normalize();
        let across = Vec3::new(1.0, 1.0, 0.0).normalize();
        let mut points = Vec::new();
        for step in 0..=40 {
            let along = axis * (step as f32 * 0.2 - 4.0);
            for (a, b) in [(-0.1, -0.1), (-0.1, 0.1), (0.1, -0.1), (0.1, 0.1)] {
                points.push(along + across * a + Vec3::Z * b);
            }
        }
        let cuboid = CuboidData::from_points(&points, &Transform::IDENTITY, CuboidStrategy::Pca);

        assert!(cuboid.direction().dot(axis).abs() > 0.99, "{}", cuboid.direction());
        assert!((cuboid.dimension().z - 8.0).abs() < 1e-3, "{}", cuboid.dimension());
        assert!(cuboid.dimension().x < 0.3 && cuboid.dimension().y < 0.3);
    }

    #[test]
    fn empty_meshes_give_invalid_cuboid() {
        let empty = Arc::new(MeshData::default());
        let cuboid = CuboidData::from_meshes(&[empty], &Transform::IDENTITY, CuboidStrategy::Pca);
        assert!(!cuboid.is_valid());
    }

    #[test]
    fn projection_centres_box_in_view() {
        let camera = CameraSettings {
            width: 200,
            height: 100,
            ..Default::default()
        };
        let view = ViewInfo::new(
            Transform::from_xyz(0.0, 0.0, 5.0).looking_at(Vec3::ZERO, Vec3::Y),
            &camera,
        );
        let cuboid =
            CuboidData::from_meshes(&[unit_box()], &Transform::IDENTITY, CuboidStrategy::Simple);

        let projected = cuboid
            .project(&view.clip_from_world(), camera.resolution(), true)
            .unwrap();
        assert!(projected.center.abs_diff_eq(Vec2::new(100.0, 50.0), 1e-3));
        assert_eq!(projected.visibility, 1.0);

        let behind = ViewInfo::new(
            Transform::from_xyz(0.0, 0.0, 5.0).looking_at(Vec3::new(0.0, 0.0, 10.0), Vec3::Y),
            &camera,
        );
        assert!(cuboid
            .project(&behind.clip_from_world(), camera.resolution(), true)
            .is_none());
    }
}
