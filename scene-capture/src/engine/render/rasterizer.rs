// Standard library and external crates
use bevy::math::{Vec2, Vec3, Vec4};
use capture_constants::render_settings::{AMBIENT_LIGHT, LIGHT_DIRECTION, MIN_CLIP_W};

// Crate modules
use super::{RenderPass, RenderSurface, SceneRenderer};
use crate::engine::camera::ViewInfo;
use crate::engine::scene::{RenderObject, RenderScene};

/// CPU triangle rasterizer with a depth buffer.
///
/// Good enough for headless capture and tests: flat Lambert shading for
/// colour, perspective-correct view depth, and raw ids for the mask passes.
#[derive(Debug, Clone)]
pub struct SoftwareRasterizer {
    pub background: [f32; 4],
    light_direction: Vec3,
    ambient: f32,
    depth_buffer: Vec<f32>,
}

impl Default for SoftwareRasterizer {
    fn default() -> Self {
        Self {
            background: [0.0, 0.0, 0.0, 1.0],
            light_direction: Vec3::from_array(LIGHT_DIRECTION).normalize(),
            ambient: AMBIENT_LIGHT,
            depth_buffer: Vec::new(),
        }
    }
}

/// Triangle corner after projection.
#[derive(Clone, Copy)]
struct ScreenVertex {
    position: Vec2,
    inverse_w: f32,
}

impl SceneRenderer for SoftwareRasterizer {
    fn render(
        &mut self,
        pass: RenderPass,
        scene: &RenderScene,
        view: &ViewInfo,
        target: &mut RenderSurface,
    ) {
        let width = target.width();
        let height = target.height();

        target.clear();
        if pass == RenderPass::Color {
            for y in 0..height {
                for x in 0..width {
                    target.write_color(x, y, self.background);
                }
            }
        }

        self.depth_buffer.clear();
        self.depth_buffer
            .resize(width as usize * height as usize, f32::INFINITY);

        let clip_from_world = view.clip_from_world();
        for object in &scene.objects {
            self.draw_object(pass, object, &clip_from_world, target);
        }
    }
}

impl SoftwareRasterizer {
    fn draw_object(
        &mut self,
        pass: RenderPass,
        object: &RenderObject,
        clip_from_world: &bevy::math::Mat4,
        target: &mut RenderSurface,
    ) {
        let world_from_local = object.transform.compute_matrix();
        let clip_from_local = *clip_from_world * world_from_local;
        let size = Vec2::new(target.width() as f32, target.height() as f32);

        for mesh in object.meshes.iter().filter(|mesh| mesh.is_valid()) {
            let clip: Vec<Vec4> = mesh
                .positions
                .iter()
                .map(|p| clip_from_local * p.extend(1.0))
                .collect();

            for triangle in mesh.indices.chunks_exact(3) {
                let [a, b, c] = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
                if a >= clip.len() || b >= clip.len() || c >= clip.len() {
                    continue;
                }

                // Near-plane clipping is not done; triangles crossing it are dropped.
                let corners = [clip[a], clip[b], clip[c]];
                if corners.iter().any(|v| v.w < MIN_CLIP_W) {
                    continue;
                }
                let screen = corners.map(|v| ScreenVertex {
                    position: Vec2::new(
                        (v.x / v.w * 0.5 + 0.5) * size.x,
                        (0.5 - v.y / v.w * 0.5) * size.y,
                    ),
                    inverse_w: 1.0 / v.w,
                });

                let shade = match pass {
                    RenderPass::Color => {
                        let world = [a, b, c].map(|i| {
                            world_from_local.transform_point3(mesh.positions[i])
                        });
                        let normal = (world[1] - world[0])
                            .cross(world[2] - world[0])
                            .normalize_or_zero();
                        // Two-sided lighting.
                        let diffuse = normal.dot(-self.light_direction).abs();
                        self.ambient + (1.0 - self.ambient) * diffuse
                    }
                    _ => 1.0,
                };

                self.fill_triangle(pass, object, shade, screen, target);
            }
        }
    }

    fn fill_triangle(
        &mut self,
        pass: RenderPass,
        object: &RenderObject,
        shade: f32,
        [v0, v1, v2]: [ScreenVertex; 3],
        target: &mut RenderSurface,
    ) {
        let area = edge(v0.position, v1.position, v2.position);
        if area.abs() < f32::EPSILON {
            return;
        }

        let width = target.width();
        let max_x = (width as f32 - 1.0).max(0.0);
        let max_y = (target.height() as f32 - 1.0).max(0.0);
        let min = v0.position.min(v1.position).min(v2.position);
        let max = v0.position.max(v1.position).max(v2.position);
        if max.x < 0.0 || max.y < 0.0 || min.x > max_x + 1.0 || min.y > max_y + 1.0 {
            return;
        }

        let x_start = min.x.floor().clamp(0.0, max_x) as u32;
        let x_end = max.x.ceil().clamp(0.0, max_x) as u32;
        let y_start = min.y.floor().clamp(0.0, max_y) as u32;
        let y_end = max.y.ceil().clamp(0.0, max_y) as u32;

        let [r, g, b, alpha] = object.color;
        let color = [r * shade, g * shade, b * shade, alpha];

        for y in y_start..=y_end {
            for x in x_start..=x_end {
                let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                let w0 = edge(v1.position, v2.position, p) / area;
                let w1 = edge(v2.position, v0.position, p) / area;
                let w2 = edge(v0.position, v1.position, p) / area;
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }

                // Clip w is view depth, so interpolating 1/w gives linear depth.
                let inverse_w = w0 * v0.inverse_w + w1 * v1.inverse_w + w2 * v2.inverse_w;
                if inverse_w <= 0.0 {
                    continue;
                }
                let depth = 1.0 / inverse_w;

                let index = y as usize * width as usize + x as usize;
                if depth >= self.depth_buffer[index] {
                    continue;
                }
                self.depth_buffer[index] = depth;

                match pass {
                    RenderPass::Color => target.write_color(x, y, color),
                    RenderPass::Depth => target.write_scalar(x, y, depth),
                    RenderPass::ClassMask => target.write_id(x, y, object.class_id),
                    RenderPass::InstanceMask => target.write_id(x, y, object.instance_id),
                }
            }
        }
    }
}

fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (p.x - a.x) * (b.y - a.y) - (p.y - a.y) * (b.x - a.x)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bevy::prelude::Transform;

    use super::*;
    use crate::engine::camera::CameraSettings;
    use crate::engine::pixel::PixelFormat;
    use crate::engine::scene::MeshData;

    fn scene_with_box(class_id: u32) -> RenderScene {
        RenderScene {
            objects: vec![RenderObject {
                transform: Transform::IDENTITY,
                meshes: vec![Arc::new(MeshData::cuboid("box", Vec3::splat(1.0)))],
                color: [1.0, 0.0, 0.0, 1.0],
                class_id,
                instance_id: 0x0102_0304,
            }],
        }
    }

    fn front_view(camera: &CameraSettings) -> ViewInfo {
        ViewInfo::new(
            Transform::from_xyz(0.0, 0.0, 5.0).looking_at(Vec3::ZERO, Vec3::Y),
            camera,
        )
    }

    fn camera() -> CameraSettings {
        CameraSettings {
            width: 32,
            height: 32,
            ..Default::default()
        }
    }

    #[test]
    fn depth_pass_writes_distance_to_front_face() {
        let camera = camera();
        let mut surface = RenderSurface::new(camera.resolution(), PixelFormat::R32Float);
        let mut rasterizer = SoftwareRasterizer::default();
        rasterizer.render(
            RenderPass::Depth,
            &scene_with_box(1),
            &front_view(&camera),
            &mut surface,
        );

        let center = surface.pixel(16, 16);
        let depth = f32::from_le_bytes([center[0], center[1], center[2], center[3]]);
        assert!((depth - 4.0).abs() < 1e-3);
        assert_eq!(surface.pixel(0, 0), &[0, 0, 0, 0]);
    }

    #[test]
    fn mask_passes_write_ids() {
        let camera = camera();
        let mut rasterizer = SoftwareRasterizer::default();

        let mut class = RenderSurface::new(camera.resolution(), PixelFormat::R8);
        rasterizer.render(
            RenderPass::ClassMask,
            &scene_with_box(7),
            &front_view(&camera),
            &mut class,
        );
        assert_eq!(class.pixel(16, 16), &[7]);

        let mut instance = RenderSurface::new(camera.resolution(), PixelFormat::Rgba8);
        rasterizer.render(
            RenderPass::InstanceMask,
            &scene_with_box(7),
            &front_view(&camera),
            &mut instance,
        );
        assert_eq!(instance.pixel(16, 16), &[1, 2, 3, 4]);
    }

    #[test]
    fn colour_pass_shades_object_over_background() {
        let camera = camera();
        let mut surface = RenderSurface::new(camera.resolution(), PixelFormat::Bgra8);
        let mut rasterizer = SoftwareRasterizer::default();
        rasterizer.render(
            RenderPass::Color,
            &scene_with_box(1),
            &front_view(&camera),
            &mut surface,
        );

        let pixel = surface.pixel(16, 16);
        assert!(pixel[2] > 0);
        assert_eq!(pixel[0], 0);
        assert_eq!(surface.pixel(0, 0), &[0, 0, 0, 255]);
    }
}
