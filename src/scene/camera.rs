//! Main camera and the per-view constants derived from it

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};

/// Camera projection type
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective {
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    Orthographic {
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    },
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Perspective {
            fov_y: std::f32::consts::FRAC_PI_4,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Projection {
    pub fn perspective(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Projection::Perspective {
            fov_y: fov_y_degrees.to_radians(),
            aspect,
            near,
            far,
        }
    }

    pub fn orthographic(width: f32, height: f32, near: f32, far: f32) -> Self {
        Projection::Orthographic {
            left: -width / 2.0,
            right: width / 2.0,
            bottom: -height / 2.0,
            top: height / 2.0,
            near,
            far,
        }
    }

    pub fn matrix(&self) -> Mat4 {
        match *self {
            Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            } => Mat4::perspective_rh(fov_y, aspect, near, far),
            Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                near,
                far,
            } => Mat4::orthographic_rh(left, right, bottom, top, near, far),
        }
    }

    pub fn near_far(&self) -> (f32, f32) {
        match *self {
            Projection::Perspective { near, far, .. } => (near, far),
            Projection::Orthographic { near, far, .. } => (near, far),
        }
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        if let Projection::Perspective { aspect: a, .. } = self {
            *a = aspect;
        }
    }
}

/// Camera the frame is rendered from
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub projection: Projection,
    /// Sub-pixel offset in pixels, applied to the projection when TAA is on.
    pub jitter: Vec2,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 2.0, 5.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            projection: Projection::default(),
            jitter: Vec2::ZERO,
        }
    }
}

impl Camera {
    pub fn new(position: Vec3, target: Vec3) -> Self {
        Self {
            position,
            target,
            ..Default::default()
        }
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// Projection matrix, with jitter applied for a `screen_size` target.
    pub fn projection_matrix(&self, screen_size: Vec2) -> Mat4 {
        let projection = self.projection.matrix();
        if self.jitter == Vec2::ZERO || screen_size.x <= 0.0 || screen_size.y <= 0.0 {
            return projection;
        }
        let offset = self.jitter * 2.0 / screen_size;
        Mat4::from_translation(Vec3::new(offset.x, -offset.y, 0.0)) * projection
    }

    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize_or_zero()
    }

    pub fn set_aspect(&mut self, width: f32, height: f32) {
        if height > 0.0 {
            self.projection.set_aspect(width / height);
        }
    }

    /// Constants uploaded to the per-view buffer.
    ///
    /// `previous_view_projection` is last frame's unjittered view-projection,
    /// used for reprojection.
    pub fn per_view_data(
        &self,
        screen_size: Vec2,
        delta_time: f32,
        frame_index: u64,
        previous_view_projection: Option<Mat4>,
    ) -> PerViewData {
        let view = self.view_matrix();
        let projection = self.projection_matrix(screen_size);
        let view_projection = projection * view;
        let unjittered = self.projection.matrix() * view;
        let (near, far) = self.projection.near_far();
        let inverse_screen = Vec2::new(
            if screen_size.x > 0.0 { 1.0 / screen_size.x } else { 0.0 },
            if screen_size.y > 0.0 { 1.0 / screen_size.y } else { 0.0 },
        );

        PerViewData {
            view,
            projection,
            view_projection,
            inverse_view_projection: view_projection.inverse(),
            previous_view_projection: previous_view_projection.unwrap_or(unjittered),
            position: self.position.extend(1.0),
            near_far_jitter: Vec4::new(near, far, self.jitter.x, self.jitter.y),
            screen_size: Vec4::new(
                screen_size.x,
                screen_size.y,
                inverse_screen.x,
                inverse_screen.y,
            ),
            time: Vec4::new(delta_time, (frame_index % 1_000_000) as f32, 0.0, 0.0),
        }
    }
}

/// Per-view constant buffer layout
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PerViewData {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    pub inverse_view_projection: Mat4,
    pub previous_view_projection: Mat4,
    pub position: Vec4,
    /// near, far, jitter x, jitter y
    pub near_far_jitter: Vec4,
    /// width, height, 1 / width, 1 / height
    pub screen_size: Vec4,
    /// delta time, frame index
    pub time: Vec4,
}

impl PerViewData {
    pub const SIZE: u64 = std::mem::size_of::<PerViewData>() as u64;
}
