//! Math utilities and the transform state consumed by drawables
//!
//! [`MatrixState`] keeps a projection, a camera and a model matrix stack and
//! exposes them through [`TransformSource`] as column-major `[f32; 16]`
//! arrays, the layout shaders expect.

pub use nalgebra::{Matrix4, Vector3};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Supplies the matrices a draw pushes to the vertex stage
pub trait TransformSource {
    /// Projection * view * model, column-major
    fn final_matrix(&self) -> [f32; 16];
    /// Current model matrix, column-major
    fn model_matrix(&self) -> [f32; 16];
}

/// Projection, camera and a push/pop model matrix stack
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixState {
    projection: Mat4,
    view: Mat4,
    model: Mat4,
    stack: Vec<Mat4>,
}

impl Default for MatrixState {
    fn default() -> Self {
        Self::new()
    }
}

impl MatrixState {
    /// All matrices identity, empty stack
    pub fn new() -> Self {
        Self {
            projection: Mat4::identity(),
            view: Mat4::identity(),
            model: Mat4::identity(),
            stack: Vec::new(),
        }
    }

    /// Perspective frustum from near-plane bounds
    pub fn set_project_frustum(
        &mut self,
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    ) {
        let width = right - left;
        let height = top - bottom;
        let depth = far - near;
        self.projection = Mat4::new(
            2.0 * near / width, 0.0, (right + left) / width, 0.0,
            0.0, 2.0 * near / height, (top + bottom) / height, 0.0,
            0.0, 0.0, -(far + near) / depth, -2.0 * far * near / depth,
            0.0, 0.0, -1.0, 0.0,
        );
    }

    /// Symmetric perspective from a vertical field of view in radians
    pub fn set_perspective(&mut self, fov_y: f32, aspect: f32, near: f32, far: f32) {
        self.projection = Mat4::new_perspective(aspect, fov_y, near, far);
    }

    /// Right-handed camera at `eye` looking at `target`
    pub fn set_camera(&mut self, eye: Point3, target: Point3, up: Vec3) {
        self.view = Mat4::look_at_rh(&eye, &target, &up);
    }

    /// Save the current model matrix
    pub fn push_matrix(&mut self) {
        self.stack.push(self.model);
    }

    /// Restore the last saved model matrix. Returns false if nothing was saved.
    pub fn pop_matrix(&mut self) -> bool {
        match self.stack.pop() {
            Some(model) => {
                self.model = model;
                true
            }
            None => false,
        }
    }

    /// Translate the model matrix
    pub fn translate(&mut self, x: f32, y: f32, z: f32) {
        self.model *= Mat4::new_translation(&Vec3::new(x, y, z));
    }

    /// Rotate by `degrees` about the axis (x, y, z). A zero axis is ignored.
    pub fn rotate(&mut self, degrees: f32, x: f32, y: f32, z: f32) {
        let axis = Vec3::new(x, y, z);
        if axis.norm_squared() == 0.0 {
            return;
        }
        self.model *= Mat4::new_rotation(axis.normalize() * degrees.to_radians());
    }

    /// Scale the model matrix per axis
    pub fn scale(&mut self, x: f32, y: f32, z: f32) {
        self.model *= Mat4::new_nonuniform_scaling(&Vec3::new(x, y, z));
    }

    /// Get projection matrix
    pub fn projection(&self) -> &Mat4 {
        &self.projection
    }

    /// Get view matrix
    pub fn view(&self) -> &Mat4 {
        &self.view
    }

    /// Get current model matrix
    pub fn model(&self) -> &Mat4 {
        &self.model
    }

    /// Projection * view * model
    pub fn final_matrix_mat(&self) -> Mat4 {
        self.projection * self.view * self.model
    }
}

impl TransformSource for MatrixState {
    fn final_matrix(&self) -> [f32; 16] {
        column_major(&self.final_matrix_mat())
    }

    fn model_matrix(&self) -> [f32; 16] {
        column_major(&self.model)
    }
}

/// Flatten in column-major order
pub fn column_major(matrix: &Mat4) -> [f32; 16] {
    let mut out = [0.0; 16];
    out.copy_from_slice(matrix.as_slice());
    out
}
