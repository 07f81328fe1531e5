use kurbo::{Affine, Vec2};

/// Visual state of a track or clip, written by the automation engine.
///
/// Origins are fractions of the reference size unless the matching `absolute_*` flag is set,
/// in which case they are pixel coordinates. The forward/inverse matrices are cached until a
/// transform parameter changes or the reference size differs.
#[derive(Clone, Debug)]
pub struct VideoProps {
    pub(crate) opacity: f64,
    pub(crate) visible: bool,
    pub(crate) position: Vec2,
    pub(crate) scale: Vec2,
    pub(crate) scale_origin: Vec2,
    pub(crate) absolute_scale_origin: bool,
    pub(crate) rotation: f64,
    pub(crate) rotation_origin: Vec2,
    pub(crate) absolute_rotation_origin: bool,
    matrix: Option<CachedMatrix>,
}

#[derive(Clone, Copy, Debug)]
struct CachedMatrix {
    size: Vec2,
    forward: Affine,
    inverse: Affine,
}

impl Default for VideoProps {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            visible: true,
            position: Vec2::ZERO,
            scale: Vec2::new(1.0, 1.0),
            scale_origin: Vec2::new(0.5, 0.5),
            absolute_scale_origin: false,
            rotation: 0.0,
            rotation_origin: Vec2::new(0.5, 0.5),
            absolute_rotation_origin: false,
            matrix: None,
        }
    }
}

impl VideoProps {
    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Visible and not fully transparent.
    pub fn is_effectively_visible(&self) -> bool {
        self.visible && self.opacity > 0.0
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn scale(&self) -> Vec2 {
        self.scale
    }

    pub fn scale_origin(&self) -> Vec2 {
        self.scale_origin
    }

    pub fn rotation_degrees(&self) -> f64 {
        self.rotation
    }

    pub fn rotation_origin(&self) -> Vec2 {
        self.rotation_origin
    }

    pub fn is_transform_dirty(&self) -> bool {
        self.matrix.is_none()
    }

    pub fn invalidate_transform(&mut self) {
        self.matrix = None;
    }

    /// Forward and inverse matrices for a reference size, rebuilt only when stale.
    pub fn transform(&mut self, size: Vec2) -> (Affine, Affine) {
        if let Some(m) = self.matrix
            && m.size == size
        {
            return (m.forward, m.inverse);
        }
        let forward = self.build_transform(size);
        let inverse = forward.inverse();
        self.matrix = Some(CachedMatrix {
            size,
            forward,
            inverse,
        });
        (forward, inverse)
    }

    /// `translate(position) * scale about scale origin * rotate about rotation origin`.
    pub fn build_transform(&self, size: Vec2) -> Affine {
        let so = resolve_origin(self.scale_origin, self.absolute_scale_origin, size);
        let ro = resolve_origin(self.rotation_origin, self.absolute_rotation_origin, size);
        Affine::translate(self.position)
            * Affine::translate(so)
            * Affine::scale_non_uniform(self.scale.x, self.scale.y)
            * Affine::translate(-so)
            * Affine::translate(ro)
            * Affine::rotate(self.rotation.to_radians())
            * Affine::translate(-ro)
    }
}

fn resolve_origin(origin: Vec2, absolute: bool, size: Vec2) -> Vec2 {
    if absolute {
        origin
    } else {
        Vec2::new(origin.x * size.x, origin.y * size.y)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/timeline/props.rs"]
mod tests;
