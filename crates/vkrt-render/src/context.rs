//! Per-session render state passed to the build and render entry points.

use crate::camera::Camera;
use vkrt_core::constants::DEFAULT_MODEL_SCALE;

/// Camera, scene scale and the span diagnostics are attributed to.
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub camera: Camera,
    /// Uniform scale applied to the whole scene.
    pub model_scale: f32,
    span: tracing::Span,
}

impl RenderContext {
    /// Create a context whose span is named after `session`.
    pub fn new(camera: Camera, session: &str) -> Self {
        Self {
            camera,
            model_scale: DEFAULT_MODEL_SCALE,
            span: tracing::info_span!("session", name = session),
        }
    }

    pub fn with_model_scale(mut self, model_scale: f32) -> Self {
        self.model_scale = model_scale;
        self
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_engine_model_scale() {
        let ctx = RenderContext::new(Camera::default(), "test");
        assert_eq!(ctx.model_scale, DEFAULT_MODEL_SCALE);
        assert_eq!(ctx.with_model_scale(2.0).model_scale, 2.0);
    }
}
