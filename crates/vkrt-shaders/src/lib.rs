//! Mesh shaders for the rasterizer.
//!
//! GLSL sources live in `shaders/` and are compiled to SPIR-V at build time
//! using shaderc.

use std::sync::OnceLock;

/// Embedded SPIR-V shader bytecode (raw bytes, may not be aligned).
mod spirv_bytes {
    pub static MESH_VERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/mesh_vert.spv"));
    pub static MESH_FRAG: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/mesh_frag.spv"));
}

/// SPIR-V magic number, the first word of every module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Entry point name shared by both stages.
pub const ENTRY_POINT: &std::ffi::CStr = c"main";

/// Convert byte slice to aligned u32 Vec (SPIR-V requires 4-byte alignment).
fn bytes_to_spirv(bytes: &[u8]) -> Vec<u32> {
    assert!(
        bytes.len() % 4 == 0,
        "SPIR-V bytecode must be 4-byte aligned"
    );
    bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

static MESH_VERT_SPIRV: OnceLock<Vec<u32>> = OnceLock::new();
static MESH_FRAG_SPIRV: OnceLock<Vec<u32>> = OnceLock::new();

/// Vertex stage: per-frame `{ model, view, proj }` uniform at set 0 binding 0,
/// per-instance model matrix as a push constant.
pub fn mesh_vertex_shader() -> &'static [u32] {
    MESH_VERT_SPIRV.get_or_init(|| bytes_to_spirv(spirv_bytes::MESH_VERT))
}

/// Fragment stage: Lambert shading with a fixed light.
pub fn mesh_fragment_shader() -> &'static [u32] {
    MESH_FRAG_SPIRV.get_or_init(|| bytes_to_spirv(spirv_bytes::MESH_FRAG))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mesh_shaders_load() {
        for shader in [mesh_vertex_shader(), mesh_fragment_shader()] {
            assert_eq!(shader[0], SPIRV_MAGIC, "Invalid SPIR-V magic number");
            assert!(shader.len() > 20, "Shader too small");
        }
    }

    #[test]
    fn cached_slice_is_reused() {
        assert!(std::ptr::eq(mesh_vertex_shader(), mesh_vertex_shader()));
    }

    #[test]
    #[should_panic(expected = "4-byte aligned")]
    fn rejects_truncated_bytecode() {
        bytes_to_spirv(&[0x03, 0x02, 0x23]);
    }
}
