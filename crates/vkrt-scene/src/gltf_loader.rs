//! glTF document to [`SceneDescription`].

use crate::error::{Result, SceneError};
use glam::{Mat4, Quat, Vec3};
use gltf::mesh::Mode;
use std::path::Path;
use vkrt_core::math::compose_trs;
use vkrt_core::{MeshData, SceneDescription, SceneInstance, Vertex};

/// Load and validate the scene stored at `path`.
///
/// Every failure is reported as [`vkrt_core::Error::SceneLoad`] except an
/// instance naming a missing mesh, which is
/// [`vkrt_core::Error::InvalidMeshReference`].
pub fn load_gltf(path: impl AsRef<Path>) -> vkrt_core::Result<SceneDescription> {
    let path = path.as_ref();
    tracing::info!(path = %path.display(), "Loading glTF scene");

    let (document, buffers, _images) = gltf::import(path).map_err(SceneError::from)?;
    finish(&document, &buffers)
}

/// Load a scene from an in-memory `.gltf` or `.glb` file.
///
/// External buffer URIs cannot be resolved; embedded and data-URI buffers can.
pub fn load_gltf_slice(bytes: &[u8]) -> vkrt_core::Result<SceneDescription> {
    let (document, buffers, _images) = gltf::import_slice(bytes).map_err(SceneError::from)?;
    finish(&document, &buffers)
}

fn finish(
    document: &gltf::Document,
    buffers: &[gltf::buffer::Data],
) -> vkrt_core::Result<SceneDescription> {
    let scene = build_scene(document, buffers)?;
    scene.validate().map_err(as_load_failure)?;

    tracing::info!(
        meshes = scene.meshes.len(),
        instances = scene.instances.len(),
        triangles = scene.total_triangles(),
        "Scene loaded"
    );
    Ok(scene)
}

/// Malformed geometry in an asset is a load failure. Dangling mesh
/// references keep their own kind.
fn as_load_failure(err: vkrt_core::Error) -> vkrt_core::Error {
    match err {
        vkrt_core::Error::InvalidData(message) => vkrt_core::Error::SceneLoad(message),
        other => other,
    }
}

fn build_scene(document: &gltf::Document, buffers: &[gltf::buffer::Data]) -> Result<SceneDescription> {
    let (meshes, mesh_index_map) = load_meshes(document, buffers)?;

    let mut instances = Vec::new();
    for node in root_nodes(document) {
        walk_node(&node, Mat4::IDENTITY, &mesh_index_map, &mut instances);
    }

    if instances.is_empty() {
        return Err(SceneError::NoInstances);
    }

    Ok(SceneDescription::new(meshes, instances))
}

/// Flatten every triangle primitive into its own mesh.
///
/// The returned map lists, per glTF mesh, the flat indices of its primitives.
fn load_meshes(
    document: &gltf::Document,
    buffers: &[gltf::buffer::Data],
) -> Result<(Vec<MeshData>, Vec<Vec<usize>>)> {
    let mut meshes = Vec::new();
    let mut mesh_index_map = Vec::with_capacity(document.meshes().len());

    for mesh in document.meshes() {
        let mut flat_indices = Vec::new();

        for primitive in mesh.primitives() {
            if primitive.mode() != Mode::Triangles {
                tracing::warn!(
                    mesh = mesh.index(),
                    primitive = primitive.index(),
                    mode = ?primitive.mode(),
                    "Skipping non-triangle primitive"
                );
                continue;
            }

            let reader =
                primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));

            let positions: Vec<[f32; 3]> = reader
                .read_positions()
                .ok_or(SceneError::MissingPositions {
                    mesh: mesh.index(),
                    primitive: primitive.index(),
                })?
                .collect();
            let vertex_count = positions.len();

            let normals: Vec<[f32; 3]> = reader
                .read_normals()
                .map_or_else(|| vec![[0.0, 1.0, 0.0]; vertex_count], Iterator::collect);
            let uvs: Vec<[f32; 2]> = reader
                .read_tex_coords(0)
                .map_or_else(|| vec![[0.0, 0.0]; vertex_count], |uvs| uvs.into_f32().collect());

            let vertices = positions
                .iter()
                .enumerate()
                .map(|(i, &position)| {
                    Vertex::new(
                        position,
                        normals.get(i).copied().unwrap_or([0.0, 1.0, 0.0]),
                        uvs.get(i).copied().unwrap_or([0.0, 0.0]),
                    )
                })
                .collect();

            let indices: Vec<u32> = match reader.read_indices() {
                Some(indices) => indices.into_u32().collect(),
                None => {
                    let count = u32::try_from(vertex_count).map_err(|_| SceneError::TooManyVertices {
                        mesh: mesh.index(),
                        primitive: primitive.index(),
                        count: vertex_count,
                    })?;
                    (0..count).collect()
                }
            };

            let name = mesh.name().map(|name| {
                if mesh.primitives().len() > 1 {
                    format!("{name}#{}", primitive.index())
                } else {
                    name.to_string()
                }
            });

            tracing::debug!(
                mesh = meshes.len(),
                name = name.as_deref().unwrap_or(""),
                vertices = vertex_count,
                indices = indices.len(),
                "Read mesh primitive"
            );

            flat_indices.push(meshes.len());
            meshes.push(MeshData::new(name, vertices, indices));
        }

        mesh_index_map.push(flat_indices);
    }

    Ok((meshes, mesh_index_map))
}

/// Nodes of the default scene, or the first scene, or every parentless node.
fn root_nodes(document: &gltf::Document) -> Vec<gltf::Node<'_>> {
    if let Some(scene) = document.default_scene().or_else(|| document.scenes().next()) {
        return scene.nodes().collect();
    }

    let mut is_child = vec![false; document.nodes().len()];
    for node in document.nodes() {
        for child in node.children() {
            is_child[child.index()] = true;
        }
    }
    document
        .nodes()
        .filter(|node| !is_child[node.index()])
        .collect()
}

fn local_transform(node: &gltf::Node<'_>) -> Mat4 {
    match node.transform() {
        gltf::scene::Transform::Matrix { matrix } => Mat4::from_cols_array_2d(&matrix),
        gltf::scene::Transform::Decomposed {
            translation,
            rotation,
            scale,
        } => compose_trs(
            Vec3::from_array(translation),
            Quat::from_array(rotation),
            Vec3::from_array(scale),
        ),
    }
}

/// Emit one instance per primitive of `node`'s mesh, then recurse.
fn walk_node(
    node: &gltf::Node<'_>,
    parent: Mat4,
    mesh_index_map: &[Vec<usize>],
    instances: &mut Vec<SceneInstance>,
) {
    let world = parent * local_transform(node);

    if let Some(mesh) = node.mesh() {
        for &mesh_index in &mesh_index_map[mesh.index()] {
            instances.push(SceneInstance::new(mesh_index, world));
        }
    }

    for child in node.children() {
        walk_node(&child, world, mesh_index_map, instances);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// One triangle: three `vec3` positions followed by three `u16` indices.
    const TRIANGLE_BUFFER: &str =
        "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAAAAABAAIAAAA=";

    /// The triangle buffer with a fourth index, 3.
    const OUT_OF_RANGE_BUFFER: &str =
        "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAAAAABAAIAAwA=";

    fn document(mesh_mode: u32, indexed: bool, nodes: &str, scenes: &str) -> String {
        let indices = if indexed { r#", "indices": 1"# } else { "" };
        format!(
            r#"{{
                "asset": {{ "version": "2.0" }},
                {scenes}
                "nodes": {nodes},
                "meshes": [{{
                    "name": "tri",
                    "primitives": [{{ "attributes": {{ "POSITION": 0 }}, "mode": {mesh_mode}{indices} }}]
                }}],
                "accessors": [
                    {{ "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                       "min": [0, 0, 0], "max": [1, 1, 0] }},
                    {{ "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }}
                ],
                "bufferViews": [
                    {{ "buffer": 0, "byteOffset": 0, "byteLength": 36 }},
                    {{ "buffer": 0, "byteOffset": 36, "byteLength": 6 }}
                ],
                "buffers": [{{ "byteLength": 44, "uri": "{TRIANGLE_BUFFER}" }}]
            }}"#
        )
    }

    fn hierarchy() -> String {
        document(
            4,
            true,
            r#"[
                { "translation": [1, 2, 3], "children": [1] },
                { "mesh": 0, "scale": [2, 2, 2] },
                { "mesh": 0 }
            ]"#,
            r#""scene": 0, "scenes": [{ "nodes": [0, 2] }],"#,
        )
    }

    #[test]
    fn loads_triangle_with_defaults() {
        let scene = load_gltf_slice(hierarchy().as_bytes()).unwrap();

        assert_eq!(scene.meshes.len(), 1);
        let mesh = &scene.meshes[0];
        assert_eq!(mesh.name.as_deref(), Some("tri"));
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(mesh.vertices[1].position, [1.0, 0.0, 0.0]);
        assert_eq!(mesh.vertices[0].normal, [0.0, 1.0, 0.0]);
        assert_eq!(mesh.vertices[2].uv, [0.0, 0.0]);
    }

    #[test]
    fn child_transforms_compose_with_parent() {
        let scene = load_gltf_slice(hierarchy().as_bytes()).unwrap();
        assert_eq!(scene.instances.len(), 2);

        let child = scene.instances[0];
        assert_eq!(child.mesh_index, 0);
        let expected = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0))
            * Mat4::from_scale(Vec3::splat(2.0));
        for (a, b) in child
            .transform
            .to_cols_array()
            .iter()
            .zip(expected.to_cols_array().iter())
        {
            assert_relative_eq!(a, b, epsilon = 1e-6);
        }

        assert_eq!(scene.instances[1].transform, Mat4::IDENTITY);
    }

    #[test]
    fn missing_indices_are_generated() {
        let json = document(4, false, r#"[{ "mesh": 0 }]"#, "");
        let scene = load_gltf_slice(json.as_bytes()).unwrap();
        assert_eq!(scene.meshes[0].indices, vec![0, 1, 2]);
    }

    #[test]
    fn without_scenes_every_root_node_is_walked() {
        let json = document(
            4,
            true,
            r#"[
                { "mesh": 0, "children": [1] },
                { "mesh": 0, "translation": [0, 0, 5] },
                { "mesh": 0 }
            ]"#,
            "",
        );
        let scene = load_gltf_slice(json.as_bytes()).unwrap();
        // Node 1 is reached through node 0 only.
        assert_eq!(scene.instances.len(), 3);
        assert_eq!(
            scene.instances[1].transform,
            Mat4::from_translation(Vec3::new(0.0, 0.0, 5.0))
        );
    }

    #[test]
    fn non_triangle_primitives_yield_no_instances() {
        // Mode 0 is POINTS.
        let json = document(0, true, r#"[{ "mesh": 0 }]"#, "");
        match load_gltf_slice(json.as_bytes()) {
            Err(vkrt_core::Error::SceneLoad(message)) => {
                assert!(message.contains("no drawable instances"));
            }
            other => panic!("expected SceneLoad, got {other:?}"),
        }
    }

    #[test]
    fn malformed_geometry_is_a_scene_load_failure() {
        // Four indices: a partial triangle, and index 3 is past the last vertex.
        let json = document(4, true, r#"[{ "mesh": 0 }]"#, "").replace(
            r#""componentType": 5123, "count": 3"#,
            r#""componentType": 5123, "count": 4"#,
        );
        let json = json
            .replace(r#""byteOffset": 36, "byteLength": 6"#, r#""byteOffset": 36, "byteLength": 8"#)
            .replace(TRIANGLE_BUFFER, OUT_OF_RANGE_BUFFER);
        match load_gltf_slice(json.as_bytes()) {
            Err(vkrt_core::Error::SceneLoad(message)) => {
                assert!(message.contains("mesh 0"), "{message}");
            }
            other => panic!("expected SceneLoad, got {other:?}"),
        }
    }

    #[test]
    fn dangling_reference_keeps_its_kind() {
        let err = as_load_failure(vkrt_core::Error::InvalidMeshReference {
            instance: 0,
            mesh_index: 2,
            mesh_count: 1,
        });
        assert!(matches!(err, vkrt_core::Error::InvalidMeshReference { .. }));

        let err = as_load_failure(vkrt_core::Error::InvalidData("partial triangle".into()));
        assert!(matches!(err, vkrt_core::Error::SceneLoad(_)));
    }

    #[test]
    fn malformed_document_is_a_scene_load_failure() {
        let result = load_gltf_slice(b"{ not gltf");
        assert!(matches!(result, Err(vkrt_core::Error::SceneLoad(_))));
    }

    #[test]
    fn missing_file_is_a_scene_load_failure() {
        let result = load_gltf("/nonexistent/scene.gltf");
        assert!(matches!(result, Err(vkrt_core::Error::SceneLoad(_))));
    }
}
