use crate::schema::{self, CAMERA, LIGHTS, MATERIAL, MESH};
use crate::skybox::{SkyboxMethod, SkyboxSet};
use glam::{Quat, Vec3};
use lumen_state::Node;
use tracing::warn;

fn number(node: &Node, key: &str, default: f32) -> f32 {
    node.field(key).and_then(Node::as_f32).unwrap_or(default)
}

fn flag(node: &Node, key: &str, default: bool) -> bool {
    node.field(key).and_then(Node::as_bool).unwrap_or(default)
}

fn vec3(node: &Node, key: &str, default: Vec3) -> Vec3 {
    match node.field(key).and_then(Node::to_f32s) {
        Some(values) if values.len() >= 3 => Vec3::new(values[0], values[1], values[2]),
        _ => default,
    }
}

/// A rotation stored as `[x, y, z, w]`; anything else reads as identity.
pub(crate) fn read_quat(node: Option<&Node>) -> Quat {
    match node.and_then(Node::to_f32s) {
        Some(values) if values.len() == 4 => {
            let q = Quat::from_array([values[0], values[1], values[2], values[3]]);
            if q.length_squared() > f32::EPSILON {
                q.normalize()
            } else {
                Quat::IDENTITY
            }
        }
        _ => Quat::IDENTITY,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraSettings {
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    /// Distance from the orbit center.
    pub offset: f32,
    pub rotation: Quat,
}

impl CameraSettings {
    pub fn from_node(node: &Node) -> Self {
        Self {
            fov: number(node, "fov", 45.0),
            near: number(node, "near", 0.1),
            far: number(node, "far", 100.0),
            offset: number(node, "offset", 10.0),
            rotation: read_quat(node.field("rotation")),
        }
    }

    /// Whether the projection depends on anything that differs.
    pub fn projection_differs(&self, other: &Self) -> bool {
        self.fov != other.fov || self.near != other.near || self.far != other.far
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialSettings {
    pub ambient: Vec3,
    pub diffuse: Vec3,
    pub specular: Vec3,
    pub highlight: f32,
    pub reflection_scalar: f32,
    pub refraction_scalar: f32,
    pub refraction_index: Vec3,
    /// Refract each color channel with its own index.
    pub refract_colors: bool,
}

impl MaterialSettings {
    pub fn from_node(node: &Node) -> Self {
        Self {
            ambient: vec3(node, "ambient", Vec3::splat(0.05)),
            diffuse: vec3(node, "diffuse", Vec3::splat(0.7)),
            specular: vec3(node, "specular", Vec3::splat(0.7)),
            highlight: number(node, "highlight", 32.0),
            reflection_scalar: number(node, "reflectionScalar", 0.5),
            refraction_scalar: number(node, "refractionScalar", 0.5),
            refraction_index: vec3(node, "refractionIndex", Vec3::new(0.8, 0.85, 0.8)),
            refract_colors: flag(node, "refractColors", true),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LightKind {
    #[default]
    Directional,
    Spotlight,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightSettings {
    pub kind: LightKind,
    pub ambient: Vec3,
    pub diffuse: Vec3,
    pub specular: Vec3,
    /// Direction for directional lights, position otherwise.
    pub vector: Vec3,
}

impl LightSettings {
    pub fn from_node(node: &Node) -> Self {
        let kind = match node.field("type").and_then(Node::as_str) {
            Some("Spotlight") => LightKind::Spotlight,
            _ => LightKind::Directional,
        };
        Self {
            kind,
            ambient: vec3(node, "ambient", Vec3::splat(0.05)),
            diffuse: vec3(node, "diffuse", Vec3::splat(0.7)),
            specular: vec3(node, "specular", Vec3::splat(0.7)),
            vector: vec3(node, "vector", Vec3::Y),
        }
    }

    pub fn list_from_node(node: &Node) -> Vec<Self> {
        node.as_list()
            .map(|items| items.iter().map(Self::from_node).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshSettings {
    pub skybox_method: SkyboxMethod,
    pub skybox_texture: SkyboxSet,
    pub lowpoly: bool,
    pub flatten: bool,
    pub bounce: bool,
    pub rotate: bool,
    pub animate_lights: bool,
}

impl MeshSettings {
    pub fn from_node(node: &Node) -> Self {
        let skybox_method = match node.field("skyboxMethod").and_then(Node::as_str) {
            Some(name) => SkyboxMethod::parse(name).unwrap_or_else(|| {
                warn!(name, "unknown skybox method, using the default");
                SkyboxMethod::default()
            }),
            None => SkyboxMethod::default(),
        };
        let skybox_texture = match node.field("skyboxTexture").and_then(Node::as_str) {
            Some(name) => name.parse::<SkyboxSet>().unwrap_or_else(|error| {
                warn!(%error, "using the default skybox");
                SkyboxSet::default()
            }),
            None => SkyboxSet::default(),
        };
        Self {
            skybox_method,
            skybox_texture,
            lowpoly: flag(node, "lowpoly", false),
            flatten: flag(node, "flatten", false),
            bounce: flag(node, "bounce", true),
            rotate: flag(node, "rotate", true),
            animate_lights: flag(node, "lights", true),
        }
    }

    /// Whether the monkey geometry depends on anything that differs.
    pub fn geometry_differs(&self, other: &Self) -> bool {
        self.lowpoly != other.lowpoly || self.flatten != other.flatten
    }
}

/// Typed view of one settings snapshot. Missing or mistyped values read as
/// their defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneSettings {
    pub camera: CameraSettings,
    pub material: MaterialSettings,
    pub lights: Vec<LightSettings>,
    pub mesh: MeshSettings,
}

impl SceneSettings {
    pub fn from_node(root: &Node) -> Self {
        let section = |name: &str| root.field(name).cloned().unwrap_or_default();
        Self {
            camera: CameraSettings::from_node(&section(CAMERA)),
            material: MaterialSettings::from_node(&section(MATERIAL)),
            lights: LightSettings::list_from_node(&section(LIGHTS)),
            mesh: MeshSettings::from_node(&section(MESH)),
        }
    }

    /// Number of lights the shaders and the light buffer are sized for.
    pub fn light_count(&self) -> usize {
        self.lights.len().max(schema::LIGHT_BOUNDS.min)
    }
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self::from_node(&lumen_panel::defaults(&schema::scene_schema()))
    }
}

/// Number of elements in the `lights` list of a root snapshot.
pub fn light_count(root: &Node) -> usize {
    root.field(LIGHTS).map_or(0, Node::len)
}

/// `material.refractColors` of a root snapshot.
pub fn refract_colors(root: &Node) -> bool {
    root.field(MATERIAL)
        .map_or(true, |material| flag(material, "refractColors", true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_persist::Preset;

    #[test]
    fn defaults_read_back() {
        let settings = SceneSettings::default();
        assert_eq!(settings.camera.fov, 45.0);
        assert_eq!(settings.camera.rotation, Quat::IDENTITY);
        assert_eq!(settings.material.ambient, Vec3::splat(0.05));
        assert!(settings.material.refract_colors);
        assert_eq!(settings.lights.len(), 1);
        assert_eq!(settings.lights[0].vector, Vec3::Y);
        assert_eq!(settings.mesh.skybox_texture, SkyboxSet::Totality);
        assert_eq!(settings.mesh.skybox_method, SkyboxMethod::FrustumPlane);
    }

    #[test]
    fn garbage_reads_as_defaults() {
        let root: Node = serde_json::from_str(
            r#"{"camera":{"fov":"wide","rotation":[0,0,0,0]},"lights":7,"mesh":{"skyboxTexture":"nebula"}}"#,
        )
        .unwrap();
        let settings = SceneSettings::from_node(&root);
        assert_eq!(settings.camera.fov, 45.0);
        assert_eq!(settings.camera.rotation, Quat::IDENTITY);
        assert!(settings.lights.is_empty());
        assert_eq!(settings.light_count(), 1);
        assert_eq!(settings.mesh.skybox_texture, SkyboxSet::Totality);
    }

    #[test]
    fn presets_parse() {
        let settings = SceneSettings::from_node(&Preset::RefractionOnly.snapshot().unwrap());
        assert!(settings.material.refraction_scalar > 0.0);
        let everything =
            SceneSettings::from_node(&Preset::OneWithEverything.snapshot().unwrap());
        assert!(!everything.lights.is_empty());
    }

    #[test]
    fn structural_probes() {
        let root: Node = serde_json::from_str(
            r#"{"material":{"refractColors":false},"lights":[{},{}]}"#,
        )
        .unwrap();
        assert_eq!(light_count(&root), 2);
        assert!(!refract_colors(&root));
        assert!(refract_colors(&Node::empty_map()));
    }
}
