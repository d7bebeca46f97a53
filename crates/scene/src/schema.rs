use crate::skybox::{SkyboxMethod, SkyboxSet};
use lumen_input::{Action, Axis};
use lumen_panel::{Control, FloatSpec, Header, VectorSpec};
use lumen_persist::Preset;
use lumen_state::Bounds;

pub const CAMERA: &str = "camera";
pub const MATERIAL: &str = "material";
pub const LIGHTS: &str = "lights";
pub const MESH: &str = "mesh";

/// Light count bounds.
pub const LIGHT_BOUNDS: Bounds = Bounds { min: 1, max: 3 };

fn color(name: &str, header: &str, value: f64) -> Control {
    Control::vector(
        VectorSpec::new(name, header, &[value; 3])
            .range(0.0, 1.0)
            .step(0.01),
    )
}

fn unit(name: &str, header: &str, value: f64) -> Control {
    Control::float(FloatSpec::new(name, header, value).range(0.0, 1.0).step(0.01))
}

pub fn camera() -> Vec<Control> {
    let mut resets: Vec<(String, Action)> = Axis::ALL
        .iter()
        .map(|axis| (axis.to_string(), Action::ResetRotation(Some(*axis))))
        .collect();
    resets.push(("all".to_owned(), Action::ResetRotation(None)));
    vec![
        Control::float(FloatSpec::new("fov", "Field of View", 45.0).range(10.0, 160.0)),
        Control::float(FloatSpec::new("near", "Near", 0.1).range(0.01, 0.99)),
        Control::float(FloatSpec::new("far", "Far", 100.0).min(1.0)),
        Control::float(FloatSpec::new("offset", "Offset", 10.0).min(1.0)),
        Control::vector(VectorSpec::new("rotation", "Rotation", &[0.0, 0.0, 0.0, 1.0])),
        Control::Buttons {
            header: "Reset".into(),
            buttons: resets,
        },
    ]
}

pub fn material() -> Vec<Control> {
    vec![
        color("ambient", "Ambient Color", 0.05),
        color("diffuse", "Diffuse Color", 0.7),
        color("specular", "Specular Color", 0.7),
        Control::float(
            FloatSpec::new("highlight", "Specular Highlight", 32.0)
                .range(0.0, 1024.0)
                .step(0.1),
        ),
        unit("reflectionScalar", "Reflection Scalar", 0.5),
        unit("refractionScalar", "Refraction Scalar", 0.5),
        Control::vector(
            VectorSpec::new("refractionIndex", "Refraction Index", &[0.8, 0.85, 0.8])
                .range(0.0, 1.0)
                .step(0.01)
                .extra_components_when("refractColors"),
        ),
        Control::bool("refractColors", "Refract Colors", true),
    ]
}

pub fn light() -> Vec<Control> {
    vec![
        Control::dropdown("type", " ", &["Directional", "Spotlight"]),
        color("ambient", "Ambient Color", 0.05),
        color("diffuse", "Diffuse Color", 0.7),
        color("specular", "Specular Color", 0.7),
        Control::vector(
            VectorSpec::new(
                "vector",
                Header::Switch {
                    key: "type".to_owned(),
                    cases: vec![("Directional".to_owned(), "Direction".to_owned())],
                    fallback: "Position".to_owned(),
                },
                &[0.0, 1.0, 0.0],
            )
            .range(-1.0, 1.0)
            .step(0.01)
            .normalized(),
        ),
    ]
}

pub fn mesh() -> Vec<Control> {
    let methods: Vec<&str> = SkyboxMethod::ALL.iter().map(|m| m.name()).collect();
    vec![
        Control::dropdown("skyboxMethod", "Skybox Method", &methods),
        Control::dropdown("skyboxTexture", "Skybox Texture", &SkyboxSet::names()),
        Control::bool("lowpoly", "Low Polygon", false),
        Control::bool("flatten", "Flatten Normals", false),
        Control::bool("bounce", "Bounce Monkey", true),
        Control::bool("rotate", "Rotate Monkey", true),
        Control::bool("lights", "Animate Lights", true),
    ]
}

/// The whole settings panel of the scene.
pub fn scene_schema() -> Vec<Control> {
    let mut presets: Vec<(String, Action)> = Preset::ALL
        .iter()
        .map(|preset| (preset.label().to_owned(), Action::LoadPreset(preset.name().to_owned())))
        .collect();
    presets.push(("Reset".to_owned(), Action::ResetSession));
    vec![
        Control::section(CAMERA, "Camera", camera()),
        Control::section(MATERIAL, "Material", material()),
        Control::list(LIGHTS, "Lights", LIGHT_BOUNDS, light()),
        Control::section(MESH, "Mesh / Skybox / Misc", mesh()),
        Control::Buttons {
            header: "Presets".into(),
            buttons: presets,
        },
    ]
}
