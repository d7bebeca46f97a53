//! WGSL sources and the uniform layouts they read.
//!
//! Every program shares one bind group (group 0):
//!
//! | binding | contents |
//! |---------|----------|
//! | 0 | `Camera` uniform block |
//! | 1 | `Material` uniform block |
//! | 2 | `Light` uniform block, sized by light count |
//! | 3 | skybox `texture_cube<f32>` |
//! | 4 | skybox sampler |
//! | 5 | per-draw model matrix |
//!
//! Vertex input is interleaved `position: vec3` at location 0 and
//! `normal: vec3` at location 1. Every module's entry points are `vs_main`
//! and `fs_main`.

use crate::layout::{FieldKind, FieldSpec, UniformLayout};

pub const CAMERA_BINDING: u32 = 0;
pub const MATERIAL_BINDING: u32 = 1;
pub const LIGHT_BINDING: u32 = 2;
pub const SKYBOX_TEXTURE_BINDING: u32 = 3;
pub const SKYBOX_SAMPLER_BINDING: u32 = 4;
pub const MODEL_BINDING: u32 = 5;

pub fn camera_layout() -> UniformLayout {
    UniformLayout::std140(&[
        FieldSpec::new("projection", FieldKind::Mat4),
        FieldSpec::new("view", FieldKind::Mat4),
        FieldSpec::new("position", FieldKind::Vec4),
        FieldSpec::new("inverse_view_projection", FieldKind::Mat4),
    ])
}

pub fn material_layout() -> UniformLayout {
    UniformLayout::std140(&[
        FieldSpec::new("ambient_color", FieldKind::Vec3),
        FieldSpec::new("diffuse_color", FieldKind::Vec3),
        FieldSpec::new("specular_color", FieldKind::Vec3),
        FieldSpec::new("specular_highlight", FieldKind::Float),
        FieldSpec::new("refraction_index", FieldKind::Vec3),
        FieldSpec::new("refraction_scalar", FieldKind::Float),
        FieldSpec::new("reflection_scalar", FieldKind::Float),
    ])
}

/// Light block for `count` lights; slots are `<field>_<index>`.
pub fn light_layout(count: usize) -> UniformLayout {
    UniformLayout::std140(&[
        FieldSpec::array("ambient_color", FieldKind::Vec3, count),
        FieldSpec::array("diffuse_color", FieldKind::Vec3, count),
        FieldSpec::array("specular_color", FieldKind::Vec3, count),
        FieldSpec::array("direction_position", FieldKind::Vec3, count),
    ])
}

const CAMERA: &str = r#"
struct Camera {
    projection: mat4x4<f32>,
    view: mat4x4<f32>,
    position: vec4<f32>,
    inverse_view_projection: mat4x4<f32>,
};

@group(0) @binding(0)
var<uniform> camera: Camera;
"#;

const SKYBOX_SAMPLER: &str = r#"
@group(0) @binding(3)
var skybox: texture_cube<f32>;
@group(0) @binding(4)
var skybox_sampler: sampler;
"#;

const SKYBOX_OUTPUT: &str = r#"
struct SkyboxOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) direction: vec3<f32>,
};
"#;

const SKYBOX_CUBE_MAIN: &str = r#"
@vertex
fn vs_main(@location(0) position: vec3<f32>) -> SkyboxOutput {
    let rotated = (camera.view * vec4<f32>(position, 0.0)).xyz;
    let clip = camera.projection * vec4<f32>(rotated, 1.0);
    var out: SkyboxOutput;
    // Pin to the far plane.
    out.clip_position = clip.xyww;
    out.direction = normalize(position);
    return out;
}
"#;

const SKYBOX_PLANE_MAIN: &str = r#"
@vertex
fn vs_main(@location(0) position: vec3<f32>) -> SkyboxOutput {
    let world = camera.inverse_view_projection * vec4<f32>(position, 1.0);
    var out: SkyboxOutput;
    out.clip_position = vec4<f32>(position.xy, 1.0, 1.0);
    out.direction = normalize(world.xyz / world.w - camera.position.xyz);
    return out;
}
"#;

const SKYBOX_FRAGMENT_MAIN: &str = r#"
@fragment
fn fs_main(@location(0) direction: vec3<f32>) -> @location(0) vec4<f32> {
    return vec4<f32>(textureSample(skybox, skybox_sampler, direction).rgb, 1.0);
}
"#;

const MONKEY_OUTPUT: &str = r#"
struct MonkeyOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) normal: vec3<f32>,
    @location(1) incident: vec3<f32>,
};
"#;

const MONKEY_VERTEX_MAIN: &str = r#"
struct Draw {
    model: mat4x4<f32>,
};

@group(0) @binding(5)
var<uniform> draw: Draw;

@vertex
fn vs_main(@location(0) position: vec3<f32>, @location(1) normal: vec3<f32>) -> MonkeyOutput {
    let world = draw.model * vec4<f32>(position, 1.0);
    var out: MonkeyOutput;
    out.normal = (draw.model * vec4<f32>(normal, 0.0)).xyz;
    out.incident = normalize(world.xyz - camera.position.xyz);
    out.clip_position = camera.projection * camera.view * world;
    return out;
}
"#;

const MATERIAL: &str = r#"
struct Material {
    ambient_color: vec3<f32>,
    diffuse_color: vec3<f32>,
    specular_color: vec3<f32>,
    specular_highlight: f32,
    refraction_index: vec3<f32>,
    refraction_scalar: f32,
    reflection_scalar: f32,
};

@group(0) @binding(1)
var<uniform> material: Material;
"#;

const REFRACT_SINGLE: &str = r#"
    let refraction = textureSample(skybox, skybox_sampler,
        refract(incident, normal, material.refraction_index.r)).rgb * material.refraction_scalar;
"#;

const REFRACT_DISPERSED: &str = r#"
    let refraction = vec3<f32>(
        textureSample(skybox, skybox_sampler, refract(incident, normal, material.refraction_index.r)).r,
        textureSample(skybox, skybox_sampler, refract(incident, normal, material.refraction_index.g)).g,
        textureSample(skybox, skybox_sampler, refract(incident, normal, material.refraction_index.b)).b,
    ) * material.refraction_scalar;
"#;

pub fn skybox_cube_vertex() -> String {
    [CAMERA, SKYBOX_OUTPUT, SKYBOX_CUBE_MAIN].concat()
}

pub fn skybox_plane_vertex() -> String {
    [CAMERA, SKYBOX_OUTPUT, SKYBOX_PLANE_MAIN].concat()
}

pub fn skybox_fragment() -> String {
    [SKYBOX_SAMPLER, SKYBOX_FRAGMENT_MAIN].concat()
}

pub fn monkey_vertex() -> String {
    [CAMERA, MONKEY_OUTPUT, MONKEY_VERTEX_MAIN].concat()
}

/// Lit, reflective and refractive shading for `light_count` lights. With
/// `refract_colors` each channel refracts with its own index.
pub fn monkey_fragment(light_count: usize, refract_colors: bool) -> String {
    let count = light_count.max(1);
    let lights = format!(
        r#"
const LIGHT_COUNT: u32 = {count}u;

struct Light {{
    ambient_color: array<vec3<f32>, {count}>,
    diffuse_color: array<vec3<f32>, {count}>,
    specular_color: array<vec3<f32>, {count}>,
    direction_position: array<vec3<f32>, {count}>,
}};

@group(0) @binding(2)
var<uniform> light: Light;
"#
    );
    let refraction = if refract_colors {
        REFRACT_DISPERSED
    } else {
        REFRACT_SINGLE
    };
    let main = format!(
        r#"
@fragment
fn fs_main(in: MonkeyOutput) -> @location(0) vec4<f32> {{
    let normal = normalize(in.normal);
    let incident = normalize(in.incident);
    var ambient = material.ambient_color;
    var diffuse = vec3<f32>(0.0);
    var specular = vec3<f32>(0.0);
    for (var i = 0u; i < LIGHT_COUNT; i += 1u) {{
        let direction = light.direction_position[i];
        ambient += light.ambient_color[i];
        let lambert = max(dot(normal, direction), 0.0);
        diffuse += material.diffuse_color * light.diffuse_color[i] * lambert;
        let highlight = pow(max(dot(normal, normalize(direction - incident)), 0.0), material.specular_highlight);
        specular += material.specular_color * light.specular_color[i] * highlight;
    }}
    let reflection = textureSample(skybox, skybox_sampler, normalize(reflect(incident, normal))).rgb
        * material.reflection_scalar;
{refraction}
    return vec4<f32>(ambient + diffuse + specular + reflection + refraction, 1.0);
}}
"#
    );
    [MATERIAL, &lights, SKYBOX_SAMPLER, MONKEY_OUTPUT, &main].concat()
}
