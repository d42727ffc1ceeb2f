// shader.rs — 全景投影着色器（顶点 + 片元，WGSL）
//
// 顶点阶段只做 model / viewProjection 变换并把世界坐标传给片元阶段；
// 片元阶段按方向计算球面坐标后采样 uTexture。
// 两个阶段各自是一个独立的 shader module，片元程序前面拼接精度前导。

/// Name of the single texture parameter of the projection material.
pub const TEXTURE_PARAMETER: &str = "uTexture";

pub const VS_ENTRY: &str = "vs_main";
pub const FS_ENTRY: &str = "fs_main";

/// Fragment float precision the device can compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precision {
    /// Full 32-bit floats (desktop class devices).
    #[default]
    High,
    /// Direction rounded to 16-bit floats, for devices without complete
    /// highp support.
    Medium,
}

/// Semantic of a vertex attribute declared by the shader definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Semantic {
    Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub name: &'static str,
    pub semantic: Semantic,
}

pub const ATTRIBUTES: &[VertexAttribute] = &[VertexAttribute {
    name: "aPosition",
    semantic: Semantic::Position,
}];

/// Everything the host needs to build the projection program.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderDefinition {
    pub attributes: &'static [VertexAttribute],
    pub vertex: &'static str,
    pub fragment: String,
    pub precision: Precision,
}

impl ShaderDefinition {
    pub fn new(precision: Precision) -> Self {
        Self {
            attributes: ATTRIBUTES,
            vertex: VERTEX_SHADER,
            fragment: fragment_source(precision),
            precision,
        }
    }
}

/// group(0): 每次绘制的变换矩阵
pub const VERTEX_SHADER: &str = r#"
struct Transforms {
    matrix_model: mat4x4<f32>,
    matrix_view_projection: mat4x4<f32>,
};

@group(0) @binding(0)
var<uniform> transforms: Transforms;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_position: vec4<f32>,
};

@vertex
fn vs_main(@location(0) a_position: vec3<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.world_position = transforms.matrix_model * vec4<f32>(a_position, 1.0);
    out.clip_position = transforms.matrix_view_projection * out.world_position;
    return out;
}
"#;

// 精度前导提供 PI / HALF 和 to_precision()，片元主体对两种精度相同
const HIGH_PRECISION: &str = r#"
const PI: f32 = 3.1415926;
const HALF: f32 = 0.5;

fn to_precision(p: vec3<f32>) -> vec3<f32> {
    return p;
}
"#;

// WGSL 前端不支持 f16 类型：方向先在 f32 下归一化（避免 x*x + z*z 溢出），
// 再经 pack2x16float 截断到半精度
const MEDIUM_PRECISION: &str = r#"
const PI: f32 = 3.1415926;
const HALF: f32 = 0.5;

fn to_precision(p: vec3<f32>) -> vec3<f32> {
    let n = normalize(p);
    let xy = unpack2x16float(pack2x16float(n.xy));
    let z = unpack2x16float(pack2x16float(vec2<f32>(n.z, 0.0))).x;
    return vec3<f32>(xy, z);
}
"#;

/// group(1): 材质参数 uTexture（纹理 + 纹理自带的采样器）
const FRAGMENT_BODY: &str = r#"
@group(1) @binding(0)
var u_texture: texture_2d<f32>;
@group(1) @binding(1)
var u_sampler: sampler;

@fragment
fn fs_main(@location(0) world_position: vec4<f32>) -> @location(0) vec4<f32> {
    let p = to_precision(world_position.xyz);

    let u = HALF - HALF * atan2(p.x, p.z) / PI;
    let xz = sqrt(p.x * p.x + p.z * p.z);
    let v = atan2(xz, p.y) / PI;

    return textureSample(u_texture, u_sampler, vec2<f32>(u, v));
}
"#;

/// Fragment program text for the given precision.
pub fn fragment_source(precision: Precision) -> String {
    let preamble = match precision {
        Precision::High => HIGH_PRECISION,
        Precision::Medium => MEDIUM_PRECISION,
    };
    let mut source = String::with_capacity(preamble.len() + FRAGMENT_BODY.len());
    source.push_str(preamble);
    source.push_str(FRAGMENT_BODY);
    source
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(source: &str) -> Result<(), String> {
        let module = naga::front::wgsl::parse_str(source)
            .map_err(|e| format!("WGSL parse error: {:?}", e))?;

        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        validator
            .validate(&module)
            .map_err(|e| format!("Validation error: {:?}", e))?;
        Ok(())
    }

    #[test]
    fn vertex_program_validates() {
        validate(VERTEX_SHADER).unwrap();
    }

    #[test]
    fn high_precision_fragment_validates() {
        validate(&fragment_source(Precision::High)).unwrap();
    }

    #[test]
    fn medium_precision_fragment_validates() {
        validate(&fragment_source(Precision::Medium)).unwrap();
    }

    #[test]
    fn medium_precision_normalizes_before_narrowing() {
        let source = fragment_source(Precision::Medium);
        let normalize = source.find("normalize(p)").unwrap();
        let pack = source.find("pack2x16float").unwrap();
        assert!(normalize < pack);
        assert!(!source.contains("f16"));
    }

    #[test]
    fn only_preamble_differs_between_precisions() {
        let high = fragment_source(Precision::High);
        let medium = fragment_source(Precision::Medium);
        assert!(high.ends_with(FRAGMENT_BODY));
        assert!(medium.ends_with(FRAGMENT_BODY));
        assert!(!high.contains("pack2x16float"));
        assert_ne!(high, medium);
    }

    #[test]
    fn definition_declares_position_only() {
        let def = ShaderDefinition::new(Precision::High);
        assert_eq!(def.attributes.len(), 1);
        assert_eq!(def.attributes[0].name, "aPosition");
        assert_eq!(def.attributes[0].semantic, Semantic::Position);
        assert_eq!(def.vertex, VERTEX_SHADER);
        assert!(def.vertex.contains(VS_ENTRY));
        assert!(def.fragment.contains(FS_ENTRY));
    }
}
