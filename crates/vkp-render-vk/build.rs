use std::{env, fs, path::PathBuf};

fn main() {
    let out = PathBuf::from(env::var("OUT_DIR").unwrap());

    // Layout must agree with the vertex buffer and descriptor set:
    //   binding 0, location 0: R32G32B32A32_SFLOAT (pos)
    //   binding 0, location 1: R32G32B32A32_SFLOAT (color)
    //   set 0, binding 0: uniform block with the transform
    let vs_src = r#"
#version 450
layout(std140, set = 0, binding = 0) uniform Transform { mat4 mvp; } u;

layout(location = 0) in vec4 inPos;
layout(location = 1) in vec4 inColor;

layout(location = 0) out vec4 vColor;

void main() {
    vColor = inColor;
    gl_Position = u.mvp * inPos;
}
"#;

    let fs_src = r#"
#version 450
layout(location = 0) in vec4 vColor;
layout(location = 0) out vec4 outColor;

void main() {
    outColor = vColor;
}
"#;

    let comp = shaderc::Compiler::new().unwrap();
    let mut opts = shaderc::CompileOptions::new().unwrap();
    opts.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_0 as u32,
    );
    opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

    let vs_spv = comp
        .compile_into_spirv(
            vs_src,
            shaderc::ShaderKind::Vertex,
            "simple.vert",
            "main",
            Some(&opts),
        )
        .unwrap();

    let fs_spv = comp
        .compile_into_spirv(
            fs_src,
            shaderc::ShaderKind::Fragment,
            "simple.frag",
            "main",
            Some(&opts),
        )
        .unwrap();

    fs::write(out.join("simple.vert.spv"), vs_spv.as_binary_u8()).unwrap();
    fs::write(out.join("simple.frag.spv"), fs_spv.as_binary_u8()).unwrap();

    println!("cargo:rerun-if-changed=build.rs");
}
