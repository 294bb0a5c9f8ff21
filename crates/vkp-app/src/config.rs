// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WindowCfg {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            title: "Vulkan Practice".to_string(),
            width: 640,
            height: 480,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RenderCfg {
    pub app_name: String,
    pub buffer_count: u32,
    pub clear_color: [f32; 4],
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
    pub validation: bool,
    pub fence_timeout_ns: u64,
    pub target_fps: f64,
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            app_name: "Vulkan Practice".to_string(),
            buffer_count: 2,
            clear_color: default_clear(),
            vertex_shader: PathBuf::from("simple.vert.spv"),
            fragment_shader: PathBuf::from("simple.frag.spv"),
            validation: false,
            fence_timeout_ns: 100_000_000,
            target_fps: 60.0,
        }
    }
}

fn default_clear() -> [f32; 4] {
    [0.2, 0.2, 0.2, 0.2]
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct AppCfg {
    #[serde(default)]
    pub window: WindowCfg,
    #[serde(default)]
    pub render: RenderCfg,
}

/// Missing file means defaults; a file that does not parse is an error.
pub fn load_cfg(path: &Path) -> Result<AppCfg> {
    match std::fs::read_to_string(path) {
        Ok(s) => parse_cfg(&s).with_context(|| format!("parse {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("{} not found, using defaults", path.display());
            Ok(AppCfg::default())
        }
        Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
    }
}

pub fn parse_cfg(text: &str) -> Result<AppCfg> {
    Ok(toml::from_str::<AppCfg>(text)?)
}
