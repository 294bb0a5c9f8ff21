// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{error, info, trace};
use vkp_core::{init_tracing, FramePacer, ShutdownSignal};
use vkp_platform::{Platform, WindowSpec};
use vkp_render::{RenderSize, Renderer};
use vkp_render_vk::{VkRenderer, VkRendererConfig, EMBEDDED_FRAGMENT_SPV, EMBEDDED_VERTEX_SPV};

mod config;

use config::{load_cfg, AppCfg, RenderCfg};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file; defaults apply when it does not exist
    #[arg(long, default_value = "vkp.toml")]
    config: PathBuf,
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
    /// Minimum number of swapchain images
    #[arg(long)]
    buffers: Option<u32>,
    /// Enable the Khronos validation layer
    #[arg(long)]
    validation: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Write the bundled simple.vert.spv / simple.frag.spv into a directory
    WriteShaders {
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
}

fn apply_overrides(cfg: &mut AppCfg, args: &Args) {
    if let Some(w) = args.width {
        cfg.window.width = w;
    }
    if let Some(h) = args.height {
        cfg.window.height = h;
    }
    if let Some(n) = args.buffers {
        cfg.render.buffer_count = n;
    }
    if args.validation {
        cfg.render.validation = true;
    }
}

fn renderer_config(cfg: &RenderCfg) -> VkRendererConfig {
    VkRendererConfig {
        app_name: cfg.app_name.clone(),
        buffer_count: cfg.buffer_count,
        vertex_shader: cfg.vertex_shader.clone(),
        fragment_shader: cfg.fragment_shader.clone(),
        clear_color: cfg.clear_color,
        validation: cfg.validation,
        fence_timeout_ns: cfg.fence_timeout_ns,
        ..VkRendererConfig::default()
    }
}

fn write_shaders(out: &Path) -> Result<()> {
    std::fs::create_dir_all(out).with_context(|| format!("create {}", out.display()))?;
    for (name, bytes) in [
        ("simple.vert.spv", EMBEDDED_VERTEX_SPV),
        ("simple.frag.spv", EMBEDDED_FRAGMENT_SPV),
    ] {
        let path = out.join(name);
        std::fs::write(&path, bytes).with_context(|| format!("write {}", path.display()))?;
        info!("wrote {} ({} bytes)", path.display(), bytes.len());
    }
    Ok(())
}

fn run(cfg: AppCfg) -> Result<()> {
    let shutdown = ShutdownSignal::new();
    let mut platform = Platform::new(
        WindowSpec {
            title: cfg.window.title.clone(),
            width: cfg.window.width,
            height: cfg.window.height,
        },
        shutdown.clone(),
    )?;

    let (width, height) = platform.inner_size()?;
    let window = platform.window()?;
    let mut renderer = VkRenderer::new(
        window,
        window,
        RenderSize { width, height },
        renderer_config(&cfg.render),
    )?;
    let extent = renderer.extent();
    info!(
        "rendering {}x{} with {} swapchain images",
        extent.width,
        extent.height,
        renderer.image_count()
    );

    let mut pacer = FramePacer::new(cfg.render.target_fps);
    let mut frame: u64 = 0;
    loop {
        pacer.begin_frame();
        let events = platform.pump();
        if events > 0 {
            trace!("loop {frame}: {events} window events");
        }
        if shutdown.is_requested() {
            break;
        }
        if let Err(e) = renderer.render() {
            error!("failed on loop {frame}: {e:#}");
            return Err(e);
        }
        frame += 1;
        pacer.end_frame();
    }

    info!("shutting down after {} frames", renderer.frames());
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    if let Some(Command::WriteShaders { out }) = &args.command {
        return write_shaders(out);
    }

    let mut cfg = match load_cfg(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("config {}: {e:#}", args.config.display());
            return Err(e);
        }
    };
    apply_overrides(&mut cfg, &args);

    run(cfg).inspect_err(|e| error!("{e:#}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_override_file_values() {
        let args = Args::try_parse_from([
            "vkp",
            "--width",
            "1024",
            "--buffers",
            "3",
            "--validation",
        ])
        .unwrap();
        let mut cfg = AppCfg::default();
        cfg.window.height = 700;
        apply_overrides(&mut cfg, &args);
        assert_eq!(cfg.window.width, 1024);
        assert_eq!(cfg.window.height, 700);
        assert_eq!(cfg.render.buffer_count, 3);
        assert!(cfg.render.validation);
    }

    #[test]
    fn absent_flags_leave_config_alone() {
        let args = Args::try_parse_from(["vkp"]).unwrap();
        assert_eq!(args.config, PathBuf::from("vkp.toml"));
        let mut cfg = AppCfg::default();
        cfg.render.validation = true;
        apply_overrides(&mut cfg, &args);
        assert_eq!(cfg.window, config::WindowCfg::default());
        assert!(cfg.render.validation);
    }

    #[test]
    fn write_shaders_subcommand_parses() {
        let args = Args::try_parse_from(["vkp", "write-shaders", "--out", "shaders"]).unwrap();
        assert_eq!(
            args.command,
            Some(Command::WriteShaders {
                out: PathBuf::from("shaders")
            })
        );
    }

    #[test]
    fn render_config_carries_file_settings() {
        let mut cfg = RenderCfg::default();
        cfg.buffer_count = 4;
        cfg.clear_color = [1.0, 0.0, 0.0, 1.0];
        let vk = renderer_config(&cfg);
        assert_eq!(vk.buffer_count, 4);
        assert_eq!(vk.clear_color, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(vk.vertex_shader, cfg.vertex_shader);
    }

    #[test]
    fn bundled_shaders_land_on_disk() {
        let dir = std::env::temp_dir().join(format!("vkp-shaders-{}", std::process::id()));
        write_shaders(&dir).unwrap();
        let vert = std::fs::read(dir.join("simple.vert.spv")).unwrap();
        assert_eq!(vert, EMBEDDED_VERTEX_SPV);
        std::fs::remove_dir_all(dir).ok();
    }
}
