// src/main.rs
use anyhow::Context;
use lightpass::{config::RendererConfig, LightpassApp};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info,wgpu_core=warn,wgpu_hal=warn,naga=warn"),
    )
    .init();

    let verbose_targets = std::env::var("LIGHTPASS_DEBUG_TARGETS").is_ok();
    if verbose_targets {
        log::info!("Verbose target and pass logging enabled");
    }

    LightpassApp::new(RendererConfig::default())?
        .with_verbose_targets(verbose_targets)
        .run()
        .context("lightpass exited with an error")
}
