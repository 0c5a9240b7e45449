//! Pipe Viewer - headless host for a single pipe source
//!
//! Loads the module, creates one pipe source and drives its tick/render loop
//! against an offscreen render target.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;

use pipe_source::graphics::{GpuContext, RenderTarget, WgpuGraphics};
use pipe_source::{
    pipe_source_info, ModuleConfig, PluginModule, SourceSettings, TcpSubscriber, PIPE_SOURCE_ID,
};

/// Parsed command line arguments.
#[derive(Parser, Debug, Clone)]
#[command(about = "Receive a pipe channel and render it offscreen.")]
struct Args {
    /// Channel name from the config, or a literal host:port.
    channel: String,

    /// Only receive while the source is showing.
    #[arg(long)]
    unload: bool,

    /// Incoming alpha was premultiplied in linear space.
    #[arg(long)]
    linear_alpha: bool,

    /// Render loop rate.
    #[arg(long, default_value_t = 60)]
    fps: u32,

    /// Stop after this many seconds. Runs until killed when omitted.
    #[arg(long)]
    duration: Option<f64>,

    /// Render target width.
    #[arg(long, default_value_t = 1920)]
    width: u32,

    /// Render target height.
    #[arg(long, default_value_t = 1080)]
    height: u32,

    /// Module config file to use instead of the one in the config directory.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ModuleConfig::load_from_file(path)?,
        None => ModuleConfig::load(),
    };
    let mut module = PluginModule::<RenderTarget>::load(config);

    let gpu = Arc::new(pollster::block_on(GpuContext::new_headless())?);

    let directory = module.config().channels.clone();
    let max_frame_bytes = module.config().max_frame_bytes;
    let factory_gpu = Arc::clone(&gpu);
    module.register(pipe_source_info(
        move || TcpSubscriber::with_max_frame_bytes(directory.clone(), max_frame_bytes),
        move || WgpuGraphics::new(Arc::clone(&factory_gpu)),
    ));

    let settings = SourceSettings {
        channel_name: args.channel.clone(),
        unload_when_hidden: args.unload,
        linear_alpha: args.linear_alpha,
    };
    let mut source = module
        .create_source(PIPE_SOURCE_ID, &settings)
        .ok_or("pipe source is not registered")?;

    let target = RenderTarget::offscreen(&gpu.device, args.width, args.height);
    let frame_interval = Duration::from_secs_f64(1.0 / args.fps.max(1) as f64);
    let deadline = args.duration.map(|secs| Instant::now() + Duration::from_secs_f64(secs));

    source.activate();
    source.show();

    let mut last_tick = Instant::now();
    let mut last_report = Instant::now();
    let mut last_size = (0, 0);
    let mut renders: u64 = 0;

    while deadline.map_or(true, |d| Instant::now() < d) {
        let frame_start = Instant::now();
        let delta = frame_start.duration_since(last_tick).as_secs_f32();
        last_tick = frame_start;

        source.video_tick(delta);
        source.video_render(&target);
        renders += 1;

        let size = (source.width(), source.height());
        if size != last_size {
            tracing::info!("Source size changed to {}x{}", size.0, size.1);
            last_size = size;
        }

        if last_report.elapsed() >= Duration::from_secs(5) {
            let secs = last_report.elapsed().as_secs_f64();
            tracing::info!(
                "Rendering {}x{} at {:.1} fps",
                size.0,
                size.1,
                renders as f64 / secs
            );
            renders = 0;
            last_report = Instant::now();
        }

        if let Some(remaining) = frame_interval.checked_sub(frame_start.elapsed()) {
            thread::sleep(remaining);
        }
    }

    source.hide();
    source.deactivate();
    drop(source);
    module.unload();

    Ok(())
}
