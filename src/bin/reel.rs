use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use reel::persist::project::{load_project, load_project_dict, save_project};
use reel::render::content::SolidShape;
use reel::{
    AutomationTarget, AutomationValue, CancellationToken, Clip, ContentRegistry, FrameSpan,
    RenderManager, RenderRequest, RenderSettings, RenderThreading, Rgba8, SolidColorContent,
    Timeline, TimelineSettings, Track, Vec2,
};

#[derive(Parser, Debug)]
#[command(name = "reel", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a small demo project.
    Demo(DemoArgs),
    /// Render a single frame of a project as a PNG.
    Frame(FrameArgs),
    /// Print a project file as JSON.
    Dump(DumpArgs),
}

#[derive(Parser, Debug)]
struct DemoArgs {
    /// Output project path.
    #[arg(long)]
    out: PathBuf,

    #[arg(long, default_value_t = 640)]
    width: u32,

    #[arg(long, default_value_t = 360)]
    height: u32,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Input project file.
    #[arg(long)]
    project: PathBuf,

    /// Frame index (0-based).
    #[arg(long)]
    frame: i64,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Render tracks on a rayon pool.
    #[arg(long, default_value_t = false)]
    parallel: bool,

    /// Override rayon worker threads (parallel mode only).
    #[arg(long)]
    threads: Option<usize>,
}

#[derive(Parser, Debug)]
struct DumpArgs {
    /// Input project file.
    #[arg(long)]
    project: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Demo(args) => cmd_demo(args),
        Command::Frame(args) => cmd_frame(args),
        Command::Dump(args) => cmd_dump(args),
    }
}

fn cmd_demo(args: DemoArgs) -> anyhow::Result<()> {
    let timeline = demo_timeline(args.width, args.height)?;
    create_parent(&args.out)?;
    save_project(&args.out, &timeline)
        .with_context(|| format!("write project '{}'", args.out.display()))?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn demo_timeline(width: u32, height: u32) -> anyhow::Result<Timeline> {
    let mut timeline = Timeline::new(TimelineSettings {
        resolution: (width, height),
        ..TimelineSettings::default()
    });
    let builtins = timeline.table().builtins().clone();

    let top = Track::new("Shapes");
    let top_id = top.id();
    let bottom = Track::new("Background");
    let bottom_id = bottom.id();
    timeline.add_track(top)?;
    timeline.add_track(bottom)?;

    timeline.add_clip(
        bottom_id,
        Clip::new(
            "backdrop",
            FrameSpan::new(0, 120),
            Box::new(SolidColorContent::new(Rgba8::opaque(24, 32, 64))),
        )?,
    )?;

    let side = f64::from(width.min(height)) / 3.0;
    let ball = Clip::new(
        "ball",
        FrameSpan::new(0, 120),
        Box::new(
            SolidColorContent::new(Rgba8::opaque(240, 96, 32))
                .with_size(Vec2::new(side, side))
                .with_shape(SolidShape::Ellipse),
        ),
    )?;
    let ball_id = ball.id();
    timeline.add_clip(top_id, ball)?;

    let target = AutomationTarget::Clip {
        track: top_id,
        clip: ball_id,
    };
    let travel = f64::from(width) - side;
    timeline.with_sequence(target, &builtins.clip.position, |s| {
        s.add_new_key_frame(0, AutomationValue::Vector2(Vec2::new(0.0, 0.0)))?;
        s.add_new_key_frame(119, AutomationValue::Vector2(Vec2::new(travel, 0.0)))?;
        Ok(())
    })?;
    timeline.with_sequence(target, &builtins.clip.opacity, |s| {
        s.add_new_key_frame(0, AutomationValue::Double(0.2))?;
        s.add_new_key_frame(60, AutomationValue::Double(1.0))?;
        Ok(())
    })?;
    Ok(timeline)
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let registry = ContentRegistry::with_builtins();
    let mut timeline = load_project(&args.project, &registry)
        .with_context(|| format!("read project '{}'", args.project.display()))?;
    timeline.set_playhead(args.frame)?;

    let manager = RenderManager::new(RenderSettings {
        threading: RenderThreading {
            parallel: args.parallel,
            threads: args.threads,
        },
        ..RenderSettings::default()
    })?;
    let (width, height) = timeline.resolution();
    let outcome = manager.render(
        &mut timeline,
        RenderRequest::new(width, height),
        &CancellationToken::new(),
    )?;
    let frame = outcome
        .frame()
        .map(Arc::clone)
        .context("render was cancelled")?;

    create_parent(&args.out)?;
    image::save_buffer_with_format(
        &args.out,
        &unpremultiply(&frame.data),
        frame.width,
        frame.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!(
        "wrote {} ({:.2} ms)",
        args.out.display(),
        manager.average_render_millis()
    );
    Ok(())
}

fn cmd_dump(args: DumpArgs) -> anyhow::Result<()> {
    let dict = load_project_dict(&args.project)
        .with_context(|| format!("read project '{}'", args.project.display()))?;
    println!("{}", dict.to_json_pretty()?);
    Ok(())
}

fn create_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    Ok(())
}

fn unpremultiply(data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    for px in out.chunks_exact_mut(4) {
        let a = u16::from(px[3]);
        if a == 0 || a == 255 {
            continue;
        }
        for c in &mut px[..3] {
            *c = ((u16::from(*c) * 255 + a / 2) / a).min(255) as u8;
        }
    }
    out
}
