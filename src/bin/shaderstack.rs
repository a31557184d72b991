use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use shaderstack::{
    CpuBackend, FrameRGBA, PipelineError, PipelineOpts, ProgramLibrary, Rgba8Premul,
    ShaderPipeline, TargetShading,
};

#[derive(Parser, Debug)]
#[command(name = "shaderstack", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Composite a PNG through a shader stack with the CPU backend.
    Composite(CompositeArgs),
    /// Compile every program of a library and report failures.
    Check(CheckArgs),
}

#[derive(Parser, Debug)]
struct CompositeArgs {
    /// Program library manifest (JSON).
    #[arg(long)]
    library: PathBuf,

    /// Target shading (stack + overrides, JSON).
    #[arg(long)]
    stack: PathBuf,

    /// Input PNG.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Pipeline config (JSON). Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Texture for texture parameters, as `name=path.png`. Repeatable.
    #[arg(long = "texture", value_name = "NAME=PATH")]
    textures: Vec<String>,

    /// Viewport width fed to `ScreenSize` (defaults to the input width).
    #[arg(long)]
    width: Option<u32>,

    /// Viewport height fed to `ScreenSize` (defaults to the input height).
    #[arg(long)]
    height: Option<u32>,
}

#[derive(Parser, Debug)]
struct CheckArgs {
    /// Program library manifest (JSON).
    #[arg(long)]
    library: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Composite(args) => cmd_composite(args),
        Command::Check(args) => cmd_check(args),
    }
}

fn read_to_string(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("read '{}'", path.display()))
}

fn load_library(path: &Path) -> anyhow::Result<ProgramLibrary> {
    let json = read_to_string(path)?;
    ProgramLibrary::from_json_str(&json).with_context(|| format!("load library '{}'", path.display()))
}

fn load_png(path: &Path) -> anyhow::Result<FrameRGBA> {
    let img = image::open(path)
        .with_context(|| format!("open image '{}'", path.display()))?
        .to_rgba8();
    let (width, height) = img.dimensions();
    let data = img
        .into_raw()
        .chunks_exact(4)
        .flat_map(|s| Rgba8Premul::from_straight_rgba(s[0], s[1], s[2], s[3]).to_array())
        .collect();
    Ok(FrameRGBA {
        width,
        height,
        data,
        premultiplied: true,
    })
}

fn save_png(path: &Path, frame: &FrameRGBA) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }

    let straight: Vec<u8> = if frame.premultiplied {
        frame
            .data
            .chunks_exact(4)
            .flat_map(|px| {
                let a = u16::from(px[3]);
                let un = |c: u8| -> u8 {
                    if a == 0 {
                        0
                    } else {
                        ((u16::from(c) * 255 + a / 2) / a).min(255) as u8
                    }
                };
                [un(px[0]), un(px[1]), un(px[2]), px[3]]
            })
            .collect()
    } else {
        frame.data.clone()
    };

    image::save_buffer_with_format(
        path,
        &straight,
        frame.width,
        frame.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", path.display()))
}

fn cmd_composite(args: CompositeArgs) -> anyhow::Result<()> {
    let library = load_library(&args.library)?;
    let shading = TargetShading::from_json_str(&read_to_string(&args.stack)?)
        .with_context(|| format!("load stack '{}'", args.stack.display()))?;
    let opts = match &args.config {
        Some(path) => PipelineOpts::from_json_str(&read_to_string(path)?)
            .with_context(|| format!("load config '{}'", path.display()))?,
        None => PipelineOpts::default(),
    };
    let source = load_png(&args.in_path)?;

    let mut backend = CpuBackend::new(opts.cpu_backend());
    for spec in &args.textures {
        let (name, path) = spec
            .split_once('=')
            .with_context(|| format!("texture '{spec}' is not NAME=PATH"))?;
        backend.register_texture(name, &load_png(Path::new(path))?)?;
    }

    let mut pipeline = ShaderPipeline::new(library, opts)?;
    pipeline.set_viewport(
        args.width.unwrap_or(source.width),
        args.height.unwrap_or(source.height),
    )?;
    let target = shading.target().clone();
    pipeline.apply_target(shading)?;

    let frame = match pipeline.composite_target(&mut backend, &target, &source, None) {
        Ok(composite) => {
            tracing::info!(
                passes = composite.stats.passes_executed,
                skipped = composite.stats.slots_skipped,
                writes = composite.stats.parameter_writes,
                "composited"
            );
            composite.frame
        }
        Err(e @ PipelineError::ShaderResolution { .. }) => {
            tracing::warn!(error = %e, "stack did not resolve; writing the unshaded source");
            source
        }
        Err(e) => return Err(e.into()),
    };
    pipeline.end_frame()?;

    save_png(&args.out, &frame)?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_check(args: CheckArgs) -> anyhow::Result<()> {
    let library = load_library(&args.library)?;
    let ids = library.ids();
    let mut pipeline = ShaderPipeline::new(library, PipelineOpts::default())?;

    let mut failed = 0usize;
    for id in &ids {
        match pipeline.cache_mut().resolve(id) {
            Ok(program) => println!("ok    {id} ({} params)", program.schema().len()),
            Err(e) => {
                failed += 1;
                println!("error {id}: {e}");
            }
        }
    }
    if failed > 0 {
        anyhow::bail!("{failed} of {} programs failed to compile", ids.len());
    }
    Ok(())
}
