use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use slidecast::assets::{decode, media};
use slidecast::scene::storyboard::normalize_rel_path;
use slidecast::{
    AssetLoader, CodecChoice, Compositor, CompositorOpts, EncoderCaps, ExportOpts, Exporter,
    RenderState, Storyboard, Timeline,
};

#[derive(Parser, Debug)]
#[command(name = "slidecast", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compose a single frame as a PNG.
    Frame(FrameArgs),
    /// Export the full show to a video (requires `ffmpeg` on PATH).
    Export(ExportArgs),
    /// Print a storyboard summary without rendering.
    Probe(ProbeArgs),
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Input storyboard JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Playback time in seconds.
    #[arg(long, default_value_t = 0.0)]
    at: f64,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct ExportArgs {
    /// Input storyboard JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output directory; the file is named `slideshow.<ext>` by container.
    /// Defaults to the storyboard's directory.
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Overwrite output if it already exists.
    #[arg(long, default_value_t = true)]
    overwrite: bool,
}

#[derive(Parser, Debug)]
struct ProbeArgs {
    /// Storyboard JSON to summarize; without it only encoder support is probed.
    #[arg(long = "in")]
    in_path: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Frame(args) => cmd_frame(args),
        Command::Export(args) => cmd_export(args),
        Command::Probe(args) => cmd_probe(args),
    }
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let board = Storyboard::from_path(&args.in_path)?;
    let root = args.in_path.parent().unwrap_or_else(|| Path::new("."));

    let audio_path = root.join(normalize_rel_path(&board.audio)?);
    let duration = media::probe_audio_duration(&audio_path)?;
    let words = board.load_captions(root)?;
    let assets = AssetLoader::new(root).load_current(&board)?;
    let timeline = Timeline {
        total_duration: duration,
        image_count: assets.images.len(),
    };

    let mut compositor = Compositor::new(
        CompositorOpts {
            fit: board.fit,
            ..Default::default()
        },
        decode::build_fontdb(Some(root)),
    );
    let state = RenderState::at(args.at, timeline, &words);
    let frame = compositor.compose(&state, &assets, board.canvas)?;

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }

    image::save_buffer_with_format(
        &args.out,
        &frame.data,
        frame.width,
        frame.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_export(args: ExportArgs) -> anyhow::Result<()> {
    let board = Storyboard::from_path(&args.in_path)?;
    let root = args.in_path.parent().unwrap_or_else(|| Path::new("."));

    let out_dir = args.out_dir.unwrap_or_else(|| root.to_path_buf());
    let mut opts = ExportOpts::new(out_dir);
    opts.overwrite = args.overwrite;
    let stats = Exporter::new().export(&board, root, &opts)?;

    eprintln!(
        "wrote {} ({} frames, {:.2}s)",
        stats.out_path.display(),
        stats.frames,
        stats.duration_secs
    );
    Ok(())
}

fn cmd_probe(args: ProbeArgs) -> anyhow::Result<()> {
    if let Some(in_path) = &args.in_path {
        let board = Storyboard::from_path(in_path)?;
        let root = in_path.parent().unwrap_or_else(|| Path::new("."));

        let audio_path = root.join(normalize_rel_path(&board.audio)?);
        let duration = media::probe_audio_duration(&audio_path)?;
        let words = board.load_captions(root)?;

        println!("audio:    {} ({duration:.2}s)", board.audio);
        println!(
            "images:   {} ({:.2}s per slide)",
            board.images.len(),
            duration / board.images.len() as f64
        );
        println!("captions: {} words", words.len());
        println!(
            "surfaces: {}x{} preview, {}x{} @ {} fps export",
            board.canvas.width,
            board.canvas.height,
            board.export.width,
            board.export.height,
            board.export.fps
        );
    }
    match EncoderCaps::probe().and_then(CodecChoice::negotiate) {
        Ok(choice) => {
            let pair = match choice {
                CodecChoice::Mp4H264Aac => "libx264+aac",
                CodecChoice::WebmVp9Opus => "libvpx-vp9+libopus",
            };
            println!("encoder:  {pair} -> slideshow.{}", choice.container_ext());
        }
        Err(e) => println!("encoder:  unavailable ({e})"),
    }
    Ok(())
}
