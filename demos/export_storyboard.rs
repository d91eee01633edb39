use slidecast::{
    Canvas, CaptionSource, CaptionWord, ExportOpts, ExportSettings, Exporter, FitPolicy,
    Storyboard,
};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    if !slidecast::encode::ffmpeg::is_ffmpeg_on_path() {
        eprintln!("ffmpeg not found on PATH; skipping export demo");
        return Ok(());
    }

    let dir = std::env::temp_dir().join("slidecast_demo_export");
    std::fs::create_dir_all(&dir)?;
    image::RgbaImage::from_pixel(640, 360, image::Rgba([200, 80, 30, 255]))
        .save(dir.join("one.png"))?;
    image::RgbaImage::from_pixel(360, 640, image::Rgba([30, 80, 200, 255]))
        .save(dir.join("two.png"))?;

    // Synthesize a two-second narration tone so the demo is self-contained.
    let status = std::process::Command::new("ffmpeg")
        .args(["-y", "-v", "error", "-f", "lavfi", "-i"])
        .arg("sine=frequency=440:duration=2")
        .arg(dir.join("voice.wav"))
        .status()?;
    anyhow::ensure!(status.success(), "could not synthesize demo narration");

    let board = Storyboard {
        audio: "voice.wav".to_string(),
        images: vec!["one.png".to_string(), "two.png".to_string()],
        watermark: None,
        fit: FitPolicy::Cover,
        captions: Some(CaptionSource::Inline(vec![
            CaptionWord {
                word: "first".to_string(),
                start: 0.0,
                end: 1.0,
            },
            CaptionWord {
                word: "second".to_string(),
                start: 1.0,
                end: 2.0,
            },
        ])),
        canvas: Canvas {
            width: 540,
            height: 960,
        },
        export: ExportSettings {
            width: 540,
            height: 960,
            fps: 30,
        },
    };

    let stats = Exporter::new().export(&board, &dir, &ExportOpts::new(&dir))?;
    println!(
        "wrote {} ({} frames, {:.2}s)",
        stats.out_path.display(),
        stats.frames,
        stats.duration_secs
    );
    Ok(())
}
