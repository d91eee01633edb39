use std::path::PathBuf;
use std::process::Command;

use slidecast::{
    Canvas, CaptionSource, CaptionWord, ExportSettings, FitPolicy, Storyboard,
};

fn ffmpeg_tools_available() -> bool {
    let ffmpeg_ok = Command::new("ffmpeg")
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false);
    let ffprobe_ok = Command::new("ffprobe")
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false);
    ffmpeg_ok && ffprobe_ok
}

fn bin_path() -> PathBuf {
    std::env::var_os("CARGO_BIN_EXE_slidecast")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let mut p = PathBuf::from("target").join("debug");
            p.push(if cfg!(windows) {
                "slidecast.exe"
            } else {
                "slidecast"
            });
            p
        })
}

fn seed_board(dir: &PathBuf) -> PathBuf {
    image::RgbaImage::from_pixel(64, 64, image::Rgba([220, 80, 40, 255]))
        .save(dir.join("slide.png"))
        .unwrap();
    let status = Command::new("ffmpeg")
        .args(["-v", "error", "-y", "-f", "lavfi", "-i"])
        .arg("sine=frequency=330:sample_rate=48000:duration=1")
        .args(["-c:a", "pcm_s16le"])
        .arg(dir.join("voice.wav"))
        .status()
        .unwrap();
    assert!(status.success());

    let board = Storyboard {
        audio: "voice.wav".to_string(),
        images: vec!["slide.png".to_string()],
        watermark: None,
        fit: FitPolicy::Cover,
        captions: Some(CaptionSource::Inline(vec![CaptionWord {
            word: "hi".to_string(),
            start: 0.0,
            end: 1.0,
        }])),
        canvas: Canvas {
            width: 64,
            height: 64,
        },
        export: ExportSettings {
            width: 64,
            height: 64,
            fps: 30,
        },
    };
    let board_path = dir.join("board.json");
    let f = std::fs::File::create(&board_path).unwrap();
    serde_json::to_writer_pretty(f, &board).unwrap();
    board_path
}

#[test]
fn cli_frame_writes_png() {
    if !ffmpeg_tools_available() {
        return;
    }
    let dir = PathBuf::from("target").join("cli_smoke");
    std::fs::create_dir_all(&dir).unwrap();
    let board_path = seed_board(&dir);
    let out_path = dir.join("frame.png");
    let _ = std::fs::remove_file(&out_path);

    let board_arg = board_path.to_string_lossy().to_string();
    let out_arg = out_path.to_string_lossy().to_string();

    let status = Command::new(bin_path())
        .args(["frame", "--in", board_arg.as_str(), "--at", "0.5", "--out"])
        .arg(out_arg.as_str())
        .status()
        .unwrap();

    assert!(status.success());
    assert!(out_path.exists());
    let img = image::open(&out_path).unwrap();
    assert_eq!((img.width(), img.height()), (64, 64));
}

#[test]
fn cli_probe_reports_the_board() {
    if !ffmpeg_tools_available() {
        return;
    }
    let dir = PathBuf::from("target").join("cli_probe");
    std::fs::create_dir_all(&dir).unwrap();
    let board_path = seed_board(&dir);

    let out = Command::new(bin_path())
        .args(["probe", "--in"])
        .arg(board_path.as_os_str())
        .output()
        .unwrap();

    assert!(out.status.success());
    let text = String::from_utf8_lossy(&out.stdout);
    assert!(text.contains("images"), "probe output: {text}");
}
