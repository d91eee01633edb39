use slidecast::{
    AssetLoader, Canvas, CaptionSource, CaptionWord, Compositor, CompositorOpts, ExportSettings,
    FitPolicy, RenderState, Storyboard, Timeline,
};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let dir = std::env::temp_dir().join("slidecast_demo_frame");
    std::fs::create_dir_all(&dir)?;
    image::RgbaImage::from_pixel(640, 360, image::Rgba([180, 40, 40, 255]))
        .save(dir.join("one.png"))?;
    image::RgbaImage::from_pixel(360, 640, image::Rgba([40, 40, 180, 255]))
        .save(dir.join("two.png"))?;

    let board = Storyboard {
        audio: "voice.wav".to_string(),
        images: vec!["one.png".to_string(), "two.png".to_string()],
        watermark: None,
        fit: FitPolicy::Cover,
        captions: Some(CaptionSource::Inline(vec![
            CaptionWord {
                word: "hello".to_string(),
                start: 0.0,
                end: 4.0,
            },
            CaptionWord {
                word: "world".to_string(),
                start: 4.0,
                end: 8.0,
            },
        ])),
        canvas: Canvas {
            width: 540,
            height: 960,
        },
        export: ExportSettings::default(),
    };

    let assets = AssetLoader::new(&dir).load_current(&board)?;
    let words = board.load_captions(&dir)?;
    let timeline = Timeline {
        total_duration: 8.0,
        image_count: assets.images.len(),
    };
    let mut compositor = Compositor::new(
        CompositorOpts {
            fit: board.fit,
            ..Default::default()
        },
        slidecast::assets::decode::build_fontdb(None),
    );

    for (name, t) in [("first_half.png", 1.0), ("second_half.png", 6.0)] {
        let state = RenderState::at(t, timeline, &words);
        let frame = compositor.compose(&state, &assets, board.canvas)?;
        let out = dir.join(name);
        image::save_buffer_with_format(
            &out,
            &frame.data,
            frame.width,
            frame.height,
            image::ColorType::Rgba8,
            image::ImageFormat::Png,
        )?;
        println!("wrote {}", out.display());
    }
    Ok(())
}
