#![warn(clippy::pedantic)]
//! Headless demo: two simulated users draw on a shared canvas, the result is written out as a PNG.
//!
//! Usage: `paintengine [OUTPUT.png] [RECORDING.jsonl]`. If a recording path is given, the session is recorded,
//! then replayed into a second engine to check both end up identical.

use anyhow::Result as AnyResult;
use paintengine::{EngineConfig, EngineEvent, PaintEngine};
use paintengine_core::{
    blend::BlendMode,
    color::Color,
    image::Image,
    layer::Dab,
    message::{AnnotationMessage, DrawMessage, LayerMessage, UndoMessage},
    util::{Rect, Size},
    LayerId, Message, UserId,
};

#[cfg(feature = "dhat_heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

#[cfg(all(
    feature = "jemallocator",
    not(feature = "dhat_heap"),
    not(target_env = "msvc")
))]
#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

const CANVAS: Size = Size::new(800, 600);

fn stroke(user: UserId, layer: LayerId, color: u32, phase: f32) -> Vec<Message> {
    let dabs = (0..160)
        .map(|i| {
            let t = i as f32 / 160.0;
            Dab {
                x: 40 + (t * 720.0) as i32,
                y: 300 + ((t * 12.0 + phase).sin() * 180.0) as i32,
                diameter: 24,
                hardness: 160,
                opacity: 220,
            }
        })
        .collect();
    vec![
        Message::new(user, UndoMessage::UndoPoint),
        Message::new(
            user,
            DrawMessage::Dabs {
                layer,
                color,
                blend: BlendMode::Normal,
                dabs,
            },
        ),
    ]
}

fn session(engine: &PaintEngine) -> Vec<Message> {
    let mut messages = stroke(1, LayerId::new(1, 1), 0xFF20_40C0, 0.0);
    let layer = LayerId::new(2, 1);
    messages.extend([
        Message::new(2, UndoMessage::UndoPoint),
        Message::new(
            2,
            LayerMessage::Create {
                id: layer,
                source: None,
                fill: 0,
                title: "Shading".into(),
            },
        ),
        Message::new(
            2,
            DrawMessage::FillRect {
                layer,
                blend: BlendMode::Multiply,
                color: 0xFFFF_C080,
                rect: Rect::new(200, 150, 400, 300),
            },
        ),
        Message::new(
            2,
            AnnotationMessage::Create {
                id: engine.find_available_annotation_id(2),
                rect: Rect::new(20, 20, 200, 40),
            },
        ),
    ]);
    // A mistake, undone right away.
    messages.extend(stroke(1, LayerId::new(1, 1), 0xFFFF_0000, 1.5));
    messages.push(Message::new(
        1,
        UndoMessage::Undo {
            override_user: None,
            redo: false,
        },
    ));
    messages
}

fn write_png(path: &std::path::Path, image: &Image) -> AnyResult<()> {
    let file = std::io::BufWriter::new(std::fs::File::create(path)?);
    let mut encoder = png::Encoder::new(file, image.width(), image.height());
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&image.to_straight_rgba8())?;
    Ok(())
}

fn main() -> AnyResult<()> {
    let has_term = std::io::IsTerminal::is_terminal(&std::io::stdin());
    // Log to a terminal, if available. Else, log to "log.out" in the working directory.
    if has_term {
        env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        let _ = simple_logging::log_to_file("log.out", log::LevelFilter::Debug);
    }
    #[cfg(feature = "dhat_heap")]
    let _profiler = {
        log::trace!("Installed dhat");
        dhat::Profiler::new_heap()
    };

    let mut args = std::env::args_os().skip(1).map(std::path::PathBuf::from);
    let output = args.next().unwrap_or_else(|| "canvas.png".into());
    let recording = args.next();

    let config = EngineConfig::from_preferences();
    match config.save() {
        Ok(path) => log::debug!("engine config at {}", path.display()),
        Err(e) => log::warn!("couldn't save engine config: {e}"),
    }
    let engine = PaintEngine::new(config)?;
    let events = engine.subscribe();
    engine.add_sink(|event: &EngineEvent| match event {
        EngineEvent::MessageRejected {
            user,
            message,
            reason,
        } => log::warn!("user {user}'s {message} message rejected: {reason}"),
        EngineEvent::AreaChanged(area) => log::trace!("changed: {area:?}"),
        other => log::debug!("{}", other.kind()),
    });
    engine.start()?;

    engine.enqueue_load_blank(CANVAS, Color::WHITE);
    if let Some(path) = &recording {
        engine.start_recording(path)?;
    }
    engine.receive_messages(false, session(&engine));
    // Marks the end of the batch.
    engine.enqueue_catchup_progress(100);
    loop {
        match events.recv_timeout(std::time::Duration::from_secs(10)) {
            Ok(EngineEvent::CaughtUpTo(100)) => break,
            Ok(_) => (),
            Err(e) => anyhow::bail!("engine stalled: {e}"),
        }
    }
    engine.stop();
    engine.stop_recording();

    let image = engine.pixmap().to_image()?;
    write_png(&output, &image)?;
    log::info!(
        "wrote {}x{} canvas with {} layers to {}",
        image.width(),
        image.height(),
        engine.layers().len(),
        output.display()
    );

    if let Some(path) = &recording {
        let (header, messages) = paintengine::recorder::read_recording(path)?;
        let replay = PaintEngine::new(EngineConfig::default())?;
        replay.receive_messages(false, messages);
        replay.tick();
        let area = Rect::from_size(CANVAS);
        let same = replay.get_layer_image(LayerId::FLATTENED, area)
            == engine.get_layer_image(LayerId::FLATTENED, area);
        log::info!(
            "replayed recording from {}: {}",
            header.started_at,
            if same { "identical" } else { "DIFFERENT" }
        );
        if !same {
            anyhow::bail!("replay diverged from the live session");
        }
    }
    Ok(())
}
