//! # Recording
//!
//! Applied messages can be written out as they happen and played back later into a fresh engine. The format is
//! JSON lines: one header object, then one message per line. A recording starts with the messages needed to
//! rebuild the canvas as it was when recording began, so it stands on its own.

use std::io::{BufRead, Write};

use paintengine_core::Message;

pub const FORMAT: &str = "paintengine-recording";
pub const VERSION: u32 = 1;

#[derive(thiserror::Error, Debug)]
pub enum RecorderError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("malformed recording: {0}")]
    Json(#[from] serde_json::Error),
    #[error("not a recording")]
    MissingHeader,
    #[error("unsupported recording {format} v{version}")]
    Unsupported { format: String, version: u32 },
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub format: String,
    pub version: u32,
    pub started_at: chrono::DateTime<chrono::offset::Utc>,
}

/// Somewhere to put the applied message stream.
pub trait Recorder: Send {
    fn record(&mut self, message: &Message) -> Result<(), RecorderError>;
    /// Flush and close. Called once, when recording stops.
    fn finish(self: Box<Self>) -> Result<(), RecorderError>;
}

pub struct JsonRecorder {
    path: std::path::PathBuf,
    writer: std::io::BufWriter<std::fs::File>,
    written: usize,
}
impl JsonRecorder {
    /// Create or truncate `path`, writing the header and `initial` messages.
    pub fn create(path: &std::path::Path, initial: &[Message]) -> Result<Self, RecorderError> {
        let file = std::fs::File::create(path)?;
        let mut this = Self {
            path: path.to_owned(),
            writer: std::io::BufWriter::new(file),
            written: 0,
        };
        let header = Header {
            format: FORMAT.to_owned(),
            version: VERSION,
            started_at: chrono::Utc::now(),
        };
        serde_json::to_writer(&mut this.writer, &header)?;
        this.writer.write_all(b"\n")?;
        for message in initial {
            this.record(message)?;
        }
        Ok(this)
    }
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}
impl Recorder for JsonRecorder {
    fn record(&mut self, message: &Message) -> Result<(), RecorderError> {
        serde_json::to_writer(&mut self.writer, message)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }
    fn finish(mut self: Box<Self>) -> Result<(), RecorderError> {
        self.writer.flush()?;
        log::info!(
            "recorded {} messages to {}",
            self.written,
            self.path.display()
        );
        Ok(())
    }
}

/// Read a recording's header and messages.
pub fn read_recording(path: &std::path::Path) -> Result<(Header, Vec<Message>), RecorderError> {
    let reader = std::io::BufReader::new(std::fs::File::open(path)?);
    let mut lines = reader.lines();
    let header: Header = match lines.next() {
        Some(line) => serde_json::from_str(&line?)?,
        None => return Err(RecorderError::MissingHeader),
    };
    if header.format != FORMAT || header.version > VERSION {
        return Err(RecorderError::Unsupported {
            format: header.format,
            version: header.version,
        });
    }
    let mut messages = Vec::new();
    for line in lines {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        messages.push(serde_json::from_str(&line)?);
    }
    Ok((header, messages))
}

#[cfg(test)]
mod test {
    use paintengine_core::{
        message::{CanvasMessage, InternalMessage},
        util::Size,
        Message,
    };

    use super::{read_recording, JsonRecorder, Recorder, RecorderError};

    fn temp(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("paintengine-{name}-{}.jsonl", std::process::id()))
    }

    #[test]
    fn written_then_read() {
        let path = temp("recorder");
        let initial = [Message::server(InternalMessage::LoadBlank {
            size: Size::new(10, 10),
            background: 0xFFFF_FFFF,
        })];
        let mut recorder = Box::new(JsonRecorder::create(&path, &initial).unwrap());
        let background = Message::new(1, CanvasMessage::Background { color: 0xFF00_00FF });
        recorder.record(&background).unwrap();
        recorder.finish().unwrap();

        let (header, messages) = read_recording(&path).unwrap();
        assert_eq!(header.format, super::FORMAT);
        assert_eq!(messages, vec![initial[0].clone(), background]);
        let _ = std::fs::remove_file(&path);
    }
    #[test]
    fn rejects_other_files() {
        let path = temp("not-a-recording");
        std::fs::write(&path, "").unwrap();
        assert!(matches!(read_recording(&path), Err(RecorderError::MissingHeader)));
        std::fs::write(
            &path,
            r#"{"format":"something-else","version":1,"started_at":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert!(matches!(
            read_recording(&path),
            Err(RecorderError::Unsupported { .. })
        ));
        let _ = std::fs::remove_file(&path);
    }
}
