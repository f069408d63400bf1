//! Document-wide metadata.

use crate::message::ApplyError;

#[derive(Clone, PartialEq, Debug, serde::Serialize, serde::Deserialize)]
pub struct DocumentMetadata {
    pub title: String,
    pub dpix: u32,
    pub dpiy: u32,
    pub framerate: u32,
    /// Use the explicit timeline for frames, rather than treating each layer as a frame.
    pub use_timeline: bool,
}
impl Default for DocumentMetadata {
    fn default() -> Self {
        Self {
            title: String::new(),
            dpix: 72,
            dpiy: 72,
            framerate: 24,
            use_timeline: false,
        }
    }
}
impl DocumentMetadata {
    /// Set a field. Returns whether the value changed.
    pub fn set(&mut self, field: &MetadataField) -> Result<bool, ApplyError> {
        let changed = match field {
            MetadataField::Title(title) => {
                let changed = self.title != *title;
                self.title.clone_from(title);
                changed
            }
            MetadataField::Dpi { x, y } => {
                if *x == 0 || *y == 0 {
                    return Err(ApplyError::InvalidValue("dpi must be positive"));
                }
                let changed = (self.dpix, self.dpiy) != (*x, *y);
                (self.dpix, self.dpiy) = (*x, *y);
                changed
            }
            MetadataField::Framerate(rate) => {
                if *rate == 0 {
                    return Err(ApplyError::InvalidValue("framerate must be positive"));
                }
                std::mem::replace(&mut self.framerate, *rate) != *rate
            }
            MetadataField::UseTimeline(use_timeline) => {
                std::mem::replace(&mut self.use_timeline, *use_timeline) != *use_timeline
            }
        };
        Ok(changed)
    }
    /// Every field, as messages that would recreate this metadata.
    #[must_use]
    pub fn fields(&self) -> [MetadataField; 4] {
        [
            MetadataField::Title(self.title.clone()),
            MetadataField::Dpi {
                x: self.dpix,
                y: self.dpiy,
            },
            MetadataField::Framerate(self.framerate),
            MetadataField::UseTimeline(self.use_timeline),
        ]
    }
}

#[derive(Clone, PartialEq, Eq, Debug, serde::Serialize, serde::Deserialize)]
pub enum MetadataField {
    Title(String),
    Dpi { x: u32, y: u32 },
    Framerate(u32),
    UseTimeline(bool),
}

#[cfg(test)]
mod test {
    use super::{DocumentMetadata, MetadataField};

    #[test]
    fn set_reports_change() {
        let mut meta = DocumentMetadata::default();
        assert_eq!(meta.set(&MetadataField::Framerate(24)), Ok(false));
        assert_eq!(meta.set(&MetadataField::Framerate(12)), Ok(true));
        assert!(meta.set(&MetadataField::Dpi { x: 0, y: 10 }).is_err());
        assert_eq!(meta.dpix, 72);

        let mut rebuilt = DocumentMetadata::default();
        for field in meta.fields() {
            rebuilt.set(&field).unwrap();
        }
        assert_eq!(rebuilt, meta);
    }
}
