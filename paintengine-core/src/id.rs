//! # IDs
//!
//! Everything in a shared document is named by an ID that every replica agrees on, so unlike process-local
//! handles these are plain numbers carried in messages. User-owned IDs are namespaced by the owner's
//! context ID in their high byte.

/// A participant's context ID. User 0 is the server, and internal messages are attributed to it.
pub type UserId = u8;

/// The reserved server/internal user.
pub const SERVER_USER: UserId = 0;

/// ID of a layer. Public layers have IDs in the 16-bit range (`owner << 8 | index`), internal layers
/// live above it.
#[derive(
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct LayerId(pub u32);
impl LayerId {
    /// Not a real layer. Where a layer is expected, it stands for the flattened canvas.
    pub const FLATTENED: Self = Self(0);
    #[must_use]
    pub const fn new(owner: UserId, index: u8) -> Self {
        Self((owner as u32) << 8 | index as u32)
    }
    #[must_use]
    pub fn is_internal(self) -> bool {
        self.0 > 0xFFFF
    }
    /// The user in whose namespace this layer was created, if it is a public layer.
    #[must_use]
    pub fn owner(self) -> Option<UserId> {
        (!self.is_internal()).then_some((self.0 >> 8) as UserId)
    }
}
impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Layer#{:#06x}", self.0)
    }
}
impl std::fmt::Debug for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Self as std::fmt::Display>::fmt(self, f)
    }
}

/// ID of an annotation. The high byte is the owner, the low byte a per-user sub-id.
///
/// [`AnnotationId::NONE`] is never a valid annotation, and is returned where allocation fails.
#[derive(
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct AnnotationId(pub u16);
impl AnnotationId {
    pub const NONE: Self = Self(0);
    #[must_use]
    pub const fn new(owner: UserId, sub_id: u8) -> Self {
        Self((owner as u16) << 8 | sub_id as u16)
    }
    #[must_use]
    pub fn owner(self) -> UserId {
        (self.0 >> 8) as UserId
    }
    #[must_use]
    pub fn sub_id(self) -> u8 {
        (self.0 & 0xFF) as u8
    }
    #[must_use]
    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}
impl std::fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Annotation#{:#06x}", self.0)
    }
}
impl std::fmt::Debug for AnnotationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Self as std::fmt::Display>::fmt(self, f)
    }
}

#[cfg(test)]
mod test {
    use super::{AnnotationId, LayerId};

    #[test]
    fn namespaces() {
        let layer = LayerId::new(3, 1);
        assert_eq!(layer.0, 0x0301);
        assert_eq!(layer.owner(), Some(3));
        assert_eq!(LayerId(0x1_0000).owner(), None);

        let annotation = AnnotationId::new(3, 0xFF);
        assert_eq!(annotation.owner(), 3);
        assert_eq!(annotation.sub_id(), 0xFF);
        assert_eq!(annotation.to_string(), "Annotation#0x03ff");
    }
}
