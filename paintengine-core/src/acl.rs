//! # Access control
//!
//! Permission state is itself part of the shared session: it changes only through ACL messages, in stream
//! order, so every replica makes the same decisions about every other message.
//!
//! The server user is exempt from all checks.

use bitvec::array::BitArray;
use strum::{EnumCount, IntoEnumIterator};

use crate::{
    id::{AnnotationId, LayerId, UserId, SERVER_USER},
    message::{
        AclMessage, AnnotationMessage, Apply, ApplyError, Body, CanvasMessage, DocumentMessage,
        DrawMessage, InternalMessage, LayerMessage, Message, TelemetryMessage, UndoMessage,
    },
    state::CanvasState,
};

/// A set of users.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct UserBits(BitArray<[u64; 4]>);
impl UserBits {
    #[must_use]
    pub fn from_users(users: &[UserId]) -> Self {
        let mut bits = Self::default();
        for user in users {
            bits.insert(*user);
        }
        bits
    }
    #[must_use]
    pub fn contains(&self, user: UserId) -> bool {
        self.0[usize::from(user)]
    }
    pub fn insert(&mut self, user: UserId) {
        self.0.set(usize::from(user), true);
    }
    pub fn remove(&mut self, user: UserId) {
        self.0.set(usize::from(user), false);
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.not_any()
    }
    pub fn iter(&self) -> impl Iterator<Item = UserId> + '_ {
        self.0.iter_ones().map(|idx| idx as UserId)
    }
    #[must_use]
    pub fn to_vec(&self) -> Vec<UserId> {
        self.iter().collect()
    }
}

/// Trust levels, most privileged first.
#[derive(
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Debug,
    Default,
    strum::AsRefStr,
    serde::Serialize,
    serde::Deserialize,
)]
pub enum Tier {
    Operator,
    Trusted,
    #[default]
    Guest,
}

#[derive(
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    Debug,
    strum::EnumCount,
    strum::EnumIter,
    strum::AsRefStr,
    serde::Serialize,
    serde::Deserialize,
)]
pub enum Feature {
    PutImage,
    Resize,
    Background,
    EditLayers,
    OwnLayers,
    CreateAnnotation,
    Laser,
    Undo,
    Metadata,
    Timeline,
}
impl Feature {
    #[must_use]
    pub fn default_tier(self) -> Tier {
        match self {
            Self::Resize | Self::Background | Self::EditLayers | Self::Metadata => Tier::Operator,
            Self::PutImage
            | Self::OwnLayers
            | Self::CreateAnnotation
            | Self::Laser
            | Self::Undo
            | Self::Timeline => Tier::Guest,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct LayerAcl {
    /// Nobody but operators may draw.
    pub locked: bool,
    /// Least trusted tier allowed to draw.
    pub tier: Tier,
    /// If not empty, only these users may draw.
    pub exclusive: UserBits,
}

bitflags::bitflags! {
    #[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
    pub struct AclChanges: u8 {
        const USERS = 1;
        const LAYERS = 1 << 1;
        const FEATURES = 1 << 2;
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AclState {
    pub operators: UserBits,
    pub trusted: UserBits,
    pub locked: UserBits,
    pub feature_tiers: [Tier; Feature::COUNT],
    pub layers: hashbrown::HashMap<LayerId, LayerAcl>,
}
impl Default for AclState {
    fn default() -> Self {
        let mut feature_tiers = [Tier::Guest; Feature::COUNT];
        for (tier, feature) in feature_tiers.iter_mut().zip(Feature::iter()) {
            *tier = feature.default_tier();
        }
        Self {
            operators: UserBits::default(),
            trusted: UserBits::default(),
            locked: UserBits::default(),
            feature_tiers,
            layers: hashbrown::HashMap::new(),
        }
    }
}
impl AclState {
    #[must_use]
    pub fn is_operator(&self, user: UserId) -> bool {
        user == SERVER_USER || self.operators.contains(user)
    }
    #[must_use]
    pub fn tier(&self, user: UserId) -> Tier {
        if self.is_operator(user) {
            Tier::Operator
        } else if self.trusted.contains(user) {
            Tier::Trusted
        } else {
            Tier::Guest
        }
    }
    #[must_use]
    pub fn feature_tier(&self, feature: Feature) -> Tier {
        self.feature_tiers[feature as usize]
    }
    #[must_use]
    pub fn can_use_feature(&self, feature: Feature, user: UserId) -> bool {
        self.tier(user) <= self.feature_tier(feature)
    }
}

impl Apply<AclMessage> for AclState {
    type Output = AclChanges;
    fn apply(&mut self, message: &AclMessage) -> Result<AclChanges, ApplyError> {
        let changes = match message {
            AclMessage::SessionOwner { users } => {
                self.operators = UserBits::from_users(users);
                AclChanges::USERS
            }
            AclMessage::TrustedUsers { users } => {
                self.trusted = UserBits::from_users(users);
                AclChanges::USERS
            }
            AclMessage::UserAcl { users } => {
                self.locked = UserBits::from_users(users);
                AclChanges::USERS
            }
            AclMessage::FeatureAccessLevels { tiers } => {
                if tiers.len() > Feature::COUNT {
                    return Err(ApplyError::InvalidValue("more tiers than features"));
                }
                self.feature_tiers[..tiers.len()].copy_from_slice(tiers);
                AclChanges::FEATURES
            }
            AclMessage::LayerAcl {
                id,
                locked,
                tier,
                exclusive,
            } => {
                let acl = LayerAcl {
                    locked: *locked,
                    tier: *tier,
                    exclusive: UserBits::from_users(exclusive),
                };
                if acl == LayerAcl::default() {
                    self.layers.remove(id);
                } else {
                    self.layers.insert(*id, acl);
                }
                AclChanges::LAYERS
            }
        };
        Ok(changes)
    }
}

/// Why a message was refused.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclDenied {
    #[error("only operators may do this")]
    NotOperator,
    #[error("internal messages may only come from the server")]
    Reserved,
    #[error("user is locked")]
    Locked,
    #[error("tier too low for {}", .0.as_ref())]
    Feature(Feature),
    #[error("{0} is locked")]
    LayerLocked(LayerId),
    #[error("{0} is reserved for other users")]
    LayerExclusive(LayerId),
    #[error("tier too low to draw on {0}")]
    LayerTier(LayerId),
    #[error("{0} is protected")]
    ProtectedAnnotation(AnnotationId),
    #[error("{0} is outside the user's namespace")]
    ForeignId(AnnotationId),
}

/// Decides which messages take effect, and keeps the permission state up to date.
#[derive(Clone, Debug, Default)]
pub struct AclFilter {
    state: AclState,
    changes: AclChanges,
}
impl AclFilter {
    #[must_use]
    pub fn state(&self) -> &AclState {
        &self.state
    }
    #[must_use]
    pub fn is_operator(&self, user: UserId) -> bool {
        self.state.is_operator(user)
    }
    #[must_use]
    pub fn can_use_feature(&self, feature: Feature, user: UserId) -> bool {
        self.state.can_use_feature(feature, user)
    }
    /// Permission changes since the last call.
    pub fn take_changes(&mut self) -> AclChanges {
        std::mem::take(&mut self.changes)
    }
    /// Whether `message` should take effect. See [`Self::filter`].
    pub fn evaluate(&mut self, message: &Message, canvas: &CanvasState) -> bool {
        self.filter(message, canvas).is_ok()
    }
    /// Check a message against the permission state, applying it if it is an ACL change.
    /// Denials are logged.
    pub fn filter(&mut self, message: &Message, canvas: &CanvasState) -> Result<(), AclDenied> {
        let result = self.check(message, canvas);
        match result {
            Ok(()) => self.absorb(message),
            Err(reason) => log::warn!(
                target: "paintengine::acl",
                "denied {} message from user {}: {reason}",
                message.kind(),
                message.user
            ),
        }
        result
    }
    fn absorb(&mut self, message: &Message) {
        match &message.body {
            Body::Acl(acl) => match self.state.apply(acl) {
                Ok(changes) => self.changes |= changes,
                Err(e) => log::warn!(target: "paintengine::acl", "bad acl message: {e}"),
            },
            Body::Internal(InternalMessage::Reset | InternalMessage::LoadBlank { .. }) => {
                if !self.state.layers.is_empty() {
                    self.state.layers.clear();
                    self.changes |= AclChanges::LAYERS;
                }
            }
            Body::Layer(LayerMessage::Delete { id, .. }) => {
                if self.state.layers.remove(id).is_some() {
                    self.changes |= AclChanges::LAYERS;
                }
            }
            _ => (),
        }
    }
    /// Check a message without changing anything.
    pub fn check(&self, message: &Message, canvas: &CanvasState) -> Result<(), AclDenied> {
        let user = message.user;
        if user == SERVER_USER {
            return Ok(());
        }
        let state = &self.state;
        let operator = state.is_operator(user);
        let feature = |feature: Feature| {
            if state.can_use_feature(feature, user) {
                Ok(())
            } else {
                Err(AclDenied::Feature(feature))
            }
        };
        if state.locked.contains(user) && message.is_undoable() {
            return Err(AclDenied::Locked);
        }
        match &message.body {
            Body::Internal(_) => Err(AclDenied::Reserved),
            Body::Acl(_) => {
                if operator {
                    Ok(())
                } else {
                    Err(AclDenied::NotOperator)
                }
            }
            Body::Undo(UndoMessage::UndoPoint) => Ok(()),
            Body::Undo(UndoMessage::Undo { override_user, .. }) => {
                if state.locked.contains(user) {
                    return Err(AclDenied::Locked);
                }
                if override_user.is_some_and(|other| other != user) && !operator {
                    return Err(AclDenied::NotOperator);
                }
                feature(Feature::Undo)
            }
            Body::Telemetry(TelemetryMessage::MovePointer { .. }) => Ok(()),
            Body::Telemetry(TelemetryMessage::LaserTrail { .. }) => feature(Feature::Laser),
            Body::Canvas(CanvasMessage::Resize { .. }) => feature(Feature::Resize),
            Body::Canvas(CanvasMessage::Background { .. }) => feature(Feature::Background),
            Body::Layer(layer) => {
                let own = layer.id().and_then(LayerId::owner) == Some(user);
                if own {
                    feature(Feature::OwnLayers).or_else(|_| feature(Feature::EditLayers))
                } else {
                    feature(Feature::EditLayers)
                }
            }
            Body::Draw(draw) => {
                if matches!(draw, DrawMessage::PutTile { .. } | DrawMessage::FillRect { .. }) {
                    feature(Feature::PutImage)?;
                }
                self.check_layer_access(draw.layer(), user)
            }
            Body::Annotation(annotation) => {
                let id = annotation.id();
                if let AnnotationMessage::Create { .. } = annotation {
                    feature(Feature::CreateAnnotation)?;
                    if id.owner() != user && !operator {
                        return Err(AclDenied::ForeignId(id));
                    }
                    return Ok(());
                }
                match canvas.annotations().get(id) {
                    Some(existing) if existing.protect && !operator && id.owner() != user => {
                        Err(AclDenied::ProtectedAnnotation(id))
                    }
                    _ => Ok(()),
                }
            }
            Body::Document(DocumentMessage::SetMetadata(_)) => feature(Feature::Metadata),
            Body::Document(_) => feature(Feature::Timeline),
        }
    }
    fn check_layer_access(&self, layer: LayerId, user: UserId) -> Result<(), AclDenied> {
        let Some(acl) = self.state.layers.get(&layer) else {
            return Ok(());
        };
        let operator = self.state.is_operator(user);
        if acl.locked && !operator {
            Err(AclDenied::LayerLocked(layer))
        } else if !acl.exclusive.is_empty() && !acl.exclusive.contains(user) {
            Err(AclDenied::LayerExclusive(layer))
        } else if self.state.tier(user) > acl.tier {
            Err(AclDenied::LayerTier(layer))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use super::{AclChanges, AclDenied, AclFilter, Feature, Tier};
    use crate::{
        blend::BlendMode,
        color::Pixel,
        id::{AnnotationId, LayerId},
        message::{AclMessage, AnnotationMessage, Apply, DrawMessage, Message},
        state::CanvasState,
        util::{Rect, Size},
    };

    fn canvas_with_protected(id: AnnotationId) -> CanvasState {
        let mut canvas = CanvasState::blank(Size::new(64, 64), Pixel::WHITE).unwrap();
        for message in [
            AnnotationMessage::Create {
                id,
                rect: Rect::new(0, 0, 10, 10),
            },
            AnnotationMessage::Edit {
                id,
                background: 0,
                protect: true,
                valign: Default::default(),
                text: String::new(),
            },
        ] {
            canvas.apply(&Message::new(id.owner(), message)).unwrap();
        }
        canvas
    }

    #[test]
    fn protected_annotations() {
        let id = AnnotationId::new(2, 0);
        let canvas = canvas_with_protected(id);
        let mut filter = AclFilter::default();
        let delete = |user| Message::new(user, AnnotationMessage::Delete { id });
        assert_eq!(
            filter.filter(&delete(5), &canvas),
            Err(AclDenied::ProtectedAnnotation(id))
        );
        assert!(filter.evaluate(&delete(2), &canvas));
        // Operators may touch anything.
        assert!(filter.evaluate(
            &Message::server(AclMessage::SessionOwner { users: vec![5] }),
            &canvas
        ));
        assert!(filter.evaluate(&delete(5), &canvas));
        assert_eq!(filter.take_changes(), AclChanges::USERS);
        assert_eq!(filter.take_changes(), AclChanges::empty());
    }
    #[test]
    fn acl_changes_need_operator() {
        let canvas = CanvasState::default();
        let mut filter = AclFilter::default();
        let promote = Message::new(3, AclMessage::SessionOwner { users: vec![3] });
        assert!(!filter.evaluate(&promote, &canvas));
        assert!(!filter.is_operator(3));
        assert!(filter.is_operator(0));
    }
    #[test]
    fn features_and_layers() {
        let canvas = CanvasState::blank(Size::new(64, 64), Pixel::WHITE).unwrap();
        let mut filter = AclFilter::default();
        assert!(!filter.can_use_feature(Feature::Resize, 4));
        assert!(filter.can_use_feature(Feature::Laser, 4));

        let layer = LayerId::new(1, 1);
        let draw = |user| {
            Message::new(
                user,
                DrawMessage::Dabs {
                    layer,
                    color: 0xFF00_0000,
                    blend: BlendMode::Normal,
                    dabs: vec![],
                },
            )
        };
        assert!(filter.check(&draw(4), &canvas).is_ok());
        filter.evaluate(
            &Message::server(AclMessage::LayerAcl {
                id: layer,
                locked: false,
                tier: Tier::Guest,
                exclusive: vec![7],
            }),
            &canvas,
        );
        assert_eq!(
            filter.check(&draw(4), &canvas),
            Err(AclDenied::LayerExclusive(layer))
        );
        assert!(filter.check(&draw(7), &canvas).is_ok());

        filter.evaluate(
            &Message::server(AclMessage::UserAcl { users: vec![7] }),
            &canvas,
        );
        assert_eq!(filter.check(&draw(7), &canvas), Err(AclDenied::Locked));
        assert_eq!(filter.take_changes(), AclChanges::USERS | AclChanges::LAYERS);
    }
}
