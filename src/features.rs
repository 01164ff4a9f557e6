//! Capability Flags
//!
//! Static feature and mode reporting for the host's store negotiation.

use std::ops::BitOr;

// == Features ==
/// Combined feature flags reported by a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Features(u32);

impl Features {
    pub const SUPPORTS_MULTIPLE_IDENTIFIERS: Features = Features(1);
    pub const SUPPORTS_DATA_GUARANTEE: Features = Features(2);
    pub const SUPPORTS_NATIVE_TTL: Features = Features(4);
    pub const IS_SEARCHABLE: Features = Features(8);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Features) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Features {
    type Output = Features;

    fn bitor(self, rhs: Features) -> Features {
        Features(self.0 | rhs.0)
    }
}

// == Modes ==
/// Cache modes a store can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Application,
    Session,
    Request,
}

/// Features supported by the one-file store.
pub fn supported_features() -> Features {
    Features::SUPPORTS_DATA_GUARANTEE | Features::SUPPORTS_NATIVE_TTL | Features::IS_SEARCHABLE
}

/// Modes supported by the one-file store.
pub fn supported_modes() -> &'static [Mode] {
    &[Mode::Application]
}

pub fn is_supported_mode(mode: Mode) -> bool {
    supported_modes().contains(&mode)
}

/// Must agree with [`supported_features`].
pub fn supports_multiple_identifiers() -> bool {
    false
}

/// The store has no external requirements.
pub fn are_requirements_met() -> bool {
    true
}
