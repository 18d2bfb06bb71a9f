//! Named TTL presets.

use std::time::Duration;

/// TTL tier chosen by a call site based on how volatile its data is.
///
/// The orchestrator only cares about the resulting duration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CacheTier {
    /// Frequently changing data (feeds, presence). 30 seconds.
    #[default]
    Short,
    /// Listings and search results. 5 minutes.
    Medium,
    /// Profiles and settings. 30 minutes.
    Long,
    /// Reference data that rarely changes. 1 hour.
    VeryLong,
}

impl CacheTier {
    pub const fn duration(self) -> Duration {
        match self {
            Self::Short => Duration::from_secs(30),
            Self::Medium => Duration::from_secs(300),
            Self::Long => Duration::from_secs(1800),
            Self::VeryLong => Duration::from_secs(3600),
        }
    }

    /// Parse a tier name as used in configuration (`short`, `very_long`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().replace('-', "_").as_str() {
            "short" => Some(Self::Short),
            "medium" => Some(Self::Medium),
            "long" => Some(Self::Long),
            "very_long" | "verylong" => Some(Self::VeryLong),
            _ => None,
        }
    }
}

impl From<CacheTier> for Duration {
    fn from(tier: CacheTier) -> Self {
        tier.duration()
    }
}
