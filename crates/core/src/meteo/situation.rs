//! Weather situation records and discrete stability classes.

use serde::{Deserialize, Serialize};

/// Discrete atmospheric stability classes (Klug/Manier scheme, 1..=7).
///
/// Class 1 is very unstable (strong convection), 4 is neutral, 7 is very
/// stable (nocturnal inversion). The per-class factors below parameterize
/// boundary-layer scaling for the dispersion kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StabilityClass {
    VeryUnstable,
    Unstable,
    SlightlyUnstable,
    Neutral,
    SlightlyStable,
    Stable,
    VeryStable,
}

impl StabilityClass {
    /// Map from the conventional 1..=7 class number.
    #[must_use]
    pub fn from_class(class: u8) -> Option<Self> {
        match class {
            1 => Some(Self::VeryUnstable),
            2 => Some(Self::Unstable),
            3 => Some(Self::SlightlyUnstable),
            4 => Some(Self::Neutral),
            5 => Some(Self::SlightlyStable),
            6 => Some(Self::Stable),
            7 => Some(Self::VeryStable),
            _ => None,
        }
    }

    /// Conventional 1..=7 class number.
    #[must_use]
    pub fn as_class(self) -> u8 {
        match self {
            Self::VeryUnstable => 1,
            Self::Unstable => 2,
            Self::SlightlyUnstable => 3,
            Self::Neutral => 4,
            Self::SlightlyStable => 5,
            Self::Stable => 6,
            Self::VeryStable => 7,
        }
    }

    /// Inverse Obukhov length 1/L (1/m). Negative = unstable, 0 = neutral.
    #[must_use]
    pub fn inverse_obukhov(self) -> f32 {
        match self {
            Self::VeryUnstable => -0.02,
            Self::Unstable => -0.012,
            Self::SlightlyUnstable => -0.005,
            Self::Neutral => 0.0,
            Self::SlightlyStable => 0.005,
            Self::Stable => 0.015,
            Self::VeryStable => 0.035,
        }
    }

    /// Default mixing height (m) when the situation record carries none.
    #[must_use]
    pub fn default_mixing_height(self) -> f32 {
        match self {
            Self::VeryUnstable => 1800.0,
            Self::Unstable => 1400.0,
            Self::SlightlyUnstable => 1100.0,
            Self::Neutral => 800.0,
            Self::SlightlyStable => 400.0,
            Self::Stable => 250.0,
            Self::VeryStable => 150.0,
        }
    }

    /// Power-law wind profile exponent for the class.
    #[must_use]
    pub fn profile_exponent(self) -> f32 {
        match self {
            Self::VeryUnstable => 0.08,
            Self::Unstable => 0.10,
            Self::SlightlyUnstable => 0.13,
            Self::Neutral => 0.17,
            Self::SlightlyStable => 0.24,
            Self::Stable => 0.32,
            Self::VeryStable => 0.42,
        }
    }

    /// Scaling of the vertical velocity fluctuation relative to the
    /// friction velocity. Suppressed mixing in stable classes.
    #[must_use]
    pub fn sigma_w_factor(self) -> f32 {
        match self {
            Self::VeryUnstable => 1.7,
            Self::Unstable => 1.5,
            Self::SlightlyUnstable => 1.4,
            Self::Neutral => 1.3,
            Self::SlightlyStable => 1.1,
            Self::Stable => 0.9,
            Self::VeryStable => 0.7,
        }
    }
}

/// Calendar position of a transient series entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesTimestamp {
    pub day: u8,
    pub month: u8,
    pub hour: u8,
}

/// One discretized meteorological state for which a wind field and a
/// dispersion pass are computed. Immutable once produced by a situation
/// source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSituation {
    /// 1-based position in the processed sequence.
    pub index: u32,
    /// Resolved wind-class id: the matched reference-table row in transient
    /// mode, the frequency-table row in stationary mode. Keys precomputed
    /// wind fields.
    pub class_id: u32,
    /// Present only for transient series entries.
    pub timestamp: Option<SeriesTimestamp>,
    /// Wind speed at anemometer height (m/s).
    pub wind_speed: f32,
    /// Meteorological wind direction (degrees the wind blows FROM).
    pub wind_direction: f32,
    pub stability: StabilityClass,
    /// Mixing height override (m); derived from the stability class when
    /// absent.
    pub mixing_height: Option<f32>,
    /// Precipitation intensity (mm/h), drives wet scavenging.
    pub precipitation: f32,
}

impl WeatherSituation {
    /// Effective mixing height for the dispersion pass.
    #[must_use]
    pub fn effective_mixing_height(&self) -> f32 {
        match self.mixing_height {
            Some(h) if h > 0.0 => h,
            _ => self.stability.default_mixing_height(),
        }
    }
}
