//! Semantic unit types for type-safe physical quantity handling
//!
//! Newtype wrappers for the quantities crossing the meteorological input
//! boundary, preventing accidental mixing of incompatible units (a wind
//! speed with a direction, a direction with a precipitation rate). The
//! physics kernels deref to raw f32 once at entry; these types live on the
//! configuration surface.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Deref, Mul, Sub};

macro_rules! unit_type {
    ($(#[$doc:meta])* $name:ident, $suffix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
        #[repr(transparent)]
        pub struct $name(f32);

        impl $name {
            /// Wrap a raw value.
            #[must_use]
            pub const fn new(value: f32) -> Self {
                Self(value)
            }

            /// Raw value accessor.
            #[inline]
            #[must_use]
            pub const fn value(self) -> f32 {
                self.0
            }
        }

        impl Deref for $name {
            type Target = f32;

            fn deref(&self) -> &f32 {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:.2} {}", self.0, $suffix)
            }
        }

        impl Add for $name {
            type Output = Self;

            fn add(self, rhs: Self) -> Self {
                Self(self.0 + rhs.0)
            }
        }

        impl AddAssign for $name {
            fn add_assign(&mut self, rhs: Self) {
                self.0 += rhs.0;
            }
        }

        impl Sub for $name {
            type Output = Self;

            fn sub(self, rhs: Self) -> Self {
                Self(self.0 - rhs.0)
            }
        }

        impl Mul<f32> for $name {
            type Output = Self;

            fn mul(self, rhs: f32) -> Self {
                Self(self.0 * rhs)
            }
        }
    };
}

unit_type!(
    /// Wind speed in metres per second.
    MetersPerSecond,
    "m/s"
);

unit_type!(
    /// Angle in degrees. For wind this is the meteorological convention:
    /// the direction the wind blows FROM, 0 = north, 90 = east.
    Degrees,
    "deg"
);

unit_type!(
    /// Precipitation intensity in millimetres per hour.
    MillimetersPerHour,
    "mm/h"
);

impl Degrees {
    /// Normalize into `[0, 360)`.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self(self.0.rem_euclid(360.0))
    }
}
