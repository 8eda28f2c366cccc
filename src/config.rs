//! Tunable parameters for spinlock acquisition.

/// Lower bound on the number of spins performed before sleeping.
///
/// This is not 1 because some hardware always fails the first test-and-set
/// after returning from kernel space; spinning exactly once per delay can
/// make a free lock look stuck there.
pub const MIN_SPINS_PER_DELAY: u32 = 10;

/// Upper bound on the number of spins performed before sleeping.
pub const MAX_SPINS_PER_DELAY: u32 = 1000;

/// Spins per delay used by a context that has not been seeded from a shared
/// estimate.
pub const DEFAULT_SPINS_PER_DELAY: u32 = 100;

/// Number of sleeps a waiter will take before declaring the lock stuck.
///
/// With the default delay range this works out to a couple of minutes of
/// waiting. The number of tries is fixed, rather than the total time, so the
/// probability of a spurious failure does not depend on timer resolution.
pub const NUM_DELAYS: u32 = 1000;

/// Shortest sleep, in milliseconds.
pub const MIN_DELAY_MS: u32 = 1;

/// Longest sleep, in milliseconds. Delays that would grow past this wrap back
/// around to [`MIN_DELAY_MS`].
pub const MAX_DELAY_MS: u32 = 1000;

/// Tunable parameters for a [`SpinContext`](crate::SpinContext).
///
/// # Examples
///
/// ```
/// use hyphae::Config;
///
/// let config = Config::DEFAULT
///     .with_num_delays(10)
///     .with_max_delay_ms(5)
///     .validate()
///     .expect("config is valid");
/// assert_eq!(config.num_delays, 10);
/// ```
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Config {
    /// Smallest value the spins-per-delay estimate may take.
    pub min_spins: u32,
    /// Largest value the spins-per-delay estimate may take.
    pub max_spins: u32,
    /// Starting spins-per-delay estimate for an unseeded context.
    pub initial_spins: u32,
    /// Sleeps taken before a lock is declared stuck.
    pub num_delays: u32,
    /// Shortest sleep, in milliseconds.
    pub min_delay_ms: u32,
    /// Longest sleep, in milliseconds.
    pub max_delay_ms: u32,
}

/// Errors returned by [`Config::validate`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// `min_spins` was zero.
    #[error("min_spins must be at least 1")]
    ZeroMinSpins,
    /// The spin bounds were inverted.
    #[error("min_spins ({min}) must not exceed max_spins ({max})")]
    SpinBounds {
        /// The configured minimum.
        min: u32,
        /// The configured maximum.
        max: u32,
    },
    /// `initial_spins` fell outside `min_spins..=max_spins`.
    #[error("initial_spins ({initial}) must be within {min}..={max}")]
    InitialSpins {
        /// The configured initial estimate.
        initial: u32,
        /// The configured minimum.
        min: u32,
        /// The configured maximum.
        max: u32,
    },
    /// `min_delay_ms` was zero.
    #[error("min_delay_ms must be at least 1")]
    ZeroMinDelay,
    /// The delay bounds were inverted.
    #[error("min_delay_ms ({min}) must not exceed max_delay_ms ({max})")]
    DelayBounds {
        /// The configured minimum.
        min: u32,
        /// The configured maximum.
        max: u32,
    },
}

// === impl Config ===

impl Config {
    /// The default tuning.
    pub const DEFAULT: Self = Self {
        min_spins: MIN_SPINS_PER_DELAY,
        max_spins: MAX_SPINS_PER_DELAY,
        initial_spins: DEFAULT_SPINS_PER_DELAY,
        num_delays: NUM_DELAYS,
        min_delay_ms: MIN_DELAY_MS,
        max_delay_ms: MAX_DELAY_MS,
    };

    /// Returns a new `Config` with the default tuning.
    #[must_use]
    pub const fn new() -> Self {
        Self::DEFAULT
    }

    /// Overrides [`Config::min_spins`].
    #[must_use]
    pub const fn with_min_spins(self, min_spins: u32) -> Self {
        Self { min_spins, ..self }
    }

    /// Overrides [`Config::max_spins`].
    #[must_use]
    pub const fn with_max_spins(self, max_spins: u32) -> Self {
        Self { max_spins, ..self }
    }

    /// Overrides [`Config::initial_spins`].
    #[must_use]
    pub const fn with_initial_spins(self, initial_spins: u32) -> Self {
        Self {
            initial_spins,
            ..self
        }
    }

    /// Overrides [`Config::num_delays`].
    #[must_use]
    pub const fn with_num_delays(self, num_delays: u32) -> Self {
        Self { num_delays, ..self }
    }

    /// Overrides [`Config::min_delay_ms`].
    #[must_use]
    pub const fn with_min_delay_ms(self, min_delay_ms: u32) -> Self {
        Self {
            min_delay_ms,
            ..self
        }
    }

    /// Overrides [`Config::max_delay_ms`].
    #[must_use]
    pub const fn with_max_delay_ms(self, max_delay_ms: u32) -> Self {
        Self {
            max_delay_ms,
            ..self
        }
    }

    /// Checks that the bounds in this `Config` are consistent, returning it
    /// unchanged if they are.
    pub const fn validate(self) -> Result<Self, ConfigError> {
        if self.min_spins == 0 {
            return Err(ConfigError::ZeroMinSpins);
        }

        if self.min_spins > self.max_spins {
            return Err(ConfigError::SpinBounds {
                min: self.min_spins,
                max: self.max_spins,
            });
        }

        if self.initial_spins < self.min_spins || self.initial_spins > self.max_spins {
            return Err(ConfigError::InitialSpins {
                initial: self.initial_spins,
                min: self.min_spins,
                max: self.max_spins,
            });
        }

        if self.min_delay_ms == 0 {
            return Err(ConfigError::ZeroMinDelay);
        }

        if self.min_delay_ms > self.max_delay_ms {
            return Err(ConfigError::DelayBounds {
                min: self.min_delay_ms,
                max: self.max_delay_ms,
            });
        }

        Ok(self)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert_eq!(Config::DEFAULT.validate(), Ok(Config::DEFAULT));
        assert_eq!(Config::default(), Config::new());
    }

    #[test]
    fn default_values() {
        let config = Config::DEFAULT;
        assert_eq!(config.min_spins, 10);
        assert_eq!(config.max_spins, 1000);
        assert_eq!(config.initial_spins, 100);
        assert_eq!(config.num_delays, 1000);
        assert_eq!(config.min_delay_ms, 1);
        assert_eq!(config.max_delay_ms, 1000);
    }

    #[test]
    fn rejects_inverted_bounds() {
        assert_eq!(
            Config::DEFAULT.with_min_spins(0).validate(),
            Err(ConfigError::ZeroMinSpins)
        );
        assert_eq!(
            Config::DEFAULT
                .with_min_spins(500)
                .with_max_spins(20)
                .validate(),
            Err(ConfigError::SpinBounds { min: 500, max: 20 })
        );
        assert_eq!(
            Config::DEFAULT.with_initial_spins(5).validate(),
            Err(ConfigError::InitialSpins {
                initial: 5,
                min: 10,
                max: 1000
            })
        );
        assert_eq!(
            Config::DEFAULT.with_min_delay_ms(0).validate(),
            Err(ConfigError::ZeroMinDelay)
        );
        assert_eq!(
            Config::DEFAULT.with_min_delay_ms(50).with_max_delay_ms(10).validate(),
            Err(ConfigError::DelayBounds { min: 50, max: 10 })
        );
    }

    #[test]
    fn zero_delays_is_allowed() {
        // A context that gives up the first time it would sleep.
        assert!(Config::DEFAULT.with_num_delays(0).validate().is_ok());
    }
}
