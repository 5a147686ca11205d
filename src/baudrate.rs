//! Line-rate selection for the isolated link.
//!
//! In fixed mode the configured rate is used as is. In dynamic mode the configured rate is
//! the ceiling and [`BaudrateNegotiator::evaluate`] moves the line rate between the floor and
//! that ceiling once per window:
//!
//! - any new error in the window, or a nearly idle line, lowers the rate by one step,
//! - a busy, error-free line doubles it.
//!
//! A new rate is only ever marked pending here; the master applies it between frames.

use crate::consts::{
    SPITFP_BAUDRATE_DEFAULT, SPITFP_BAUDRATE_MAX, SPITFP_BAUDRATE_MIN,
    SPITFP_DYNAMIC_BAUDRATE_INTERVAL_MS, SPITFP_DYNAMIC_BAUDRATE_STEP,
};

/// Clamps `baudrate` into the range the link supports.
pub const fn clamp_baudrate(baudrate: u32) -> u32 {
    if baudrate < SPITFP_BAUDRATE_MIN {
        SPITFP_BAUDRATE_MIN
    } else if baudrate > SPITFP_BAUDRATE_MAX {
        SPITFP_BAUDRATE_MAX
    } else {
        baudrate
    }
}

/// Dynamic baudrate settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct BaudrateConfig {
    /// Let the line rate follow error and utilisation observations.
    pub enable_dynamic: bool,
    /// Lowest rate dynamic mode may pick.
    pub minimum_dynamic: u32,
}

impl Default for BaudrateConfig {
    fn default() -> Self {
        Self {
            enable_dynamic: true,
            minimum_dynamic: SPITFP_BAUDRATE_MIN,
        }
    }
}

/// Tracks the configured, current and pending line rate.
#[derive(Debug, Clone)]
pub struct BaudrateNegotiator {
    baudrate: u32,
    current: u32,
    config: BaudrateConfig,
    pending: Option<u32>,
    window_start: Option<u32>,
    window_bytes: u32,
    window_error_base: u32,
}

impl Default for BaudrateNegotiator {
    fn default() -> Self {
        Self::new(SPITFP_BAUDRATE_DEFAULT, BaudrateConfig::default())
    }
}

impl BaudrateNegotiator {
    /// Creates a negotiator starting at `baudrate`. The starting rate is pending so that the
    /// bus gets configured on the first tick.
    pub fn new(baudrate: u32, config: BaudrateConfig) -> Self {
        let baudrate = clamp_baudrate(baudrate);
        Self {
            baudrate,
            current: baudrate,
            config: BaudrateConfig {
                enable_dynamic: config.enable_dynamic,
                minimum_dynamic: clamp_baudrate(config.minimum_dynamic),
            },
            pending: Some(baudrate),
            window_start: None,
            window_bytes: 0,
            window_error_base: 0,
        }
    }

    /// Sets the fixed rate, which is also the ceiling in dynamic mode.
    pub fn set_baudrate(&mut self, baudrate: u32) {
        self.baudrate = clamp_baudrate(baudrate);
        if !self.config.enable_dynamic || self.target() > self.baudrate {
            self.pending = Some(self.baudrate);
        }
    }

    /// The configured (clamped) rate.
    pub fn baudrate(&self) -> u32 {
        self.baudrate
    }

    /// Replaces the dynamic baudrate settings. Leaving dynamic mode returns to the fixed rate.
    pub fn set_config(&mut self, enable_dynamic: bool, minimum_dynamic: u32) {
        self.config = BaudrateConfig {
            enable_dynamic,
            minimum_dynamic: clamp_baudrate(minimum_dynamic),
        };
        if !enable_dynamic {
            self.pending = Some(self.baudrate);
        }
    }

    /// Current dynamic baudrate settings.
    pub fn config(&self) -> BaudrateConfig {
        self.config
    }

    /// Rate the bus is running at.
    pub fn current(&self) -> u32 {
        self.current
    }

    /// Rate waiting to be applied, if any.
    pub fn pending(&self) -> Option<u32> {
        self.pending
    }

    /// Hands out the pending rate and records it as current. The caller applies it to the bus.
    pub fn take_pending(&mut self) -> Option<u32> {
        let rate = self.pending.take()?;
        self.current = rate;
        Some(rate)
    }

    /// Adds framed bytes (both directions, filler excluded) to the current window.
    pub fn record_traffic(&mut self, bytes: usize) {
        let bytes = u32::try_from(bytes).unwrap_or(u32::MAX);
        self.window_bytes = self.window_bytes.saturating_add(bytes);
    }

    /// Closes the window once it is long enough and picks the next rate.
    ///
    /// The first call only opens a window at `now`. `error_total` is the running sum of all
    /// error counters. Returns the newly pending rate if it differs from the one in effect.
    pub fn evaluate(&mut self, now: u32, error_total: u32) -> Option<u32> {
        let Some(window_start) = self.window_start else {
            self.restart_window(now, error_total);
            return None;
        };
        let elapsed = now.wrapping_sub(window_start);
        if !self.config.enable_dynamic {
            self.restart_window(now, error_total);
            return None;
        }
        if elapsed < SPITFP_DYNAMIC_BAUDRATE_INTERVAL_MS {
            return None;
        }

        let rate = self.target();
        let new_errors = error_total.wrapping_sub(self.window_error_base) != 0;
        // Bytes the line could have carried in this window.
        let capacity = u64::from(rate) * u64::from(elapsed) / 8_000;
        let used = u64::from(self.window_bytes);
        self.restart_window(now, error_total);

        let floor = self.config.minimum_dynamic.min(self.baudrate);
        let next = if new_errors || used * 16 < capacity {
            rate.saturating_sub(SPITFP_DYNAMIC_BAUDRATE_STEP).max(floor)
        } else if used * 4 > capacity {
            rate.saturating_mul(2).min(self.baudrate)
        } else {
            rate
        };

        if next == rate {
            return None;
        }
        debug!(
            "spitfp: dynamic baudrate {} -> {} (errors: {})",
            rate,
            next,
            new_errors
        );
        self.pending = Some(next);
        Some(next)
    }

    fn target(&self) -> u32 {
        self.pending.unwrap_or(self.current)
    }

    fn restart_window(&mut self, now: u32, error_total: u32) {
        self.window_start = Some(now);
        self.window_bytes = 0;
        self.window_error_base = error_total;
    }
}
