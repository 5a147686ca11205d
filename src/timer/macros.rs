/// Declares a static global `SpitfpMaster` protected by a `critical_section` mutex.
///
/// This macro creates a `static` singleton suitable for use in interrupt-based environments,
/// where both the main loop and an ISR need to reach the link.
///
/// # Arguments
/// - `$name`: name of the static
/// - `$spi`: the concrete type of the bus (must implement `SpiBus<u8>` and `SetBaudrate`)
///
/// # Example
/// ```rust,ignore
/// init_spitfp_master!(pub MASTER, MySpi);
/// ```
#[macro_export]
macro_rules! init_spitfp_master {
    ( $vis:vis $name:ident, $spi:ty ) => {
        $vis static $name: $crate::timer::GlobalMaster<$spi> = $crate::timer::global_master_init();
    };
}

/// Puts a new master into a global declared with `init_spitfp_master!`.
///
/// # Arguments
/// - `$name`: the global
/// - `$spi`: the bus
/// - `$config`: optional `SpitfpConfig`, the defaults otherwise
///
/// # Example
/// ```rust,ignore
/// fn main() {
///     setup_spitfp_master!(MASTER, spi);
/// }
/// ```
#[macro_export]
macro_rules! setup_spitfp_master {
    ( $name:ident, $spi:expr ) => {
        $crate::setup_spitfp_master!($name, $spi, $crate::master::SpitfpConfig::default())
    };
    ( $name:ident, $spi:expr, $config:expr ) => {
        $crate::timer::global_master_setup(&$name, $spi, $config)
    };
}

/// Calls `tick()` on a global master if it has been set up.
///
/// Evaluates to `None` before `setup_spitfp_master!`, to the tick's result afterwards.
///
/// # Example
/// ```rust,ignore
/// #[interrupt]
/// fn TIM2() {
///     let _ = tick_spitfp_master!(MASTER, millis());
/// }
/// ```
#[macro_export]
macro_rules! tick_spitfp_master {
    ( $name:ident, $now:expr ) => {
        $crate::timer::global_master_tick(&$name, $now)
    };
}

#[cfg(test)]
mod tests {
    use crate::master::SpitfpConfig;
    use crate::testing::ScriptedPeer;

    init_spitfp_master!(MASTER, ScriptedPeer);
    init_spitfp_master!(FIXED_RATE_MASTER, ScriptedPeer);

    #[test]
    fn test_macros_drive_global_master() {
        assert!(tick_spitfp_master!(MASTER, 0).is_none());
        setup_spitfp_master!(MASTER, ScriptedPeer::default());
        assert_eq!(tick_spitfp_master!(MASTER, 0), Some(Ok(())));
        assert_eq!(tick_spitfp_master!(MASTER, 1), Some(Ok(())));

        let written = crate::timer::global_master_with(&MASTER, |m| m.bus().written.len());
        assert_eq!(written, Some(64));
    }

    #[test]
    fn test_setup_with_config() {
        let config = SpitfpConfig {
            baudrate: 600_000,
            enable_dynamic_baudrate: false,
            ..Default::default()
        };
        setup_spitfp_master!(FIXED_RATE_MASTER, ScriptedPeer::default(), config);
        assert_eq!(tick_spitfp_master!(FIXED_RATE_MASTER, 0), Some(Ok(())));
        let rates = crate::timer::global_master_with(&FIXED_RATE_MASTER, |m| m.bus().baudrates.clone());
        assert_eq!(rates, Some(vec![600_000]));
    }
}
