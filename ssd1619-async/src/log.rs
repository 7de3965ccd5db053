//! Logging shims that forward to `defmt` and/or `log`, depending on the enabled features.
//!
//! With neither feature enabled the macros expand to nothing, but the arguments are still
//! type-checked so that logging-only variables don't trigger unused warnings.

macro_rules! debug {
    ($($arg:tt)*) => {
        #[cfg(feature = "defmt")]
        defmt::debug!($($arg)*);

        #[cfg(feature = "log")]
        log::debug!($($arg)*);

        #[cfg(not(any(feature = "defmt", feature = "log")))]
        {
            let _ = format_args!($($arg)*);
        }
    };
}

macro_rules! trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "defmt")]
        defmt::trace!($($arg)*);

        #[cfg(feature = "log")]
        log::trace!($($arg)*);

        #[cfg(not(any(feature = "defmt", feature = "log")))]
        {
            let _ = format_args!($($arg)*);
        }
    };
}

macro_rules! warn_log {
    ($($arg:tt)*) => {
        #[cfg(feature = "defmt")]
        defmt::warn!($($arg)*);

        #[cfg(feature = "log")]
        log::warn!($($arg)*);

        #[cfg(not(any(feature = "defmt", feature = "log")))]
        {
            let _ = format_args!($($arg)*);
        }
    };
}

pub(crate) use {debug, trace, warn_log};
