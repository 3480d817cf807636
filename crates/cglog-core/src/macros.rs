/// `printf`-style INFO record through the default engine.
///
/// ```ignore
/// cglog_core::infof!("listening on {}", addr);
/// ```
#[macro_export]
macro_rules! infof {
    ($($arg:tt)+) => {
        $crate::infof(::std::format_args!($($arg)+))
    };
}

#[macro_export]
macro_rules! warningf {
    ($($arg:tt)+) => {
        $crate::warningf(::std::format_args!($($arg)+))
    };
}

#[macro_export]
macro_rules! errorf {
    ($($arg:tt)+) => {
        $crate::errorf(::std::format_args!($($arg)+))
    };
}

/// Logs, dumps stacks and exits with status 255.
#[macro_export]
macro_rules! fatalf {
    ($($arg:tt)+) => {
        $crate::fatalf(::std::format_args!($($arg)+))
    };
}

/// V-gated INFO record; the arguments are not evaluated when the gate is
/// closed.
///
/// ```ignore
/// cglog_core::vinfof!(2, "peer {} state {:?}", peer, state);
/// ```
#[macro_export]
macro_rules! vinfof {
    ($level:expr, $($arg:tt)+) => {{
        let verbose = $crate::v($level);
        if verbose.enabled() {
            verbose.infof(::std::format_args!($($arg)+));
        }
    }};
}
