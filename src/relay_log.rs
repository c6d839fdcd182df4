use std::io::Write;

#[macro_export]
macro_rules! relay_debug {
    ($($arg:tt)*) => {
        if log::log_enabled!(log::Level::Debug) {
            log::debug!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! relay_info {
    ($($arg:tt)*) => {
        if log::log_enabled!(log::Level::Info) {
            log::info!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! relay_warn {
    ($($arg:tt)*) => {
        if log::log_enabled!(log::Level::Warn) {
            log::warn!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! relay_error {
    ($($arg:tt)*) => {
        if log::log_enabled!(log::Level::Error) {
            log::error!($($arg)*);
        }
    };
}

/// Installs the stderr logger used by the binary.
///
/// Every record becomes one line, `launch_relay: <message>`. The filter comes
/// from `RUST_LOG` and defaults to `warn`, so dial failures and fatal faults
/// are always visible.
pub fn init() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format(|buf, record| writeln!(buf, "{}: {}", env!("CARGO_PKG_NAME"), record.args()))
        .try_init();
}
