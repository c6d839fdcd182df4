//! Pre-bound listeners handed over by the service manager.
//!
//! Two hand-over protocols are understood:
//!
//! * systemd style `LISTEN_FDS` / `LISTEN_PID` / `LISTEN_FDNAMES`, on any unix;
//! * launchd `launch_activate_socket`, on macOS, when `LISTEN_FDS` is absent.
//!
//! Descriptors registered under another name are closed, and the ones
//! adopted are marked close-on-exec, so a supervised worker never inherits
//! any of them.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use crate::error::{ActivationError, RelayError};
use crate::transport::Listener;
use crate::{relay_debug, relay_info};

pub const LISTEN_FDS: &str = "LISTEN_FDS";
pub const LISTEN_PID: &str = "LISTEN_PID";
pub const LISTEN_FDNAMES: &str = "LISTEN_FDNAMES";

/// First descriptor passed by the systemd protocol.
pub const LISTEN_FDS_START: RawFd = 3;

/// Obtains the listeners registered under `socket_name`.
///
/// Must be called from inside a tokio runtime. An empty set is an error: a
/// relay with nothing to accept on has no reason to run.
pub fn obtain_listeners(socket_name: &str) -> Result<Vec<Listener>, RelayError> {
    let fds = activated_descriptors(socket_name)?;
    relay_debug!("Activation returned {} descriptor(s) for `{}'", fds.len(), socket_name);

    if fds.is_empty() {
        return Err(RelayError::NoListeners(socket_name.to_string()));
    }

    let listeners = fds
        .into_iter()
        .map(adopt)
        .collect::<Result<Vec<_>, _>>()?;

    for listener in &listeners {
        relay_info!("Activated listener {}", listener.describe());
    }
    Ok(listeners)
}

fn activated_descriptors(socket_name: &str) -> Result<Vec<OwnedFd>, ActivationError> {
    if std::env::var_os(LISTEN_FDS).is_some() {
        let passed = systemd_descriptors(
            |key| std::env::var(key).ok(),
            std::process::id(),
            socket_name,
            open_fd_limit(),
        )?;

        let mut selected = Vec::new();
        for PassedFd { fd, selected: keep } in passed {
            // SAFETY: the service manager passed these descriptors to us and
            // nothing else in the process has claimed them.
            let owned = unsafe { OwnedFd::from_raw_fd(fd) };
            if keep {
                selected.push(owned);
            } else {
                relay_debug!("Closing descriptor {} registered under another name", fd);
                drop(owned);
            }
        }
        return Ok(selected);
    }
    platform_descriptors(socket_name)
}

fn open_fd_limit() -> RawFd {
    // SAFETY: sysconf has no preconditions.
    let limit = unsafe { libc::sysconf(libc::_SC_OPEN_MAX) };
    if limit <= 0 {
        RawFd::MAX
    } else {
        RawFd::try_from(limit).unwrap_or(RawFd::MAX)
    }
}

#[cfg(target_os = "macos")]
fn platform_descriptors(socket_name: &str) -> Result<Vec<OwnedFd>, ActivationError> {
    launchd::activate_socket(socket_name)
}

#[cfg(not(target_os = "macos"))]
fn platform_descriptors(_socket_name: &str) -> Result<Vec<OwnedFd>, ActivationError> {
    Err(ActivationError::NotActivated)
}

/// A descriptor handed over under the systemd protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PassedFd {
    pub fd: RawFd,
    /// Whether it belongs to the requested socket set.
    pub selected: bool,
}

/// Lists the descriptors passed according to the systemd protocol.
///
/// `LISTEN_PID`, when present, must name this process, and the passed range
/// must stay below `fd_limit`. With `LISTEN_FDNAMES` only descriptors named
/// `socket_name` are selected; without it every passed descriptor is. The
/// unselected ones are still returned so the caller can close them.
pub fn systemd_descriptors<F>(
    lookup: F,
    pid: u32,
    socket_name: &str,
    fd_limit: RawFd,
) -> Result<Vec<PassedFd>, ActivationError>
where
    F: Fn(&str) -> Option<String>,
{
    let count = lookup(LISTEN_FDS).ok_or(ActivationError::NotActivated)?;
    let count: RawFd = count
        .trim()
        .parse()
        .ok()
        .filter(|n: &RawFd| *n >= 0)
        .filter(|n| LISTEN_FDS_START.checked_add(*n).is_some_and(|end| end <= fd_limit))
        .ok_or(ActivationError::InvalidEnv { var: LISTEN_FDS, value: count })?;

    if let Some(value) = lookup(LISTEN_PID) {
        let expected: u32 = value
            .trim()
            .parse()
            .map_err(|_| ActivationError::InvalidEnv { var: LISTEN_PID, value: value.clone() })?;
        if expected != pid {
            return Err(ActivationError::PidMismatch { expected, actual: pid });
        }
    }

    let names = lookup(LISTEN_FDNAMES);
    let names: Option<Vec<&str>> = names.as_deref().map(|n| n.split(':').collect());

    Ok((0..count)
        .map(|i| PassedFd {
            fd: LISTEN_FDS_START + i,
            selected: match &names {
                Some(names) => names.get(i as usize).is_some_and(|name| *name == socket_name),
                None => true,
            },
        })
        .collect())
}

fn adopt(fd: OwnedFd) -> Result<Listener, ActivationError> {
    let raw = fd.as_raw_fd();
    set_cloexec(&fd)
        .and_then(|()| Listener::from_fd(fd))
        .map_err(|source| ActivationError::Descriptor { fd: raw, source })
}

fn set_cloexec(fd: &OwnedFd) -> io::Result<()> {
    let raw = fd.as_raw_fd();
    // SAFETY: F_GETFD/F_SETFD only touch descriptor flags of a descriptor we own.
    let flags = unsafe { libc::fcntl(raw, libc::F_GETFD) };
    if flags == -1 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(raw, libc::F_SETFD, flags | libc::FD_CLOEXEC) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(target_os = "macos")]
mod launchd {
    use std::ffi::CString;
    use std::io;
    use std::os::fd::{FromRawFd, OwnedFd};

    use crate::config::SOCKET_NAME_VAR;
    use crate::error::ActivationError;

    unsafe extern "C" {
        fn launch_activate_socket(
            name: *const libc::c_char,
            fds: *mut *mut libc::c_int,
            cnt: *mut libc::size_t,
        ) -> libc::c_int;
    }

    pub(super) fn activate_socket(name: &str) -> Result<Vec<OwnedFd>, ActivationError> {
        let c_name = CString::new(name).map_err(|_| ActivationError::InvalidEnv {
            var: SOCKET_NAME_VAR,
            value: name.to_string(),
        })?;

        let mut fds: *mut libc::c_int = std::ptr::null_mut();
        let mut cnt: libc::size_t = 0;
        // SAFETY: launchd fills `fds` with a malloc'd array of `cnt` descriptors.
        let rc = unsafe { launch_activate_socket(c_name.as_ptr(), &mut fds, &mut cnt) };
        if rc != 0 {
            return Err(ActivationError::Launchd(io::Error::from_raw_os_error(rc)));
        }
        if fds.is_null() {
            return Ok(Vec::new());
        }

        // SAFETY: the array is valid for `cnt` entries until freed below, and
        // each descriptor is handed to us exclusively.
        let owned = unsafe { std::slice::from_raw_parts(fds, cnt) }
            .iter()
            .map(|&fd| unsafe { OwnedFd::from_raw_fd(fd) })
            .collect();
        unsafe { libc::free(fds.cast()) };
        Ok(owned)
    }
}
