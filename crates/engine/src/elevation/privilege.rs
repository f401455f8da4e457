/// Whether this process already runs with administrative privilege
#[cfg(unix)]
#[allow(unsafe_code)]
#[must_use]
pub fn is_privileged() -> bool {
    // SAFETY: geteuid takes no arguments, has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

/// Whether this process already runs with administrative privilege
#[cfg(not(unix))]
#[must_use]
pub fn is_privileged() -> bool {
    false
}
