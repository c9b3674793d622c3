/// Human-readable name for a signal that terminated a worker.
#[cfg(unix)]
pub fn signal_name(signal: i32) -> String {
    let (description, short) = match signal {
        libc::SIGSEGV => ("Segmentation fault", "SIGSEGV"),
        libc::SIGILL => ("Illegal instruction", "SIGILL"),
        libc::SIGFPE => ("Floating point exception", "SIGFPE"),
        libc::SIGABRT => ("Aborted", "SIGABRT"),
        libc::SIGBUS => ("Bus error", "SIGBUS"),
        libc::SIGTERM => ("Terminated", "SIGTERM"),
        libc::SIGKILL => ("Killed", "SIGKILL"),
        libc::SIGTRAP => ("Trace/breakpoint trap", "SIGTRAP"),
        libc::SIGSYS => ("Bad system call", "SIGSYS"),
        libc::SIGPIPE => ("Broken pipe", "SIGPIPE"),
        _ => return format!("signal {}", signal),
    };
    format!("{} ({})", description, short)
}

#[cfg(not(unix))]
pub fn signal_name(signal: i32) -> String {
    format!("signal {}", signal)
}

/// Signal that terminated the process, if any.
#[cfg(unix)]
pub fn terminating_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
pub fn terminating_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}
