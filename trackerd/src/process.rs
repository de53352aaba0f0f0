//! Identity of the running daemon process.

use tracker_domain::{timestamp_with_milliseconds, ProcessDetails};

/// Hostname as reported by the OS, or `localhost` when unavailable.
pub fn local_hostname() -> String {
    sysinfo::System::host_name()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Details of this process with a fresh instance id, started now.
pub fn current_process() -> ProcessDetails {
    ProcessDetails::new(local_hostname(), std::process::id(), timestamp_with_milliseconds())
}
