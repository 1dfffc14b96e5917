//! Host facts attached to install events and oracle context.

use serde::{Deserialize, Serialize};
use sysinfo::System;

/// Detected host environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostInfo {
    /// OS family (linux, macos, windows)
    pub os_type: String,
    /// Distribution or product name when known (e.g. "Arch Linux")
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub architecture: String,
}

impl HostInfo {
    /// Detect the current host.
    pub fn detect() -> Self {
        Self {
            os_type: std::env::consts::OS.to_string(),
            os_name: System::name(),
            os_version: System::os_version(),
            architecture: std::env::consts::ARCH.to_string(),
        }
    }

    /// One-line summary for logs and reports
    pub fn summary(&self) -> String {
        match &self.os_name {
            Some(name) => format!("{} ({}, {})", name, self.os_type, self.architecture),
            None => format!("{} ({})", self.os_type, self.architecture),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_has_os_and_arch() {
        let host = HostInfo::detect();
        assert!(!host.os_type.is_empty());
        assert!(!host.architecture.is_empty());
        assert!(host.summary().contains(&host.architecture));
    }
}
