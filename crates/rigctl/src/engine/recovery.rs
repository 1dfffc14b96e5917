//! Static recovery strategies.
//!
//! The last rung of the escalation ladder: when neither the knowledge
//! store nor the oracle offers a fix, fall back to alternate
//! package-manager strategies for the tool's category, in a fixed
//! priority order. Each strategy is tried at most once per tool.

use crate::oracle::ToolCandidate;
use rig_common::ToolCategory;
use serde::{Deserialize, Serialize};

/// Supported system package managers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageManager {
    Pacman,
    Apt,
    Dnf,
    Brew,
    Flatpak,
    Snap,
}

impl PackageManager {
    pub fn display_name(&self) -> &'static str {
        match self {
            PackageManager::Pacman => "pacman",
            PackageManager::Apt => "apt",
            PackageManager::Dnf => "dnf",
            PackageManager::Brew => "brew",
            PackageManager::Flatpak => "Flatpak",
            PackageManager::Snap => "Snap",
        }
    }

    /// Install command template; the package name is appended.
    pub fn install_cmd(&self) -> &'static str {
        match self {
            PackageManager::Pacman => "sudo pacman -S --noconfirm",
            PackageManager::Apt => "sudo apt-get install -y",
            PackageManager::Dnf => "sudo dnf install -y",
            PackageManager::Brew => "brew install",
            PackageManager::Flatpak => "flatpak install -y",
            PackageManager::Snap => "sudo snap install",
        }
    }

    pub fn install(&self, package: &str) -> String {
        format!("{} {}", self.install_cmd(), package)
    }

    /// Detect the primary package manager on this system.
    pub fn detect() -> Option<Self> {
        let candidates = [
            ("pacman", PackageManager::Pacman),
            ("apt-get", PackageManager::Apt),
            ("dnf", PackageManager::Dnf),
            ("brew", PackageManager::Brew),
        ];
        for (binary, manager) in candidates {
            let found = std::process::Command::new("sh")
                .arg("-c")
                .arg(format!("command -v {}", binary))
                .output()
                .map(|out| out.status.success())
                .unwrap_or(false);
            if found {
                return Some(manager);
            }
        }
        None
    }
}

/// Alternate install commands for one tool, in fallback order.
///
/// Order: detected primary manager, category-specific secondary manager,
/// universal managers, then a direct-download method where a canonical
/// one exists. Commands equal to ones already attempted are filtered by
/// the engine, not here.
pub fn fallback_commands(
    candidate: &ToolCandidate,
    primary: Option<PackageManager>,
) -> Vec<String> {
    let name = candidate.name.trim().to_lowercase();
    let mut commands = Vec::new();

    if let Some(manager) = primary {
        commands.push(manager.install(&name));
    }

    match candidate.category {
        ToolCategory::AiMl | ToolCategory::Language => {
            commands.push(format!("pip3 install --user {}", name));
        }
        ToolCategory::Runtime | ToolCategory::BuildTool => {
            commands.push(format!("npm install -g {}", name));
        }
        _ => {}
    }

    commands.push(PackageManager::Flatpak.install(&name));
    commands.push(PackageManager::Snap.install(&name));

    if candidate.category == ToolCategory::Container && name.contains("docker") {
        commands.push("curl -fsSL https://get.docker.com | sh".to_string());
    }

    commands
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manager_templates() {
        assert_eq!(
            PackageManager::Apt.install("git"),
            "sudo apt-get install -y git"
        );
        assert_eq!(
            PackageManager::Pacman.install("git"),
            "sudo pacman -S --noconfirm git"
        );
    }

    #[test]
    fn test_fallback_order_leads_with_primary_manager() {
        let candidate = ToolCandidate::new("ripgrep", ToolCategory::Other, "broken-cmd");
        let commands = fallback_commands(&candidate, Some(PackageManager::Apt));
        assert_eq!(commands[0], "sudo apt-get install -y ripgrep");
        assert!(commands.iter().any(|c| c.starts_with("flatpak")));
    }

    #[test]
    fn test_ai_category_gets_pip_strategy() {
        let candidate = ToolCandidate::new("jupyterlab", ToolCategory::AiMl, "broken-cmd");
        let commands = fallback_commands(&candidate, None);
        assert!(commands.iter().any(|c| c.starts_with("pip3 install")));
    }

    #[test]
    fn test_docker_gets_direct_download() {
        let candidate = ToolCandidate::new("docker", ToolCategory::Container, "broken-cmd");
        let commands = fallback_commands(&candidate, Some(PackageManager::Apt));
        assert!(commands.iter().any(|c| c.contains("get.docker.com")));
    }
}
