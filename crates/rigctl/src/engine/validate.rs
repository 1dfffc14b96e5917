//! Candidate stack validation and static fallbacks.
//!
//! A proposed stack must be big enough and cover the required categories
//! before the engine will execute it. When the oracle cannot produce an
//! adequate stack (or any stack at all), a fixed minimal list keyed by
//! the detected domain fills the gap.

use crate::engine::recovery::PackageManager;
use crate::oracle::ToolCandidate;
use rig_common::config::EngineConfig;
use rig_common::{normalize_name, ToolCategory};
use std::collections::HashSet;

/// Coarse domain classification of the user's request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainKind {
    Web,
    Python,
    Systems,
    DevOps,
    General,
}

impl DomainKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainKind::Web => "web",
            DomainKind::Python => "python",
            DomainKind::Systems => "systems",
            DomainKind::DevOps => "devops",
            DomainKind::General => "general",
        }
    }
}

/// Classify a domain description by keywords.
pub fn detect_domain(text: &str) -> DomainKind {
    let t = text.to_lowercase();
    if t.contains("web") || t.contains("frontend") || t.contains("react") || t.contains("node") {
        DomainKind::Web
    } else if t.contains("python")
        || t.contains("data")
        || t.contains("machine learning")
        || t.contains("ml")
        || t.contains(" ai")
        || t.starts_with("ai")
    {
        DomainKind::Python
    } else if t.contains("rust") || t.contains("c++") || t.contains("systems") || t.contains("embedded") {
        DomainKind::Systems
    } else if t.contains("devops") || t.contains("docker") || t.contains("kubernetes") || t.contains("cloud") {
        DomainKind::DevOps
    } else {
        DomainKind::General
    }
}

/// Check a candidate stack against the configured minimums.
///
/// Returns the rejection reason, or `Ok(())` when the stack is adequate.
pub fn validate_stack(candidates: &[ToolCandidate], config: &EngineConfig) -> Result<(), String> {
    if candidates.len() < config.min_tools {
        return Err(format!(
            "only {} tools proposed, minimum is {}",
            candidates.len(),
            config.min_tools
        ));
    }

    let covered: HashSet<&str> = candidates.iter().map(|c| c.category.as_str()).collect();
    let missing: Vec<&str> = config
        .required_categories
        .iter()
        .map(|c| c.as_str())
        .filter(|c| !covered.contains(ToolCategory::parse(c).as_str()))
        .collect();

    if !missing.is_empty() {
        return Err(format!("missing required categories: {}", missing.join(", ")));
    }

    Ok(())
}

/// Merge extra candidates into a primary list, deduplicating by
/// normalized name. Primary entries win.
pub fn merge_candidates(
    primary: Vec<ToolCandidate>,
    extra: Vec<ToolCandidate>,
) -> Vec<ToolCandidate> {
    let mut seen: HashSet<String> = primary.iter().map(|c| normalize_name(&c.name)).collect();
    let mut merged = primary;
    for candidate in extra {
        if seen.insert(normalize_name(&candidate.name)) {
            merged.push(candidate);
        }
    }
    merged
}

/// Fixed minimal stack for a domain.
///
/// Install commands are templated from the detected package manager
/// (apt when nothing is detected); the escalation ladder rewrites them
/// per-host anyway if they fail.
pub fn fallback_stack(domain: DomainKind, manager: Option<PackageManager>) -> Vec<ToolCandidate> {
    let pm = manager.unwrap_or(PackageManager::Apt);
    let sys = |name: &str, category: ToolCategory, check: &str, priority: u8| {
        ToolCandidate::new(name, category, &pm.install(name))
            .with_check(check)
            .with_priority(priority)
    };

    let mut stack = vec![
        sys("git", ToolCategory::VersionControl, "git --version", 10),
        sys("curl", ToolCategory::Other, "curl --version", 9),
        sys("neovim", ToolCategory::Editor, "nvim --version", 8),
        sys("make", ToolCategory::BuildTool, "make --version", 7),
        sys("zsh", ToolCategory::Shell, "zsh --version", 4),
        sys("tmux", ToolCategory::Shell, "tmux -V", 4),
        sys("ripgrep", ToolCategory::Other, "rg --version", 3),
        sys("jq", ToolCategory::Other, "jq --version", 3),
    ];

    match domain {
        DomainKind::Web => {
            stack.push(sys("nodejs", ToolCategory::Runtime, "node --version", 8));
            stack.push(sys("npm", ToolCategory::BuildTool, "npm --version", 7));
        }
        DomainKind::Python => {
            stack.push(sys("python3", ToolCategory::Language, "python3 --version", 9));
            stack.push(sys("python3-pip", ToolCategory::BuildTool, "pip3 --version", 8));
        }
        DomainKind::Systems => {
            stack.push(sys("gcc", ToolCategory::Language, "gcc --version", 8));
            stack.push(sys("gdb", ToolCategory::Other, "gdb --version", 5));
        }
        DomainKind::DevOps => {
            let mut docker = sys("docker", ToolCategory::Container, "docker --version", 9);
            docker.depends_on.push("curl".to_string());
            stack.push(docker);
            stack.push(sys("kubectl", ToolCategory::Container, "kubectl version --client", 6));
        }
        DomainKind::General => {
            stack.push(sys("python3", ToolCategory::Language, "python3 --version", 6));
            stack.push(sys("htop", ToolCategory::Other, "htop --version", 2));
        }
    }

    stack
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_domain() {
        assert_eq!(detect_domain("full stack web development"), DomainKind::Web);
        assert_eq!(detect_domain("python data science setup"), DomainKind::Python);
        assert_eq!(detect_domain("rust systems programming"), DomainKind::Systems);
        assert_eq!(detect_domain("devops with kubernetes"), DomainKind::DevOps);
        assert_eq!(detect_domain("just the basics"), DomainKind::General);
    }

    #[test]
    fn test_validate_rejects_short_stack() {
        let config = EngineConfig::default();
        let candidates = vec![
            ToolCandidate::new("git", ToolCategory::VersionControl, "x"),
            ToolCandidate::new("vim", ToolCategory::Editor, "x"),
        ];
        let reason = validate_stack(&candidates, &config).unwrap_err();
        assert!(reason.contains("minimum"));
    }

    #[test]
    fn test_validate_requires_category_coverage() {
        let mut config = EngineConfig::default();
        config.min_tools = 2;
        // Enough tools, but no editor
        let candidates: Vec<ToolCandidate> = (0..3)
            .map(|i| ToolCandidate::new(&format!("tool{}", i), ToolCategory::VersionControl, "x"))
            .collect();
        let reason = validate_stack(&candidates, &config).unwrap_err();
        assert!(reason.contains("editor"));
    }

    #[test]
    fn test_every_fallback_stack_is_self_sufficient() {
        let config = EngineConfig::default();
        for domain in [
            DomainKind::Web,
            DomainKind::Python,
            DomainKind::Systems,
            DomainKind::DevOps,
            DomainKind::General,
        ] {
            let stack = fallback_stack(domain, None);
            assert!(
                validate_stack(&stack, &config).is_ok(),
                "{} fallback stack is inadequate",
                domain.as_str()
            );
        }
    }

    #[test]
    fn test_merge_dedupes_by_name() {
        let primary = vec![ToolCandidate::new("Git", ToolCategory::VersionControl, "a")];
        let extra = vec![
            ToolCandidate::new("git", ToolCategory::VersionControl, "b"),
            ToolCandidate::new("jq", ToolCategory::Other, "c"),
        ];
        let merged = merge_candidates(primary, extra);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].install_command, "a");
    }
}
