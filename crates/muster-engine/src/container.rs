//! Container and image views of an engine's inventory.
//!
//! The engine owns its containers; each container carries a non-owning
//! back-reference to the engine so ownership never cycles.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Weak;

use muster_state::{ContainerId, ContainerSpec};

use crate::engine::Engine;

/// A running or declared workload on one engine.
#[derive(Debug)]
pub struct Container {
    pub id: ContainerId,
    /// Slash-prefixed names; the first one is canonical.
    pub names: Vec<String>,
    pub spec: ContainerSpec,
    running: AtomicBool,
    engine: Weak<Engine>,
}

impl Container {
    pub fn new(
        id: ContainerId,
        names: Vec<String>,
        running: bool,
        spec: ContainerSpec,
        engine: Weak<Engine>,
    ) -> Self {
        Self {
            id,
            names,
            spec,
            running: AtomicBool::new(running),
            engine,
        }
    }

    /// First registered name with the leading slash stripped.
    pub fn canonical_name(&self) -> &str {
        self.names
            .first()
            .map(|n| n.trim_start_matches('/'))
            .unwrap_or("")
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    /// The engine holding this container, if it is still alive.
    pub fn engine(&self) -> Option<std::sync::Arc<Engine>> {
        self.engine.upgrade()
    }

    /// Whether `term` identifies this container.
    ///
    /// Matches the canonical name, any registered name, or an id
    /// prefix of length ≥ 1. An empty term never matches.
    pub fn matches(&self, term: &str) -> bool {
        if term.is_empty() {
            return false;
        }
        if self.canonical_name() == term {
            return true;
        }
        if self
            .names
            .iter()
            .any(|n| n == term || n.trim_start_matches('/') == term)
        {
            return true;
        }
        self.id.starts_with(term)
    }
}

/// An image present on one engine.
#[derive(Debug)]
pub struct Image {
    pub id: String,
    pub repo_tags: Vec<String>,
    engine: Weak<Engine>,
}

impl Image {
    pub fn new(id: String, repo_tags: Vec<String>, engine: Weak<Engine>) -> Self {
        Self {
            id,
            repo_tags,
            engine,
        }
    }

    /// The engine holding this image, if it is still alive.
    pub fn engine(&self) -> Option<std::sync::Arc<Engine>> {
        self.engine.upgrade()
    }

    /// Whether `term` identifies this image (tag match or id prefix).
    pub fn matches(&self, term: &str) -> bool {
        if term.is_empty() {
            return false;
        }
        self.repo_tags.iter().any(|t| t == term) || self.id.starts_with(term)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(id: &str, names: &[&str]) -> Container {
        Container::new(
            id.to_string(),
            names.iter().map(|n| n.to_string()).collect(),
            false,
            ContainerSpec::default(),
            Weak::new(),
        )
    }

    #[test]
    fn canonical_name_strips_leading_slash() {
        let c = container("abc", &["/web", "/alias"]);
        assert_eq!(c.canonical_name(), "web");
    }

    #[test]
    fn canonical_name_of_unnamed_container_is_empty() {
        let c = container("abc", &[]);
        assert_eq!(c.canonical_name(), "");
    }

    #[test]
    fn matches_by_name_and_id_prefix() {
        let c = container("abcdef123456", &["/web"]);
        assert!(c.matches("web"));
        assert!(c.matches("/web"));
        assert!(c.matches("a"));
        assert!(c.matches("abcdef"));
        assert!(!c.matches("bcd"));
        assert!(!c.matches(""));
    }

    #[test]
    fn running_flag_toggles() {
        let c = container("abc", &["/web"]);
        assert!(!c.is_running());
        c.set_running(true);
        assert!(c.is_running());
    }

    #[test]
    fn image_matches_tag_or_prefix() {
        let img = Image::new(
            "sha256aaaa".to_string(),
            vec!["repo/app:1.0".to_string()],
            Weak::new(),
        );
        assert!(img.matches("repo/app:1.0"));
        assert!(img.matches("sha256"));
        assert!(!img.matches("other:tag"));
        assert!(!img.matches(""));
    }
}
