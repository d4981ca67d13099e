//! Per-subdomain robots.txt overrides
//!
//! An override is keyed by `host[:port]` and fully replaces whatever robots.txt
//! the host serves. Overrides are never merged with fetched rules.

use crate::robots::parser::{PathTestResult, RobotsPolicy};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct CustomEntry {
    content: String,
    policy: Arc<RobotsPolicy>,
}

/// User-supplied robots.txt content per subdomain
#[derive(Debug, Clone, Default)]
pub struct CustomRobotsManager {
    entries: BTreeMap<String, CustomEntry>,
}

impl CustomRobotsManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the override for a subdomain
    pub fn add_subdomain(&mut self, subdomain: &str, content: &str) {
        let policy = Arc::new(RobotsPolicy::parse(content));
        self.entries.insert(
            subdomain.to_lowercase(),
            CustomEntry {
                content: content.to_string(),
                policy,
            },
        );
    }

    /// Removes an override; returns false if none existed
    pub fn remove_subdomain(&mut self, subdomain: &str) -> bool {
        self.entries.remove(&subdomain.to_lowercase()).is_some()
    }

    pub fn content(&self, subdomain: &str) -> Option<&str> {
        self.entries
            .get(&subdomain.to_lowercase())
            .map(|e| e.content.as_str())
    }

    /// The parsed override policy for a subdomain, if any
    pub fn policy(&self, subdomain: &str) -> Option<Arc<RobotsPolicy>> {
        self.entries
            .get(&subdomain.to_lowercase())
            .map(|e| Arc::clone(&e.policy))
    }

    pub fn subdomains(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn test_path(&self, subdomain: &str, path: &str, user_agent: &str) -> PathTestResult {
        match self.policy(subdomain) {
            Some(policy) => policy.test_path(path, user_agent),
            None => PathTestResult {
                path: path.to_string(),
                allowed: true,
                user_agent: user_agent.to_string(),
                matched_rule: None,
                reason: "No custom robots.txt for this subdomain".to_string(),
            },
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Raw override table, suitable for persisting with user settings
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|(host, entry)| (host.clone(), entry.content.clone()))
            .collect()
    }

    /// Replaces every override with the given table
    pub fn from_map(map: &BTreeMap<String, String>) -> Self {
        let mut manager = Self::new();
        for (host, content) in map {
            manager.add_subdomain(host, content);
        }
        manager
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_replace() {
        let mut manager = CustomRobotsManager::new();
        manager.add_subdomain("Blog.Example.com", "User-agent: *\nDisallow: /drafts\n");

        let policy = manager.policy("blog.example.com").unwrap();
        assert!(!policy.is_path_allowed("/drafts/1", "Bot"));

        manager.add_subdomain("blog.example.com", "User-agent: *\nDisallow:\n");
        let policy = manager.policy("blog.example.com").unwrap();
        assert!(policy.is_path_allowed("/drafts/1", "Bot"));
        assert_eq!(manager.subdomains(), vec!["blog.example.com"]);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut manager = CustomRobotsManager::new();
        manager.add_subdomain("a.com", "");
        manager.add_subdomain("b.com", "");
        assert!(manager.remove_subdomain("a.com"));
        assert!(!manager.remove_subdomain("a.com"));
        assert_eq!(manager.content("b.com"), Some(""));
        manager.clear();
        assert!(manager.is_empty());
    }

    #[test]
    fn test_test_path_without_override() {
        let manager = CustomRobotsManager::new();
        let result = manager.test_path("x.com", "/a", "Bot");
        assert!(result.allowed);
        assert_eq!(result.reason, "No custom robots.txt for this subdomain");
    }

    #[test]
    fn test_map_roundtrip_restores_policies() {
        let mut manager = CustomRobotsManager::new();
        manager.add_subdomain("shop.example.com", "User-agent: *\nDisallow: /cart\n");

        let restored = CustomRobotsManager::from_map(&manager.to_map());
        let result = restored.test_path("shop.example.com", "/cart", "Bot");
        assert!(!result.allowed);
    }
}
