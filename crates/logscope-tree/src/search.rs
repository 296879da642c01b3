use regex::Regex;

use crate::node::NodeId;
use crate::ScopeTree;

/// Compiled search over scope paths
#[derive(Clone)]
pub struct ScopeMatcher {
    /// Regex pattern (if any)
    regex: Option<Regex>,

    /// Original pattern string
    pattern: String,

    /// Only report leafs
    leafs_only: bool,

    case_insensitive: bool,
}

impl ScopeMatcher {
    /// Create a matcher from a pattern string; an empty pattern matches everything
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Self::build(pattern, false)
    }

    /// Create a case-insensitive matcher
    pub fn new_case_insensitive(pattern: &str) -> Result<Self, regex::Error> {
        Self::build(pattern, true)
    }

    fn build(pattern: &str, case_insensitive: bool) -> Result<Self, regex::Error> {
        let regex = match (pattern.is_empty(), case_insensitive) {
            (true, _) => None,
            (false, true) => Some(Regex::new(&format!("(?i){}", pattern))?),
            (false, false) => Some(Regex::new(pattern)?),
        };

        Ok(Self {
            regex,
            pattern: pattern.to_string(),
            leafs_only: false,
            case_insensitive,
        })
    }

    /// Skip namespace nodes when searching a tree
    pub fn leafs_only(mut self) -> Self {
        self.leafs_only = true;
        self
    }

    /// Check a full scope path
    pub fn matches(&self, path: &str) -> bool {
        match &self.regex {
            Some(re) => re.is_match(path),
            None => true,
        }
    }

    /// Every node below the root whose path matches, in pre-order
    pub fn search(&self, tree: &ScopeTree) -> Vec<NodeId> {
        tree.descendants(tree.root())
            .into_iter()
            .filter(|id| !self.leafs_only || tree[*id].is_leaf())
            .filter(|id| self.matches(&tree.make_path(*id)))
            .collect()
    }

    /// Find all match positions in a path (for highlighting)
    pub fn find_matches(&self, text: &str) -> Vec<(usize, usize)> {
        match &self.regex {
            Some(re) => re.find_iter(text).map(|m| (m.start(), m.end())).collect(),
            None => Vec::new(),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Check if the matcher accepts everything
    pub fn is_empty(&self) -> bool {
        self.regex.is_none()
    }

    pub fn is_case_insensitive(&self) -> bool {
        self.case_insensitive
    }
}

impl std::fmt::Debug for ScopeMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeMatcher")
            .field("pattern", &self.pattern)
            .field("leafs_only", &self.leafs_only)
            .field("case_insensitive", &self.case_insensitive)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logscope_types::PriorityMask;

    fn tree() -> ScopeTree {
        let mut tree = ScopeTree::new(1, "app");
        for path in ["Net::Socket::Read", "Net::Socket::Write", "Db::Query", "Db::Pool::Acquire"] {
            tree.insert_or_merge(path, PriorityMask::INFO, 0).unwrap();
        }
        tree
    }

    #[test]
    fn test_search_paths() {
        let tree = tree();
        let matcher = ScopeMatcher::new("Socket").unwrap();
        let found: Vec<_> = matcher
            .search(&tree)
            .into_iter()
            .map(|id| tree.make_path(id))
            .collect();
        assert_eq!(found, ["Net::Socket", "Net::Socket::Read", "Net::Socket::Write"]);

        let leafs = matcher.clone().leafs_only().search(&tree);
        assert_eq!(leafs.len(), 2);
    }

    #[test]
    fn test_case_insensitive() {
        let tree = tree();
        assert!(ScopeMatcher::new("query").unwrap().search(&tree).is_empty());

        let matcher = ScopeMatcher::new_case_insensitive("query").unwrap();
        assert!(matcher.is_case_insensitive());
        assert_eq!(matcher.search(&tree).len(), 1);
    }

    #[test]
    fn test_empty_pattern_matches_all() {
        let tree = tree();
        let matcher = ScopeMatcher::new("").unwrap();
        assert!(matcher.is_empty());
        assert_eq!(matcher.search(&tree).len(), tree.len() - 1);
    }

    #[test]
    fn test_find_matches() {
        let matcher = ScopeMatcher::new("o").unwrap();
        assert_eq!(matcher.find_matches("Db::Pool").len(), 2);
        assert!(ScopeMatcher::new("(").is_err());
    }
}
