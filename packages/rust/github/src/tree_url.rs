//! GitHub "tree" URL parsing.
//!
//! Merge plans name files by their browser URL:
//! `https://github.com/<owner>/<repo>/tree/<branch>/<path>`.

use std::sync::LazyLock;

use regex::Regex;
use seedhub_shared::{HubError, RepoRef, Result};

/// Matches `https://github.com/<owner>/<repo>/tree/<branch>/<path>`.
static TREE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://github\.com/([^/]+)/([^/]+)/tree/([^/]+)/(.+)$").expect("tree url regex")
});

/// A file location inside a GitHub repository at a given branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeUrl {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    /// Repository-relative path, without a leading slash.
    pub path: String,
}

impl TreeUrl {
    /// Parse a tree URL. Surrounding whitespace is ignored.
    pub fn parse(input: &str) -> Result<Self> {
        let caps = TREE_RE
            .captures(input.trim())
            .ok_or_else(|| HubError::validation(format!("not a GitHub tree URL: {input}")))?;

        Ok(Self {
            owner: caps[1].to_string(),
            repo: caps[2].to_string(),
            branch: caps[3].to_string(),
            path: caps[4].trim_end_matches('/').to_string(),
        })
    }

    pub fn repo_ref(&self) -> RepoRef {
        RepoRef::new(&self.owner, &self.repo)
    }
}

impl std::fmt::Display for TreeUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "https://github.com/{}/{}/tree/{}/{}",
            self.owner, self.repo, self.branch, self.path
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tree_url() {
        let url = TreeUrl::parse("https://github.com/acme/launch-model/tree/main/seeds/glossary.yml")
            .unwrap();
        assert_eq!(url.owner, "acme");
        assert_eq!(url.repo, "launch-model");
        assert_eq!(url.branch, "main");
        assert_eq!(url.path, "seeds/glossary.yml");
        assert_eq!(url.repo_ref().full_name(), "acme/launch-model");
    }

    #[test]
    fn surrounding_whitespace_and_trailing_slash_ignored() {
        let url = TreeUrl::parse("  https://github.com/acme/hub/tree/dev/seeds/tags.yml/\n").unwrap();
        assert_eq!(url.branch, "dev");
        assert_eq!(url.path, "seeds/tags.yml");
        assert_eq!(
            url.to_string(),
            "https://github.com/acme/hub/tree/dev/seeds/tags.yml"
        );
    }

    #[test]
    fn rejects_blob_and_foreign_urls() {
        assert!(TreeUrl::parse("https://github.com/acme/hub/blob/main/seeds/tags.yml").is_err());
        assert!(TreeUrl::parse("https://gitlab.com/acme/hub/tree/main/x.yml").is_err());
        assert!(TreeUrl::parse("https://github.com/acme/hub/tree/main").is_err());
        assert!(TreeUrl::parse("").is_err());
    }
}
