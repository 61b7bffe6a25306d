//! Repository reference resolution
//!
//! Parses a GitHub URL into a normalized [`RepositoryReference`] and derives
//! the installation name used as the sole key for update, delete, and list.
//!
//! # Recognized shapes
//!
//! - `https://github.com/<owner>/<repo>/tree/<branch>/<subpath>`
//! - `https://github.com/<owner>/<repo>/blob/<branch>/<subpath>`
//! - `https://github.com/<owner>/<repo>` (optional trailing slash; branch `main`)
//!
//! # Examples
//!
//! ```
//! use sinstaller_core::reference::RepositoryReference;
//!
//! let reference = RepositoryReference::resolve("https://github.com/o/r/tree/main/a/b/c").unwrap();
//! assert_eq!(reference.subpath, "a/b/c");
//! assert_eq!(reference.installation_name(), "o-r-c");
//! ```

use crate::errors::ReferenceError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Branch used when the reference does not name one
pub const DEFAULT_BRANCH: &str = "main";

static TREE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https://github\.com/([^/]+)/([^/]+)/(?:tree|blob)/([^/]+)/(.+)$")
        .expect("Valid regex pattern")
});

static REPO_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https://github\.com/([^/]+)/([^/]+)/?$").expect("Valid regex pattern")
});

/// Normalized pointer to a source location
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryReference {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    /// Path inside the repository, without leading or trailing slashes; empty for the root
    pub subpath: String,
}

impl RepositoryReference {
    /// Parse a reference string
    pub fn resolve(reference: &str) -> Result<Self, ReferenceError> {
        let reference = reference.trim();

        let parsed = if let Some(caps) = TREE_PATTERN.captures(reference) {
            let subpath = caps[4].trim_matches('/').to_string();
            Self {
                owner: caps[1].to_string(),
                repo: caps[2].to_string(),
                branch: caps[3].to_string(),
                subpath,
            }
        } else if let Some(caps) = REPO_PATTERN.captures(reference) {
            Self {
                owner: caps[1].to_string(),
                repo: caps[2].to_string(),
                branch: DEFAULT_BRANCH.to_string(),
                subpath: String::new(),
            }
        } else {
            return Err(ReferenceError::Malformed {
                reference: reference.to_string(),
            });
        };

        parsed.check_components(reference)?;
        Ok(parsed)
    }

    /// Reject components that are not safe single path segments
    fn check_components(&self, reference: &str) -> Result<(), ReferenceError> {
        let mut components = vec![self.owner.as_str(), self.repo.as_str()];
        if !self.subpath.is_empty() {
            components.extend(self.subpath.split('/'));
        }

        for component in components {
            if component.is_empty()
                || component == "."
                || component == ".."
                || component.contains('\\')
            {
                return Err(ReferenceError::UnsafeComponent {
                    reference: reference.to_string(),
                    component: component.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Final segment of the subpath, if any
    pub fn subpath_leaf(&self) -> Option<&str> {
        self.subpath.rsplit('/').next().filter(|s| !s.is_empty())
    }

    /// `owner-repo[-leaf]`
    pub fn installation_name(&self) -> String {
        match self.subpath_leaf() {
            Some(leaf) => format!("{}-{}-{}", self.owner, self.repo, leaf),
            None => format!("{}-{}", self.owner, self.repo),
        }
    }

    /// HTTPS clone URL for the repository
    pub fn clone_url(&self) -> String {
        format!("https://github.com/{}/{}.git", self.owner, self.repo)
    }

    /// Directory containing the project inside a checkout rooted at `checkout`
    pub fn source_dir(&self, checkout: &Path) -> PathBuf {
        if self.subpath.is_empty() {
            checkout.to_path_buf()
        } else {
            checkout.join(&self.subpath)
        }
    }
}

impl std::str::FromStr for RepositoryReference {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::resolve(s)
    }
}

impl std::fmt::Display for RepositoryReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.repo, self.branch)?;
        if !self.subpath.is_empty() {
            write!(f, ":{}", self.subpath)?;
        }
        Ok(())
    }
}
