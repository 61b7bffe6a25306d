//! Source survey used as planning input
//!
//! Collects the project README and the first lines of a bounded number of
//! text-like files near the project root. Unreadable files are skipped, and
//! symlinks are never followed: the checkout is untrusted and its contents
//! are sent to the planner.

use crate::build::is_regular_file;
use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

/// Most files included in a survey
pub const MAX_FILES: usize = 20;
/// Lines kept from the top of each file
pub const HEAD_LINES: usize = 10;
/// Deepest directory level (relative to the project root) that is scanned
pub const MAX_DEPTH: usize = 2;
/// Largest README prefix included, in bytes
pub const MAX_README_BYTES: u64 = 64 * 1024;
/// Bytes read from the top of each surveyed file
const MAX_HEAD_BYTES: u64 = 16 * 1024;

const SURVEYED_EXTENSIONS: &[&str] = &[
    "py", "js", "ts", "json", "md", "txt", "yml", "yaml", "toml", "xml",
];
const SURVEYED_NAMES: &[&str] = &["Dockerfile", "Makefile"];
const SKIPPED_DIRS: &[&str] = &["node_modules", "__pycache__", "target", "dist", "build"];

/// Head of one surveyed file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileExcerpt {
    /// Path relative to the project root, `/`-separated
    pub path: String,
    pub first_lines: Vec<String>,
}

/// What a planner gets to see of a project
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSurvey {
    pub readme: Option<String>,
    pub files: Vec<FileExcerpt>,
}

impl SourceSurvey {
    /// Survey the project rooted at `root`
    pub fn collect(root: &Path) -> Self {
        let readme = read_readme(&root.join("README.md"));

        let mut files = Vec::new();
        visit(root, root, 0, &mut files);

        Self { readme, files }
    }

    /// Prompt section with the README and file heads
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(readme) = &self.readme {
            out.push_str("\n\nFULL README CONTENT:\n");
            out.push_str(readme);
            out.push('\n');
        }
        if !self.files.is_empty() {
            out.push_str("\n\nPROJECT FILE OVERVIEW:\n");
            for file in &self.files {
                out.push_str(&format!(
                    "\n--- {} (first {} lines) ---\n",
                    file.path, HEAD_LINES
                ));
                out.push_str(&file.first_lines.join("\n"));
                out.push('\n');
            }
        }
        out
    }
}

fn is_surveyed(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    SURVEYED_NAMES.contains(&name)
        || path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| SURVEYED_EXTENSIONS.contains(&ext))
}

fn read_readme(path: &Path) -> Option<String> {
    if !is_regular_file(path) {
        return None;
    }
    let mut bytes = Vec::new();
    fs::File::open(path)
        .ok()?
        .take(MAX_README_BYTES)
        .read_to_end(&mut bytes)
        .ok()?;
    let content = String::from_utf8_lossy(&bytes).into_owned();
    (!content.is_empty()).then_some(content)
}

/// Directory entries sorted by path; `file_type` does not follow symlinks
fn sorted_entries(dir: &Path) -> Vec<(PathBuf, fs::FileType)> {
    let mut entries: Vec<(PathBuf, fs::FileType)> = match fs::read_dir(dir) {
        Ok(read) => read
            .filter_map(|entry| {
                let entry = entry.ok()?;
                Some((entry.path(), entry.file_type().ok()?))
            })
            .collect(),
        Err(_) => return Vec::new(),
    };
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}

fn visit(root: &Path, dir: &Path, depth: usize, files: &mut Vec<FileExcerpt>) {
    let entries = sorted_entries(dir);

    for (path, _) in entries.iter().filter(|(_, kind)| kind.is_file()) {
        if files.len() >= MAX_FILES {
            return;
        }
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(true, |n| n.starts_with('.'));
        if hidden || !is_surveyed(path) {
            continue;
        }
        if let Some(first_lines) = head(path) {
            let relative = path.strip_prefix(root).unwrap_or(path);
            files.push(FileExcerpt {
                path: relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/"),
                first_lines,
            });
        }
    }

    if depth >= MAX_DEPTH {
        return;
    }
    for (path, _) in entries.iter().filter(|(_, kind)| kind.is_dir()) {
        if files.len() >= MAX_FILES {
            return;
        }
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if name.starts_with('.') || SKIPPED_DIRS.contains(&name) {
            continue;
        }
        visit(root, path, depth + 1, files);
    }
}

fn head(path: &Path) -> Option<Vec<String>> {
    let file = fs::File::open(path).ok()?;
    BufReader::new(file.take(MAX_HEAD_BYTES))
        .lines()
        .take(HEAD_LINES)
        .map(|line| line.ok().map(|l| l.trim_end().to_string()))
        .collect()
}
