use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use qs_compiler::SOURCE_EXTENSION;
use qs_core::ScriptQueueError;
use walkdir::{DirEntry, WalkDir};

use crate::{map_cli_source_path, map_cli_source_read, map_cli_source_scan};

/// A directory of `.qs` files compiled together as one project.
#[derive(Debug)]
pub(crate) struct ScriptProject {
    pub(crate) root: PathBuf,
    /// Source text keyed by its `/`-separated path below `root`.
    pub(crate) sources: BTreeMap<String, String>,
}

impl ScriptProject {
    /// Resolves `scripts_dir` against the working directory and loads it.
    pub(crate) fn open(scripts_dir: &str) -> Result<Self, ScriptQueueError> {
        let root = project_root(Path::new(scripts_dir))?;
        Self::scan(root)
    }

    /// Loads every `.qs` file below `root`. Hidden files and directories
    /// are skipped; a project without sources is an error.
    pub(crate) fn scan(root: PathBuf) -> Result<Self, ScriptQueueError> {
        let mut sources = BTreeMap::new();
        let walker = WalkDir::new(&root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));

        for entry in walker {
            let entry = entry.map_err(map_cli_source_scan)?;
            if !entry.file_type().is_file() || !is_source_file(entry.path()) {
                continue;
            }
            let key = source_key(&root, entry.path())?;
            let content = fs::read_to_string(entry.path()).map_err(map_cli_source_read)?;
            sources.insert(key, content);
        }

        if sources.is_empty() {
            return Err(ScriptQueueError::new(
                "CLI_SOURCE_EMPTY",
                format!("No {} files under {}", SOURCE_EXTENSION, root.display()),
            ));
        }
        Ok(Self { root, sources })
    }

    pub(crate) fn file_count(&self) -> usize {
        self.sources.len()
    }
}

fn project_root(scripts_dir: &Path) -> Result<PathBuf, ScriptQueueError> {
    let root = if scripts_dir.is_absolute() {
        scripts_dir.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(map_cli_source_path)?
            .join(scripts_dir)
    };
    if !root.exists() {
        return Err(ScriptQueueError::new(
            "CLI_SOURCE_NOT_FOUND",
            format!("scripts-dir does not exist: {}", root.display()),
        ));
    }
    if !root.is_dir() {
        return Err(ScriptQueueError::new(
            "CLI_SOURCE_NOT_DIR",
            format!("scripts-dir is not a directory: {}", root.display()),
        ));
    }
    Ok(root)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

fn is_source_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|extension| format!(".{}", extension.to_string_lossy()) == SOURCE_EXTENSION)
}

fn source_key(root: &Path, path: &Path) -> Result<String, ScriptQueueError> {
    let relative = path.strip_prefix(root).map_err(map_cli_source_scan)?;
    Ok(relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}

#[cfg(test)]
mod source_loader_tests {
    use super::*;
    use crate::cli_test_support::*;

    #[test]
    fn open_rejects_missing_paths_and_plain_files() {
        let missing = temp_path("missing-dir");
        let missing_err = ScriptProject::open(missing.to_string_lossy().as_ref())
            .expect_err("missing path should fail");
        assert_eq!(missing_err.code, "CLI_SOURCE_NOT_FOUND");

        let file_path = temp_path("plain-file");
        write_file(&file_path, "x");
        let file_err = ScriptProject::open(file_path.to_string_lossy().as_ref())
            .expect_err("file path should fail");
        assert_eq!(file_err.code, "CLI_SOURCE_NOT_DIR");
    }

    #[test]
    fn scan_keys_sources_by_relative_path() {
        let root = scripts_dir(
            "scripts-dir",
            &[
                ("main.qs", "main:\n  script:\n  - narrate hi\n"),
                ("nested/helper.qs", "helper:\n  script:\n  - narrate help\n"),
                ("notes.txt", "ignored"),
                ("nested/draft.qs.bak", "ignored"),
            ],
        );

        let project = ScriptProject::open(root.to_string_lossy().as_ref()).expect("project");
        assert_eq!(project.root, root);
        assert_eq!(project.file_count(), 2);
        assert_eq!(
            project.sources.keys().cloned().collect::<Vec<_>>(),
            vec!["main.qs".to_string(), "nested/helper.qs".to_string()]
        );
        assert!(project.sources["main.qs"].contains("narrate hi"));
    }

    #[test]
    fn scan_skips_hidden_files_and_directories() {
        let root = scripts_dir(
            "hidden-entries",
            &[
                ("main.qs", "main:\n  script:\n  - narrate hi\n"),
                (".backup/main.qs", "main:\n  script:\n  - narrate stale\n"),
                (".scratch.qs", "scratch:\n  script:\n  - narrate nope\n"),
            ],
        );

        let project = ScriptProject::scan(root).expect("project");
        assert_eq!(
            project.sources.keys().cloned().collect::<Vec<_>>(),
            vec!["main.qs".to_string()]
        );
        assert!(!project.sources["main.qs"].contains("stale"));
    }

    #[test]
    fn scan_rejects_projects_without_sources() {
        let root = scripts_dir("empty-dir", &[("readme.md", "nothing here")]);
        let error = ScriptProject::scan(root).expect_err("no sources");
        assert_eq!(error.code, "CLI_SOURCE_EMPTY");
    }
}
