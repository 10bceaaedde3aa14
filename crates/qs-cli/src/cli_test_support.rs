use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub(crate) fn temp_path(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time should be monotonic")
        .as_nanos();
    std::env::temp_dir().join(format!("queuescript-rs-{}-{}", name, nanos))
}

pub(crate) fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("parent should be created");
    }
    fs::write(path, content).expect("file should be written");
}

/// A fresh scripts directory holding `files` (relative path, source).
pub(crate) fn scripts_dir(name: &str, files: &[(&str, &str)]) -> PathBuf {
    let root = temp_path(name);
    fs::create_dir_all(&root).expect("root should be created");
    for (relative, content) in files {
        write_file(&root.join(relative), content);
    }
    root
}
