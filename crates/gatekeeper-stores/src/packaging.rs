//! Extension packaging
//!
//! Zips an extension source directory with maximum deflate compression.
//! Dotfiles are included; dependency, VCS, test and docs directories at the
//! top level of the source are not.

use std::fs::File;
use std::path::{Path, PathBuf};

use gatekeeper_core::{PublishError, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Top-level directories left out of every package
pub const EXCLUDED_DIRS: [&str; 5] = ["node_modules", ".git", "test", "tests", "docs"];

/// `<tmp>/<source dir name>.<extension>`
pub fn default_output(source_dir: &Path, extension: &str) -> PathBuf {
    let stem = source_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "extension".to_string());
    std::env::temp_dir().join(format!("{}.{}", stem, extension))
}

/// Zip `source_dir` into `output`, returning the output path
pub async fn package_directory(source_dir: &Path, output: &Path) -> Result<PathBuf> {
    info!(source = %source_dir.display(), output = %output.display(), "packaging extension");

    let source = source_dir.to_path_buf();
    let target = output.to_path_buf();
    let path = tokio::task::spawn_blocking(move || write_archive(&source, &target))
        .await
        .map_err(|e| PublishError::packaging(format!("Packaging task failed: {}", e)))??;

    debug!(output = %path.display(), "package written");
    Ok(path)
}

fn write_archive(source: &Path, output: &Path) -> Result<PathBuf> {
    if !source.is_dir() {
        return Err(packaging_error(format!(
            "Source directory not found: {}",
            source.display()
        )));
    }

    let excludes = exclude_set()?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(packaging_error)?;
    }

    let file = File::create(output).map_err(packaging_error)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(9));

    let walker = WalkDir::new(source)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_excluded(entry, source, &excludes));

    let mut count = 0usize;
    for entry in walker {
        let entry = entry.map_err(packaging_error)?;
        if !entry.file_type().is_file() || entry.path() == output {
            continue;
        }

        let name = archive_name(source, entry.path());
        zip.start_file(name, options)?;
        let mut input = File::open(entry.path()).map_err(packaging_error)?;
        std::io::copy(&mut input, &mut zip).map_err(packaging_error)?;
        count += 1;
    }

    zip.finish()?;
    debug!(files = count, "archive finished");
    Ok(output.to_path_buf())
}

fn exclude_set() -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for dir in EXCLUDED_DIRS {
        for pattern in [dir.to_string(), format!("{}/**", dir)] {
            builder.add(Glob::new(&pattern).map_err(packaging_error)?);
        }
    }
    builder.build().map_err(packaging_error)
}

fn is_excluded(entry: &DirEntry, source: &Path, excludes: &GlobSet) -> bool {
    excludes.is_match(archive_name(source, entry.path()))
}

/// Relative path with `/` separators
fn archive_name(source: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(source).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn packaging_error(err: impl std::fmt::Display) -> PublishError {
    PublishError::packaging(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatekeeper_core::ErrorKind;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn entries(archive: &Path) -> Vec<String> {
        let file = File::open(archive).unwrap();
        let mut zip = zip::ZipArchive::new(file).unwrap();
        let mut names: Vec<String> = (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_package_excludes_listed_directories() {
        let source = TempDir::new().unwrap();
        write(source.path(), "manifest.json", "{}");
        write(source.path(), ".env.example", "KEY=");
        write(source.path(), "src/background.js", "");
        write(source.path(), "src/test/fixture.js", "");
        write(source.path(), "node_modules/dep/index.js", "");
        write(source.path(), ".git/HEAD", "ref");
        write(source.path(), "test/unit.js", "");
        write(source.path(), "tests/e2e.js", "");
        write(source.path(), "docs/README.md", "");

        let out = TempDir::new().unwrap();
        let archive = out.path().join("ext.zip");
        let path = package_directory(source.path(), &archive).await.unwrap();

        assert_eq!(path, archive);
        assert_eq!(
            entries(&archive),
            vec![
                ".env.example".to_string(),
                "manifest.json".to_string(),
                "src/background.js".to_string(),
                "src/test/fixture.js".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_package_creates_output_parent() {
        let source = TempDir::new().unwrap();
        write(source.path(), "manifest.json", "{}");

        let out = TempDir::new().unwrap();
        let archive = out.path().join("nested").join("dir").join("ext.xpi");
        package_directory(source.path(), &archive).await.unwrap();

        assert!(archive.is_file());
    }

    #[tokio::test]
    async fn test_missing_source_is_packaging_error() {
        let out = TempDir::new().unwrap();
        let err = package_directory(&out.path().join("missing"), &out.path().join("x.zip"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Packaging);
    }

    #[test]
    fn test_default_output() {
        let path = default_output(Path::new("/work/my-extension"), "xpi");
        assert_eq!(path, std::env::temp_dir().join("my-extension.xpi"));
    }
}
