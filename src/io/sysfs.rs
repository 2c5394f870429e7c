//! Portable filesystem and archive helpers.
//!
//! The platform-dependent capability set {quote, copy, move, delete, link}
//! sits behind the [`Platform`] trait; [`host()`] selects the implementation
//! at construction. Archive handling covers the `.dist`/`.zip` containers
//! dists travel in.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;

use crate::DIST_INFO;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

pub trait Platform {
    /// Quote one argument for the platform shell.
    fn quote(&self, arg: &str) -> String;

    /// Copy a file or a directory tree.
    fn copy(&self, src: &Path, dst: &Path) -> io::Result<()>;

    /// Move a file or directory, copying across devices when rename fails.
    fn rename(&self, src: &Path, dst: &Path) -> io::Result<()>;

    /// Delete a file or directory tree. A missing path is not an error.
    fn delete(&self, path: &Path) -> io::Result<()>;

    /// Make `link` refer to `target`.
    fn link(&self, target: &Path, link: &Path) -> io::Result<()>;
}

pub struct Posix;

/// Windows keeps the same interface but quotes for `cmd` and materializes
/// links as copies, since symlink creation needs elevated rights there.
pub struct WindowsFs;

impl Platform for Posix {
    fn quote(&self, arg: &str) -> String {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }

    fn copy(&self, src: &Path, dst: &Path) -> io::Result<()> {
        copy_all(src, dst)
    }

    fn rename(&self, src: &Path, dst: &Path) -> io::Result<()> {
        move_path(self, src, dst)
    }

    fn delete(&self, path: &Path) -> io::Result<()> {
        delete_path(path)
    }

    fn link(&self, target: &Path, link: &Path) -> io::Result<()> {
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(target, link)
        }
        #[cfg(not(unix))]
        {
            copy_all(target, link)
        }
    }
}

impl Platform for WindowsFs {
    fn quote(&self, arg: &str) -> String {
        format!("\"{}\"", arg.replace('"', "\\\""))
    }

    fn copy(&self, src: &Path, dst: &Path) -> io::Result<()> {
        copy_all(src, dst)
    }

    fn rename(&self, src: &Path, dst: &Path) -> io::Result<()> {
        move_path(self, src, dst)
    }

    fn delete(&self, path: &Path) -> io::Result<()> {
        delete_path(path)
    }

    fn link(&self, target: &Path, link: &Path) -> io::Result<()> {
        // target is relative to the link's parent directory
        let resolved = match link.parent() {
            Some(parent) if target.is_relative() => parent.join(target),
            _ => target.to_path_buf(),
        };
        copy_all(&resolved, link)
    }
}

/// The capability set for the running platform.
pub fn host() -> &'static dyn Platform {
    if cfg!(windows) {
        &WindowsFs
    } else {
        &Posix
    }
}

fn move_path(platform: &dyn Platform, src: &Path, dst: &Path) -> io::Result<()> {
    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }
    platform.copy(src, dst)?;
    platform.delete(src)
}

fn delete_path(path: &Path) -> io::Result<()> {
    let Ok(meta) = fs::symlink_metadata(path) else {
        return Ok(());
    };
    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Recursively copy a file or directory.
pub fn copy_all(src: &Path, dst: &Path) -> io::Result<()> {
    if src.is_dir() {
        fs::create_dir_all(dst)?;
        for entry in fs::read_dir(src)? {
            let entry = entry?;
            copy_all(&entry.path(), &dst.join(entry.file_name()))?;
        }
        Ok(())
    } else {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(src, dst).map(|_| ())
    }
}

/// List a directory tree in traversal order (parents before children),
/// paths relative to `root`.
pub fn list_recursive(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(io::Error::other)?;
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(io::Error::other)?
            .to_path_buf();
        paths.push(rel);
    }
    Ok(paths)
}

/// Run one shell command line inside `dir`.
pub fn exec_in(dir: &Path, command: &str) -> io::Result<()> {
    debug!("exec in {}: {command}", dir.display());
    let status = if cfg!(windows) {
        Command::new("cmd").args(["/C", command]).current_dir(dir).status()?
    } else {
        Command::new("sh").args(["-c", command]).current_dir(dir).status()?
    };
    if status.success() {
        Ok(())
    } else {
        Err(io::Error::other(format!("`{command}` exited with {status}")))
    }
}

// ---------------------------------------------------------------------------
// Archives

/// Probe an archive for its `<top>/dist.info` member and return the text.
pub fn archive_info(archive: &Path) -> Result<Option<String>, ArchiveError> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)?;
    for i in 0..zip.len() {
        let mut member = zip.by_index(i)?;
        let name = member.name().to_string();
        if name.ends_with(&format!("/{DIST_INFO}")) && name.matches('/').count() == 1 {
            let mut text = String::new();
            member.read_to_string(&mut text)?;
            return Ok(Some(text));
        }
    }
    Ok(None)
}

/// Extract an archive into `dest`.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<(), ArchiveError> {
    fs::create_dir_all(dest)?;
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)?;
    zip.extract(dest)?;
    Ok(())
}

/// Scratch files that never belong in a redistributable archive.
fn is_scratch(name: &str) -> bool {
    name.starts_with(".git")
        || name.starts_with(".svn")
        || name.ends_with('~')
        || name.starts_with(".DS_Store")
}

/// Create an archive of `src_dir`, stored under its own directory name,
/// excluding VCS and OS scratch files.
pub fn create_archive(archive: &Path, src_dir: &Path) -> Result<(), ArchiveError> {
    let top = src_dir
        .file_name()
        .ok_or_else(|| io::Error::other("archive source has no name"))?
        .to_string_lossy()
        .into_owned();

    let file = File::create(archive)?;
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    let walker = WalkDir::new(src_dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_scratch(&e.file_name().to_string_lossy()));
    for entry in walker {
        let entry = entry.map_err(io::Error::other)?;
        let rel = entry
            .path()
            .strip_prefix(src_dir)
            .map_err(io::Error::other)?;
        let mut name = format!("{top}/{}", slashed(rel));
        if entry.file_type().is_dir() {
            name.push('/');
            zip.add_directory(name, options)?;
        } else {
            zip.start_file(name, options)?;
            let mut src = File::open(entry.path())?;
            io::copy(&mut src, &mut zip)?;
        }
    }
    zip.finish()?;
    Ok(())
}

/// Render a relative path with forward slashes.
pub fn slashed(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
