//! Post-commit hook installation.
//!
//! The hook starts `repowiki update --from-hook` in the background so that
//! `git commit` returns immediately. An existing hook is kept and our lines
//! are appended to it.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::Error;

/// Hook file name.
pub const HOOK_NAME: &str = "post-commit";

/// Marker identifying our lines inside a hook file.
const MARKER: &str = "# repowiki";

/// Lines appended to (or forming) the post-commit hook.
fn hook_section(binary: &Path) -> String {
    format!(
        "{MARKER}: auto-update wiki after each commit\n\
         \"{}\" update --from-hook >/dev/null 2>&1 &  {MARKER}\n",
        binary.display()
    )
}

pub fn hook_path(hooks_dir: &Path) -> PathBuf {
    hooks_dir.join(HOOK_NAME)
}

/// Check if the repowiki hook is present.
pub fn is_installed(hooks_dir: &Path) -> bool {
    fs::read_to_string(hook_path(hooks_dir))
        .map(|content| content.contains(MARKER))
        .unwrap_or(false)
}

/// Install the post-commit hook, preserving any existing hook.
///
/// With `force`, a previously installed repowiki section is replaced
/// (useful after the binary moved).
pub fn install(hooks_dir: &Path, binary: &Path, force: bool) -> Result<(), Error> {
    fs::create_dir_all(hooks_dir)?;
    let path = hook_path(hooks_dir);

    let existing = if path.exists() {
        fs::read_to_string(&path)?
    } else {
        String::new()
    };

    let base = if existing.contains(MARKER) {
        if !force {
            info!(path = %path.display(), "Hook already installed");
            return Ok(());
        }
        remove_section(&existing)
    } else {
        existing
    };

    let content = if base.trim().is_empty() {
        format!("#!/bin/sh\n{}", hook_section(binary))
    } else {
        format!("{}\n\n{}", base.trim_end(), hook_section(binary))
    };

    fs::write(&path, content)?;
    make_executable(&path)?;
    info!(path = %path.display(), "Installed post-commit hook");
    Ok(())
}

/// Remove our lines; delete the file if nothing else remains.
///
/// Returns whether anything was removed.
pub fn uninstall(hooks_dir: &Path) -> Result<bool, Error> {
    let path = hook_path(hooks_dir);
    if !path.exists() {
        return Ok(false);
    }

    let content = fs::read_to_string(&path)?;
    if !content.contains(MARKER) {
        return Ok(false);
    }

    let cleaned = remove_section(&content);
    if cleaned.trim().is_empty() || cleaned.trim() == "#!/bin/sh" {
        fs::remove_file(&path)?;
    } else {
        fs::write(&path, format!("{}\n", cleaned.trim_end()))?;
    }
    info!(path = %path.display(), "Removed post-commit hook");
    Ok(true)
}

fn remove_section(content: &str) -> String {
    content
        .lines()
        .filter(|line| !line.contains(MARKER))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<(), Error> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<(), Error> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_install_fresh_hook() {
        let dir = TempDir::new().unwrap();
        let hooks = dir.path().join("hooks");

        install(&hooks, Path::new("/usr/local/bin/repowiki"), false).unwrap();
        assert!(is_installed(&hooks));

        let content = fs::read_to_string(hook_path(&hooks)).unwrap();
        assert!(content.starts_with("#!/bin/sh\n"));
        assert!(content.contains("\"/usr/local/bin/repowiki\" update --from-hook"));
        assert!(content.contains(" &"));
    }

    #[test]
    fn test_install_appends_and_uninstall_keeps_user_lines() {
        let dir = TempDir::new().unwrap();
        let hooks = dir.path().to_path_buf();
        fs::write(hook_path(&hooks), "#!/bin/sh\necho committed\n").unwrap();

        install(&hooks, Path::new("/bin/repowiki"), false).unwrap();
        let content = fs::read_to_string(hook_path(&hooks)).unwrap();
        assert!(content.contains("echo committed"));
        assert!(content.contains("update --from-hook"));

        assert!(uninstall(&hooks).unwrap());
        let content = fs::read_to_string(hook_path(&hooks)).unwrap();
        assert_eq!(content, "#!/bin/sh\necho committed\n");
        assert!(!is_installed(&hooks));
    }

    #[test]
    fn test_install_is_idempotent_unless_forced() {
        let dir = TempDir::new().unwrap();
        let hooks = dir.path().to_path_buf();

        install(&hooks, Path::new("/old/repowiki"), false).unwrap();
        install(&hooks, Path::new("/new/repowiki"), false).unwrap();
        let content = fs::read_to_string(hook_path(&hooks)).unwrap();
        assert!(content.contains("/old/repowiki"));
        assert_eq!(content.matches("update --from-hook").count(), 1);

        install(&hooks, Path::new("/new/repowiki"), true).unwrap();
        let content = fs::read_to_string(hook_path(&hooks)).unwrap();
        assert!(!content.contains("/old/repowiki"));
        assert!(content.contains("/new/repowiki"));
        assert_eq!(content.matches("#!/bin/sh").count(), 1);
    }

    #[test]
    fn test_uninstall_removes_own_file() {
        let dir = TempDir::new().unwrap();
        let hooks = dir.path().to_path_buf();

        assert!(!uninstall(&hooks).unwrap());
        install(&hooks, Path::new("/bin/repowiki"), false).unwrap();
        assert!(uninstall(&hooks).unwrap());
        assert!(!hook_path(&hooks).exists());
    }
}
