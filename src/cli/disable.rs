//! Disable repowiki for a repository.

use tracing::info;

use crate::cli::hooks;
use crate::config::Config;
use crate::error::Error;
use crate::git::GitProvider;

/// Run the disable command.
pub fn run() -> Result<(), Error> {
    let git = super::current_repo()?;
    if disable(&git)? {
        println!("repowiki disabled. The post-commit hook was removed.");
    } else {
        println!("repowiki disabled.");
    }
    println!("Run 'repowiki enable' to turn it back on.");
    Ok(())
}

/// Remove the hook and mark the config disabled. Returns whether a hook was removed.
///
/// Generated wiki content and the config file are left in place.
pub fn disable(git: &dyn GitProvider) -> Result<bool, Error> {
    let root = git.root();
    let removed = hooks::uninstall(&git.hooks_dir()?)?;

    match Config::load(root) {
        Ok(mut config) => {
            config.enabled = false;
            config.save(root)?;
            info!("Marked config disabled");
        }
        Err(Error::ConfigNotFound(_)) => {}
        Err(e) => return Err(e),
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::enable::{enable, EnableOptions};
    use crate::git::test_support::make_git_repo;
    use crate::git::GitCli;
    use std::path::Path;

    #[test]
    fn test_disable_after_enable() {
        let repo = make_git_repo();
        let git = GitCli::at(repo.path());
        enable(&git, &EnableOptions::default(), Path::new("/bin/repowiki")).unwrap();

        assert!(disable(&git).unwrap());
        assert!(!hooks::is_installed(&git.hooks_dir().unwrap()));
        assert!(!Config::load(repo.path()).unwrap().enabled);

        // Second disable is harmless.
        assert!(!disable(&git).unwrap());
    }

    #[test]
    fn test_disable_without_config() {
        let repo = make_git_repo();
        let git = GitCli::at(repo.path());
        assert!(!disable(&git).unwrap());
        assert!(!Config::path(repo.path()).exists());
    }
}
