//! Print the most recent run log.

use crate::error::Error;
use crate::git::GitProvider;
use crate::runlog::RunLog;

pub fn run() -> Result<(), Error> {
    let git = super::current_repo()?;
    match RunLog::new(git.root()).latest()? {
        Some((name, content)) => print!("=== {} ===\n{}", name, content),
        None => println!("No logs yet."),
    }
    Ok(())
}
