//! Managed `.gitignore` block for repowiki's runtime files.
//!
//! Logs and the run lock are local state and must never be committed; the
//! config file is meant to be shared and stays tracked.

use std::fs;
use std::path::Path;

use crate::error::Error;

const BLOCK_START: &str = "# START repowiki runtime files";
const BLOCK_END: &str = "# END repowiki runtime files";

const ENTRIES: &[&str] = &["/.repowiki/logs/", "/.repowiki/run.lock", "/.repowiki/run.lock.*"];

fn managed_block() -> String {
    format!("{}\n{}\n{}", BLOCK_START, ENTRIES.join("\n"), BLOCK_END)
}

/// Create, replace or append the managed block.
pub fn update(path: &Path) -> Result<(), Error> {
    let content = if path.exists() {
        fs::read_to_string(path)?
    } else {
        String::new()
    };

    let new_content = match block_range(&content)? {
        Some((start, end)) => format!("{}{}{}", &content[..start], managed_block(), &content[end..]),
        None if content.trim().is_empty() => format!("{}\n", managed_block()),
        None => format!("{}\n\n{}\n", content.trim_end(), managed_block()),
    };

    fs::write(path, new_content)?;
    Ok(())
}

/// Remove the managed block. Returns whether it was present.
pub fn remove(path: &Path) -> Result<bool, Error> {
    if !path.exists() {
        return Ok(false);
    }

    let content = fs::read_to_string(path)?;
    let Some((start, end)) = block_range(&content)? else {
        return Ok(false);
    };

    let rest = format!("{}\n{}", content[..start].trim_end(), content[end..].trim_start());
    let rest = rest.trim();
    if rest.is_empty() {
        fs::remove_file(path)?;
    } else {
        fs::write(path, format!("{}\n", rest))?;
    }
    Ok(true)
}

/// Byte range covering the block, markers included.
fn block_range(content: &str) -> Result<Option<(usize, usize)>, Error> {
    match (content.find(BLOCK_START), content.find(BLOCK_END)) {
        (Some(start), Some(end)) if end > start => Ok(Some((start, end + BLOCK_END.len()))),
        (Some(_), Some(_)) => Err(Error::other("gitignore block markers are in wrong order")),
        _ => Ok(None),
    }
}
