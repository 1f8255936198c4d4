//! Engine instructions for full and incremental runs.

use crate::classify::Section;
use crate::config::DocsConfig;

/// Rules shared by both prompts.
fn constraints(docs: &DocsConfig) -> String {
    format!(
        r#"## Formatting Rules

- Each wiki page starts with an H1 title
- Include a `<cite>` block listing all source files referenced
- Include a Table of Contents after the cite block
- Use mermaid diagrams for architecture documentation
- Reference code with `file://path/to/file` format in cite blocks
- Write in language: {language}

## Constraints

- Do NOT modify any source code files
- Only create or modify files within `{root}/`
- Do NOT run git commands that change the repository (commit, reset, checkout)"#,
        language = docs.language,
        root = docs.path.trim_end_matches('/'),
    )
}

/// Instruction for regenerating the whole wiki.
pub fn full(docs: &DocsConfig) -> String {
    let root = docs.path.trim_end_matches('/');
    format!(
        r#"You are a technical documentation specialist. Generate a complete repository wiki for this codebase.

## Instructions

1. Explore the repository structure and read the main source files
2. Identify the major modules, services and data flows
3. Write wiki pages under `{root}/{language}/content/`, one page per major topic, grouped in folders by area
4. Start with an overview page describing purpose, architecture and how the pieces fit together
5. Replace pages that no longer match the code; remove pages for code that no longer exists
6. Write `{root}/{language}/meta/repowiki-metadata.json` listing each page and the source files it covers

{constraints}
"#,
        root = root,
        language = docs.language,
        constraints = constraints(docs),
    )
}

/// Instruction for updating the sections touched by a set of changed files.
pub fn incremental(docs: &DocsConfig, changed_paths: &[String], sections: &[Section]) -> String {
    let root = docs.path.trim_end_matches('/');
    let files = changed_paths
        .iter()
        .map(|p| format!("- `{p}`"))
        .collect::<Vec<_>>()
        .join("\n");
    let areas = sections
        .iter()
        .map(|s| format!("- {s}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are a technical documentation specialist. Update the repository wiki in `{root}/` to reflect recent code changes.

## Changed Files

{files}

## Affected Sections

{areas}

## Instructions

1. Read the changed source files to understand what was modified
2. Read the existing wiki pages in `{root}/{language}/content/` for the affected sections
3. Update any wiki pages that reference or document the changed code
4. If new modules or features were added without wiki coverage, create new pages
5. Leave pages for unaffected sections untouched
6. Update `{root}/{language}/meta/repowiki-metadata.json` with new code references

{constraints}
"#,
        root = root,
        files = files,
        areas = areas,
        language = docs.language,
        constraints = constraints(docs),
    )
}
