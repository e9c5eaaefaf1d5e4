//! Package pages in reStructuredText
//!
//! Every binary package in the package database gets one page with a fixed
//! layout: reference anchor, title, description, package details and the
//! releases the package is available in.

use crate::config::Config;
use crate::pkgdb::{PackageDb, PackageInfo};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Text used for packages without an extended description
pub const NO_DESCRIPTION: &str = "No description available.";

/// Configuration section mapping suite names to release labels
pub const RELEASE_CODENAMES_SECTION: &str = "release codenames";

/// `text` followed by a line of `symbol` of the same length
pub fn underline(text: &str, symbol: char) -> String {
    let rule: String = std::iter::repeat_n(symbol, text.chars().count()).collect();
    format!("{text}\n{rule}\n")
}

/// Page title: `**name** -- synopsis`
pub fn title(name: &str, short_description: Option<&str>) -> String {
    match short_description {
        Some(short) => underline(&format!("**{name}** -- {short}"), '*'),
        None => underline(&format!("**{name}**"), '*'),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Block {
    Paragraph(Vec<String>),
    Items(Vec<String>),
    Literal(Vec<String>),
}

/// Converts Debian extended descriptions to reStructuredText
///
/// Lines consisting of `.` separate paragraphs. Lines starting with `-`,
/// `*`, `+` or `o` followed by blanks are list items; indented lines after an
/// item continue it. Other lines indented deeper than the paragraph text form
/// a literal block. Wrapped lines are joined.
#[derive(Debug, Clone)]
pub struct DescriptionFormatter {
    leading_blanks: Regex,
    item: Regex,
}

impl DescriptionFormatter {
    /// Create a formatter
    pub fn new() -> Result<Self, PageError> {
        Ok(Self {
            leading_blanks: Regex::new(r"^ *")?,
            item: Regex::new(r"^[-*+o] +(\S.*)$")?,
        })
    }

    fn indent(&self, line: &str) -> usize {
        self.leading_blanks.find(line).map_or(0, |m| m.end())
    }

    /// Render description lines; empty input gives [`NO_DESCRIPTION`]
    pub fn to_rst(&self, lines: &[String]) -> String {
        let lines: Vec<String> = lines
            .iter()
            .map(|line| line.replace(r"\t", "    ").trim_end().to_string())
            .collect();
        let common = lines
            .iter()
            .filter(|line| !line.is_empty())
            .map(|line| self.indent(line))
            .min()
            .unwrap_or(0);

        let blocks = self.blocks(lines.iter().map(|line| line.get(common..).unwrap_or("")));
        if blocks.is_empty() {
            return format!("{NO_DESCRIPTION}\n");
        }

        let rendered: Vec<String> = blocks.iter().map(render_block).collect();
        format!("{}\n", rendered.join("\n\n"))
    }

    fn blocks<'l>(&self, lines: impl Iterator<Item = &'l str>) -> Vec<Block> {
        let mut blocks = Vec::new();
        // Whether the last block continues on the next line
        let mut open = false;

        for line in lines {
            let content = line.trim_start();
            if content.is_empty() || content == "." {
                open = false;
                continue;
            }
            let depth = self.indent(line);

            if let Some(captures) = self.item.captures(content) {
                let text = captures[1].to_string();
                match blocks.last_mut() {
                    Some(Block::Items(items)) if open => items.push(text),
                    _ => blocks.push(Block::Items(vec![text])),
                }
                open = true;
                continue;
            }

            match blocks.last_mut() {
                Some(Block::Items(items)) if open && depth > 0 => {
                    if let Some(last) = items.last_mut() {
                        last.push(' ');
                        last.push_str(content);
                    }
                }
                Some(Block::Paragraph(text)) if open && depth == 0 => text.push(content.to_string()),
                Some(Block::Literal(text)) if open && depth > 0 => text.push(line.to_string()),
                _ if depth > 0 => blocks.push(Block::Literal(vec![line.to_string()])),
                _ => blocks.push(Block::Paragraph(vec![content.to_string()])),
            }
            open = true;
        }
        blocks
    }
}

fn render_block(block: &Block) -> String {
    match block {
        Block::Paragraph(lines) => lines.join(" "),
        Block::Items(items) => items
            .iter()
            .map(|item| format!("* {item}"))
            .collect::<Vec<_>>()
            .join("\n"),
        Block::Literal(lines) => {
            let depth = lines
                .iter()
                .map(|line| line.len() - line.trim_start_matches(' ').len())
                .min()
                .unwrap_or(0);
            let body = lines
                .iter()
                .map(|line| format!("    {}", line.get(depth..).unwrap_or(line)))
                .collect::<Vec<_>>()
                .join("\n");
            format!("::\n\n{body}")
        }
    }
}

/// Renders and writes package pages
#[derive(Debug, Clone)]
pub struct PageWriter<'a> {
    config: &'a Config,
    formatter: DescriptionFormatter,
}

impl<'a> PageWriter<'a> {
    /// Create a writer using release labels from `config`
    pub fn new(config: &'a Config) -> Result<Self, PageError> {
        Ok(Self {
            config,
            formatter: DescriptionFormatter::new()?,
        })
    }

    /// Label of a suite, e.g. `bookworm` -> `Debian 12`
    pub fn release_label(&self, suite: &str) -> String {
        self.config
            .get(RELEASE_CODENAMES_SECTION, suite)
            .map(|label| label.as_text())
            .unwrap_or_else(|| suite.to_string())
    }

    /// Page of one package
    pub fn render(&self, package: &PackageInfo<'_>) -> String {
        let mut page = format!(".. _pkg_{}:\n\n", package.name);

        page.push_str(&title(package.name, package.short_description().as_deref()));
        page.push('\n');

        match package.long_description() {
            Some(lines) => page.push_str(&self.formatter.to_rst(&lines)),
            None => {
                page.push_str(NO_DESCRIPTION);
                page.push('\n');
            }
        }

        let details = [
            ("Source package", Some(package.binary.src_name.clone())),
            ("Homepage", package.field("homepage")),
            ("Maintainer", package.field("maintainer")),
        ];
        page.push('\n');
        page.push_str(&underline("Package details", '='));
        page.push('\n');
        for (label, value) in details {
            if let Some(value) = value {
                page.push_str(&format!("* {label}: {value}\n"));
            }
        }

        let availability: BTreeMap<String, String> = package
            .suite_versions()
            .into_iter()
            .map(|(suite, version)| (self.release_label(suite), version))
            .collect();
        if !availability.is_empty() {
            page.push('\n');
            page.push_str(&underline("Availability", '='));
            page.push('\n');
            for (release, version) in availability {
                page.push_str(&format!("* {release}: {version}\n"));
            }
        }

        page
    }

    /// Write `<dest>/<package>.rst` for every binary package in `db`
    pub fn write_all(&self, db: &PackageDb, dest: &Path) -> Result<usize, PageError> {
        std::fs::create_dir_all(dest)
            .map_err(|e| PageError::IoError(dest.to_path_buf(), e.to_string()))?;

        let mut written = 0;
        for package in db.packages() {
            let path = dest.join(format!("{}.rst", package.name));
            debug!("Writing {}", path.display());
            std::fs::write(&path, self.render(&package))
                .map_err(|e| PageError::IoError(path.clone(), e.to_string()))?;
            written += 1;
        }

        info!("Wrote {} package page(s) to {}", written, dest.display());
        Ok(written)
    }
}

/// Page generation error types
#[derive(Debug, thiserror::Error)]
pub enum PageError {
    /// File system I/O error
    #[error("IO error writing {0}: {1}")]
    IoError(PathBuf, String),

    /// Invalid text pattern
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}
