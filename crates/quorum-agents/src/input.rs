//! Loading input and reference texts from disk.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{bail, Context, Result};
use regex::Regex;

use crate::modes::runner::PipelineInput;

static BLANK_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*\n").expect("BLANK_LINE regex should compile"));

/// Split on blank lines; each paragraph's inner line breaks collapse to spaces.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n");
    BLANK_LINE
        .split(&normalized)
        .map(|block| {
            block
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|p| !p.is_empty())
        .collect()
}

pub fn load_paragraphs(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(split_paragraphs(&raw))
}

/// Parse a `NAME=FILE` reference argument.
pub fn parse_reference_arg(arg: &str) -> Result<(String, PathBuf)> {
    let Some((name, path)) = arg.split_once('=') else {
        bail!("reference must look like NAME=FILE (got {arg:?})");
    };
    let name = name.trim();
    let path = path.trim();
    if name.is_empty() || path.is_empty() {
        bail!("reference must look like NAME=FILE (got {arg:?})");
    }
    Ok((name.to_string(), PathBuf::from(path)))
}

/// Read the input file and every `NAME=FILE` reference.
pub fn load_input(input: &Path, references: &[String]) -> Result<PipelineInput> {
    let mut loaded = PipelineInput::new(load_paragraphs(input)?);
    for arg in references {
        let (name, path) = parse_reference_arg(arg)?;
        let paragraphs = load_paragraphs(&path)
            .with_context(|| format!("Failed to load reference {name}"))?;
        loaded = loaded.with_reference(name, paragraphs);
    }
    Ok(loaded)
}
