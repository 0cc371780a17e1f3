//! Reference map stage and reducers used by the `watchreduce` binary.
//!
//! `MirrorMapper` copies each changed input file into the output directory;
//! the reducers summarise the output directory into JSON reports.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;
use walkdir::WalkDir;

use crate::reduce::{ReduceContext, Reducer};
use crate::stage::{MapContext, MapStage};
use crate::watcher::{ChangeKind, LogicalEvent};

/// Mirrors input entries into the output directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct MirrorMapper;

impl MapStage for MirrorMapper {
    fn map(&mut self, event: &LogicalEvent, ctx: &MapContext<'_>) -> anyhow::Result<()> {
        let source = ctx.input_dir().join(&event.name);
        let target = ctx.output_dir().join(&event.name);

        match event.kind {
            ChangeKind::Deleted => {
                if target.is_file() {
                    fs::remove_file(&target)
                        .with_context(|| format!("removing {}", target.display()))?;
                }
            }
            ChangeKind::Created | ChangeKind::Modified => {
                if !source.is_file() {
                    crate::debug_event!("mirror", "skipped", "{} is not a file", source.display());
                    return Ok(());
                }
                fs::copy(&source, &target).with_context(|| {
                    format!("copying {} to {}", source.display(), target.display())
                })?;
            }
        }
        Ok(())
    }
}

fn files_in(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).follow_links(false).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walking {}", dir.display()))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn relative_name(base: &Path, path: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

fn write_report(dir: &Path, file: &str, report: &impl Serialize) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(file);
    let json = serde_json::to_string_pretty(report)?;
    fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

#[derive(Debug, Serialize)]
struct InventoryEntry {
    name: String,
    bytes: u64,
}

#[derive(Debug, Serialize)]
struct Inventory {
    files: Vec<InventoryEntry>,
    total_bytes: u64,
}

/// Writes `inventory.json`: every file in the map output with its size.
#[derive(Debug, Clone)]
pub struct InventoryReducer {
    report_dir: PathBuf,
}

impl InventoryReducer {
    pub fn new(report_dir: impl Into<PathBuf>) -> Self {
        Self {
            report_dir: report_dir.into(),
        }
    }
}

impl Reducer for InventoryReducer {
    fn name(&self) -> &str {
        "inventory"
    }

    fn reduce(&self, ctx: &mut ReduceContext) -> anyhow::Result<()> {
        let mut files = Vec::new();
        for path in files_in(ctx.input())? {
            let bytes = fs::metadata(&path)
                .with_context(|| format!("reading metadata of {}", path.display()))?
                .len();
            files.push(InventoryEntry {
                name: relative_name(ctx.input(), &path),
                bytes,
            });
        }
        let total_bytes = files.iter().map(|f| f.bytes).sum();
        let path = write_report(&self.report_dir, "inventory.json", &Inventory { files, total_bytes })?;
        crate::debug_event!("inventory", "written", "{}", path.display());
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct LineCounts {
    files: Vec<(String, usize)>,
    total_lines: usize,
    /// Files that are not valid UTF-8.
    skipped: Vec<String>,
}

/// Writes `lines.json`: line counts of every UTF-8 file in the map output.
#[derive(Debug, Clone)]
pub struct LineCountReducer {
    report_dir: PathBuf,
}

impl LineCountReducer {
    pub fn new(report_dir: impl Into<PathBuf>) -> Self {
        Self {
            report_dir: report_dir.into(),
        }
    }
}

impl Reducer for LineCountReducer {
    fn name(&self) -> &str {
        "line-count"
    }

    fn reduce(&self, ctx: &mut ReduceContext) -> anyhow::Result<()> {
        let mut counts = LineCounts {
            files: Vec::new(),
            total_lines: 0,
            skipped: Vec::new(),
        };
        for path in files_in(ctx.input())? {
            let name = relative_name(ctx.input(), &path);
            let bytes = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
            match String::from_utf8(bytes) {
                Ok(text) => {
                    let lines = text.lines().count();
                    counts.total_lines += lines;
                    counts.files.push((name, lines));
                }
                Err(_) => counts.skipped.push(name),
            }
        }
        write_report(&self.report_dir, "lines.json", &counts)?;
        Ok(())
    }
}
