//! Canonical form of a unified diff, for comparing a local change with the
//! diff that was reviewed.
//!
//! [`parse`] splits diff text into per-file changes; [`normalize`] sorts them
//! by path and renders them back as a git-style patch without `index` lines
//! or hunk section headings. [`NormalizeOptions`] can additionally hide
//! differences that come from rebasing: hunk positions, context lines, and
//! whether git reported a copy or a rename.

use std::fmt::Write as _;

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// One hunk of a file change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hunk {
    /// First line in the old file.
    pub old_start: u64,
    /// Lines taken from the old file.
    pub old_len: u64,
    /// First line in the new file.
    pub new_start: u64,
    /// Lines in the new file.
    pub new_len: u64,
    /// Body lines, each starting with ` `, `+`, `-`, or `\`.
    pub lines: Vec<String>,
}

/// The change to one file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileChange {
    /// Path before the change; `None` for an added file.
    pub old_path: Option<String>,
    /// Path after the change; `None` for a deleted file.
    pub new_path: Option<String>,
    /// Extended header lines (`new file mode`, `rename from`, binary
    /// markers, ...), `index` lines excluded.
    pub meta: Vec<String>,
    /// Text hunks.
    pub hunks: Vec<Hunk>,
}

impl FileChange {
    /// The path the change is sorted by.
    #[must_use]
    pub fn path(&self) -> &str {
        self.new_path
            .as_deref()
            .or(self.old_path.as_deref())
            .unwrap_or_default()
    }
}

/// Extra normalization on top of the canonical rendering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Replace every hunk header with `@@ omitted-line-number @@`.
    pub collapse_line_numbers: bool,
    /// Drop context lines.
    pub strip_context: bool,
    /// Render `copy ...` and `rename ...` headers as `copy-or-rename ...`.
    pub fold_copy_rename: bool,
}

impl NormalizeOptions {
    /// Every option on: what `arcland compare` uses by default.
    #[must_use]
    pub const fn tolerant() -> Self {
        Self {
            collapse_line_numbers: true,
            strip_context: true,
            fold_copy_rename: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

fn strip_side(path: &str, side: &str) -> Option<String> {
    let path = path.split('\t').next().unwrap_or(path).trim_end();
    if path == "/dev/null" {
        return None;
    }
    Some(path.strip_prefix(side).unwrap_or(path).to_owned())
}

/// Paths from `diff --git a/X b/Y`. Ambiguous with spaces; `---`/`+++`
/// override when present.
fn git_header_paths(rest: &str) -> (Option<String>, Option<String>) {
    let rest = rest.trim_end();
    if let Some(old) = rest.strip_prefix("a/") {
        let len = old.len();
        if len > 3 && len % 2 == 1 {
            let half = (len - 3) / 2;
            if old.get(half..half + 3) == Some(" b/") {
                let (a, b) = (&old[..half], &old[half + 3..]);
                return (Some(a.to_owned()), Some(b.to_owned()));
            }
        }
        if let Some((a, b)) = old.rsplit_once(" b/") {
            return (Some(a.to_owned()), Some(b.to_owned()));
        }
    }
    (None, None)
}

fn parse_range(range: &str) -> Option<(u64, u64)> {
    match range.split_once(',') {
        Some((start, len)) => Some((start.parse().ok()?, len.parse().ok()?)),
        None => Some((range.parse().ok()?, 1)),
    }
}

fn parse_hunk_header(line: &str) -> Option<Hunk> {
    let rest = line.strip_prefix("@@ ")?;
    let (ranges, _) = rest.split_once(" @@")?;
    let (old, new) = ranges.split_once(' ')?;
    let (old_start, old_len) = parse_range(old.strip_prefix('-')?)?;
    let (new_start, new_len) = parse_range(new.strip_prefix('+')?)?;
    Some(Hunk {
        old_start,
        old_len,
        new_start,
        new_len,
        lines: Vec::new(),
    })
}

fn is_file_start(line: &str, git_style: bool) -> bool {
    if git_style {
        line.starts_with("diff --git ")
    } else {
        line.starts_with("--- ")
    }
}

/// Split unified-diff text into file changes, in input order.
#[must_use]
pub fn parse(text: &str) -> Vec<FileChange> {
    let lines: Vec<&str> = text.lines().collect();
    let git_style = lines.iter().any(|l| l.starts_with("diff --git "));

    let mut files = Vec::new();
    let mut i = 0;
    while i < lines.len() && !is_file_start(lines[i], git_style) {
        i += 1;
    }

    while i < lines.len() {
        let mut file = FileChange::default();
        if let Some(rest) = lines[i].strip_prefix("diff --git ") {
            (file.old_path, file.new_path) = git_header_paths(rest);
            i += 1;
        }

        // Extended headers and ---/+++.
        while i < lines.len() && !lines[i].starts_with("@@ ") {
            let line = lines[i];
            if git_style && line.starts_with("diff --git ") {
                break;
            }
            if let Some(old) = line.strip_prefix("--- ") {
                if !git_style && file.old_path.is_some() {
                    break;
                }
                file.old_path = strip_side(old, "a/");
            } else if let Some(new) = line.strip_prefix("+++ ") {
                file.new_path = strip_side(new, "b/");
            } else if !line.starts_with("index ") && !line.is_empty() {
                file.meta.push(line.to_owned());
            }
            i += 1;
        }

        // Hunks, consumed by their declared line counts.
        while i < lines.len() {
            let Some(mut hunk) = parse_hunk_header(lines[i]) else {
                break;
            };
            i += 1;
            let (mut old_left, mut new_left) = (hunk.old_len, hunk.new_len);
            while i < lines.len() && (old_left > 0 || new_left > 0) {
                let line = lines[i];
                match line.as_bytes().first() {
                    Some(b'+') => new_left = new_left.saturating_sub(1),
                    Some(b'-') => old_left = old_left.saturating_sub(1),
                    Some(b'\\') => {}
                    Some(b' ') | None => {
                        old_left = old_left.saturating_sub(1);
                        new_left = new_left.saturating_sub(1);
                    }
                    Some(_) => break,
                }
                hunk.lines.push(if line.is_empty() {
                    " ".to_owned()
                } else {
                    line.to_owned()
                });
                i += 1;
            }
            if i < lines.len() && lines[i].starts_with('\\') {
                hunk.lines.push(lines[i].to_owned());
                i += 1;
            }
            file.hunks.push(hunk);
        }

        // Anything left before the next file belongs to this one.
        while i < lines.len() && !is_file_start(lines[i], git_style) {
            if !lines[i].is_empty() {
                file.meta.push(lines[i].to_owned());
            }
            i += 1;
        }
        files.push(file);
    }
    files
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render_file(out: &mut String, file: &FileChange, options: NormalizeOptions) {
    let path = file.path();
    let old = file.old_path.as_deref().unwrap_or(path);
    let new = file.new_path.as_deref().unwrap_or(path);
    let _ = writeln!(out, "diff --git a/{old} b/{new}");
    for meta in &file.meta {
        let folded = if options.fold_copy_rename {
            meta.strip_prefix("copy")
                .or_else(|| meta.strip_prefix("rename"))
                .map(|rest| format!("copy-or-rename{rest}"))
        } else {
            None
        };
        let _ = writeln!(out, "{}", folded.as_deref().unwrap_or(meta));
    }
    if !file.hunks.is_empty() {
        let side = |p: &Option<String>, prefix: &str| {
            p.as_ref()
                .map_or_else(|| "/dev/null".to_owned(), |p| format!("{prefix}{p}"))
        };
        let _ = writeln!(out, "--- {}", side(&file.old_path, "a/"));
        let _ = writeln!(out, "+++ {}", side(&file.new_path, "b/"));
    }
    for hunk in &file.hunks {
        if options.collapse_line_numbers {
            out.push_str("@@ omitted-line-number @@\n");
        } else {
            let _ = writeln!(
                out,
                "@@ -{},{} +{},{} @@",
                hunk.old_start, hunk.old_len, hunk.new_start, hunk.new_len
            );
        }
        for line in &hunk.lines {
            if options.strip_context && line.starts_with(' ') {
                continue;
            }
            out.push_str(line);
            out.push('\n');
        }
    }
}

/// Render `text` in canonical form.
#[must_use]
pub fn normalize(text: &str, options: NormalizeOptions) -> String {
    let mut files = parse(text);
    files.sort_by(|a, b| a.path().cmp(b.path()));
    let mut out = String::new();
    for file in &files {
        render_file(&mut out, file, options);
    }
    out
}
