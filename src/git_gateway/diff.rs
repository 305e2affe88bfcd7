//! Staged-diff parsing, patch application, and line attribution.
//!
//! The absorber works on structured hunks rather than raw patch text: each
//! staged hunk knows the file and the pre-image line range it touches, and
//! can be rendered back into a standalone patch for `git apply`.

use anyhow::{Context, Result};
use std::io::Write;
use std::process::{Command, Stdio};

use crate::errors::StackError;

use super::GitGateway;

/// One hunk of a unified diff.
#[derive(Debug, Clone)]
pub struct DiffHunk {
    pub file: String,
    pub old_start: u32,
    pub old_count: u32,
    pub new_start: u32,
    pub new_count: u32,
    /// Body lines with their leading ' ', '+', '-' or '\' markers.
    pub lines: Vec<String>,
    /// File did not exist in the pre-image (new file).
    pub old_missing: bool,
    /// File does not exist in the post-image (deletion).
    pub new_missing: bool,
}

impl DiffHunk {
    /// Inclusive pre-image line range this hunk touches. A pure insertion
    /// (old_count == 0) anchors to the line it is inserted after and the
    /// one following it, so neighbouring edits are treated as overlapping.
    pub fn old_range(&self) -> (u32, u32) {
        if self.old_count == 0 {
            let anchor = self.old_start.max(1);
            (anchor, anchor + 1)
        } else {
            (self.old_start, self.old_start + self.old_count - 1)
        }
    }

    /// Render this hunk as a complete single-file patch.
    pub fn to_patch(&self) -> String {
        render_patch(&self.file, self.old_missing, self.new_missing, &[self])
    }
}

/// Render a group of hunks of the same file as one patch document.
/// Hunks must be in ascending pre-image order, as parsed.
pub fn render_patch(file: &str, old_missing: bool, new_missing: bool, hunks: &[&DiffHunk]) -> String {
    let mut patch = String::new();
    if old_missing {
        patch.push_str("--- /dev/null\n");
    } else {
        patch.push_str(&format!("--- a/{}\n", file));
    }
    if new_missing {
        patch.push_str("+++ /dev/null\n");
    } else {
        patch.push_str(&format!("+++ b/{}\n", file));
    }
    for hunk in hunks {
        patch.push_str(&format!(
            "@@ -{},{} +{},{} @@\n",
            hunk.old_start, hunk.old_count, hunk.new_start, hunk.new_count
        ));
        for line in &hunk.lines {
            patch.push_str(line);
            patch.push('\n');
        }
    }
    patch
}

/// All hunks currently staged, in file-then-line order.
#[derive(Debug, Clone, Default)]
pub struct StagedDiff {
    pub hunks: Vec<DiffHunk>,
}

impl StagedDiff {
    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }
}

impl GitGateway {
    /// Parse the staged diff into structured hunks.
    pub fn diff_staged_hunks(&self) -> Result<StagedDiff> {
        let text = self.staged_patch_text()?;
        Ok(StagedDiff {
            hunks: parse_unified_diff(&text),
        })
    }

    /// The raw staged patch (`git diff --cached`).
    pub fn staged_patch_text(&self) -> Result<String> {
        let output = self.run_git_checked(&["diff", "--cached"])?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Apply a patch via `git apply`. `update_index` applies to index and
    /// worktree together (`--index`); `reverse` un-applies.
    pub fn apply_patch(&self, patch: &str, reverse: bool, update_index: bool) -> Result<()> {
        let mut args: Vec<&str> = vec!["apply", "--whitespace=nowarn"];
        if update_index {
            args.push("--index");
        }
        if reverse {
            args.push("-R");
        }
        super::verbose_cmd(&args);

        let mut child = Command::new("git")
            .args(&args)
            .current_dir(&self.workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to spawn git apply")?;
        child
            .stdin
            .as_mut()
            .context("Failed to open stdin for git apply")?
            .write_all(patch.as_bytes())?;
        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(StackError::from_git_output("apply", &output).into());
        }
        Ok(())
    }

    /// Commit shas that last touched each line of `file` in the range, as of
    /// `reference`. One entry per line; boundary markers are stripped.
    pub fn blame_range(&self, reference: &str, file: &str, start: u32, end: u32) -> Result<Vec<String>> {
        let range = format!("{},{}", start, end);
        let output = self.run_git(&["blame", "-l", "-s", "-L", &range, reference, "--", file])?;
        if !output.status.success() {
            // The range may fall outside the file as of `reference`
            return Ok(Vec::new());
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .map(|sha| sha.trim_start_matches('^').to_string())
            .collect())
    }
}

/// Parse `git diff` output into hunks. Binary files are skipped.
pub fn parse_unified_diff(text: &str) -> Vec<DiffHunk> {
    let mut hunks = Vec::new();
    let mut file: Option<String> = None;
    let mut old_missing = false;
    let mut new_missing = false;
    let mut current: Option<DiffHunk> = None;

    for line in text.lines() {
        if line.starts_with("diff --git ") {
            if let Some(hunk) = current.take() {
                hunks.push(hunk);
            }
            file = None;
            old_missing = false;
            new_missing = false;
        } else if let Some(path) = line.strip_prefix("--- ") {
            old_missing = path == "/dev/null";
            if !old_missing {
                // Prefer the post-image name; this is the fallback
                if file.is_none() {
                    file = Some(path.trim_start_matches("a/").to_string());
                }
            }
        } else if let Some(path) = line.strip_prefix("+++ ") {
            new_missing = path == "/dev/null";
            if !new_missing {
                file = Some(path.trim_start_matches("b/").to_string());
            }
        } else if line.starts_with("@@ ") {
            if let Some(hunk) = current.take() {
                hunks.push(hunk);
            }
            let Some(name) = file.clone() else { continue };
            if let Some((old_start, old_count, new_start, new_count)) = parse_hunk_header(line) {
                current = Some(DiffHunk {
                    file: name,
                    old_start,
                    old_count,
                    new_start,
                    new_count,
                    lines: Vec::new(),
                    old_missing,
                    new_missing,
                });
            }
        } else if let Some(hunk) = current.as_mut() {
            if line.starts_with(' ') || line.starts_with('+') || line.starts_with('-') || line.starts_with('\\') {
                hunk.lines.push(line.to_string());
            }
        }
    }
    if let Some(hunk) = current.take() {
        hunks.push(hunk);
    }
    hunks
}

/// Parse `@@ -a,b +c,d @@`; omitted counts default to 1.
fn parse_hunk_header(line: &str) -> Option<(u32, u32, u32, u32)> {
    let inner = line.strip_prefix("@@ ")?;
    let end = inner.find(" @@")?;
    let ranges = &inner[..end];
    let mut parts = ranges.split(' ');
    let old = parts.next()?.strip_prefix('-')?;
    let new = parts.next()?.strip_prefix('+')?;

    let parse_range = |s: &str| -> Option<(u32, u32)> {
        match s.split_once(',') {
            Some((start, count)) => Some((start.parse().ok()?, count.parse().ok()?)),
            None => Some((s.parse().ok()?, 1)),
        }
    };

    let (old_start, old_count) = parse_range(old)?;
    let (new_start, new_count) = parse_range(new)?;
    Some((old_start, old_count, new_start, new_count))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
diff --git a/src/lib.rs b/src/lib.rs
index 1111111..2222222 100644
--- a/src/lib.rs
+++ b/src/lib.rs
@@ -3,4 +3,5 @@ mod tests;
 fn one() {}
-fn two() {}
+fn two() { body(); }
+fn three() {}
 fn four() {}
@@ -20,2 +21,2 @@ fn tail() {
-old line
+new line
 context
diff --git a/new.txt b/new.txt
new file mode 100644
index 0000000..3333333
--- /dev/null
+++ b/new.txt
@@ -0,0 +1,2 @@
+hello
+world
";

    #[test]
    fn test_parse_two_files_three_hunks() {
        let hunks = parse_unified_diff(SAMPLE);
        assert_eq!(hunks.len(), 3);

        assert_eq!(hunks[0].file, "src/lib.rs");
        assert_eq!(hunks[0].old_start, 3);
        assert_eq!(hunks[0].old_count, 4);
        assert_eq!(hunks[0].new_count, 5);
        assert_eq!(hunks[0].lines.len(), 6);

        assert_eq!(hunks[1].old_start, 20);
        assert_eq!(hunks[1].old_count, 2);

        assert_eq!(hunks[2].file, "new.txt");
        assert!(hunks[2].old_missing);
        assert_eq!(hunks[2].old_count, 0);
    }

    #[test]
    fn test_hunk_header_without_counts() {
        assert_eq!(parse_hunk_header("@@ -5 +7 @@"), Some((5, 1, 7, 1)));
        assert_eq!(parse_hunk_header("@@ -1,3 +1,4 @@ fn main()"), Some((1, 3, 1, 4)));
        assert_eq!(parse_hunk_header("not a header"), None);
    }

    #[test]
    fn test_old_range_for_insertion_anchors_to_neighbours() {
        let hunks = parse_unified_diff(SAMPLE);
        let insertion = &hunks[2];
        assert_eq!(insertion.old_range(), (1, 2));

        let edit = &hunks[0];
        assert_eq!(edit.old_range(), (3, 6));
    }

    #[test]
    fn test_to_patch_round_trips_header() {
        let hunks = parse_unified_diff(SAMPLE);
        let patch = hunks[1].to_patch();
        assert!(patch.starts_with("--- a/src/lib.rs\n+++ b/src/lib.rs\n@@ -20,2 +21,2 @@"));
        assert!(patch.contains("-old line"));
        assert!(patch.contains("+new line"));
    }

    #[test]
    fn test_binary_diff_produces_no_hunks() {
        let text = "\
diff --git a/img.png b/img.png
index 1111111..2222222 100644
Binary files a/img.png and b/img.png differ
";
        assert!(parse_unified_diff(text).is_empty());
    }
}
