//! Merging regenerated text with hand-edited user code.
//!
//! A user-code region starts at a begin marker, whose remaining line is the
//! region key, and ends at the next end marker:
//!
//! ```text
//! // Start of user code imports
//! import java.util.List;
//! // End of user code
//! ```

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MergeError {
    #[error("user code region opened at line {line} is never closed")]
    Unclosed { line: usize },

    #[error("user code region opened at line {line} contains another begin marker")]
    Nested { line: usize },
}

/// Result of a merge: the text to write and the user code that found no
/// place in it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Merged {
    pub text: String,
    pub lost: String,
}

pub trait Merge: Send + Sync {
    /// Merge `new` (just generated) with `old` (currently at `path`).
    fn merge(&self, path: &str, new: &str, old: &str, begin: &str, end: &str) -> Result<Merged, MergeError>;
}

/// A user-code region found in a text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub key: String,
    /// Byte range of the body inside the text.
    pub body: std::ops::Range<usize>,
    pub line: usize,
}

/// User-code regions of `text`, in order.
pub fn regions(text: &str, begin: &str, end: &str) -> Result<Vec<Region>, MergeError> {
    let mut out = Vec::new();
    let mut pos = 0;
    if begin.is_empty() || end.is_empty() {
        return Ok(out);
    }
    while let Some(found) = text[pos..].find(begin) {
        let start = pos + found;
        let line = text[..start].matches('\n').count() + 1;
        let key_start = start + begin.len();
        let line_end = text[key_start..].find('\n').map_or(text.len(), |i| key_start + i);
        let key = text[key_start..line_end].trim().to_string();
        let body_start = (line_end + 1).min(text.len());

        let close = text[body_start..]
            .find(end)
            .map(|i| body_start + i)
            .ok_or(MergeError::Unclosed { line })?;
        if text[body_start..close].contains(begin) {
            return Err(MergeError::Nested { line });
        }
        // The end marker sits on its own line: the body stops before it.
        let body_end = text[body_start..close]
            .rfind('\n')
            .map_or(body_start, |i| body_start + i + 1);
        out.push(Region {
            key,
            body: body_start..body_end.max(body_start),
            line,
        });
        pos = close + end.len();
    }
    Ok(out)
}

fn lost_entry(begin: &str, end: &str, key: &str, body: &str) -> String {
    format!("{begin} {key}\n{body}{end}\n")
}

/// Overwrites the file; every non-blank old region is reported lost.
#[derive(Debug, Default, Clone, Copy)]
pub struct OverwriteMerge;

impl Merge for OverwriteMerge {
    fn merge(&self, _path: &str, new: &str, old: &str, begin: &str, end: &str) -> Result<Merged, MergeError> {
        let lost = regions(old, begin, end)?
            .into_iter()
            .filter(|region| !old[region.body.clone()].trim().is_empty())
            .map(|region| lost_entry(begin, end, &region.key, &old[region.body.clone()]))
            .collect();
        Ok(Merged {
            text: new.to_string(),
            lost,
        })
    }
}

/// Carries each old region into the new region with the same key.
#[derive(Debug, Default, Clone, Copy)]
pub struct UserCodeMerge;

impl Merge for UserCodeMerge {
    fn merge(&self, _path: &str, new: &str, old: &str, begin: &str, end: &str) -> Result<Merged, MergeError> {
        let old_regions = regions(old, begin, end)?;
        let new_regions = regions(new, begin, end)?;
        let mut used = vec![false; old_regions.len()];

        let mut text = String::with_capacity(new.len());
        let mut pos = 0;
        for region in &new_regions {
            let matching = old_regions
                .iter()
                .enumerate()
                .find(|(index, old_region)| !used[*index] && old_region.key == region.key);
            text.push_str(&new[pos..region.body.start]);
            match matching {
                Some((index, old_region)) => {
                    used[index] = true;
                    text.push_str(&old[old_region.body.clone()]);
                }
                None => text.push_str(&new[region.body.clone()]),
            }
            pos = region.body.end;
        }
        text.push_str(&new[pos..]);

        let lost = old_regions
            .iter()
            .zip(&used)
            .filter(|(region, used)| !**used && !old[region.body.clone()].trim().is_empty())
            .map(|(region, _)| lost_entry(begin, end, &region.key, &old[region.body.clone()]))
            .collect();
        Ok(Merged { text, lost })
    }
}
