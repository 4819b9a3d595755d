//! Cleanup of raw session transcripts.

use once_cell::sync::Lazy;
use regex::Regex;

// Shell echo and prompt artifacts surrounding the useful output. The
// config-mode bracket injects extra lines at both ends.
const TOP_LINES: usize = 1;
const BOTTOM_LINES: usize = 2;
const CONFIG_EXTRA_TOP: usize = 3;
const CONFIG_EXTRA_BOTTOM: usize = 1;

static COLOR_TRAILER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\x1b\[[0-9;]*m)+$").expect("hardcoded pattern"));

/// Splits a raw transcript into lines, trims trailing color/reset
/// escape sequences, and drops the boilerplate header and footer lines.
///
/// Transcripts shorter than three lines pass through untouched; the
/// trim is a defensive cleanup, not a protocol guarantee, and removal
/// never underflows on short config-mode output.
pub fn normalize(raw: &str, config_mode_used: bool) -> Vec<String> {
    let mut lines: Vec<String> = raw
        .lines()
        .map(|line| COLOR_TRAILER.replace(line, "").into_owned())
        .collect();

    if lines.len() < 3 {
        return lines;
    }

    let (top, bottom) = if config_mode_used {
        (TOP_LINES + CONFIG_EXTRA_TOP, BOTTOM_LINES + CONFIG_EXTRA_BOTTOM)
    } else {
        (TOP_LINES, BOTTOM_LINES)
    };

    let top = top.min(lines.len());
    lines.drain(..top);
    let bottom = bottom.min(lines.len());
    lines.truncate(lines.len() - bottom);
    lines
}
