//! Best-effort, line-oriented progress parser for ffmpeg-class stderr output.
//!
//! A pure function per §9's guidance (keep the dynamic-typing-prone parsing
//! isolated and independently testable). Missing or unparseable lines simply
//! yield `None` — per §4.1, stderr parsing is best-effort and must never fail
//! the handle.

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressUpdate {
    /// A `frame=` progress line. The driver treats the first one it sees
    /// per handle as the `FirstFrame` signal and every subsequent one as a
    /// `ProgressTick`.
    Progress { fps: f64, dropped_frames: u64, speed: f64 },
    Warning(String),
    Error(String),
}

/// Parses one line of encoder stderr. Recognizes ffmpeg's
/// `frame=... fps=... size=... time=... bitrate=... speed=...x` progress
/// lines, lines beginning `frame=    1` as the first-frame signal, and lines
/// containing `"Error"`/`"error"` or `"Warning"` as diagnostics.
pub fn parse_stderr_line(line: &str) -> Option<ProgressUpdate> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.starts_with("frame=") {
        let fields = parse_kv_fields(trimmed);
        let frame_num: u64 = fields.get("frame").and_then(|v| v.parse().ok())?;
        let fps: f64 = fields
            .get("fps")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.0);
        let dropped_frames: u64 = fields
            .get("drop")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let speed: f64 = fields
            .get("speed")
            .map(|v| v.trim_end_matches('x'))
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.0);

        let _ = frame_num; // presence already validated the line shape above
        return Some(ProgressUpdate::Progress { fps, dropped_frames, speed });
    }

    let lower = trimmed.to_ascii_lowercase();
    if lower.contains("error") {
        return Some(ProgressUpdate::Error(trimmed.to_string()));
    }
    if lower.contains("warning") {
        return Some(ProgressUpdate::Warning(trimmed.to_string()));
    }

    None
}

/// Parses ffmpeg's `key=value key2=value2` space-separated progress format.
/// Values may themselves contain no spaces (ffmpeg pads fixed-width fields),
/// so a naive whitespace split followed by `=` split is sufficient.
fn parse_kv_fields(line: &str) -> std::collections::HashMap<String, String> {
    let mut fields = std::collections::HashMap::new();
    for token in line.split_whitespace() {
        if let Some((k, v)) = token.split_once('=') {
            if !v.is_empty() {
                fields.insert(k.to_string(), v.to_string());
            }
        }
    }
    fields
}
