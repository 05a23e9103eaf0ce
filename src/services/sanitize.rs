//! Display-safe titles and filenames from untrusted names.

use std::path::Path;

use uuid::Uuid;

/// Used when a title sanitizes to nothing.
pub const FALLBACK_TITLE: &str = "audio";

/// Used when an uploaded filename sanitizes to nothing.
pub const FALLBACK_FILENAME: &str = "upload.mp4";

/// Display title used when the source name looks like an opaque identifier.
pub const OPAQUE_DISPLAY_TITLE: &str = "Converted audio";

/// Names with no spaces and at least this many characters are treated as
/// machine-generated ids rather than human titles.
pub const OPAQUE_NAME_MIN_CHARS: usize = 24;

const DISPLAY_TITLE_MAX_CHARS: usize = 48;
const FILENAME_BASE_MAX_CHARS: usize = 40;
const SUFFIX_LEN: usize = 6;
const TITLE_EXTRA_CHARS: &[char] = &[' ', '.', '(', ')', '[', ']', '\'', '’'];
const FILENAME_EXTRA_CHARS: &[char] = &['_', '-', '.', ' '];

/// Output names chosen for a converted track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputNames {
    pub display_title: String,
    pub output_filename: String,
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Clean a title for display, capped at `max_len` characters.
///
/// Input with nothing usable left yields [`FALLBACK_TITLE`] whole, even when
/// `max_len` is shorter than it; idempotent for `max_len >= FALLBACK_TITLE.len()`.
pub fn sanitize_title(raw: &str, max_len: usize) -> String {
    let spaced: String = raw
        .trim()
        .chars()
        .map(|c| if c == '_' || c == '-' { ' ' } else { c })
        .collect();
    let filtered: String = collapse_whitespace(&spaced)
        .chars()
        .filter(|c| c.is_alphanumeric() || TITLE_EXTRA_CHARS.contains(c))
        .collect();
    let collapsed = collapse_whitespace(&filtered);
    let truncated: String = collapsed.chars().take(max_len).collect();
    let cleaned = truncated.trim_end();

    if cleaned.is_empty() {
        FALLBACK_TITLE.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Make an untrusted filename safe to embed in a local path.
pub fn safe_filename(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .filter(|c| c.is_alphanumeric() || FILENAME_EXTRA_CHARS.contains(c))
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Strip the extension from an uploaded filename ("clip.final.mp4" -> "clip.final").
pub fn upload_stem(filename: &str) -> String {
    let safe = safe_filename(filename);
    Path::new(&safe)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(&safe)
        .to_string()
}

fn random_suffix() -> String {
    Uuid::new_v4().simple().to_string()[..SUFFIX_LEN].to_string()
}

/// Choose a display title and a download filename for a track.
///
/// A random suffix is always appended to the filename so clients never show a
/// cached preview from an earlier conversion with the same name.
pub fn derive_output_names(name_or_title: &str) -> OutputNames {
    let base = sanitize_title(name_or_title, usize::MAX);
    let suffix = random_suffix();

    if !base.contains(' ') && base.chars().count() >= OPAQUE_NAME_MIN_CHARS {
        return OutputNames {
            display_title: OPAQUE_DISPLAY_TITLE.to_string(),
            output_filename: format!("audio_{suffix}.mp3"),
        };
    }

    let display_title = sanitize_title(&base, DISPLAY_TITLE_MAX_CHARS);
    let file_base = safe_filename(&sanitize_title(&base, FILENAME_BASE_MAX_CHARS));
    OutputNames {
        display_title,
        output_filename: format!("{file_base}_{suffix}.mp3"),
    }
}
