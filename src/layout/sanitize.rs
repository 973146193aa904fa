//! File and directory name sanitization.

/// Longest sanitized component we produce, in characters.
const MAX_COMPONENT_CHARS: usize = 120;

/// Turns a page title into a directory/file name component.
///
/// Path separators and colons become `-`, commas vanish, `&` becomes `And`,
/// whitespace becomes `_`, and anything that is not alphanumeric, `_`, `.`
/// or `-` collapses to `_`.
///
/// # Examples
///
/// ```
/// use exporter_core::layout::sanitize_title;
///
/// assert_eq!(sanitize_title("Q&A: Setup, Part 1/2"), "QAndA-_Setup_Part_1-2");
/// ```
#[must_use]
pub fn sanitize_title(title: &str) -> String {
    let replaced = title
        .trim()
        .replace(['/', '\\', ':'], "-")
        .replace(',', "")
        .replace('&', "And");
    let cleaned = collapse_illegal(&replaced.split_whitespace().collect::<Vec<_>>().join("_"));
    finish(cleaned, "untitled")
}

/// Makes an asset file name safe to write, keeping its extension.
///
/// # Examples
///
/// ```
/// use exporter_core::layout::sanitize_file_name;
///
/// assert_eq!(sanitize_file_name("my image (1).png"), "my_image__1_.png");
/// assert_eq!(sanitize_file_name("../../etc/passwd"), "etc_passwd");
/// ```
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    let spaced = name.trim().replace(char::is_whitespace, "_").replace(['/', '\\'], "_");
    let cleaned = collapse_illegal(&spaced);
    let cleaned = cleaned.trim_start_matches(['.', '_']).to_string();
    finish(cleaned, "file")
}

fn collapse_illegal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut in_illegal_run = false;
    for ch in value.chars() {
        if ch.is_alphanumeric() || matches!(ch, '_' | '.' | '-') {
            out.push(ch);
            in_illegal_run = false;
        } else if !in_illegal_run {
            out.push('_');
            in_illegal_run = true;
        }
    }
    out
}

fn finish(value: String, fallback: &str) -> String {
    let value = if value.chars().count() > MAX_COMPONENT_CHARS {
        truncate_keeping_extension(&value)
    } else {
        value
    };
    if value.is_empty() || value.chars().all(|c| c == '.') {
        fallback.to_string()
    } else {
        value
    }
}

fn truncate_keeping_extension(value: &str) -> String {
    match value.rsplit_once('.') {
        Some((stem, extension)) if extension.chars().count() <= 8 => {
            let keep = MAX_COMPONENT_CHARS - extension.chars().count() - 1;
            let stem: String = stem.chars().take(keep).collect();
            format!("{stem}.{extension}")
        }
        _ => value.chars().take(MAX_COMPONENT_CHARS).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_title_rules() {
        assert_eq!(sanitize_title("Release Notes"), "Release_Notes");
        assert_eq!(sanitize_title("A/B Testing"), "A-B_Testing");
        assert_eq!(sanitize_title("Tom & Jerry"), "Tom_And_Jerry");
        assert_eq!(sanitize_title("Häufige Fragen?"), "Häufige_Fragen_");
    }

    #[test]
    fn test_sanitize_title_empty_falls_back() {
        assert_eq!(sanitize_title("   "), "untitled");
        assert_eq!(sanitize_title(".."), "untitled");
    }

    #[test]
    fn test_sanitize_file_name_blocks_traversal() {
        assert_eq!(sanitize_file_name("..\\..\\boot.ini"), "boot.ini");
        assert!(!sanitize_file_name("../x.png").contains('/'));
    }

    #[test]
    fn test_long_names_keep_extension() {
        let long = format!("{}.png", "a".repeat(300));
        let sanitized = sanitize_file_name(&long);
        assert_eq!(sanitized.chars().count(), MAX_COMPONENT_CHARS);
        assert!(sanitized.ends_with(".png"));
    }
}
