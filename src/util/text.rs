use std::borrow::Cow;

/// Maximum length of a sanitized free-text field, in characters.
pub const MAX_TEXT_CHARS: usize = 10_000;

const SCRIPT_OPEN: &str = "<script";
const SCRIPT_CLOSE: &str = "</script>";
const JAVASCRIPT_SCHEME: &str = "javascript:";

/// Strips unsafe constructs from a free-text field.
///
/// Removes every `<script ...>...</script>` block (ASCII case-insensitive,
/// shortest match, may span lines) and every `javascript:` prefix, then
/// truncates the result to [`MAX_TEXT_CHARS`] characters.
///
/// Removal repeats until nothing changes, so input such as
/// `"<scr<script></script>ipt>x</script>"` cannot reassemble a live block
/// after one pass. This is what makes the function idempotent:
/// `sanitize(&sanitize(x)) == sanitize(x)` for every `x`.
///
/// # Examples
///
/// ```
/// use wildcat::util::sanitize;
///
/// assert_eq!(sanitize("Hello <script>alert(1)</script>world"), "Hello world");
/// assert_eq!(sanitize("JavaScript:alert(1)"), "alert(1)");
/// ```
pub fn sanitize(text: &str) -> String {
    let mut current = text.to_owned();
    loop {
        let without_scripts = remove_script_blocks(&current);
        let cleaned = remove_ascii_ci(&without_scripts, JAVASCRIPT_SCHEME);
        if cleaned.len() == current.len() {
            break;
        }
        current = cleaned.into_owned();
    }
    truncate_chars(current, MAX_TEXT_CHARS)
}

/// Sanitizes an optional field; `None` passes through unchanged.
pub fn sanitize_opt(text: Option<&str>) -> Option<String> {
    text.map(sanitize)
}

/// Reduces an uploaded file name to a safe storage name.
///
/// Keeps only the final path component (either separator style) and replaces
/// every character outside `[A-Za-z0-9._-]` with `_`.
///
/// ```
/// use wildcat::util::sanitize_file_name;
///
/// assert_eq!(sanitize_file_name("../../etc/My Report (1).pdf"), "My_Report__1_.pdf");
/// ```
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    base.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Removes every complete `<script ...>...</script>` block in one left-to-right pass.
///
/// Indices found in the ASCII-lowercased copy are valid in the original:
/// ASCII lowercasing never changes byte lengths.
fn remove_script_blocks(s: &str) -> Cow<'_, str> {
    let lower = s.to_ascii_lowercase();
    let mut out: Option<String> = None;
    let mut cursor = 0;

    while let Some(rel) = lower[cursor..].find(SCRIPT_OPEN) {
        let open = cursor + rel;
        let after_name = open + SCRIPT_OPEN.len();
        // If this opener has no `>` or no closer, no later opener can either.
        let Some(gt) = lower[after_name..].find('>') else {
            break;
        };
        let body = after_name + gt + 1;
        let Some(close) = lower[body..].find(SCRIPT_CLOSE) else {
            break;
        };

        out.get_or_insert_with(|| String::with_capacity(s.len()))
            .push_str(&s[cursor..open]);
        cursor = body + close + SCRIPT_CLOSE.len();
    }

    match out {
        Some(mut out) => {
            out.push_str(&s[cursor..]);
            Cow::Owned(out)
        }
        None => Cow::Borrowed(s),
    }
}

/// Removes all non-overlapping ASCII case-insensitive occurrences of `needle`.
fn remove_ascii_ci<'a>(s: &'a str, needle: &str) -> Cow<'a, str> {
    let lower = s.to_ascii_lowercase();
    if !lower.contains(needle) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut cursor = 0;
    while let Some(rel) = lower[cursor..].find(needle) {
        let start = cursor + rel;
        out.push_str(&s[cursor..start]);
        cursor = start + needle.len();
    }
    out.push_str(&s[cursor..]);
    Cow::Owned(out)
}

fn truncate_chars(mut s: String, max_chars: usize) -> String {
    if let Some((idx, _)) = s.char_indices().nth(max_chars) {
        s.truncate(idx);
    }
    s
}

/// SEC-001: Removes control characters from scraped text.
///
/// Drops C0/C1 controls except tab, newline and carriage return, the Unicode
/// bidi overrides that can disguise a title, and whole ANSI CSI/OSC escape
/// sequences. Clean input is returned borrowed.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_stripped_char) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\x1b' {
            if !is_stripped_char(c) {
                out.push(c);
            }
            continue;
        }
        match chars.peek() {
            // CSI runs through its final byte.
            Some('[') => {
                chars.next();
                for c in chars.by_ref() {
                    if ('\x40'..='\x7e').contains(&c) {
                        break;
                    }
                }
            }
            // OSC runs until BEL or ST.
            Some(']') => {
                chars.next();
                while let Some(c) = chars.next() {
                    if c == '\x07' {
                        break;
                    }
                    if c == '\x1b' {
                        if chars.peek() == Some(&'\\') {
                            chars.next();
                        }
                        break;
                    }
                }
            }
            _ => {}
        }
    }

    Cow::Owned(out)
}

fn is_stripped_char(c: char) -> bool {
    match c {
        '\t' | '\n' | '\r' => false,
        '\u{202a}'..='\u{202e}' | '\u{2066}'..='\u{2069}' => true,
        c => c.is_control(),
    }
}
