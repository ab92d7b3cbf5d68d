use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Normalizes generated or extracted text before sentence splitting: markdown
/// markers are stripped, links collapse to their display text, code spans are
/// dropped, and whitespace is flattened. Applying the function twice yields
/// the same output as applying it once.
pub fn cleanup_text(text: &str) -> String {
    let mut cleaned = text
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect::<String>();

    cleaned = cleaned.nfkc().collect::<String>();
    cleaned = remove_fenced_code(&cleaned);
    cleaned = remove_inline_code(&cleaned);
    cleaned = rewrite_links(&cleaned);
    cleaned = strip_emphasis(&cleaned);
    // Heading markers go last: the passes above can expose a `#` at a line
    // start, and whitespace collapsing below erases line starts entirely.
    cleaned = strip_heading_markers(&cleaned);
    // Marker removal can bring a combining mark next to a new base char;
    // renormalize so repeated cleanup cannot compose further.
    cleaned = cleaned.nfkc().collect::<String>();
    cleaned = collapse_whitespace(&cleaned);

    cleaned.trim().to_string()
}

fn remove_fenced_code(input: &str) -> String {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```.*?```").unwrap());
    replace_until_stable(&RE, input, "")
}

fn remove_inline_code(input: &str) -> String {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`[^`]*`").unwrap());
    replace_until_stable(&RE, input, "")
}

fn strip_heading_markers(input: &str) -> String {
    // Consumes leading indentation and whole runs of interleaved `#` and
    // spaces so "  ## # title" strips in a single pass.
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*(?:#+[ \t]*)+").unwrap());
    replace_until_stable(&RE, input, "")
}

fn rewrite_links(input: &str) -> String {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]\([^)]*\)").unwrap());
    replace_until_stable(&RE, input, "$1")
}

fn strip_emphasis(input: &str) -> String {
    static BOLD_STAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap());
    static ITALIC_STAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*]+)\*").unwrap());
    static BOLD_UNDERSCORE: Lazy<Regex> = Lazy::new(|| Regex::new(r"__([^_]+)__").unwrap());
    static ITALIC_UNDERSCORE: Lazy<Regex> = Lazy::new(|| Regex::new(r"_([^_]+)_").unwrap());

    let mut out = input.to_string();
    loop {
        let mut next = replace_until_stable(&BOLD_STAR, &out, "$1");
        next = replace_until_stable(&ITALIC_STAR, &next, "$1");
        next = replace_until_stable(&BOLD_UNDERSCORE, &next, "$1");
        next = replace_until_stable(&ITALIC_UNDERSCORE, &next, "$1");
        if next == out {
            return out;
        }
        out = next;
    }
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Re-applies a replacement until the text stops changing. Stripping one
/// marker layer can expose another (nested emphasis, bracketed link text),
/// and idempotency of `cleanup_text` depends on reaching the fixpoint.
fn replace_until_stable(re: &Regex, input: &str, replacement: &str) -> String {
    let mut current = input.to_string();
    loop {
        let next = re.replace_all(&current, replacement).into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}
