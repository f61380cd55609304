use std::path::Path;

/// Seconds (or any float) as ffmpeg arguments expect them: six decimals with
/// trailing zeros dropped, so `7.5` stays `7.5` and `2.0` becomes `2`.
pub fn format_time(value: f64) -> String {
    let fixed = format!("{value:.6}");
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "" | "-0" => "0".to_string(),
        other => other.to_string(),
    }
}

fn backslash_escape(value: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if special.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Escape an unquoted filter option value for both parsing levels: the
/// `key=value:key=value` option string, then the filtergraph description.
pub fn escape_filter_value(value: &str) -> String {
    let option = backslash_escape(value, &['\\', '\'', ':']);
    backslash_escape(&option, &['\\', '\'', '[', ']', ',', ';'])
}

/// Caption text for an unquoted `drawtext=text=...` value.
///
/// drawtext expands `%{...}` sequences and treats `\` as its own escape, so
/// those are escaped first; line breaks become spaces.
pub fn escape_drawtext(text: &str) -> String {
    let flat: String = text
        .chars()
        .map(|ch| if matches!(ch, '\n' | '\r') { ' ' } else { ch })
        .collect();
    escape_filter_value(&backslash_escape(&flat, &['\\', '%']))
}

/// Font file path for an unquoted `fontfile=...` value.
pub fn escape_font_path(path: &Path) -> String {
    escape_filter_value(&path.to_string_lossy())
}

#[cfg(test)]
pub(super) mod tokenizer {
    /// ffmpeg's `av_get_token`: backslash escapes one character, single
    /// quotes group literally, unescaped surrounding whitespace is dropped.
    /// Returns the token and the unconsumed rest.
    pub fn get_token<'a>(input: &'a str, terms: &str) -> (String, &'a str) {
        let input = input.trim_start_matches([' ', '\n', '\t', '\r']);
        let mut out = String::new();
        let mut keep = 0;
        let mut chars = input.char_indices();
        let mut rest = "";
        while let Some((i, ch)) = chars.next() {
            if terms.contains(ch) {
                rest = &input[i..];
                break;
            }
            match ch {
                '\\' => {
                    if let Some((_, next)) = chars.next() {
                        out.push(next);
                    }
                    keep = out.len();
                }
                '\'' => {
                    for (_, quoted) in chars.by_ref() {
                        if quoted == '\'' {
                            break;
                        }
                        out.push(quoted);
                    }
                    keep = out.len();
                }
                other => {
                    out.push(other);
                    if !other.is_whitespace() {
                        keep = out.len();
                    }
                }
            }
        }
        out.truncate(keep);
        (out, rest)
    }

    /// Split a filter's argument string into `(key, value)` pairs the way
    /// the filter option parser does.
    pub fn parse_options(args: &str) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        let mut rest = args;
        while !rest.is_empty() {
            let (key, after_key) = get_token(rest, "=:");
            let Some(after_eq) = after_key.strip_prefix('=') else {
                pairs.push((String::new(), key));
                rest = after_key.strip_prefix(':').unwrap_or(after_key);
                continue;
            };
            let (value, after_value) = get_token(after_eq, ":");
            pairs.push((key, value));
            rest = after_value.strip_prefix(':').unwrap_or(after_value);
        }
        pairs
    }

    /// drawtext's own escape: `\x` is a literal `x`.
    pub fn drawtext_literal(text: &str) -> String {
        let mut out = String::new();
        let mut chars = text.chars();
        while let Some(ch) = chars.next() {
            match ch {
                '\\' => out.extend(chars.next()),
                other => out.push(other),
            }
        }
        out
    }
}
