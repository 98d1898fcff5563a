//! Path fragment sanitization

/// Replaces illegal characters and enforces the length limit on one fragment
///
/// `/` is always treated as illegal so a metadata value can never introduce
/// an extra path component.
#[derive(Clone, Debug)]
pub struct Sanitizer {
    illegal: Vec<char>,
    replacement: char,
    truncate: Option<usize>,
}

impl Sanitizer {
    /// Build a sanitizer for the given illegal set, replacement and limit
    pub fn new(illegal_chars: &str, replacement: char, truncate: Option<usize>) -> Self {
        let mut illegal: Vec<char> = illegal_chars.chars().collect();
        if !illegal.contains(&'/') {
            illegal.push('/');
        }
        Self {
            illegal,
            replacement,
            truncate,
        }
    }

    /// Replace every illegal character
    pub fn replace_illegal(&self, fragment: &str) -> String {
        fragment
            .chars()
            .map(|c| {
                if self.illegal.contains(&c) || c == '\0' {
                    self.replacement
                } else {
                    c
                }
            })
            .collect()
    }

    /// Sanitize a folder fragment
    ///
    /// Truncated to the limit, trimmed, and a trailing `.` is replaced.
    pub fn folder(&self, fragment: &str) -> String {
        let replaced = self.replace_illegal(fragment);
        let truncated = match self.truncate {
            Some(limit) => take_chars(&replaced, limit),
            None => replaced.as_str(),
        };
        let mut out = truncated.trim().to_string();
        if out.ends_with('.') {
            out.pop();
            out.push(self.replacement);
        }
        out
    }

    /// Sanitize the final fragment and stamp the extension
    ///
    /// The content is truncated to leave room for `extension` so the whole
    /// fragment fits the limit.
    pub fn file(&self, fragment: &str, extension: &str) -> String {
        let replaced = self.replace_illegal(fragment);
        let content = match self.truncate {
            Some(limit) => {
                take_chars(&replaced, limit.saturating_sub(extension.chars().count()))
            }
            None => replaced.as_str(),
        };
        format!("{content}{extension}").trim().to_string()
    }
}

fn take_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}


/// Property-based tests using proptest
#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    const DEFAULT_ILLEGAL: &str = r#"\/:*?"<>|;"#;
    const EXTENSIONS: [&str; 4] = [".m4a", ".mp3", ".m4v", ".m3u8"];

    fn fragment() -> impl Strategy<Value = String> {
        prop::string::string_regex(r#"[a-zA-Z0-9 ./\\:*?"<>|;éü_-]{0,80}"#)
            .unwrap()
    }

    proptest! {
        /// Folder fragments never contain illegal characters
        #[test]
        fn folder_has_no_illegal_chars(input in fragment(), limit in proptest::option::of(6usize..40)) {
            let s = Sanitizer::new(DEFAULT_ILLEGAL, '_', limit);
            let out = s.folder(&input);
            for c in DEFAULT_ILLEGAL.chars() {
                prop_assert!(!out.contains(c), "found {} in {:?}", c, out);
            }
        }

        /// Folder fragments never end with a dot and respect the limit
        #[test]
        fn folder_respects_limit_and_trailing_dot(input in fragment(), limit in proptest::option::of(6usize..40)) {
            let s = Sanitizer::new(DEFAULT_ILLEGAL, '_', limit);
            let out = s.folder(&input);
            prop_assert!(!out.ends_with('.'), "trailing dot in {:?}", out);
            if let Some(limit) = limit {
                prop_assert!(out.chars().count() <= limit, "{:?} longer than {}", out, limit);
            }
        }

        /// File fragments keep their extension and fit the limit
        #[test]
        fn file_keeps_extension_within_limit(
            input in fragment(),
            limit in proptest::option::of(6usize..40),
            ext in prop::sample::select(EXTENSIONS.to_vec()),
        ) {
            let s = Sanitizer::new(DEFAULT_ILLEGAL, '_', limit);
            let out = s.file(&input, ext);
            prop_assert!(out.ends_with(ext), "{:?} lost extension {}", out, ext);
            if let Some(limit) = limit {
                prop_assert!(out.chars().count() <= limit, "{:?} longer than {}", out, limit);
            }
            let stem = &out[..out.len() - ext.len()];
            for c in DEFAULT_ILLEGAL.chars() {
                prop_assert!(!stem.contains(c), "found {} in {:?}", c, out);
            }
        }
    }
}
