// src/router/pattern.rs
use regex::Regex;

/// A compiled route path pattern.
///
/// `*` matches exactly one path segment, `**` matches any run of characters
/// including `/`. Everything else is literal and the match is anchored to
/// the whole path.
#[derive(Debug, Clone)]
pub struct PathPattern {
    pattern: String,
    regex: Regex,
}

impl PathPattern {
    pub fn compile(pattern: &str) -> Result<Self, regex::Error> {
        let mut regex_pattern = String::with_capacity(pattern.len() + 8);
        regex_pattern.push('^');

        let mut rest = pattern;
        while let Some(pos) = rest.find('*') {
            regex_pattern.push_str(&regex::escape(&rest[..pos]));
            if rest[pos..].starts_with("**") {
                regex_pattern.push_str(".*");
                rest = &rest[pos + 2..];
            } else {
                regex_pattern.push_str("[^/]+");
                rest = &rest[pos + 1..];
            }
        }
        regex_pattern.push_str(&regex::escape(rest));
        regex_pattern.push('$');

        Ok(Self {
            pattern: pattern.to_string(),
            regex: Regex::new(&regex_pattern)?,
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_segment_wildcard() {
        let pattern = PathPattern::compile("/api/*/items").unwrap();
        assert!(pattern.matches("/api/v1/items"));
        assert!(!pattern.matches("/api/v1/sub/items"));
        assert!(!pattern.matches("/api//items"));
    }

    #[test]
    fn test_multi_segment_wildcard() {
        let pattern = PathPattern::compile("/api/**").unwrap();
        assert_eq!(pattern.as_str(), "/api/**");
        assert!(pattern.matches("/api/a/b/c"));
        assert!(pattern.matches("/api/"));
        assert!(!pattern.matches("/apix/a"));
    }

    #[test]
    fn test_match_is_anchored() {
        let pattern = PathPattern::compile("/api/users").unwrap();
        assert!(pattern.matches("/api/users"));
        assert!(!pattern.matches("/api/users/1"));
        assert!(!pattern.matches("/v2/api/users"));
    }

    #[test]
    fn test_literals_are_escaped() {
        let pattern = PathPattern::compile("/files/*.json").unwrap();
        assert!(pattern.matches("/files/report.json"));
        assert!(!pattern.matches("/files/reportxjson"));
    }
}
