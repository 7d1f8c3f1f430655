use regex::Regex;
use tracing::warn;

/// One compiled `pattern|replacement` rewrite.
#[derive(Debug, Clone)]
pub struct RegexRule {
    pub pattern: Regex,
    pub replacement: String,
}

/// Parse rewrite rules from configuration text.
///
/// One rule per line, `pattern|replacement`, where `\|` escapes a literal
/// pipe on either side. Empty lines and `#` comments are skipped;
/// malformed lines and invalid patterns are skipped with a warning so a
/// single typo never takes down the whole rule set.
pub fn parse_rules(text: &str) -> Vec<RegexRule> {
    let mut rules = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let Some((pattern, replacement)) = split_rule_line(trimmed) else {
            warn!(line = line_no + 1, "regex rule without separator, skipping: {trimmed}");
            continue;
        };

        match Regex::new(&pattern) {
            Ok(compiled) => rules.push(RegexRule { pattern: compiled, replacement }),
            Err(e) => warn!(line = line_no + 1, error = %e, "invalid regex pattern, skipping"),
        }
    }

    rules
}

/// Split at the first unescaped `|`, resolving `\|` escapes. All other
/// backslash sequences pass through untouched so regex escapes survive.
fn split_rule_line(line: &str) -> Option<(String, String)> {
    let mut pattern = String::new();
    let mut chars = line.chars();
    let mut separator_found = false;

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('|') => pattern.push('|'),
                Some(other) => {
                    pattern.push('\\');
                    pattern.push(other);
                }
                None => pattern.push('\\'),
            },
            '|' => {
                separator_found = true;
                break;
            }
            other => pattern.push(other),
        }
    }

    if !separator_found {
        return None;
    }

    let mut replacement = String::new();
    let mut rest = chars;
    while let Some(c) = rest.next() {
        match c {
            '\\' => match rest.next() {
                Some('|') => replacement.push('|'),
                Some(other) => {
                    replacement.push('\\');
                    replacement.push(other);
                }
                None => replacement.push('\\'),
            },
            other => replacement.push(other),
        }
    }

    Some((pattern, replacement))
}

/// Apply every rule in order. Later rules see earlier rules' output.
pub fn apply_rules(rules: &[RegexRule], input: &str) -> String {
    let mut output = input.to_string();
    for rule in rules {
        output = rule.pattern.replace_all(&output, rule.replacement.as_str()).into_owned();
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_rule() {
        let rules = parse_rules("foo|bar");
        assert_eq!(rules.len(), 1);
        assert_eq!(apply_rules(&rules, "foo foo"), "bar bar");
    }

    #[test]
    fn escaped_pipe_is_literal() {
        let rules = parse_rules(r"a\|b|x");
        assert_eq!(rules.len(), 1);
        assert_eq!(apply_rules(&rules, "a|b c"), "x c");
    }

    #[test]
    fn escaped_pipe_in_replacement() {
        let rules = parse_rules(r"foo|a\|b");
        assert_eq!(apply_rules(&rules, "foo"), "a|b");
    }

    #[test]
    fn comments_and_blanks_skipped() {
        let rules = parse_rules("# comment\n\nfoo|bar\n   \n# another");
        assert_eq!(rules.len(), 1);
    }

    #[test]
    fn malformed_lines_skipped() {
        let rules = parse_rules("no-separator-here\nfoo|bar\n([invalid|x");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].replacement, "bar");
    }

    #[test]
    fn regex_escapes_survive() {
        let rules = parse_rules(r"\d+|N");
        assert_eq!(apply_rules(&rules, "abc 123 def 45"), "abc N def N");
    }

    #[test]
    fn rules_apply_in_order() {
        let rules = parse_rules("a|b\nb|c");
        assert_eq!(apply_rules(&rules, "a"), "c");
    }

    #[test]
    fn capture_groups_expand() {
        let rules = parse_rules(r"(\w+)@example\.com|$1@redacted");
        assert_eq!(apply_rules(&rules, "bob@example.com"), "bob@redacted");
    }
}
