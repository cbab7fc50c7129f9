//! Pseudo-text substitution
//!
//! Implements the operand matching shared by `COPY ... REPLACING` and the
//! program-wide `REPLACE` directive. Operands are compared token-wise:
//! whitespace runs inside `==...==` pseudo-text collapse before matching, per
//! the COBOL-85 text-word rules. A COBOL word includes `-`, so boundary
//! checks are done by hand rather than with `\b`. The partial-word form
//! (`:TAG:`) substitutes inside words and skips the boundary checks.

use regex::Regex;

#[derive(Debug, Clone)]
pub struct ReplaceRule {
    pattern: Regex,
    replacement: String,
    /// Require non-word characters around the match (off for `:TAG:`).
    lead_guard: bool,
    trail_guard: bool,
}

fn is_word_char(c: Option<char>) -> bool {
    matches!(c, Some(c) if c.is_ascii_alphanumeric() || c == '-')
}

impl ReplaceRule {
    /// Compile one `from BY to` pair. Returns `None` for empty operands.
    pub fn compile(from: &str, to: &str) -> Option<ReplaceRule> {
        let words: Vec<&str> = from.split_whitespace().collect();
        if words.is_empty() {
            return None;
        }
        let partial = words.len() == 1
            && words[0].len() > 2
            && words[0].starts_with(':')
            && words[0].ends_with(':');
        let core = words
            .iter()
            .map(|w| regex::escape(w))
            .collect::<Vec<_>>()
            .join(r"\s+");
        let pattern = Regex::new(&format!("(?i){core}")).ok()?;
        let replacement = to.split_whitespace().collect::<Vec<_>>().join(" ");
        Some(ReplaceRule {
            pattern,
            replacement,
            lead_guard: !partial && is_word_char(from.trim_start().chars().next()),
            trail_guard: !partial && is_word_char(from.trim_end().chars().last()),
        })
    }

    pub fn apply(&self, line: &str) -> String {
        let mut out = String::new();
        let mut last = 0;
        for m in self.pattern.find_iter(line) {
            if m.start() < last {
                continue;
            }
            let boundary_ok = (!self.lead_guard
                || !is_word_char(line[..m.start()].chars().next_back()))
                && (!self.trail_guard || !is_word_char(line[m.end()..].chars().next()));
            if boundary_ok {
                out.push_str(&line[last..m.start()]);
                out.push_str(&self.replacement);
                last = m.end();
            }
        }
        out.push_str(&line[last..]);
        out
    }
}

pub fn apply_rules(rules: &[ReplaceRule], line: &str) -> String {
    let mut out = line.to_string();
    for rule in rules {
        out = rule.apply(&out);
    }
    out
}

/// Split a REPLACING/REPLACE operand list into `(from, to)` pairs.
///
/// Operands are either `==pseudo-text==` or single text-words; pairs are
/// joined by `BY`. A malformed tail drops the remaining operands rather than
/// failing the directive.
pub fn parse_pairs(clause: &str) -> Vec<(String, String)> {
    let operands = tokenize_operands(clause);
    let mut pairs = Vec::new();
    let mut i = 0;
    while i + 3 <= operands.len() {
        if !operands[i + 1].eq_ignore_ascii_case("BY") {
            break;
        }
        pairs.push((operands[i].clone(), operands[i + 2].clone()));
        i += 3;
    }
    pairs
}

fn tokenize_operands(clause: &str) -> Vec<String> {
    let mut out = Vec::new();
    let chars: Vec<char> = clause.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i].is_whitespace() {
            i += 1;
            continue;
        }
        if chars[i] == '=' && i + 1 < chars.len() && chars[i + 1] == '=' {
            let start = i + 2;
            let mut j = start;
            while j + 1 < chars.len() && !(chars[j] == '=' && chars[j + 1] == '=') {
                j += 1;
            }
            let text: String = chars[start..j.min(chars.len())].iter().collect();
            out.push(text.trim().to_string());
            i = (j + 2).min(chars.len() + 2);
        } else {
            let start = i;
            while i < chars.len() && !chars[i].is_whitespace() {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            let word = word.trim_end_matches('.').to_string();
            if !word.is_empty() {
                out.push(word);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pseudo_text_pairs() {
        let pairs = parse_pairs("==OLD-PREFIX== BY ==NEW-PREFIX==");
        assert_eq!(
            pairs,
            vec![("OLD-PREFIX".to_string(), "NEW-PREFIX".to_string())]
        );
    }

    #[test]
    fn word_operands_and_multiple_pairs() {
        let pairs = parse_pairs("ALPHA BY BETA ==X Y== BY ==Z==");
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0], ("ALPHA".to_string(), "BETA".to_string()));
        assert_eq!(pairs[1], ("X Y".to_string(), "Z".to_string()));
    }

    #[test]
    fn whitespace_insensitive_matching() {
        let rule = ReplaceRule::compile("MOVE   A", "MOVE B").unwrap();
        assert_eq!(rule.apply("    MOVE A TO OUT."), "    MOVE B TO OUT.");
    }

    #[test]
    fn partial_word_tag_substitutes_inside_words() {
        let rule = ReplaceRule::compile(":TAG:", "CUST").unwrap();
        assert_eq!(rule.apply("05 :TAG:-ID PIC X."), "05 CUST-ID PIC X.");
    }

    #[test]
    fn hyphen_is_part_of_a_word() {
        let rule = ReplaceRule::compile("REC", "RECORD-1").unwrap();
        assert_eq!(
            rule.apply("MOVE rec TO REC-AREA."),
            "MOVE RECORD-1 TO REC-AREA."
        );
    }
}
