//! Token scanner
//!
//! Splits normalized source lines into COBOL tokens with 1-based positions.
//! A word includes `-`; a period is a separator only when followed by
//! whitespace or end of line; EXEC ... END-EXEC collapses into one opaque
//! token so the parser can step over embedded SQL/CICS bodies. The token
//! after PIC/PICTURE [IS] is scanned with picture-string rules, where `(`,
//! `)` and `.` are ordinary characters.

use crate::preproc::is_comment_line;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Word,
    Number,
    StringLit,
    Picture,
    Period,
    Lparen,
    Rparen,
    Exec,
    Garbage,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
    pub column: usize,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, line: usize, column: usize) -> Token {
        Token {
            kind,
            text: text.into(),
            line,
            column,
        }
    }
}

pub fn tokenize(lines: &[(usize, String)]) -> Vec<Token> {
    let mut out = Vec::new();
    let mut exec: Option<(String, usize, usize)> = None; // body, line, column
    let mut picture_pending = false;

    for (number, text) in lines {
        if exec.is_none() && is_comment_line(text) {
            continue;
        }

        if exec.is_some() {
            if let Some(end) = find_ci(text, "END-EXEC") {
                let upto = end + "END-EXEC".len();
                let keep: String = text.chars().take(upto).collect();
                let tail: String = text.chars().skip(upto).collect();
                if let Some((mut body, line, column)) = exec.take() {
                    body.push('\n');
                    body.push_str(&keep);
                    out.push(Token::new(TokenKind::Exec, body, line, column));
                }
                scan_line(&mut out, *number, &tail, upto, &mut picture_pending, &mut exec);
            } else if let Some((body, _, _)) = exec.as_mut() {
                body.push('\n');
                body.push_str(text);
            }
            continue;
        }

        scan_line(&mut out, *number, text, 0, &mut picture_pending, &mut exec);
    }

    if let Some((body, line, column)) = exec {
        // Unterminated block: keep what we saw; the parser diagnoses it.
        out.push(Token::new(TokenKind::Exec, body, line, column));
    }
    out
}

/// Case-insensitive substring search returning a char offset.
fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    let hay: Vec<char> = haystack.chars().collect();
    let ndl: Vec<char> = needle.chars().collect();
    if ndl.is_empty() || hay.len() < ndl.len() {
        return None;
    }
    (0..=hay.len() - ndl.len()).find(|&i| {
        hay[i..i + ndl.len()]
            .iter()
            .zip(&ndl)
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
    })
}

fn scan_line(
    out: &mut Vec<Token>,
    number: usize,
    text: &str,
    column_offset: usize,
    picture_pending: &mut bool,
    exec: &mut Option<(String, usize, usize)>,
) {
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let column = column_offset + i + 1;

        if c.is_whitespace() || c == ',' || c == ';' {
            i += 1;
            continue;
        }

        if *picture_pending {
            let start = i;
            while i < chars.len() && !chars[i].is_whitespace() {
                i += 1;
            }
            let mut pic: String = chars[start..i].iter().collect();
            // `PICTURE IS X(8)`: the IS keyword is not the picture.
            if pic.eq_ignore_ascii_case("IS") {
                out.push(Token::new(TokenKind::Word, "IS", number, column));
                continue;
            }
            // A trailing separator period belongs to the sentence.
            let had_period = pic.len() > 1 && pic.ends_with('.');
            if had_period {
                pic.pop();
            }
            out.push(Token::new(TokenKind::Picture, pic, number, column));
            if had_period {
                out.push(Token::new(TokenKind::Period, ".", number, column_offset + i));
            }
            *picture_pending = false;
            continue;
        }

        if c == '"' || c == '\'' {
            let quote = c;
            let start = i + 1;
            let mut j = start;
            while j < chars.len() && chars[j] != quote {
                j += 1;
            }
            let value: String = chars[start..j].iter().collect();
            out.push(Token::new(TokenKind::StringLit, value, number, column));
            i = (j + 1).min(chars.len());
            continue;
        }

        if c.is_ascii_alphanumeric() {
            let start = i;
            let numeric_start = c.is_ascii_digit();
            while i < chars.len() {
                let ch = chars[i];
                if ch.is_ascii_alphanumeric() || ch == '-' {
                    i += 1;
                } else if numeric_start
                    && ch == '.'
                    && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())
                {
                    i += 1;
                } else {
                    break;
                }
            }
            let word: String = chars[start..i].iter().collect::<String>().to_ascii_uppercase();

            if word == "EXEC" {
                let rest: String = chars[start..].iter().collect();
                if let Some(kind_word) = rest.split_whitespace().nth(1) {
                    if matches!(
                        kind_word.to_ascii_uppercase().as_str(),
                        "SQL" | "CICS" | "DLI"
                    ) {
                        if let Some(end) = find_ci(&rest, "END-EXEC") {
                            let upto = end + "END-EXEC".len();
                            let body: String = rest.chars().take(upto).collect();
                            out.push(Token::new(TokenKind::Exec, body, number, column));
                            let consumed = start + upto;
                            i = consumed;
                            continue;
                        }
                        *exec = Some((rest, number, column));
                        return;
                    }
                }
            }

            let all_digits = word.chars().all(|ch| ch.is_ascii_digit() || ch == '.');
            let kind = if numeric_start && all_digits {
                TokenKind::Number
            } else {
                TokenKind::Word
            };
            if kind == TokenKind::Word && (word == "PIC" || word == "PICTURE") {
                *picture_pending = true;
            }
            out.push(Token::new(kind, word, number, column));
            continue;
        }

        match c {
            '.' => {
                let sep = chars
                    .get(i + 1)
                    .map(|n| n.is_whitespace())
                    .unwrap_or(true);
                let kind = if sep { TokenKind::Period } else { TokenKind::Garbage };
                out.push(Token::new(kind, ".", number, column));
            }
            '(' => out.push(Token::new(TokenKind::Lparen, "(", number, column)),
            ')' => out.push(Token::new(TokenKind::Rparen, ")", number, column)),
            _ => out.push(Token::new(TokenKind::Garbage, c.to_string(), number, column)),
        }
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<Token> {
        let lines: Vec<(usize, String)> = src
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.to_string()))
            .collect();
        tokenize(&lines)
    }

    #[test]
    fn words_numbers_and_periods() {
        let toks = lex("    MOVE 5 TO WS-X.");
        let kinds: Vec<TokenKind> = toks.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Word,
                TokenKind::Number,
                TokenKind::Word,
                TokenKind::Word,
                TokenKind::Period
            ]
        );
        assert_eq!(toks[3].text, "WS-X");
    }

    #[test]
    fn string_literals_keep_case() {
        let toks = lex("    CALL 'AuditLog'.");
        assert_eq!(toks[1].kind, TokenKind::StringLit);
        assert_eq!(toks[1].text, "AuditLog");
    }

    #[test]
    fn picture_strings_are_opaque() {
        let toks = lex("    05 WS-AMT PIC 9(7)V99.");
        let pic = toks.iter().find(|t| t.kind == TokenKind::Picture).unwrap();
        assert_eq!(pic.text, "9(7)V99");
        assert_eq!(toks.last().unwrap().kind, TokenKind::Period);
    }

    #[test]
    fn exec_block_is_one_token() {
        let toks = lex("    EXEC SQL\n      SELECT 1 FROM T\n    END-EXEC.");
        let exec = toks.iter().find(|t| t.kind == TokenKind::Exec).unwrap();
        assert!(exec.text.contains("SELECT 1"));
        assert!(exec.text.to_uppercase().ends_with("END-EXEC"));
    }

    #[test]
    fn comment_lines_produce_nothing() {
        assert!(lex("      * A REMARK").is_empty());
    }
}
