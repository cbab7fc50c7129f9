//! Statement-level grammar
//!
//! The parsing backend sits behind [`Grammar`] so a generated parser with the
//! same `tokenize`/`parse`/diagnostics interface can replace it without
//! touching the frontend. The default backend groups tokens into the COBOL
//! hierarchy (division, section, paragraph, sentence, statement) and applies
//! skip-to-period error recovery: a diagnostic never aborts the parse.

use serde::{Deserialize, Serialize};

use super::ast::{AstNode, NodeKind, Span};
use super::lexer::{self, Token, TokenKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseDiagnostic {
    pub line: usize,
    pub column: usize,
    pub expected: Vec<String>,
    pub actual: String,
}

impl std::fmt::Display for ParseDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "line {}, column {}: expected {}, found {}",
            self.line,
            self.column,
            self.expected.join(" or "),
            self.actual
        )
    }
}

/// The parsing seam: tokenization, parsing, and a diagnostic stream.
pub trait Grammar {
    fn tokenize(&self, lines: &[(usize, String)]) -> Vec<Token>;
    fn parse(&self, tokens: &[Token]) -> (AstNode, Vec<ParseDiagnostic>);
}

/// Hand-written default backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct CobolGrammar;

impl Grammar for CobolGrammar {
    fn tokenize(&self, lines: &[(usize, String)]) -> Vec<Token> {
        lexer::tokenize(lines)
    }

    fn parse(&self, tokens: &[Token]) -> (AstNode, Vec<ParseDiagnostic>) {
        Parser::new(tokens).run()
    }
}

const VERBS: &[&str] = &[
    "ACCEPT", "ADD", "ALTER", "CALL", "CANCEL", "CLOSE", "COMPUTE", "CONTINUE", "DELETE",
    "DISPLAY", "DIVIDE", "ELSE", "EVALUATE", "EXIT", "GO", "GOBACK", "IF", "INITIALIZE",
    "INSPECT", "MERGE", "MOVE", "MULTIPLY", "OPEN", "PERFORM", "READ", "RELEASE", "RETURN",
    "REWRITE", "SEARCH", "SET", "SORT", "START", "STOP", "STRING", "SUBTRACT", "UNSTRING",
    "WHEN", "WRITE",
];

fn is_verb(word: &str) -> bool {
    VERBS.binary_search(&word).is_ok()
}

struct Parser<'a> {
    tokens: &'a [Token],
    i: usize,
    diagnostics: Vec<ParseDiagnostic>,
    program: AstNode,
    division: Option<AstNode>,
    section: Option<AstNode>,
    paragraph: Option<AstNode>,
    sentence: Vec<AstNode>,
    in_procedure: bool,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Parser<'a> {
        let span = tokens
            .first()
            .map(|t| Span::point(t.line, t.column))
            .unwrap_or_default();
        Parser {
            tokens,
            i: 0,
            diagnostics: Vec::new(),
            program: AstNode::new(NodeKind::Program, span),
            division: None,
            section: None,
            paragraph: None,
            sentence: Vec::new(),
            in_procedure: false,
        }
    }

    fn run(mut self) -> (AstNode, Vec<ParseDiagnostic>) {
        while self.i < self.tokens.len() {
            let tok = &self.tokens[self.i];
            match tok.kind {
                TokenKind::Period => {
                    self.flush_sentence();
                    self.i += 1;
                }
                TokenKind::Exec => {
                    let language = tok
                        .text
                        .split_whitespace()
                        .nth(1)
                        .unwrap_or("SQL")
                        .to_ascii_uppercase();
                    let node = AstNode::new(
                        NodeKind::Exec { language },
                        Span::point(tok.line, tok.column),
                    );
                    self.sentence.push(node);
                    self.i += 1;
                }
                TokenKind::Word => self.word(),
                _ => {
                    if self.in_procedure && self.sentence.is_empty() {
                        self.diagnose(&["statement verb", "paragraph-name"]);
                        self.skip_sentence();
                    } else if self.in_procedure {
                        // Mid-statement stray; already consumed by statement
                        // parsing, so this is punctuation noise.
                        self.i += 1;
                    } else {
                        self.entry();
                    }
                }
            }
        }
        self.flush_division();
        if let Some(last) = self.tokens.last() {
            self.program.span.extend_to(last.line, last.column);
        }
        let Parser {
            program,
            diagnostics,
            ..
        } = self;
        (program, diagnostics)
    }

    fn word(&mut self) {
        let tok = &self.tokens[self.i];
        let word = tok.text.clone();
        let span = Span::point(tok.line, tok.column);

        if self.peek_word(1) == Some("DIVISION") {
            self.flush_division();
            self.in_procedure = word.eq_ignore_ascii_case("PROCEDURE");
            self.division = Some(AstNode::new(NodeKind::Division { name: word }, span));
            self.i += 2;
            self.skip_sentence();
            return;
        }
        if self.peek_word(1) == Some("SECTION") {
            self.flush_section();
            self.section = Some(AstNode::new(NodeKind::Section { name: word }, span));
            self.i += 2;
            self.skip_sentence();
            return;
        }
        if self.in_procedure
            && self.sentence.is_empty()
            && self.peek_kind(1) == Some(TokenKind::Period)
            && tok.column <= 11
        {
            // Area-A word + period is a paragraph header, even when the name
            // shadows a verb; area-B one-word sentences stay statements.
            self.flush_paragraph();
            self.paragraph = Some(AstNode::new(NodeKind::Paragraph { name: word }, span));
            self.i += 2;
            return;
        }
        if self.in_procedure {
            if is_verb(&word) {
                self.statement(word, span);
            } else {
                self.diagnose(&["statement verb", "paragraph-name"]);
                self.skip_sentence();
            }
        } else {
            self.entry();
        }
    }

    /// PROCEDURE DIVISION statement: verb plus operands up to the sentence
    /// period or the next verb.
    fn statement(&mut self, verb: String, mut span: Span) {
        let mut node = AstNode::new(NodeKind::Statement { verb }, span);
        self.i += 1;
        while let Some(tok) = self.tokens.get(self.i) {
            match tok.kind {
                TokenKind::Period | TokenKind::Exec => break,
                TokenKind::Word if is_verb(&tok.text) => break,
                TokenKind::Word => {
                    node.children.push(AstNode::new(
                        NodeKind::Identifier {
                            name: tok.text.clone(),
                        },
                        Span::point(tok.line, tok.column),
                    ));
                }
                TokenKind::Number | TokenKind::StringLit | TokenKind::Picture => {
                    node.children.push(AstNode::new(
                        NodeKind::Literal {
                            value: tok.text.clone(),
                        },
                        Span::point(tok.line, tok.column),
                    ));
                }
                TokenKind::Lparen | TokenKind::Rparen | TokenKind::Garbage => {}
            }
            span.extend_to(tok.line, tok.column);
            self.i += 1;
        }
        node.span = span;
        self.sentence.push(node);
    }

    /// Non-procedure content (data descriptions, environment clauses): one
    /// generic entry per sentence, no diagnostics.
    fn entry(&mut self) {
        let tok = &self.tokens[self.i];
        let mut span = Span::point(tok.line, tok.column);
        let mut node = AstNode::new(
            NodeKind::Statement {
                verb: tok.text.clone(),
            },
            span,
        );
        self.i += 1;
        while let Some(tok) = self.tokens.get(self.i) {
            if tok.kind == TokenKind::Period {
                break;
            }
            match tok.kind {
                TokenKind::Word => node.children.push(AstNode::new(
                    NodeKind::Identifier {
                        name: tok.text.clone(),
                    },
                    Span::point(tok.line, tok.column),
                )),
                TokenKind::Number | TokenKind::StringLit | TokenKind::Picture => {
                    node.children.push(AstNode::new(
                        NodeKind::Literal {
                            value: tok.text.clone(),
                        },
                        Span::point(tok.line, tok.column),
                    ))
                }
                _ => {}
            }
            span.extend_to(tok.line, tok.column);
            self.i += 1;
        }
        node.span = span;
        self.sentence.push(node);
    }

    fn diagnose(&mut self, expected: &[&str]) {
        let tok = &self.tokens[self.i];
        self.diagnostics.push(ParseDiagnostic {
            line: tok.line,
            column: tok.column,
            expected: expected.iter().map(|s| s.to_string()).collect(),
            actual: tok.text.clone(),
        });
    }

    /// Error recovery: drop tokens through the next sentence period.
    fn skip_sentence(&mut self) {
        while let Some(tok) = self.tokens.get(self.i) {
            self.i += 1;
            if tok.kind == TokenKind::Period {
                return;
            }
        }
    }

    fn peek_word(&self, ahead: usize) -> Option<&str> {
        match self.tokens.get(self.i + ahead) {
            Some(t) if t.kind == TokenKind::Word => Some(t.text.as_str()),
            _ => None,
        }
    }

    fn peek_kind(&self, ahead: usize) -> Option<TokenKind> {
        self.tokens.get(self.i + ahead).map(|t| t.kind)
    }

    fn container(&mut self) -> &mut AstNode {
        self.paragraph
            .as_mut()
            .or(self.section.as_mut())
            .or(self.division.as_mut())
            .unwrap_or(&mut self.program)
    }

    fn flush_sentence(&mut self) {
        if self.sentence.is_empty() {
            return;
        }
        let statements = std::mem::take(&mut self.sentence);
        let mut span = statements[0].span;
        if let Some(last) = statements.last() {
            span.extend_to(last.span.end_line, last.span.end_column);
        }
        let mut sentence = AstNode::new(NodeKind::Sentence, span);
        sentence.children = statements;
        self.container().children.push(sentence);
    }

    fn flush_paragraph(&mut self) {
        self.flush_sentence();
        if let Some(p) = self.paragraph.take() {
            self.section
                .as_mut()
                .or(self.division.as_mut())
                .unwrap_or(&mut self.program)
                .children
                .push(p);
        }
    }

    fn flush_section(&mut self) {
        self.flush_paragraph();
        if let Some(s) = self.section.take() {
            self.division
                .as_mut()
                .unwrap_or(&mut self.program)
                .children
                .push(s);
        }
    }

    fn flush_division(&mut self) {
        self.flush_section();
        if let Some(d) = self.division.take() {
            self.program.children.push(d);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> (AstNode, Vec<ParseDiagnostic>) {
        let lines: Vec<(usize, String)> = src
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.to_string()))
            .collect();
        let g = CobolGrammar;
        let tokens = g.tokenize(&lines);
        g.parse(&tokens)
    }

    #[test]
    fn paragraphs_hold_sentences() {
        let (ast, diags) = parse(
            "       PROCEDURE DIVISION.\n       MAIN-PARA.\n           MOVE A TO B.\n",
        );
        assert!(diags.is_empty());
        let para = ast.find_paragraph("MAIN-PARA").unwrap();
        assert_eq!(para.children.len(), 1);
        match &para.children[0].children[0].kind {
            NodeKind::Statement { verb } => assert_eq!(verb, "MOVE"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn recovery_skips_to_next_period() {
        let (ast, diags) = parse(
            "       PROCEDURE DIVISION.\n       P1.\n           ??? JUNK HERE.\n           MOVE A TO B.\n",
        );
        assert_eq!(diags.len(), 1);
        assert!(ast.find_paragraph("P1").is_some());
        let para = ast.find_paragraph("P1").unwrap();
        // The junk sentence vanished; the MOVE survived.
        assert_eq!(para.children.len(), 1);
    }

    #[test]
    fn verb_named_paragraph_is_a_paragraph() {
        let (ast, _) = parse("       PROCEDURE DIVISION.\n       MOVE.\n           DISPLAY X.\n");
        assert!(ast.find_paragraph("MOVE").is_some());
    }

    #[test]
    fn data_entries_do_not_diagnose() {
        let (_, diags) = parse(
            "       DATA DIVISION.\n       WORKING-STORAGE SECTION.\n       01 WS-X PIC 9(3).\n",
        );
        assert!(diags.is_empty());
    }
}
