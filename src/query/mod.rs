//! Query engine
//!
//! Takes a pre-tokenized command (tokenization belongs to the shell layer),
//! resolves flags, and dispatches to a read-only handler. Handlers return
//! structured values; rendering is the caller's business. Listing queries
//! touch only the structural index; `--body` reads original source lines;
//! semantic queries run the chunk analyzer, escalating to a full parse only
//! under `--exact`. A name lookup with no hit is an empty result, not an
//! error. Results are deterministic for a fixed workspace snapshot.

pub mod handlers;

use std::collections::BTreeMap;

use crate::error::{EngineError, Result};
use crate::workspace::Workspace;

/// Flags that consume a following value token.
const VALUE_FLAGS: &[&str] = &[
    "division", "section", "level", "program", "paragraph", "to", "from", "for", "in", "format",
];

/// A tokenized query command: name, positional args, named flags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Command {
    pub name: String,
    pub args: Vec<String>,
    pub flags: BTreeMap<String, Option<String>>,
}

impl Command {
    pub fn from_tokens(tokens: &[String]) -> Result<Command> {
        let Some(first) = tokens.first() else {
            return Err(EngineError::Usage("empty command".to_string()));
        };
        let mut cmd = Command {
            name: first.to_ascii_lowercase(),
            ..Command::default()
        };
        let mut i = 1;
        while i < tokens.len() {
            let tok = &tokens[i];
            if let Some(flag) = tok.strip_prefix("--") {
                let flag = flag.to_ascii_lowercase();
                let takes_value = VALUE_FLAGS.contains(&flag.as_str());
                let value = if takes_value {
                    match tokens.get(i + 1) {
                        Some(v) if !v.starts_with("--") => {
                            i += 1;
                            Some(v.clone())
                        }
                        _ => {
                            return Err(EngineError::Usage(format!(
                                "flag --{flag} needs a value"
                            )))
                        }
                    }
                } else {
                    None
                };
                cmd.flags.insert(flag, value);
            } else {
                cmd.args.push(tok.clone());
            }
            i += 1;
        }
        Ok(cmd)
    }

    pub fn has(&self, flag: &str) -> bool {
        self.flags.contains_key(flag)
    }

    pub fn value(&self, flag: &str) -> Option<&str> {
        self.flags.get(flag).and_then(|v| v.as_deref())
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    fn require_arg(&self, index: usize, what: &str) -> Result<&str> {
        self.arg(index)
            .ok_or_else(|| EngineError::Usage(format!("{} expects {what}", self.name)))
    }
}

/// Structured handler output; presentation decides how it looks.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Table {
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    /// Numbered source lines.
    Lines(Vec<(usize, String)>),
    Text(String),
    Count(usize),
    /// A lookup that found nothing; carries the phrasing.
    Empty(String),
}

impl QueryValue {
    pub fn table<H: Into<String>>(headers: Vec<H>, rows: Vec<Vec<String>>) -> QueryValue {
        QueryValue::Table {
            headers: headers.into_iter().map(Into::into).collect(),
            rows,
        }
    }

    fn count(&self) -> usize {
        match self {
            QueryValue::Table { rows, .. } => rows.len(),
            QueryValue::Lines(lines) => lines.len(),
            QueryValue::Text(_) => 1,
            QueryValue::Count(n) => *n,
            QueryValue::Empty(_) => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutput {
    pub value: QueryValue,
    /// `--line-numbers` presentation hint.
    pub line_numbers: bool,
}

/// Run one query command against the workspace.
pub fn execute(ws: &mut Workspace, cmd: &Command) -> Result<QueryOutput> {
    let value = handlers::dispatch(ws, cmd)?;
    let value = if cmd.has("count") {
        QueryValue::Count(value.count())
    } else {
        value
    };
    Ok(QueryOutput {
        value,
        line_numbers: cmd.has("line-numbers"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn flags_and_args_separate() {
        let cmd = Command::from_tokens(&toks(&[
            "paragraph",
            "2100-VALIDATE",
            "--analyze",
            "--program",
            "SAMPLE",
        ]))
        .unwrap();
        assert_eq!(cmd.name, "paragraph");
        assert_eq!(cmd.arg(0), Some("2100-VALIDATE"));
        assert!(cmd.has("analyze"));
        assert_eq!(cmd.value("program"), Some("SAMPLE"));
    }

    #[test]
    fn value_flag_without_value_is_a_usage_error() {
        let err = Command::from_tokens(&toks(&["sections", "--division"])).unwrap_err();
        assert!(matches!(err, EngineError::Usage(_)));
    }

    #[test]
    fn empty_command_rejected() {
        assert!(Command::from_tokens(&[]).is_err());
    }
}
