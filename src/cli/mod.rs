//! Shell layer
//!
//! Everything between a command line and the engine: tokenization (quotes,
//! comments, `>`/`>>` redirection), the `/` workspace commands, script
//! execution, rendering, and history. The query engine itself only ever sees
//! pre-tokenized [`Command`]s; this module is its caller, not part of it.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use termcolor::{Color, ColorChoice, ColorSpec, NoColor, WriteColor};

use crate::config::{self, ConfigFile, EngineContext, ParseMode};
use crate::error::{EngineError, Result};
use crate::query::{self, Command, QueryOutput, QueryValue};
use crate::workspace::{LoadOptions, Workspace};

/// Per-command output redirection.
#[derive(Debug, Clone, PartialEq)]
pub struct Redirect {
    pub path: PathBuf,
    pub append: bool,
}

/// Split one command line into tokens plus an optional redirect. `#` starts
/// a comment outside quotes; `>` and `>>` bind to the following token.
pub fn tokenize_line(line: &str) -> Result<(Vec<String>, Option<Redirect>)> {
    let mut tokens: Vec<String> = Vec::new();
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '#' {
            break;
        }
        if c == '"' || c == '\'' {
            let quote = c;
            let mut word = String::new();
            i += 1;
            while i < chars.len() && chars[i] != quote {
                word.push(chars[i]);
                i += 1;
            }
            i += 1;
            tokens.push(word);
            continue;
        }
        if c == '>' {
            if chars.get(i + 1) == Some(&'>') {
                tokens.push(">>".to_string());
                i += 2;
            } else {
                tokens.push(">".to_string());
                i += 1;
            }
            continue;
        }
        let mut word = String::new();
        while i < chars.len() && !chars[i].is_whitespace() && chars[i] != '>' && chars[i] != '#' {
            word.push(chars[i]);
            i += 1;
        }
        tokens.push(word);
    }

    let mut redirect = None;
    if let Some(pos) = tokens.iter().position(|t| t == ">" || t == ">>") {
        let append = tokens[pos] == ">>";
        let path = tokens
            .get(pos + 1)
            .ok_or_else(|| EngineError::Usage("redirection needs a file name".to_string()))?;
        redirect = Some(Redirect {
            path: PathBuf::from(path),
            append,
        });
        tokens.truncate(pos);
    }
    Ok((tokens, redirect))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Quit,
}

pub struct Session {
    pub ws: Workspace,
    pub color: ColorChoice,
    pub history: Vec<String>,
    history_path: PathBuf,
    history_limit: Option<usize>,
}

impl Session {
    pub fn new(cfg: &ConfigFile) -> Session {
        let state = config::state_dir();
        let ctx = EngineContext::from_config(cfg, &state);
        let mut ws = Workspace::new(ctx);
        for path in &cfg.copybooks.paths {
            ws.add_copypath(path.clone());
        }
        ws.set_env_copypaths(config::env_copylib());
        let history_path = cfg
            .repl
            .history_file
            .clone()
            .unwrap_or_else(|| state.join("history"));
        Session {
            ws,
            color: if cfg.repl.highlight {
                ColorChoice::Auto
            } else {
                ColorChoice::Never
            },
            history: Vec::new(),
            history_path,
            history_limit: cfg.repl.history_size,
        }
    }

    /// Execute one already-stripped command line against the session,
    /// honoring redirection. Blank lines are no-ops.
    pub fn execute_line(&mut self, line: &str, out: &mut dyn WriteColor) -> Result<Outcome> {
        let (tokens, redirect) = tokenize_line(line)?;
        if tokens.is_empty() {
            return Ok(Outcome::Continue);
        }
        self.remember(line);

        match redirect {
            Some(r) => {
                let file = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .append(r.append)
                    .truncate(!r.append)
                    .open(&r.path)
                    .map_err(|source| EngineError::FileAccess {
                        path: r.path.clone(),
                        source,
                    })?;
                let mut sink = NoColor::new(file);
                self.run_tokens(&tokens, &mut sink)
            }
            None => self.run_tokens(&tokens, out),
        }
    }

    fn run_tokens(&mut self, tokens: &[String], out: &mut dyn WriteColor) -> Result<Outcome> {
        let first = tokens[0].as_str();
        if let Some(script) = first.strip_prefix('@') {
            self.run_script(Path::new(script), out)?;
            return Ok(Outcome::Continue);
        }
        if first.starts_with('/') {
            return self.slash_command(tokens, out);
        }
        let cmd = Command::from_tokens(tokens)?;
        let output = query::execute(&mut self.ws, &cmd)?;
        render(out, &output).map_err(io_error)?;
        Ok(Outcome::Continue)
    }

    /// Run a `.coqu` script: one command per line, `#` comments, blank lines
    /// ignored. The first failing command aborts the script.
    pub fn run_script(&mut self, path: &Path, out: &mut dyn WriteColor) -> Result<Outcome> {
        let text = fs::read_to_string(path).map_err(|source| EngineError::FileAccess {
            path: path.to_path_buf(),
            source,
        })?;
        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            if self.execute_line(trimmed, out)? == Outcome::Quit {
                return Ok(Outcome::Quit);
            }
        }
        Ok(Outcome::Continue)
    }

    fn slash_command(&mut self, tokens: &[String], out: &mut dyn WriteColor) -> Result<Outcome> {
        let name = tokens[0].trim_start_matches('/').to_ascii_lowercase();
        let args: Vec<&str> = tokens[1..].iter().map(String::as_str).collect();
        match name.as_str() {
            "quit" | "exit" | "q" => return Ok(Outcome::Quit),
            "load" => self.cmd_load(&args, out)?,
            "loaddir" => self.cmd_loaddir(&args, out)?,
            "unload" => self.cmd_unload(&args, out)?,
            "reload" => {
                let reloaded = self.ws.reload(args.first().copied())?;
                writeln!(out, "reloaded: {}", reloaded.join(", ")).map_err(io_error)?;
            }
            "list" | "workspace" => self.cmd_workspace(&args, out)?,
            "copypath" => {
                let path = args
                    .first()
                    .ok_or_else(|| EngineError::Usage("/copypath expects a directory".into()))?;
                self.ws.add_copypath(PathBuf::from(path));
                writeln!(out, "copybook path added: {path}").map_err(io_error)?;
            }
            "copylib" => self.cmd_copylib(&args, out)?,
            "cache" => self.cmd_cache(&args, out)?,
            "set" => self.cmd_set(&args, out)?,
            "help" => write_help(out, args.first().copied()).map_err(io_error)?,
            "history" => {
                for (i, line) in self.history.iter().enumerate() {
                    writeln!(out, "{:>4}  {line}", i + 1).map_err(io_error)?;
                }
            }
            "run" => {
                let script = args
                    .first()
                    .ok_or_else(|| EngineError::Usage("/run expects a script file".into()))?;
                return self.run_script(Path::new(script), out);
            }
            other => {
                return Err(EngineError::Usage(format!("unknown command: /{other}")));
            }
        }
        Ok(Outcome::Continue)
    }

    fn cmd_load(&mut self, args: &[&str], out: &mut dyn WriteColor) -> Result<()> {
        let pattern = args
            .first()
            .ok_or_else(|| EngineError::Usage("/load expects a path or glob".into()))?;
        let opts = LoadOptions::default();
        if pattern.contains(['*', '?', '[']) {
            let outcome = self.ws.load_glob(pattern, &opts)?;
            for name in &outcome.loaded {
                self.report_loaded(name, out)?;
            }
            for (path, err) in &outcome.failed {
                writeln!(out, "failed: {}: {err}", path.display()).map_err(io_error)?;
            }
            if outcome.loaded.is_empty() && outcome.failed.is_empty() {
                writeln!(out, "no files matched {pattern}").map_err(io_error)?;
            }
            return Ok(());
        }
        let name = self.ws.load(Path::new(pattern), &opts)?;
        self.report_loaded(&name, out)
    }

    fn cmd_loaddir(&mut self, args: &[&str], out: &mut dyn WriteColor) -> Result<()> {
        let dir = args
            .first()
            .ok_or_else(|| EngineError::Usage("/loaddir expects a directory".into()))?;
        let outcome = self.ws.load_dir(Path::new(dir), &LoadOptions::default())?;
        for name in &outcome.loaded {
            self.report_loaded(name, out)?;
        }
        for (path, err) in &outcome.failed {
            writeln!(out, "failed: {}: {err}", path.display()).map_err(io_error)?;
        }
        writeln!(out, "{} program(s) loaded", outcome.loaded.len()).map_err(io_error)?;
        Ok(())
    }

    fn report_loaded(&self, name: &str, out: &mut dyn WriteColor) -> Result<()> {
        if let Some(p) = self.ws.get(name) {
            writeln!(
                out,
                "loaded {name}: {} lines, {} format{}",
                p.lines,
                p.format,
                if p.from_cache { ", cached" } else { "" }
            )
            .map_err(io_error)?;
            for warning in &p.warnings {
                writeln!(out, "warning: {warning}").map_err(io_error)?;
            }
        }
        Ok(())
    }

    fn cmd_unload(&mut self, args: &[&str], out: &mut dyn WriteColor) -> Result<()> {
        let name = args
            .first()
            .ok_or_else(|| EngineError::Usage("/unload expects a program name or all".into()))?;
        if name.eq_ignore_ascii_case("all") {
            self.ws.unload_all();
            writeln!(out, "workspace cleared").map_err(io_error)?;
        } else {
            self.ws.unload(name)?;
            writeln!(out, "unloaded {name}").map_err(io_error)?;
        }
        Ok(())
    }

    fn cmd_workspace(&mut self, args: &[&str], out: &mut dyn WriteColor) -> Result<()> {
        let verbose = args.contains(&"--verbose");
        let summaries = self.ws.list();
        if summaries.is_empty() {
            writeln!(out, "no programs loaded").map_err(io_error)?;
            return Ok(());
        }
        let mut rows = Vec::new();
        for s in &summaries {
            let mut row = vec![
                s.name.clone(),
                s.lines.to_string(),
                s.paragraphs.to_string(),
                s.path.display().to_string(),
            ];
            if verbose {
                row.push(s.format.to_string());
                row.push(if s.from_cache { "cached" } else { "indexed" }.to_string());
                row.push(format!("{}/{}", s.copybooks - s.unresolved_copybooks, s.copybooks));
                row.push(if s.has_ast { "ast" } else { "-" }.to_string());
            }
            rows.push(row);
        }
        let mut headers = vec!["PROGRAM", "LINES", "PARAGRAPHS", "PATH"];
        if verbose {
            headers.extend(["FORMAT", "SOURCE", "COPYBOOKS", "PARSE"]);
        }
        let output = QueryOutput {
            value: QueryValue::table(headers, rows),
            line_numbers: false,
        };
        render(out, &output).map_err(io_error)
    }

    fn cmd_copylib(&mut self, args: &[&str], out: &mut dyn WriteColor) -> Result<()> {
        if args.contains(&"--clear") {
            self.ws.clear_copypaths();
            writeln!(out, "copybook paths cleared").map_err(io_error)?;
            return Ok(());
        }
        for path in self.ws.copypaths() {
            writeln!(out, "{}", path.display()).map_err(io_error)?;
        }
        Ok(())
    }

    fn cmd_cache(&mut self, args: &[&str], out: &mut dyn WriteColor) -> Result<()> {
        match args.first().copied().unwrap_or("status") {
            "status" => {
                let stats = self.ws.cache_stats()?;
                writeln!(
                    out,
                    "cache: {} entries, {} bytes",
                    stats.files, stats.total_bytes
                )
                .map_err(io_error)?;
            }
            "clear" => match args.get(1) {
                Some(name) => {
                    let removed = self.ws.cache_delete(name)?;
                    writeln!(out, "{}", if removed { "entry removed" } else { "no entry" })
                        .map_err(io_error)?;
                }
                None => {
                    let removed = self.ws.cache_clear()?;
                    writeln!(out, "{removed} entries removed").map_err(io_error)?;
                }
            },
            "rebuild" => {
                let rebuilt = self.ws.rebuild_cache()?;
                writeln!(out, "rebuilt: {}", rebuilt.join(", ")).map_err(io_error)?;
            }
            other => {
                return Err(EngineError::Usage(format!(
                    "/cache expects status, clear or rebuild, got {other}"
                )));
            }
        }
        Ok(())
    }

    fn cmd_set(&mut self, args: &[&str], out: &mut dyn WriteColor) -> Result<()> {
        match (args.first().copied(), args.get(1).copied()) {
            (Some("debug"), Some(v)) => {
                let on = v.eq_ignore_ascii_case("on");
                self.ws.set_debug(on);
                writeln!(out, "debug {}", if on { "on" } else { "off" }).map_err(io_error)?;
            }
            (Some("parse-mode"), Some(v)) => {
                let mode: ParseMode = v.parse()?;
                self.ws.set_parse_mode(mode);
                writeln!(out, "parse-mode {mode}").map_err(io_error)?;
            }
            _ => {
                return Err(EngineError::Usage(
                    "/set expects debug on|off or parse-mode auto|full|index-only".into(),
                ));
            }
        }
        Ok(())
    }

    fn remember(&mut self, line: &str) {
        self.history.push(line.to_string());
        if let Some(limit) = self.history_limit {
            while self.history.len() > limit {
                self.history.remove(0);
            }
        }
        if let Some(parent) = self.history_path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        if let Ok(mut f) = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.history_path)
        {
            let _ = writeln!(f, "{line}");
        }
    }
}

fn io_error(e: io::Error) -> EngineError {
    EngineError::FileAccess {
        path: PathBuf::from("<output>"),
        source: e,
    }
}

/// Render a query result. Tables align on column widths; `Lines` honor the
/// `--line-numbers` hint.
pub fn render(out: &mut dyn WriteColor, output: &QueryOutput) -> io::Result<()> {
    match &output.value {
        QueryValue::Table { headers, rows } => {
            if rows.is_empty() {
                writeln!(out, "(no results)")?;
                return Ok(());
            }
            let mut widths: Vec<usize> = headers.iter().map(String::len).collect();
            for row in rows {
                for (i, cell) in row.iter().enumerate() {
                    if i < widths.len() {
                        widths[i] = widths[i].max(cell.len());
                    } else {
                        widths.push(cell.len());
                    }
                }
            }
            out.set_color(ColorSpec::new().set_bold(true).set_fg(Some(Color::Cyan)))?;
            for (i, h) in headers.iter().enumerate() {
                write!(out, "{:<w$}  ", h, w = widths[i])?;
            }
            writeln!(out)?;
            out.reset()?;
            for row in rows {
                for (i, cell) in row.iter().enumerate() {
                    write!(out, "{:<w$}  ", cell, w = widths.get(i).copied().unwrap_or(0))?;
                }
                writeln!(out)?;
            }
        }
        QueryValue::Lines(lines) => {
            for (number, text) in lines {
                if output.line_numbers {
                    writeln!(out, "{number:>6}  {text}")?;
                } else {
                    writeln!(out, "{text}")?;
                }
            }
        }
        QueryValue::Text(text) => writeln!(out, "{text}")?,
        QueryValue::Count(n) => writeln!(out, "{n}")?,
        QueryValue::Empty(msg) => writeln!(out, "(no results: {msg})")?,
    }
    Ok(())
}

fn write_help(out: &mut dyn WriteColor, topic: Option<&str>) -> io::Result<()> {
    if let Some(topic) = topic {
        let line = HELP
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(topic.trim_start_matches('/')));
        match line {
            Some((name, text)) => writeln!(out, "{name}\n    {text}")?,
            None => writeln!(out, "no help for {topic}")?,
        }
        return Ok(());
    }
    writeln!(out, "workspace commands:")?;
    for (name, text) in HELP.iter().filter(|(n, _)| n.starts_with('/')) {
        writeln!(out, "  {name:<24} {text}")?;
    }
    writeln!(out, "queries:")?;
    for (name, text) in HELP.iter().filter(|(n, _)| !n.starts_with('/')) {
        writeln!(out, "  {name:<24} {text}")?;
    }
    writeln!(out, "modifiers: --line-numbers, --count, > file, >> file")?;
    Ok(())
}

const HELP: &[(&str, &str)] = &[
    ("/load", "load a source file or glob"),
    ("/loaddir", "load every COBOL file under a directory"),
    ("/unload", "drop a program (or all) from the workspace"),
    ("/reload", "rebuild a program (or all) from disk"),
    ("/list", "list loaded programs"),
    ("/workspace", "workspace overview; --verbose for detail"),
    ("/copypath", "append a copybook search root"),
    ("/copylib", "show copybook roots; --clear to reset"),
    ("/cache", "status | clear [name] | rebuild"),
    ("/set", "debug on|off, parse-mode auto|full|index-only"),
    ("/history", "show commands entered this session"),
    ("/run", "execute a .coqu script (also @file)"),
    ("/quit", "leave (aliases /exit, /q)"),
    ("divisions", "list divisions with line spans"),
    ("division", "one division; --body prints its source"),
    ("sections", "list sections; --division filters"),
    ("section", "one section; --body prints its source"),
    ("paragraphs", "list paragraphs; --section filters"),
    (
        "paragraph",
        "one paragraph; --body --calls --called-by --analyze",
    ),
    ("working-storage", "working-storage items; --level filters"),
    ("variable", "one data item; --body --references"),
    ("file-section", "FILE SECTION items"),
    ("linkage", "LINKAGE SECTION items"),
    ("copybooks", "COPY directives with resolution status"),
    ("copybook", "one copybook; --contents --used-by"),
    ("copybook-deps", "copy graph; --format dot"),
    ("calls", "CALL edges; --external, --program filters"),
    ("performs", "PERFORM edges; --thru, --paragraph filters"),
    ("moves", "MOVE statements; --to, --from filters"),
    ("sql", "EXEC SQL blocks; --body prints them"),
    ("cics", "EXEC CICS blocks; --body prints them"),
    ("comments", "comments; --orphan --header --for filters"),
    ("find", "regex search; --in limits to an element"),
    ("references", "uses of a name; --writes --reads"),
    ("where-used", "programs using a copybook"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizer_handles_quotes_and_redirect() {
        let (tokens, redirect) =
            tokenize_line("find \"MOVE SPACES\" --in 2000-PROCESS > out.txt").unwrap();
        assert_eq!(tokens, vec!["find", "MOVE SPACES", "--in", "2000-PROCESS"]);
        let r = redirect.unwrap();
        assert_eq!(r.path, PathBuf::from("out.txt"));
        assert!(!r.append);
    }

    #[test]
    fn tokenizer_append_redirect_and_comment() {
        let (tokens, redirect) = tokenize_line("divisions >> log.txt # tail").unwrap();
        assert_eq!(tokens, vec!["divisions"]);
        assert!(redirect.unwrap().append);
    }

    #[test]
    fn comment_only_line_is_empty() {
        let (tokens, redirect) = tokenize_line("# just a note").unwrap();
        assert!(tokens.is_empty());
        assert!(redirect.is_none());
    }

    #[test]
    fn missing_redirect_target_is_usage() {
        assert!(matches!(
            tokenize_line("divisions >"),
            Err(EngineError::Usage(_))
        ));
    }
}
