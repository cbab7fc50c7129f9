//! Workspace registry
//!
//! Owns every loaded [`Program`], the ordered copybook search roots, and the
//! cache handle. Loading runs reader → normalizer → hash → cache probe, and
//! only on a miss preprocessor → indexer → cache write. Full parsing stays
//! deferred until a semantic query forces it, unless the load asked for it or
//! the parse mode is `full`.
//!
//! Loads are cancellable at two safe points, after format detection and
//! after indexing; a cancelled load leaves no cache entry and no program. A
//! reload builds the replacement completely before swapping it in, so
//! readers never observe a half-built program. The phase indicator is a
//! read-only signal for an outside UI to poll; nothing in the engine acts
//! on it.

pub mod program;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::cache::{content_hash, CacheEntry, CacheHeader, CacheManager, CacheStats};
use crate::config::{EngineContext, ParseMode};
use crate::error::{EngineError, Result};
use crate::index::build_index;
use crate::parse::{parse_full, ParseOptions};
use crate::preproc::{CopybookResolver, Preprocessor, PreprocWarning};
use crate::source::format::normalize;
use crate::source::SourceFile;

pub use program::{Program, ProgramSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Idle = 0,
    Loading = 1,
    Indexing = 2,
    Caching = 3,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::Loading => "loading",
            Phase::Indexing => "indexing",
            Phase::Caching => "caching",
        };
        f.write_str(s)
    }
}

/// Poll-only progress signal; replaces callback threading.
#[derive(Debug, Clone, Default)]
pub struct PhaseIndicator(Arc<AtomicU8>);

impl PhaseIndicator {
    fn set(&self, phase: Phase) {
        self.0.store(phase as u8, Ordering::Relaxed);
    }

    pub fn get(&self) -> Phase {
        match self.0.load(Ordering::Relaxed) {
            1 => Phase::Loading,
            2 => Phase::Indexing,
            3 => Phase::Caching,
            _ => Phase::Idle,
        }
    }
}

/// Resets the indicator when a load leaves scope, error paths included.
struct PhaseGuard(PhaseIndicator);

impl Drop for PhaseGuard {
    fn drop(&mut self) {
        self.0.set(Phase::Idle);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Parse the full AST during load.
    pub full: bool,
    /// Skip the cache read (reload semantics); the write still happens.
    pub bypass_cache: bool,
    /// Cancellation deadline checked at the safe points.
    pub deadline: Option<Instant>,
}

/// Per-file results of a batch load.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub loaded: Vec<String>,
    pub failed: Vec<(PathBuf, EngineError)>,
}

pub struct Workspace {
    ctx: EngineContext,
    cache: Option<CacheManager>,
    programs: Vec<Program>,
    copypaths: Vec<PathBuf>,
    /// Environment-supplied roots, appended after workspace paths.
    env_copypaths: Vec<PathBuf>,
    phase: PhaseIndicator,
}

impl Workspace {
    pub fn new(ctx: EngineContext) -> Workspace {
        let cache = match CacheManager::open(&ctx.cache_dir) {
            Ok(c) => Some(c),
            Err(e) => {
                warn!(dir = %ctx.cache_dir.display(), error = %e, "cache unavailable, running uncached");
                None
            }
        };
        Workspace {
            ctx,
            cache,
            programs: Vec::new(),
            copypaths: Vec::new(),
            env_copypaths: Vec::new(),
            phase: PhaseIndicator::default(),
        }
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn set_parse_mode(&mut self, mode: ParseMode) {
        self.ctx.parse_mode = mode;
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.ctx.debug = debug;
    }

    pub fn phase(&self) -> Phase {
        self.phase.get()
    }

    pub fn phase_indicator(&self) -> PhaseIndicator {
        self.phase.clone()
    }

    // ---- copybook search paths ----------------------------------------

    pub fn add_copypath(&mut self, path: PathBuf) {
        if !self.copypaths.contains(&path) {
            self.copypaths.push(path);
        }
    }

    pub fn clear_copypaths(&mut self) {
        self.copypaths.clear();
    }

    pub fn set_env_copypaths(&mut self, paths: Vec<PathBuf>) {
        self.env_copypaths = paths;
    }

    /// Workspace paths first, environment extras after.
    pub fn copypaths(&self) -> Vec<PathBuf> {
        let mut all = self.copypaths.clone();
        all.extend(self.env_copypaths.iter().cloned());
        all
    }

    fn resolver(&self) -> CopybookResolver {
        CopybookResolver::new(self.copypaths())
    }

    /// Resolve and read a copybook's text, for contents queries.
    pub fn copybook_text(&self, name: &str) -> Option<(PathBuf, String)> {
        let path = self.resolver().resolve(name)?;
        let file = SourceFile::read(&path).ok()?;
        Some((path, file.text))
    }

    // ---- programs ------------------------------------------------------

    pub fn get(&self, name: &str) -> Option<&Program> {
        self.programs
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Most recently loaded program, the default query target.
    pub fn current(&self) -> Option<&Program> {
        self.programs.last()
    }

    pub fn programs(&self) -> impl Iterator<Item = &Program> {
        self.programs.iter()
    }

    pub fn list(&self) -> Vec<ProgramSummary> {
        self.programs.iter().map(Program::summary).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    pub fn load(&mut self, path: &Path, opts: &LoadOptions) -> Result<String> {
        let _guard = PhaseGuard(self.phase.clone());
        let name = match self.programs.iter().position(|p| p.path == path) {
            Some(pos) => self.programs[pos].name.clone(),
            None => self.derive_name(path),
        };
        let program = self.build_program(path, name.clone(), opts)?;
        let wants_ast = opts.full || self.ctx.parse_mode == ParseMode::Full;
        let missing_ast = program.ast.is_none();
        match self.programs.iter().position(|p| p.path == path) {
            Some(pos) => {
                self.programs.remove(pos);
                self.programs.push(program);
            }
            None => self.programs.push(program),
        }
        if wants_ast && missing_ast {
            let _ = self.ensure_ast(&name)?;
        }
        Ok(name)
    }

    pub fn load_glob(&mut self, pattern: &str, opts: &LoadOptions) -> Result<BatchOutcome> {
        let paths = glob::glob(pattern)
            .map_err(|e| EngineError::Usage(format!("bad glob pattern: {e}")))?;
        let mut files: Vec<PathBuf> = paths.flatten().filter(|p| p.is_file()).collect();
        files.sort();
        Ok(self.load_many(files, opts))
    }

    pub fn load_dir(&mut self, dir: &Path, opts: &LoadOptions) -> Result<BatchOutcome> {
        if !dir.is_dir() {
            return Err(EngineError::FileAccess {
                path: dir.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            });
        }
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| {
                        matches!(e.to_ascii_lowercase().as_str(), "cbl" | "cob" | "cobol")
                    })
            })
            .collect();
        files.sort();
        Ok(self.load_many(files, opts))
    }

    fn load_many(&mut self, files: Vec<PathBuf>, opts: &LoadOptions) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for path in files {
            match self.load(&path, opts) {
                Ok(name) => outcome.loaded.push(name),
                Err(e) => outcome.failed.push((path, e)),
            }
        }
        outcome
    }

    pub fn unload(&mut self, name: &str) -> Result<()> {
        match self
            .programs
            .iter()
            .position(|p| p.name.eq_ignore_ascii_case(name))
        {
            Some(pos) => {
                self.programs.remove(pos);
                Ok(())
            }
            None => Err(EngineError::Query(format!("no program named {name}"))),
        }
    }

    pub fn unload_all(&mut self) {
        self.programs.clear();
    }

    /// Rebuild one program (or all) from disk, bypassing the cache read. The
    /// old program stays queryable until the replacement is complete.
    pub fn reload(&mut self, name: Option<&str>) -> Result<Vec<String>> {
        let targets: Vec<(usize, String, PathBuf)> = match name {
            Some(n) => {
                let pos = self
                    .programs
                    .iter()
                    .position(|p| p.name.eq_ignore_ascii_case(n))
                    .ok_or_else(|| EngineError::Query(format!("no program named {n}")))?;
                vec![(pos, self.programs[pos].name.clone(), self.programs[pos].path.clone())]
            }
            None => self
                .programs
                .iter()
                .enumerate()
                .map(|(i, p)| (i, p.name.clone(), p.path.clone()))
                .collect(),
        };
        let opts = LoadOptions {
            bypass_cache: true,
            ..LoadOptions::default()
        };
        let mut reloaded = Vec::new();
        for (pos, prog_name, path) in targets {
            let _guard = PhaseGuard(self.phase.clone());
            let program = self.build_program(&path, prog_name.clone(), &opts)?;
            self.programs[pos] = program;
            reloaded.push(prog_name);
        }
        Ok(reloaded)
    }

    /// Full-parse on demand. `Ok(false)` means parsing is unavailable under
    /// the current mode or memory ceiling; callers fall back to the chunk
    /// analyzer.
    pub fn ensure_ast(&mut self, name: &str) -> Result<bool> {
        let resolver = self.resolver();
        let pos = self
            .programs
            .iter()
            .position(|p| p.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| EngineError::Query(format!("no program named {name}")))?;
        if self.programs[pos].ast.is_some() {
            return Ok(true);
        }
        if self.ctx.parse_mode == ParseMode::IndexOnly {
            return Ok(false);
        }
        let outcome = {
            let p = &self.programs[pos];
            let expanded = Preprocessor::new(&resolver).expand(&p.path, &p.source);
            let expanded_bytes: usize = expanded.lines.iter().map(|l| l.text.len() + 1).sum();
            if self.ctx.memory_limit > 0 && expanded_bytes as u64 > self.ctx.memory_limit {
                warn!(
                    program = %p.name,
                    bytes = expanded_bytes,
                    limit = self.ctx.memory_limit,
                    "expanded source over the memory ceiling, skipping full parse"
                );
                return Ok(false);
            }
            parse_full(&expanded, &self.parse_options())
        };
        let (hash, entry) = {
            let p = &mut self.programs[pos];
            p.ast = Some(outcome);
            (
                p.hash.clone(),
                CacheEntry {
                    header: Self::header_for(p),
                    index: p.index.clone(),
                    ast: p.ast.clone(),
                },
            )
        };
        self.cache_put(&hash, &entry);
        Ok(true)
    }

    // ---- cache ---------------------------------------------------------

    pub fn cache_stats(&self) -> Result<CacheStats> {
        match &self.cache {
            Some(c) => c.stats().map_err(|e| EngineError::Cache(e.to_string())),
            None => Ok(CacheStats::default()),
        }
    }

    pub fn cache_clear(&self) -> Result<usize> {
        match &self.cache {
            Some(c) => c.clear().map_err(|e| EngineError::Cache(e.to_string())),
            None => Ok(0),
        }
    }

    /// Drop the cache entry belonging to one loaded program.
    pub fn cache_delete(&self, name: &str) -> Result<bool> {
        let program = self
            .get(name)
            .ok_or_else(|| EngineError::Query(format!("no program named {name}")))?;
        match &self.cache {
            Some(c) => c
                .delete(&program.hash)
                .map_err(|e| EngineError::Cache(e.to_string())),
            None => Ok(false),
        }
    }

    /// Recompute every loaded program and rewrite its cache entry.
    pub fn rebuild_cache(&mut self) -> Result<Vec<String>> {
        self.reload(None)
    }

    fn cache_get(&self, hash: &str) -> Option<CacheEntry> {
        self.cache.as_ref()?.get(hash)
    }

    fn cache_put(&self, hash: &str, entry: &CacheEntry) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(hash, entry) {
                warn!(hash, error = %e, "cache write failed");
            } else if self.ctx.cache_max_bytes > 0 {
                if let Err(e) = cache.enforce_quota(self.ctx.cache_max_bytes) {
                    warn!(error = %e, "cache quota enforcement failed");
                }
            }
        }
    }

    // ---- internals -----------------------------------------------------

    fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            diagnostic_threshold: self.ctx.diagnostic_threshold,
        }
    }

    fn header_for(p: &Program) -> CacheHeader {
        CacheHeader {
            source_path: p.path.display().to_string(),
            source_hash: p.hash.clone(),
            lines: p.lines,
            cached_at: Utc::now(),
            format: p.format,
        }
    }

    fn build_program(&self, path: &Path, name: String, opts: &LoadOptions) -> Result<Program> {
        self.phase.set(Phase::Loading);
        let src = SourceFile::read(path)?;
        let normalized = normalize(&src.text);
        check_deadline(opts)?;

        let hash = content_hash(&src.bytes);
        if !opts.bypass_cache {
            if let Some(entry) = self.cache_get(&hash) {
                debug!(program = %name, hash = %hash, "cache hit");
                let warnings = entry
                    .index
                    .copies
                    .iter()
                    .filter(|c| !c.resolved)
                    .map(|c| PreprocWarning::UnresolvedCopy {
                        name: c.name.clone(),
                        line: c.line,
                    })
                    .collect();
                return Ok(Program {
                    name,
                    path: path.to_path_buf(),
                    hash,
                    encoding: src.encoding,
                    format: entry.header.format,
                    lines: src.line_count(),
                    raw_text: src.text,
                    source: normalized,
                    index: entry.index,
                    ast: entry.ast,
                    warnings,
                    from_cache: true,
                });
            }
        }

        debug!(program = %name, hash = %hash, "cache miss, indexing");
        let resolver = self.resolver();
        let expanded = Preprocessor::new(&resolver).expand(path, &normalized);
        self.phase.set(Phase::Indexing);
        let index = build_index(&expanded);
        check_deadline(opts)?;

        let ast = if opts.full || self.ctx.parse_mode == ParseMode::Full {
            Some(parse_full(&expanded, &self.parse_options()))
        } else {
            None
        };

        self.phase.set(Phase::Caching);
        let entry = CacheEntry {
            header: CacheHeader {
                source_path: path.display().to_string(),
                source_hash: hash.clone(),
                lines: src.line_count(),
                cached_at: Utc::now(),
                format: normalized.format,
            },
            index: index.clone(),
            ast: ast.clone(),
        };
        self.cache_put(&hash, &entry);

        Ok(Program {
            name,
            path: path.to_path_buf(),
            hash,
            encoding: src.encoding,
            format: normalized.format,
            lines: src.line_count(),
            raw_text: src.text,
            source: normalized,
            index,
            ast,
            warnings: expanded.warnings,
            from_cache: false,
        })
    }

    /// Uppercased file stem, uniquified with a bare numeric suffix.
    fn derive_name(&self, path: &Path) -> String {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "PROGRAM".to_string());
        if self.get(&stem).is_none() {
            return stem;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{stem}{n}");
            if self.get(&candidate).is_none() {
                return candidate;
            }
            n += 1;
        }
    }
}

fn check_deadline(opts: &LoadOptions) -> Result<()> {
    if let Some(deadline) = opts.deadline {
        if Instant::now() >= deadline {
            return Err(EngineError::Interrupted);
        }
    }
    Ok(())
}
