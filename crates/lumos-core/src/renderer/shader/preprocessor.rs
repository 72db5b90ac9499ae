// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Text preprocessing of unified shader sources.
//!
//! Supported directives, one per line:
//!
//! * `#shader <stage>` starts the source of a stage; text before the first
//!   marker is shared by every stage.
//! * `#include "path"` (or `<path>`) pastes another file, resolved through an
//!   [`IncludeResolver`]. `#pragma once` makes a file include-once.
//! * `#define NAME [value]`, `#undef NAME`.
//! * `#if EXPR`, `#ifdef NAME`, `#ifndef NAME`, `#elif EXPR`, `#else`, `#endif`.
//!   `EXPR` is `NAME`, `!NAME`, `defined(NAME)` or an integer.
//!
//! Other `#` lines are kept as they are. Defines with a value are substituted
//! wherever their name appears as a whole identifier.

use crate::renderer::api::shader::ShaderStage;
use crate::renderer::error::ShaderError;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Supplies the text of `#include`d files.
pub trait IncludeResolver {
    /// Returns a canonical id for the file and its contents.
    ///
    /// `includer` is the canonical id of the file holding the directive,
    /// which lets resolvers support paths relative to it.
    fn resolve(&self, path: &str, includer: Option<&str>) -> Result<(String, String), ShaderError>;
}

/// Resolves includes from the filesystem, relative to the including file
/// first and to a root directory second.
#[derive(Debug, Clone)]
pub struct FileIncludeResolver {
    root: PathBuf,
}

impl FileIncludeResolver {
    /// Creates a resolver rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl IncludeResolver for FileIncludeResolver {
    fn resolve(&self, path: &str, includer: Option<&str>) -> Result<(String, String), ShaderError> {
        let mut candidates = Vec::with_capacity(2);
        if let Some(parent) = includer.and_then(|i| Path::new(i).parent()) {
            candidates.push(parent.join(path));
        }
        candidates.push(self.root.join(path));

        for candidate in &candidates {
            if candidate.is_file() {
                let text =
                    std::fs::read_to_string(candidate).map_err(|e| ShaderError::LoadError {
                        path: candidate.display().to_string(),
                        source_error: e.to_string(),
                    })?;
                return Ok((candidate.display().to_string(), text));
            }
        }
        Err(ShaderError::LoadError {
            path: path.to_string(),
            source_error: format!("not found under '{}'", self.root.display()),
        })
    }
}

/// Resolves includes from an in-memory table (shaders compiled into the binary).
#[derive(Debug, Clone, Default)]
pub struct EmbeddedIncludes {
    files: HashMap<String, String>,
}

impl EmbeddedIncludes {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file, builder style.
    pub fn with(mut self, path: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(path, source);
        self
    }

    /// Adds a file.
    pub fn insert(&mut self, path: impl Into<String>, source: impl Into<String>) {
        self.files.insert(path.into(), source.into());
    }
}

impl IncludeResolver for EmbeddedIncludes {
    fn resolve(&self, path: &str, _includer: Option<&str>) -> Result<(String, String), ShaderError> {
        self.files
            .get(path)
            .map(|source| (path.to_string(), source.clone()))
            .ok_or_else(|| ShaderError::LoadError {
                path: path.to_string(),
                source_error: "no embedded file with this name".to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy)]
struct Conditional {
    parent_active: bool,
    taken: bool,
    active: bool,
    seen_else: bool,
}

/// Expands includes and conditionals, then splits stages.
pub struct Preprocessor<'r> {
    resolver: &'r dyn IncludeResolver,
    defines: HashMap<String, String>,
    include_stack: Vec<String>,
    once: HashSet<String>,
}

impl<'r> Preprocessor<'r> {
    /// Creates a preprocessor using `resolver` for includes.
    pub fn new(resolver: &'r dyn IncludeResolver) -> Self {
        Self {
            resolver,
            defines: HashMap::new(),
            include_stack: Vec::new(),
            once: HashSet::new(),
        }
    }

    /// Predefines `name` (empty `value` only marks it defined).
    pub fn define(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defines.insert(name.into(), value.into());
        self
    }

    /// Whether `name` is currently defined.
    pub fn is_defined(&self, name: &str) -> bool {
        self.defines.contains_key(name)
    }

    /// Runs the whole pipeline on `source` and returns one source per stage.
    ///
    /// When the text has no `#shader` marker the map is empty and the caller
    /// decides stages from the module's entry points.
    pub fn run(
        &mut self,
        source: &str,
        origin: &str,
    ) -> Result<BTreeMap<ShaderStage, String>, ShaderError> {
        let expanded = self.expand(source, origin)?;
        split_stages(&expanded, origin)
    }

    /// Expands includes, conditionals and defines without splitting stages.
    pub fn expand(&mut self, source: &str, origin: &str) -> Result<String, ShaderError> {
        if self.include_stack.iter().any(|entry| entry == origin) {
            let mut chain = self.include_stack.join(" -> ");
            chain.push_str(" -> ");
            chain.push_str(origin);
            return Err(ShaderError::CompilationError {
                label: origin.to_string(),
                details: format!("include cycle: {chain}"),
            });
        }
        self.include_stack.push(origin.to_string());
        let result = self.expand_inner(source, origin);
        self.include_stack.pop();
        result
    }

    fn expand_inner(&mut self, source: &str, origin: &str) -> Result<String, ShaderError> {
        let mut out = String::with_capacity(source.len());
        let mut stack: Vec<Conditional> = Vec::new();
        let error = |line: usize, details: String| ShaderError::CompilationError {
            label: format!("{origin}:{}", line + 1),
            details,
        };

        for (line_no, line) in source.lines().enumerate() {
            let trimmed = line.trim_start();
            let active = stack.last().map_or(true, |c| c.active);

            let Some(directive) = trimmed.strip_prefix('#') else {
                if active {
                    out.push_str(&self.substitute(line));
                    out.push('\n');
                }
                continue;
            };
            let directive = directive.trim_start();
            let (keyword, rest) = directive
                .split_once(char::is_whitespace)
                .map(|(k, r)| (k, r.trim()))
                .unwrap_or((directive.trim_end(), ""));

            match keyword {
                "if" | "ifdef" | "ifndef" => {
                    let value = match keyword {
                        "ifdef" => self.is_defined(rest),
                        "ifndef" => !self.is_defined(rest),
                        _ => self.evaluate(rest).map_err(|e| error(line_no, e))?,
                    };
                    stack.push(Conditional {
                        parent_active: active,
                        taken: value,
                        active: active && value,
                        seen_else: false,
                    });
                }
                "elif" => {
                    let value = self.evaluate(rest).map_err(|e| error(line_no, e))?;
                    let top = stack
                        .last_mut()
                        .ok_or_else(|| error(line_no, "#elif without #if".into()))?;
                    if top.seen_else {
                        return Err(error(line_no, "#elif after #else".into()));
                    }
                    top.active = top.parent_active && !top.taken && value;
                    top.taken |= value;
                }
                "else" => {
                    let top = stack
                        .last_mut()
                        .ok_or_else(|| error(line_no, "#else without #if".into()))?;
                    if top.seen_else {
                        return Err(error(line_no, "duplicate #else".into()));
                    }
                    top.seen_else = true;
                    top.active = top.parent_active && !top.taken;
                    top.taken = true;
                }
                "endif" => {
                    stack
                        .pop()
                        .ok_or_else(|| error(line_no, "#endif without #if".into()))?;
                }
                _ if !active => {}
                "define" => {
                    let (name, value) = rest
                        .split_once(char::is_whitespace)
                        .map(|(n, v)| (n, v.trim()))
                        .unwrap_or((rest, ""));
                    if name.is_empty() {
                        return Err(error(line_no, "#define without a name".into()));
                    }
                    self.defines.insert(name.to_string(), value.to_string());
                }
                "undef" => {
                    self.defines.remove(rest);
                }
                "include" => {
                    let path = rest
                        .strip_prefix('"')
                        .and_then(|r| r.strip_suffix('"'))
                        .or_else(|| rest.strip_prefix('<').and_then(|r| r.strip_suffix('>')))
                        .ok_or_else(|| error(line_no, format!("malformed include '{rest}'")))?;
                    let (id, text) = self.resolver.resolve(path, Some(origin))?;
                    if self.once.contains(&id) {
                        continue;
                    }
                    let included = self.expand(&text, &id)?;
                    out.push_str(&included);
                    if !included.ends_with('\n') {
                        out.push('\n');
                    }
                }
                "pragma" if rest == "once" => {
                    self.once.insert(origin.to_string());
                }
                _ => {
                    out.push_str(line);
                    out.push('\n');
                }
            }
        }

        if !stack.is_empty() {
            return Err(ShaderError::CompilationError {
                label: origin.to_string(),
                details: format!("{} unterminated conditional block(s)", stack.len()),
            });
        }
        Ok(out)
    }

    fn evaluate(&self, expr: &str) -> Result<bool, String> {
        let expr = expr.trim();
        if let Some(inner) = expr.strip_prefix('!') {
            return self.evaluate(inner).map(|v| !v);
        }
        if let Some(name) = expr
            .strip_prefix("defined(")
            .and_then(|r| r.strip_suffix(')'))
        {
            return Ok(self.is_defined(name.trim()));
        }
        if let Ok(value) = expr.parse::<i64>() {
            return Ok(value != 0);
        }
        if expr.is_empty() || !expr.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(format!("unsupported #if expression '{expr}'"));
        }
        Ok(match self.defines.get(expr) {
            Some(value) => value.trim() != "0" && !value.trim().eq_ignore_ascii_case("false"),
            None => false,
        })
    }

    fn substitute(&self, line: &str) -> String {
        if self.defines.values().all(|v| v.is_empty()) {
            return line.to_string();
        }
        let mut out = String::with_capacity(line.len());
        let mut ident = String::new();
        let flush = |ident: &mut String, out: &mut String| {
            match self.defines.get(ident.as_str()) {
                Some(value) if !value.is_empty() => out.push_str(value),
                _ => out.push_str(ident),
            }
            ident.clear();
        };
        for c in line.chars() {
            if c.is_alphanumeric() || c == '_' {
                ident.push(c);
            } else {
                if !ident.is_empty() {
                    flush(&mut ident, &mut out);
                }
                out.push(c);
            }
        }
        if !ident.is_empty() {
            flush(&mut ident, &mut out);
        }
        out
    }
}

/// Splits expanded text on `#shader` markers.
pub fn split_stages(
    source: &str,
    origin: &str,
) -> Result<BTreeMap<ShaderStage, String>, ShaderError> {
    let mut shared = String::new();
    let mut stages: BTreeMap<ShaderStage, String> = BTreeMap::new();
    let mut current: Option<ShaderStage> = None;

    for line in source.lines() {
        if let Some(rest) = line.trim_start().strip_prefix("#shader") {
            let stage =
                ShaderStage::from_marker(rest).ok_or_else(|| ShaderError::CompilationError {
                    label: origin.to_string(),
                    details: format!("unknown shader stage '{}'", rest.trim()),
                })?;
            if stages.contains_key(&stage) {
                return Err(ShaderError::CompilationError {
                    label: origin.to_string(),
                    details: format!("stage {stage} declared twice"),
                });
            }
            stages.insert(stage, shared.clone());
            current = Some(stage);
            continue;
        }
        let target = match current {
            Some(stage) => stages.entry(stage).or_default(),
            None => &mut shared,
        };
        target.push_str(line);
        target.push('\n');
    }
    Ok(stages)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(resolver: &EmbeddedIncludes, source: &str) -> BTreeMap<ShaderStage, String> {
        Preprocessor::new(resolver).run(source, "main.wgsl").unwrap()
    }

    #[test]
    fn splits_stages_and_prepends_shared_text() {
        let source = "struct Common { a: f32 }\n#shader vertex\nfn vs() {}\n#shader fragment\nfn fs() {}\n";
        let stages = run(&EmbeddedIncludes::new(), source);
        assert_eq!(stages.len(), 2);
        assert!(stages[&ShaderStage::Vertex].starts_with("struct Common"));
        assert!(stages[&ShaderStage::Vertex].contains("fn vs()"));
        assert!(!stages[&ShaderStage::Vertex].contains("fn fs()"));
        assert!(stages[&ShaderStage::Fragment].contains("struct Common"));
    }

    #[test]
    fn no_marker_yields_no_stage() {
        let stages = run(&EmbeddedIncludes::new(), "fn main() {}\n");
        assert!(stages.is_empty());
    }

    #[test]
    fn includes_are_expanded_once_with_pragma() {
        let includes = EmbeddedIncludes::new()
            .with("common.wgsl", "#pragma once\nconst PI: f32 = 3.14;\n");
        let source = "#include \"common.wgsl\"\n#include <common.wgsl>\n#shader vertex\nfn vs() {}\n";
        let stages = run(&includes, source);
        assert_eq!(stages[&ShaderStage::Vertex].matches("const PI").count(), 1);
    }

    #[test]
    fn include_cycles_are_rejected() {
        let includes = EmbeddedIncludes::new()
            .with("a.wgsl", "#include \"b.wgsl\"\n")
            .with("b.wgsl", "#include \"a.wgsl\"\n");
        let err = Preprocessor::new(&includes)
            .run("#include \"a.wgsl\"\n", "main.wgsl")
            .unwrap_err();
        match err {
            ShaderError::CompilationError { details, .. } => {
                assert!(details.contains("include cycle"), "{details}");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_include_is_a_load_error() {
        let err = Preprocessor::new(&EmbeddedIncludes::new())
            .run("#include \"nope.wgsl\"\n", "main.wgsl")
            .unwrap_err();
        assert!(matches!(err, ShaderError::LoadError { .. }));
    }

    #[test]
    fn conditionals_nest_and_respect_else() {
        let source = "\
#define SHADOWS
#ifdef SHADOWS
shadows_on
#if PCF
pcf_on
#elif defined(SHADOWS)
pcf_off
#else
never
#endif
#else
shadows_off
#endif
#ifndef SHADOWS
hidden
#endif
";
        let out = Preprocessor::new(&EmbeddedIncludes::new())
            .expand(source, "main.wgsl")
            .unwrap();
        assert!(out.contains("shadows_on"));
        assert!(out.contains("pcf_off"));
        assert!(!out.contains("pcf_on"));
        assert!(!out.contains("never"));
        assert!(!out.contains("shadows_off"));
        assert!(!out.contains("hidden"));
    }

    #[test]
    fn valued_defines_are_substituted() {
        let out = Preprocessor::new(&EmbeddedIncludes::new())
            .define("MAX_LIGHTS", "32")
            .expand("var<uniform> l: array<Light, MAX_LIGHTS>;\nlet MAX_LIGHTS_X = 1;\n", "m")
            .unwrap();
        assert!(out.contains("array<Light, 32>"));
        assert!(out.contains("MAX_LIGHTS_X"));
    }

    #[test]
    fn unterminated_if_is_an_error() {
        let result = Preprocessor::new(&EmbeddedIncludes::new()).expand("#if 1\nx\n", "m");
        assert!(result.is_err());
    }

    #[test]
    fn unknown_stage_marker_is_an_error() {
        assert!(split_stages("#shader tessellation\n", "m").is_err());
    }
}
