//! Shader include and macro preprocessor.
//!
//! Expands `#include "…"` recursively through the [`Vfs`], honours
//! `#pragma once`, injects environment defines as a `#define` prologue and
//! applies `$KEY` replacement arguments to the expanded source. Full macro
//! expansion is left to the downstream shader compiler.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;

use super::environment::CompilerEnvironment;
use crate::vfs::{sibling_path, Vfs};

lazy_static! {
    static ref RE_INCLUDE: Regex = Regex::new(r#"^\s*#\s*include\s+"(?P<path>[^"]*)"\s*$"#).unwrap();
    static ref RE_PRAGMA_ONCE: Regex = Regex::new(r#"^\s*#\s*pragma\s+once\s*$"#).unwrap();
}

#[derive(Debug)]
pub struct PreprocessError {
    pub including_file: String,
    pub line: u32,
    pub header: String,
}

impl fmt::Display for PreprocessError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}({}): unable to resolve include \"{}\"",
            self.including_file, self.line, self.header
        )
    }
}

impl std::error::Error for PreprocessError {}

/// Include resolution order: the including file's directory first, then the
/// header path as given.
fn resolve_include(vfs: &dyn Vfs, including_file: &str, header: &str) -> Option<String> {
    let relative = sibling_path(including_file, header);
    if vfs.exists(&relative) {
        return Some(relative);
    }
    if vfs.exists(header) {
        return Some(header.to_string());
    }
    None
}

fn preprocess_file(
    vfs: &dyn Vfs,
    path: &str,
    source: &str,
    output: &mut String,
    once_seen: &mut HashSet<String>,
    include_stack: &mut Vec<String>,
) -> Result<(), PreprocessError> {
    include_stack.push(path.to_string());

    for (line_index, line) in source.lines().enumerate() {
        if RE_PRAGMA_ONCE.is_match(line) {
            once_seen.insert(path.to_string());
            continue;
        }

        if let Some(captures) = RE_INCLUDE.captures(line) {
            let header = &captures["path"];
            let resolved =
                resolve_include(vfs, path, header).ok_or_else(|| PreprocessError {
                    including_file: path.to_string(),
                    line: line_index as u32 + 1,
                    header: header.to_string(),
                })?;
            if once_seen.contains(&resolved) || include_stack.contains(&resolved) {
                continue;
            }
            // a missing read after a successful exists() counts as unresolvable
            let content = vfs.read_to_string(&resolved).ok_or_else(|| PreprocessError {
                including_file: path.to_string(),
                line: line_index as u32 + 1,
                header: header.to_string(),
            })?;
            preprocess_file(vfs, &resolved, &content, output, once_seen, include_stack)?;
            continue;
        }

        output.push_str(line);
        output.push('\n');
    }

    include_stack.pop();
    Ok(())
}

/// Preprocesses the file at `source_path` for the given environment.
pub fn preprocess(
    vfs: &dyn Vfs,
    source_path: &str,
    environment: &CompilerEnvironment,
) -> Result<String, PreprocessError> {
    let source = vfs.read_to_string(source_path).ok_or_else(|| PreprocessError {
        including_file: source_path.to_string(),
        line: 0,
        header: source_path.to_string(),
    })?;

    let mut output = String::new();
    for (key, value) in environment.defines() {
        if value.is_empty() {
            output.push_str(&format!("#define {}\n", key));
        } else {
            output.push_str(&format!("#define {} {}\n", key, value));
        }
    }

    let mut once_seen = HashSet::new();
    let mut include_stack = Vec::new();
    preprocess_file(
        vfs,
        source_path,
        &source,
        &mut output,
        &mut once_seen,
        &mut include_stack,
    )?;

    for (key, content) in environment.replace_args() {
        output = output.replace(key, content);
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::MemoryVfs;

    #[test]
    fn include_resolution_prefers_sibling() {
        let vfs = MemoryVfs::new()
            .with_file("/shaders/main.hlsl", b"#include \"common.hlsl\"\nfloat4 x;\n")
            .with_file("/shaders/common.hlsl", b"// sibling\n")
            .with_file("common.hlsl", b"// bare\n");
        let out = preprocess(&vfs, "/shaders/main.hlsl", &CompilerEnvironment::new()).unwrap();
        assert!(out.contains("// sibling"));
        assert!(!out.contains("// bare"));
    }

    #[test]
    fn include_falls_back_to_bare_path() {
        let vfs = MemoryVfs::new()
            .with_file("/shaders/main.hlsl", b"#include \"lib/util.hlsl\"\n")
            .with_file("lib/util.hlsl", b"int util;\n");
        let out = preprocess(&vfs, "/shaders/main.hlsl", &CompilerEnvironment::new()).unwrap();
        assert!(out.contains("int util;"));
    }

    #[test]
    fn pragma_once_skips_reinclusion() {
        let vfs = MemoryVfs::new()
            .with_file(
                "/a.hlsl",
                b"#include \"h.hlsl\"\n#include \"h.hlsl\"\nvoid main() {}\n",
            )
            .with_file("/h.hlsl", b"#pragma once\nstruct S {};\n");
        let out = preprocess(&vfs, "/a.hlsl", &CompilerEnvironment::new()).unwrap();
        assert_eq!(out.matches("struct S {};").count(), 1);
        assert!(!out.contains("pragma once"));
    }

    #[test]
    fn missing_include_reports_location() {
        let vfs = MemoryVfs::new().with_file("/a.hlsl", b"float x;\n#include \"nope.hlsl\"\n");
        let err = preprocess(&vfs, "/a.hlsl", &CompilerEnvironment::new()).unwrap_err();
        assert_eq!(err.including_file, "/a.hlsl");
        assert_eq!(err.line, 2);
        assert_eq!(err.header, "nope.hlsl");
    }

    #[test]
    fn defines_and_replace_args_are_applied() {
        let vfs = MemoryVfs::new().with_file("/a.hlsl", b"$PARAMS\nfloat4 main() {}\n");
        let mut env = CompilerEnvironment::new();
        env.set_define_value("USE_FOG", "1");
        env.set_replace_arg("PARAMS", "cbuffer C { float4 tint; };");
        let out = preprocess(&vfs, "/a.hlsl", &env).unwrap();
        assert!(out.starts_with("#define USE_FOG 1\n"));
        assert!(out.contains("cbuffer C { float4 tint; };"));
        assert!(!out.contains("$PARAMS"));
    }
}
