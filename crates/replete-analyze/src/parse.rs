// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Parsing facade over swc
//!
//! The rest of the workspace never touches the parser directly; it consumes
//! a [`ParsedModule`] and byte-offset ranges derived from swc spans.

use crate::error::{AnalyzeError, Result};
use std::ops::Range;
use swc_common::{sync::Lrc, BytePos, FileName, SourceMap, Span, Spanned};
use swc_ecma_ast::{EsVersion, Module};
use swc_ecma_parser::{lexer::Lexer, EsConfig, Parser, StringInput, Syntax};

/// A parsed ECMAScript module together with the bookkeeping needed to map
/// its spans back to byte offsets of the original source string.
#[derive(Debug)]
pub struct ParsedModule {
    /// The swc module AST
    pub module: Module,
    /// Global offset of the source file inside the swc source map
    base: BytePos,
    /// Length of the source, used to clamp degenerate spans
    len: usize,
}

impl ParsedModule {
    /// Convert an AST span to a byte range of the source string.
    pub fn range(&self, span: Span) -> Range<usize> {
        let lo = span.lo.0.saturating_sub(self.base.0) as usize;
        let hi = span.hi.0.saturating_sub(self.base.0) as usize;
        lo.min(self.len)..hi.min(self.len)
    }
}

/// Parse `source` as an ECMAScript module.
///
/// Latest-syntax ES only; this is a REPL, not a build tool, so no JSX and
/// no TypeScript. Errors carry the 1-based line of the first diagnostic.
pub fn parse(source: &str) -> Result<ParsedModule> {
    let source_map: Lrc<SourceMap> = Lrc::default();
    let file = source_map.new_source_file(FileName::Anon, source.to_string());
    let lexer = Lexer::new(
        Syntax::Es(EsConfig::default()),
        EsVersion::EsNext,
        StringInput::from(&*file),
        None,
    );
    let mut parser = Parser::new_from(lexer);
    let base = file.start_pos;
    let to_error = |error: swc_ecma_parser::error::Error| {
        let offset = error.span().lo.0.saturating_sub(base.0) as usize;
        AnalyzeError::Parse {
            message: error.into_kind().msg().to_string(),
            line: line_of(source, offset),
        }
    };
    let module = parser.parse_module().map_err(to_error)?;
    if let Some(error) = parser.take_errors().into_iter().next() {
        return Err(to_error(error));
    }
    Ok(ParsedModule {
        module,
        base,
        len: source.len(),
    })
}

/// 1-based line number containing byte `offset`.
fn line_of(source: &str, offset: usize) -> usize {
    let offset = offset.min(source.len());
    source[..offset].bytes().filter(|&b| b == b'\n').count() + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_module() {
        let parsed = parse("import a from \"./a.js\";\nexport default a;\n").unwrap();
        assert_eq!(parsed.module.body.len(), 2);
    }

    #[test]
    fn test_range_maps_to_source() {
        let source = "let x = 1;";
        let parsed = parse(source).unwrap();
        let span = match &parsed.module.body[0] {
            swc_ecma_ast::ModuleItem::Stmt(swc_ecma_ast::Stmt::Decl(
                swc_ecma_ast::Decl::Var(var),
            )) => var.span,
            other => panic!("unexpected item: {:?}", other),
        };
        assert_eq!(&source[parsed.range(span)], "let x = 1;");
    }

    #[test]
    fn test_parse_error_carries_line() {
        let err = parse("let a = 1;\nlet = ;\n").unwrap_err();
        match err {
            AnalyzeError::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_top_level_await_parses() {
        assert!(parse("const a = await fetch(\"x\");").is_ok());
    }
}
