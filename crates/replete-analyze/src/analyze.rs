// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Static analysis of ECMAScript modules
//!
//! Two walks over the AST:
//! - an exhaustive walk collecting `import`/`export` statements, dynamic
//!   specifier sites, and `import.meta.main` sites (imports may appear only
//!   at the top level, but `import()` and `import.meta.*` may appear
//!   anywhere);
//! - a top-level walk that does not descend into functions, collecting
//!   value-producing expression statements and the top-level-await flag.

use crate::parse::ParsedModule;
use std::ops::Range;
use swc_common::Spanned;
use swc_ecma_ast::{
    ArrowExpr, AwaitExpr, CallExpr, Callee, Class, Expr, ExportAll, ExportDecl,
    ExportDefaultDecl, ExportDefaultExpr, ExprStmt, ForOfStmt, Function, GetterProp, ImportDecl,
    ImportSpecifier, Lit, MemberExpr, MemberProp, MetaPropExpr, MetaPropKind, ModuleExportName,
    NamedExport, NewExpr, SetterProp,
};
use swc_ecma_visit::{noop_visit_type, Visit, VisitWith};

/// One named binding of a static import: `import { imported as local }`.
#[derive(Debug, Clone)]
pub struct NamedBinding {
    /// Name exported by the imported module
    pub imported: String,
    /// Local alias it is bound to
    pub local: String,
}

/// A static `import` declaration.
#[derive(Debug, Clone)]
pub struct StaticImport {
    /// Byte range of the whole statement
    pub range: Range<usize>,
    /// The specifier string
    pub specifier: String,
    /// Byte range of the specifier literal, quotes included
    pub specifier_range: Range<usize>,
    /// Local name of the default import, if any
    pub default: Option<String>,
    /// Local name of a namespace import (`* as ns`), if any
    pub namespace: Option<String>,
    /// Named bindings
    pub named: Vec<NamedBinding>,
}

/// What kind of export statement a site is, with the offsets the REPL-izer
/// needs to rewrite it.
#[derive(Debug, Clone)]
pub enum ExportKind {
    /// `export default X`; `body_start` is the offset of `X`
    Default {
        /// Offset where the exported expression or declaration begins
        body_start: usize,
    },
    /// `export <decl>`; `decl_start` is the offset of the declaration
    Declaration {
        /// Offset where the bare declaration begins
        decl_start: usize,
    },
    /// `export { … } [from …]`
    Named,
    /// `export * [as ns] from …`
    All,
}

/// An export statement.
#[derive(Debug, Clone)]
pub struct ExportSite {
    /// Byte range of the whole statement
    pub range: Range<usize>,
    /// Statement kind
    pub kind: ExportKind,
    /// Re-export source specifier and its literal range, if present
    pub specifier: Option<(String, Range<usize>)>,
}

/// A dynamic specifier site.
///
/// The three forms `import("x")`, `import.meta.resolve("x")`, and
/// `new URL("./x", import.meta.url)` replace different spans depending on
/// whether the surrounding text will be evaluated as a module or a script,
/// so each site carries both ranges.
#[derive(Debug, Clone)]
pub struct DynamicSite {
    /// The specifier string
    pub specifier: String,
    /// Range to replace when the text stays a module
    pub module_range: Range<usize>,
    /// Range to replace when the text becomes a script
    pub script_range: Range<usize>,
}

/// A specifier occurrence in module-context form, used for dependency
/// hashing and server-side rewriting.
#[derive(Debug, Clone)]
pub struct SpecifierSite {
    /// The specifier string
    pub specifier: String,
    /// Module-context replacement range (the literal, quotes included)
    pub range: Range<usize>,
}

/// Everything the exhaustive walk finds.
#[derive(Debug, Clone, Default)]
pub struct ModuleAnalysis {
    /// Static imports in source order
    pub imports: Vec<StaticImport>,
    /// Export statements in source order
    pub exports: Vec<ExportSite>,
    /// Dynamic specifier sites
    pub dynamics: Vec<DynamicSite>,
    /// `import.meta.main` sites
    pub mains: Vec<Range<usize>>,
}

impl ModuleAnalysis {
    /// Every specifier the module depends on — static imports, re-exports,
    /// and dynamic sites — in source order, each with its module-context
    /// replacement range.
    pub fn specifier_sites(&self) -> Vec<SpecifierSite> {
        let mut sites: Vec<SpecifierSite> = self
            .imports
            .iter()
            .map(|import| SpecifierSite {
                specifier: import.specifier.clone(),
                range: import.specifier_range.clone(),
            })
            .chain(self.exports.iter().filter_map(|export| {
                export.specifier.as_ref().map(|(specifier, range)| SpecifierSite {
                    specifier: specifier.clone(),
                    range: range.clone(),
                })
            }))
            .chain(self.dynamics.iter().map(|dynamic| SpecifierSite {
                specifier: dynamic.specifier.clone(),
                range: dynamic.module_range.clone(),
            }))
            .collect();
        sites.sort_by_key(|site| site.range.start);
        sites
    }
}

/// The top-level walk's findings.
#[derive(Debug, Clone, Default)]
pub struct TopAnalysis {
    /// Start offsets of value-producing expression statements, source order
    pub value_starts: Vec<usize>,
    /// Whether the module awaits at the top level
    pub wait: bool,
}

/// Run the exhaustive walk.
pub fn analyze(parsed: &ParsedModule) -> ModuleAnalysis {
    let mut collector = Collector {
        parsed,
        analysis: ModuleAnalysis::default(),
    };
    parsed.module.visit_with(&mut collector);
    collector.analysis
}

/// Run the top-level walk.
pub fn analyze_top(parsed: &ParsedModule) -> TopAnalysis {
    let mut walk = TopWalk {
        parsed,
        top: TopAnalysis::default(),
    };
    parsed.module.visit_with(&mut walk);
    walk.top.value_starts.sort_unstable();
    walk.top
}

struct Collector<'a> {
    parsed: &'a ParsedModule,
    analysis: ModuleAnalysis,
}

fn is_import_meta(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::MetaProp(MetaPropExpr {
            kind: MetaPropKind::ImportMeta,
            ..
        })
    )
}

fn is_import_meta_url(expr: &Expr) -> bool {
    match expr {
        Expr::Member(member) => {
            is_import_meta(&member.obj)
                && matches!(&member.prop, MemberProp::Ident(prop) if prop.sym == *"url")
        }
        _ => false,
    }
}

/// The predicate deciding which `new URL(x, import.meta.url)` first
/// arguments count as dynamic specifier sites: `./…` and `../…` only.
/// Absolute-path and fully-qualified forms are left untouched.
fn url_argument_is_relative(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../")
}

fn export_name(name: &ModuleExportName) -> String {
    match name {
        ModuleExportName::Ident(ident) => ident.sym.to_string(),
        ModuleExportName::Str(text) => text.value.to_string(),
    }
}

impl Visit for Collector<'_> {
    noop_visit_type!();

    fn visit_import_decl(&mut self, n: &ImportDecl) {
        let mut import = StaticImport {
            range: self.parsed.range(n.span),
            specifier: n.src.value.to_string(),
            specifier_range: self.parsed.range(n.src.span),
            default: None,
            namespace: None,
            named: Vec::new(),
        };
        for specifier in &n.specifiers {
            match specifier {
                ImportSpecifier::Default(default) => {
                    import.default = Some(default.local.sym.to_string());
                }
                ImportSpecifier::Namespace(namespace) => {
                    import.namespace = Some(namespace.local.sym.to_string());
                }
                ImportSpecifier::Named(named) => {
                    let imported = named
                        .imported
                        .as_ref()
                        .map(export_name)
                        .unwrap_or_else(|| named.local.sym.to_string());
                    import.named.push(NamedBinding {
                        imported,
                        local: named.local.sym.to_string(),
                    });
                }
            }
        }
        self.analysis.imports.push(import);
    }

    fn visit_export_decl(&mut self, n: &ExportDecl) {
        self.analysis.exports.push(ExportSite {
            range: self.parsed.range(n.span),
            kind: ExportKind::Declaration {
                decl_start: self.parsed.range(n.decl.span()).start,
            },
            specifier: None,
        });
        n.visit_children_with(self);
    }

    fn visit_export_default_decl(&mut self, n: &ExportDefaultDecl) {
        self.analysis.exports.push(ExportSite {
            range: self.parsed.range(n.span),
            kind: ExportKind::Default {
                body_start: self.parsed.range(n.decl.span()).start,
            },
            specifier: None,
        });
        n.visit_children_with(self);
    }

    fn visit_export_default_expr(&mut self, n: &ExportDefaultExpr) {
        self.analysis.exports.push(ExportSite {
            range: self.parsed.range(n.span),
            kind: ExportKind::Default {
                body_start: self.parsed.range(n.expr.span()).start,
            },
            specifier: None,
        });
        n.visit_children_with(self);
    }

    fn visit_named_export(&mut self, n: &NamedExport) {
        self.analysis.exports.push(ExportSite {
            range: self.parsed.range(n.span),
            kind: ExportKind::Named,
            specifier: n
                .src
                .as_ref()
                .map(|src| (src.value.to_string(), self.parsed.range(src.span))),
        });
    }

    fn visit_export_all(&mut self, n: &ExportAll) {
        self.analysis.exports.push(ExportSite {
            range: self.parsed.range(n.span),
            kind: ExportKind::All,
            specifier: Some((n.src.value.to_string(), self.parsed.range(n.src.span))),
        });
    }

    fn visit_call_expr(&mut self, n: &CallExpr) {
        match &n.callee {
            Callee::Import(_) => {
                // import("x"): both ranges are the string literal itself.
                if let Some(argument) = n.args.first() {
                    if argument.spread.is_none() {
                        if let Expr::Lit(Lit::Str(text)) = &*argument.expr {
                            let range = self.parsed.range(text.span);
                            self.analysis.dynamics.push(DynamicSite {
                                specifier: text.value.to_string(),
                                module_range: range.clone(),
                                script_range: range,
                            });
                        }
                    }
                }
            }
            Callee::Expr(callee) => {
                // import.meta.resolve("x"): both ranges span the whole call,
                // because import.meta is illegal in script context.
                if let Expr::Member(member) = &**callee {
                    if is_import_meta(&member.obj)
                        && matches!(&member.prop, MemberProp::Ident(prop) if prop.sym == *"resolve")
                        && n.args.len() == 1
                        && n.args[0].spread.is_none()
                    {
                        if let Expr::Lit(Lit::Str(text)) = &*n.args[0].expr {
                            let range = self.parsed.range(n.span);
                            self.analysis.dynamics.push(DynamicSite {
                                specifier: text.value.to_string(),
                                module_range: range.clone(),
                                script_range: range,
                            });
                        }
                    }
                }
            }
            Callee::Super(_) => {}
        }
        n.visit_children_with(self);
    }

    fn visit_new_expr(&mut self, n: &NewExpr) {
        // new URL("./x", import.meta.url): in module context only the first
        // argument is replaced (import.meta.url stays valid); in script
        // context the entire argument list goes.
        if let Expr::Ident(callee) = &*n.callee {
            if callee.sym == *"URL" {
                if let Some(args) = &n.args {
                    if args.len() == 2 && args[0].spread.is_none() && args[1].spread.is_none() {
                        if let Expr::Lit(Lit::Str(text)) = &*args[0].expr {
                            if url_argument_is_relative(&text.value)
                                && is_import_meta_url(&args[1].expr)
                            {
                                let first = self.parsed.range(text.span);
                                let last = self.parsed.range(args[1].expr.span());
                                self.analysis.dynamics.push(DynamicSite {
                                    specifier: text.value.to_string(),
                                    module_range: first.clone(),
                                    script_range: first.start..last.end,
                                });
                            }
                        }
                    }
                }
            }
        }
        n.visit_children_with(self);
    }

    fn visit_member_expr(&mut self, n: &MemberExpr) {
        if is_import_meta(&n.obj) {
            if let MemberProp::Ident(prop) = &n.prop {
                if prop.sym == *"main" {
                    self.analysis.mains.push(self.parsed.range(n.span));
                }
            }
        }
        n.visit_children_with(self);
    }
}

struct TopWalk<'a> {
    parsed: &'a ParsedModule,
    top: TopAnalysis,
}

impl Visit for TopWalk<'_> {
    noop_visit_type!();

    // Function bodies are not top level.
    fn visit_function(&mut self, _: &Function) {}
    fn visit_arrow_expr(&mut self, _: &ArrowExpr) {}
    fn visit_class(&mut self, _: &Class) {}
    fn visit_getter_prop(&mut self, _: &GetterProp) {}
    fn visit_setter_prop(&mut self, _: &SetterProp) {}

    fn visit_expr_stmt(&mut self, n: &ExprStmt) {
        self.top.value_starts.push(self.parsed.range(n.span).start);
        n.visit_children_with(self);
    }

    fn visit_await_expr(&mut self, n: &AwaitExpr) {
        self.top.wait = true;
        n.visit_children_with(self);
    }

    fn visit_for_of_stmt(&mut self, n: &ForOfStmt) {
        if n.is_await {
            self.top.wait = true;
        }
        n.visit_children_with(self);
    }
}
