// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! REPL-ization: turning a module into an `eval`-safe script
//!
//! The produced script, evaluated in sloppy mode by an indirect `eval`,
//! leaves every top-level declaration assigned on a named scope object,
//! stores the final value-producing expression's value in `$value`, and
//! returns a promise exactly when the module awaits at the top level.
//! `import` bindings are read out of a `$imports` array that the caller
//! binds on the global object beforehand.

use crate::analyze::{ExportKind, ModuleAnalysis, StaticImport, TopAnalysis};
use crate::error::{AnalyzeError, Result};
use crate::parse::ParsedModule;
use crate::rewrite::{apply, quote, Edit};
use swc_common::Spanned;
use swc_ecma_ast::{Decl, Ident, ModuleDecl, ModuleItem, Pat, Stmt, VarDeclKind};
use swc_ecma_utils::find_pat_ids;

/// Produce the `eval`-safe script for one evaluation.
///
/// `resolved_dynamics` must be parallel to `analysis.dynamics`; each entry
/// is the fully resolved URL that replaces the site's script-context range.
pub fn scriptify(
    source: &str,
    parsed: &ParsedModule,
    analysis: &ModuleAnalysis,
    top: &TopAnalysis,
    resolved_dynamics: &[String],
    scope: &str,
) -> Result<String> {
    if resolved_dynamics.len() != analysis.dynamics.len() {
        return Err(AnalyzeError::SpecifierArity {
            expected: analysis.dynamics.len(),
            got: resolved_dynamics.len(),
        });
    }

    let mut edits: Vec<Edit> = Vec::new();
    let mut names: Vec<String> = Vec::new();
    let mut hoisted = String::new();

    for import in &analysis.imports {
        edits.push(Edit::erase(import.range.clone()));
    }
    for export in &analysis.exports {
        match export.kind {
            ExportKind::Named | ExportKind::All => {
                edits.push(Edit::erase(export.range.clone()));
            }
            ExportKind::Default { body_start } => {
                edits.push(Edit::replace(
                    export.range.start..body_start,
                    "$default = ",
                ));
            }
            ExportKind::Declaration { decl_start } => {
                edits.push(Edit::erase(export.range.start..decl_start));
            }
        }
    }
    for item in &parsed.module.body {
        match item {
            ModuleItem::Stmt(Stmt::Decl(decl)) => {
                declaration_edits(decl, parsed, &mut edits, &mut names, &mut hoisted);
            }
            ModuleItem::ModuleDecl(ModuleDecl::ExportDecl(export)) => {
                declaration_edits(&export.decl, parsed, &mut edits, &mut names, &mut hoisted);
            }
            _ => {}
        }
    }
    for (site, resolved) in analysis.dynamics.iter().zip(resolved_dynamics) {
        edits.push(Edit::replace(site.script_range.clone(), quote(resolved)));
    }
    for main in &analysis.mains {
        edits.push(Edit::replace(main.clone(), "true"));
    }
    if top.wait {
        for start in &top.value_starts {
            edits.push(Edit::insert(*start, "$await = "));
        }
    }

    let edited = apply(source, edits)?;
    let payload = if top.wait {
        format!(
            "(async function () {{ let $await; {hoisted}{edited}\nreturn $await;\n}}())"
        )
    } else {
        format!("{hoisted}{edited}")
    };

    Ok(harness(&payload, analysis, &names, scope))
}

/// Strip declaration keywords and remember the declared names, so that the
/// remaining assignments write through the `with` frame into the scope.
fn declaration_edits(
    decl: &Decl,
    parsed: &ParsedModule,
    edits: &mut Vec<Edit>,
    names: &mut Vec<String>,
    hoisted: &mut String,
) {
    match decl {
        Decl::Var(var) => {
            let keyword = match var.kind {
                VarDeclKind::Var | VarDeclKind::Let => 3,
                VarDeclKind::Const => 5,
            };
            let start = parsed.range(var.span).start;
            edits.push(Edit::erase(start..start + keyword));
            for declarator in &var.decls {
                let identifiers: Vec<Ident> = find_pat_ids(&declarator.name);
                for identifier in identifiers {
                    remember(names, identifier.sym.to_string());
                }
                let range = parsed.range(declarator.span());
                if matches!(declarator.name, Pat::Object(_)) {
                    // An assignment to an object pattern cannot begin a
                    // statement, so the whole declarator gets parentheses.
                    edits.push(Edit::insert(range.start, "("));
                    edits.push(Edit::insert(range.end, ")"));
                }
                if declarator.init.is_none() {
                    edits.push(Edit::insert(range.end, " = undefined"));
                }
            }
        }
        Decl::Fn(function) => {
            // Rename the declaration so hoisting still works, then assign
            // the hoisted value to the original name at script start.
            let name = function.ident.sym.to_string();
            edits.push(Edit::replace(
                parsed.range(function.ident.span),
                format!("${name}"),
            ));
            hoisted.push_str(&format!("{name} = ${name}; "));
            remember(names, name);
        }
        Decl::Class(class) => {
            // Classes are neither hoisted nor idempotently redeclarable,
            // so the declaration becomes a plain assignment.
            let name = class.ident.sym.to_string();
            let range = parsed.range(class.class.span);
            edits.push(Edit::insert(range.start, format!("{name} = ")));
            edits.push(Edit::insert(range.end, ";"));
            remember(names, name);
        }
        _ => {}
    }
}

fn remember(names: &mut Vec<String>, name: String) {
    if !names.contains(&name) {
        names.push(name);
    }
}

/// Wrap the payload in the sloppy-mode harness.
///
/// The outer function must stay sloppy so that `this` is the global object;
/// only the payload runs in strict mode. `with` is what lets later
/// asynchronous mutations of local identifiers write back to the scope.
fn harness(payload: &str, analysis: &ModuleAnalysis, names: &[String], scope: &str) -> String {
    let scope_key = quote(scope);
    let mut seeds = String::new();
    for name in names {
        seeds.push_str(&format!(
            "    if (!({key} in $scope)) {{\n        $scope[{key}] = undefined;\n    }}\n",
            key = quote(name),
        ));
    }
    for (slot, import) in analysis.imports.iter().enumerate() {
        binding_seeds(&mut seeds, slot, import);
    }
    format!(
        "(function () {{
    if (this.$scopes === undefined) {{
        this.$scopes = Object.create(null);
    }}
    var $scope = this.$scopes[{scope_key}];
    if ($scope === undefined) {{
        $scope = Object.create(null);
        $scope.$default = undefined;
        $scope.$value = undefined;
        this.$scopes[{scope_key}] = $scope;
    }}
{seeds}    with ($scope) {{
        return $scope.$value = (function () {{
            \"use strict\";
            return eval({payload});
        }})();
    }}
}}());
",
        payload = quote(payload),
    )
}

fn binding_seeds(seeds: &mut String, slot: usize, import: &StaticImport) {
    if let Some(default) = &import.default {
        seeds.push_str(&format!(
            "    $scope[{}] = $imports[{slot}].default;\n",
            quote(default),
        ));
    }
    if let Some(namespace) = &import.namespace {
        seeds.push_str(&format!(
            "    $scope[{}] = $imports[{slot}];\n",
            quote(namespace),
        ));
    }
    for binding in &import.named {
        seeds.push_str(&format!(
            "    $scope[{}] = $imports[{slot}][{}];\n",
            quote(&binding.local),
            quote(&binding.imported),
        ));
    }
}
