// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Scope resolution for closures.
//!
//! Builds one [`FunctionScope`] per function literal (plus one for the
//! top-level unit) and works out, for every name a function uses but does
//! not declare, where its storage lives:
//!
//! 1. **Construction** - one descent over the tree opens a scope at every
//!    function literal and records which scope each node was built inside.
//! 2. **Collection** - each scope gathers its parameters and its `var`
//!    and function-declaration names, without entering nested function
//!    literals. Every catch clause gets a slot of its own after them.
//! 3. **Discovery** - each scope lists the identifiers it references that
//!    are neither locals, parameters nor already-known free variables.
//!    Uses of a catch parameter inside its handler are bound to the
//!    clause's slot here and never reach the name lookup.
//! 4. **Resolution** - post-order over the scope tree, each free variable
//!    is matched against its parent. A miss turns the name into a free
//!    variable of the parent as well, so captures propagate through any
//!    number of intermediate functions.
//!
//! A name that is unbound even at the top level is a global: it is looked
//! up on the global object at run time instead of being captured.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::ast::{NodeId, SyntaxTree};
use crate::compiler::bytecode::Instruction;
use crate::{Error, Result};

/// Identifier of a function scope; also its creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

impl ScopeId {
    /// The top-level unit.
    pub const ROOT: ScopeId = ScopeId(0);

    /// Returns the arena index.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Where a free variable's storage was found in the parent scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// The parent's parameter slot
    Parameter,
    /// The parent's local slot
    Local,
    /// The parent's own capture table slot
    FreeVar,
    /// Nowhere: the global object
    Global,
}

/// A name used by a scope but declared elsewhere.
#[derive(Debug, Clone, PartialEq)]
pub struct FreeVar {
    /// The variable name
    pub name: String,
    /// Source kind and slot in the parent, once resolved
    pub resolved: Option<(Source, usize)>,
}

/// How a name is bound inside one scope, as the emitter sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Parameter slot
    Param(usize),
    /// Local slot
    Local(usize),
    /// Capture table slot
    Lexical(usize),
    /// Property of the global object
    Global,
}

/// Compile-time record of one function literal or of the top-level unit.
#[derive(Debug, Clone)]
pub struct FunctionScope {
    /// This scope's id
    pub id: ScopeId,
    /// Enclosing scope (`None` for the top-level unit)
    pub parent: Option<ScopeId>,
    /// Nested function scopes in creation order
    pub children: Vec<ScopeId>,
    /// The `Program` or function node that opened the scope
    pub node: NodeId,
    /// Parameter names in declared order
    pub params: Vec<String>,
    /// Declared names in first-seen order, one slot per declarator
    pub locals: Vec<String>,
    /// Catch parameters in source order; clause `k` owns slot
    /// `locals.len() + k`
    pub catch_params: Vec<String>,
    /// Local slot bound to the function's own name (named function
    /// expressions only)
    pub self_slot: Option<usize>,
    /// Free variables in discovery order
    pub freevars: Vec<FreeVar>,
    /// Names that resolve to the global object (top-level unit only)
    pub globals: Vec<String>,
    /// Nested function declarations to hoist, in source order
    pub functions: Vec<NodeId>,
    /// Emitted instructions, filled by the emitter
    pub code: Vec<Instruction>,
    /// Offset in the linked program, filled by the linker
    pub offset: Option<usize>,
}

impl FunctionScope {
    fn new(id: ScopeId, parent: Option<ScopeId>, node: NodeId) -> Self {
        Self {
            id,
            parent,
            children: Vec::new(),
            node,
            params: Vec::new(),
            locals: Vec::new(),
            catch_params: Vec::new(),
            self_slot: None,
            freevars: Vec::new(),
            globals: Vec::new(),
            functions: Vec::new(),
            code: Vec::new(),
            offset: None,
        }
    }

    /// Whether this is the top-level unit.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Slots the prologue reserves: locals, then one per catch clause.
    pub fn slot_count(&self) -> usize {
        self.locals.len() + self.catch_params.len()
    }

    /// Local slot of catch clause `index`.
    pub fn catch_slot(&self, index: usize) -> usize {
        self.locals.len() + index
    }

    /// Looks a name up the way the emitter does: parameters, then locals,
    /// then free variables. The first match wins.
    pub fn lookup(&self, name: &str) -> Option<Binding> {
        if let Some(slot) = self.params.iter().position(|p| p == name) {
            return Some(Binding::Param(slot));
        }
        if let Some(slot) = self.locals.iter().position(|l| l == name) {
            return Some(Binding::Local(slot));
        }
        if let Some(slot) = self.freevars.iter().position(|f| f.name == name) {
            return match self.freevars[slot].resolved {
                Some((Source::Global, _)) => Some(Binding::Global),
                _ => Some(Binding::Lexical(slot)),
            };
        }
        if self.globals.iter().any(|g| g == name) {
            return Some(Binding::Global);
        }
        None
    }

    /// Discovery order: locals, then parameters, then free variables.
    fn knows(&self, name: &str) -> bool {
        self.locals.iter().any(|l| l == name)
            || self.params.iter().any(|p| p == name)
            || self.freevars.iter().any(|f| f.name == name)
    }
}

/// Whether `name` is spelled like a host test hook.
pub fn is_hook_name(name: &str) -> bool {
    name.len() > 1 && name.starts_with('$')
}

/// The resolved function-scope tree of one program.
#[derive(Debug, Clone)]
pub struct ScopeTree {
    scopes: Vec<FunctionScope>,
    /// Scope each node was built inside; function nodes map to the scope
    /// they open.
    node_scopes: FxHashMap<NodeId, ScopeId>,
    /// Catch clause -> its index among the owning scope's catch params
    catch_clauses: FxHashMap<NodeId, usize>,
    /// Identifier -> (scope, catch index) for uses of a catch parameter
    catch_refs: FxHashMap<NodeId, (ScopeId, usize)>,
    /// Function literal -> catch parameters in scope where it appears,
    /// innermost last
    enclosing_catches: FxHashMap<NodeId, Vec<(String, usize)>>,
}

impl ScopeTree {
    /// Builds and resolves the scope tree for `tree`.
    pub fn resolve(tree: &SyntaxTree) -> Result<Self> {
        let mut scopes = Self {
            scopes: Vec::new(),
            node_scopes: FxHashMap::default(),
            catch_clauses: FxHashMap::default(),
            catch_refs: FxHashMap::default(),
            enclosing_catches: FxHashMap::default(),
        };

        let root = scopes.open(tree.root(), None);
        scopes.build(tree, tree.root(), root)?;

        for index in 0..scopes.scopes.len() {
            let id = ScopeId(index as u32);
            scopes.collect_bindings(tree, id)?;
        }
        for index in 0..scopes.scopes.len() {
            scopes.discover_free(tree, ScopeId(index as u32));
        }

        let mut order = Vec::with_capacity(scopes.scopes.len());
        scopes.post_order(ScopeId::ROOT, &mut order);
        for id in order {
            if scopes.get(id).is_root() {
                continue;
            }
            for index in 0..scopes.get(id).freevars.len() {
                scopes.resolve_freevar(id, index)?;
            }
        }

        let root = scopes.get(ScopeId::ROOT);
        if !root.params.is_empty() || !root.freevars.is_empty() {
            return Err(Error::internal(format!(
                "top-level scope ended with {} parameters and {} free variables",
                root.params.len(),
                root.freevars.len()
            )));
        }

        debug!(
            scopes = scopes.scopes.len(),
            globals = root.globals.len(),
            "resolved function scopes"
        );
        Ok(scopes)
    }

    /// Returns a scope.
    #[inline]
    pub fn get(&self, id: ScopeId) -> &FunctionScope {
        &self.scopes[id.index()]
    }

    /// Returns a scope mutably.
    #[inline]
    pub fn get_mut(&mut self, id: ScopeId) -> &mut FunctionScope {
        &mut self.scopes[id.index()]
    }

    /// Number of scopes.
    #[inline]
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    /// Whether there are no scopes (never true after `resolve`).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Iterates over the scopes in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &FunctionScope> {
        self.scopes.iter()
    }

    /// The scope a node was built inside. For a function literal, the
    /// scope it opens.
    pub fn scope_of(&self, node: NodeId) -> Option<ScopeId> {
        self.node_scopes.get(&node).copied()
    }

    /// Local slot an identifier is bound to when it names a catch
    /// parameter inside that parameter's handler.
    pub fn catch_binding(&self, identifier: NodeId) -> Option<usize> {
        let (scope, index) = self.catch_refs.get(&identifier)?;
        Some(self.get(*scope).catch_slot(*index))
    }

    /// The scope opened by a function literal.
    pub fn function_scope(&self, node: NodeId) -> Result<ScopeId> {
        self.scope_of(node)
            .filter(|id| self.get(*id).node == node)
            .ok_or_else(|| Error::internal(format!("no scope was opened for node {:?}", node)))
    }

    // ========================================================================
    // Construction
    // ========================================================================

    fn open(&mut self, node: NodeId, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(FunctionScope::new(id, parent, node));
        if let Some(parent) = parent {
            self.scopes[parent.index()].children.push(id);
        }
        self.node_scopes.insert(node, id);
        id
    }

    fn build(&mut self, tree: &SyntaxTree, node: NodeId, active: ScopeId) -> Result<()> {
        for (_, child) in tree.children(node) {
            let active = if tree.is_function(child) {
                self.open(child, Some(active))
            } else {
                self.node_scopes.insert(child, active);
                active
            };
            self.build(tree, child, active)?;
        }
        Ok(())
    }

    fn post_order(&self, id: ScopeId, out: &mut Vec<ScopeId>) {
        for &child in &self.get(id).children {
            self.post_order(child, out);
        }
        out.push(id);
    }

    // ========================================================================
    // Locals and parameters
    // ========================================================================

    /// The node whose subtree holds a scope's own code.
    fn body_of(tree: &SyntaxTree, scope: &FunctionScope) -> Result<NodeId> {
        if scope.is_root() {
            Ok(scope.node)
        } else {
            tree.expect_child(scope.node, "body")
        }
    }

    fn collect_bindings(&mut self, tree: &SyntaxTree, id: ScopeId) -> Result<()> {
        let node = self.get(id).node;
        let body = Self::body_of(tree, self.get(id))?;

        let mut params = Vec::new();
        if !self.get(id).is_root() {
            for param in tree.list(node, "params") {
                params.push(tree.identifier_name(param)?.to_string());
            }
        }

        let mut locals = Vec::new();
        let mut functions = Vec::new();
        let mut catches = Vec::new();
        Self::collect_declarations(tree, body, &mut locals, &mut functions, &mut catches)?;

        // `function name() {}` used as an expression sees its own name
        let mut self_slot = None;
        if tree.kind(node) == "FunctionExpression" {
            if let Some(name) = tree.child(node, "id") {
                let name = tree.identifier_name(name)?;
                if !params.iter().any(|p| p == name) && !locals.iter().any(|l| l == name) {
                    self_slot = Some(locals.len());
                    locals.push(name.to_string());
                }
            }
        }

        let mut catch_params = Vec::with_capacity(catches.len());
        for (index, (clause, name)) in catches.into_iter().enumerate() {
            self.catch_clauses.insert(clause, index);
            catch_params.push(name);
        }

        let scope = self.get_mut(id);
        scope.params = params;
        scope.locals = locals;
        scope.catch_params = catch_params;
        scope.self_slot = self_slot;
        scope.functions = functions;
        Ok(())
    }

    fn collect_declarations(
        tree: &SyntaxTree,
        node: NodeId,
        locals: &mut Vec<String>,
        functions: &mut Vec<NodeId>,
        catches: &mut Vec<(NodeId, String)>,
    ) -> Result<()> {
        for (_, child) in tree.children(node) {
            match tree.kind(child) {
                "FunctionDeclaration" => {
                    let id = tree.expect_child(child, "id")?;
                    locals.push(tree.identifier_name(id)?.to_string());
                    functions.push(child);
                }
                // Declarations inside stay with the nested scope
                "FunctionExpression" => {}
                "VariableDeclarator" => {
                    let id = tree.expect_child(child, "id")?;
                    locals.push(tree.identifier_name(id)?.to_string());
                    Self::collect_declarations(tree, child, locals, functions, catches)?;
                }
                "CatchClause" => {
                    if let Some(param) = tree.child(child, "param") {
                        catches.push((child, tree.identifier_name(param)?.to_string()));
                    }
                    Self::collect_declarations(tree, child, locals, functions, catches)?;
                }
                _ => Self::collect_declarations(tree, child, locals, functions, catches)?,
            }
        }
        Ok(())
    }

    // ========================================================================
    // Free variable discovery
    // ========================================================================

    fn discover_free(&mut self, tree: &SyntaxTree, id: ScopeId) {
        let Ok(body) = Self::body_of(tree, self.get(id)) else {
            return;
        };
        let mut names = Vec::new();
        self.collect_references(tree, id, body, &mut Vec::new(), &mut names);

        let scope = self.get_mut(id);
        for name in names {
            if scope.knows(&name) {
                continue;
            }
            if scope.is_root() {
                if !scope.globals.contains(&name) {
                    scope.globals.push(name);
                }
            } else {
                scope.freevars.push(FreeVar {
                    name,
                    resolved: None,
                });
            }
        }
    }

    /// Lists the names `node` references. `catches` holds the catch
    /// parameters in scope, innermost last; their uses are bound to the
    /// clause slot instead of being listed.
    fn collect_references(
        &mut self,
        tree: &SyntaxTree,
        scope: ScopeId,
        node: NodeId,
        catches: &mut Vec<(String, usize)>,
        names: &mut Vec<String>,
    ) {
        let kind = tree.kind(node);
        let computed = tree.flag(node, "computed");
        for (field, child) in tree.children(node) {
            if tree.is_function(child) {
                if !catches.is_empty() {
                    self.enclosing_catches.insert(child, catches.clone());
                }
                continue;
            }
            let skip = match (kind, field) {
                ("MemberExpression", "property") | ("Property", "key") => !computed,
                ("CatchClause", "param") => true,
                _ => false,
            };
            if skip {
                continue;
            }
            match tree.kind(child) {
                "Identifier" => {
                    let Some(name) = tree.str(child, "name") else {
                        continue;
                    };
                    match catches.iter().rev().find(|(param, _)| param == name) {
                        Some(&(_, index)) => {
                            self.catch_refs.insert(child, (scope, index));
                        }
                        None => names.push(name.to_string()),
                    }
                }
                "CatchClause" => {
                    let param = tree.child(child, "param");
                    let index = self.catch_clauses.get(&child).copied();
                    let bound = param
                        .zip(index)
                        .and_then(|(param, index)| Some((param, tree.str(param, "name")?, index)));
                    match bound {
                        Some((param, name, index)) => {
                            self.catch_refs.insert(param, (scope, index));
                            catches.push((name.to_string(), index));
                            self.collect_references(tree, scope, child, catches, names);
                            catches.pop();
                        }
                        None => self.collect_references(tree, scope, child, catches, names),
                    }
                }
                _ => self.collect_references(tree, scope, child, catches, names),
            }
        }
    }

    // ========================================================================
    // Cross-scope resolution
    // ========================================================================

    fn resolve_freevar(&mut self, id: ScopeId, index: usize) -> Result<(Source, usize)> {
        let freevar = &self.get(id).freevars[index];
        if let Some(resolved) = freevar.resolved {
            return Ok(resolved);
        }
        let name = freevar.name.clone();
        let parent_id = self.get(id).parent.ok_or_else(|| {
            Error::internal(format!(
                "free variable `{}` has no enclosing scope to resolve against",
                name
            ))
        })?;

        // A catch parameter around the function literal shadows the rest
        let node = self.get(id).node;
        let caught = self
            .enclosing_catches
            .get(&node)
            .and_then(|catches| catches.iter().rev().find(|(param, _)| *param == name))
            .map(|&(_, index)| index);

        let parent = self.get(parent_id);
        let resolved = if let Some(index) = caught {
            (Source::Local, parent.catch_slot(index))
        } else if let Some(slot) = parent.params.iter().position(|p| *p == name) {
            (Source::Parameter, slot)
        } else if let Some(slot) = parent.locals.iter().position(|l| *l == name) {
            (Source::Local, slot)
        } else if let Some(slot) = parent.freevars.iter().position(|f| f.name == name) {
            self.through_parent(parent_id, slot)?
        } else if parent.is_root() {
            let root = self.get_mut(parent_id);
            if !root.globals.contains(&name) {
                root.globals.push(name.clone());
            }
            (Source::Global, 0)
        } else {
            // Force the parent to capture the name too
            let parent = self.get_mut(parent_id);
            parent.freevars.push(FreeVar {
                name: name.clone(),
                resolved: None,
            });
            let slot = parent.freevars.len() - 1;
            self.through_parent(parent_id, slot)?
        };

        self.get_mut(id).freevars[index].resolved = Some(resolved);
        Ok(resolved)
    }

    /// Resolves the parent's own free variable first, so a global stays a
    /// global all the way down.
    fn through_parent(&mut self, parent: ScopeId, slot: usize) -> Result<(Source, usize)> {
        match self.resolve_freevar(parent, slot)? {
            (Source::Global, _) => Ok((Source::Global, 0)),
            _ => Ok((Source::FreeVar, slot)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;

    fn resolve(doc: serde_json::Value) -> (SyntaxTree, ScopeTree) {
        let tree = SyntaxTree::from_value(&doc).unwrap();
        let scopes = ScopeTree::resolve(&tree).unwrap();
        (tree, scopes)
    }

    #[test]
    fn test_top_level_locals_one_slot_per_declarator() {
        let (_, scopes) = resolve(program(vec![
            var("a", None),
            var("b", Some(num(1.0))),
            var("a", None),
        ]));
        assert_eq!(scopes.len(), 1);
        let root = scopes.get(ScopeId::ROOT);
        assert_eq!(root.locals, vec!["a", "b", "a"]);
        assert_eq!(root.slot_count(), 3);
        // The first declarator wins
        assert_eq!(root.lookup("a"), Some(Binding::Local(0)));
        assert!(root.freevars.is_empty());
    }

    #[test]
    fn test_nested_declarations_stay_in_their_scope() {
        let (_, scopes) = resolve(program(vec![
            function("f", &["p"], vec![var("inner", None)]),
            var("outer", Some(function_expr(&[], vec![var("hidden", None)]))),
        ]));
        assert_eq!(scopes.len(), 3);
        let root = scopes.get(ScopeId::ROOT);
        assert_eq!(root.locals, vec!["f", "outer"]);
        assert_eq!(root.functions.len(), 1);
        let f = scopes.get(ScopeId(1));
        assert_eq!(f.params, vec!["p"]);
        assert_eq!(f.locals, vec!["inner"]);
        assert_eq!(scopes.get(ScopeId(2)).locals, vec!["hidden"]);
    }

    #[test]
    fn test_direct_capture_of_parent_local() {
        let (_, scopes) = resolve(program(vec![
            var("count", Some(num(0.0))),
            function("bump", &[], vec![expr(assign("+=", ident("count"), num(1.0)))]),
        ]));
        let bump = scopes.get(ScopeId(1));
        assert_eq!(bump.freevars.len(), 1);
        assert_eq!(bump.freevars[0].resolved, Some((Source::Local, 0)));
        assert_eq!(bump.lookup("count"), Some(Binding::Lexical(0)));
    }

    #[test]
    fn test_capture_propagates_through_intermediate_scope() {
        // function outer(x) { return function () { return function () { return x; }; }; }
        let (_, scopes) = resolve(program(vec![function(
            "outer",
            &["x"],
            vec![ret(Some(function_expr(
                &[],
                vec![ret(Some(function_expr(&[], vec![ret(Some(ident("x")))])))],
            )))],
        )]));
        assert_eq!(scopes.len(), 4);
        let middle = scopes.get(ScopeId(2));
        let inner = scopes.get(ScopeId(3));
        assert_eq!(middle.freevars[0].name, "x");
        assert_eq!(middle.freevars[0].resolved, Some((Source::Parameter, 0)));
        assert_eq!(inner.freevars[0].resolved, Some((Source::FreeVar, 0)));
    }

    #[test]
    fn test_unbound_names_become_globals() {
        let (_, scopes) = resolve(program(vec![
            expr(ident("top")),
            function("f", &[], vec![expr(ident("deep"))]),
        ]));
        let root = scopes.get(ScopeId::ROOT);
        assert_eq!(root.globals, vec!["top", "deep"]);
        assert!(root.freevars.is_empty());
        let f = scopes.get(ScopeId(1));
        assert_eq!(f.freevars[0].resolved, Some((Source::Global, 0)));
        assert_eq!(f.lookup("deep"), Some(Binding::Global));
    }

    #[test]
    fn test_member_property_is_not_a_reference() {
        let (_, scopes) = resolve(program(vec![
            var("o", Some(object(vec![prop("k", num(1.0))]))),
            expr(member(ident("o"), "field")),
            expr(index(ident("o"), ident("key"))),
        ]));
        let root = scopes.get(ScopeId::ROOT);
        assert_eq!(root.globals, vec!["key"]);
    }

    #[test]
    fn test_declared_dollar_name_is_captured() {
        // var $f = 1; function g() { return $f(); }
        let (_, scopes) = resolve(program(vec![
            var("$f", Some(num(1.0))),
            function("g", &[], vec![ret(Some(call(ident("$f"), vec![])))]),
        ]));
        let g = scopes.get(ScopeId(1));
        assert_eq!(g.lookup("$f"), Some(Binding::Lexical(0)));
        assert_eq!(g.freevars[0].resolved, Some((Source::Local, 0)));
    }

    #[test]
    fn test_catch_parameter_gets_its_own_slot() {
        // var e; try {} catch (e) { e; }
        let (tree, scopes) = resolve(program(vec![
            var("e", None),
            try_(vec![], Some(("e", vec![expr(ident("e"))])), None),
        ]));
        let root = scopes.get(ScopeId::ROOT);
        assert_eq!(root.locals, vec!["e"]);
        assert_eq!(root.catch_params, vec!["e"]);
        assert_eq!(root.slot_count(), 2);
        assert!(root.globals.is_empty());

        let statement = tree.list(tree.root(), "body")[1];
        let handler = tree.child(statement, "handler").unwrap();
        let param = tree.child(handler, "param").unwrap();
        let body = tree.child(handler, "body").unwrap();
        let used = tree.child(tree.list(body, "body")[0], "expression").unwrap();
        assert_eq!(scopes.catch_binding(param), Some(1));
        assert_eq!(scopes.catch_binding(used), Some(1));
        assert_eq!(root.lookup("e"), Some(Binding::Local(0)));
    }

    #[test]
    fn test_closure_in_handler_captures_catch_slot() {
        // try {} catch (e) { var get = function () { return e; }; }
        let (_, scopes) = resolve(program(vec![try_(
            vec![],
            Some((
                "e",
                vec![var("get", Some(function_expr(&[], vec![ret(Some(ident("e")))])))],
            )),
            None,
        )]));
        let get = scopes.get(ScopeId(1));
        assert_eq!(get.freevars[0].resolved, Some((Source::Local, 1)));
    }

    #[test]
    fn test_named_function_expression_binds_its_name() {
        // var f = function g(n) { return g; };
        let doc = program(vec![var(
            "f",
            Some(named_function_expr("g", &["n"], vec![ret(Some(ident("g")))])),
        )]);
        let (_, scopes) = resolve(doc);
        let g = scopes.get(ScopeId(1));
        assert_eq!(g.locals, vec!["g"]);
        assert_eq!(g.self_slot, Some(0));
        assert!(g.freevars.is_empty());
        assert!(scopes.get(ScopeId::ROOT).globals.is_empty());
    }

    #[test]
    fn test_node_annotations() {
        let (tree, scopes) = resolve(program(vec![function("f", &[], vec![])]));
        let f = tree.list(tree.root(), "body")[0];
        assert_eq!(scopes.function_scope(f).unwrap(), ScopeId(1));
        let body = tree.child(f, "body").unwrap();
        assert_eq!(scopes.scope_of(body), Some(ScopeId(1)));
        assert_eq!(scopes.scope_of(tree.root()), Some(ScopeId::ROOT));
    }
}
