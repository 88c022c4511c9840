//! Composed Scope and Instance Scope (spec §4.6): the two callable handles
//! an evaluation ever hands back. A [`ComposedScope`] is the single root
//! produced by composition; calling any scope — including the root —
//! produces an [`InstanceScope`] with its own memo table for that subtree,
//! while lexical lookup above it keeps seeing whichever scope made the
//! call.
//!
//! Grounded in the teacher's `World`/`Runtime` split (`src/lib.rs`,
//! `composer.rs`): a long-lived root owning the arena, and short-lived
//! per-invocation state threaded through it — here, one memo table per call
//! instead of one render pass per frame.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::composed::{Binding, NodeKey, Tree};
use crate::declaration::Contribution;
use crate::error::{CallError, EvalError, ResolutionError, VisibilityError};
use crate::evaluator::{self, EvalScope, MemoEntry, MemoMap};
use crate::value::Value;

/// The root of one composed tree, produced once by
/// [`crate::evaluate`] and eagerly pre-warmed.
pub struct ComposedScope {
    tree: Rc<Tree>,
    memo: RefCell<MemoMap>,
}

impl EvalScope for ComposedScope {
    fn tree(&self) -> &Rc<Tree> {
        &self.tree
    }

    fn memo_table_for(&self, _node: NodeKey) -> &RefCell<MemoMap> {
        &self.memo
    }
}

impl ComposedScope {
    pub(crate) fn new(tree: Rc<Tree>) -> Rc<Self> {
        Rc::new(ComposedScope {
            tree,
            memo: RefCell::new(HashMap::new()),
        })
    }

    /// Force a name published at the composed root.
    pub fn get(self: &Rc<Self>, name: &str) -> Result<Value, EvalError> {
        let root = self.tree.root;
        check_published(&self.tree, root, name)?;
        let scope: Rc<dyn EvalScope> = self.clone();
        evaluator::force(&scope, root, name)
    }

    /// A callable handle for a child scope of the root, typically a factory
    /// (spec §4.6). Calling it produces an [`InstanceScope`].
    pub fn child(self: &Rc<Self>, name: &str) -> Result<Callable, EvalError> {
        let node = child_node(&self.tree, self.tree.root, name)?;
        let scope: Rc<dyn EvalScope> = self.clone();
        Ok(Callable::new(scope, self.tree.clone(), node))
    }

    /// Call the root scope itself, as if it were the (implicit, always
    /// present) outermost factory — used when the root declares its own
    /// extern/endomorphism parameters.
    pub fn call(self: &Rc<Self>, supplied: Vec<(&str, Value)>) -> Result<Rc<InstanceScope>, EvalError> {
        let scope: Rc<dyn EvalScope> = self.clone();
        let root = self.tree.root;
        instance_call(scope, self.tree.clone(), root, supplied)
    }
}

/// A per-call Instance Scope (spec §4.6): a fresh memo table for its own
/// subtree, delegating every other lookup to the scope it was called from.
pub struct InstanceScope {
    tree: Rc<Tree>,
    subtree_root: NodeKey,
    local_memo: RefCell<MemoMap>,
    outer: Rc<dyn EvalScope>,
}

impl EvalScope for InstanceScope {
    fn tree(&self) -> &Rc<Tree> {
        &self.tree
    }

    fn memo_table_for(&self, node: NodeKey) -> &RefCell<MemoMap> {
        if self.tree.is_descendant_or_self(node, self.subtree_root) {
            &self.local_memo
        } else {
            self.outer.memo_table_for(node)
        }
    }
}

impl InstanceScope {
    /// Force a name published at this instance's own scope.
    pub fn get(self: &Rc<Self>, name: &str) -> Result<Value, EvalError> {
        let node = self.subtree_root;
        check_published(&self.tree, node, name)?;
        let scope: Rc<dyn EvalScope> = self.clone();
        evaluator::force(&scope, node, name)
    }

    /// A callable handle for one of this instance's own child scopes.
    pub fn child(self: &Rc<Self>, name: &str) -> Result<Callable, EvalError> {
        let node = child_node(&self.tree, self.subtree_root, name)?;
        let scope: Rc<dyn EvalScope> = self.clone();
        Ok(Callable::new(scope, self.tree.clone(), node))
    }
}

/// Reject an external `get(name)` call against a name that exists but isn't
/// published under this tree's `modules_public` mode (spec §6).
fn check_published(tree: &Tree, node: NodeKey, name: &str) -> Result<(), EvalError> {
    let static_node = tree.node(node);
    let binding = static_node.bindings.get(name).ok_or_else(|| ResolutionError {
        name: name.to_string(),
        from: static_node.path.clone(),
        searched: vec![static_node.path.clone()],
    })?;
    if binding.is_published(tree.modules_public) {
        Ok(())
    } else {
        Err(VisibilityError {
            name: name.to_string(),
            from: static_node.path.clone(),
        }
        .into())
    }
}

fn child_node(tree: &Rc<Tree>, from: NodeKey, name: &str) -> Result<NodeKey, ResolutionError> {
    tree.node(from).child_key(name).ok_or_else(|| ResolutionError {
        name: name.to_string(),
        from: tree.node(from).path.clone(),
        searched: vec![tree.node(from).path.clone()],
    })
}

/// A scope that has been located but not yet called — what a plain
/// (non-Proxy) parameter receives when it names a child scope (the Instance
/// Scope Factory rule, spec §4.6: "Every composed scope is callable.").
#[derive(Clone)]
pub struct Callable {
    scope: Rc<dyn EvalScope>,
    tree: Rc<Tree>,
    node: NodeKey,
}

/// Alias used where injection produces a factory handle rather than a
/// forced value.
pub type FactoryHandle = Callable;

impl Callable {
    pub(crate) fn new(scope: Rc<dyn EvalScope>, tree: Rc<Tree>, node: NodeKey) -> Self {
        Callable { scope, tree, node }
    }

    /// Call this scope, supplying values for its declared extern/
    /// endomorphism parameters (spec §4.6).
    pub fn call(&self, supplied: Vec<(&str, Value)>) -> Result<Rc<InstanceScope>, EvalError> {
        instance_call(self.scope.clone(), self.tree.clone(), self.node, supplied)
    }
}

/// Validate supplied parameters against the node's declared Parameter
/// bindings, apply endomorphism patches to each supplied initial value, and
/// build the resulting [`InstanceScope`] (spec §4.6, §4.2's "endomorphism
/// parameters").
fn instance_call(
    outer: Rc<dyn EvalScope>,
    tree: Rc<Tree>,
    node: NodeKey,
    supplied: Vec<(&str, Value)>,
) -> Result<Rc<InstanceScope>, EvalError> {
    let static_node = tree.node(node);
    let mut required = Vec::new();
    let mut patches_by_name: HashMap<String, Vec<Contribution>> = HashMap::new();
    for name in &static_node.binding_order {
        if let Binding::Parameter { patches } = &static_node.bindings[name] {
            required.push(name.clone());
            patches_by_name.insert(name.clone(), patches.clone());
        }
    }

    let supplied_names: HashSet<&str> = supplied.iter().map(|(name, _)| *name).collect();
    let required_set: HashSet<&str> = required.iter().map(String::as_str).collect();

    let missing: Vec<String> = required.iter().filter(|name| !supplied_names.contains(name.as_str())).cloned().collect();
    if !missing.is_empty() {
        return Err(CallError::MissingParameters(missing).into());
    }

    let unexpected: Vec<String> = supplied
        .iter()
        .filter(|(name, _)| !required_set.contains(name))
        .map(|(name, _)| name.to_string())
        .collect();
    if !unexpected.is_empty() {
        return Err(CallError::UnexpectedParameters(unexpected).into());
    }

    let instance = Rc::new(InstanceScope {
        tree: tree.clone(),
        subtree_root: node,
        local_memo: RefCell::new(HashMap::new()),
        outer,
    });
    let scope: Rc<dyn EvalScope> = instance.clone();

    for (name, value) in supplied {
        let patches = patches_by_name.remove(name).unwrap_or_default();
        let seeded = if patches.is_empty() {
            value
        } else {
            evaluator::apply_patches_sequential(&scope, &tree, node, &patches, value)?
        };
        instance
            .local_memo
            .borrow_mut()
            .insert((node, name.to_string()), MemoEntry::Value(seeded));
    }

    evaluator::force_eager(&scope, node)?;

    #[cfg(feature = "tracing")]
    tracing::debug!(node = %tree.node(node).path, "instance scope called");

    Ok(instance)
}
