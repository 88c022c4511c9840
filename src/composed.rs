//! The post-composition tree (spec §3 "Composed Binding", §4.2 output).
//!
//! Produced once by [`crate::composer::compose`] and never mutated again —
//! the only thing that changes after composition is the per-evaluation memo
//! table in [`crate::evaluator`]. Modeled as a flat arena keyed by
//! [`NodeKey`], mirroring the teacher's `SlotMap<DefaultKey, Rc<Node>>`
//! arena in `composer.rs`.

use std::collections::HashMap;

use slotmap::{new_key_type, SlotMap};

use crate::declaration::Contribution;
use crate::path::Path;

new_key_type! {
    /// A stable handle to one node in a [`Tree`].
    pub struct NodeKey;
}

/// The composed outcome for one name (spec §3 "Composed Binding").
#[derive(Clone)]
pub enum Binding {
    /// Exactly one Base contribution, plus zero or more Patches applied
    /// after it (spec §4.2 step 3 first case, step 4).
    Base {
        base: Contribution,
        patches: Vec<Contribution>,
    },
    /// No Base: either pure Holes (becomes an extern parameter) or Patches
    /// that are all flagged endomorphic (becomes a parameter slot whose
    /// transformations apply to a caller-supplied initial value). Both
    /// shapes require a value from the enclosing call (spec §4.2 step 3
    /// second/third cases, §4.5 "Endomorphism parameters").
    Parameter { patches: Vec<Contribution> },
}

impl Binding {
    pub fn is_eager(&self) -> bool {
        match self {
            Binding::Base { base, patches } => {
                base.flags.eager || patches.iter().any(|p| p.flags.eager)
            }
            Binding::Parameter { patches } => patches.iter().any(|p| p.flags.eager),
        }
    }

    /// Whether this name is reachable through [`crate::instance::ComposedScope::get`]
    /// / [`crate::instance::InstanceScope::get`] from outside its own scope
    /// (spec §4.2 step 5, §6 `modules_public`).
    ///
    /// `modules_public = true` (the default) leaves every module open: any
    /// composed name can be read back regardless of its `published` flags.
    /// `modules_public = false` switches to "published only if declared"
    /// mode, where a name is reachable only if some contribution explicitly
    /// flagged it `published`. A Parameter slot is always reachable once
    /// supplied: the caller who called the scope already holds the value it
    /// supplied.
    pub fn is_published(&self, modules_public: bool) -> bool {
        if modules_public {
            return true;
        }
        match self {
            Binding::Base { base, patches } => base.flags.published || patches.iter().any(|p| p.flags.published),
            Binding::Parameter { .. } => true,
        }
    }

    /// True when this name must be supplied by a caller (extern, or
    /// endomorphism-only patches — both are "parameter" shapes).
    pub fn is_parameter(&self) -> bool {
        matches!(self, Binding::Parameter { .. })
    }
}

/// One immutable node of the composed tree.
pub struct StaticNode {
    /// This node's local name.
    pub name: String,
    /// This node's absolute path from the composed root.
    pub path: Path,
    /// The parent node, or `None` for the root.
    pub parent: Option<NodeKey>,
    /// Ordered by first appearance across the unioned inputs (spec §4.2
    /// step 1).
    pub children: Vec<(String, NodeKey)>,
    /// Named bindings local to this node.
    pub bindings: HashMap<String, Binding>,
    /// Preserves the composer's insertion order for bindings — used to
    /// break eager-forcing ties (spec §4.5 "Eager forcing").
    pub binding_order: Vec<String>,
    /// True for a scope surfaced through the Instance Scope Factory
    /// (spec §4.6): named `RequestScope` by convention, or explicitly
    /// flagged at declaration time.
    pub is_factory: bool,
}

impl StaticNode {
    pub fn child_key(&self, name: &str) -> Option<NodeKey> {
        self.children.iter().find(|(n, _)| n == name).map(|(_, k)| *k)
    }
}

/// The whole composed tree, as produced by one call to
/// [`crate::composer::compose`].
pub struct Tree {
    /// The flat node arena backing the whole composed tree.
    pub arena: SlotMap<NodeKey, StaticNode>,
    /// The key of the root node.
    pub root: NodeKey,
    /// The publish-merge mode this tree was composed under (spec §6
    /// `modules_public`); governs [`Binding::is_published`].
    pub modules_public: bool,
}

impl Tree {
    pub fn node(&self, key: NodeKey) -> &StaticNode {
        &self.arena[key]
    }

    /// True if `descendant` is `ancestor` itself or a node below it.
    pub fn is_descendant_or_self(&self, descendant: NodeKey, ancestor: NodeKey) -> bool {
        let mut current = Some(descendant);
        while let Some(key) = current {
            if key == ancestor {
                return true;
            }
            current = self.arena[key].parent;
        }
        false
    }
}
