//! The Resolver (spec §4.4): lexical lookup along the scope-path chain,
//! with the self-shadow skip rule and the Proxy "uncle search" rule.
//!
//! Grounded in the teacher's `use_context`/`use_provider` ancestor walk
//! (`src/use_context.rs`, `src/use_provider.rs`), which climbs a scope's
//! parent chain looking for the nearest binder of a `TypeId` — the same
//! shape, keyed by name instead of by type.

use crate::composed::{NodeKey, Tree};
use crate::error::ResolutionError;
use crate::path::Path;

/// What a name resolved to.
#[derive(Debug, Clone)]
pub enum Resolved {
    /// `name` names a child scope at this node.
    Child(NodeKey),
    /// `name` names a bound resource living at this node, carrying the
    /// resolved binding's own name (distinct from the owner node's name).
    Binding(NodeKey, String),
}

/// Resolve `name` starting the lexical search from `from`.
///
/// `self_shadow` is set when the lookup originates from a contribution
/// body whose own name equals `name`: the search then skips `from`
/// entirely and begins at `from`'s parent (spec §4.4 step 1).
pub fn resolve(tree: &Tree, from: NodeKey, name: &str, self_shadow: bool) -> Result<Resolved, ResolutionError> {
    let mut searched = Vec::new();
    let mut current = if self_shadow {
        tree.node(from).parent
    } else {
        Some(from)
    };

    while let Some(key) = current {
        let node = tree.node(key);
        searched.push(node.path.clone());

        if let Some(child_key) = node.child_key(name) {
            return Ok(Resolved::Child(child_key));
        }
        if node.bindings.contains_key(name) {
            return Ok(Resolved::Binding(key, name.to_string()));
        }

        current = node.parent;
    }

    Err(ResolutionError {
        name: name.to_string(),
        from: tree.node(from).path.clone(),
        searched,
    })
}

/// The Proxy "uncle search" rule (spec §4.4): when a parameter is typed as
/// Proxy, walk ancestors looking for the first scope that *contains a
/// child* named `name` — never a resource with that name — and return that
/// child.
pub fn resolve_proxy_target(tree: &Tree, from: NodeKey, name: &str) -> Result<NodeKey, ResolutionError> {
    let mut searched = Vec::new();
    let mut current = Some(from);

    while let Some(key) = current {
        let node = tree.node(key);
        searched.push(node.path.clone());

        if let Some(child_key) = node.child_key(name) {
            return Ok(child_key);
        }

        current = node.parent;
    }

    Err(ResolutionError {
        name: name.to_string(),
        from: tree.node(from).path.clone(),
        searched,
    })
}

/// Follow a literal [`Path`] from a resource body (spec §4.4 "Path
/// navigation"): no lexical climb, each step looks up *only* in that
/// node's direct children/contributions.
pub fn navigate(tree: &Tree, from: NodeKey, path: &Path) -> Result<Resolved, ResolutionError> {
    let mut current = if path.is_absolute() {
        tree.root
    } else {
        let mut key = from;
        for _ in 0..path.up_count() {
            key = tree
                .node(key)
                .parent
                .ok_or_else(|| ResolutionError {
                    name: path.to_string(),
                    from: tree.node(from).path.clone(),
                    searched: vec![tree.node(key).path.clone()],
                })?;
        }
        key
    };

    let segments = path.suffix();
    if segments.is_empty() {
        return Ok(Resolved::Child(current));
    }

    for (i, segment) in segments.iter().enumerate() {
        let node = tree.node(current);
        let is_last = i == segments.len() - 1;

        if let Some(child_key) = node.child_key(segment) {
            current = child_key;
            continue;
        }
        if is_last && node.bindings.contains_key(segment) {
            return Ok(Resolved::Binding(current, segment.clone()));
        }

        return Err(ResolutionError {
            name: segment.clone(),
            from: node.path.clone(),
            searched: vec![node.path.clone()],
        });
    }

    Ok(Resolved::Child(current))
}
