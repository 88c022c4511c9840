//! The Composer (spec §4.2): union-mounts N declaration trees into one
//! composed scope tree, enforcing the "exactly one Base (or parameter
//! slot) per name" arity law.
//!
//! Builds the arena top-down, mirroring the teacher's `SlotMap`-backed node
//! arena (`composer.rs`'s `Runtime::nodes`): a node's key is reserved before
//! its children are mounted, so each child can record its `parent` key up
//! front.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::collections::HashSet;

use slotmap::SlotMap;

use crate::composed::{Binding, NodeKey, StaticNode, Tree};
use crate::declaration::{Contribution, Scope};
use crate::error::{CompositionError, ContributorId};
use crate::path::Path;

/// Union-mount `layers` at the composed root and return the resulting tree.
///
/// `layers` are the top-level declarations passed to `evaluate(...)`
/// (spec §6); their own `name` fields are not part of the root's identity —
/// only their `children`/`contributions` are unioned — matching the way
/// `evaluate(Base, HighLoad)` composes two independently-named scope
/// declarations into one anonymous root (spec §8 scenario 2).
#[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(layers = layers.len())))]
pub fn compose(layers: &[Scope], modules_public: bool) -> Result<Tree, CompositionError> {
    let mut arena = SlotMap::with_key();
    let root = union_mount(&mut arena, None, Path::root(), String::new(), layers)?;
    Ok(Tree { arena, root, modules_public })
}

fn union_mount(
    arena: &mut SlotMap<NodeKey, StaticNode>,
    parent: Option<NodeKey>,
    path: Path,
    name: String,
    layers: &[Scope],
) -> Result<NodeKey, CompositionError> {
    check_same_scope_collisions(layers)?;

    let key = arena.insert(StaticNode {
        name: name.clone(),
        path: path.clone(),
        parent,
        children: Vec::new(),
        bindings: HashMap::new(),
        binding_order: Vec::new(),
        is_factory: false,
    });

    let (child_order, child_groups) = group_children(layers);
    let mut children = Vec::with_capacity(child_order.len());
    for child_name in &child_order {
        let group: Vec<Scope> = child_groups[child_name].iter().map(|s| (*s).clone()).collect();
        let child_path = path.join(child_name.clone());
        let child_key = union_mount(arena, Some(key), child_path, child_name.clone(), &group)?;
        children.push((child_name.clone(), child_key));
    }

    // spec.md §3 invariant (i): a name is either a child scope or a
    // resource, never both. A child mounted by one declaration shadows a
    // same-named contribution mounted by a sibling declaration (spec §4.4
    // step 2) — such a contribution never becomes a binding at all, so
    // `force_eager`, `get`, and a scope call's required-parameter scan
    // (which all read `bindings`/`binding_order` directly, never the
    // lexical resolver) agree with lookup on which name wins.
    let child_names: HashSet<&str> = child_order.iter().map(String::as_str).collect();
    let (contrib_order, contrib_groups) = group_contributions(layers);
    let mut bindings = HashMap::with_capacity(contrib_order.len());
    let mut binding_order = Vec::with_capacity(contrib_order.len());
    for contrib_name in &contrib_order {
        if child_names.contains(contrib_name.as_str()) {
            continue;
        }
        let group = contrib_groups[contrib_name].clone();
        let binding = build_binding(contrib_name, group)?;
        bindings.insert(contrib_name.clone(), binding);
        binding_order.push(contrib_name.clone());
    }

    let is_factory = layers.iter().any(|l| l.is_factory) || name == "RequestScope";

    let node = &mut arena[key];
    node.children = children;
    node.bindings = bindings;
    node.binding_order = binding_order;
    node.is_factory = is_factory;

    #[cfg(feature = "tracing")]
    tracing::debug!(node = %path, contributors = layers.len(), "composed scope");

    Ok(key)
}

/// spec.md §9 Open Question: a child scope and a resource sharing a name
/// *within the same input declaration* is a composition error, not a
/// silent shadow — only unioned siblings are allowed to have a child shadow
/// a resource.
fn check_same_scope_collisions(layers: &[Scope]) -> Result<(), CompositionError> {
    for layer in layers {
        let child_names: HashSet<&str> = layer.children.iter().map(|c| c.name.as_str()).collect();
        for contribution in &layer.contributions {
            if child_names.contains(contribution.name.as_str()) {
                return Err(CompositionError::SameScopeNameCollision {
                    declaration: ContributorId(layer.name.clone()),
                    name: contribution.name.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Union children by name; order is first appearance across `layers`
/// (spec §4.2 step 1).
fn group_children(layers: &[Scope]) -> (Vec<String>, HashMap<String, Vec<&Scope>>) {
    let mut order = Vec::new();
    let mut groups: HashMap<String, Vec<&Scope>> = HashMap::new();
    for layer in layers {
        for child in &layer.children {
            match groups.entry(child.name.clone()) {
                Entry::Vacant(entry) => {
                    order.push(child.name.clone());
                    entry.insert(vec![child]);
                }
                Entry::Occupied(mut entry) => entry.get_mut().push(child),
            }
        }
    }
    (order, groups)
}

/// Union contributions by name, concatenating across inputs in source
/// order (spec §4.2 step 2).
fn group_contributions(layers: &[Scope]) -> (Vec<String>, HashMap<String, Vec<Contribution>>) {
    let mut order = Vec::new();
    let mut groups: HashMap<String, Vec<Contribution>> = HashMap::new();
    for layer in layers {
        for contribution in &layer.contributions {
            match groups.entry(contribution.name.clone()) {
                Entry::Vacant(entry) => {
                    order.push(contribution.name.clone());
                    entry.insert(vec![contribution.clone()]);
                }
                Entry::Occupied(mut entry) => entry.get_mut().push(contribution.clone()),
            }
        }
    }
    (order, groups)
}

/// Validate arity for one name's unioned contributions and build its
/// [`Binding`] (spec §4.2 step 3).
fn build_binding(name: &str, contributions: Vec<Contribution>) -> Result<Binding, CompositionError> {
    let mut bases = Vec::new();
    let mut patches = Vec::new();
    let mut holes = Vec::new();

    for contribution in contributions {
        if contribution.variant.is_base() {
            bases.push(contribution);
        } else if contribution.variant.is_patch() {
            patches.push(contribution);
        } else {
            holes.push(contribution);
        }
    }

    if bases.len() == 1 {
        return Ok(Binding::Base {
            base: bases.into_iter().next().unwrap(),
            patches,
        });
    }

    if bases.is_empty() && !holes.is_empty() && patches.is_empty() {
        return Ok(Binding::Parameter { patches: Vec::new() });
    }

    if bases.is_empty() && holes.is_empty() && !patches.is_empty() && patches.iter().all(|p| p.flags.endomorphic) {
        return Ok(Binding::Parameter { patches });
    }

    if bases.len() > 1 {
        return Err(CompositionError::MultipleBases {
            name: name.to_string(),
            base_count: bases.len(),
            contributors: bases.iter().map(|b| ContributorId(b.contributor.clone())).collect(),
        });
    }

    let all_contributors: Vec<ContributorId> = patches
        .iter()
        .chain(holes.iter())
        .map(|c| ContributorId(c.contributor.clone()))
        .collect();
    Err(CompositionError::PatchesWithoutBaseOrHole {
        name: name.to_string(),
        patch_count: patches.len(),
        contributors: all_contributors,
    })
}
