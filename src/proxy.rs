//! The lazy navigation handle (spec §4.3): a Proxy is a symlink into the
//! composed tree, not a forced value. Stepping through it (`navigate`) never
//! forces anything; only an explicit or implicit [`Proxy::force`] does.
//!
//! Union-filesystem analogy (spec §9): scopes are directories, resources are
//! files, a Proxy is a symlink someone can still `readlink` or `cat`.

use std::rc::Rc;

use crate::composed::{NodeKey, Tree};
use crate::error::{EvalError, ResolutionError};
use crate::evaluator::{self, EvalScope};
use crate::path::Path;
use crate::resolver::{self, Resolved};
use crate::value::Value;

#[derive(Clone)]
enum Target {
    /// Positioned on a scope; further navigation is possible.
    Scope(NodeKey),
    /// Positioned on a named binding at a node; only `force` is possible.
    Binding(NodeKey, String),
}

/// A deferred handle into the composed tree, carrying the scope it was
/// materialized against so it can force itself later against the right
/// memo table (spec §4.6: an Instance Scope's Proxies still resolve through
/// that instance, not the root).
#[derive(Clone)]
pub struct Proxy {
    scope: Rc<dyn EvalScope>,
    tree: Rc<Tree>,
    target: Target,
}

impl Proxy {
    pub(crate) fn new(scope: Rc<dyn EvalScope>, tree: Rc<Tree>, node: NodeKey) -> Self {
        Proxy {
            scope,
            tree,
            target: Target::Scope(node),
        }
    }

    /// Step to a named child scope or bound resource from this proxy's
    /// current position (spec §4.3). Never forces a value.
    pub fn navigate(&self, name: &str) -> Result<Proxy, EvalError> {
        let node = match &self.target {
            Target::Scope(node) => *node,
            Target::Binding(node, bound_name) => {
                return Err(ResolutionError {
                    name: name.to_string(),
                    from: self.tree.node(*node).path.join(bound_name.clone()),
                    searched: Vec::new(),
                }
                .into())
            }
        };

        let static_node = self.tree.node(node);
        if let Some(child_key) = static_node.child_key(name) {
            return Ok(Proxy {
                scope: self.scope.clone(),
                tree: self.tree.clone(),
                target: Target::Scope(child_key),
            });
        }
        if static_node.bindings.contains_key(name) {
            return Ok(Proxy {
                scope: self.scope.clone(),
                tree: self.tree.clone(),
                target: Target::Binding(node, name.to_string()),
            });
        }

        Err(ResolutionError {
            name: name.to_string(),
            from: static_node.path.clone(),
            searched: vec![static_node.path.clone()],
        }
        .into())
    }

    /// Follow a literal [`Path`] from this proxy's current scope position
    /// (spec §4.3, §4.4 "Path navigation"): an absolute path resolves from
    /// the composed root regardless of where this proxy is positioned; a
    /// relative path climbs `path`'s up-count from here, then descends its
    /// suffix. Unlike [`Proxy::navigate`], every step after the first climb
    /// looks up only in that node's direct children/contributions — no
    /// lexical ancestor walk. Never forces a value.
    pub fn navigate_path(&self, path: &Path) -> Result<Proxy, EvalError> {
        let node = match &self.target {
            Target::Scope(node) => *node,
            Target::Binding(node, bound_name) => {
                return Err(ResolutionError {
                    name: path.to_string(),
                    from: self.tree.node(*node).path.join(bound_name.clone()),
                    searched: Vec::new(),
                }
                .into())
            }
        };

        match resolver::navigate(&self.tree, node, path)? {
            Resolved::Child(child_key) => Ok(Proxy {
                scope: self.scope.clone(),
                tree: self.tree.clone(),
                target: Target::Scope(child_key),
            }),
            Resolved::Binding(owner_node, name) => Ok(Proxy {
                scope: self.scope.clone(),
                tree: self.tree.clone(),
                target: Target::Binding(owner_node, name),
            }),
        }
    }

    /// Force the resource this proxy currently points at (spec §4.3, §4.5
    /// step 8). Forcing a Proxy still positioned on a scope (navigation
    /// never reached a named resource) is an error.
    pub fn force(&self) -> Result<Value, EvalError> {
        match &self.target {
            Target::Binding(node, name) => evaluator::force(&self.scope, *node, name),
            Target::Scope(node) => Err(ResolutionError {
                name: self.tree.node(*node).name.clone(),
                from: self.tree.node(*node).path.clone(),
                searched: Vec::new(),
            }
            .into()),
        }
    }
}
