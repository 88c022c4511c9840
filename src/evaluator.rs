//! The Evaluator (spec §4.5): lazy memoization, eager pre-warming, cycle
//! detection, and parameter injection.
//!
//! The per-scope `memo` map and its `InProgress` reentrancy marker are
//! exactly spec §4.5's algorithm. Grounded in the teacher's single-threaded,
//! recursive-descent `Composer` (`composer.rs`): there, a node's compose
//! function is invoked directly, never awaited, with a thread-local
//! `Runtime::current()` carrying ambient state — the same shape this module
//! uses for its cycle-diagnostic frame stack (`crate::runtime`).

use std::collections::HashMap;
use std::rc::Rc;

use crate::composed::{Binding, NodeKey, Tree};
use crate::declaration::{Body, Contribution, ParamSpec, Variant};
use crate::error::{BodyError, CallError, CycleError, EvalError, ResolutionError};
use crate::proxy::Proxy;
use crate::resolver::{self, Resolved};
use crate::runtime;
use crate::value::{Args, Injection, Value};

/// One memo slot's state (spec §4.5: "`memo: name -> either(value,
/// InProgress, Failed)`").
#[derive(Clone)]
pub enum MemoEntry {
    /// Currently being forced; revisiting this slot is a cycle.
    InProgress,
    /// Already forced to a concrete value.
    Value(Value),
    /// The body raised an error; cached so repeat access doesn't re-invoke it.
    Failed(BodyError),
}

pub(crate) type MemoKey = (NodeKey, String);
pub(crate) type MemoMap = HashMap<MemoKey, MemoEntry>;

/// Any place a name can be forced against: the root composed scope, or an
/// Instance Scope created by calling a factory (spec §4.6).
///
/// Implementations decide which memo table backs a given node — a
/// [`crate::instance::ComposedScope`] always uses its own single table; a
/// [`crate::instance::InstanceScope`] uses its own table for nodes inside
/// the factory subtree it was called from, and delegates to its outer
/// scope for everything above that (spec §4.6: "Shares the parent link
/// with the called scope, so lexical lookup upward continues to see the
/// outer composed tree.").
pub trait EvalScope {
    fn tree(&self) -> &Rc<Tree>;

    /// The memo table backing `node` from this scope's point of view.
    fn memo_table_for(&self, node: NodeKey) -> &std::cell::RefCell<MemoMap>;
}

/// Force the binding named `name` living at `node`, memoizing the result on
/// `scope`'s appropriate memo table (spec §4.5 steps 1-9).
pub fn force(scope: &Rc<dyn EvalScope>, node: NodeKey, name: &str) -> Result<Value, EvalError> {
    let tree = scope.tree().clone();
    let key: MemoKey = (node, name.to_string());
    let memo = scope.memo_table_for(node);

    match memo.borrow().get(&key) {
        Some(MemoEntry::Value(value)) => return Ok(value.clone()),
        Some(MemoEntry::Failed(error)) => return Err(error.clone().into()),
        Some(MemoEntry::InProgress) => {
            let mut cycle = runtime::current_stack();
            cycle.push(name.to_string());
            return Err(CycleError { cycle }.into());
        }
        None => {}
    }

    memo.borrow_mut().insert(key.clone(), MemoEntry::InProgress);
    let _frame = runtime::push_frame(name);

    #[cfg(feature = "tracing")]
    tracing::debug!(node = %tree.node(node).path, name, "forcing");

    let result = force_uncached(scope, &tree, node, name);

    let memo = scope.memo_table_for(node);
    match &result {
        Ok(value) => {
            memo.borrow_mut().insert(key, MemoEntry::Value(value.clone()));
        }
        Err(EvalError::Body(body_error)) => {
            memo.borrow_mut().insert(key, MemoEntry::Failed(body_error.clone()));
        }
        Err(_) => {
            // Only body-raised errors are cached (spec §7); every other
            // error kind must not poison the memo slot for a later,
            // differently-supplied attempt (e.g. a missing parameter that
            // gets supplied on a subsequent call).
            memo.borrow_mut().remove(&key);
        }
    }

    result
}

fn force_uncached(scope: &Rc<dyn EvalScope>, tree: &Rc<Tree>, node: NodeKey, name: &str) -> Result<Value, EvalError> {
    let binding = tree
        .node(node)
        .bindings
        .get(name)
        .cloned()
        .ok_or_else(|| ResolutionError {
            name: name.to_string(),
            from: tree.node(node).path.clone(),
            searched: vec![tree.node(node).path.clone()],
        })?;

    let value = match binding {
        Binding::Base { base, patches } => {
            if base.variant == Variant::Aggregate {
                // spec §4.2 step 4 "aggregate" case: the collected sequence
                // is passed, once, to the Base body itself, as the
                // declared parameter of the same name — not to a separate
                // reducer, and the running-value patch chain never runs.
                let elements = collect_aggregate_elements(scope, tree, node, &patches)?;
                let args = resolve_args_aggregate(scope, tree, node, &base.params, base.name.as_str(), elements)?;
                invoke_base(&base, &args)?
            } else {
                let args = resolve_args(scope, tree, node, &base.params, Some(base.name.as_str()))?;
                let initial = invoke_base(&base, &args)?;
                apply_patches_sequential(scope, tree, node, &patches, initial)?
            }
        }
        // Reaching here means this name is a parameter slot that was never
        // supplied: an `extern`, or endomorphism-only patches, accessed
        // before the enclosing scope was ever called with a value for it.
        Binding::Parameter { .. } => return Err(CallError::MissingParameters(vec![name.to_string()]).into()),
    };

    resolve_symlinks(scope, value)
}

fn invoke_base(base: &Contribution, args: &Args) -> Result<Value, BodyError> {
    match &base.body {
        Body::Base(f) => f(args),
        _ => unreachable!("a Base contribution always carries a Base body"),
    }
}

/// Apply `patches` left-to-right, each receiving the preceding value as its
/// first positional argument (spec §4.2 step 4 "resource" case; also used
/// to pre-apply endomorphism patches when a scope is called, spec §4.5
/// "Endomorphism parameters").
pub(crate) fn apply_patches_sequential(
    scope: &Rc<dyn EvalScope>,
    tree: &Rc<Tree>,
    node: NodeKey,
    patches: &[Contribution],
    initial: Value,
) -> Result<Value, EvalError> {
    let mut value = initial;
    for patch in patches {
        let args = resolve_args(scope, tree, node, &patch.params, Some(patch.name.as_str()))?;
        value = match &patch.body {
            Body::Patch(f) => f(value, &args).map_err(EvalError::from)?,
            Body::PatchMany(f) => {
                // spec.md §9 Open Question: `patch_many` under sequential
                // ("resource") semantics is left to the implementation;
                // ordering among the yielded outputs is preserved, and the
                // last one becomes the running value.
                let outputs = f(&args).map_err(EvalError::from)?;
                outputs.into_iter().last().unwrap_or(value)
            }
            Body::Base(_) | Body::Hole => unreachable!("a Patch contribution always carries a Patch body"),
        };
    }
    Ok(value)
}

/// Collect every element an `aggregate` Base's patches produce, in
/// declaration order (spec §4.2 step 4 "aggregate" case).
fn collect_aggregate_elements(
    scope: &Rc<dyn EvalScope>,
    tree: &Rc<Tree>,
    node: NodeKey,
    patches: &[Contribution],
) -> Result<Vec<Value>, EvalError> {
    let mut elements = Vec::new();
    for patch in patches {
        let args = resolve_args(scope, tree, node, &patch.params, Some(patch.name.as_str()))?;
        match &patch.body {
            // An aggregate's patches produce elements, not transformations
            // of a running value, so the conventional "previous value"
            // argument is a unit placeholder the body is not expected to
            // read.
            Body::Patch(f) => elements.push(f(Value::new(()), &args).map_err(EvalError::from)?),
            Body::PatchMany(f) => elements.extend(f(&args).map_err(EvalError::from)?),
            Body::Base(_) | Body::Hole => unreachable!("a Patch contribution always carries a Patch body"),
        }
    }
    Ok(elements)
}

/// Resolve every declared parameter of a contribution body into [`Args`]
/// (spec §4.5 step 5).
fn resolve_args(
    scope: &Rc<dyn EvalScope>,
    tree: &Rc<Tree>,
    node: NodeKey,
    params: &[ParamSpec],
    owner_name: Option<&str>,
) -> Result<Args, EvalError> {
    let mut args = Args::new();
    for param in params {
        let self_shadow = owner_name == Some(param.name.as_str());

        if param.is_proxy {
            let target = resolver::resolve_proxy_target(tree, node, &param.name)?;
            args.insert(param.name.clone(), Injection::Proxy(Proxy::new(scope.clone(), tree.clone(), target)));
            continue;
        }

        match resolver::resolve(tree, node, &param.name, self_shadow)? {
            Resolved::Binding(owner_node, bound_name) => {
                let value = force(scope, owner_node, &bound_name)?;
                args.insert(param.name.clone(), Injection::Value(value));
            }
            Resolved::Child(child_key) => {
                // A plain (non-Proxy) parameter naming a child scope is
                // the Instance Scope Factory rule (spec §4.6): the child
                // is surfaced as a callable, not forced.
                let handle = crate::instance::FactoryHandle::new(scope.clone(), tree.clone(), child_key);
                args.insert(param.name.clone(), Injection::Value(Value::new(handle)));
            }
        }
    }
    Ok(args)
}

/// Like [`resolve_args`], for an `aggregate` Base's own parameter list: the
/// parameter named `name` (the binding's own name) receives the collected
/// Patch-output sequence directly rather than going through the resolver —
/// spec §4.2 step 4 carves this name out of the ordinary self-shadow rule,
/// repurposing it as the aggregation sink instead of an ancestor lookup.
fn resolve_args_aggregate(
    scope: &Rc<dyn EvalScope>,
    tree: &Rc<Tree>,
    node: NodeKey,
    params: &[ParamSpec],
    name: &str,
    elements: Vec<Value>,
) -> Result<Args, EvalError> {
    let mut args = Args::new();
    for param in params {
        if !param.is_proxy && param.name == name {
            args.insert(param.name.clone(), Injection::Value(Value::new(elements.clone())));
            continue;
        }

        if param.is_proxy {
            let target = resolver::resolve_proxy_target(tree, node, &param.name)?;
            args.insert(param.name.clone(), Injection::Proxy(Proxy::new(scope.clone(), tree.clone(), target)));
            continue;
        }

        match resolver::resolve(tree, node, &param.name, false)? {
            Resolved::Binding(owner_node, bound_name) => {
                let value = force(scope, owner_node, &bound_name)?;
                args.insert(param.name.clone(), Injection::Value(value));
            }
            Resolved::Child(child_key) => {
                let handle = crate::instance::FactoryHandle::new(scope.clone(), tree.clone(), child_key);
                args.insert(param.name.clone(), Injection::Value(Value::new(handle)));
            }
        }
    }
    Ok(args)
}

/// The symlink rule (spec §4.3, §4.5 step 8): if a Base/Patch's final
/// result is itself a [`Proxy`], record it as a link and adopt the forced
/// target's value — never the Proxy wrapper — as the cached value.
fn resolve_symlinks(scope: &Rc<dyn EvalScope>, value: Value) -> Result<Value, EvalError> {
    let _ = scope;
    match value.downcast_ref::<Proxy>() {
        Some(proxy) => proxy.force(),
        None => Ok(value),
    }
}

/// Walk every eager binding under `node` (inclusive) in composer insertion
/// order and force it (spec §4.5 "Eager forcing", §5 "Ordering
/// guarantees"). Memoization makes this idempotent for bindings an earlier
/// eager force's own dependency resolution already reached.
pub fn force_eager(scope: &Rc<dyn EvalScope>, node: NodeKey) -> Result<(), EvalError> {
    let tree = scope.tree().clone();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        let static_node = tree.node(current);
        for name in &static_node.binding_order {
            let binding = &static_node.bindings[name];
            // A Parameter binding has no Base and cannot produce a value
            // until a scope call supplies one; `eager` on it only takes
            // effect once that supplied value exists, handled by
            // `instance::instance_call`'s post-seed eager pass.
            if binding.is_eager() && !binding.is_parameter() {
                force(scope, current, name)?;
            }
        }
        for (_, child_key) in static_node.children.iter().rev() {
            // A factory subtree (spec §4.6, e.g. `RequestScope`) is not
            // eagerly forced at composition time: its resources depend on
            // per-call extern values that don't exist yet, and it gets its
            // own eager pass per instance from `instance::instance_call`.
            // Forcing it here would both fail (missing parameters) and,
            // for a successful factory, double-invoke a side-effectful
            // eager resource once against the root and once per instance.
            if !tree.node(*child_key).is_factory {
                stack.push(*child_key);
            }
        }
    }
    Ok(())
}
