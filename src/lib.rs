//! # mixject
//! Mixject is a name-resolved dependency injection framework built around
//! mixin composition: many independent declaration trees are union-mounted
//! into one composed scope tree, where a name's Base, Patches, and Holes
//! from every contributing declaration are merged by a single arity law.
//!
//! ## Composition model
//! A name in a scope resolves to exactly one of three shapes once composed:
//! a Base (optionally followed by Patches), a pure parameter slot (Holes
//! only), or a parameter slot whose Patches are all declared endomorphic.
//! Lookups climb the lexical scope chain; a contribution's own name is
//! skipped at its own scope (the self-shadow rule) so a Patch can still see
//! the name it is patching one level up.
//!
//! Resources are evaluated lazily and memoized; calling a scope opens an
//! Instance Scope with its own memo table for that subtree while lexical
//! lookup above it keeps seeing the scope that made the call.

#![warn(missing_docs)]

mod composed;
mod composer;
mod declaration;
mod error;
mod evaluator;
mod instance;
mod path;
mod proxy;
mod resolver;
mod runtime;
mod source;
mod value;

use std::rc::Rc;

pub use composed::{Binding, NodeKey, StaticNode, Tree};
pub use declaration::{BaseBody, Body, Contribution, Flags, ParamSpec, PatchBody, PatchManyBody, Scope, Variant};
pub use error::{
    BodyError, CallError, CompositionError, ContributorId, CycleError, EvalError, ResolutionError, Result,
    VisibilityError,
};
pub use evaluator::MemoEntry;
pub use instance::{Callable, ComposedScope, FactoryHandle, InstanceScope};
pub use path::Path;
pub use proxy::Proxy;
pub use source::{flatten, to_declaration, Builder, DeclarationSource};
pub use value::{Args, Injection, Value};

#[cfg(feature = "rt")]
pub use runtime::SharedTask;

/// The two knobs `evaluate` exposes (spec §6): there is no external config
/// file or env var story for the core, only these.
#[derive(Debug, Clone, Copy)]
pub struct EvalOptions {
    /// `modules_public` (spec §6): when `true` (the default), every composed
    /// name is reachable through `get(...)` regardless of its `published`
    /// flags. When `false`, only names some contribution explicitly flagged
    /// `published` are reachable from outside their own scope.
    pub modules_public: bool,
    /// Whether to run the eager pre-warm pass (spec §4.5 "Eager forcing")
    /// before handing back the composed root. Disabling this is for tests
    /// that want to inspect a composed-but-unforced tree.
    pub eager: bool,
}

impl Default for EvalOptions {
    fn default() -> Self {
        EvalOptions {
            modules_public: true,
            eager: true,
        }
    }
}

/// The top-level entry point (spec §6): union-mount `declarations`, then
/// eagerly force every binding flagged `eager`, in composer insertion
/// order, before handing back the callable composed root.
///
/// `declarations` are independent top-level scope declarations to union at
/// the root, e.g. a base configuration plus one or more environment
/// overlays (spec §8 scenario 2: `evaluate(Base, HighLoad)`).
pub fn evaluate(declarations: &[Scope]) -> Result<Rc<ComposedScope>> {
    evaluate_with_options(declarations, EvalOptions::default())
}

/// Like [`evaluate`], with explicit control over [`EvalOptions`].
pub fn evaluate_with_options(declarations: &[Scope], options: EvalOptions) -> Result<Rc<ComposedScope>> {
    let tree = Rc::new(composer::compose(declarations, options.modules_public)?);
    let root = ComposedScope::new(tree.clone());
    if options.eager {
        let scope: Rc<dyn evaluator::EvalScope> = root.clone();
        evaluator::force_eager(&scope, tree.root)?;
    }
    Ok(root)
}

/// Common imports for constructing and evaluating declarations.
pub mod prelude {
    pub use crate::{
        evaluate, evaluate_with_options, Args, BaseBody, Body, Builder, Callable, ComposedScope, Contribution,
        DeclarationSource, EvalError, EvalOptions, Flags, Injection, InstanceScope, ParamSpec, Path, PatchBody,
        PatchManyBody, Proxy, Result, Scope, Value, Variant,
    };
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;
    use crate::{BodyError, CallError, CompositionError};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn base_resolves_extern_dependency() {
        let root = Builder::new("root")
            .extern_("connection_string")
            .resource(
                "connection",
                vec![ParamSpec::value("connection_string")],
                Flags::default(),
                Rc::new(|args: &Args| {
                    let cs = args.value("connection_string").unwrap().downcast_ref::<String>().unwrap().clone();
                    Ok(Value::new(format!("conn:{cs}")))
                }),
            )
            .build_one();

        let composed = evaluate(&[root]).unwrap();
        let instance = composed.call(vec![("connection_string", Value::new("sqlite://db".to_string()))]).unwrap();
        let value = instance.get("connection").unwrap();
        assert_eq!(value.downcast_ref::<String>().unwrap(), "conn:sqlite://db");
    }

    #[test]
    fn patches_apply_left_to_right() {
        let base = Builder::new("base")
            .resource("max_connections", vec![], Flags::default(), Rc::new(|_: &Args| Ok(Value::new(10i64))))
            .build_one();
        let high_load = Builder::new("high_load")
            .patch("max_connections", vec![], Flags::default(), Rc::new(|prev: Value, _: &Args| {
                Ok(Value::new(prev.downcast_ref::<i64>().unwrap() * 2))
            }))
            .build_one();

        let composed = evaluate(&[base, high_load]).unwrap();
        let value = composed.get("max_connections").unwrap();
        assert_eq!(*value.downcast_ref::<i64>().unwrap(), 20);
    }

    #[test]
    fn aggregate_reduces_all_patch_outputs_in_declared_order() {
        let agg = Builder::new("agg")
            .aggregate(
                "startup_pragmas",
                vec![ParamSpec::value("startup_pragmas")],
                Flags::default(),
                Rc::new(|args: &Args| {
                    let elements = args.value("startup_pragmas").unwrap().downcast_ref::<Vec<Value>>().unwrap();
                    let joined: Vec<String> = elements.iter().map(|e| e.downcast_ref::<String>().unwrap().clone()).collect();
                    Ok(Value::new(joined))
                }),
            )
            .build_one();
        let p1 = Builder::new("p1")
            .patch("startup_pragmas", vec![], Flags::default(), Rc::new(|_: Value, _: &Args| Ok(Value::new("foreign_keys=on".to_string()))))
            .build_one();
        let p2 = Builder::new("p2")
            .patch("startup_pragmas", vec![], Flags::default(), Rc::new(|_: Value, _: &Args| Ok(Value::new("journal_mode=wal".to_string()))))
            .build_one();

        let composed = evaluate(&[agg, p1, p2]).unwrap();
        let value = composed.get("startup_pragmas").unwrap();
        let pragmas = value.downcast_ref::<Vec<String>>().unwrap();
        assert_eq!(pragmas, &vec!["foreign_keys=on".to_string(), "journal_mode=wal".to_string()]);
    }

    #[test]
    fn patch_many_contributes_several_elements_in_yield_order() {
        let agg = Builder::new("agg")
            .aggregate(
                "startup_pragmas",
                vec![ParamSpec::value("startup_pragmas")],
                Flags::default(),
                Rc::new(|args: &Args| {
                    let elements = args.value("startup_pragmas").unwrap().downcast_ref::<Vec<Value>>().unwrap();
                    let joined: Vec<String> = elements.iter().map(|e| e.downcast_ref::<String>().unwrap().clone()).collect();
                    Ok(Value::new(joined))
                }),
            )
            .build_one();
        let bundle = Builder::new("bundle")
            .patch_many(
                "startup_pragmas",
                vec![],
                Flags::default(),
                Rc::new(|_: &Args| {
                    Ok(vec![
                        Value::new("foreign_keys=on".to_string()),
                        Value::new("journal_mode=wal".to_string()),
                    ])
                }),
            )
            .build_one();
        let trailing = Builder::new("trailing")
            .patch("startup_pragmas", vec![], Flags::default(), Rc::new(|_: Value, _: &Args| Ok(Value::new("synchronous=normal".to_string()))))
            .build_one();

        let composed = evaluate(&[agg, bundle, trailing]).unwrap();
        let value = composed.get("startup_pragmas").unwrap();
        let pragmas = value.downcast_ref::<Vec<String>>().unwrap();
        assert_eq!(
            pragmas,
            &vec![
                "foreign_keys=on".to_string(),
                "journal_mode=wal".to_string(),
                "synchronous=normal".to_string(),
            ]
        );
    }

    #[test]
    fn patch_can_depend_on_an_extern_value() {
        let base = Builder::new("base")
            .resource("pragmas", vec![], Flags::default(), Rc::new(|_: &Args| Ok(Value::new(Vec::<String>::new()))))
            .build_one();
        let patch = Builder::new("patch")
            .extern_("schema_version")
            .patch("pragmas", vec![ParamSpec::value("schema_version")], Flags::default(), Rc::new(|prev: Value, args: &Args| {
                let mut pragmas = prev.downcast_ref::<Vec<String>>().unwrap().clone();
                let version = args.value("schema_version").unwrap().downcast_ref::<i64>().unwrap();
                pragmas.push(format!("user_version={version}"));
                Ok(Value::new(pragmas))
            }))
            .build_one();

        let composed = evaluate(&[base, patch]).unwrap();
        let instance = composed.call(vec![("schema_version", Value::new(3i64))]).unwrap();
        let value = instance.get("pragmas").unwrap();
        assert_eq!(value.downcast_ref::<Vec<String>>().unwrap(), &vec!["user_version=3".to_string()]);
    }

    #[test]
    fn eager_bindings_are_forced_once_before_first_access() {
        let calls = Rc::new(RefCell::new(0));
        let calls_in_body = calls.clone();
        let root = Builder::new("root")
            .resource(
                "startup_log",
                vec![],
                Flags { eager: true, ..Flags::default() },
                Rc::new(move |_: &Args| {
                    *calls_in_body.borrow_mut() += 1;
                    Ok(Value::new(()))
                }),
            )
            .build_one();

        assert_eq!(*calls.borrow(), 0);
        let composed = evaluate(&[root]).unwrap();
        assert_eq!(*calls.borrow(), 1);
        composed.get("startup_log").unwrap();
        assert_eq!(*calls.borrow(), 1, "a memoized eager binding must not be re-invoked on access");
    }

    #[test]
    fn factory_instances_are_independent_but_share_outer_lookup() {
        let handler_calls = Rc::new(RefCell::new(0));
        let handler_calls_in_body = handler_calls.clone();
        let pool_calls = Rc::new(RefCell::new(0));
        let pool_calls_in_body = pool_calls.clone();

        let request_scope = Builder::new("RequestScope")
            .extern_("request_id")
            .resource(
                "handler",
                vec![ParamSpec::value("request_id"), ParamSpec::value("shared_pool")],
                Flags::default(),
                Rc::new(move |args: &Args| {
                    *handler_calls_in_body.borrow_mut() += 1;
                    let id = args.value("request_id").unwrap().downcast_ref::<i64>().unwrap();
                    Ok(Value::new(format!("handler-{id}")))
                }),
            )
            .build_one();

        let root = Builder::new("root")
            .resource(
                "shared_pool",
                vec![],
                Flags::default(),
                Rc::new(move |_: &Args| {
                    *pool_calls_in_body.borrow_mut() += 1;
                    Ok(Value::new("pool".to_string()))
                }),
            )
            .child(request_scope)
            .build_one();

        let composed = evaluate(&[root]).unwrap();
        let factory = composed.child("RequestScope").unwrap();

        let instance1 = factory.call(vec![("request_id", Value::new(1i64))]).unwrap();
        let instance2 = factory.call(vec![("request_id", Value::new(2i64))]).unwrap();

        let h1 = instance1.get("handler").unwrap();
        let h2 = instance2.get("handler").unwrap();
        assert_eq!(h1.downcast_ref::<String>().unwrap(), "handler-1");
        assert_eq!(h2.downcast_ref::<String>().unwrap(), "handler-2");
        assert_eq!(*handler_calls.borrow(), 2, "each instance forces its own handler");
        assert_eq!(*pool_calls.borrow(), 1, "the shared outer pool is forced only once across both instances");
    }

    #[test]
    fn self_shadow_skips_own_scope_and_sees_the_parent_binding() {
        let child = Builder::new("child")
            .resource("value", vec![ParamSpec::value("value")], Flags::default(), Rc::new(|args: &Args| {
                let parent_value = args.value("value").unwrap().downcast_ref::<i64>().unwrap();
                Ok(Value::new(parent_value + 1))
            }))
            .build_one();
        let root = Builder::new("root")
            .resource("value", vec![], Flags::default(), Rc::new(|_: &Args| Ok(Value::new(41i64))))
            .child(child)
            .build_one();

        let composed = evaluate(&[root]).unwrap();
        let instance = composed.child("child").unwrap().call(vec![]).unwrap();
        let value = instance.get("value").unwrap();
        assert_eq!(*value.downcast_ref::<i64>().unwrap(), 42);
    }

    #[test]
    fn resource_returning_a_proxy_is_transparently_forced() {
        let child = Builder::new("child")
            .resource("real_value", vec![], Flags::default(), Rc::new(|_: &Args| Ok(Value::new(99i64))))
            .build_one();
        let root = Builder::new("root")
            .resource("aliased", vec![ParamSpec::proxy("child")], Flags::default(), Rc::new(|args: &Args| {
                let proxy = match args.get("child").unwrap() {
                    Injection::Proxy(proxy) => proxy.clone(),
                    Injection::Value(_) => unreachable!(),
                };
                Ok(Value::new(proxy.navigate("real_value").unwrap()))
            }))
            .child(child)
            .build_one();

        let composed = evaluate(&[root]).unwrap();
        let value = composed.get("aliased").unwrap();
        assert_eq!(*value.downcast_ref::<i64>().unwrap(), 99);
    }

    #[test]
    fn cyclic_dependency_is_detected() {
        let root = Builder::new("root")
            .resource("a", vec![ParamSpec::value("b")], Flags::default(), Rc::new(|args: &Args| {
                Ok(Value::new(args.value("b").unwrap().downcast_ref::<i64>().unwrap() + 1))
            }))
            .resource("b", vec![ParamSpec::value("a")], Flags::default(), Rc::new(|args: &Args| {
                Ok(Value::new(args.value("a").unwrap().downcast_ref::<i64>().unwrap() + 1))
            }))
            .build_one();

        let composed = evaluate(&[root]).unwrap();
        let err = composed.get("a").unwrap_err();
        assert!(matches!(err, EvalError::Cycle(_)));
    }

    #[test]
    fn multiple_bases_for_the_same_name_is_a_composition_error() {
        let one = Builder::new("one").resource("x", vec![], Flags::default(), Rc::new(|_: &Args| Ok(Value::new(1i64)))).build_one();
        let two = Builder::new("two").resource("x", vec![], Flags::default(), Rc::new(|_: &Args| Ok(Value::new(2i64)))).build_one();

        let err = evaluate(&[one, two]).unwrap_err();
        assert!(matches!(err, EvalError::Composition(CompositionError::MultipleBases { .. })));
    }

    #[test]
    fn patches_without_base_or_hole_is_a_composition_error() {
        let patch = Builder::new("patch").patch("x", vec![], Flags::default(), Rc::new(|prev: Value, _: &Args| Ok(prev))).build_one();

        let err = evaluate(&[patch]).unwrap_err();
        assert!(matches!(err, EvalError::Composition(CompositionError::PatchesWithoutBaseOrHole { .. })));
    }

    #[test]
    fn same_scope_name_collision_between_child_and_contribution_is_rejected() {
        let conflicting = Builder::new("conflict")
            .resource("shared", vec![], Flags::default(), Rc::new(|_: &Args| Ok(Value::new(()))))
            .child(Scope::new("shared"))
            .build_one();

        let err = evaluate(&[conflicting]).unwrap_err();
        assert!(matches!(err, EvalError::Composition(CompositionError::SameScopeNameCollision { .. })));
    }

    #[test]
    fn child_scope_shadows_same_named_contribution_from_a_sibling_declaration() {
        let calls = Rc::new(RefCell::new(0));
        let calls_in_body = calls.clone();
        let resource_layer = Builder::new("resource_layer")
            .resource(
                "shared",
                vec![],
                Flags { eager: true, ..Flags::default() },
                Rc::new(move |_: &Args| {
                    *calls_in_body.borrow_mut() += 1;
                    Ok(Value::new(0i64))
                }),
            )
            .build_one();
        let extern_layer = Builder::new("extern_layer").extern_("shared").build_one();
        let shared_child = Builder::new("shared")
            .resource("value", vec![], Flags::default(), Rc::new(|_: &Args| Ok(Value::new(42i64))))
            .build_one();
        let child_layer = Builder::new("child_layer").child(shared_child).build_one();

        let composed = evaluate(&[resource_layer, extern_layer, child_layer]).unwrap();

        assert_eq!(
            *calls.borrow(),
            0,
            "a contribution shadowed by a sibling's child scope must never be eagerly forced"
        );

        let shadowed = composed.get("shared").unwrap_err();
        assert!(
            matches!(shadowed, EvalError::Resolution(_)),
            "a name shadowed by a child scope is no longer a resource reachable through get"
        );

        // The extern contribution under "shared" was discarded along with
        // the rest, so the root's call signature no longer requires it.
        let root_instance = composed.call(vec![]).unwrap();
        let _ = root_instance;

        let instance = composed.child("shared").unwrap().call(vec![]).unwrap();
        let value = instance.get("value").unwrap();
        assert_eq!(*value.downcast_ref::<i64>().unwrap(), 42);
    }

    #[test]
    fn proxy_navigates_a_literal_multi_segment_path() {
        let inner = Builder::new("inner")
            .resource("value", vec![], Flags::default(), Rc::new(|_: &Args| Ok(Value::new(7i64))))
            .build_one();
        let target = Builder::new("target").child(inner).build_one();
        let other = Builder::new("other").build_one();
        let root = Builder::new("root")
            .resource(
                "reader",
                vec![ParamSpec::proxy("other")],
                Flags::default(),
                Rc::new(|args: &Args| {
                    let proxy = match args.get("other").unwrap() {
                        Injection::Proxy(proxy) => proxy.clone(),
                        Injection::Value(_) => unreachable!(),
                    };
                    let absolute = proxy
                        .navigate_path(&Path::absolute(["target", "inner", "value"]))
                        .unwrap()
                        .force()
                        .unwrap();
                    let relative = proxy
                        .navigate_path(&Path::relative(1, ["target", "inner", "value"]))
                        .unwrap()
                        .force()
                        .unwrap();
                    Ok(Value::new((
                        *absolute.downcast_ref::<i64>().unwrap(),
                        *relative.downcast_ref::<i64>().unwrap(),
                    )))
                }),
            )
            .child(target)
            .child(other)
            .build_one();

        let composed = evaluate(&[root]).unwrap();
        let value = composed.get("reader").unwrap();
        assert_eq!(*value.downcast_ref::<(i64, i64)>().unwrap(), (7, 7));
    }

    #[test]
    fn endomorphism_only_patches_form_a_parameter_slot() {
        let patch = Builder::new("patch")
            .patch("count", vec![], Flags { endomorphic: true, ..Flags::default() }, Rc::new(|prev: Value, _: &Args| {
                Ok(Value::new(prev.downcast_ref::<i64>().unwrap() * 10))
            }))
            .build_one();

        let composed = evaluate(&[patch]).unwrap();
        let instance = composed.call(vec![("count", Value::new(3i64))]).unwrap();
        let value = instance.get("count").unwrap();
        assert_eq!(*value.downcast_ref::<i64>().unwrap(), 30);
    }

    #[test]
    fn call_validates_required_and_unexpected_parameters() {
        let root = Builder::new("root").extern_("needed").build_one();
        let composed = evaluate(&[root]).unwrap();

        let missing = composed.call(vec![]).unwrap_err();
        assert!(matches!(missing, EvalError::Call(CallError::MissingParameters(_))));

        let unexpected = composed.call(vec![("needed", Value::new(1i64)), ("extra", Value::new(2i64))]).unwrap_err();
        assert!(matches!(unexpected, EvalError::Call(CallError::UnexpectedParameters(_))));
    }

    #[test]
    fn strict_modules_public_rejects_unpublished_names() {
        let root = Builder::new("root")
            .resource("internal", vec![], Flags::default(), Rc::new(|_: &Args| Ok(Value::new(1i64))))
            .resource(
                "exposed",
                vec![],
                Flags { published: true, ..Flags::default() },
                Rc::new(|_: &Args| Ok(Value::new(2i64))),
            )
            .build_one();

        let composed =
            evaluate_with_options(&[root], EvalOptions { modules_public: false, eager: true }).unwrap();

        let err = composed.get("internal").unwrap_err();
        assert!(matches!(err, EvalError::Visibility(_)));
        assert_eq!(*composed.get("exposed").unwrap().downcast_ref::<i64>().unwrap(), 2);
    }

    #[test]
    fn disabling_eager_leaves_the_tree_unforced_until_first_access() {
        let calls = Rc::new(RefCell::new(0));
        let calls_in_body = calls.clone();
        let root = Builder::new("root")
            .resource(
                "startup_log",
                vec![],
                Flags { eager: true, ..Flags::default() },
                Rc::new(move |_: &Args| {
                    *calls_in_body.borrow_mut() += 1;
                    Ok(Value::new(()))
                }),
            )
            .build_one();

        let composed = evaluate_with_options(&[root], EvalOptions { modules_public: true, eager: false }).unwrap();
        assert_eq!(*calls.borrow(), 0, "eager forcing was disabled, so evaluate must not have invoked the body yet");
        composed.get("startup_log").unwrap();
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn body_errors_are_cached_not_reinvoked() {
        let calls = Rc::new(RefCell::new(0));
        let calls_in_body = calls.clone();
        let root = Builder::new("root")
            .resource("broken", vec![], Flags::default(), Rc::new(move |_: &Args| {
                *calls_in_body.borrow_mut() += 1;
                Err(BodyError::from_message("broken", "boom"))
            }))
            .build_one();

        let composed = evaluate(&[root]).unwrap();
        composed.get("broken").unwrap_err();
        composed.get("broken").unwrap_err();
        assert_eq!(*calls.borrow(), 1);
    }
}
