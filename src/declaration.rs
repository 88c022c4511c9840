//! The Declaration Model (spec §4.1): an immutable, pre-composition
//! representation of a scope and its named contributions.
//!
//! This module carries no resolution logic — it is pure data, built once
//! (typically through [`crate::source::Builder`]) and handed to the
//! [`crate::composer`].

use std::rc::Rc;

use crate::error::BodyError;
use crate::value::{Args, Value};

/// The role a [`Contribution`] plays in composition (spec §3, §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Produces a value; exactly one must exist per name (or see `Extern`).
    Resource,
    /// Produces a value by reducing all Patch outputs at once.
    Aggregate,
    /// Transforms the previous value into a replacement.
    Patch,
    /// Transforms the previous value into a sequence of replacements,
    /// yielded in order.
    PatchMany,
    /// Declares that a value must be supplied from outside.
    Extern,
}

impl Variant {
    pub fn is_base(self) -> bool {
        matches!(self, Variant::Resource | Variant::Aggregate)
    }

    pub fn is_patch(self) -> bool {
        matches!(self, Variant::Patch | Variant::PatchMany)
    }

    pub fn is_hole(self) -> bool {
        matches!(self, Variant::Extern)
    }
}

/// One declared formal parameter of a contribution body.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    /// The name this parameter resolves by.
    pub name: String,
    /// Tagged when the parameter is declared with the Proxy annotation
    /// (spec §4.1): injection supplies a [`crate::proxy::Proxy`] rather
    /// than a forced value.
    pub is_proxy: bool,
}

impl ParamSpec {
    pub fn value(name: impl Into<String>) -> Self {
        ParamSpec {
            name: name.into(),
            is_proxy: false,
        }
    }

    pub fn proxy(name: impl Into<String>) -> Self {
        ParamSpec {
            name: name.into(),
            is_proxy: true,
        }
    }
}

/// A Base or Patch body.
///
/// Receives the resolved [`Args`] for its declared parameters, and — for
/// Patch bodies — the previous value as a conventional positional argument
/// (not injected by name; spec §4.2 step 4: "each receiving the preceding
/// value as the first positional argument"). An `aggregate` Base is an
/// ordinary [`BaseBody`] too: it declares a parameter named the same as its
/// own binding, and the Evaluator injects the collected Patch-output
/// sequence under that name instead of resolving it lexically (spec §4.2
/// step 4: "passed, once, to the Base body whose declared parameter of the
/// same name receives that sequence").
pub type BaseBody = Rc<dyn Fn(&Args) -> std::result::Result<Value, BodyError>>;
/// A `patch` body: receives the preceding value plus its resolved `Args`.
pub type PatchBody = Rc<dyn Fn(Value, &Args) -> std::result::Result<Value, BodyError>>;
/// A `patch_many` body: yields a sequence of replacements instead of one.
pub type PatchManyBody = Rc<dyn Fn(&Args) -> std::result::Result<Vec<Value>, BodyError>>;

/// The callable body of a contribution, tagged by [`Variant`].
#[derive(Clone)]
pub enum Body {
    /// A Resource or Aggregate Base.
    Base(BaseBody),
    /// A single-replacement Patch.
    Patch(PatchBody),
    /// A sequence-yielding Patch.
    PatchMany(PatchManyBody),
    /// Holes have no body.
    Hole,
}

/// Flags carried by a contribution (spec §3).
#[derive(Debug, Clone, Copy, Default)]
pub struct Flags {
    /// Force this name to be evaluated as soon as its scope is composed.
    pub eager: bool,
    /// Visible to callers outside the scope that declares it.
    pub published: bool,
    /// For a `Patch`/`PatchMany`: declared as shape-preserving so a
    /// Base-less, Hole-less name can still be legal (spec §4.2 step 3,
    /// §9 "Endomorphism detection... by declaration flag").
    pub endomorphic: bool,
}

/// One named callable participating in composition.
#[derive(Clone)]
pub struct Contribution {
    /// The name this contribution participates in composition under.
    pub name: String,
    /// The role this contribution plays in composition.
    pub variant: Variant,
    /// Declared formal parameters, read in order at injection time.
    pub params: Vec<ParamSpec>,
    /// The callable body, tagged to match `variant`.
    pub body: Body,
    /// Eager/published/endomorphic/required-outside flags.
    pub flags: Flags,
    /// Identity of the declaration that contributed this, for composition
    /// error messages (spec §4.2 step 3, §7).
    pub contributor: String,
}

/// An immutable, pre-composition scope: a local name, its ordered
/// contributions, and its ordered child scope declarations (spec §4.1).
#[derive(Clone)]
pub struct Scope {
    /// This scope's own name, as mounted under its parent.
    pub name: String,
    /// Ordered contributions declared directly in this scope.
    pub contributions: Vec<Contribution>,
    /// Ordered child scope declarations.
    pub children: Vec<Scope>,
    /// Marks this scope as a factory surfaced through the Instance Scope
    /// Factory (spec §4.6) — either named `RequestScope` by convention or
    /// explicitly flagged.
    pub is_factory: bool,
}

impl Scope {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let is_factory = name == "RequestScope";
        Scope {
            name,
            contributions: Vec::new(),
            children: Vec::new(),
            is_factory,
        }
    }
}
