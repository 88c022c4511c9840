//! The Declaration Source Adapter (spec §4.7, §6).
//!
//! This is the one component the spec intentionally leaves as an interface:
//! the surface decorator syntax and the reflection layer that lifts classes
//! or module trees into declarations are explicitly out of scope (spec §1).
//! What remains is the schema those adapters must produce, plus one
//! concrete, hand-built way to produce it — [`Builder`] — since without the
//! decorator sugar something has to construct a [`DeclarationSource`].

use crate::declaration::{BaseBody, Body, Contribution, Flags, ParamSpec, PatchBody, PatchManyBody, Scope, Variant};

/// The uniform schema every declaration shape (class-shaped, module-shaped,
/// or hand-built) must expose (spec §6, §4.7).
pub trait DeclarationSource {
    /// This source's own contributions, in declared order.
    fn contributions(&self) -> Vec<Contribution>;

    /// This source's nested child declarations, in declared order.
    fn children(&self) -> Vec<Box<dyn DeclarationSource>>;

    /// Sibling declarations nominated to be union-mounted with this one
    /// (the "extend" relation, spec §4.7).
    fn extends(&self) -> Vec<Box<dyn DeclarationSource>> {
        Vec::new()
    }

    /// The local name this source contributes under when mounted as a
    /// child (used for `children()` results; ignored for roots).
    fn local_name(&self) -> &str;

    /// Whether this source is a factory scope (spec §4.6).
    fn is_factory(&self) -> bool {
        self.local_name() == "RequestScope"
    }
}

/// Recursively resolve and flatten the `extends()` relation into one
/// ordered list of sources: `source` itself, followed by each extension's
/// own flattened expansion, in declared order (spec §4.7: "These are
/// recursively resolved and flattened before composition.").
pub fn flatten(source: &dyn DeclarationSource) -> Vec<Scope> {
    let mut out = vec![to_declaration(source)];
    for ext in source.extends() {
        out.extend(flatten(ext.as_ref()));
    }
    out
}

/// Lift one [`DeclarationSource`] (not its extensions) into the immutable
/// [`Scope`] declaration model, recursing into its children.
pub fn to_declaration(source: &dyn DeclarationSource) -> Scope {
    let mut scope = Scope::new(source.local_name());
    scope.is_factory = source.is_factory();
    scope.contributions = source.contributions();
    scope.children = source.children().iter().map(|c| to_declaration(c.as_ref())).collect();
    scope
}

/// A plain, in-memory [`DeclarationSource`] built through method calls —
/// the reference implementation used in place of decorator/class/module
/// extraction (spec §1's explicit non-goal).
///
/// Shaped after `froodi`'s `RegistriesBuilder::provide(body, scope)`
/// registration, except every registration is keyed by name, not `TypeId`.
#[derive(Clone)]
pub struct Builder {
    scope: Scope,
    extends: Vec<Scope>,
}

impl Builder {
    pub fn new(name: impl Into<String>) -> Self {
        Builder {
            scope: Scope::new(name),
            extends: Vec::new(),
        }
    }

    /// Mark this scope as an explicit factory (spec §4.6), regardless of
    /// its name.
    pub fn as_factory(mut self) -> Self {
        self.scope.is_factory = true;
        self
    }

    fn push(&mut self, name: impl Into<String>, variant: Variant, params: Vec<ParamSpec>, body: Body, flags: Flags) {
        self.scope.contributions.push(Contribution {
            name: name.into(),
            variant,
            params,
            body,
            flags,
            contributor: self.scope.name.clone(),
        });
    }

    /// Register a `resource` Base.
    pub fn resource(mut self, name: impl Into<String>, params: Vec<ParamSpec>, flags: Flags, body: BaseBody) -> Self {
        self.push(name, Variant::Resource, params, Body::Base(body), flags);
        self
    }

    /// Register an `aggregate` Base. `body` must declare a parameter named
    /// `name` (the binding's own name, e.g. via `ParamSpec::value(name)`);
    /// the Evaluator injects the collected Patch-output sequence there
    /// instead of resolving it lexically (spec §4.2 step 4).
    pub fn aggregate(mut self, name: impl Into<String>, params: Vec<ParamSpec>, flags: Flags, body: BaseBody) -> Self {
        self.push(name, Variant::Aggregate, params, Body::Base(body), flags);
        self
    }

    /// Register a `patch`.
    pub fn patch(mut self, name: impl Into<String>, params: Vec<ParamSpec>, flags: Flags, body: PatchBody) -> Self {
        self.push(name, Variant::Patch, params, Body::Patch(body), flags);
        self
    }

    /// Register a `patch_many`.
    pub fn patch_many(mut self, name: impl Into<String>, params: Vec<ParamSpec>, flags: Flags, body: PatchManyBody) -> Self {
        self.push(name, Variant::PatchMany, params, Body::PatchMany(body), flags);
        self
    }

    /// Register an `extern` hole.
    pub fn extern_(mut self, name: impl Into<String>) -> Self {
        self.push(name, Variant::Extern, Vec::new(), Body::Hole, Flags::default());
        self
    }

    /// Mount a child scope declaration.
    pub fn child(mut self, child: Scope) -> Self {
        self.scope.children.push(child);
        self
    }

    /// Nominate a sibling declaration to be union-mounted with this one.
    pub fn extend(mut self, other: Scope) -> Self {
        self.extends.push(other);
        self
    }

    /// Finish building, returning this declaration and any declarations it
    /// nominated through `extend`, already flattened (spec §4.7).
    pub fn build(self) -> Vec<Scope> {
        let mut out = vec![self.scope];
        out.extend(self.extends);
        out
    }

    /// Finish building a single declaration, ignoring any `extend`
    /// nominations (used when the caller flattens extensions itself).
    pub fn build_one(self) -> Scope {
        self.scope
    }
}
