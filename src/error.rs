//! Typed error surface for every error kind in spec §7.
//!
//! Mirrors the teacher's use of `thiserror` for its `TryComposeError`
//! (`composer.rs`), extended here to one enum per error kind plus a unifying
//! top-level [`EvalError`].

use std::fmt;
use std::rc::Rc;

use crate::path::Path;

/// A contributor identity, used in composition-error messages so the
/// offending declarations can be named (spec §4.2 step 3, §7).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContributorId(pub String);

impl fmt::Display for ContributorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Composition-time arity and shape violations (spec §4.2 step 3, §7).
#[derive(Debug, thiserror::Error)]
pub enum CompositionError {
    /// More than one Base contribution exists for a name.
    #[error(
        "name `{name}` has {base_count} Base contributions (expected exactly 1); contributed by {contributors:?}"
    )]
    MultipleBases {
        name: String,
        base_count: usize,
        contributors: Vec<ContributorId>,
    },

    /// A name has zero Bases, but Patches exist and not all of them are
    /// flagged as endomorphisms, and there are no Holes to make it extern.
    #[error(
        "name `{name}` has {patch_count} Patch contribution(s) with no Base and no Hole, and not every Patch is flagged endomorphic; contributed by {contributors:?}"
    )]
    PatchesWithoutBaseOrHole {
        name: String,
        patch_count: usize,
        contributors: Vec<ContributorId>,
    },

    /// A single input declaration's `children()` and `contributions()`
    /// share a name, before cross-declaration union even starts.
    ///
    /// Resolution of the Open Question in spec.md §9: the spec mandates
    /// that a composed child shadows a same-named resource from a *sibling*
    /// declaration, but says a collision within the *same* declaration
    /// should surface an error rather than silently pick a winner.
    #[error(
        "declaration `{declaration}` declares both a child scope and a contribution named `{name}`"
    )]
    SameScopeNameCollision {
        declaration: ContributorId,
        name: String,
    },
}

/// Name-resolution failure raised when forcing a binding (spec §4.4, §7).
#[derive(Debug, thiserror::Error)]
#[error("unresolved name `{name}` starting from `{from}`; searched ancestors: {searched:?}")]
pub struct ResolutionError {
    /// The name that failed to resolve.
    pub name: String,
    /// The scope the lookup started from.
    pub from: Path,
    /// Every ancestor path the lookup walked before giving up.
    pub searched: Vec<Path>,
}

/// A dependency cycle detected by the evaluator (spec §4.5, §7).
#[derive(Debug, thiserror::Error)]
#[error("cyclic dependency: {}", format_cycle(.cycle))]
pub struct CycleError {
    /// Names in the cycle, in encounter order.
    pub cycle: Vec<String>,
}

fn format_cycle(cycle: &[String]) -> String {
    cycle.join(" -> ")
}

/// A name exists in the composed tree but is not published for access from
/// outside the scope that owns it (spec §4.2 step 5, §6 `modules_public`).
#[derive(Debug, thiserror::Error)]
#[error("name `{name}` at `{from}` is not published for external access")]
pub struct VisibilityError {
    /// The name that was requested.
    pub name: String,
    /// The scope it lives in.
    pub from: Path,
}

/// A required extern/endomorphism parameter was not supplied to a scope
/// call, or an unknown name was supplied (spec §4.6, §7).
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// One or more required extern/endomorphism parameters were not
    /// supplied.
    #[error("missing required parameter(s) for this call: {0:?}")]
    MissingParameters(Vec<String>),

    /// A supplied name does not match any parameter slot this scope
    /// declares.
    #[error("unexpected parameter(s) supplied to this call: {0:?}")]
    UnexpectedParameters(Vec<String>),
}

/// A contribution body raised an error during invocation (spec §7: cached
/// verbatim so repeated access yields the same error, not a re-invocation,
/// and propagated "as-is" to the forcer — the original error is kept behind
/// [`BodyError::downcast_ref`], not just its rendered message).
#[derive(Clone)]
pub struct BodyError {
    /// The contribution whose body raised the error.
    pub name: String,
    source: Rc<dyn std::error::Error>,
}

impl BodyError {
    /// Wrap a body-raised error, preserving it for [`BodyError::downcast_ref`].
    pub fn new(name: impl Into<String>, error: impl std::error::Error + 'static) -> Self {
        BodyError {
            name: name.into(),
            source: Rc::new(error),
        }
    }

    /// Construct from a plain message, for a body with no existing error
    /// type of its own to wrap.
    pub fn from_message(name: impl Into<String>, message: impl Into<String>) -> Self {
        BodyError {
            name: name.into(),
            source: Rc::new(Message(message.into())),
        }
    }

    /// Recover the original error a body raised, if it was constructed
    /// through [`BodyError::new`] with an error of type `E` (spec §7:
    /// body-raised errors are propagated "as-is", not just re-rendered).
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.source.downcast_ref::<E>()
    }
}

impl fmt::Debug for BodyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyError").field("name", &self.name).field("source", &self.source.to_string()).finish()
    }
}

impl fmt::Display for BodyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "resource body for `{}` failed: {}", self.name, self.source)
    }
}

impl std::error::Error for BodyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for Message {}

/// The top-level error returned by `evaluate(...)` and by scope calls.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    /// An arity or shape violation raised while composing the tree.
    #[error(transparent)]
    Composition(#[from] CompositionError),

    /// A name could not be resolved from the point of lookup.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// Forcing a name revisited a name still in progress.
    #[error(transparent)]
    Cycle(#[from] CycleError),

    /// A scope call was missing or given unexpected parameters.
    #[error(transparent)]
    Call(#[from] CallError),

    /// An external caller tried to read a name that isn't published.
    #[error(transparent)]
    Visibility(#[from] VisibilityError),

    /// A contribution body raised an error during invocation.
    #[error(transparent)]
    Body(#[from] BodyError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EvalError>;
