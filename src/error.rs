use std::fmt;

use thiserror::Error;

use crate::model::{ObjectId, SandboxId, TypeDesc};

/// Builds an [`Error::Raised`] describing a failure thrown by a member body.
///
/// Bodies and shadow handlers use this to model platform exceptions. The first
/// argument names the failure kind (conventionally an exception class name),
/// the rest is a message or a format string with arguments.
///
/// ```rust
/// use shadowbox::{raise, Error};
///
/// let err: Error = raise!("IllegalStateException", "codec is not started");
/// assert!(matches!(err, Error::Raised(ref r) if r.kind == "IllegalStateException"));
///
/// let index = 4;
/// let err: Error = raise!("IndexOutOfBounds", "no buffer at {}", index);
/// assert_eq!(err.to_string(), "IndexOutOfBounds: no buffer at 4");
/// ```
#[macro_export]
macro_rules! raise {
    // Single message version
    ($kind:expr, $msg:expr) => {
        $crate::Error::Raised($crate::Raised::new($kind, $msg))
    };

    // Format string with arguments version
    ($kind:expr, $fmt:expr, $($arg:tt)*) => {
        $crate::Error::Raised($crate::Raised::new($kind, format!($fmt, $($arg)*)))
    };
}

macro_rules! config_error {
    ($variant:ident { $($field:ident : $value:expr),* $(,)? }) => {
        crate::Error::Config(crate::error::ConfigError::$variant {
            $($field: $value.into()),*
        })
    };

    ($variant:ident ( $value:expr )) => {
        crate::Error::Config(crate::error::ConfigError::$variant($value.into()))
    };
}

/// A failure raised by a member body or shadow handler.
///
/// The engine never inspects or rewrites a `Raised` value: whatever a body
/// returns is what the caller receives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Raised {
    /// The failure kind, conventionally the name of the exception class.
    pub kind: String,
    /// Human readable detail.
    pub message: String,
}

impl Raised {
    /// Creates a new raised failure.
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Raised {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Errors in the scenario configuration or in shadow declarations.
///
/// All of these are detected while a sandbox is being built, before any
/// scenario code runs, and are fatal to that scenario.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A class named in the configuration is not on the class path.
    #[error("Class '{0}' is not on the class path")]
    UnknownClass(String),

    /// A class was added to the class path twice.
    #[error("Class '{0}' is already on the class path")]
    DuplicateClass(String),

    /// A class declares the same member signature twice.
    #[error("Class '{class}' declares '{member}' more than once")]
    DuplicateMember {
        /// The declaring class
        class: String,
        /// The duplicated member signature
        member: String,
    },

    /// A class extends a class that is not on the class path.
    #[error("Class '{class}' extends unknown class '{superclass}'")]
    UnknownSuperclass {
        /// The subclass
        class: String,
        /// The missing superclass
        superclass: String,
    },

    /// A package pattern is empty or not a dotted identifier path.
    #[error("Invalid package pattern '{0}'")]
    InvalidPackagePattern(String),

    /// The configuration activates a shadow that is not in the catalog.
    #[error("Shadow '{0}' is not registered")]
    UnknownShadow(String),

    /// Two shadow classes with the same name were registered.
    #[error("Shadow '{0}' is already registered")]
    DuplicateShadowName(String),

    /// A shadow class does not declare a target class.
    #[error("Shadow '{shadow}' does not declare a target class")]
    MissingTarget {
        /// The shadow class
        shadow: String,
    },

    /// A shadow class declares more than one target class.
    #[error("Shadow '{shadow}' declares more than one target: {targets:?}")]
    AmbiguousTarget {
        /// The shadow class
        shadow: String,
        /// Every declared target
        targets: Vec<String>,
    },

    /// A shadow class targets a class that is not on the class path.
    #[error("Shadow '{shadow}' targets unknown class '{target}'")]
    UnknownTarget {
        /// The shadow class
        shadow: String,
        /// The missing target
        target: String,
    },

    /// Two active shadows target the same real class.
    #[error("Class '{class}' is shadowed by both '{first}' and '{second}'")]
    DuplicateShadow {
        /// The doubly shadowed class
        class: String,
        /// The shadow registered first
        first: String,
        /// The conflicting shadow
        second: String,
    },

    /// A shadow declares the same implementation signature twice.
    #[error("Shadow '{shadow}' implements '{member}' more than once")]
    DuplicateShadowMember {
        /// The shadow class
        shadow: String,
        /// The duplicated signature
        member: String,
    },

    /// A shadow implementation has no counterpart on the target class.
    #[error("Shadow '{shadow}' implements '{member}' which does not exist on the target class")]
    UnmatchedShadowMember {
        /// The shadow class
        shadow: String,
        /// The unmatched signature
        member: String,
    },

    /// A shadow implementation declares a different return type than the real member.
    #[error("Shadow '{shadow}' implements '{member}' returning {found}, but the real member returns {expected}")]
    ReturnTypeMismatch {
        /// The shadow class
        shadow: String,
        /// The member signature
        member: String,
        /// Return type of the real member
        expected: TypeDesc,
        /// Return type declared by the shadow
        found: TypeDesc,
    },

    /// A static shadow implementation matches an instance member, or the reverse.
    #[error("Shadow '{shadow}' implements '{member}' with the wrong static-ness")]
    StaticMismatch {
        /// The shadow class
        shadow: String,
        /// The member signature
        member: String,
    },
}

/// The generic Error type, which covers every failure the engine can report.
///
/// # Error Categories
///
/// ## Configuration
/// - [`Error::Config`] - Sandbox construction failed, see [`ConfigError`]
/// - [`Error::ReservedName`] - A class collides with a preserved entry point name
///
/// ## Dispatch
/// - [`Error::Raised`] - A body or shadow failed; propagated unchanged
/// - [`Error::UnknownClass`], [`Error::UnknownMember`] - Call target not found
/// - [`Error::ArgumentMismatch`], [`Error::CallKind`] - Call does not fit the member
/// - [`Error::UnsatisfiedLink`] - Native member on a class that is not instrumented
/// - [`Error::DirectCallOnNative`] - Direct call on a member without preserved body
/// - [`Error::ReentrantShadowCall`], [`Error::ShadowStateMismatch`], [`Error::NoShadow`]
///
/// ## Isolation
/// - [`Error::SandboxDestroyed`] - Sandbox used after teardown
/// - [`Error::ForeignObject`] - Object handle from another sandbox
///
/// # Examples
///
/// ```rust,ignore
/// use shadowbox::{Error, ConfigError};
///
/// match manager.create(&config) {
///     Ok(sandbox) => run(&sandbox),
///     Err(Error::Config(ConfigError::UnmatchedShadowMember { shadow, member })) => {
///         eprintln!("{shadow} shadows '{member}' which does not exist");
///     }
///     Err(e) => eprintln!("Error: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The sandbox configuration or a shadow declaration is invalid.
    #[error("Configuration error - {0}")]
    Config(#[from] ConfigError),

    /// A class declares a member whose name is reserved for preserved entry points.
    #[error("Class '{class}' declares '{member}' which collides with a reserved entry point")]
    ReservedName {
        /// The offending class
        class: String,
        /// The colliding member
        member: String,
    },

    /// A failure raised by a member body or shadow handler.
    ///
    /// This variant is never produced by the engine itself; it is returned
    /// exactly as the body produced it.
    #[error("{0}")]
    Raised(Raised),

    /// The call target class is not loaded in the sandbox.
    #[error("Class '{0}' is not loaded")]
    UnknownClass(String),

    /// The class (and its superclasses) do not declare the requested member.
    #[error("Class '{class}' has no member '{member}'")]
    UnknownMember {
        /// The class searched first
        class: String,
        /// The requested signature
        member: String,
    },

    /// The supplied arguments do not fit the member's parameter types.
    #[error("Arguments do not match '{member}': {message}")]
    ArgumentMismatch {
        /// The called member
        member: String,
        /// What did not match
        message: String,
    },

    /// A static member was invoked on an instance, or the reverse.
    #[error("'{member}' cannot be called this way: {message}")]
    CallKind {
        /// The called member
        member: String,
        /// Why the call form is wrong
        message: &'static str,
    },

    /// A native member of a non-instrumented class was called.
    #[error("Native member '{member}' of '{class}' has no implementation outside a shadow")]
    UnsatisfiedLink {
        /// The declaring class
        class: String,
        /// The native member
        member: String,
    },

    /// A direct call targeted a native member, which has no original body.
    #[error("Cannot call '{member}' of '{class}' directly: native members have no original body")]
    DirectCallOnNative {
        /// The declaring class
        class: String,
        /// The native member
        member: String,
    },

    /// The declared type passed to the direct-call bridge is not a type of the instance.
    #[error("Instance of '{object_class}' is not a '{declared}'")]
    NotAssignable {
        /// The runtime class of the instance
        object_class: String,
        /// The declared type requested
        declared: String,
    },

    /// Shadow state was borrowed again while an outer borrow was still held.
    #[error("State of shadow '{shadow}' is already borrowed further up the call stack")]
    ReentrantShadowCall {
        /// The shadow class
        shadow: String,
    },

    /// The stored shadow state is not of the type the caller asked for.
    #[error("Shadow '{shadow}' state is not a '{expected}'")]
    ShadowStateMismatch {
        /// The shadow class
        shadow: String,
        /// The requested state type
        expected: &'static str,
    },

    /// The instance's class hierarchy has no active shadow.
    #[error("Class '{0}' has no active shadow in this sandbox")]
    NoShadow(String),

    /// The sandbox has been torn down.
    #[error("{0} has been torn down")]
    SandboxDestroyed(SandboxId),

    /// An object handle was used in a sandbox that does not own it.
    #[error("Object {object} belongs to {owner}, not {sandbox}")]
    ForeignObject {
        /// The object handle
        object: ObjectId,
        /// The sandbox that allocated it
        owner: SandboxId,
        /// The sandbox it was used in
        sandbox: SandboxId,
    },

    /// Failed to lock target.
    ///
    /// This error occurs when a lock guarding sandbox state was poisoned by a
    /// panic in another thread.
    #[error("Failed to lock target")]
    LockError,

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}

impl Error {
    /// Returns `true` if this error reports use of a sandbox outside its lifetime
    /// or ownership boundary.
    #[must_use]
    pub fn is_isolation_violation(&self) -> bool {
        matches!(self, Error::SandboxDestroyed(_) | Error::ForeignObject { .. })
    }

    /// Returns the raised failure, if this error was produced by a body.
    #[must_use]
    pub fn raised(&self) -> Option<&Raised> {
        match self {
            Error::Raised(raised) => Some(raised),
            _ => None,
        }
    }
}
