//! Capability probes: the small interface the walker uses to look inside a value.
//!
//! The walker never asks "what type is this?". It asks a [`Probe`] which
//! capability the value supports (key/value pairs, ordered elements, named
//! attributes, or nothing) and enumerates whatever it gets back.

use core::any::Any;
use core::fmt;
use core::hash::{Hash, Hasher};
use std::hash::DefaultHasher;
use std::rc::Rc;

/// Keeps a visited value alive for the rest of a walk.
///
/// Values produced during a walk (computed attributes, for instance) would
/// otherwise be dropped as soon as they are rendered, and a later value could
/// be allocated at the same address and inherit their [`Identity`].
pub type Anchor = Rc<dyn Any>;

/// Opaque identity of a value, used to detect cycles and repeated references.
///
/// Two probes report the same identity iff they look at the same object.
/// The token prints as `#` followed by eight hex digits.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identity(u64);

impl Identity {
    /// Derive an identity from anything that uniquely names an object
    /// (an address, an address paired with a type, ...).
    pub fn of(key: impl Hash) -> Self {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        Self(hasher.finish())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:08x}", self.0 as u32)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A failed attribute access or iteration, carried into the output as an
/// `error` node instead of aborting the walk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeError {
    message: String,
}

impl ProbeError {
    /// Create an error with a short diagnostic.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The diagnostic text.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl core::error::Error for ProbeError {}

/// A child produced on demand, for values that cost something to read.
pub type Thunk<'a> = Box<dyn FnOnce() -> Result<Box<dyn Probe + 'a>, ProbeError> + 'a>;

enum Value<'a> {
    Ready(Result<Box<dyn Probe + 'a>, ProbeError>),
    Deferred(Thunk<'a>),
}

/// One child of a non-leaf value.
///
/// The value is only produced by [`Entry::into_parts`], so the walker can
/// drop internal entries without ever reading them.
pub struct Entry<'a> {
    /// Index, key summary, or attribute name
    pub label: String,
    /// Whether the probe's privacy predicate marks this entry as internal
    pub hidden: bool,
    value: Value<'a>,
}

impl<'a> Entry<'a> {
    /// A visible entry.
    pub fn new(label: impl Into<String>, value: impl Probe + 'a) -> Self {
        Self {
            label: label.into(),
            hidden: false,
            value: Value::Ready(Ok(Box::new(value))),
        }
    }

    /// An entry whose value could not be obtained.
    pub fn failed(label: impl Into<String>, error: ProbeError) -> Self {
        Self {
            label: label.into(),
            hidden: false,
            value: Value::Ready(Err(error)),
        }
    }

    /// An entry whose value is read only when the walker needs it.
    pub fn deferred(
        label: impl Into<String>,
        read: impl FnOnce() -> Result<Box<dyn Probe + 'a>, ProbeError> + 'a,
    ) -> Self {
        Self {
            label: label.into(),
            hidden: false,
            value: Value::Deferred(Box::new(read)),
        }
    }

    /// Mark the entry as internal (or not).
    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    /// Whether the value has not been read yet.
    pub fn is_deferred(&self) -> bool {
        matches!(self.value, Value::Deferred(_))
    }

    /// The label and the value, reading a deferred value now.
    pub fn into_parts(self) -> (String, Result<Box<dyn Probe + 'a>, ProbeError>) {
        let value = match self.value {
            Value::Ready(value) => value,
            Value::Deferred(read) => read(),
        };
        (self.label, value)
    }
}

impl fmt::Debug for Entry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match &self.value {
            Value::Ready(Ok(_)) => "ok",
            Value::Ready(Err(_)) => "error",
            Value::Deferred(_) => "deferred",
        };
        f.debug_struct("Entry")
            .field("label", &self.label)
            .field("hidden", &self.hidden)
            .field("value", &value)
            .finish()
    }
}

/// Iterator over the children of a value.
pub type Entries<'a> = Box<dyn Iterator<Item = Entry<'a>> + 'a>;

/// What a value lets the walker do with it.
pub enum Capability<'a> {
    /// Key/value pairs (maps, dictionaries)
    Mapping(Entries<'a>),
    /// Ordered elements without keys (lists, arrays, sets, tuples)
    Sequence(Entries<'a>),
    /// Named attributes (structs, records, enum variants)
    Composite(Entries<'a>),
    /// Nothing to descend into
    Leaf,
}

impl fmt::Debug for Capability<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Capability::Mapping(_) => "Mapping",
            Capability::Sequence(_) => "Sequence",
            Capability::Composite(_) => "Composite",
            Capability::Leaf => "Leaf",
        })
    }
}

/// A read-only window onto one runtime value.
pub trait Probe {
    /// Identity of the underlying object, if it has one worth tracking.
    ///
    /// Leaves usually return `None`: they cannot form cycles and repeating
    /// them costs nothing.
    fn identity(&self) -> Option<Identity>;

    /// Owning handle that keeps the identified object allocated, for values
    /// that may not outlive their own walk step. Borrowed values return
    /// `None`.
    fn anchor(&self) -> Option<Anchor> {
        None
    }

    /// Human-readable type name.
    fn type_name(&self) -> String;

    /// One-line short representation.
    fn summary(&self) -> String;

    /// Classify the value and enumerate its children.
    fn capability(&self) -> Result<Capability<'_>, ProbeError>;

    /// Privacy predicate for attribute names. Probes for hosts with other
    /// conventions override this.
    fn is_internal(&self, name: &str) -> bool {
        is_private_name(name)
    }
}

/// The default "internal attribute" convention: a leading underscore.
pub fn is_private_name(name: &str) -> bool {
    name.starts_with('_')
}

impl<P: Probe + ?Sized> Probe for &P {
    fn identity(&self) -> Option<Identity> {
        (**self).identity()
    }

    fn anchor(&self) -> Option<Anchor> {
        (**self).anchor()
    }

    fn type_name(&self) -> String {
        (**self).type_name()
    }

    fn summary(&self) -> String {
        (**self).summary()
    }

    fn capability(&self) -> Result<Capability<'_>, ProbeError> {
        (**self).capability()
    }

    fn is_internal(&self, name: &str) -> bool {
        (**self).is_internal(name)
    }
}
