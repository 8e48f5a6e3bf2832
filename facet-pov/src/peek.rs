//! Probing values through facet reflection.

use core::fmt;

use facet_core::{Def, Facet, StructKind, Type, TypeNameOpts, UserType};
use facet_reflect::Peek;

use crate::{Capability, Entry, Identity, Probe, ProbeError};

/// How a peeked value is shaped, decided once when the probe is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Class {
    Leaf,
    None,
    Map,
    Set,
    List,
    Struct,
    Enum,
}

/// A [`Probe`] over any value implementing [`Facet`].
///
/// References, boxes, and reference-counted pointers are looked through, as
/// is `Some(..)`. Two `Arc`s sharing one allocation therefore share an
/// identity, and the second one is reported as a repeated reference.
#[derive(Clone, Copy)]
pub struct PeekProbe<'mem, 'facet> {
    peek: Peek<'mem, 'facet>,
    class: Class,
}

/// Probe a facet value.
///
/// ```
/// use facet_pov::{peek, Walker};
///
/// let numbers = vec![1, 2, 3];
/// let view = Walker::new().walk(&peek(&numbers), "numbers");
/// assert_eq!(view.children.len(), 3);
/// ```
pub fn peek<'mem, 'facet, T: Facet<'facet> + ?Sized>(value: &'mem T) -> PeekProbe<'mem, 'facet> {
    PeekProbe::new(Peek::new(value))
}

impl<'mem, 'facet> PeekProbe<'mem, 'facet> {
    /// Wrap an existing [`Peek`].
    pub fn new(peek: Peek<'mem, 'facet>) -> Self {
        let peek = look_through(peek);
        Self {
            class: classify(peek),
            peek,
        }
    }

    /// The underlying peek, after looking through pointers and `Some`.
    pub fn peek(&self) -> Peek<'mem, 'facet> {
        self.peek
    }

    fn struct_entries(&self) -> Result<Capability<'_>, ProbeError> {
        let Type::User(UserType::Struct(ty)) = self.peek.shape().ty else {
            return Ok(Capability::Leaf);
        };
        let value = self.peek.into_struct().map_err(reflect_error)?;
        let probe = *self;
        let entries = ty.fields.iter().enumerate().map(move |(idx, field)| {
            let hidden = field.is_sensitive() || probe.is_internal(field.name);
            let entry = match value.field(idx) {
                Ok(child) => Entry::new(field.name, PeekProbe::new(child)),
                Err(err) => Entry::failed(field.name, ProbeError::new(err.to_string())),
            };
            entry.hidden(hidden)
        });
        Ok(Capability::Composite(Box::new(entries)))
    }

    fn enum_entries(&self) -> Result<Capability<'_>, ProbeError> {
        let value = self.peek.into_enum().map_err(reflect_error)?;
        let variant = value
            .active_variant()
            .map_err(|err| ProbeError::new(err.to_string()))?;
        let probe = *self;
        let entries = variant
            .data
            .fields
            .iter()
            .enumerate()
            .map(move |(idx, field)| {
                let hidden = field.is_sensitive() || probe.is_internal(field.name);
                let entry = match value.field(idx) {
                    Ok(Some(child)) => Entry::new(field.name, PeekProbe::new(child)),
                    Ok(None) => Entry::failed(field.name, ProbeError::new("no such field")),
                    Err(err) => Entry::failed(field.name, ProbeError::new(err.to_string())),
                };
                entry.hidden(hidden)
            });
        Ok(Capability::Composite(Box::new(entries)))
    }

    fn is_zero_sized(&self) -> bool {
        self.peek
            .shape()
            .layout
            .sized_layout()
            .is_ok_and(|layout| layout.size() == 0)
    }

    fn variant_name(&self) -> Option<&'static str> {
        let value = self.peek.into_enum().ok()?;
        value.active_variant().ok().map(|variant| variant.name)
    }

    fn len(&self) -> usize {
        match self.class {
            Class::Map => self.peek.into_map().map(|m| m.len()).unwrap_or(0),
            Class::Set => self.peek.into_set().map(|s| s.len()).unwrap_or(0),
            Class::List => self.peek.into_list_like().map(|l| l.len()).unwrap_or(0),
            _ => 0,
        }
    }
}

fn look_through<'mem, 'facet>(mut value: Peek<'mem, 'facet>) -> Peek<'mem, 'facet> {
    loop {
        if let Ok(ptr) = value.into_pointer()
            && let Some(pointee) = ptr.borrow_inner()
        {
            value = pointee;
            continue;
        }
        if let Ok(option) = value.into_option()
            && let Some(inner) = option.value()
        {
            value = inner;
            continue;
        }
        return value;
    }
}

fn classify(value: Peek<'_, '_>) -> Class {
    let shape = value.shape();
    if matches!(shape.def, Def::Scalar) || value.as_str().is_some() {
        return Class::Leaf;
    }
    if value.into_option().is_ok() {
        // look_through already unwrapped `Some`
        return Class::None;
    }
    if value.into_map().is_ok() {
        return Class::Map;
    }
    if value.into_set().is_ok() {
        return Class::Set;
    }
    if value.into_list_like().is_ok() {
        return Class::List;
    }
    match shape.ty {
        Type::User(UserType::Struct(ty)) => {
            if matches!(ty.kind, StructKind::Unit) || ty.fields.is_empty() {
                Class::Leaf
            } else {
                Class::Struct
            }
        }
        Type::User(UserType::Enum(_)) => {
            let has_fields = value
                .into_enum()
                .ok()
                .and_then(|e| e.active_variant().ok())
                .is_none_or(|variant| !variant.data.fields.is_empty());
            if has_fields {
                Class::Enum
            } else {
                Class::Leaf
            }
        }
        _ => Class::Leaf,
    }
}

fn reflect_error(err: facet_reflect::ReflectError) -> ProbeError {
    ProbeError::new(err.to_string())
}

struct TypeName<'a, 'mem, 'facet>(&'a Peek<'mem, 'facet>);

impl fmt::Display for TypeName<'_, '_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.type_name(f, TypeNameOpts::infinite())
    }
}

struct Scalar<'a, 'mem, 'facet>(&'a Peek<'mem, 'facet>);

impl fmt::Display for Scalar<'_, '_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.0.as_str() {
            write!(f, "{s:?}")
        } else if self.0.shape().is_display() {
            write!(f, "{}", self.0)
        } else if self.0.shape().is_debug() {
            write!(f, "{:?}", self.0)
        } else {
            write!(f, "{}(…)", TypeName(self.0))
        }
    }
}

impl<'mem, 'facet> Probe for PeekProbe<'mem, 'facet> {
    fn identity(&self) -> Option<Identity> {
        match self.class {
            Class::Leaf | Class::None => None,
            // Zero-sized values share addresses with their neighbours.
            _ if self.is_zero_sized() => None,
            _ => Some(Identity::of(self.peek.id())),
        }
    }

    fn type_name(&self) -> String {
        match self.class {
            Class::Enum | Class::Leaf => match self.variant_name() {
                Some(variant) => format!("{}::{variant}", TypeName(&self.peek)),
                None => TypeName(&self.peek).to_string(),
            },
            _ => TypeName(&self.peek).to_string(),
        }
    }

    fn summary(&self) -> String {
        match self.class {
            Class::None => "None".into(),
            Class::Leaf => match self.peek.shape().ty {
                Type::User(UserType::Enum(_)) | Type::User(UserType::Struct(_))
                    if !matches!(self.peek.shape().def, Def::Scalar) =>
                {
                    self.type_name()
                }
                _ => Scalar(&self.peek).to_string(),
            },
            Class::Map => format!("{} {{{}}}", self.type_name(), self.len()),
            Class::Set | Class::List => format!("{} [{}]", self.type_name(), self.len()),
            Class::Struct | Class::Enum => format!("{} {{…}}", self.type_name()),
        }
    }

    fn capability(&self) -> Result<Capability<'_>, ProbeError> {
        match self.class {
            Class::Leaf | Class::None => Ok(Capability::Leaf),
            Class::Map => {
                let map = self.peek.into_map().map_err(reflect_error)?;
                let entries = map.iter().map(|(key, value)| {
                    Entry::new(PeekProbe::new(key).summary(), PeekProbe::new(value))
                });
                Ok(Capability::Mapping(Box::new(entries)))
            }
            Class::Set => {
                let set = self.peek.into_set().map_err(reflect_error)?;
                let entries = set
                    .iter()
                    .enumerate()
                    .map(|(idx, item)| Entry::new(format!("[{idx}]"), PeekProbe::new(item)));
                Ok(Capability::Sequence(Box::new(entries)))
            }
            Class::List => {
                let list = self.peek.into_list_like().map_err(reflect_error)?;
                let entries = list
                    .iter()
                    .enumerate()
                    .map(|(idx, item)| Entry::new(format!("[{idx}]"), PeekProbe::new(item)));
                Ok(Capability::Sequence(Box::new(entries)))
            }
            Class::Struct => self.struct_entries(),
            Class::Enum => self.enum_entries(),
        }
    }
}

impl fmt::Debug for PeekProbe<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeekProbe")
            .field("type", &self.type_name())
            .field("class", &self.class)
            .finish()
    }
}
