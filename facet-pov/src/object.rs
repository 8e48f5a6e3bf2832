//! A dynamic, shared, possibly cyclic object graph.
//!
//! [`Obj`] is what values from a dynamic host look like to the walker: lists
//! and dictionaries that can contain themselves, records with named
//! attributes, and attributes computed on access that may fail.
//!
//! ```
//! use facet_pov::{Obj, Walker};
//!
//! let list = Obj::list([Obj::int(1), Obj::int(2)]);
//! list.push(list.clone());
//!
//! let view = Walker::new().walk(&list, "list");
//! assert_eq!(view.count(facet_pov::NodeKind::CycleRef), 1);
//! ```
//!
//! An object can also be watched: [`Obj::watch`] registers a callback that
//! runs after every stored change (attribute set, list push, dict insert).

use core::cell::RefCell;
use core::fmt;
use std::rc::Rc;

use crate::{Anchor, Capability, Entry, Identity, Probe, ProbeError};

const BUSY: &str = "<object is being mutated>";

type Getter = Rc<dyn Fn() -> Result<Obj, String>>;

enum Slot {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Obj>),
    Tuple(Vec<Obj>),
    Dict(Vec<(Obj, Obj)>),
    Record {
        class: String,
        attrs: Vec<(String, Attr)>,
    },
}

#[derive(Clone)]
enum Attr {
    Stored(Obj),
    Computed(Getter),
}

/// Callback run after a watched object changes.
///
/// It receives the path of the change relative to the object (`.name`,
/// `[2]`, `["key"]`) and the value that was stored.
pub type WatchFn = Rc<dyn Fn(&str, &Obj)>;

struct Watch {
    names: Vec<String>,
    notify: WatchFn,
}

struct Inner {
    slot: RefCell<Slot>,
    watch: RefCell<Option<Watch>>,
}

/// Handle to a dynamic object. Cloning the handle shares the object.
#[derive(Clone)]
pub struct Obj(Rc<Inner>);

impl Obj {
    fn from_slot(slot: Slot) -> Self {
        Obj(Rc::new(Inner {
            slot: RefCell::new(slot),
            watch: RefCell::new(None),
        }))
    }

    /// The `None` value.
    pub fn none() -> Self {
        Self::from_slot(Slot::None)
    }

    /// A boolean.
    pub fn bool(value: bool) -> Self {
        Self::from_slot(Slot::Bool(value))
    }

    /// An integer.
    pub fn int(value: i64) -> Self {
        Self::from_slot(Slot::Int(value))
    }

    /// A float.
    pub fn float(value: f64) -> Self {
        Self::from_slot(Slot::Float(value))
    }

    /// A string.
    pub fn str(value: impl Into<String>) -> Self {
        Self::from_slot(Slot::Str(value.into()))
    }

    /// A mutable list.
    pub fn list(items: impl IntoIterator<Item = Obj>) -> Self {
        Self::from_slot(Slot::List(items.into_iter().collect()))
    }

    /// A tuple.
    pub fn tuple(items: impl IntoIterator<Item = Obj>) -> Self {
        Self::from_slot(Slot::Tuple(items.into_iter().collect()))
    }

    /// A dictionary that keeps insertion order.
    pub fn dict(pairs: impl IntoIterator<Item = (Obj, Obj)>) -> Self {
        Self::from_slot(Slot::Dict(pairs.into_iter().collect()))
    }

    /// A record of class `class` with no attributes yet.
    pub fn record(class: impl Into<String>) -> Self {
        Self::from_slot(Slot::Record {
            class: class.into(),
            attrs: Vec::new(),
        })
    }

    /// Builder form of [`Obj::set_attr`].
    pub fn with_attr(self, name: impl Into<String>, value: impl Into<Obj>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Add an attribute computed each time it is read. A getter returning
    /// `Err` shows up as an error in views.
    pub fn with_computed(
        self,
        name: impl Into<String>,
        getter: impl Fn() -> Result<Obj, String> + 'static,
    ) -> Self {
        self.put_attr(name.into(), Attr::Computed(Rc::new(getter)));
        self
    }

    /// Set (or replace) an attribute of a record. No-op on other objects.
    pub fn set_attr(&self, name: impl Into<String>, value: impl Into<Obj>) {
        let name = name.into();
        let value = value.into();
        if self.put_attr(name.clone(), Attr::Stored(value.clone())) {
            self.notify(Some(&name), &format!(".{name}"), &value);
        }
    }

    fn put_attr(&self, name: String, attr: Attr) -> bool {
        let Slot::Record { attrs, .. } = &mut *self.0.slot.borrow_mut() else {
            return false;
        };
        match attrs.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = attr,
            None => attrs.push((name, attr)),
        }
        true
    }

    /// Append to a list. No-op on other objects.
    pub fn push(&self, item: impl Into<Obj>) {
        let item = item.into();
        let index = match &mut *self.0.slot.borrow_mut() {
            Slot::List(items) => {
                items.push(item.clone());
                items.len() - 1
            }
            _ => return,
        };
        self.notify(None, &format!("[{index}]"), &item);
    }

    /// Insert or replace a dictionary entry (keys compared by identity, or
    /// by value for scalar keys). No-op on other objects.
    pub fn insert(&self, key: impl Into<Obj>, value: impl Into<Obj>) {
        let key = key.into();
        let value = value.into();
        match &mut *self.0.slot.borrow_mut() {
            Slot::Dict(pairs) => {
                match pairs.iter_mut().find(|(existing, _)| existing.same_key(&key)) {
                    Some((_, slot)) => *slot = value.clone(),
                    None => pairs.push((key.clone(), value.clone())),
                }
            }
            _ => return,
        }
        self.notify(None, &format!("[{}]", key.summary()), &value);
    }

    /// Run `notify` after every stored change to this object.
    ///
    /// For records only the attributes in `names` are reported, or every
    /// attribute when `names` is empty. List pushes and dict inserts are
    /// always reported. Computed attributes are never reported. A second
    /// call replaces the first watch.
    pub fn watch(&self, names: &[&str], notify: impl Fn(&str, &Obj) + 'static) {
        *self.0.watch.borrow_mut() = Some(Watch {
            names: names.iter().map(|name| (*name).to_owned()).collect(),
            notify: Rc::new(notify),
        });
    }

    /// Remove the watch, if any.
    pub fn unwatch(&self) {
        self.0.watch.borrow_mut().take();
    }

    /// Whether a watch is installed.
    pub fn is_watched(&self) -> bool {
        self.0.watch.borrow().is_some()
    }

    fn notify(&self, attr: Option<&str>, path: &str, value: &Obj) {
        let notify = {
            let watch = self.0.watch.borrow();
            match &*watch {
                Some(watch)
                    if attr.is_none_or(|attr| {
                        watch.names.is_empty() || watch.names.iter().any(|name| name == attr)
                    }) =>
                {
                    Rc::clone(&watch.notify)
                }
                _ => return,
            }
        };
        // The callback may mutate or unwatch this object.
        notify(path, value);
    }

    /// Whether two handles point at the same object.
    pub fn ptr_eq(&self, other: &Obj) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Number of elements, entries, or attributes. Zero for scalars.
    pub fn len(&self) -> usize {
        match &*self.0.slot.borrow() {
            Slot::List(items) | Slot::Tuple(items) => items.len(),
            Slot::Dict(pairs) => pairs.len(),
            Slot::Record { attrs, .. } => attrs.len(),
            _ => 0,
        }
    }

    /// Whether [`Obj::len`] is zero.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn same_key(&self, other: &Obj) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        let (Ok(a), Ok(b)) = (self.0.slot.try_borrow(), other.0.slot.try_borrow()) else {
            return false;
        };
        match (&*a, &*b) {
            (Slot::None, Slot::None) => true,
            (Slot::Bool(a), Slot::Bool(b)) => a == b,
            (Slot::Int(a), Slot::Int(b)) => a == b,
            (Slot::Str(a), Slot::Str(b)) => a == b,
            _ => false,
        }
    }

    /// Whether this is a list or a dict.
    pub fn is_container(&self) -> bool {
        self.0
            .slot
            .try_borrow()
            .is_ok_and(|slot| matches!(&*slot, Slot::List(_) | Slot::Dict(_)))
    }

    fn is_scalar(&self) -> bool {
        self.0.slot.try_borrow().is_ok_and(|slot| {
            matches!(
                &*slot,
                Slot::None | Slot::Bool(_) | Slot::Int(_) | Slot::Float(_) | Slot::Str(_)
            )
        })
    }
}

impl Probe for Obj {
    fn identity(&self) -> Option<Identity> {
        if self.is_scalar() {
            return None;
        }
        Some(Identity::of(Rc::as_ptr(&self.0) as *const () as usize))
    }

    fn anchor(&self) -> Option<Anchor> {
        Some(Rc::clone(&self.0) as Anchor)
    }

    fn type_name(&self) -> String {
        let Ok(slot) = self.0.slot.try_borrow() else {
            return BUSY.into();
        };
        match &*slot {
            Slot::None => "None".into(),
            Slot::Bool(_) => "bool".into(),
            Slot::Int(_) => "int".into(),
            Slot::Float(_) => "float".into(),
            Slot::Str(_) => "str".into(),
            Slot::List(_) => "list".into(),
            Slot::Tuple(_) => "tuple".into(),
            Slot::Dict(_) => "dict".into(),
            Slot::Record { class, .. } => class.clone(),
        }
    }

    fn summary(&self) -> String {
        let Ok(slot) = self.0.slot.try_borrow() else {
            return BUSY.into();
        };
        match &*slot {
            Slot::None => "None".into(),
            Slot::Bool(b) => String::from(if *b { "True" } else { "False" }),
            Slot::Int(n) => n.to_string(),
            Slot::Float(x) => format!("{x:?}"),
            Slot::Str(s) => format!("{s:?}"),
            Slot::List(items) => format!("list [{}]", items.len()),
            Slot::Tuple(items) => format!("tuple [{}]", items.len()),
            Slot::Dict(pairs) => format!("dict {{{}}}", pairs.len()),
            Slot::Record { class, .. } => format!("{class} {{…}}"),
        }
    }

    fn capability(&self) -> Result<Capability<'_>, ProbeError> {
        let slot = self
            .0
            .slot
            .try_borrow()
            .map_err(|_| ProbeError::new(BUSY))?;

        // Children are snapshotted so the borrow ends before the walker
        // descends (a child may be this very object).
        let capability = match &*slot {
            Slot::List(items) | Slot::Tuple(items) => {
                let entries: Vec<Entry<'_>> = items
                    .iter()
                    .enumerate()
                    .map(|(idx, item)| Entry::new(format!("[{idx}]"), item.clone()))
                    .collect();
                Capability::Sequence(Box::new(entries.into_iter()))
            }
            Slot::Dict(pairs) => {
                let entries: Vec<Entry<'_>> = pairs
                    .iter()
                    .map(|(key, value)| Entry::new(key.summary(), value.clone()))
                    .collect();
                Capability::Mapping(Box::new(entries.into_iter()))
            }
            Slot::Record { attrs, .. } => {
                let attrs = attrs.clone();
                let entries = attrs.into_iter().map(|(name, attr)| {
                    let hidden = self.is_internal(&name);
                    let entry = match attr {
                        Attr::Stored(value) => Entry::new(name, value),
                        Attr::Computed(getter) => Entry::deferred(name, move || match getter() {
                            Ok(value) => Ok(Box::new(value) as Box<dyn Probe>),
                            Err(message) => Err(ProbeError::new(message)),
                        }),
                    };
                    entry.hidden(hidden)
                });
                Capability::Composite(Box::new(entries))
            }
            _ => Capability::Leaf,
        };
        Ok(capability)
    }
}

impl fmt::Debug for Obj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Obj({})", self.summary())
    }
}

impl From<bool> for Obj {
    fn from(value: bool) -> Self {
        Obj::bool(value)
    }
}

impl From<i64> for Obj {
    fn from(value: i64) -> Self {
        Obj::int(value)
    }
}

impl From<i32> for Obj {
    fn from(value: i32) -> Self {
        Obj::int(i64::from(value))
    }
}

impl From<f64> for Obj {
    fn from(value: f64) -> Self {
        Obj::float(value)
    }
}

impl From<&str> for Obj {
    fn from(value: &str) -> Self {
        Obj::str(value)
    }
}

impl From<String> for Obj {
    fn from(value: String) -> Self {
        Obj::str(value)
    }
}

impl<T: Into<Obj>> From<Option<T>> for Obj {
    fn from(value: Option<T>) -> Self {
        value.map_or_else(Obj::none, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(capability: Capability<'_>) -> Vec<(String, bool, bool)> {
        let entries = match capability {
            Capability::Mapping(e) | Capability::Sequence(e) | Capability::Composite(e) => e,
            Capability::Leaf => return Vec::new(),
        };
        entries
            .map(|entry| {
                let hidden = entry.hidden;
                let (label, value) = entry.into_parts();
                (label, hidden, value.is_ok())
            })
            .collect()
    }

    #[test]
    fn scalars_have_no_identity() {
        assert!(Obj::int(3).identity().is_none());
        assert!(Obj::str("x").identity().is_none());
        assert!(Obj::list([]).identity().is_some());
    }

    #[test]
    fn clones_share_identity() {
        let a = Obj::record("Point");
        let b = a.clone();
        let c = Obj::record("Point");
        assert_eq!(a.identity(), b.identity());
        assert_ne!(a.identity(), c.identity());
    }

    #[test]
    fn record_attributes_are_classified() {
        let point = Obj::record("Point")
            .with_attr("x", 1)
            .with_attr("_cache", Obj::none())
            .with_computed("area", || Err("ZeroDivisionError: division by zero".into()));
        assert!(matches!(point.capability(), Ok(Capability::Composite(_))));
        assert_eq!(
            labels(point.capability().unwrap()),
            vec![
                ("x".to_owned(), false, true),
                ("_cache".to_owned(), true, true),
                ("area".to_owned(), false, false),
            ]
        );
    }

    #[test]
    fn dict_insert_replaces_equal_scalar_keys() {
        let d = Obj::dict([]);
        d.insert("a", 1);
        d.insert("a", 2);
        d.insert("b", 3);
        assert_eq!(d.len(), 2);
        assert_eq!(
            labels(d.capability().unwrap()),
            vec![
                ("\"a\"".to_owned(), false, true),
                ("\"b\"".to_owned(), false, true),
            ]
        );
    }

    #[test]
    fn computed_attributes_are_deferred() {
        let obj = Obj::record("Lazy")
            .with_attr("x", 1)
            .with_computed("y", || Ok(Obj::int(2)));
        let Ok(Capability::Composite(entries)) = obj.capability() else {
            panic!("records are composites");
        };
        let deferred: Vec<_> = entries.map(|entry| entry.is_deferred()).collect();
        assert_eq!(deferred, [false, true]);
    }

    #[test]
    fn anchor_keeps_the_object_alive() {
        let obj = Obj::list([]);
        let anchor = obj.anchor().unwrap();
        let identity = obj.identity();
        drop(obj);
        assert_eq!(Rc::strong_count(&anchor), 1);
        assert!(identity.is_some());
    }

    #[test]
    fn watch_reports_stored_changes() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let record = Obj::record("Point").with_attr("x", 1);
        record.watch(&["x"], {
            let seen = Rc::clone(&seen);
            move |path, value| seen.borrow_mut().push(format!("{path}={}", value.summary()))
        });
        record.set_attr("x", 2);
        record.set_attr("y", 3);
        assert!(record.is_watched());

        let list = Obj::list([]);
        list.watch(&[], {
            let seen = Rc::clone(&seen);
            move |path, value| seen.borrow_mut().push(format!("{path}={}", value.summary()))
        });
        list.push(7);

        let dict = Obj::dict([]);
        dict.watch(&[], {
            let seen = Rc::clone(&seen);
            move |path, value| seen.borrow_mut().push(format!("{path}={}", value.summary()))
        });
        dict.insert("k", "v");

        record.unwatch();
        record.set_attr("x", 4);
        assert_eq!(*seen.borrow(), [".x=2", "[0]=7", "[\"k\"]=\"v\""]);
    }

    #[test]
    fn watch_callback_may_mutate_the_object() {
        let list = Obj::list([]);
        let target = list.clone();
        list.watch(&[], move |_, value| {
            if value.summary() == "1" {
                target.push(2);
            }
        });
        list.push(1);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn summaries() {
        assert_eq!(Obj::none().summary(), "None");
        assert_eq!(Obj::bool(true).summary(), "True");
        assert_eq!(Obj::float(1.5).summary(), "1.5");
        assert_eq!(Obj::str("hi").summary(), "\"hi\"");
        assert_eq!(Obj::list([Obj::int(1)]).summary(), "list [1]");
        assert_eq!(Obj::dict([]).summary(), "dict {0}");
        assert_eq!(Obj::record("Point").summary(), "Point {…}");
    }
}
