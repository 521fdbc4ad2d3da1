//! Immutable association lists used while walking under binders.
//!
//! Each frame lives on the stack of the traversal that pushed it, so a list
//! never outlives the recursion that built it and inner frames shadow outer
//! ones.

use easy_ext::ext;

use crate::tt::Name;

#[derive(Debug, Clone)]
pub struct Bindings<'a, T> {
    pub from: Name,
    pub to: T,
    pub more: Option<&'a Bindings<'a, T>>,
}

impl<'a, T> Bindings<'a, T> {
    pub fn new(from: Name, to: T, more: Option<&'a Bindings<'a, T>>) -> Self {
        Bindings { from, to, more }
    }

    pub fn iter(&'a self) -> impl Iterator<Item = &'a Bindings<'a, T>> {
        let mut cur = Some(self);
        std::iter::from_fn(move || {
            let b = cur?;
            cur = b.more;
            Some(b)
        })
    }
}

#[ext(BindingsExt)]
pub impl<'a, T: 'a> Option<&'a Bindings<'a, T>> {
    /// The innermost frame whose `from` is `name`.
    fn find(self, name: &Name) -> Option<&'a Bindings<'a, T>> {
        self.and_then(|b| b.iter().find(|b| &b.from == name))
    }

    fn get(self, name: &Name) -> Option<&'a T> {
        self.find(name).map(|b| &b.to)
    }

    fn iter_frames(self) -> impl Iterator<Item = &'a Bindings<'a, T>> {
        self.into_iter().flat_map(|b| b.iter())
    }
}
