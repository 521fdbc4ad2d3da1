//! Addressing subterms by [Path].

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::path::{AddressingError, Path, Segment};
use crate::tt::{mk_abs, mk_app, Name, Term};

impl Term {
    /// The subterm at `path`.
    pub fn locate(&self, path: &Path) -> Result<Term, AddressingError> {
        let Some(segment) = path.segment() else {
            return Ok(self.clone());
        };
        let rest = path.tail().unwrap_or(path);
        match (self, segment) {
            (Term::App(inner), Segment::Fn) => inner.fun.locate(rest),
            (Term::App(inner), Segment::Arg) => inner.arg.locate(rest),
            (Term::Abs(inner), Segment::Bound) => Term::Var(inner.bound.clone()).locate(rest),
            (Term::Abs(inner), Segment::Body) => inner.body.locate(rest),
            _ => Err(AddressingError::mismatch(segment, self)),
        }
    }

    /// Path to the first subterm satisfying `pred`, searching in pre-order and
    /// never descending into binding occurrences.
    pub fn path_to(&self, pred: impl Fn(&Term) -> bool) -> Option<Path> {
        self.path_to_help(&pred)
    }

    fn path_to_help(&self, pred: &dyn Fn(&Term) -> bool) -> Option<Path> {
        if pred(self) {
            return Some(Path::here());
        }
        match self {
            Term::Var(_) => None,
            Term::App(inner) => inner
                .fun
                .path_to_help(pred)
                .map(|p| Path::cons(Segment::Fn, p))
                .or_else(|| inner.arg.path_to_help(pred).map(|p| Path::cons(Segment::Arg, p))),
            Term::Abs(inner) => inner.body.path_to_help(pred).map(|p| Path::cons(Segment::Body, p)),
        }
    }

    /// Path to the first abstraction whose bound variable satisfies `pred`.
    pub fn path_to_binding(&self, pred: impl Fn(&Term) -> bool) -> Option<Path> {
        self.path_to_binding_help(&pred)
    }

    fn path_to_binding_help(&self, pred: &dyn Fn(&Term) -> bool) -> Option<Path> {
        match self {
            Term::Var(_) => None,
            Term::App(inner) => inner
                .fun
                .path_to_binding_help(pred)
                .map(|p| Path::cons(Segment::Fn, p))
                .or_else(|| {
                    inner
                        .arg
                        .path_to_binding_help(pred)
                        .map(|p| Path::cons(Segment::Arg, p))
                }),
            Term::Abs(inner) => {
                if pred(&Term::Var(inner.bound.clone())) {
                    return Some(Path::here());
                }
                inner
                    .body
                    .path_to_binding_help(pred)
                    .map(|p| Path::cons(Segment::Body, p))
            }
        }
    }

    /// A copy of `self` with the subterm at `path` replaced by `xform` of it.
    /// Every subterm off the path is shared with `self`.
    pub fn replace_at(
        &self,
        path: &Path,
        xform: impl FnOnce(&Term) -> Term,
    ) -> Result<Term, AddressingError> {
        let mut xform = Some(xform);
        self.replace_at_help(path, &mut |m| match xform.take() {
            Some(f) => f(m),
            None => m.clone(),
        })
    }

    fn replace_at_help(
        &self,
        path: &Path,
        xform: &mut dyn FnMut(&Term) -> Term,
    ) -> Result<Term, AddressingError> {
        let Some(segment) = path.segment() else {
            return Ok(xform(self));
        };
        let rest = path.tail().unwrap_or(path);
        match (self, segment) {
            (Term::App(inner), Segment::Fn) => {
                let fun = inner.fun.replace_at_help(rest, xform)?;
                if fun.ptr_eq(&inner.fun) {
                    return Ok(self.clone());
                }
                Ok(mk_app(fun, inner.arg.clone()))
            }
            (Term::App(inner), Segment::Arg) => {
                let arg = inner.arg.replace_at_help(rest, xform)?;
                if arg.ptr_eq(&inner.arg) {
                    return Ok(self.clone());
                }
                Ok(mk_app(inner.fun.clone(), arg))
            }
            (Term::Abs(inner), Segment::Body) => {
                let body = inner.body.replace_at_help(rest, xform)?;
                if body.ptr_eq(&inner.body) {
                    return Ok(self.clone());
                }
                Ok(mk_abs(inner.bound.clone(), body))
            }
            (Term::Abs(inner), Segment::Bound) => {
                let current = Term::Var(inner.bound.clone());
                let bound = current.replace_at_help(rest, xform)?;
                if bound.ptr_eq(&current) {
                    return Ok(self.clone());
                }
                match bound {
                    Term::Var(v) => Ok(mk_abs(v, inner.body.clone())),
                    other => Err(AddressingError::NotAVariable(other.dump())),
                }
            }
            _ => Err(AddressingError::mismatch(segment, self)),
        }
    }

    /// Names bound by the abstractions enclosing the position at `path`.
    pub fn bound_names(&self, path: &Path) -> Result<BTreeSet<Name>, AddressingError> {
        let mut names = BTreeSet::new();
        let mut m = self.clone();
        let mut p = path;
        while let Some(segment) = p.segment() {
            let next = match (&m, segment) {
                (Term::App(inner), Segment::Fn) => inner.fun.clone(),
                (Term::App(inner), Segment::Arg) => inner.arg.clone(),
                (Term::Abs(inner), Segment::Body) => {
                    names.insert(inner.bound.name.clone());
                    inner.body.clone()
                }
                (Term::Abs(inner), Segment::Bound) => Term::Var(Arc::clone(&inner.bound)),
                _ => return Err(AddressingError::mismatch(segment, &m)),
            };
            m = next;
            p = p.tail().unwrap_or(p);
        }
        Ok(names)
    }
}
