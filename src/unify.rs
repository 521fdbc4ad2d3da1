//! Structural matching of terms: alpha-equivalence, schema matching and
//! schema instantiation.

use crate::bindings::{Bindings, BindingsExt};
use crate::subst::{sub_free_map, NameSupply};
use crate::tt::{Name, Term, TermVar};

/// A substitution from schema variables to terms, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subst {
    entries: Vec<(Name, Term)>,
}

impl Subst {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &Name) -> Option<&Term> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, m)| m)
    }

    /// Binds `name` to `term` unless it is already bound; the existing binding
    /// wins and is returned.
    pub fn insert(&mut self, name: Name, term: Term) -> Option<&Term> {
        match self.entries.iter().position(|(n, _)| n == &name) {
            Some(i) => Some(&self.entries[i].1),
            None => {
                self.entries.push((name, term));
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Name, &Term)> {
        self.entries.iter().map(|(n, m)| (n, m))
    }

    pub fn as_slice(&self) -> &[(Name, Term)] {
        &self.entries
    }
}

impl FromIterator<(Name, Term)> for Subst {
    fn from_iter<I: IntoIterator<Item = (Name, Term)>>(iter: I) -> Self {
        let mut subst = Subst::new();
        for (name, term) in iter {
            subst.insert(name, term);
        }
        subst
    }
}

impl Term {
    /// Alpha-equivalence.
    pub fn matches(&self, other: &Term) -> bool {
        matches_in(self, other, None)
    }
}

// Variable occurrences correspond when they resolve to the same binding
// frame, or are both free with one name.
fn var_matches(a: &TermVar, b: &TermVar, bindings: Option<&Bindings<Name>>) -> bool {
    match bindings
        .iter_frames()
        .find(|frame| frame.from == a.name || frame.to == b.name)
    {
        Some(frame) => frame.from == a.name && frame.to == b.name,
        None => a.name == b.name,
    }
}

fn matches_in(a: &Term, b: &Term, bindings: Option<&Bindings<Name>>) -> bool {
    if bindings.is_none() && a.ptr_eq(b) {
        return true;
    }
    match (a, b) {
        (Term::Var(a), Term::Var(b)) => var_matches(a, b, bindings),
        (Term::App(a), Term::App(b)) => {
            matches_in(&a.fun, &b.fun, bindings) && matches_in(&a.arg, &b.arg, bindings)
        }
        (Term::Abs(a), Term::Abs(b)) => {
            let bindings = Bindings::new(a.bound.name.clone(), b.bound.name.clone(), bindings);
            matches_in(&a.body, &b.body, Some(&bindings))
        }
        _ => false,
    }
}

/// A substitution for the free variables of `schema` that turns it into
/// `target`, or [None]. Constants of the schema match only themselves.
pub fn match_schema(schema: &Term, target: &Term) -> Option<Subst> {
    let mut subst = Subst::new();
    if match_schema_help(schema, target, &mut subst, None) {
        Some(subst)
    } else {
        None
    }
}

fn match_schema_help(
    schema: &Term,
    target: &Term,
    subst: &mut Subst,
    bindings: Option<&Bindings<Name>>,
) -> bool {
    match schema {
        Term::Var(v) => {
            if v.name.is_constant() || bindings.find(&v.name).is_some() {
                return match target {
                    Term::Var(w) => var_matches(v, w, bindings),
                    _ => false,
                };
            }
            // a schema variable cannot stand for a term mentioning a variable
            // bound inside the target
            let escapes = bindings
                .iter_frames()
                .any(|frame| target.has_free_name(&frame.to));
            if escapes {
                return false;
            }
            match subst.insert(v.name.clone(), target.clone()) {
                Some(existing) => existing.matches(target),
                None => true,
            }
        }
        Term::App(s) => match target {
            Term::App(t) => {
                match_schema_help(&s.fun, &t.fun, subst, bindings)
                    && match_schema_help(&s.arg, &t.arg, subst, bindings)
            }
            _ => false,
        },
        Term::Abs(s) => match target {
            Term::Abs(t) => {
                let bindings = Bindings::new(s.bound.name.clone(), t.bound.name.clone(), bindings);
                match_schema_help(&s.body, &t.body, subst, Some(&bindings))
            }
            _ => false,
        },
    }
}

/// A renaming of the free variables of `a` that makes it identical to `b`: a
/// schema match whose values are all variables, no two the same.
pub fn alpha_match(a: &Term, b: &Term) -> Option<Subst> {
    let subst = match_schema(a, b)?;
    let mut seen = vec![];
    for (_, value) in subst.iter() {
        let Term::Var(v) = value else {
            return None;
        };
        if !v.is_variable() || seen.contains(&&v.name) {
            return None;
        }
        seen.push(&v.name);
    }
    Some(subst)
}

/// `schema` with each variable in `subst` replaced by its value.
pub fn instantiate(schema: &Term, subst: &Subst, supply: &mut NameSupply) -> Term {
    sub_free_map(schema, subst.as_slice(), supply)
}
