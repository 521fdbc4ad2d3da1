//! Capture-avoiding substitution and the renamings that support it.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::bindings::{Bindings, BindingsExt};
use crate::tt::{mk_abs, mk_app, Name, Term, TermVar};

static NUMBERED_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"_[0-9]+$").unwrap());

/// Source of fresh names. The counter only moves forward, so two names it
/// hands out are never equal.
#[derive(Debug, Clone)]
pub struct NameSupply {
    next: u64,
}

impl Default for NameSupply {
    fn default() -> Self {
        NameSupply { next: 1 }
    }
}

impl NameSupply {
    /// A name based on `name` that is not in `existing`. The new name is added to
    /// `existing` so later calls with the same set avoid it too.
    pub fn fresh(&mut self, name: &Name, existing: &mut BTreeSet<Name>) -> Name {
        let base = NUMBERED_SUFFIX.replace(name.as_str(), "");
        loop {
            let candidate = Name::intern(&format!("{base}_{}", self.next));
            self.next += 1;
            if !existing.contains(&candidate) {
                existing.insert(candidate.clone());
                return candidate;
            }
        }
    }
}

/// `target` with every free occurrence of `name` replaced by `replacement`.
pub fn sub_free(target: &Term, replacement: &Term, name: &Name, supply: &mut NameSupply) -> Term {
    sub_free_map(target, &[(name.clone(), replacement.clone())], supply)
}

/// Simultaneous substitution of several names.
///
/// Bound variables are renamed where a replacement would otherwise be
/// captured. Subterms the substitution does not touch are returned as is, and
/// a target with nothing to substitute comes back identical to itself.
pub fn sub_free_map(target: &Term, map: &[(Name, Term)], supply: &mut NameSupply) -> Term {
    let map: Vec<&(Name, Term)> = map
        .iter()
        .filter(|(name, replacement)| !matches!(replacement, Term::Var(v) if &v.name == name))
        .collect();
    if map.is_empty() {
        return target.clone();
    }

    // Each replacement is inserted as a single fresh node so that the renaming
    // pass can tell inserted material apart from the target's own subterms.
    let copies: Vec<(Name, Term)> = map
        .iter()
        .map(|(name, replacement)| (name.clone(), replacement.dup()))
        .collect();
    let mut free_names = BTreeSet::new();
    let mut all_names = target.all_names();
    for (_, replacement) in &map {
        free_names.extend(replacement.free_names());
        replacement.add_names(&mut all_names);
    }

    let mut sub = SubFree {
        copies: &copies,
        free_names: &free_names,
        all_names: &mut all_names,
        supply,
    };
    let result = sub.sub(target, &copies);

    let originals: Vec<&Term> = map.iter().map(|(_, replacement)| replacement).collect();
    for ((_, copy), original) in copies.iter().zip(&originals) {
        if result.ptr_eq(copy) {
            return (*original).clone();
        }
    }
    smash(&result, &copies, &originals)
}

struct SubFree<'a> {
    copies: &'a [(Name, Term)],
    free_names: &'a BTreeSet<Name>,
    all_names: &'a mut BTreeSet<Name>,
    supply: &'a mut NameSupply,
}

impl SubFree<'_> {
    fn sub(&mut self, m: &Term, active: &[(Name, Term)]) -> Term {
        match m {
            Term::Var(v) => match active.iter().find(|(name, _)| name == &v.name) {
                Some((_, copy)) => copy.clone(),
                None => m.clone(),
            },
            Term::App(inner) => {
                let fun = self.sub(&inner.fun, active);
                let arg = self.sub(&inner.arg, active);
                if fun.ptr_eq(&inner.fun) && arg.ptr_eq(&inner.arg) {
                    return m.clone();
                }
                mk_app(fun, arg)
            }
            Term::Abs(inner) => {
                let bound = &inner.bound.name;
                let active: Cow<[(Name, Term)]> = if active.iter().any(|(name, _)| name == bound) {
                    Cow::Owned(
                        active
                            .iter()
                            .filter(|(name, _)| name != bound)
                            .cloned()
                            .collect(),
                    )
                } else {
                    Cow::Borrowed(active)
                };
                if active.is_empty() {
                    return m.clone();
                }
                let body = self.sub(&inner.body, &active);
                if body.ptr_eq(&inner.body) {
                    return m.clone();
                }
                if self.free_names.contains(bound) {
                    let fresh = self.supply.fresh(bound, self.all_names);
                    let var = Arc::new(TermVar::new(fresh));
                    let body = rename_free(&body, bound, &var, self.copies);
                    return mk_abs(var, body);
                }
                mk_abs(inner.bound.clone(), body)
            }
        }
    }
}

// Renames free occurrences of `from` to `to`, leaving inserted replacement
// copies alone.
fn rename_free(m: &Term, from: &Name, to: &Arc<TermVar>, copies: &[(Name, Term)]) -> Term {
    if copies.iter().any(|(_, copy)| copy.ptr_eq(m)) {
        return m.clone();
    }
    match m {
        Term::Var(v) => {
            if &v.name == from {
                Term::Var(to.clone())
            } else {
                m.clone()
            }
        }
        Term::App(inner) => {
            let fun = rename_free(&inner.fun, from, to, copies);
            let arg = rename_free(&inner.arg, from, to, copies);
            if fun.ptr_eq(&inner.fun) && arg.ptr_eq(&inner.arg) {
                return m.clone();
            }
            mk_app(fun, arg)
        }
        Term::Abs(inner) => {
            if &inner.bound.name == from {
                return m.clone();
            }
            let body = rename_free(&inner.body, from, to, copies);
            if body.ptr_eq(&inner.body) {
                return m.clone();
            }
            mk_abs(inner.bound.clone(), body)
        }
    }
}

// Puts the caller's replacement terms back in place of their copies.
fn smash(m: &Term, copies: &[(Name, Term)], originals: &[&Term]) -> Term {
    let restore = |child: &Term| -> Term {
        for ((_, copy), original) in copies.iter().zip(originals) {
            if child.ptr_eq(copy) {
                return (*original).clone();
            }
        }
        smash(child, copies, originals)
    };
    match m {
        Term::Var(_) => m.clone(),
        Term::App(inner) => {
            let fun = restore(&inner.fun);
            let arg = restore(&inner.arg);
            if fun.ptr_eq(&inner.fun) && arg.ptr_eq(&inner.arg) {
                return m.clone();
            }
            mk_app(fun, arg)
        }
        Term::Abs(inner) => {
            let body = restore(&inner.body);
            if body.ptr_eq(&inner.body) {
                return m.clone();
            }
            mk_abs(inner.bound.clone(), body)
        }
    }
}

/// Renames every bound variable of `target` whose name is free in
/// `replacement`, so that the replacement can later be inserted anywhere in
/// `target` without capture.
pub fn decapture(target: &Term, replacement: &Term, supply: &mut NameSupply) -> Term {
    let free_names = replacement.free_names();
    let mut all_names = target.all_names();
    replacement.add_names(&mut all_names);
    decapture_help(target, &free_names, &mut all_names, supply, None)
}

fn decapture_help(
    m: &Term,
    free_names: &BTreeSet<Name>,
    all_names: &mut BTreeSet<Name>,
    supply: &mut NameSupply,
    bindings: Option<&Bindings<Arc<TermVar>>>,
) -> Term {
    match m {
        Term::Var(v) => match bindings.get(&v.name) {
            Some(renamed) => Term::Var(renamed.clone()),
            None => m.clone(),
        },
        Term::App(inner) => {
            let fun = decapture_help(&inner.fun, free_names, all_names, supply, bindings);
            let arg = decapture_help(&inner.arg, free_names, all_names, supply, bindings);
            if fun.ptr_eq(&inner.fun) && arg.ptr_eq(&inner.arg) {
                return m.clone();
            }
            mk_app(fun, arg)
        }
        Term::Abs(inner) => {
            let old = &inner.bound.name;
            if free_names.contains(old) {
                let var = Arc::new(TermVar::new(supply.fresh(old, all_names)));
                let bindings = Bindings::new(old.clone(), var.clone(), bindings);
                let body = decapture_help(&inner.body, free_names, all_names, supply, Some(&bindings));
                return mk_abs(var, body);
            }
            // an unrenamed binder shadows any outer renaming of the same name
            let shadowed;
            let bindings = if bindings.find(old).is_some() {
                shadowed = Bindings::new(old.clone(), inner.bound.clone(), bindings);
                Some(&shadowed)
            } else {
                bindings
            };
            let body = decapture_help(&inner.body, free_names, all_names, supply, bindings);
            if body.ptr_eq(&inner.body) {
                return m.clone();
            }
            mk_abs(inner.bound.clone(), body)
        }
    }
}

static NORMALIZED_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\$([0-9]+)$").unwrap());

/// `target` with bound variables renamed `$1`, `$2`, ... in pre-order, so that
/// alpha-equivalent terms normalize to equal terms.
///
/// Numbering starts after the largest free `$k` of `target`, so no bound
/// variable is renamed onto a free one.
pub fn normalized(target: &Term) -> Term {
    let mut counter = target
        .free_names()
        .iter()
        .filter_map(|name| NORMALIZED_NAME.captures(name.as_str())?[1].parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    normalized_help(target, &mut counter, None)
}

fn normalized_help(
    m: &Term,
    counter: &mut u64,
    bindings: Option<&Bindings<Arc<TermVar>>>,
) -> Term {
    match m {
        Term::Var(v) => match bindings.get(&v.name) {
            Some(renamed) => Term::Var(renamed.clone()),
            None => m.clone(),
        },
        Term::App(inner) => mk_app(
            normalized_help(&inner.fun, counter, bindings),
            normalized_help(&inner.arg, counter, bindings),
        ),
        Term::Abs(inner) => {
            *counter += 1;
            let var = Arc::new(TermVar::new(Name::intern(&format!("${counter}"))));
            let bindings = Bindings::new(inner.bound.name.clone(), var.clone(), bindings);
            let body = normalized_help(&inner.body, counter, Some(&bindings));
            mk_abs(var, body)
        }
    }
}
