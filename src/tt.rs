use std::collections::{BTreeSet, HashMap};
use std::fmt::Display;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, Weak};

use easy_ext::ext;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::bindings::{Bindings, BindingsExt};

#[derive(Debug, Clone, Ord, PartialOrd)]
pub struct Name(Arc<String>);

static NAME_TABLE: Lazy<Mutex<HashMap<String, Weak<String>>>> = Lazy::new(Default::default);

impl Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Name {
    pub fn intern(value: &str) -> Name {
        let mut table = NAME_TABLE.lock().unwrap();
        if let Some(existing) = table.get(value).and_then(|weak| weak.upgrade()) {
            return Name(existing);
        }

        let owned = Arc::new(value.to_owned());
        table.insert(value.to_owned(), Arc::downgrade(&owned));
        Name(owned)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_variable(&self) -> bool {
        self.as_str().is_variable_name()
    }

    pub fn is_constant(&self) -> bool {
        !self.is_variable()
    }
}

impl From<&str> for Name {
    fn from(value: &str) -> Self {
        Name::intern(value)
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state);
    }
}

// A logic variable is a single lower-case letter followed by digits and
// underscores, or anything starting with an underscore. `$` leads the
// internal names minted by normalization.
static VARIABLE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z$][0-9_]*$|^_").unwrap());
static INTEGER_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?[0-9]+$").unwrap());
static STRING_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^"(?:\\.|[^"\\])*"$"#).unwrap());
static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[_$a-zA-Z][_a-zA-Z0-9]*$").unwrap());

#[ext(NameExt)]
pub impl str {
    fn is_variable_name(&self) -> bool {
        VARIABLE_NAME.is_match(self)
    }

    fn is_constant_name(&self) -> bool {
        !self.is_variable_name()
    }

    fn is_integer_literal(&self) -> bool {
        INTEGER_LITERAL.is_match(self)
    }

    fn is_string_literal(&self) -> bool {
        STRING_LITERAL.is_match(self)
    }

    fn is_identifier(&self) -> bool {
        IDENTIFIER.is_match(self)
    }
}

/// Quotes `content` so that it reads back as a string literal.
pub fn unparse_string(content: &str) -> String {
    let mut s = String::with_capacity(content.len() + 2);
    s.push('"');
    for c in content.chars() {
        if c == '"' || c == '\\' {
            s.push('\\');
        }
        s.push(c);
    }
    s.push('"');
    s
}

/// Inverse of [unparse_string]. `text` includes the surrounding quotes.
pub fn parse_string_content(text: &str) -> String {
    let inner = &text[1..text.len() - 1];
    let mut s = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                s.push(next);
            }
        } else {
            s.push(c);
        }
    }
    s
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Literal {
    Int(i64),
    Str(String),
}

impl Literal {
    fn classify(name: &str) -> Option<Literal> {
        if name.is_integer_literal() {
            // out-of-range numerals stay plain names
            name.parse().ok().map(Literal::Int)
        } else if name.is_string_literal() {
            Some(Literal::Str(parse_string_content(name)))
        } else {
            None
        }
    }
}

/// Use syn's convention [https://docs.rs/syn/latest/syn/enum.Expr.html#syntax-tree-enums].
///
/// Nodes are shared. A transformation that leaves a subterm alone returns the
/// very same node, so "unchanged" is tested with [Term::ptr_eq].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Term {
    Var(Arc<TermVar>),
    App(Arc<TermApp>),
    Abs(Arc<TermAbs>),
}

/// Equality and hashing ignore `print_name`: an alias denotes the same
/// variable as the name it stands for.
#[derive(Clone, Debug)]
pub struct TermVar {
    pub name: Name,
    // for printing, e.g. `==` is read as `=` but shown as written
    pub print_name: Option<Name>,
    pub literal: Option<Literal>,
}

impl PartialEq for TermVar {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.literal == other.literal
    }
}

impl Eq for TermVar {}

impl std::hash::Hash for TermVar {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.literal.hash(state);
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TermApp {
    pub fun: Term,
    pub arg: Term,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TermAbs {
    pub bound: Arc<TermVar>,
    pub body: Term,
}

impl TermVar {
    pub fn new(name: Name) -> TermVar {
        let literal = Literal::classify(name.as_str());
        TermVar {
            name,
            print_name: None,
            literal,
        }
    }

    pub fn display_name(&self) -> &Name {
        self.print_name.as_ref().unwrap_or(&self.name)
    }

    pub fn is_variable(&self) -> bool {
        self.name.is_variable()
    }
}

pub fn mk_var(name: impl Into<Name>) -> Term {
    Term::Var(Arc::new(TermVar::new(name.into())))
}

/// A variable read under an alias: it means `name` but prints as `print_name`.
pub fn mk_aliased_var(name: impl Into<Name>, print_name: impl Into<Name>) -> Term {
    let name = name.into();
    let print_name = print_name.into();
    let mut var = TermVar::new(name);
    if print_name != var.name {
        var.print_name = Some(print_name);
    }
    Term::Var(Arc::new(var))
}

pub fn mk_app(fun: Term, arg: Term) -> Term {
    Term::App(Arc::new(TermApp { fun, arg }))
}

pub fn mk_abs(bound: Arc<TermVar>, body: Term) -> Term {
    Term::Abs(Arc::new(TermAbs { bound, body }))
}

/// `((op left) right)`
pub fn mk_infix(left: Term, op: Term, right: Term) -> Term {
    mk_app(mk_app(op, left), right)
}

impl Term {
    #[inline]
    pub fn ptr_eq(&self, other: &Term) -> bool {
        match (self, other) {
            (Term::Var(a), Term::Var(b)) => Arc::ptr_eq(a, b),
            (Term::App(a), Term::App(b)) => Arc::ptr_eq(a, b),
            (Term::Abs(a), Term::Abs(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn as_var(&self) -> Option<&Arc<TermVar>> {
        match self {
            Term::Var(v) => Some(v),
            _ => None,
        }
    }

    /// Canonical text ignoring any display options; usable as a map key.
    pub fn dump(&self) -> String {
        let mut buf = String::new();
        self.dump_help(&mut buf);
        buf
    }

    fn dump_help(&self, buf: &mut String) {
        match self {
            Term::Var(v) => buf.push_str(v.display_name().as_str()),
            Term::App(inner) => {
                buf.push('(');
                inner.fun.dump_help(buf);
                buf.push(' ');
                inner.arg.dump_help(buf);
                buf.push(')');
            }
            Term::Abs(inner) => {
                buf.push('{');
                buf.push_str(inner.bound.display_name().as_str());
                buf.push_str(". ");
                inner.body.dump_help(buf);
                buf.push('}');
            }
        }
    }

    /// Shallow copy: a new top node sharing all children with `self`.
    pub fn dup(&self) -> Term {
        match self {
            Term::Var(v) => Term::Var(Arc::new(TermVar::clone(v))),
            Term::App(inner) => mk_app(inner.fun.clone(), inner.arg.clone()),
            Term::Abs(inner) => mk_abs(inner.bound.clone(), inner.body.clone()),
        }
    }

    /// Deep copy: no node of the result is shared with `self`.
    pub fn copy(&self) -> Term {
        match self {
            Term::Var(_) => self.dup(),
            Term::App(inner) => mk_app(inner.fun.copy(), inner.arg.copy()),
            Term::Abs(inner) => mk_abs(Arc::new(TermVar::clone(&inner.bound)), inner.body.copy()),
        }
    }

    /// t.apply([a, b]) // => ((t a) b)
    pub fn apply(&self, args: impl IntoIterator<Item = Term>) -> Term {
        let mut fun = self.clone();
        for arg in args {
            fun = mk_app(fun, arg);
        }
        fun
    }

    pub fn head(&self) -> &Term {
        let mut m = self;
        while let Term::App(inner) = m {
            m = &inner.fun;
        }
        m
    }

    pub fn args(&self) -> Vec<&Term> {
        let mut m = self;
        let mut args = vec![];
        while let Term::App(inner) = m {
            args.push(&inner.arg);
            m = &inner.fun;
        }
        args.reverse();
        args
    }

    /// Names occurring unbound, constants included.
    pub fn free_names(&self) -> BTreeSet<Name> {
        let mut names = BTreeSet::new();
        self.add_free_names(&mut names, None);
        names
    }

    fn add_free_names(&self, names: &mut BTreeSet<Name>, bindings: Option<&Bindings<()>>) {
        match self {
            Term::Var(v) => {
                if bindings.find(&v.name).is_none() {
                    names.insert(v.name.clone());
                }
            }
            Term::App(inner) => {
                inner.fun.add_free_names(names, bindings);
                inner.arg.add_free_names(names, bindings);
            }
            Term::Abs(inner) => {
                let bindings = Bindings::new(inner.bound.name.clone(), (), bindings);
                inner.body.add_free_names(names, Some(&bindings));
            }
        }
    }

    /// Free names that are logic variables.
    pub fn free_vars(&self) -> BTreeSet<Name> {
        let mut names = self.free_names();
        names.retain(Name::is_variable);
        names
    }

    pub fn has_free_name(&self, name: &Name) -> bool {
        match self {
            Term::Var(v) => &v.name == name,
            Term::App(inner) => inner.fun.has_free_name(name) || inner.arg.has_free_name(name),
            Term::Abs(inner) => &inner.bound.name != name && inner.body.has_free_name(name),
        }
    }

    /// Every name occurring anywhere, binding occurrences included.
    pub fn all_names(&self) -> BTreeSet<Name> {
        let mut names = BTreeSet::new();
        self.add_names(&mut names);
        names
    }

    pub(crate) fn add_names(&self, names: &mut BTreeSet<Name>) {
        match self {
            Term::Var(v) => {
                names.insert(v.name.clone());
            }
            Term::App(inner) => {
                inner.fun.add_names(names);
                inner.arg.add_names(names);
            }
            Term::Abs(inner) => {
                names.insert(inner.bound.name.clone());
                inner.body.add_names(names);
            }
        }
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Term::Var(v) if v.is_variable())
    }

    pub fn is_const(&self) -> bool {
        matches!(self, Term::Var(v) if !v.is_variable())
    }

    pub fn is_named(&self, name: &str) -> bool {
        matches!(self, Term::Var(v) if v.name.as_str() == name)
    }

    pub fn is_numeral(&self) -> bool {
        matches!(self, Term::Var(v) if matches!(v.literal, Some(Literal::Int(_))))
    }

    pub fn num_value(&self) -> Option<i64> {
        match self {
            Term::Var(v) => match v.literal {
                Some(Literal::Int(n)) => Some(n),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn string_value(&self) -> Option<&str> {
        match self {
            Term::Var(v) => match &v.literal {
                Some(Literal::Str(s)) => Some(s),
                _ => None,
            },
            _ => None,
        }
    }

    /// A call `(f a)` with `f` a named function; any name if `name` is [None].
    pub fn is_call1(&self, name: Option<&str>) -> bool {
        match self {
            Term::App(inner) => match &inner.fun {
                Term::Var(f) => name.map_or(true, |name| f.name.as_str() == name),
                _ => false,
            },
            _ => false,
        }
    }

    /// A call `((f a) b)` with `f` a named function; any name if `name` is [None].
    pub fn is_call2(&self, name: Option<&str>) -> bool {
        match self {
            Term::App(inner) => inner.fun.is_call1(name),
            _ => false,
        }
    }

    pub fn is_bin_op(&self) -> bool {
        matches!(self, Term::App(inner) if matches!(inner.fun, Term::App(_)))
    }

    pub fn bin_op(&self) -> Option<&Term> {
        match self {
            Term::App(inner) => match &inner.fun {
                Term::App(fun) => Some(&fun.fun),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn left(&self) -> Option<&Term> {
        match self {
            Term::App(inner) => match &inner.fun {
                Term::App(fun) => Some(&fun.arg),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn right(&self) -> Option<&Term> {
        match self {
            Term::App(inner) if matches!(inner.fun, Term::App(_)) => Some(&inner.arg),
            _ => None,
        }
    }

    /// True iff this is a call with at least `n` arguments.
    pub fn has_args(&self, n: usize) -> bool {
        if n == 0 {
            return true;
        }
        match self {
            Term::App(inner) => inner.fun.has_args(n - 1),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> Term {
        mk_var("x")
    }

    #[test]
    fn variable_names_follow_the_lexical_rule() {
        for name in ["x", "x1", "y_2", "_foo", "_", "$3"] {
            assert!(name.is_variable_name(), "{name}");
        }
        for name in ["xy", "T", "+", "neg", "12", "X1"] {
            assert!(name.is_constant_name(), "{name}");
        }
    }

    #[test]
    fn literals_are_classified_from_the_name() {
        let Term::Var(n) = mk_var("-42") else {
            panic!("variable expected");
        };
        assert_eq!(n.literal, Some(Literal::Int(-42)));
        let Term::Var(s) = mk_var(r#""a\"b""#) else {
            panic!("variable expected");
        };
        assert_eq!(s.literal, Some(Literal::Str("a\"b".to_owned())));
        let Term::Var(v) = x() else {
            panic!("variable expected");
        };
        assert_eq!(v.literal, None);
    }

    #[test]
    fn names_are_interned() {
        assert_eq!(Name::intern("foo"), Name::intern("foo"));
        assert_ne!(Name::intern("foo"), Name::intern("bar"));
    }

    #[test]
    fn dump_uses_print_names() {
        let m = mk_infix(x(), mk_aliased_var("=", "=="), mk_var("y"));
        assert_eq!(m.dump(), "((== x) y)");
        let abs = mk_abs(Arc::new(TermVar::new(Name::intern("x"))), m);
        assert_eq!(abs.dump(), "{x. ((== x) y)}");
    }

    #[test]
    fn dup_is_shallow_and_copy_is_deep() {
        let m = mk_app(mk_var("f"), x());
        let d = m.dup();
        assert!(!d.ptr_eq(&m));
        let (Term::App(a), Term::App(b)) = (&m, &d) else {
            panic!("application expected");
        };
        assert!(a.fun.ptr_eq(&b.fun));

        let c = m.copy();
        let Term::App(c) = &c else {
            panic!("application expected");
        };
        assert!(!a.fun.ptr_eq(&c.fun));
        assert_eq!(m, Term::App(c.clone()));
    }

    #[test]
    fn free_names_skip_bound_occurrences() {
        let bound = Arc::new(TermVar::new(Name::intern("x")));
        let m = mk_app(
            mk_abs(bound, mk_infix(x(), mk_var("+"), mk_var("y"))),
            x(),
        );
        let names: Vec<String> = m.free_names().iter().map(|n| n.to_string()).collect();
        assert_eq!(names, ["+", "x", "y"]);
        let vars: Vec<String> = m.free_vars().iter().map(|n| n.to_string()).collect();
        assert_eq!(vars, ["x", "y"]);
        assert!(m.all_names().contains(&Name::intern("x")));
    }

    #[test]
    fn infix_accessors() {
        let m = mk_infix(x(), mk_var("+"), mk_var("y"));
        assert!(m.is_call2(Some("+")));
        assert!(!m.is_call2(Some("-")));
        assert!(m.has_args(2));
        assert!(!m.has_args(3));
        assert!(m.bin_op().unwrap().is_named("+"));
        assert!(m.left().unwrap().is_named("x"));
        assert!(m.right().unwrap().is_named("y"));
        assert_eq!(m.args().len(), 2);
        assert!(m.head().is_named("+"));
    }

    #[test]
    fn aliases_compare_equal_to_their_name() {
        let aliased = mk_aliased_var("=", "==");
        let plain = mk_var("=");
        assert_eq!(aliased, plain);
        assert_eq!(aliased.dump(), "==");

        let set: std::collections::HashSet<Term> = [aliased, plain].into_iter().collect();
        assert_eq!(set.len(), 1);
        assert_ne!(mk_var("="), mk_var("=="));
    }
}
