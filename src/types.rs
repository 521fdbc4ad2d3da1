//! Simple types and Hindley-Milner style inference over terms.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Display;
use std::rc::Rc;

use thiserror::Error;

use crate::tt::{Literal, Name, NameExt, Term};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeCheckError {
    #[error("type mismatch: {left} vs {right}")]
    Mismatch { left: String, right: String },
    #[error("recursive unification: {var} occurs in {ty}")]
    RecursiveUnification { var: String, ty: String },
    #[error("cannot find type of constant `{0}`")]
    UnknownConstant(Name),
    #[error("no type for `{0}`")]
    Untyped(String),
    #[error("bad definition of `{name}`: {reason}")]
    BadDefinition { name: Name, reason: String },
    #[error("type parse error: {message} at offset {offset}")]
    Parse { offset: usize, message: String },
}

#[derive(Debug, Clone)]
pub enum Type {
    Var(Rc<TypeVar>),
    Const(Name),
    Op(Rc<TypeOp>),
}

/// A type variable. Unification binds it by filling in `instance`.
#[derive(Debug)]
pub struct TypeVar {
    pub name: Option<Name>,
    instance: RefCell<Option<Type>>,
}

#[derive(Debug)]
pub struct TypeOp {
    pub name: Name,
    pub params: Vec<Type>,
}

pub fn mk_type_var(name: Option<Name>) -> Type {
    Type::Var(Rc::new(TypeVar {
        name,
        instance: RefCell::new(None),
    }))
}

pub fn mk_type_const(name: impl Into<Name>) -> Type {
    Type::Const(name.into())
}

pub fn mk_type_op(name: impl Into<Name>, params: Vec<Type>) -> Type {
    Type::Op(Rc::new(TypeOp {
        name: name.into(),
        params,
    }))
}

pub fn mk_fun_type(dom: Type, cod: Type) -> Type {
    mk_type_op("->", vec![dom, cod])
}

pub fn individual() -> Type {
    mk_type_const("i")
}

pub fn boolean() -> Type {
    mk_type_const("o")
}

impl Type {
    /// The type this one currently stands for, following bound variables.
    pub fn resolve(&self) -> Type {
        match self {
            Type::Var(v) => {
                let instance = v.instance.borrow().clone();
                match instance {
                    Some(instance) => {
                        let resolved = instance.resolve();
                        *v.instance.borrow_mut() = Some(resolved.clone());
                        resolved
                    }
                    None => self.clone(),
                }
            }
            _ => self.clone(),
        }
    }

    fn is_var(&self, v: &Rc<TypeVar>) -> bool {
        matches!(self, Type::Var(w) if Rc::ptr_eq(v, w))
    }

    fn occurs(&self, v: &Rc<TypeVar>) -> bool {
        match self.resolve() {
            Type::Var(w) => Rc::ptr_eq(v, &w),
            Type::Const(_) => false,
            Type::Op(op) => op.params.iter().any(|p| p.occurs(v)),
        }
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        match (self.resolve(), other.resolve()) {
            (Type::Var(a), Type::Var(b)) => Rc::ptr_eq(&a, &b),
            (Type::Const(a), Type::Const(b)) => a == b,
            (Type::Op(a), Type::Op(b)) => a.name == b.name && a.params == b.params,
            _ => false,
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.resolve() {
            Type::Var(v) => match &v.name {
                Some(name) => write!(f, "{name}"),
                None => write!(f, "_"),
            },
            Type::Const(name) => write!(f, "{name}"),
            Type::Op(op) => {
                if op.name.as_str() == "->" && op.params.len() == 2 {
                    write!(f, "({} -> {})", op.params[0], op.params[1])
                } else if op.params.is_empty() {
                    write!(f, "{}", op.name)
                } else {
                    write!(f, "({}", op.name)?;
                    for p in &op.params {
                        write!(f, " {p}")?;
                    }
                    write!(f, ")")
                }
            }
        }
    }
}

/// Reads the compact type notation: `i` and `o` are the individual and boolean
/// types, a single capital letter or `t` followed by digits is a type
/// variable, and a sequence `a b c` is the function type `a -> (b -> c)`.
/// Parentheses group.
pub fn parse_type(input: &str) -> Result<Type, TypeCheckError> {
    let mut parser = TypeParser {
        input,
        pos: 0,
        vars: HashMap::new(),
    };
    let ty = parser.sequence()?;
    match parser.next_token() {
        None => Ok(ty),
        Some((offset, token)) => Err(TypeCheckError::Parse {
            offset,
            message: format!("unexpected `{token}`"),
        }),
    }
}

struct TypeParser<'a> {
    input: &'a str,
    pos: usize,
    vars: HashMap<String, Type>,
}

impl<'a> TypeParser<'a> {
    fn next_token(&mut self) -> Option<(usize, &'a str)> {
        let rest = &self.input[self.pos..];
        let trimmed = rest.trim_start();
        let start = self.pos + (rest.len() - trimmed.len());
        let first = trimmed.chars().next()?;
        let len = if first == 't' {
            1 + trimmed[1..].chars().take_while(char::is_ascii_digit).count()
        } else {
            first.len_utf8()
        };
        self.pos = start + len;
        Some((start, &self.input[start..start + len]))
    }

    fn peek_token(&mut self) -> Option<(usize, &'a str)> {
        let pos = self.pos;
        let token = self.next_token();
        self.pos = pos;
        token
    }

    fn sequence(&mut self) -> Result<Type, TypeCheckError> {
        let mut items = vec![];
        while let Some((_, token)) = self.peek_token() {
            if token == ")" {
                break;
            }
            items.push(self.item()?);
        }
        let Some(mut ty) = items.pop() else {
            return Err(TypeCheckError::Parse {
                offset: self.pos,
                message: "empty type".to_owned(),
            });
        };
        while let Some(dom) = items.pop() {
            ty = mk_fun_type(dom, ty);
        }
        Ok(ty)
    }

    fn item(&mut self) -> Result<Type, TypeCheckError> {
        let Some((offset, token)) = self.next_token() else {
            return Err(TypeCheckError::Parse {
                offset: self.pos,
                message: "unexpected end of input".to_owned(),
            });
        };
        match token {
            "(" => {
                let ty = self.sequence()?;
                match self.next_token() {
                    Some((_, ")")) => Ok(ty),
                    _ => Err(TypeCheckError::Parse {
                        offset,
                        message: "unbalanced parenthesis".to_owned(),
                    }),
                }
            }
            "i" => Ok(individual()),
            "o" => Ok(boolean()),
            _ if token.len() > 1 || token.chars().all(|c| c.is_ascii_uppercase()) => Ok(self
                .vars
                .entry(token.to_owned())
                .or_insert_with(|| mk_type_var(Some(Name::intern(token))))
                .clone()),
            _ => Err(TypeCheckError::Parse {
                offset,
                message: format!("unexpected `{token}`"),
            }),
        }
    }
}

/// Types of the constants and defined names a term may mention.
#[derive(Debug, Clone)]
pub struct TypeEnv {
    constants: HashMap<Name, String>,
    definitions: HashMap<Name, Term>,
}

impl Default for TypeEnv {
    fn default() -> Self {
        Self::standard()
    }
}

impl TypeEnv {
    pub fn empty() -> Self {
        TypeEnv {
            constants: HashMap::new(),
            definitions: HashMap::new(),
        }
    }

    /// The primitive constants of the logic and of real arithmetic, together
    /// with the standard connectives as definitions.
    pub fn standard() -> Self {
        let mut env = Self::empty();
        for (name, ty) in [
            ("T", "o"),
            ("F", "o"),
            ("=", "(A A o)"),
            ("the", "((A o) A)"),
            ("R", "(i o)"),
            ("!=", "(A A o)"),
            ("<", "(A A o)"),
            ("<=", "(A A o)"),
            (">", "(A A o)"),
            (">=", "(A A o)"),
            ("+", "(A A A)"),
            ("-", "(A A A)"),
            ("*", "(A A A)"),
            ("/", "(A A A)"),
            ("**", "(A A A)"),
            ("neg", "(A A)"),
            ("recip", "(A A)"),
            ("sqrt", "(A A)"),
            ("abs", "(A A)"),
            ("sin", "(A A)"),
            ("cos", "(A A)"),
            ("tan", "(A A)"),
            ("arcsin", "(A A)"),
            ("arccos", "(A A)"),
            ("arctan", "(A A)"),
            ("ln", "(A A)"),
            ("log10", "(A A)"),
            ("pi", "i"),
            ("ee", "i"),
            ("&&", "(o o o)"),
            ("||", "(o o o)"),
            ("-->", "(o o o)"),
            ("not", "(o o)"),
        ] {
            env.constants.insert(Name::intern(name), ty.to_owned());
        }
        env
    }

    /// Declares a primitive constant with a type written in [parse_type]
    /// notation.
    pub fn declare(&mut self, name: impl Into<Name>, ty: &str) -> Result<(), TypeCheckError> {
        parse_type(ty)?;
        self.constants.insert(name.into(), ty.to_owned());
        Ok(())
    }

    /// Defines constant `name` as `definition`, whose type becomes the type of
    /// the constant. The definition may only mention names already known.
    pub fn define(&mut self, name: impl Into<Name>, definition: Term) -> Result<(), TypeCheckError> {
        let name = name.into();
        let bad = |reason: String| TypeCheckError::BadDefinition {
            name: name.clone(),
            reason,
        };
        if !name.as_str().is_constant_name() {
            return Err(bad("a variable cannot be defined".to_owned()));
        }
        if self.is_known(&name) {
            return Err(bad("already defined".to_owned()));
        }
        if let Some(free) = definition.free_vars().into_iter().next() {
            return Err(bad(format!("free variable `{free}`")));
        }
        Inference::new(self).infer(&definition)?;
        self.definitions.insert(name, definition);
        Ok(())
    }

    pub fn definition(&self, name: &Name) -> Option<&Term> {
        self.definitions.get(name)
    }

    pub fn is_known(&self, name: &Name) -> bool {
        self.constants.contains_key(name) || self.definitions.contains_key(name)
    }
}

/// One run of type inference. Free variables of the term keep a single type
/// for the whole run.
pub struct Inference<'a> {
    env: &'a TypeEnv,
    free: Vec<(Name, Type)>,
    scope: Vec<(Name, Type)>,
    next_var: usize,
}

impl<'a> Inference<'a> {
    pub fn new(env: &'a TypeEnv) -> Self {
        Inference {
            env,
            free: vec![],
            scope: vec![],
            next_var: 1,
        }
    }

    fn fresh_var(&mut self) -> Type {
        let name = Name::intern(&format!("t{}", self.next_var));
        self.next_var += 1;
        mk_type_var(Some(name))
    }

    /// A new instance of the type of constant `name`, its type variables
    /// drawn from this run.
    fn constant_type(&mut self, name: &Name) -> Result<Type, TypeCheckError> {
        let env = self.env;
        if let Some(ty) = env.constants.get(name) {
            let ty = parse_type(ty)?;
            return Ok(self.freshen(&ty, &mut vec![]));
        }
        if let Some(definition) = env.definitions.get(name) {
            // definitions are closed
            let free = std::mem::take(&mut self.free);
            let scope = std::mem::take(&mut self.scope);
            let ty = self.infer_help(definition);
            self.free = free;
            self.scope = scope;
            return ty;
        }
        Err(TypeCheckError::UnknownConstant(name.clone()))
    }

    fn freshen(&mut self, ty: &Type, renamed: &mut Vec<(Rc<TypeVar>, Type)>) -> Type {
        match ty.resolve() {
            Type::Var(v) => {
                if let Some((_, fresh)) = renamed.iter().find(|(w, _)| Rc::ptr_eq(w, &v)) {
                    return fresh.clone();
                }
                let fresh = self.fresh_var();
                renamed.push((v, fresh.clone()));
                fresh
            }
            Type::Op(op) => {
                let params = op.params.iter().map(|p| self.freshen(p, renamed)).collect();
                mk_type_op(op.name.clone(), params)
            }
            resolved => resolved,
        }
    }

    pub fn infer(&mut self, term: &Term) -> Result<Type, TypeCheckError> {
        let ty = self.infer_help(term)?;
        Ok(ty.resolve())
    }

    fn infer_help(&mut self, term: &Term) -> Result<Type, TypeCheckError> {
        match term {
            Term::Var(v) => {
                if let Some((_, ty)) = self.scope.iter().rev().find(|(name, _)| name == &v.name) {
                    return Ok(ty.clone());
                }
                if let Some((_, ty)) = self.free.iter().find(|(name, _)| name == &v.name) {
                    return Ok(ty.clone());
                }
                match &v.literal {
                    Some(Literal::Int(_)) => Ok(individual()),
                    Some(Literal::Str(_)) => Err(TypeCheckError::Untyped(v.name.to_string())),
                    None if v.is_variable() => {
                        let ty = self.fresh_var();
                        self.free.push((v.name.clone(), ty.clone()));
                        Ok(ty)
                    }
                    // each occurrence of a constant gets its own instance
                    None => self.constant_type(&v.name),
                }
            }
            Term::App(inner) => {
                let fun = self.infer_help(&inner.fun)?;
                let arg = self.infer_help(&inner.arg)?;
                let result = self.fresh_var();
                unify(&mk_fun_type(arg, result.clone()), &fun)?;
                Ok(result)
            }
            Term::Abs(inner) => {
                let bound = self.fresh_var();
                self.scope.push((inner.bound.name.clone(), bound.clone()));
                let body = self.infer_help(&inner.body);
                self.scope.pop();
                Ok(mk_fun_type(bound, body?))
            }
        }
    }
}

pub fn unify(t1: &Type, t2: &Type) -> Result<(), TypeCheckError> {
    let a = t1.resolve();
    let b = t2.resolve();
    match (&a, &b) {
        (Type::Var(v), _) => {
            if b.is_var(v) {
                return Ok(());
            }
            if b.occurs(v) {
                return Err(TypeCheckError::RecursiveUnification {
                    var: a.to_string(),
                    ty: b.to_string(),
                });
            }
            log::trace!("bind {a} := {b}");
            *v.instance.borrow_mut() = Some(b.clone());
            Ok(())
        }
        (_, Type::Var(_)) => unify(&b, &a),
        (Type::Const(x), Type::Const(y)) if x == y => Ok(()),
        (Type::Op(x), Type::Op(y)) if x.name == y.name && x.params.len() == y.params.len() => {
            for (p, q) in x.params.iter().zip(&y.params) {
                unify(p, q)?;
            }
            Ok(())
        }
        _ => Err(TypeCheckError::Mismatch {
            left: a.to_string(),
            right: b.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tt::{mk_abs, mk_app, mk_infix, mk_var, TermVar};
    use std::sync::Arc;

    fn var(name: &str) -> Arc<TermVar> {
        Arc::new(TermVar::new(Name::intern(name)))
    }

    fn infer(term: &Term) -> Result<Type, TypeCheckError> {
        let env = TypeEnv::standard();
        Inference::new(&env).infer(term)
    }

    #[test]
    fn type_notation() {
        insta::assert_snapshot!(parse_type("i i o").unwrap(), @"(i -> (i -> o))");
        insta::assert_snapshot!(parse_type("(i o) o").unwrap(), @"((i -> o) -> o)");
        insta::assert_snapshot!(parse_type("A").unwrap(), @"A");
        let ty = parse_type("A A").unwrap();
        let Type::Op(op) = &ty else {
            panic!("function type expected");
        };
        assert_eq!(op.params[0], op.params[1]);
    }

    #[test]
    fn type_notation_errors() {
        assert!(matches!(parse_type(""), Err(TypeCheckError::Parse { .. })));
        assert!(matches!(parse_type("(i o"), Err(TypeCheckError::Parse { offset: 0, .. })));
        assert!(matches!(parse_type("i o)"), Err(TypeCheckError::Parse { offset: 3, .. })));
        assert!(matches!(parse_type("x"), Err(TypeCheckError::Parse { .. })));
    }

    #[test]
    fn equation_of_individuals_is_boolean() {
        let m = mk_infix(mk_var("x"), mk_var("="), mk_var("1"));
        assert_eq!(infer(&m).unwrap(), boolean());
    }

    #[test]
    fn identity_stays_polymorphic() {
        let m = mk_abs(var("x"), mk_var("x"));
        insta::assert_snapshot!(infer(&m).unwrap(), @"(t1 -> t1)");
    }

    #[test]
    fn lambda_has_function_type() {
        let m = mk_abs(var("x"), mk_infix(mk_var("x"), mk_var("+"), mk_var("1")));
        insta::assert_snapshot!(infer(&m).unwrap(), @"(i -> i)");
    }

    #[test]
    fn polymorphic_constants_are_instantiated_per_occurrence() {
        // (T = T) && (1 = 1)
        let m = mk_infix(
            mk_infix(mk_var("T"), mk_var("="), mk_var("T")),
            mk_var("&&"),
            mk_infix(mk_var("1"), mk_var("="), mk_var("1")),
        );
        assert_eq!(infer(&m).unwrap(), boolean());
    }

    #[test]
    fn constant_types_use_fresh_variables() {
        // {p. p (=) (=)}
        let m = mk_abs(
            var("p"),
            mk_app(mk_app(mk_var("p"), mk_var("=")), mk_var("=")),
        );
        insta::assert_snapshot!(
            infer(&m).unwrap(),
            @"(((t2 -> (t2 -> o)) -> ((t4 -> (t4 -> o)) -> t5)) -> t5)"
        );
    }

    #[test]
    fn free_variables_keep_one_type() {
        // x + 1 = x && x
        let m = mk_infix(
            mk_infix(mk_infix(mk_var("x"), mk_var("+"), mk_var("1")), mk_var("="), mk_var("x")),
            mk_var("&&"),
            mk_var("x"),
        );
        assert!(matches!(infer(&m), Err(TypeCheckError::Mismatch { .. })));
    }

    #[test]
    fn self_application_fails_the_occurs_check() {
        let m = mk_abs(var("x"), mk_app(mk_var("x"), mk_var("x")));
        assert!(matches!(
            infer(&m),
            Err(TypeCheckError::RecursiveUnification { .. })
        ));
    }

    #[test]
    fn strings_have_no_type() {
        let m = mk_app(mk_var("f"), mk_var("\"s\""));
        assert_eq!(infer(&m), Err(TypeCheckError::Untyped("\"s\"".to_owned())));
    }

    #[test]
    fn unknown_constants_are_reported() {
        let m = mk_app(mk_var("Frob"), mk_var("x"));
        assert_eq!(infer(&m), Err(TypeCheckError::UnknownConstant(Name::intern("Frob"))));
    }

    #[test]
    fn definitions_take_the_type_of_their_body() {
        let mut env = TypeEnv::standard();
        let square = mk_abs(var("x"), mk_infix(mk_var("x"), mk_var("*"), mk_var("x")));
        env.define("square", square).unwrap();
        let m = mk_app(mk_var("square"), mk_var("3"));
        assert_eq!(Inference::new(&env).infer(&m).unwrap(), individual());

        // a definition shares the variable numbering of the term using it
        env.define("Id", mk_abs(var("x"), mk_var("x"))).unwrap();
        let m = mk_abs(var("y"), mk_var("Id"));
        insta::assert_snapshot!(Inference::new(&env).infer(&m).unwrap(), @"(t1 -> (t2 -> t2))");

        let open = mk_app(mk_var("f"), mk_var("y"));
        assert!(matches!(
            env.define("Open", open),
            Err(TypeCheckError::BadDefinition { .. })
        ));
    }
}
