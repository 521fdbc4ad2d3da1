//! The mutable state of one proof session.

use crate::error::AssertionFailure;
use crate::parse::{parse_term, Operator, ParseCache, ParseError, TokenTable, TokenTableError};
use crate::print::Pretty;
use crate::subst::{decapture, sub_free_map, NameSupply};
use crate::tt::{Name, Term};
use crate::types::{Inference, Type, TypeCheckError, TypeEnv};
use crate::unify::{instantiate, Subst};

#[derive(Debug, Clone)]
pub struct Config {
    /// Number of parse results remembered by input text; 0 disables the cache.
    pub parse_cache_capacity: usize,
    /// Deepest bracket or operator nesting the parser accepts.
    pub max_parse_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            parse_cache_capacity: 1024,
            max_parse_depth: 512,
        }
    }
}

/// A strictly increasing counter starting at 1.
#[derive(Debug, Clone)]
pub struct Counter {
    next: u64,
}

impl Default for Counter {
    fn default() -> Self {
        Counter { next: 1 }
    }
}

impl Counter {
    pub fn next(&mut self) -> u64 {
        let n = self.next;
        self.next += 1;
        n
    }
}

/// An entry of the diagnostics log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub ordinal: Option<u64>,
}

/// Owns everything that changes as a proof is built: the ordinal and fresh
/// name counters, the operator table with its parse cache, the constant types
/// and the diagnostics log. Independent sessions never interfere.
#[derive(Debug)]
pub struct Session {
    config: Config,
    ordinals: Counter,
    names: NameSupply,
    tt: TokenTable,
    type_env: TypeEnv,
    cache: ParseCache,
    diagnostics: Vec<Diagnostic>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Session {
    pub fn new(config: Config) -> Self {
        let cache = ParseCache::new(config.parse_cache_capacity);
        Session {
            config,
            ordinals: Counter::default(),
            names: NameSupply::default(),
            tt: TokenTable::standard().clone(),
            type_env: TypeEnv::standard(),
            cache,
            diagnostics: vec![],
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn token_table(&self) -> &TokenTable {
        &self.tt
    }

    /// Declares a new operator. Cached parses may read differently now, so the
    /// cache is emptied.
    pub fn add_operator(&mut self, op: Operator) -> Result<(), TokenTableError> {
        self.tt.add(op)?;
        self.cache.clear();
        Ok(())
    }

    pub fn type_env(&self) -> &TypeEnv {
        &self.type_env
    }

    pub fn type_env_mut(&mut self) -> &mut TypeEnv {
        &mut self.type_env
    }

    pub fn names(&mut self) -> &mut NameSupply {
        &mut self.names
    }

    pub(crate) fn next_ordinal(&mut self) -> u64 {
        self.ordinals.next()
    }

    /// Parses `input`. Parsing the same text twice yields the very same term.
    pub fn parse(&mut self, input: &str) -> Result<Term, ParseError> {
        if let Some(m) = self.cache.get(input) {
            log::trace!("parse cache hit: {input}");
            return Ok(m.clone());
        }
        let m = parse_term(input, &self.tt, self.config.max_parse_depth)?;
        self.cache.insert(input, m.clone());
        Ok(m)
    }

    pub fn pretty<'a>(&'a self, m: &'a Term) -> Pretty<'a, &'a Term> {
        Pretty::new(&self.tt, m)
    }

    pub fn sub_free(&mut self, target: &Term, replacement: &Term, name: &Name) -> Term {
        self.sub_free_map(target, &[(name.clone(), replacement.clone())])
    }

    pub fn sub_free_map(&mut self, target: &Term, map: &[(Name, Term)]) -> Term {
        let result = sub_free_map(target, map, &mut self.names);
        if log::log_enabled!(log::Level::Debug) && !result.ptr_eq(target) {
            log::debug!("substituted in {}: {}", target, result);
        }
        result
    }

    pub fn decapture(&mut self, target: &Term, replacement: &Term) -> Term {
        decapture(target, replacement, &mut self.names)
    }

    pub fn instantiate(&mut self, schema: &Term, subst: &Subst) -> Term {
        instantiate(schema, subst, &mut self.names)
    }

    pub fn infer_type(&self, m: &Term) -> Result<Type, TypeCheckError> {
        Inference::new(&self.type_env).infer(m)
    }

    /// Fails with an [AssertionFailure] unless `condition` holds. Every failure
    /// is logged and kept in the diagnostics log.
    pub fn assert(
        &mut self,
        condition: bool,
        message: impl FnOnce() -> String,
        ordinal: Option<u64>,
    ) -> Result<(), AssertionFailure> {
        if condition {
            return Ok(());
        }
        let message = message();
        log::error!("assertion failed: {message}");
        self.diagnostics.push(Diagnostic {
            message: message.clone(),
            ordinal,
        });
        Err(AssertionFailure { message, ordinal })
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsing_is_memoized() {
        let mut session = Session::default();
        let a = session.parse("x + 1").unwrap();
        let b = session.parse("x + 1").unwrap();
        assert!(a.ptr_eq(&b));

        let mut uncached = Session::new(Config {
            parse_cache_capacity: 0,
            ..Config::default()
        });
        let a = uncached.parse("x + 1").unwrap();
        let b = uncached.parse("x + 1").unwrap();
        assert!(!a.ptr_eq(&b));
        assert_eq!(a, b);
    }

    #[test]
    fn new_operators_take_effect() {
        let mut session = Session::default();
        let before = session.parse("a mod b").unwrap();
        assert_eq!(before.dump(), "((a mod) b)");
        session.add_operator(Operator::infix("mod", 40)).unwrap();
        let after = session.parse("a mod b").unwrap();
        assert_eq!(after.dump(), "((mod a) b)");
    }

    #[test]
    fn parse_depth_comes_from_the_config() {
        let mut session = Session::new(Config {
            max_parse_depth: 3,
            ..Config::default()
        });
        assert!(session.parse("((x))").is_ok());
        assert!(session.parse("((((x))))").is_err());
    }

    #[test]
    fn sessions_have_independent_name_supplies() {
        let mut a = Session::default();
        let mut b = Session::default();
        let target = a.parse("{y. x + y}").unwrap();
        let y = a.parse("y").unwrap();
        let x = Name::intern("x");
        let ra = a.sub_free(&target, &y, &x);
        let rb = b.sub_free(&target, &y, &x);
        assert_eq!(ra.to_string(), "{y_1. (y + y_1)}");
        assert_eq!(ra, rb);
        let again = a.sub_free(&target, &y, &x);
        assert_eq!(again.to_string(), "{y_2. (y + y_2)}");
    }

    #[test]
    fn failed_assertions_are_recorded() {
        let mut session = Session::default();
        assert!(session.assert(true, || unreachable!(), None).is_ok());
        let err = session
            .assert(false, || "rule precondition".to_owned(), Some(7))
            .unwrap_err();
        assert_eq!(err.to_string(), "assertion failed: rule precondition");
        assert_eq!(
            session.diagnostics(),
            [Diagnostic {
                message: "rule precondition".to_owned(),
                ordinal: Some(7)
            }]
        );
        assert_eq!(session.take_diagnostics().len(), 1);
        assert!(session.diagnostics().is_empty());
    }

    #[test]
    fn type_inference_uses_the_session_environment() {
        let mut session = Session::default();
        let m = session.parse("x + 1 = 2").unwrap();
        insta::assert_snapshot!(session.infer_type(&m).unwrap(), @"o");
    }
}
