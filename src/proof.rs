//! Proof steps: terms carrying the justification that produced them, and the
//! textual encoding of a sequence of steps.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;

use thiserror::Error;

use crate::error::{AssertionFailure, Error};
use crate::parse::{ParseError, TokenTable};
use crate::path::{AddressingError, Path};
use crate::print::Pretty;
use crate::session::Session;
use crate::tt::{unparse_string, Literal, Name, NameExt, Term};

#[derive(Debug, Clone)]
pub enum RuleArg {
    Int(i64),
    Name(Name),
    Str(String),
    Term(Term),
    Step(Step),
    Path(Path),
}

impl From<Term> for RuleArg {
    fn from(m: Term) -> Self {
        RuleArg::Term(m)
    }
}

impl From<Step> for RuleArg {
    fn from(step: Step) -> Self {
        RuleArg::Step(step)
    }
}

impl From<Path> for RuleArg {
    fn from(path: Path) -> Self {
        RuleArg::Path(path)
    }
}

#[derive(Debug, Clone)]
pub struct Justification {
    pub rule_name: Name,
    pub rule_args: Vec<RuleArg>,
    pub rule_deps: Vec<Step>,
    pub ordinal: u64,
    /// The step this one re-justifies, if any.
    pub details: Option<Step>,
}

/// A term as it appears in a proof. Only [Session::justify] attaches a
/// justification; any other step is a bare expression.
#[derive(Debug, Clone)]
pub struct Step(Arc<StepData>);

#[derive(Debug)]
struct StepData {
    term: Term,
    has_hyps: bool,
    justification: Option<Justification>,
}

impl From<Term> for Step {
    fn from(m: Term) -> Self {
        Step::expr(m)
    }
}

impl Step {
    /// A bare expression.
    pub fn expr(term: Term) -> Step {
        Step(Arc::new(StepData {
            term,
            has_hyps: false,
            justification: None,
        }))
    }

    /// A bare expression of the form `hyps --> main` whose left side is
    /// displayed as hypotheses.
    pub fn with_hyps(term: Term) -> Step {
        Step(Arc::new(StepData {
            term,
            has_hyps: true,
            justification: None,
        }))
    }

    pub fn term(&self) -> &Term {
        &self.0.term
    }

    pub fn has_hyps(&self) -> bool {
        self.0.has_hyps
    }

    pub fn justification(&self) -> Option<&Justification> {
        self.0.justification.as_ref()
    }

    pub fn is_proof_step(&self) -> bool {
        self.0.justification.is_some()
    }

    pub fn rule_name(&self) -> Option<&Name> {
        self.justification().map(|j| &j.rule_name)
    }

    pub fn ordinal(&self) -> Option<u64> {
        self.justification().map(|j| j.ordinal)
    }

    pub fn ptr_eq(&self, other: &Step) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// The first justification in the chain of re-justifications ending here.
    pub fn base(&self) -> &Step {
        let mut step = self;
        while let Some(details) = step.justification().and_then(|j| j.details.as_ref()) {
            step = details;
        }
        step
    }

    pub fn hyps(&self) -> Option<&Term> {
        if self.has_hyps() {
            self.term().left()
        } else {
            None
        }
    }

    /// The conclusion proper: the right side when there are hypotheses.
    pub fn main(&self) -> &Term {
        if self.has_hyps() {
            if let Some(main) = self.term().right() {
                return main;
            }
        }
        self.term()
    }

    /// Locates a subterm by path text, where a `main` segment skips the
    /// hypotheses if there are any.
    pub fn locate(&self, path: &str) -> Result<Term, AddressingError> {
        let path = Path::parse_with_hyps(path, self.has_hyps())?;
        self.term().locate(&path)
    }
}

impl Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.term())
    }
}

impl Session {
    /// Records that `target` follows by `rule_name` from `rule_deps`, keeping its
    /// hypotheses flag.
    pub fn justify(
        &mut self,
        target: impl Into<Step>,
        rule_name: &str,
        rule_args: Vec<RuleArg>,
        rule_deps: Vec<Step>,
    ) -> Step {
        let target = target.into();
        let has_hyps = target.has_hyps();
        self.justify_with(target, rule_name, rule_args, rule_deps, has_hyps)
    }

    /// Like [Session::justify] with an explicit hypotheses flag.
    ///
    /// A rule that hands back one of its inputs unchanged justifies nothing:
    /// that input is returned as is.
    pub fn justify_with(
        &mut self,
        target: impl Into<Step>,
        rule_name: &str,
        rule_args: Vec<RuleArg>,
        rule_deps: Vec<Step>,
        has_hyps: bool,
    ) -> Step {
        let target = target.into();
        if let Some(dep) = rule_deps.iter().find(|dep| dep.term().ptr_eq(target.term())) {
            return dep.clone();
        }
        let ordinal = self.next_ordinal();
        let details = target.is_proof_step().then(|| target.clone());
        let step = Step(Arc::new(StepData {
            term: target.term().dup(),
            has_hyps,
            justification: Some(Justification {
                rule_name: Name::intern(rule_name),
                rule_args,
                rule_deps,
                ordinal,
                details,
            }),
        }));
        if log::log_enabled!(log::Level::Debug) {
            log::debug!("#{ordinal} {rule_name}: {}", self.pretty(step.term()));
        }
        step
    }
}

/// An inference rule: turns decoded arguments into a justified step.
pub trait Rule {
    fn apply(&self, session: &mut Session, args: &[RuleArg]) -> Result<Step, Error>;
}

impl<F> Rule for F
where
    F: Fn(&mut Session, &[RuleArg]) -> Result<Step, Error>,
{
    fn apply(&self, session: &mut Session, args: &[RuleArg]) -> Result<Step, Error> {
        self(session, args)
    }
}

/// Rules by name, for replaying encoded proofs.
#[derive(Default)]
pub struct RuleCatalogue {
    rules: HashMap<Name, Box<dyn Rule>>,
}

impl RuleCatalogue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, rule: impl Rule + 'static) {
        self.rules.insert(Name::intern(name), Box::new(rule));
    }

    pub fn register(
        &mut self,
        name: &str,
        rule: impl Fn(&mut Session, &[RuleArg]) -> Result<Step, Error> + 'static,
    ) {
        self.add(name, rule);
    }

    pub fn get(&self, name: &Name) -> Option<&dyn Rule> {
        self.rules.get(name).map(|rule| rule.as_ref())
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Addressing(#[from] AddressingError),
    #[error("malformed step encoding: {0}")]
    Malformed(String),
    #[error("step numbered {found} where {expected} was expected")]
    StepNumber { expected: usize, found: String },
    #[error("reference to undefined step {0}")]
    BadStepReference(String),
    #[error("unknown rule `{0}`")]
    UnknownRule(Name),
    #[error("rule `{rule}` failed replaying step {index}")]
    RuleFailed {
        rule: Name,
        index: usize,
        #[source]
        source: Box<Error>,
    },
}

fn encode_term(m: &Term, tt: &TokenTable, buf: &mut String) {
    let needs_parens = match m {
        Term::Var(v) => tt.is_operator(v) || matches!(m.num_value(), Some(n) if n < 0),
        _ => false,
    };
    if needs_parens {
        buf.push_str(&format!("({})", Pretty::new(tt, m)));
    } else {
        buf.push_str(&Pretty::new(tt, m).to_string());
    }
}

fn encode_arg(
    arg: &RuleArg,
    steps: &[Step],
    tt: &TokenTable,
    buf: &mut String,
) -> Result<(), AssertionFailure> {
    let step_index = |m: &Term| steps.iter().position(|step| step.term().ptr_eq(m));
    match arg {
        RuleArg::Int(n) if *n < 0 => buf.push_str(&format!("({n})")),
        RuleArg::Int(n) => buf.push_str(&n.to_string()),
        RuleArg::Name(name) => {
            if !name.as_str().is_identifier() {
                return Err(AssertionFailure {
                    message: format!("rule argument `{name}` is not an identifier"),
                    ordinal: None,
                });
            }
            buf.push_str(name.as_str());
        }
        RuleArg::Str(s) => buf.push_str(&unparse_string(s)),
        RuleArg::Path(path) => {
            buf.push_str("(path ");
            buf.push_str(&unparse_string(&path.to_string()));
            buf.push(')');
        }
        RuleArg::Step(step) => match steps.iter().position(|s| s.ptr_eq(step)) {
            Some(k) => buf.push_str(&format!("(s {})", k + 1)),
            None => {
                buf.push_str("(t ");
                encode_term(step.term(), tt, buf);
                buf.push(')');
            }
        },
        RuleArg::Term(m) => match step_index(m) {
            Some(k) => buf.push_str(&format!("(s {})", k + 1)),
            None => {
                buf.push_str("(t ");
                encode_term(m, tt, buf);
                buf.push(')');
            }
        },
    }
    Ok(())
}

/// Writes `steps` as `(steps (1 rule arg...) (2 ...))`. Every step must be a
/// proof step.
pub fn encode_steps(steps: &[Step], tt: &TokenTable) -> Result<String, AssertionFailure> {
    let mut buf = String::from("(steps");
    for (i, step) in steps.iter().enumerate() {
        let Some(justification) = step.justification() else {
            return Err(AssertionFailure {
                message: format!("step {} is not justified: {}", i + 1, step),
                ordinal: None,
            });
        };
        buf.push_str(&format!(" ({} {}", i + 1, justification.rule_name));
        for arg in &justification.rule_args {
            buf.push(' ');
            encode_arg(arg, steps, tt, &mut buf)?;
        }
        buf.push(')');
    }
    buf.push(')');
    Ok(buf)
}

fn decode_arg(arg: &Term, steps: &[Step]) -> Result<RuleArg, DecodeError> {
    match arg {
        Term::Var(v) => match &v.literal {
            Some(Literal::Int(n)) => Ok(RuleArg::Int(*n)),
            Some(Literal::Str(s)) => Ok(RuleArg::Str(s.clone())),
            None if v.name.as_str().is_identifier() => Ok(RuleArg::Name(v.name.clone())),
            None => Err(DecodeError::Malformed(arg.to_string())),
        },
        Term::App(_) => {
            let head = arg.head();
            match arg.args().as_slice() {
                [k] if head.is_named("s") => {
                    let step = k
                        .num_value()
                        .and_then(|k| usize::try_from(k).ok())
                        .and_then(|k| k.checked_sub(1))
                        .and_then(|k| steps.get(k));
                    match step {
                        Some(step) => Ok(RuleArg::Step(step.clone())),
                        None => Err(DecodeError::BadStepReference(k.to_string())),
                    }
                }
                [m] if head.is_named("t") => Ok(RuleArg::Term((*m).clone())),
                [p] if head.is_named("path") => match p.string_value() {
                    Some(text) => Ok(RuleArg::Path(text.parse()?)),
                    None => Err(DecodeError::Malformed(arg.to_string())),
                },
                _ => Err(DecodeError::Malformed(arg.to_string())),
            }
        }
        Term::Abs(_) => Err(DecodeError::Malformed(arg.to_string())),
    }
}

/// Replays an encoded proof, applying each step's rule from `rules` in order.
pub fn decode_steps(
    session: &mut Session,
    rules: &RuleCatalogue,
    input: &str,
) -> Result<Vec<Step>, DecodeError> {
    let encoded = session.parse(input)?;
    if !encoded.head().is_named("steps") {
        return Err(DecodeError::Malformed("expected (steps ...)".to_owned()));
    }
    let mut steps: Vec<Step> = vec![];
    for (i, entry) in encoded.args().into_iter().enumerate() {
        let index = i + 1;
        if entry.head().num_value() != Some(index as i64) {
            return Err(DecodeError::StepNumber {
                expected: index,
                found: entry.head().to_string(),
            });
        }
        let args = entry.args();
        let Some((Term::Var(rule_name), rule_args)) = args.split_first() else {
            return Err(DecodeError::Malformed(format!("step {index} names no rule")));
        };
        let rule_name = rule_name.name.clone();
        let rule = rules
            .get(&rule_name)
            .ok_or_else(|| DecodeError::UnknownRule(rule_name.clone()))?;
        let rule_args = rule_args
            .iter()
            .map(|arg| decode_arg(arg, &steps))
            .collect::<Result<Vec<_>, _>>()?;
        log::debug!("replaying step {index}: {rule_name}");
        let step = rule
            .apply(session, &rule_args)
            .map_err(|source| DecodeError::RuleFailed {
                rule: rule_name.clone(),
                index,
                source: Box::new(source),
            })?;
        steps.push(step);
    }
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalogue() -> RuleCatalogue {
        let mut rules = RuleCatalogue::new();
        rules.register("rule_a", |session: &mut Session, _args: &[RuleArg]| {
            let t = session.parse("T")?;
            Ok(session.justify(t, "rule_a", vec![], vec![]))
        });
        rules.register("rule_b", |session: &mut Session, args: &[RuleArg]| {
            let dep = match args {
                [RuleArg::Step(dep)] => dep.clone(),
                _ => {
                    session.assert(false, || "rule_b takes one step".to_owned(), None)?;
                    unreachable!()
                }
            };
            let m = session.parse("T = T")?;
            Ok(session.justify(m, "rule_b", args.to_vec(), vec![dep]))
        });
        // echoes its arguments
        rules.register("echo", |session: &mut Session, args: &[RuleArg]| {
            let t = session.parse("T")?;
            Ok(session.justify(t, "echo", args.to_vec(), vec![]))
        });
        rules
    }

    #[test]
    fn justification_assigns_increasing_ordinals() {
        let mut session = Session::default();
        let m = session.parse("x = x").unwrap();
        let a = session.justify(m.clone(), "r", vec![], vec![]);
        let b = session.justify(m.clone(), "r", vec![], vec![]);
        assert!(a.ordinal().unwrap() < b.ordinal().unwrap());
        assert!(a.is_proof_step());
        assert!(!Step::expr(m.clone()).is_proof_step());
        // a shallow duplicate of the term
        assert!(!a.term().ptr_eq(&m));
        assert_eq!(a.term(), &m);
    }

    #[test]
    fn rejustification_chains_back_to_the_base() {
        let mut session = Session::default();
        let m = session.parse("p --> q").unwrap();
        let first = session.justify(Step::with_hyps(m), "assume", vec![], vec![]);
        let second = session.justify(first.clone(), "rename", vec![], vec![]);
        let third = session.justify(second.clone(), "rename", vec![], vec![]);
        assert!(third.base().ptr_eq(&first));
        assert!(third
            .justification()
            .and_then(|j| j.details.as_ref())
            .is_some_and(|d| d.ptr_eq(&second)));
        assert!(third.has_hyps());

        let plain = session.justify_with(third, "display", vec![], vec![], false);
        assert!(!plain.has_hyps());
    }

    #[test]
    fn no_op_rules_return_their_dependency() {
        let mut session = Session::default();
        let m = session.parse("x = x").unwrap();
        let a = session.justify(m, "r", vec![], vec![]);
        let same = session.justify(a.clone(), "noop", vec![], vec![a.clone()]);
        assert!(same.ptr_eq(&a));
        assert_eq!(same.rule_name().unwrap().as_str(), "r");
    }

    #[test]
    fn main_part_skips_hypotheses() {
        let mut session = Session::default();
        let m = session.parse("h --> x + 1 = y").unwrap();
        let step = Step::with_hyps(m.clone());
        assert_eq!(step.main().to_string(), "((x + 1) = y)");
        assert!(step.hyps().unwrap().is_named("h"));
        assert!(step.locate("/main/left/right").unwrap().is_named("1"));

        let plain = Step::expr(m);
        assert_eq!(plain.main().to_string(), "(h --> ((x + 1) = y))");
        assert!(plain.locate("/main/left").unwrap().is_named("h"));
    }

    #[test]
    fn encoding_refers_to_earlier_steps() {
        let mut session = Session::default();
        let t = session.parse("T").unwrap();
        let step1 = session.justify(t, "rule_a", vec![], vec![]);
        let m = session.parse("T = T").unwrap();
        let step2 = session.justify(
            m,
            "rule_b",
            vec![RuleArg::Term(step1.term().clone())],
            vec![step1.clone()],
        );
        let encoded = encode_steps(&[step1, step2], session.token_table()).unwrap();
        assert_eq!(encoded, "(steps (1 rule_a) (2 rule_b (s 1)))");
    }

    #[test]
    fn decoding_replays_the_rules() {
        let mut session = Session::default();
        let rules = catalogue();
        let steps = decode_steps(&mut session, &rules, "(steps (1 rule_a) (2 rule_b (s 1)))").unwrap();
        assert_eq!(steps.len(), 2);
        let deps = &steps[1].justification().unwrap().rule_deps;
        assert_eq!(deps.len(), 1);
        assert!(deps[0].ptr_eq(&steps[0]));
        assert!(steps[0].ordinal() < steps[1].ordinal());

        let again = encode_steps(&steps, session.token_table()).unwrap();
        assert_eq!(again, "(steps (1 rule_a) (2 rule_b (s 1)))");
    }

    #[test]
    fn every_kind_of_argument_survives_a_round_trip() {
        let mut session = Session::default();
        let rules = catalogue();
        let m = session.parse("{x. x + 1} (-2)").unwrap();
        let op = session.parse("(+)").unwrap();
        let t = session.parse("T").unwrap();
        let step = session.justify(
            t,
            "echo",
            vec![
                RuleArg::Int(3),
                RuleArg::Int(-4),
                RuleArg::Name(Name::intern("foo")),
                RuleArg::Str("a \"quoted\" text".to_owned()),
                RuleArg::Term(m.clone()),
                RuleArg::Term(op.clone()),
                RuleArg::Path("/left/body".parse().unwrap()),
            ],
            vec![],
        );
        let encoded = encode_steps(&[step], session.token_table()).unwrap();
        insta::assert_snapshot!(encoded, @r#"(steps (1 echo 3 (-4) foo "a \"quoted\" text" (t ({x. (x + 1)} (-2))) (t (+)) (path "/fn/arg/body")))"#);

        let steps = decode_steps(&mut session, &rules, &encoded).unwrap();
        let args = &steps[0].justification().unwrap().rule_args;
        assert!(matches!(args[0], RuleArg::Int(3)));
        assert!(matches!(args[1], RuleArg::Int(-4)));
        assert!(matches!(&args[2], RuleArg::Name(name) if name.as_str() == "foo"));
        assert!(matches!(&args[3], RuleArg::Str(s) if s == "a \"quoted\" text"));
        assert!(matches!(&args[4], RuleArg::Term(t) if t.matches(&m)));
        assert!(matches!(&args[5], RuleArg::Term(t) if t.matches(&op)));
        assert!(matches!(&args[6], RuleArg::Path(p) if p.to_string() == "/fn/arg/body"));
        assert_eq!(encode_steps(&steps, session.token_table()).unwrap(), encoded);
    }

    #[test]
    fn decoding_errors() {
        let mut session = Session::default();
        let rules = catalogue();
        assert!(matches!(
            decode_steps(&mut session, &rules, "(steps (2 rule_a))"),
            Err(DecodeError::StepNumber { expected: 1, .. })
        ));
        assert!(matches!(
            decode_steps(&mut session, &rules, "(steps (1 frobnicate))"),
            Err(DecodeError::UnknownRule(name)) if name.as_str() == "frobnicate"
        ));
        assert!(matches!(
            decode_steps(&mut session, &rules, "(steps (1 rule_b (s 1)))"),
            Err(DecodeError::BadStepReference(_))
        ));
        assert!(matches!(
            decode_steps(&mut session, &rules, "(steps (1 rule_b 5))"),
            Err(DecodeError::RuleFailed { index: 1, .. })
        ));
        assert_eq!(session.diagnostics().len(), 1);
        assert!(matches!(
            decode_steps(&mut session, &rules, "(proof (1 rule_a))"),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            decode_steps(&mut session, &rules, "(steps (1 rule_a)"),
            Err(DecodeError::Parse(_))
        ));
        assert!(decode_steps(&mut session, &rules, "(steps)").unwrap().is_empty());
    }

    #[test]
    fn bare_expressions_cannot_be_encoded() {
        let mut session = Session::default();
        let t = session.parse("T").unwrap();
        assert!(encode_steps(&[Step::expr(t)], session.token_table()).is_err());
    }
}
