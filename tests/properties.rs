use prooftoys::lex::tokenize;
use prooftoys::subst::normalized;
use prooftoys::types::{boolean, individual, mk_fun_type, parse_type, TypeCheckError};
use prooftoys::unify::{instantiate, match_schema};
use prooftoys::{Name, Session, Term};

#[ctor::ctor]
fn init_logger() {
    prooftoys::logger::init(log::LevelFilter::Debug);
}

const CORPUS: &[&str] = &[
    "x",
    "x + y",
    "f (g x) (-3)",
    "{x. {y. x = y}} a b",
    "{x. f x} = {y. f y}",
    "not (p || q) && r --> s",
    "(+) (f x)",
    "(x *) y",
    "- x + 1 <= 2 ** n",
    r#"print "a \"quoted\" string" 42"#,
    "{x. {x. x + y}} (y z)",
    "the {n. n > 0 && n < 3}",
];

fn subterms(m: &Term, out: &mut Vec<Term>) {
    out.push(m.clone());
    match m {
        Term::Var(_) => {}
        Term::App(inner) => {
            subterms(&inner.fun, out);
            subterms(&inner.arg, out);
        }
        Term::Abs(inner) => subterms(&inner.body, out),
    }
}

#[test]
fn printed_terms_parse_back_alpha_equivalent() {
    let mut session = Session::default();
    for input in CORPUS {
        let m = session.parse(input).unwrap();
        let printed = session.pretty(&m).to_string();
        let back = session.parse(&printed).unwrap();
        assert_eq!(normalized(&back), normalized(&m), "{input} printed as {printed}");
    }
}

#[test]
fn normalization_ignores_only_bound_names() {
    let mut session = Session::default();
    let same = [
        ("{x. f x}", "{y. f y}"),
        ("{x. {y. x y}}", "{a. {b. a b}}"),
        ("g {x. x} {x. x}", "g {p. p} {q. q}"),
        ("{x. a == x}", "{y. a = y}"),
    ];
    for (a, b) in same {
        let a = session.parse(a).unwrap();
        let b = session.parse(b).unwrap();
        assert_eq!(normalized(&a), normalized(&b));
    }
    let different = [
        ("{x. f x}", "{x. g x}"),
        ("{x. {y. x y}}", "{x. {y. y x}}"),
        ("{x. y}", "{x. z}"),
        ("{x. x $1}", "{y. y y}"),
    ];
    for (a, b) in different {
        let a = session.parse(a).unwrap();
        let b = session.parse(b).unwrap();
        assert_ne!(normalized(&a), normalized(&b));
    }
}

#[test]
fn substitution_never_captures() {
    let mut session = Session::default();
    let cases = [
        ("{y. x + y}", "y"),
        ("{y. {z. x y z}}", "f y z"),
        ("{x. x} x", "{w. x}"),
        ("{y. {y_1. x}}", "y + y_1"),
    ];
    let x = Name::intern("x");
    for (target, replacement) in cases {
        let target = session.parse(target).unwrap();
        let replacement = session.parse(replacement).unwrap();
        let result = session.sub_free(&target, &replacement, &x);
        // each free name of the replacement is still free in the result
        for name in replacement.free_vars() {
            assert!(result.has_free_name(&name), "{result} captured {name}");
        }
        assert!(!result.has_free_name(&x) || replacement.has_free_name(&x));
    }
}

#[test]
fn substituting_an_absent_name_returns_the_target() {
    let mut session = Session::default();
    let replacement = session.parse("q r").unwrap();
    for input in CORPUS {
        let target = session.parse(input).unwrap();
        let result = session.sub_free(&target, &replacement, &Name::intern("absent"));
        assert!(result.ptr_eq(&target), "{input}");
    }
}

#[test]
fn instantiating_a_schema_match_reproduces_the_target() {
    let mut session = Session::default();
    let cases = [
        ("p --> q", "a = b --> not c"),
        ("x + x", "f 1 + f 1"),
        ("{y. f y} = g", "{z. h z} = k"),
        ("a && b", "T && (F || T)"),
    ];
    for (schema, target) in cases {
        let schema = session.parse(schema).unwrap();
        let target = session.parse(target).unwrap();
        let subst = match_schema(&schema, &target).unwrap();
        let result = instantiate(&schema, &subst, session.names());
        assert!(result.matches(&target), "{result} vs {target}");
    }
    let schema = session.parse("x + x").unwrap();
    let target = session.parse("1 + 2").unwrap();
    assert!(match_schema(&schema, &target).is_none());
}

#[test]
fn every_subterm_is_found_at_its_path() {
    let mut session = Session::default();
    for input in CORPUS {
        let m = session.parse(input).unwrap();
        let mut all = vec![];
        subterms(&m, &mut all);
        for sub in all {
            let path = m.path_to(|candidate| candidate.ptr_eq(&sub)).unwrap();
            let found = m.locate(&path).unwrap();
            assert!(found.ptr_eq(&sub), "{input} at {path}");
        }
    }
}

#[test]
fn self_application_has_no_type() {
    let mut session = Session::default();
    let m = session.parse("{x. x x}").unwrap();
    assert!(matches!(
        session.infer_type(&m),
        Err(TypeCheckError::RecursiveUnification { .. })
    ));
}

#[test]
fn tokenizing_a_type() {
    assert_eq!(tokenize("(o i)").unwrap(), ["(", "o", "i", ")"]);
}

#[test]
fn parsing_an_infix_call() {
    let mut session = Session::default();
    let m = session.parse("x + y").unwrap();
    assert_eq!(m.dump(), "((+ x) y)");
    assert!(m.head().is_named("+"));
    assert_eq!(m.to_string(), "(x + y)");
}

#[test]
fn reading_a_curried_type() {
    let expected = mk_fun_type(individual(), mk_fun_type(individual(), boolean()));
    assert_eq!(parse_type("i i o").unwrap(), expected);
}

#[test]
fn decapture_picks_an_unused_name() {
    let mut session = Session::default();
    let target = session.parse("{x. f x}").unwrap();
    let replacement = session.parse("g x").unwrap();
    let result = session.decapture(&target, &replacement);
    let Term::Abs(abs) = &result else {
        panic!("not an abstraction: {result}");
    };
    let name = &abs.bound.name;
    assert_ne!(name.as_str(), "x");
    assert!(!target.all_names().contains(name));
    assert!(!replacement.all_names().contains(name));
    assert_eq!(normalized(&result), normalized(&target));
}
