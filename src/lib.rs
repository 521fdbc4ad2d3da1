pub mod bindings;
pub mod error;
pub mod lex;
pub mod locate;
pub mod logger;
pub mod parse;
pub mod path;
pub mod print;
pub mod proof;
pub mod session;
pub mod subst;
pub mod tt;
pub mod types;
pub mod unify;

use anyhow::Context;

pub use error::{AssertionFailure, Error};
pub use path::{Path, Segment};
pub use proof::{decode_steps, encode_steps, Rule, RuleArg, RuleCatalogue, Step};
pub use session::{Config, Session};
pub use tt::{Name, Term};

/// Reads one term per non-empty line, skipping `#` comment lines, and returns
/// each term printed with its inferred type.
pub fn process(input: &str) -> anyhow::Result<Vec<String>> {
    let mut session = Session::default();
    let mut lines = vec![];
    for (i, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let m = session
            .parse(line)
            .with_context(|| format!("parse error on line {}", i + 1))?;
        let ty = session
            .infer_type(&m)
            .with_context(|| format!("type error on line {}", i + 1))?;
        lines.push(format!("{} : {}", session.pretty(&m), ty));
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terms_are_reported_with_their_types() {
        let input = "# comment\n{x. x}\n\nx + 1 = 2\n  T && F --> T  \n";
        insta::assert_snapshot!(process(input).unwrap().join("\n"), @r"
        {x. x} : (t1 -> t1)
        ((x + 1) = 2) : o
        ((T && F) --> T) : o
        ");
    }

    #[test]
    fn operator_arguments_get_their_own_type_variables() {
        let lines = process("{p. p (=) (=)}").unwrap();
        let ty = lines[0].rsplit(" : ").next().unwrap();
        insta::assert_snapshot!(ty, @"(((t2 -> (t2 -> o)) -> ((t4 -> (t4 -> o)) -> t5)) -> t5)");
    }

    #[test]
    fn errors_name_the_line() {
        let err = process("x\n(f x").unwrap_err();
        assert!(format!("{err:#}").starts_with("parse error on line 2"));
        let err = process("x\nx x").unwrap_err();
        assert!(format!("{err:#}").starts_with("type error on line 2"));
    }
}
