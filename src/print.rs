use std::fmt::Display;

use crate::parse::TokenTable;
use crate::tt::{Term, TermVar};

struct Printer<'a> {
    tt: &'a TokenTable,
    unicode: bool,
}

impl<'a> Printer<'a> {
    fn new(tt: &'a TokenTable, unicode: bool) -> Self {
        Printer { tt, unicode }
    }

    fn var_name<'b>(&'b self, v: &'b TermVar) -> &'b str {
        if self.unicode {
            if let Some(unicode) = self.tt.operator_of(v).and_then(|op| op.unicode.as_deref()) {
                return unicode;
            }
        }
        v.display_name().as_str()
    }

    fn infix_op<'b>(&self, m: &'b Term) -> Option<&'b TermVar> {
        match m {
            Term::Var(v) if self.tt.is_infix(v) => Some(v),
            _ => None,
        }
    }

    fn fmt_term(&self, m: &Term, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match m {
            Term::Var(v) => write!(f, "{}", self.var_name(v)),
            Term::App(_) => {
                let head = m.head();
                let args = m.args();
                write!(f, "(")?;
                let rest = match self.infix_op(head) {
                    Some(op) if args.len() >= 2 => {
                        if args.len() > 2 {
                            write!(f, "(")?;
                        }
                        self.fmt_infix_operand(args[0], f)?;
                        write!(f, " {} ", self.var_name(op))?;
                        self.fmt_infix_operand(args[1], f)?;
                        if args.len() > 2 {
                            write!(f, ")")?;
                        }
                        &args[2..]
                    }
                    Some(op) => {
                        self.fmt_infix_operand(args[0], f)?;
                        write!(f, " {}", self.var_name(op))?;
                        &args[1..]
                    }
                    None => {
                        self.fmt_term(head, f)?;
                        &args[..]
                    }
                };
                for arg in rest {
                    write!(f, " ")?;
                    self.fmt_arg(arg, f)?;
                }
                write!(f, ")")
            }
            Term::Abs(inner) => {
                write!(f, "{{{}. ", inner.bound.display_name())?;
                self.fmt_term(&inner.body, f)?;
                write!(f, "}}")
            }
        }
    }

    // Operators standing alone are parenthesized so they read back as names.
    fn fmt_infix_operand(&self, m: &Term, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match m {
            Term::Var(v) if self.tt.is_operator(v) => write!(f, "({})", self.var_name(v)),
            _ => self.fmt_term(m, f),
        }
    }

    // In juxtaposition a negative numeral would read as subtraction.
    fn fmt_arg(&self, m: &Term, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if let Term::Var(v) = m {
            if matches!(m.num_value(), Some(n) if n < 0) {
                return write!(f, "({})", self.var_name(v));
            }
        }
        self.fmt_infix_operand(m, f)
    }
}

#[derive(Debug)]
pub struct Pretty<'a, T> {
    tt: &'a TokenTable,
    unicode: bool,
    data: T,
}

impl<'a, T> Pretty<'a, T> {
    pub fn new(tt: &'a TokenTable, data: T) -> Self {
        Pretty {
            tt,
            unicode: false,
            data,
        }
    }

    /// Shows operators by their unicode symbols where they have one.
    pub fn unicode(mut self) -> Self {
        self.unicode = true;
        self
    }
}

impl Display for Pretty<'_, &Term> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        Printer::new(self.tt, self.unicode).fmt_term(self.data, f)
    }
}

impl Display for Pretty<'_, Term> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        Printer::new(self.tt, self.unicode).fmt_term(&self.data, f)
    }
}

impl Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Printer::new(TokenTable::standard(), false).fmt_term(self, f)
    }
}
