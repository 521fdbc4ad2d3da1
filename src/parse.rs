use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use once_cell::sync::Lazy;
use thiserror::Error;

use crate::lex::{File, Lex, LexError, SourceInfo, Token, TokenKind};
use crate::tt::{mk_abs, mk_aliased_var, mk_app, mk_infix, mk_var, Name, NameExt, Term, TermVar};

/// Binding power of closing brackets and end of input.
pub const END_POWER: usize = 0;
/// Binding power of names and literals that are not operators.
pub const NAME_POWER: usize = 100;
/// Binding power of symbols missing from the table; they act as infix.
pub const DEFAULT_INFIX_POWER: usize = 70;
/// Binding power shared by every prefix operator.
pub const UNARY_POWER: usize = 200;
/// Binding power of opening brackets.
pub const OPEN_POWER: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fixity {
    Infix,
    Prefix,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator {
    /// The text as written, e.g. `==`.
    pub symbol: String,
    pub fixity: Fixity,
    pub prec: usize,
    /// The name the symbol stands for, e.g. `=` for `==`.
    pub entity: Name,
    /// An alternate symbol for display and input, e.g. `∧` for `&&`.
    pub unicode: Option<String>,
}

impl Operator {
    pub fn infix(symbol: &str, prec: usize) -> Self {
        Operator {
            symbol: symbol.to_owned(),
            fixity: Fixity::Infix,
            prec,
            entity: Name::intern(symbol),
            unicode: None,
        }
    }

    pub fn prefix(symbol: &str) -> Self {
        Operator {
            symbol: symbol.to_owned(),
            fixity: Fixity::Prefix,
            prec: UNARY_POWER,
            entity: Name::intern(symbol),
            unicode: None,
        }
    }

    pub fn alias_of(mut self, entity: &str) -> Self {
        self.entity = Name::intern(entity);
        self
    }

    pub fn with_unicode(mut self, unicode: &str) -> Self {
        self.unicode = Some(unicode.to_owned());
        self
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenTableError {
    #[error("symbol `{0}` already defined")]
    AlreadyDefined(String),
    #[error("precedence {prec} of `{symbol}` is outside the infix range")]
    BadPrecedence { symbol: String, prec: usize },
}

/// Precedence and fixity of every operator symbol the parser and printer know.
#[derive(Default, Debug, Clone)]
pub struct TokenTable {
    ops: HashMap<String, Operator>,
}

static STANDARD_TABLE: Lazy<TokenTable> = Lazy::new(|| {
    let mut table = TokenTable::default();
    let ops = [
        Operator::infix("==", 2).alias_of("="),
        Operator::infix("-->", 11).with_unicode("⇒"),
        Operator::infix("=>", 11).alias_of("-->"),
        Operator::infix("||", 13).with_unicode("∨"),
        Operator::infix("&&", 14).with_unicode("∧"),
        Operator::infix("=", 20),
        Operator::infix("!=", 20).with_unicode("≠"),
        Operator::infix("<", 20),
        Operator::infix("<=", 20).with_unicode("≤"),
        Operator::infix(">", 20),
        Operator::infix(">=", 20).with_unicode("≥"),
        Operator::infix("+", 30),
        Operator::infix("-", 30),
        Operator::infix("*", 40).with_unicode("·"),
        Operator::infix("/", 40),
        Operator::infix("**", 50),
        Operator::prefix("not").with_unicode("¬"),
        Operator::prefix("neg"),
    ];
    for op in ops {
        table.add(op).expect("standard operators are distinct");
    }
    table
});

impl TokenTable {
    pub fn standard() -> &'static TokenTable {
        &STANDARD_TABLE
    }

    pub fn add(&mut self, op: Operator) -> Result<(), TokenTableError> {
        if op.fixity == Fixity::Infix && !(END_POWER < op.prec && op.prec < NAME_POWER) {
            return Err(TokenTableError::BadPrecedence {
                symbol: op.symbol,
                prec: op.prec,
            });
        }
        let mut symbols = vec![op.symbol.clone()];
        symbols.extend(op.unicode.clone());
        for symbol in &symbols {
            if self.ops.contains_key(symbol) {
                return Err(TokenTableError::AlreadyDefined(symbol.clone()));
            }
        }
        for symbol in symbols {
            self.ops.insert(symbol, op.clone());
        }
        Ok(())
    }

    pub fn get(&self, symbol: &str) -> Option<&Operator> {
        self.ops.get(symbol)
    }

    /// The operator a variable of the given name (or print name) denotes.
    pub fn operator_of(&self, var: &TermVar) -> Option<&Operator> {
        self.get(var.display_name().as_str())
            .or_else(|| self.get(var.name.as_str()))
    }

    /// Binding power of a name: its table entry if it has one, otherwise
    /// [NAME_POWER] for identifiers and literals and [DEFAULT_INFIX_POWER] for
    /// other symbols.
    pub fn name_power(&self, name: &str) -> usize {
        match self.get(name) {
            Some(op) => op.prec,
            None => {
                if name.is_identifier() || name.is_integer_literal() || name.is_string_literal() {
                    NAME_POWER
                } else {
                    DEFAULT_INFIX_POWER
                }
            }
        }
    }

    /// True iff a variable of this name is shown between its two arguments.
    pub fn is_infix(&self, var: &TermVar) -> bool {
        let power = match self.operator_of(var) {
            Some(op) if op.fixity == Fixity::Prefix => return false,
            Some(op) => op.prec,
            None => self.name_power(var.display_name().as_str()),
        };
        END_POWER < power && power < NAME_POWER
    }

    /// True iff a variable of this name must be parenthesized to stand alone.
    pub fn is_operator(&self, var: &TermVar) -> bool {
        self.operator_of(var).is_some() || self.is_infix(var)
    }

    /// True iff `m` is a call of an infix operator on two arguments.
    pub fn is_infix_call(&self, m: &Term) -> bool {
        match m.bin_op() {
            Some(Term::Var(op)) => self.is_infix(op),
            _ => false,
        }
    }

    fn token_power(&self, token: &Token) -> usize {
        match token.kind {
            TokenKind::Open => OPEN_POWER,
            TokenKind::Close => END_POWER,
            TokenKind::NumLit | TokenKind::StrLit => NAME_POWER,
            TokenKind::Ident | TokenKind::Symbol => self.name_power(token.as_str()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("tokenize error: {lex_error}")]
    Lex {
        #[from]
        lex_error: LexError,
    },
    #[error("parse error: {message} at {source_info}")]
    Parse {
        message: String,
        offset: usize,
        source_info: String,
    },
    #[error("unexpected end of input at {source_info}")]
    Eof { offset: usize, source_info: String },
}

impl ParseError {
    /// Byte offset into the input where the error was detected.
    pub fn offset(&self) -> usize {
        match self {
            ParseError::Lex { lex_error } => lex_error.offset(),
            ParseError::Parse { offset, .. } | ParseError::Eof { offset, .. } => *offset,
        }
    }
}

pub struct Parser<'a> {
    lex: &'a mut Lex,
    tt: &'a TokenTable,
    depth: usize,
    max_depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(lex: &'a mut Lex, tt: &'a TokenTable, max_depth: usize) -> Self {
        Self {
            lex,
            tt,
            depth: 0,
            max_depth,
        }
    }

    fn fail<R>(token: &Token, message: impl Into<String>) -> Result<R, ParseError> {
        Err(ParseError::Parse {
            message: message.into(),
            offset: token.offset(),
            source_info: token.source_info.to_string(),
        })
    }

    fn eof_error(&self) -> ParseError {
        let source_info = SourceInfo::eof(Arc::clone(self.lex.input()));
        ParseError::Eof {
            offset: source_info.offset(),
            source_info: source_info.to_string(),
        }
    }

    fn peek_opt(&mut self) -> Result<Option<Token>, ParseError> {
        Ok(self.lex.clone().next().transpose()?)
    }

    fn peek2_opt(&mut self) -> Result<Option<Token>, ParseError> {
        let mut lex = self.lex.clone();
        lex.next().transpose()?;
        Ok(lex.next().transpose()?)
    }

    fn advance(&mut self) -> Result<(), ParseError> {
        self.any_token()?;
        Ok(())
    }

    pub fn eof(&mut self) -> Result<(), ParseError> {
        if let Some(token) = self.peek_opt()? {
            Self::fail(&token, "expected EOF but tokens remain")?;
        }
        Ok(())
    }

    fn any_token(&mut self) -> Result<Token, ParseError> {
        self.lex.next().transpose()?.ok_or_else(|| self.eof_error())
    }

    fn expect(&mut self, kind: TokenKind, text: &str) -> Result<Token, ParseError> {
        let token = self.any_token()?;
        if token.kind == kind && token.as_str() == text {
            return Ok(token);
        }
        Self::fail(&token, format!("expected '{}'", text))
    }

    fn enter(&mut self, token: &Token) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Self::fail(token, "expression nested too deeply");
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Parses a whole term.
    pub fn term(&mut self) -> Result<Term, ParseError> {
        self.subterm(END_POWER, false)
    }

    /// The variable a name token denotes, aliases resolved.
    fn term_var(&self, token: &Token) -> Term {
        let text = token.as_str();
        match self.tt.get(text) {
            Some(op) => {
                // unicode input reads as the ascii symbol
                let shown = if op.unicode.as_deref() == Some(text) {
                    op.symbol.as_str()
                } else {
                    text
                };
                mk_aliased_var(op.entity.clone(), shown)
            }
            None => mk_var(text),
        }
    }

    fn is_operator_token(&self, token: &Token) -> bool {
        match token.kind {
            TokenKind::Symbol => true,
            TokenKind::Ident => self.tt.get(token.as_str()).is_some(),
            _ => false,
        }
    }

    /// Parses one operand if the next token can start one, consuming nothing
    /// otherwise.
    fn operand(&mut self) -> Result<Option<Term>, ParseError> {
        let Some(token) = self.peek_opt()? else {
            return Ok(None);
        };
        match token.kind {
            TokenKind::Open => {
                self.enter(&token)?;
                let m = self.bracketed(&token)?;
                self.leave();
                Ok(Some(m))
            }
            TokenKind::Close => Ok(None),
            TokenKind::NumLit | TokenKind::StrLit => {
                self.advance()?;
                Ok(Some(mk_var(token.as_str())))
            }
            TokenKind::Ident | TokenKind::Symbol => {
                if let Some(op) = self.tt.get(token.as_str()) {
                    if op.fixity == Fixity::Prefix {
                        self.advance()?;
                        let op = self.term_var(&token);
                        self.enter(&token)?;
                        let m = self.subterm(UNARY_POWER, true)?;
                        self.leave();
                        return Ok(Some(mk_app(op, m)));
                    }
                }
                if token.as_str() == "-" {
                    self.advance()?;
                    if let Some(next) = self.peek_opt()? {
                        if next.is_num_lit() && next.offset() == token.offset() + 1 {
                            self.advance()?;
                            return Ok(Some(mk_var(format!("-{}", next.as_str()).as_str())));
                        }
                    }
                    self.enter(&token)?;
                    let m = self.subterm(UNARY_POWER, true)?;
                    self.leave();
                    return Ok(Some(mk_app(mk_var("neg"), m)));
                }
                if self.tt.token_power(&token) == NAME_POWER {
                    self.advance()?;
                    return Ok(Some(self.term_var(&token)));
                }
                Ok(None)
            }
        }
    }

    fn bracketed(&mut self, open: &Token) -> Result<Term, ParseError> {
        self.advance()?;
        match open.as_str() {
            "(" => {
                // `(op)` names the operator itself
                if let (Some(op), Some(close)) = (self.peek_opt()?, self.peek2_opt()?) {
                    if self.is_operator_token(&op) && close.as_str() == ")" {
                        self.advance()?;
                        self.advance()?;
                        return Ok(self.term_var(&op));
                    }
                }
                let m = self.subterm(END_POWER, false)?;
                self.expect(TokenKind::Close, ")")?;
                Ok(m)
            }
            "{" => {
                let token = self.any_token()?;
                if !token.is_ident() || !token.as_str().is_variable_name() {
                    return Self::fail(&token, "expected variable");
                }
                let bound = Arc::new(TermVar::new(Name::intern(token.as_str())));
                self.expect(TokenKind::Symbol, ".")?;
                let body = self.subterm(END_POWER, false)?;
                self.expect(TokenKind::Close, "}")?;
                Ok(mk_abs(bound, body))
            }
            _ => Self::fail(open, "unexpected bracket"),
        }
    }

    /// Parses operands and operators while the next token binds tighter than
    /// `power`.
    ///
    /// Every call or operator added to the chain nests the result one level
    /// deeper, so each one counts against the depth limit until the chain ends.
    fn subterm(&mut self, power: usize, after_unary: bool) -> Result<Term, ParseError> {
        let mut left = match self.operand()? {
            Some(m) => m,
            None => match self.peek_opt()? {
                Some(token) => return Self::fail(&token, "expected term"),
                None => return Err(self.eof_error()),
            },
        };
        let mut chain = 0;
        while let Some(token) = self.peek_opt()? {
            let mut token_power = self.tt.token_power(&token);
            if after_unary && token_power == UNARY_POWER {
                token_power += 1;
            }
            if power >= token_power {
                break;
            }
            self.enter(&token)?;
            chain += 1;
            let is_prefix = matches!(self.tt.get(token.as_str()), Some(op) if op.fixity == Fixity::Prefix);
            if token_power < NAME_POWER && !is_prefix {
                self.advance()?;
                let op = self.term_var(&token);
                // a section `(x +)` is the operator applied to its left operand
                if matches!(self.peek_opt()?, None | Some(Token { kind: TokenKind::Close, .. })) {
                    left = mk_app(op, left);
                    continue;
                }
                let right = self.subterm(token_power, false)?;
                left = mk_infix(left, op, right);
            } else {
                match self.operand()? {
                    Some(arg) => left = mk_app(left, arg),
                    None => break,
                }
            }
        }
        self.depth -= chain;
        Ok(left)
    }
}

/// Parses `input` as a single term using the operators of `tt`.
pub fn parse_term(input: &str, tt: &TokenTable, max_depth: usize) -> Result<Term, ParseError> {
    let file = Arc::new(File::new("<input>", input));
    let mut lex = Lex::new(file);
    let mut parser = Parser::new(&mut lex, tt, max_depth);
    let m = parser.term()?;
    parser.eof()?;
    Ok(m)
}

/// Memo of parse results keyed by input text, evicting the oldest entry once
/// `capacity` is reached.
#[derive(Debug, Clone)]
pub struct ParseCache {
    capacity: usize,
    entries: HashMap<String, Term>,
    order: VecDeque<String>,
}

impl ParseCache {
    pub fn new(capacity: usize) -> Self {
        ParseCache {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn get(&self, input: &str) -> Option<&Term> {
        self.entries.get(input)
    }

    pub fn insert(&mut self, input: &str, term: Term) {
        if self.capacity == 0 || self.entries.contains_key(input) {
            return;
        }
        while self.entries.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            log::trace!("parse cache evicts: {oldest}");
            self.entries.remove(&oldest);
        }
        self.entries.insert(input.to_owned(), term);
        self.order.push_back(input.to_owned());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}
