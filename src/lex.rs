use std::iter::FusedIterator;
use std::ops::Range;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

#[derive(Debug)]
pub struct File {
    name: String,
    contents: String,
    lines: Vec<usize>,
}

impl File {
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        let name = name.into();
        let contents = contents.into();
        let mut lines = vec![0];
        for (idx, ch) in contents.char_indices() {
            if ch == '\n' {
                lines.push(idx + ch.len_utf8());
            }
        }
        Self {
            name,
            contents,
            lines,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    pub fn line_column_at(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.contents.len());
        let line_index = match self.lines.binary_search(&offset) {
            Ok(index) => index,
            Err(index) => index.saturating_sub(1),
        };
        let line_start = self.lines[line_index];
        let column = self.contents[line_start..offset].chars().count() + 1;
        (line_index + 1, column)
    }

    pub fn line(&self, line: usize) -> &str {
        if line == 0 || line > self.lines.len() {
            return "";
        }
        let start = self.lines[line - 1];
        let end = match self.lines.get(line) {
            Some(&next_start) if next_start > start => next_start - 1,
            Some(&next_start) => next_start,
            None => self.contents.len(),
        };
        &self.contents[start..end]
    }
}

#[derive(Debug, Clone)]
pub struct SourceInfo {
    range: Range<usize>,
    file: Arc<File>,
}

impl SourceInfo {
    pub fn new(file: Arc<File>, range: Range<usize>) -> Self {
        Self { range, file }
    }

    pub fn eof(file: Arc<File>) -> Self {
        let len = file.len();
        Self::new(file, len..len)
    }

    pub fn as_str(&self) -> &str {
        self.file.contents().get(self.range.clone()).unwrap_or("")
    }

    /// Byte offset of the start of this range in the source text.
    pub fn offset(&self) -> usize {
        self.range.start
    }

    pub fn line_column(&self) -> (usize, usize) {
        self.file.line_column_at(self.range.start)
    }
}

impl std::fmt::Display for SourceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let (line, column) = self.line_column();
        writeln!(f, "{}:{}:{}\n", self.file.name(), line, column)?;
        let line_text = self.file.line(line);
        writeln!(f, "{}", line_text)?;
        writeln!(
            f,
            "{}{}",
            " ".repeat(column - 1),
            "^".repeat(std::cmp::max(1, self.as_str().chars().count()))
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Open,   // "(", "{", "["
    Close,  // ")", "}", "]"
    Ident,  // e.g. "x", "neg", "_foo", "$1"
    NumLit, // e.g. "0", "42"
    StrLit, // e.g. "\"a b\""
    Symbol, // e.g. "+", "==", "-->", "."
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub source_info: SourceInfo,
}

impl Token {
    pub fn is_ident(&self) -> bool {
        self.kind == TokenKind::Ident
    }

    pub fn is_num_lit(&self) -> bool {
        self.kind == TokenKind::NumLit
    }

    pub fn as_str(&self) -> &str {
        self.source_info.as_str()
    }

    pub fn offset(&self) -> usize {
        self.source_info.offset()
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?} {}\n{}", self.kind, self.as_str(), self.source_info)
    }
}

#[derive(Debug, Clone)]
pub struct Lex {
    file: Arc<File>,
    position: usize,
}

#[derive(Debug, Clone, Error)]
#[error("unrecognizable character at {source_info}")]
pub struct LexError {
    source_info: SourceInfo,
}

impl LexError {
    pub fn offset(&self) -> usize {
        self.source_info.offset()
    }
}

impl From<Lex> for LexError {
    fn from(lex: Lex) -> Self {
        let start = std::cmp::min(lex.position, lex.file.len());
        let end = lex.file.contents()[start..]
            .chars()
            .next()
            .map(|c| start + c.len_utf8())
            .unwrap_or(start);
        Self {
            source_info: SourceInfo::new(lex.file, start..end),
        }
    }
}

impl Lex {
    pub fn new(file: Arc<File>) -> Self {
        Self { file, position: 0 }
    }

    pub fn input(&self) -> &Arc<File> {
        &self.file
    }

    fn advance(&mut self, bytes: usize) -> SourceInfo {
        let source_info =
            SourceInfo::new(Arc::clone(&self.file), self.position..self.position + bytes);
        self.position += bytes;
        source_info
    }
}

impl Iterator for Lex {
    type Item = std::result::Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        #[derive(PartialEq, Eq, Debug)]
        enum Kind {
            Space,
            Open,
            Close,
            Ident,
            NumLit,
            StrLit,
            Symbol,
        }

        static RE: Lazy<Regex> = Lazy::new(|| {
            let s = &[
                (Kind::Space, r"\s+"),
                (Kind::Open, r"[(\[{]"),
                (Kind::Close, r"[)\]}]"),
                (Kind::Ident, r"[_$a-zA-Z][_a-zA-Z0-9]*"),
                (Kind::NumLit, r"[0-9]+"),
                (Kind::StrLit, r#""(?:\\.|[^"\\])*""#),
                (Kind::Symbol, r#"[^_$a-zA-Z0-9(){}\[\]\s"]+"#),
            ]
            .iter()
            .map(|(kind, re)| format!("(?P<{:?}>{})", kind, re))
            .collect::<Vec<_>>()
            .join("|");
            regex::Regex::new(&format!("^(?:{})", s)).unwrap()
        });

        loop {
            if self.file.len() == self.position {
                return None;
            }
            let input = Arc::clone(&self.file);
            let cap = match RE.captures(&input.contents()[self.position..]) {
                None => return Some(Err(LexError::from(self.clone()))),
                Some(cap) => cap,
            };
            let len = cap.get(0).map_or(0, |m| m.len());

            // skip whitespaces
            if cap.name(&format!("{:?}", Kind::Space)).is_some() {
                self.advance(len);
                continue;
            }

            let kind = if cap.name(&format!("{:?}", Kind::Open)).is_some() {
                TokenKind::Open
            } else if cap.name(&format!("{:?}", Kind::Close)).is_some() {
                TokenKind::Close
            } else if cap.name(&format!("{:?}", Kind::Ident)).is_some() {
                TokenKind::Ident
            } else if cap.name(&format!("{:?}", Kind::NumLit)).is_some() {
                TokenKind::NumLit
            } else if cap.name(&format!("{:?}", Kind::StrLit)).is_some() {
                TokenKind::StrLit
            } else {
                TokenKind::Symbol
            };
            let source_info = self.advance(len);
            return Some(Ok(Token { kind, source_info }));
        }
    }
}

impl FusedIterator for Lex {}

/// The token texts of `input`, in order.
pub fn tokenize(input: &str) -> Result<Vec<String>, LexError> {
    let file = Arc::new(File::new("<input>", input));
    Lex::new(file)
        .map(|token| token.map(|token| token.as_str().to_owned()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Vec<Token> {
        let file = Arc::new(File::new("<test>", input.to_owned()));
        Lex::new(file)
            .map(|token| token.expect("lexing failed"))
            .collect()
    }

    #[test]
    fn brackets_are_single_tokens() {
        assert_eq!(tokenize("(o i)").unwrap(), ["(", "o", "i", ")"]);
        assert_eq!(tokenize("{x. ((f x))}").unwrap(), ["{", "x", ".", "(", "(", "f", "x", ")", ")", "}"]);
    }

    #[test]
    fn operator_runs_are_one_token() {
        assert_eq!(tokenize("p-->q==r").unwrap(), ["p", "-->", "q", "==", "r"]);
        assert_eq!(tokenize("x - -5").unwrap(), ["x", "-", "-", "5"]);
    }

    #[test]
    fn token_kinds_and_offsets() {
        let tokens = lex(r#"f $1 12 "a \"b\"" +"#);
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            [
                TokenKind::Ident,
                TokenKind::Ident,
                TokenKind::NumLit,
                TokenKind::StrLit,
                TokenKind::Symbol
            ]
        );
        let offsets: Vec<usize> = tokens.iter().map(|t| t.offset()).collect();
        assert_eq!(offsets, [0, 2, 5, 8, 18]);
        assert_eq!(tokens[3].as_str(), r#""a \"b\"""#);
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = tokenize("f \"abc").unwrap_err();
        assert_eq!(err.offset(), 2);
    }

    #[test]
    fn line_and_column() {
        let file = File::new("<test>", "a\nbc\n");
        assert_eq!(file.line_column_at(3), (2, 2));
        assert_eq!(file.line(2), "bc");
    }
}
