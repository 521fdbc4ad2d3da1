use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

use crate::tt::Term;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Segment {
    Fn,
    Arg,
    Bound,
    Body,
}

impl Segment {
    pub fn as_str(self) -> &'static str {
        match self {
            Segment::Fn => "fn",
            Segment::Arg => "arg",
            Segment::Bound => "bound",
            Segment::Body => "body",
        }
    }
}

impl Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressingError {
    #[error("unknown path segment `{0}`")]
    UnknownSegment(String),
    #[error("path segment `{segment}` does not apply to {found}")]
    Mismatch { segment: Segment, found: String },
    #[error("only a variable can replace a binding occurrence, got {0}")]
    NotAVariable(String),
}

impl AddressingError {
    pub(crate) fn mismatch(segment: Segment, found: &Term) -> Self {
        AddressingError::Mismatch {
            segment,
            found: found.dump(),
        }
    }
}

/// A route from the root of a term to one of its subterms.
///
/// Paths are immutable cons lists; `tail` shares structure with its parent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Path(Option<Arc<PathNode>>);

#[derive(Debug, PartialEq, Eq, Hash)]
struct PathNode {
    segment: Segment,
    rest: Path,
}

impl Path {
    /// The empty path, addressing the whole term.
    pub fn here() -> Path {
        Path(None)
    }

    pub fn cons(segment: Segment, rest: Path) -> Path {
        Path(Some(Arc::new(PathNode { segment, rest })))
    }

    pub fn from_segments(segments: impl IntoIterator<Item = Segment>) -> Path {
        let segments: Vec<Segment> = segments.into_iter().collect();
        segments
            .into_iter()
            .rev()
            .fold(Path::here(), |rest, segment| Path::cons(segment, rest))
    }

    pub fn is_here(&self) -> bool {
        self.0.is_none()
    }

    pub fn segment(&self) -> Option<Segment> {
        self.0.as_ref().map(|node| node.segment)
    }

    pub fn tail(&self) -> Option<&Path> {
        self.0.as_ref().map(|node| &node.rest)
    }

    /// The remainder of the path after stepping in `direction`, or [None] if the
    /// path goes some other way (or nowhere).
    pub fn rest(&self, direction: Segment) -> Option<&Path> {
        match &self.0 {
            Some(node) if node.segment == direction => Some(&node.rest),
            _ => None,
        }
    }

    pub fn segments(&self) -> impl Iterator<Item = Segment> + '_ {
        let mut cur = self;
        std::iter::from_fn(move || {
            let node = cur.0.as_ref()?;
            cur = &node.rest;
            Some(node.segment)
        })
    }

    pub fn len(&self) -> usize {
        self.segments().count()
    }

    pub fn is_empty(&self) -> bool {
        self.is_here()
    }

    /// `self` followed by `other`.
    pub fn concat(&self, other: &Path) -> Path {
        if other.is_here() {
            return self.clone();
        }
        let segments: Vec<Segment> = self.segments().collect();
        segments
            .into_iter()
            .rev()
            .fold(other.clone(), |rest, segment| Path::cons(segment, rest))
    }

    /// Like [Path::from_str], with the `main` macro expanded for a step that
    /// does or does not carry hypotheses.
    pub fn parse_with_hyps(text: &str, has_hyps: bool) -> Result<Path, AddressingError> {
        let mut segments = vec![];
        for word in text.split('/').filter(|word| !word.is_empty()) {
            match word {
                "fn" => segments.push(Segment::Fn),
                "arg" => segments.push(Segment::Arg),
                "bound" => segments.push(Segment::Bound),
                "body" => segments.push(Segment::Body),
                "left" => segments.extend([Segment::Fn, Segment::Arg]),
                "right" => segments.push(Segment::Arg),
                "binop" => segments.extend([Segment::Fn, Segment::Fn]),
                "main" => {
                    if has_hyps {
                        segments.push(Segment::Arg);
                    }
                }
                _ => return Err(AddressingError::UnknownSegment(word.to_owned())),
            }
        }
        Ok(Path::from_segments(segments))
    }
}

impl FromStr for Path {
    type Err = AddressingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Path::parse_with_hyps(s, false)
    }
}

impl Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for segment in self.segments() {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}
