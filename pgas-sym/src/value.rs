#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::fmt;
use std::iter::Peekable;
use std::sync::Arc;

use crate::error::SymError;
use crate::linear::LinearForm;

/// Host-issued handle for a symbol the constraint domain reasons about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolId(pub u32);

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

/// An integer-valued symbolic expression.
///
/// `Unknown` stands for a value the host could not describe at all: every
/// comparison that involves it is undecided.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SymVal {
    Const(i64),
    Symbol(SymbolId),
    Add(Arc<SymVal>, Arc<SymVal>),
    Sub(Arc<SymVal>, Arc<SymVal>),
    Unknown,
}

impl SymVal {
    pub fn symbol(id: u32) -> Self {
        SymVal::Symbol(SymbolId(id))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, SymVal::Unknown)
    }

    /// `self + rhs`, folding constants where that cannot overflow.
    pub fn plus(&self, rhs: &SymVal) -> SymVal {
        if let (Some(a), Some(b)) = (self.as_const(), rhs.as_const()) {
            if let Some(n) = a.checked_add(b) {
                return SymVal::Const(n);
            }
        }
        match (self, rhs) {
            (_, SymVal::Const(0)) => self.clone(),
            (SymVal::Const(0), _) => rhs.clone(),
            _ => SymVal::Add(Arc::new(self.clone()), Arc::new(rhs.clone())),
        }
    }

    /// `self - rhs`, folding constants where that cannot overflow.
    pub fn minus(&self, rhs: &SymVal) -> SymVal {
        if let (Some(a), Some(b)) = (self.as_const(), rhs.as_const()) {
            if let Some(n) = a.checked_sub(b) {
                return SymVal::Const(n);
            }
        }
        match rhs {
            SymVal::Const(0) => self.clone(),
            _ => SymVal::Sub(Arc::new(self.clone()), Arc::new(rhs.clone())),
        }
    }

    /// Folds a tree made only of constants.
    pub fn as_const(&self) -> Option<i64> {
        match self {
            SymVal::Const(n) => Some(*n),
            SymVal::Symbol(_) | SymVal::Unknown => None,
            SymVal::Add(a, b) => a.as_const()?.checked_add(b.as_const()?),
            SymVal::Sub(a, b) => a.as_const()?.checked_sub(b.as_const()?),
        }
    }

    /// Normalises to `Σ cᵢ·symᵢ + k`. `None` when an `Unknown` leaf is present
    /// or a coefficient overflows.
    pub fn linear(&self) -> Option<LinearForm> {
        match self {
            SymVal::Const(n) => Some(LinearForm::constant(*n)),
            SymVal::Symbol(id) => Some(LinearForm::symbol(*id)),
            SymVal::Add(a, b) => a.linear()?.checked_add(&b.linear()?),
            SymVal::Sub(a, b) => a.linear()?.checked_sub(&b.linear()?),
            SymVal::Unknown => None,
        }
    }

    pub fn symbols(&self) -> BTreeSet<SymbolId> {
        let mut out = BTreeSet::new();
        self.collect_symbols(&mut out);
        out
    }

    fn collect_symbols(&self, out: &mut BTreeSet<SymbolId>) {
        match self {
            SymVal::Symbol(id) => {
                out.insert(*id);
            }
            SymVal::Add(a, b) | SymVal::Sub(a, b) => {
                a.collect_symbols(out);
                b.collect_symbols(out);
            }
            SymVal::Const(_) | SymVal::Unknown => {}
        }
    }

    /// Parses `12`, `-3`, `?`, `i`, `i + 2`, `n - m - 1`.
    ///
    /// Names are resolved through `lookup`; an unresolved name is an error.
    pub fn parse<F>(text: &str, mut lookup: F) -> Result<SymVal, SymError>
    where
        F: FnMut(&str) -> Option<SymbolId>,
    {
        let tokens = tokenize(text)?;
        if tokens.is_empty() {
            return Err(SymError::new("empty expression"));
        }

        let mut iter = tokens.into_iter().peekable();
        let mut acc = parse_operand(&mut iter, &mut lookup, text)?;
        while let Some(tok) = iter.next() {
            acc = match tok {
                Token::Plus => acc.plus(&parse_operand(&mut iter, &mut lookup, text)?),
                Token::Minus => acc.minus(&parse_operand(&mut iter, &mut lookup, text)?),
                _ => {
                    return Err(SymError::new(format!(
                        "expected `+` or `-` between operands in `{text}`"
                    )));
                }
            };
        }
        Ok(acc)
    }
}

impl From<i64> for SymVal {
    fn from(n: i64) -> Self {
        SymVal::Const(n)
    }
}

impl From<SymbolId> for SymVal {
    fn from(id: SymbolId) -> Self {
        SymVal::Symbol(id)
    }
}

impl fmt::Display for SymVal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymVal::Const(n) => write!(f, "{n}"),
            SymVal::Symbol(id) => write!(f, "{id}"),
            SymVal::Add(a, b) => write!(f, "{a} + {b}"),
            SymVal::Sub(a, b) => match b.as_ref() {
                SymVal::Add(..) | SymVal::Sub(..) => write!(f, "{a} - ({b})"),
                _ => write!(f, "{a} - {b}"),
            },
            SymVal::Unknown => f.write_str("?"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    Num(i64),
    Ident(String),
    Plus,
    Minus,
    Unknown,
}

fn tokenize(text: &str) -> Result<Vec<Token>, SymError> {
    let mut out = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '+' => {
                chars.next();
                out.push(Token::Plus);
            }
            '-' => {
                chars.next();
                out.push(Token::Minus);
            }
            '?' => {
                chars.next();
                out.push(Token::Unknown);
            }
            c if c.is_ascii_digit() => {
                let end = take_while(&mut chars, start, |d| d.is_ascii_digit());
                let n = text[start..end].parse::<i64>().map_err(|e| {
                    SymError::new(format!("bad integer `{}`: {e}", &text[start..end]))
                })?;
                out.push(Token::Num(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let end = take_while(&mut chars, start, |d| d.is_alphanumeric() || d == '_');
                out.push(Token::Ident(text[start..end].to_string()));
            }
            other => {
                return Err(SymError::new(format!(
                    "unexpected character `{other}` in `{text}`"
                )));
            }
        }
    }
    Ok(out)
}

fn take_while<I>(chars: &mut Peekable<I>, start: usize, keep: impl Fn(char) -> bool) -> usize
where
    I: Iterator<Item = (usize, char)>,
{
    let mut end = start;
    while let Some(&(i, c)) = chars.peek() {
        if !keep(c) {
            break;
        }
        end = i + c.len_utf8();
        chars.next();
    }
    end
}

fn parse_operand<I, F>(iter: &mut Peekable<I>, lookup: &mut F, text: &str) -> Result<SymVal, SymError>
where
    I: Iterator<Item = Token>,
    F: FnMut(&str) -> Option<SymbolId>,
{
    match iter.next() {
        Some(Token::Num(n)) => Ok(SymVal::Const(n)),
        Some(Token::Minus) => match iter.next() {
            Some(Token::Num(n)) => Ok(SymVal::Const(-n)),
            _ => Err(SymError::new(format!(
                "expected a number after unary `-` in `{text}`"
            ))),
        },
        Some(Token::Ident(name)) => lookup(&name)
            .map(SymVal::Symbol)
            .ok_or_else(|| SymError::new(format!("unknown symbol `{name}`"))),
        Some(Token::Unknown) => Ok(SymVal::Unknown),
        Some(Token::Plus) | None => Err(SymError::new(format!("expected an operand in `{text}`"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<SymbolId> {
        match name {
            "i" => Some(SymbolId(0)),
            "n" => Some(SymbolId(1)),
            _ => None,
        }
    }

    #[test]
    fn test_parse_literals() {
        assert_eq!(SymVal::parse("12", lookup).unwrap(), SymVal::Const(12));
        assert_eq!(SymVal::parse("-3", lookup).unwrap(), SymVal::Const(-3));
        assert_eq!(SymVal::parse(" ? ", lookup).unwrap(), SymVal::Unknown);
    }

    #[test]
    fn test_parse_folds_constant_arithmetic() {
        assert_eq!(SymVal::parse("4 + 3 - 1", lookup).unwrap(), SymVal::Const(6));
    }

    #[test]
    fn test_parse_symbolic_offset() {
        let v = SymVal::parse("i + 2", lookup).unwrap();
        let form = v.linear().unwrap();
        assert_eq!(form.coefficient(SymbolId(0)), 1);
        assert_eq!(form.constant_term(), 2);
        assert_eq!(v.to_string(), "$0 + 2");
    }

    #[test]
    fn test_parse_rejects_unknown_name() {
        let err = SymVal::parse("j + 1", lookup).unwrap_err();
        assert!(err.message.contains("unknown symbol `j`"));
    }

    #[test]
    fn test_parse_rejects_dangling_operator() {
        assert!(SymVal::parse("i +", lookup).is_err());
        assert!(SymVal::parse("i 2", lookup).is_err());
        assert!(SymVal::parse("", lookup).is_err());
        assert!(SymVal::parse("i * 2", lookup).is_err());
    }

    #[test]
    fn test_plus_and_minus_keep_zero_neutral() {
        let i = SymVal::symbol(0);
        assert_eq!(i.plus(&SymVal::Const(0)), i);
        assert_eq!(SymVal::Const(0).plus(&i), i);
        assert_eq!(i.minus(&SymVal::Const(0)), i);
    }

    #[test]
    fn test_linear_cancels_symbols() {
        let i = SymVal::symbol(0);
        let v = i.plus(&SymVal::Const(5)).minus(&i);
        assert_eq!(v.as_const(), None);
        assert_eq!(v.linear().and_then(|f| f.as_const()), Some(5));
    }

    #[test]
    fn test_unknown_has_no_linear_form() {
        let v = SymVal::symbol(0).plus(&SymVal::Unknown);
        assert!(v.linear().is_none());
        assert_eq!(v.symbols().len(), 1);
    }
}
