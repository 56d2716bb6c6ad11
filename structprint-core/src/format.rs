//! Parser for the struct specifier language.
//!
//! A specifier is an optional byte order prefix followed by tokens of the
//! form `[&][count]code`. `z` reads a NUL-terminated string and `&` renders
//! the field as hexadecimal. A `*` dereferences the following token, or a
//! parenthesized group of tokens, through a 4-byte pointer:
//!
//! ```
//! use structprint_core::format::{parse, ByteOrder, FormatSpec};
//!
//! let spec = parse("<4sI*I(2sI)").unwrap();
//! assert_eq!(spec.byte_order, ByteOrder::Little);
//! assert_eq!(spec.fields.len(), 4);
//! assert!(matches!(&spec.fields[3], FormatSpec::Pointer(inner) if inner.len() == 2));
//! ```

pub mod scalar;

use std::fmt;

pub use scalar::{ByteOrder, ScalarCode};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatSpec {
    Primitive {
        code: ScalarCode,
        count: usize,
        hex: bool,
    },
    StringZ {
        hex: bool,
    },
    /// A 4-byte virtual address whose target is decoded as one record of
    /// the inner fields. Never empty.
    Pointer(Vec<FormatSpec>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSpec {
    pub byte_order: ByteOrder,
    pub fields: Vec<FormatSpec>,
}

impl ParsedSpec {
    /// Bytes consumed by one top-level row, or `None` when a `z` field makes
    /// the width data-dependent (or the total overflows). A pointer field
    /// always occupies 4 bytes.
    pub fn row_size(&self) -> Option<usize> {
        self.fields.iter().try_fold(0usize, |acc, field| match field {
            FormatSpec::Primitive { code, count, .. } => {
                acc.checked_add(code.token_size(self.byte_order, *count)?)
            }
            FormatSpec::StringZ { .. } => None,
            FormatSpec::Pointer(_) => acc.checked_add(4),
        })
    }
}

pub fn parse(text: &str) -> Result<ParsedSpec> {
    Parser::new(text, None).run()
}

struct Parser<'a> {
    text: &'a str,
    /// Set for groups inside a dereference: their own prefix is discarded.
    inherited: bool,
    byte_order: ByteOrder,
    in_prefix: bool,
    in_dereference: bool,
    depth: usize,
    accum: String,
    fields: Vec<FormatSpec>,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str, inherited: Option<ByteOrder>) -> Self {
        Self {
            text,
            inherited: inherited.is_some(),
            byte_order: inherited.unwrap_or_default(),
            in_prefix: true,
            in_dereference: false,
            depth: 0,
            accum: String::new(),
            fields: Vec::new(),
        }
    }

    fn error(&self, position: usize, message: impl Into<String>) -> Error {
        Error::FormatSyntax {
            format: self.text.to_string(),
            position,
            message: message.into(),
        }
    }

    fn accum_is_stars(&self) -> bool {
        self.accum.chars().all(|c| c == '*')
    }

    fn run(mut self) -> Result<ParsedSpec> {
        let text = self.text;
        for (pos, c) in text.char_indices() {
            if self.in_prefix {
                self.in_prefix = false;
                if let Some(order) = ByteOrder::from_char(c) {
                    if !self.inherited {
                        self.byte_order = order;
                    }
                    continue;
                }
            }

            match c {
                '*' => self.star(pos)?,
                '(' => self.open_group(pos)?,
                ')' => self.close_group(pos)?,
                c if self.depth > 0 => self.accum.push(c),
                c if c.is_ascii_whitespace() => {
                    if !self.accum.is_empty() {
                        return Err(self.error(pos, "whitespace inside a token"));
                    }
                }
                c if c.is_ascii_digit() => self.accum.push(c),
                '&' => {
                    if !self.accum.is_empty() {
                        return Err(self.error(pos, "hex marker must begin a token"));
                    }
                    self.accum.push(c);
                }
                c => {
                    self.accum.push(c);
                    if self.in_dereference {
                        self.close_dereference(pos)?;
                    } else {
                        let token = std::mem::take(&mut self.accum);
                        let field = self.token(&token, pos)?;
                        self.fields.push(field);
                    }
                }
            }
        }

        let end = self.text.len();
        if self.depth > 0 {
            return Err(self.error(end, "unbalanced parenthesis"));
        }
        if self.in_dereference {
            return Err(self.error(end, "dereference marker with nothing to dereference"));
        }
        if !self.accum.is_empty() {
            return Err(self.error(end, format!("incomplete token {:?}", self.accum)));
        }

        Ok(ParsedSpec {
            byte_order: self.byte_order,
            fields: self.fields,
        })
    }

    fn star(&mut self, pos: usize) -> Result<()> {
        if self.depth > 0 {
            self.accum.push('*');
        } else if !self.in_dereference {
            if !self.accum.is_empty() {
                return Err(self.error(pos, "dereference marker in the middle of a token"));
            }
            self.in_dereference = true;
        } else if self.accum_is_stars() {
            // Pointer to pointer; the extra level is resolved by the sub-parse.
            self.accum.push('*');
        } else {
            return Err(self.error(pos, "dereference marker in the middle of a token"));
        }
        Ok(())
    }

    fn open_group(&mut self, pos: usize) -> Result<()> {
        if !self.in_dereference {
            return Err(self.error(pos, "parenthesis outside of a dereference"));
        }

        // The outermost paren only delimits the group; whatever was already
        // accumulated (`**(II)`, `*2(I)`) becomes part of the group's text.
        if self.depth > 0 {
            self.accum.push('(');
        }
        self.depth += 1;
        Ok(())
    }

    fn close_group(&mut self, pos: usize) -> Result<()> {
        if self.depth == 0 {
            return Err(self.error(pos, "unmatched ')'"));
        }

        self.depth -= 1;
        if self.depth > 0 {
            self.accum.push(')');
            return Ok(());
        }

        self.close_dereference(pos)
    }

    fn close_dereference(&mut self, pos: usize) -> Result<()> {
        let inner = std::mem::take(&mut self.accum);
        let nested = Parser::new(&inner, Some(self.byte_order)).run()?;

        if nested.fields.is_empty() {
            return Err(self.error(pos, "empty dereference"));
        }

        self.fields.push(FormatSpec::Pointer(nested.fields));
        self.in_dereference = false;
        Ok(())
    }

    /// Compiles a terminated `[&][count]code` token.
    fn token(&self, token: &str, pos: usize) -> Result<FormatSpec> {
        let (hex, rest) = match token.strip_prefix('&') {
            Some(rest) => (true, rest),
            None => (false, token),
        };

        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let (digits, code) = rest.split_at(digits_end);

        let mut chars = code.chars();
        let (Some(c), None) = (chars.next(), chars.next()) else {
            return Err(self.error(pos, format!("malformed token {token:?}")));
        };

        let count = if digits.is_empty() {
            None
        } else {
            Some(
                digits
                    .parse::<usize>()
                    .map_err(|_| self.error(pos, format!("count {digits} is too large")))?,
            )
        };

        if c == 'z' {
            if count.is_some() {
                return Err(self.error(pos, "'z' does not take a count"));
            }
            return Ok(FormatSpec::StringZ { hex });
        }

        let Some(code) = ScalarCode::from_char(c) else {
            return Err(self.error(pos, format!("unknown type code {c:?}")));
        };

        if code.native_only() && !self.byte_order.is_native_sized() {
            return Err(self.error(
                pos,
                format!("'{code}' is only available with the native '@' prefix"),
            ));
        }

        let count = count.unwrap_or(1);
        if count == 0 && !code.takes_length() {
            return Err(self.error(pos, format!("'{code}' needs a non-zero count")));
        }
        if code.token_size(self.byte_order, count).is_none() {
            return Err(self.error(pos, format!("{count}{code} is too large")));
        }

        Ok(FormatSpec::Primitive { code, count, hex })
    }
}

impl fmt::Display for FormatSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatSpec::Primitive { code, count, hex } => {
                if *hex {
                    write!(f, "&")?;
                }
                if *count != 1 {
                    write!(f, "{count}")?;
                }
                write!(f, "{code}")
            }
            FormatSpec::StringZ { hex } => {
                if *hex {
                    write!(f, "&")?;
                }
                write!(f, "z")
            }
            FormatSpec::Pointer(inner) => {
                write!(f, "*")?;
                // `**(..)` would re-parse as a group of the outer pointer.
                if let [single] = inner.as_slice() {
                    if !matches!(single, FormatSpec::Pointer(_)) {
                        return write!(f, "{single}");
                    }
                }
                write!(f, "(")?;
                for field in inner {
                    write!(f, "{field}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for ParsedSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.byte_order.as_char())?;
        for field in &self.fields {
            write!(f, "{field}")?;
        }
        Ok(())
    }
}
