//! Parsing of the `VALUES` tail of an `INSERT` statement.
//!
//! The grammar only admits `%s` placeholders and function calls over them:
//!
//! ```text
//! VALUES := "VALUES" ARGS ("," ARGS)*
//! ARGS   := "(" EXPR ("," EXPR)* ")" | "(" ")"
//! EXPR   := "%s" | FUNC
//! FUNC   := IDENT ARGS
//! IDENT  := [A-Za-z_][A-Za-z0-9_]*
//! ```
use crate::Error;

/// A parenthesized, comma separated argument list, along with the source text it was parsed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
    items: Vec<ValueTree>,
    raw: String,
}

impl Args {
    pub fn items(&self) -> &[ValueTree] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The source text of this list, parentheses included.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Whether every item is a bare placeholder.
    pub fn all_terminals(&self) -> bool {
        self.items.iter().all(|item| matches!(item, ValueTree::Terminal))
    }

    /// The number of placeholders in this list, at any depth.
    pub fn placeholder_count(&self) -> usize {
        self.items.iter().map(ValueTree::placeholder_count).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueTree {
    /// A single `%s` placeholder.
    Terminal,
    Function(String, Args),
    Args(Args),
}

impl ValueTree {
    pub fn placeholder_count(&self) -> usize {
        match self {
            ValueTree::Terminal => 1,
            ValueTree::Function(_, args) | ValueTree::Args(args) => args.placeholder_count(),
        }
    }
}

/// The root of a parsed `VALUES` clause: one argument list per row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Values {
    groups: Vec<Args>,
}

impl Values {
    pub fn groups(&self) -> &[Args] {
        &self.groups
    }

    /// True when every row holds only placeholders and all rows have the same arity,
    /// which allows a single statement template to be reused for every row.
    pub fn is_homogeneous(&self) -> bool {
        match self.groups.first() {
            None => true,
            Some(first) => self
                .groups
                .iter()
                .all(|group| group.all_terminals() && group.len() == first.len()),
        }
    }

    pub fn placeholder_count(&self) -> usize {
        self.groups.iter().map(Args::placeholder_count).sum()
    }
}

/// Parses `text`, which must start with the `VALUES` keyword.
pub fn parse_values(text: &str) -> Result<Values, Error> {
    let mut parser = Parser { text, pos: 0 };
    parser.skip_whitespace();
    parser.keyword("VALUES")?;

    let mut groups = vec![parser.args()?];
    loop {
        parser.skip_whitespace();
        if parser.eat(',') {
            groups.push(parser.args()?);
        } else {
            break;
        }
    }

    parser.skip_whitespace();
    parser.eat(';');
    parser.skip_whitespace();
    if !parser.at_end() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(Values { groups })
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn error(&self, what: &str) -> Error {
        Error::Programming(format!("{} at {:?}", what, self.rest()))
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<(), Error> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", c)))
        }
    }

    fn keyword(&mut self, keyword: &str) -> Result<(), Error> {
        let rest = self.rest();
        match rest.get(..keyword.len()) {
            Some(head) if head.eq_ignore_ascii_case(keyword) => {
                self.pos += keyword.len();
                Ok(())
            }
            _ => Err(self.error(&format!("expected {}", keyword))),
        }
    }

    fn args(&mut self) -> Result<Args, Error> {
        self.skip_whitespace();
        let start = self.pos;
        self.expect('(')?;
        self.skip_whitespace();

        let mut items = Vec::new();
        if !self.eat(')') {
            loop {
                items.push(self.expr()?);
                self.skip_whitespace();
                if self.eat(')') {
                    break;
                }
                self.expect(',')?;
                self.skip_whitespace();
                if self.peek() == Some(')') {
                    return Err(self.error("trailing comma in argument list"));
                }
            }
        }
        Ok(Args {
            items,
            raw: self.text[start..self.pos].to_string(),
        })
    }

    fn expr(&mut self) -> Result<ValueTree, Error> {
        self.skip_whitespace();
        if self.rest().starts_with("%s") {
            self.pos += 2;
            return Ok(ValueTree::Terminal);
        }
        match self.peek() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                let name = self.ident();
                self.skip_whitespace();
                if self.peek() != Some('(') {
                    return Err(self.error(&format!("expected '(' after function name {}", name)));
                }
                let args = self.args()?;
                Ok(ValueTree::Function(name, args))
            }
            Some('(') => self.args().map(ValueTree::Args),
            _ => Err(self.error("expected a placeholder or a function call")),
        }
    }

    fn ident(&mut self) -> String {
        let len = self
            .rest()
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or_else(|| self.rest().len());
        let name = self.rest()[..len].to_string();
        self.pos += len;
        name
    }
}
