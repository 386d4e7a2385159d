//! Dependency Descriptors
//!
//! A formula is reduced to an ordered list of [`Dependency`] descriptors
//! before it is wired into the graph. The descriptors are deliberately
//! coarse: they name tags, never specific bots, so any bot carrying a
//! matching tag is treated as a potential input.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// A single reference extracted from a formula.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "snake_case")]
pub enum Dependency {
    /// Reads the tag `name` on any bot.
    Tag(String),

    /// Selects the bots that carry the tag `name`.
    /// Invalidated exactly like [`Dependency::Tag`].
    Bot(String),

    /// Reads the computed value of the tag `name`.
    TagValue(String),

    /// Reads the formula's own bot. Never produces an edge.
    This,

    /// The target cannot be resolved statically, so every mutation
    /// invalidates the formula.
    All,
}

impl Dependency {
    /// The tag name this descriptor is keyed on in the reverse index, if any.
    pub fn tag(&self) -> Option<&str> {
        match self {
            Dependency::Tag(name) | Dependency::Bot(name) | Dependency::TagValue(name) => {
                Some(name)
            }
            Dependency::This | Dependency::All => None,
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dependency::Tag(name) => write!(f, "tag({name})"),
            Dependency::Bot(name) => write!(f, "bot({name})"),
            Dependency::TagValue(name) => write!(f, "tag_value({name})"),
            Dependency::This => f.write_str("this"),
            Dependency::All => f.write_str("all"),
        }
    }
}

/// Descriptors of one formula, in source order.
pub type Dependencies = SmallVec<[Dependency; 4]>;

/// Turns formula source into dependency descriptors.
///
/// Implementations must be stateless: the same source always yields the
/// same descriptors.
pub trait DependencyExtractor {
    /// Extract the descriptors from a formula's source (without the `=`).
    fn extract(&self, source: &str) -> Dependencies;
}

impl<F> DependencyExtractor for F
where
    F: Fn(&str) -> Dependencies,
{
    fn extract(&self, source: &str) -> Dependencies {
        self(source)
    }
}

/// Functions that select bots by a tag filter in their first argument.
const BOT_SELECTORS: &[&str] = &["getBots", "getBot", "byTag"];

/// Functions that read tag values by name.
const TAG_READERS: &[&str] = &["getBotTagValues"];

/// Members of a selector result that are never tags.
const RESULT_PROPERTIES: &[&str] = &["length"];

/// Lightweight token-level extractor for the host formula language.
///
/// It recognises the library calls that select bots or read tags, `this`
/// and the `tags` shorthand. Anything it cannot resolve to a literal tag
/// name becomes [`Dependency::All`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FormulaDependencyExtractor;

impl DependencyExtractor for FormulaDependencyExtractor {
    fn extract(&self, source: &str) -> Dependencies {
        let tokens = tokenize(source);
        let mut deps = Dependencies::new();
        // Descriptors owed at a call's closing paren, keyed by its index, so
        // anything nested in the call's arguments comes first.
        let mut deferred: Vec<(usize, Dependency)> = Vec::new();

        let mut i = 0;
        while i < tokens.len() {
            while let Some(pos) = deferred.iter().position(|(close, _)| *close == i) {
                deps.push(deferred.remove(pos).1);
            }

            let Token::Ident(ident) = &tokens[i] else {
                i += 1;
                continue;
            };
            let after_dot = i > 0 && tokens[i - 1] == Token::Dot;
            if after_dot {
                i += 1;
                continue;
            }

            match ident.as_str() {
                "this" => {
                    deps.push(Dependency::This);
                    i = skip_member_chain(&tokens, i + 1);
                    continue;
                }
                "tags" => {
                    if let Some((name, next)) = member_name(&tokens, i + 1) {
                        deps.push(Dependency::TagValue(name));
                        i = next;
                        continue;
                    }
                }
                name if tokens.get(i + 1) == Some(&Token::LParen) => {
                    let (args, close) = call_arguments(&tokens, i + 1);
                    if BOT_SELECTORS.contains(&name) {
                        match args.first().and_then(|arg| literal(arg)) {
                            Some(filter) => deps.push(Dependency::Bot(filter.to_owned())),
                            None => deps.push(Dependency::All),
                        }
                        if let Some(member) = result_member(&tokens, close) {
                            deferred.push((close, Dependency::Tag(member)));
                        }
                    } else if TAG_READERS.contains(&name) {
                        match args.first().and_then(|arg| literal(arg)) {
                            Some(tag) => deps.push(Dependency::Tag(tag.to_owned())),
                            None => deps.push(Dependency::All),
                        }
                    } else if name == "getTag" {
                        deferred.extend(get_tag(&args).into_iter().map(|dep| (close, dep)));
                    }
                }
                _ => {}
            }
            i += 1;
        }

        // An unterminated call still owes its descriptors.
        deps.extend(deferred.into_iter().map(|(_, dep)| dep));
        deps
    }
}

/// `getTag(bot, 'a', 'b')` reads each literal tag after the bot argument.
fn get_tag(args: &[&[Token]]) -> Dependencies {
    let mut deps = Dependencies::new();
    if args.len() < 2 {
        deps.push(Dependency::All);
        return deps;
    }
    for arg in &args[1..] {
        match literal(arg) {
            Some(tag) => deps.push(Dependency::Tag(tag.to_owned())),
            None => {
                deps.push(Dependency::All);
                break;
            }
        }
    }
    deps
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Dot,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Other,
}

fn tokenize(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '.' => tokens.push(Token::Dot),
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            '[' => tokens.push(Token::LBracket),
            ']' => tokens.push(Token::RBracket),
            ',' => tokens.push(Token::Comma),
            '\'' | '"' | '`' => {
                let mut value = String::new();
                while let Some(next) = chars.next() {
                    match next {
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                value.push(escaped);
                            }
                        }
                        q if q == c => break,
                        other => value.push(other),
                    }
                }
                tokens.push(Token::Str(value));
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let mut ident = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_alphanumeric() || next == '_' || next == '$' {
                        ident.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            c if c.is_ascii_digit() => {
                while chars.peek().is_some_and(|n| n.is_ascii_alphanumeric() || *n == '.') {
                    chars.next();
                }
                tokens.push(Token::Other);
            }
            _ => tokens.push(Token::Other),
        }
    }

    tokens
}

/// Split the arguments of a call whose `(` is at `open`.
///
/// Returns the top-level argument token slices and the index of the
/// matching `)` (or the last token if the call is unterminated).
fn call_arguments(tokens: &[Token], open: usize) -> (Vec<&[Token]>, usize) {
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut start = open + 1;

    for (offset, token) in tokens[open..].iter().enumerate() {
        let index = open + offset;
        match token {
            Token::LParen | Token::LBracket => depth += 1,
            Token::RParen | Token::RBracket => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    if index > start {
                        args.push(&tokens[start..index]);
                    }
                    return (args, index);
                }
            }
            Token::Comma if depth == 1 => {
                args.push(&tokens[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }

    if tokens.len() > start {
        args.push(&tokens[start..]);
    }
    (args, tokens.len().saturating_sub(1))
}

/// An argument that is exactly one string literal.
fn literal(arg: &[Token]) -> Option<&str> {
    match arg {
        [Token::Str(value)] => Some(value),
        _ => None,
    }
}

/// `.name` or `["name"]` starting at `at`. Returns the name and the index
/// after the access.
fn member_name(tokens: &[Token], at: usize) -> Option<(String, usize)> {
    match tokens.get(at..at + 2) {
        Some([Token::Dot, Token::Ident(name)]) => Some((name.clone(), at + 2)),
        _ => match tokens.get(at..at + 3) {
            Some([Token::LBracket, Token::Str(name), Token::RBracket]) => {
                Some((name.clone(), at + 3))
            }
            _ => None,
        },
    }
}

/// The tag read off a bot-selecting call result, e.g. `getBots('a').b` or
/// `getBot('a').tags.b`. Method calls such as `.map(...)` are not reads.
fn result_member(tokens: &[Token], close: usize) -> Option<String> {
    let (name, next) = member_name(tokens, close + 1)?;
    let (name, next, via_tags) = match member_name(tokens, next) {
        Some((inner, after)) if name == "tags" || name == "raw" => (inner, after, true),
        _ => (name, next, false),
    };
    if tokens.get(next) == Some(&Token::LParen) {
        return None;
    }
    if !via_tags && RESULT_PROPERTIES.contains(&name.as_str()) {
        return None;
    }
    Some(name)
}

fn skip_member_chain(tokens: &[Token], mut at: usize) -> usize {
    while let Some((_, next)) = member_name(tokens, at) {
        at = next;
    }
    at
}
