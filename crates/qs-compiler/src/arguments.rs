use std::sync::OnceLock;

use qs_core::{ChainPart, CompiledArgument, ScriptQueueError, TagChain};
use regex::Regex;

/// One whitespace-delimited token of a command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub(crate) raw: String,
    pub(crate) value: String,
    pub(crate) quoted: bool,
}

impl Token {
    pub(crate) fn is_bare(&self, symbol: &str) -> bool {
        !self.quoted && self.raw == symbol
    }
}

fn prefix_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]*$").expect("prefix regex must compile")
    })
}

fn is_quote(ch: char) -> bool {
    ch == '"' || ch == '\''
}

/// `<` opens a tag unless it reads as a comparison operator.
fn opens_tag(chars: &[char], index: usize) -> bool {
    match chars.get(index + 1) {
        None => false,
        Some(next) => !next.is_whitespace() && *next != '=' && *next != '<',
    }
}

/// Inside a tag, ` > ` and `>=` are operators rather than the closing bracket.
fn closes_tag(chars: &[char], index: usize) -> bool {
    let before = index.checked_sub(1).and_then(|i| chars.get(i));
    let after = chars.get(index + 1);
    let spaced_operator = matches!(before, Some(ch) if ch.is_whitespace())
        && matches!(after, Some(ch) if ch.is_whitespace());
    !spaced_operator && after != Some(&'=')
}

fn is_inner_operator(chars: &[char], index: usize) -> bool {
    chars[index] == '<' && !opens_tag(chars, index)
}

pub(crate) fn tokenize(text: &str) -> Result<Vec<Token>, ScriptQueueError> {
    let chars = text.chars().collect::<Vec<_>>();
    let mut tokens = Vec::new();
    let mut index = 0usize;

    while index < chars.len() {
        if chars[index].is_whitespace() {
            index += 1;
            continue;
        }

        let start = index;
        let mut value = String::new();
        let mut quote: Option<char> = None;
        let mut whole_quoted = is_quote(chars[index]);
        let mut tag_depth = 0usize;
        let mut tag_string: Option<char> = None;

        while index < chars.len() {
            let ch = chars[index];
            if tag_depth > 0 {
                if let Some(open) = tag_string {
                    if ch == open {
                        tag_string = None;
                    }
                } else if is_quote(ch) {
                    tag_string = Some(ch);
                } else if ch == '<' && !is_inner_operator(&chars, index) {
                    tag_depth += 1;
                } else if ch == '>' && closes_tag(&chars, index) {
                    tag_depth -= 1;
                }
                value.push(ch);
                index += 1;
                continue;
            }

            if let Some(open) = quote {
                if ch == open {
                    quote = None;
                    index += 1;
                    continue;
                }
            } else if is_quote(ch) {
                quote = Some(ch);
                index += 1;
                continue;
            } else if ch.is_whitespace() {
                break;
            }

            if ch == '<' && opens_tag(&chars, index) {
                tag_depth += 1;
            }
            value.push(ch);
            index += 1;
        }

        if quote.is_some() {
            return Err(ScriptQueueError::new(
                "COMPILE_UNCLOSED_QUOTE",
                format!("Unclosed quote in \"{}\".", text),
            ));
        }
        if tag_depth > 0 {
            return Err(ScriptQueueError::new(
                "COMPILE_UNCLOSED_TAG",
                format!("Unclosed tag in \"{}\".", text),
            ));
        }

        let raw = chars[start..index].iter().collect::<String>();
        if whole_quoted {
            let first = chars[start];
            whole_quoted = raw.len() >= 2 && raw.ends_with(first);
        }
        tokens.push(Token {
            raw,
            value,
            quoted: whole_quoted,
        });
    }

    Ok(tokens)
}

/// Splits argument text into literal and `<tag>` parts; only outermost tags
/// become parts, nested ones stay inside the tag body.
pub(crate) fn build_chain(value: &str) -> TagChain {
    let chars = value.chars().collect::<Vec<_>>();
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut index = 0usize;

    while index < chars.len() {
        if chars[index] == '<' && opens_tag(&chars, index) {
            if let Some(end) = find_tag_end(&chars, index) {
                if !text.is_empty() {
                    parts.push(ChainPart::Text(std::mem::take(&mut text)));
                }
                parts.push(ChainPart::Tag(chars[index + 1..end].iter().collect()));
                index = end + 1;
                continue;
            }
        }
        text.push(chars[index]);
        index += 1;
    }

    if !text.is_empty() || parts.is_empty() {
        parts.push(ChainPart::Text(text));
    }
    TagChain { parts }
}

fn find_tag_end(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut string: Option<char> = None;
    for index in open..chars.len() {
        let ch = chars[index];
        if let Some(quote) = string {
            if ch == quote {
                string = None;
            }
            continue;
        }
        if depth > 0 && is_quote(ch) {
            string = Some(ch);
        } else if ch == '<' && (index == open || !is_inner_operator(chars, index)) {
            depth += 1;
        } else if ch == '>' && closes_tag(chars, index) {
            depth -= 1;
            if depth == 0 {
                return Some(index);
            }
        }
    }
    None
}

/// Splits `prefix:value` unless the whole token was quoted or the colon sits
/// inside a tag.
pub(crate) fn compile_argument(token: &Token) -> CompiledArgument {
    if !token.quoted {
        if let Some(colon) = find_top_level_colon(&token.value) {
            let prefix = &token.value[..colon];
            let rest = &token.value[colon + 1..];
            if prefix_regex().is_match(prefix) && !rest.starts_with("//") {
                return CompiledArgument {
                    prefix: Some(prefix.to_ascii_lowercase()),
                    raw: token.raw.clone(),
                    chain: build_chain(rest),
                };
            }
        }
    }
    CompiledArgument {
        prefix: None,
        raw: token.raw.clone(),
        chain: build_chain(&token.value),
    }
}

fn find_top_level_colon(value: &str) -> Option<usize> {
    let chars = value.char_indices().collect::<Vec<_>>();
    let plain = chars.iter().map(|(_, ch)| *ch).collect::<Vec<_>>();
    let mut index = 0usize;
    while index < plain.len() {
        match plain[index] {
            ':' => return Some(chars[index].0),
            '<' if opens_tag(&plain, index) => {
                index = find_tag_end(&plain, index)? + 1;
                continue;
            }
            _ => {}
        }
        index += 1;
    }
    None
}
