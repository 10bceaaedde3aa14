use std::sync::OnceLock;

use qs_core::{ScriptQueueError, SourceSpan};
use regex::Regex;

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptDocument {
    pub nodes: Vec<DocumentNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DocumentNode {
    Section(SectionNode),
    Value(ValueNode),
    Command(CommandLine),
}

/// `key:` followed by an indented (or same-indent list) body.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionNode {
    pub key: String,
    pub children: Vec<DocumentNode>,
    pub location: SourceSpan,
}

/// `key: value` on a single line.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueNode {
    pub key: String,
    pub value: String,
    pub location: SourceSpan,
}

/// `- text`, optionally ending in `:` to own the more-indented lines below.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandLine {
    pub text: String,
    pub opens_block: bool,
    pub children: Vec<DocumentNode>,
    pub location: SourceSpan,
}

#[derive(Debug, Clone)]
struct SourceLine {
    indent: usize,
    content: String,
    number: usize,
}

impl SourceLine {
    fn is_item(&self) -> bool {
        self.content == "-" || self.content.starts_with("- ")
    }

    fn span(&self) -> SourceSpan {
        SourceSpan::line(self.number, self.indent + 1, self.content.chars().count())
    }
}

fn key_value_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9_][A-Za-z0-9_ .\-]*?)\s*:(?:\s+(.*))?$")
            .expect("key/value regex must compile")
    })
}

pub fn parse_script_document(source: &str) -> Result<ScriptDocument, ScriptQueueError> {
    let lines = split_lines(source)?;
    let mut cursor = 0usize;
    let nodes = parse_children(&lines, &mut cursor, None, false)?;
    if let Some(line) = lines.get(cursor) {
        return Err(ScriptQueueError::with_span(
            "PARSE_UNEXPECTED_INDENT",
            format!("Unexpected indentation before \"{}\".", line.content),
            line.span(),
        ));
    }
    Ok(ScriptDocument { nodes })
}

fn split_lines(source: &str) -> Result<Vec<SourceLine>, ScriptQueueError> {
    let mut lines = Vec::new();
    for (index, raw) in source.lines().enumerate() {
        let number = index + 1;
        let trimmed_end = raw.trim_end();
        let content = trimmed_end.trim_start();
        if content.is_empty() || content.starts_with('#') {
            continue;
        }
        let leading = &trimmed_end[..trimmed_end.len() - content.len()];
        if leading.contains('\t') {
            return Err(ScriptQueueError::with_span(
                "PARSE_TAB_INDENT",
                "Tabs are not allowed in indentation.",
                SourceSpan::line(number, 1, leading.len()),
            ));
        }
        lines.push(SourceLine {
            indent: leading.chars().count(),
            content: content.to_string(),
            number,
        });
    }
    Ok(lines)
}

fn parse_children(
    lines: &[SourceLine],
    cursor: &mut usize,
    parent_indent: Option<usize>,
    allow_same_indent_items: bool,
) -> Result<Vec<DocumentNode>, ScriptQueueError> {
    let mut nodes = Vec::new();
    let mut base_indent: Option<usize> = None;

    while let Some(line) = lines.get(*cursor) {
        let belongs = match parent_indent {
            None => true,
            Some(parent) => {
                line.indent > parent
                    || (allow_same_indent_items && line.indent == parent && line.is_item())
            }
        };
        if !belongs {
            break;
        }

        match base_indent {
            None => base_indent = Some(line.indent),
            Some(base) if line.indent < base => break,
            Some(base) if line.indent > base => {
                return Err(ScriptQueueError::with_span(
                    "PARSE_UNEXPECTED_INDENT",
                    format!("Unexpected indentation before \"{}\".", line.content),
                    line.span(),
                ));
            }
            Some(_) => {}
        }

        *cursor += 1;
        nodes.push(parse_line(lines, cursor, line)?);
    }

    Ok(nodes)
}

fn parse_line(
    lines: &[SourceLine],
    cursor: &mut usize,
    line: &SourceLine,
) -> Result<DocumentNode, ScriptQueueError> {
    if line.is_item() {
        let text = line.content[1..].trim();
        if text.is_empty() {
            return Err(ScriptQueueError::with_span(
                "PARSE_EMPTY_COMMAND",
                "List item has no command.",
                line.span(),
            ));
        }
        let opens_block = text.ends_with(':') && !text.ends_with("\\:") && quotes_balanced(text);
        let (text, children) = if opens_block {
            let children = parse_children(lines, cursor, Some(line.indent), false)?;
            (text[..text.len() - 1].trim_end().to_string(), children)
        } else {
            (text.to_string(), Vec::new())
        };
        return Ok(DocumentNode::Command(CommandLine {
            text,
            opens_block,
            children,
            location: line.span(),
        }));
    }

    let Some(captures) = key_value_regex().captures(&line.content) else {
        return Err(ScriptQueueError::with_span(
            "PARSE_INVALID_LINE",
            format!(
                "Expected \"key:\", \"key: value\" or \"- command\", found \"{}\".",
                line.content
            ),
            line.span(),
        ));
    };
    let key = captures[1].trim().to_ascii_lowercase();
    match captures.get(2).map(|value| value.as_str().trim()) {
        Some(value) if !value.is_empty() => Ok(DocumentNode::Value(ValueNode {
            key,
            value: unquote(value),
            location: line.span(),
        })),
        _ => {
            let children = parse_children(lines, cursor, Some(line.indent), true)?;
            Ok(DocumentNode::Section(SectionNode {
                key,
                children,
                location: line.span(),
            }))
        }
    }
}

fn quotes_balanced(text: &str) -> bool {
    text.chars().filter(|ch| *ch == '"').count() % 2 == 0
}

fn unquote(value: &str) -> String {
    let bytes = value.as_bytes();
    if bytes.len() >= 2
        && ((bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\''))
    {
        return value[1..value.len() - 1].to_string();
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section<'a>(nodes: &'a [DocumentNode], key: &str) -> &'a SectionNode {
        nodes
            .iter()
            .find_map(|node| match node {
                DocumentNode::Section(section) if section.key == key => Some(section),
                _ => None,
            })
            .expect("section should exist")
    }

    #[test]
    fn parses_container_with_sections_values_and_nested_commands() {
        let source = r#"
# greeting task
greet:
  type: task
  speed: "instant"
  script:
  - narrate hello
  - if <ok>:
    - narrate yes
    - narrate again
  - else:
    - narrate no
  on complete:
    - narrate done
"#;
        let document = parse_script_document(source).expect("document should parse");
        assert_eq!(document.nodes.len(), 1);
        let greet = section(&document.nodes, "greet");
        assert!(greet.children.iter().any(|node| matches!(
            node,
            DocumentNode::Value(ValueNode { key, value, .. }) if key == "speed" && value == "instant"
        )));

        let script = section(&greet.children, "script");
        assert_eq!(script.children.len(), 3);
        let DocumentNode::Command(if_line) = &script.children[1] else {
            panic!("expected command");
        };
        assert_eq!(if_line.text, "if <ok>");
        assert!(if_line.opens_block);
        assert_eq!(if_line.children.len(), 2);
        assert_eq!(if_line.location.start.line, 8);

        let on_complete = section(&greet.children, "on complete");
        assert_eq!(on_complete.children.len(), 1);
    }

    #[test]
    fn empty_block_is_kept_for_the_compiler_to_reject() {
        let document = parse_script_document("a:\n  script:\n  - if <x>:\n  - narrate after\n")
            .expect("document should parse");
        let script = section(&section(&document.nodes, "a").children, "script");
        let DocumentNode::Command(line) = &script.children[0] else {
            panic!("expected command");
        };
        assert!(line.opens_block);
        assert!(line.children.is_empty());
        assert_eq!(script.children.len(), 2);
    }

    #[test]
    fn rejects_tabs_and_bad_indentation() {
        let tabs = parse_script_document("a:\n\tscript:\n").expect_err("tabs should fail");
        assert_eq!(tabs.code, "PARSE_TAB_INDENT");

        let indent = parse_script_document("a:\n  script:\n  - one\n      - two\n")
            .expect_err("unexpected indent should fail");
        assert_eq!(indent.code, "PARSE_UNEXPECTED_INDENT");
        assert_eq!(indent.line(), Some(4));
    }

    #[test]
    fn rejects_lines_that_are_neither_keys_nor_items() {
        let error = parse_script_document("a:\n  just words\n").expect_err("should fail");
        assert_eq!(error.code, "PARSE_INVALID_LINE");
    }

    #[test]
    fn quoted_colon_does_not_open_block() {
        let document =
            parse_script_document("a:\n  script:\n  - narrate \"note:\n").expect("parse");
        let script = section(&section(&document.nodes, "a").children, "script");
        let DocumentNode::Command(line) = &script.children[0] else {
            panic!("expected command");
        };
        assert!(!line.opens_block);
    }
}
