use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};
use serde_yaml::Value;

use crate::rag::{Metadata, MetadataValue};

/// A note reduced to embeddable plain text plus its frontmatter metadata.
#[derive(Debug, Clone, Default)]
pub struct ParsedNote {
    pub text: String,
    pub metadata: Metadata,
}

/// Parse a Markdown note into plain text and sanitized metadata.
///
/// When the frontmatter carries no `title`, the first heading is used.
pub fn parse_note(markdown: &str) -> ParsedNote {
    let (frontmatter, body) = split_frontmatter(markdown);

    let mut metadata = frontmatter.map(parse_frontmatter).unwrap_or_default();

    let (text, first_heading) = markdown_to_text(body);
    if !metadata.contains_key("title") {
        if let Some(heading) = first_heading {
            metadata.insert("title".to_string(), MetadataValue::Text(heading));
        }
    }

    ParsedNote { text, metadata }
}

/// Split leading `---` delimited frontmatter from the body.
fn split_frontmatter(markdown: &str) -> (Option<&str>, &str) {
    let markdown = markdown.trim_start_matches('\u{feff}');

    // Check if content starts with frontmatter delimiter
    let Some(after_first) = markdown.strip_prefix("---") else {
        return (None, markdown);
    };
    if !(after_first.starts_with('\n') || after_first.starts_with("\r\n")) {
        return (None, markdown);
    }

    // Find the closing delimiter
    if let Some(end_pos) = after_first.find("\n---") {
        let yaml = &after_first[..end_pos];
        let rest = &after_first[end_pos + 4..];
        // Skip the remainder of the closing delimiter line
        let body = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => "",
        };
        return (Some(yaml), body);
    }

    (None, markdown)
}

/// Parse YAML frontmatter, keeping only primitive values.
pub fn parse_frontmatter(yaml: &str) -> Metadata {
    let mut metadata = Metadata::new();

    let value: Value = match serde_yaml::from_str(yaml) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("Ignoring unparseable frontmatter: {}", e);
            return metadata;
        }
    };

    let Value::Mapping(mapping) = value else {
        return metadata;
    };

    for (key, value) in mapping {
        let key = match key {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => continue,
        };
        if let Some(value) = sanitize_value(&value) {
            metadata.insert(key, value);
        }
    }

    metadata
}

/// Flatten a YAML value into a primitive.
///
/// Lists collapse to their first element when that element is a primitive;
/// maps, nulls, empty lists and nested lists are dropped.
fn sanitize_value(value: &Value) -> Option<MetadataValue> {
    match value {
        Value::Sequence(items) => items.first().and_then(primitive_value),
        other => primitive_value(other),
    }
}

fn primitive_value(value: &Value) -> Option<MetadataValue> {
    match value {
        Value::String(s) => Some(MetadataValue::Text(s.clone())),
        Value::Bool(b) => Some(MetadataValue::Bool(*b)),
        Value::Number(n) => n
            .as_i64()
            .map(MetadataValue::Integer)
            .or_else(|| n.as_f64().map(MetadataValue::Float)),
        _ => None,
    }
}

/// Flatten a Markdown body into plain text.
///
/// Blocks are separated by blank lines, list items by single newlines.
/// Returns the text and the first heading, if any.
fn markdown_to_text(markdown: &str) -> (String, Option<String>) {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(markdown, options);

    let mut blocks: Vec<String> = Vec::new();
    let mut current_text = String::new();
    let mut first_heading: Option<String> = None;
    let mut in_code_block = false;
    let mut code_content = String::new();
    // List state
    let mut list_depth = 0usize;
    let mut list_lines: Vec<String> = Vec::new();
    // Table state
    let mut in_table = false;
    let mut table_rows: Vec<String> = Vec::new();
    let mut current_table_row: Vec<String> = Vec::new();
    let mut current_table_cell = String::new();

    for event in parser {
        match event {
            Event::Start(Tag::Heading { .. }) => {
                flush_block(&mut blocks, &mut current_text);
            }
            Event::End(TagEnd::Heading(_)) => {
                let heading = current_text.trim().to_string();
                if first_heading.is_none() && !heading.is_empty() {
                    first_heading = Some(heading);
                }
                flush_block(&mut blocks, &mut current_text);
            }
            Event::End(TagEnd::Paragraph) => {
                if list_depth == 0 {
                    flush_block(&mut blocks, &mut current_text);
                } else {
                    current_text.push(' ');
                }
            }
            Event::Start(Tag::CodeBlock(_)) => {
                flush_block(&mut blocks, &mut current_text);
                in_code_block = true;
            }
            Event::End(TagEnd::CodeBlock) => {
                in_code_block = false;
                let code = code_content.trim_end_matches('\n');
                if !code.trim().is_empty() {
                    blocks.push(code.to_string());
                }
                code_content.clear();
            }
            Event::Start(Tag::List(_)) => {
                if list_depth == 0 {
                    flush_block(&mut blocks, &mut current_text);
                } else {
                    // Text of the parent item precedes its nested list
                    push_list_line(&mut list_lines, &mut current_text, list_depth - 1);
                }
                list_depth += 1;
            }
            Event::End(TagEnd::List(_)) => {
                list_depth = list_depth.saturating_sub(1);
                if list_depth == 0 && !list_lines.is_empty() {
                    blocks.push(list_lines.join("\n"));
                    list_lines.clear();
                }
            }
            Event::Start(Tag::Item) => {
                current_text.clear();
            }
            Event::End(TagEnd::Item) => {
                push_list_line(&mut list_lines, &mut current_text, list_depth.saturating_sub(1));
            }
            Event::TaskListMarker(checked) => {
                current_text.push_str(if checked { "[x] " } else { "[ ] " });
            }
            Event::Start(Tag::BlockQuote) | Event::End(TagEnd::BlockQuote) => {
                flush_block(&mut blocks, &mut current_text);
            }
            Event::Start(Tag::Table(_)) => {
                flush_block(&mut blocks, &mut current_text);
                in_table = true;
                table_rows.clear();
            }
            Event::End(TagEnd::Table) => {
                in_table = false;
                if !table_rows.is_empty() {
                    blocks.push(table_rows.join("\n"));
                }
                table_rows.clear();
            }
            Event::End(TagEnd::TableHead) | Event::End(TagEnd::TableRow) => {
                if !current_table_row.is_empty() {
                    table_rows.push(current_table_row.join(" | "));
                    current_table_row.clear();
                }
            }
            Event::Start(Tag::TableCell) => {
                current_table_cell.clear();
            }
            Event::End(TagEnd::TableCell) => {
                current_table_row.push(current_table_cell.trim().to_string());
                current_table_cell.clear();
            }
            Event::Text(text) | Event::Code(text) => {
                if in_code_block {
                    code_content.push_str(&text);
                } else if in_table {
                    current_table_cell.push_str(&text);
                } else {
                    current_text.push_str(&text);
                }
            }
            Event::SoftBreak => {
                if in_code_block {
                    code_content.push('\n');
                } else {
                    current_text.push(' ');
                }
            }
            Event::HardBreak => {
                if in_code_block {
                    code_content.push('\n');
                } else {
                    current_text.push('\n');
                }
            }
            Event::Rule => {
                flush_block(&mut blocks, &mut current_text);
            }
            // HTML, footnotes and the rest carry no note text
            _ => {}
        }
    }

    flush_block(&mut blocks, &mut current_text);
    if !list_lines.is_empty() {
        blocks.push(list_lines.join("\n"));
    }

    (blocks.join("\n\n"), first_heading)
}

fn flush_block(blocks: &mut Vec<String>, current_text: &mut String) {
    let text = current_text.trim();
    if !text.is_empty() {
        blocks.push(text.to_string());
    }
    current_text.clear();
}

fn push_list_line(lines: &mut Vec<String>, current_text: &mut String, indent: usize) {
    let text = current_text.trim();
    if !text.is_empty() {
        lines.push(format!("{}- {}", "  ".repeat(indent), text));
    }
    current_text.clear();
}
