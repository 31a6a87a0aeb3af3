use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};

const WIDTH: usize = 80;

/// ANSI color codes
pub struct Color;

impl Color {
    pub const RESET: &'static str = "\x1b[0m";
    pub const BOLD: &'static str = "\x1b[1m";
    pub const DIM: &'static str = "\x1b[2m";
    pub const ITALIC: &'static str = "\x1b[3m";
    pub const STRIKETHROUGH: &'static str = "\x1b[9m";
    pub const RED: &'static str = "\x1b[31m";
    pub const GREEN: &'static str = "\x1b[32m";
    pub const YELLOW: &'static str = "\x1b[33m";
    pub const BLUE: &'static str = "\x1b[34m";
    pub const CYAN: &'static str = "\x1b[36m";
}

/// Wrap `text` in `color` when colors are enabled
pub fn paint(text: &str, color: &str, use_color: bool) -> String {
    if use_color {
        format!("{}{}{}", color, text, Color::RESET)
    } else {
        text.to_string()
    }
}

/// Render a Markdown answer for the terminal.
///
/// Without colors the output stays close to the Markdown source (`#`
/// headings, `>` quotes, fenced code), just re-wrapped.
pub fn render_markdown(markdown: &str, use_color: bool) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let mut renderer = Renderer::new(use_color);
    for event in Parser::new_ext(markdown, options) {
        renderer.event(event);
    }
    renderer.finish()
}

struct ListState {
    next_number: Option<u64>,
}

struct Renderer {
    use_color: bool,
    lines: Vec<String>,
    current: String,
    /// Active inline styles, re-applied after each nested reset
    styles: Vec<&'static str>,
    lists: Vec<ListState>,
    /// Bullet for the first line of the current list item
    pending_bullet: Option<String>,
    quote_depth: usize,
    code_block: Option<String>,
    link_dest: Option<String>,
    table: Vec<Vec<String>>,
    table_head_rows: usize,
    in_table: bool,
}

impl Renderer {
    fn new(use_color: bool) -> Self {
        Self {
            use_color,
            lines: Vec::new(),
            current: String::new(),
            styles: Vec::new(),
            lists: Vec::new(),
            pending_bullet: None,
            quote_depth: 0,
            code_block: None,
            link_dest: None,
            table: Vec::new(),
            table_head_rows: 0,
            in_table: false,
        }
    }

    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => {
                if let Some(code) = self.code_block.as_mut() {
                    code.push_str(&text);
                } else {
                    self.current.push_str(&text);
                }
            }
            Event::Code(code) => {
                let styled = self.styled(&code, Color::CYAN);
                self.current.push_str(&styled);
            }
            Event::SoftBreak => self.current.push(' '),
            Event::HardBreak => self.flush_line(),
            Event::Rule => {
                self.flush_block();
                let rule = "\u{2500}".repeat(40);
                let rule = paint(&rule, Color::DIM, self.use_color);
                self.push_line(rule);
                self.blank_line();
            }
            Event::TaskListMarker(checked) => {
                self.current.push_str(if checked { "[x] " } else { "[ ] " });
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Heading { .. } => self.flush_block(),
            Tag::BlockQuote => {
                self.flush_block();
                self.quote_depth += 1;
            }
            Tag::CodeBlock(kind) => {
                self.flush_block();
                let lang = match kind {
                    CodeBlockKind::Fenced(lang) => lang.to_string(),
                    CodeBlockKind::Indented => String::new(),
                };
                let fence = paint(&format!("```{}", lang), Color::CYAN, self.use_color);
                self.push_line(fence);
                self.code_block = Some(String::new());
            }
            Tag::List(start) => {
                // Text of the parent item goes before its nested list
                self.flush_line();
                if self.lists.is_empty() {
                    self.flush_block();
                }
                self.lists.push(ListState { next_number: start });
            }
            Tag::Item => {
                self.flush_line();
                let bullet = match self.lists.last_mut().and_then(|l| l.next_number.as_mut()) {
                    Some(n) => {
                        let bullet = format!("{}. ", n);
                        *n += 1;
                        bullet
                    }
                    None => "\u{2022} ".to_string(),
                };
                self.pending_bullet = Some(bullet);
            }
            Tag::Emphasis => self.push_style(Color::ITALIC),
            Tag::Strong => self.push_style(Color::BOLD),
            Tag::Strikethrough => self.push_style(Color::STRIKETHROUGH),
            Tag::Link { dest_url, .. } => {
                self.push_style(Color::BLUE);
                self.link_dest = Some(dest_url.to_string());
            }
            Tag::Image { dest_url, .. } => {
                self.current.push_str("[Image: ");
                self.link_dest = Some(dest_url.to_string());
            }
            Tag::Table(_) => {
                self.flush_block();
                self.in_table = true;
                self.table.clear();
                self.table_head_rows = 0;
            }
            Tag::TableHead | Tag::TableRow => self.table.push(Vec::new()),
            Tag::TableCell => self.current.clear(),
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                if self.lists.is_empty() {
                    self.flush_block();
                } else {
                    self.flush_line();
                }
            }
            TagEnd::Heading(level) => {
                let hashes = "#".repeat(heading_depth(level));
                let text = std::mem::take(&mut self.current);
                let line = if self.use_color {
                    format!("{}{}{}", Color::BOLD, text.trim(), Color::RESET)
                } else {
                    format!("{} {}", hashes, text.trim())
                };
                self.push_line(line);
                self.blank_line();
            }
            TagEnd::BlockQuote => {
                self.flush_block();
                self.quote_depth = self.quote_depth.saturating_sub(1);
            }
            TagEnd::CodeBlock => {
                let code = self.code_block.take().unwrap_or_default();
                for line in code.trim_end_matches('\n').lines() {
                    let line = paint(line, Color::CYAN, self.use_color);
                    self.push_line(line);
                }
                let fence = paint("```", Color::CYAN, self.use_color);
                self.push_line(fence);
                self.blank_line();
            }
            TagEnd::List(_) => {
                self.flush_line();
                self.lists.pop();
                if self.lists.is_empty() {
                    self.blank_line();
                }
            }
            TagEnd::Item => {
                self.flush_line();
                self.pending_bullet = None;
            }
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough => self.pop_style(),
            TagEnd::Link => {
                self.pop_style();
                if let Some(dest) = self.link_dest.take() {
                    if !dest.is_empty() && !self.current.ends_with(&dest) {
                        let url = format!(" <{}>", dest);
                        let url = self.styled(&url, Color::DIM);
                        self.current.push_str(&url);
                    }
                }
            }
            TagEnd::Image => {
                let dest = self.link_dest.take().unwrap_or_default();
                if self.current.ends_with("[Image: ") {
                    self.current.push_str(&dest);
                }
                self.current.push(']');
            }
            TagEnd::TableCell => {
                let cell = std::mem::take(&mut self.current);
                if let Some(row) = self.table.last_mut() {
                    row.push(cell.trim().to_string());
                }
            }
            TagEnd::TableHead => self.table_head_rows = self.table.len(),
            TagEnd::Table => {
                self.in_table = false;
                self.render_table();
                self.blank_line();
            }
            _ => {}
        }
    }

    fn push_style(&mut self, style: &'static str) {
        self.styles.push(style);
        if self.use_color {
            self.current.push_str(style);
        }
    }

    fn pop_style(&mut self) {
        self.styles.pop();
        if self.use_color {
            self.current.push_str(Color::RESET);
            for style in &self.styles {
                self.current.push_str(style);
            }
        }
    }

    /// `text` in `color`, restoring the surrounding inline styles after
    fn styled(&self, text: &str, color: &str) -> String {
        if !self.use_color {
            return text.to_string();
        }
        let mut out = format!("{}{}{}", color, text, Color::RESET);
        for style in &self.styles {
            out.push_str(style);
        }
        out
    }

    fn quote_prefix(&self) -> String {
        let bar = if self.use_color {
            format!("{}\u{2502}{} ", Color::DIM, Color::RESET)
        } else {
            "> ".to_string()
        };
        bar.repeat(self.quote_depth)
    }

    fn list_indent(&self) -> String {
        "  ".repeat(self.lists.len().saturating_sub(1))
    }

    fn push_line(&mut self, line: String) {
        let prefix = self.quote_prefix();
        self.lines.push(format!("{}{}", prefix, line));
    }

    fn blank_line(&mut self) {
        if self.lines.last().map_or(false, |l| !l.is_empty()) {
            self.lines.push(String::new());
        }
    }

    /// Emit the inline buffer as wrapped lines, without a trailing blank
    fn flush_line(&mut self) {
        if self.in_table {
            return;
        }
        let text = std::mem::take(&mut self.current);
        if text.trim().is_empty() {
            return;
        }

        let indent = format!("{}{}", self.quote_prefix(), self.list_indent());
        let bullet = self.pending_bullet.take();
        // Continuation lines line up under the item text
        let hanging = bullet.as_ref().map(|b| " ".repeat(visible_width(b))).unwrap_or_default();

        let wrapped = wrap_lines(text.trim(), &format!("{}{}", indent, hanging), WIDTH);
        for (i, line) in wrapped.into_iter().enumerate() {
            match (&bullet, i) {
                (Some(b), 0) => {
                    let body = &line[indent.len() + hanging.len()..];
                    self.lines.push(format!("{}{}{}", indent, b, body));
                }
                _ => self.lines.push(line),
            }
        }
    }

    fn flush_block(&mut self) {
        self.flush_line();
        self.blank_line();
    }

    fn render_table(&mut self) {
        let rows = std::mem::take(&mut self.table);
        if rows.is_empty() {
            return;
        }

        let mut widths: Vec<usize> = Vec::new();
        for row in &rows {
            for (i, cell) in row.iter().enumerate() {
                let w = visible_width(cell).max(3);
                if i >= widths.len() {
                    widths.push(w);
                } else {
                    widths[i] = widths[i].max(w);
                }
            }
        }

        for (row_idx, row) in rows.iter().enumerate() {
            let parts: Vec<String> = widths
                .iter()
                .enumerate()
                .map(|(i, w)| {
                    let cell = row.get(i).map(String::as_str).unwrap_or("");
                    let pad = w.saturating_sub(visible_width(cell));
                    format!("{}{}", cell, " ".repeat(pad))
                })
                .collect();
            self.push_line(format!("\u{2502} {} \u{2502}", parts.join(" \u{2502} ")));

            if row_idx + 1 == self.table_head_rows {
                let sep: Vec<String> = widths.iter().map(|w| "\u{2500}".repeat(*w)).collect();
                self.push_line(format!(
                    "\u{251c}\u{2500}{}\u{2500}\u{2524}",
                    sep.join("\u{2500}\u{253c}\u{2500}")
                ));
            }
        }
    }

    fn finish(mut self) -> String {
        self.flush_line();
        while self.lines.last().map_or(false, |l| l.is_empty()) {
            self.lines.pop();
        }
        self.lines.join("\n")
    }
}

fn heading_depth(level: HeadingLevel) -> usize {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Width on screen: characters, not counting ANSI escape sequences
pub fn visible_width(text: &str) -> usize {
    let mut width = 0;
    let mut in_escape = false;
    for ch in text.chars() {
        if in_escape {
            if ch.is_ascii_alphabetic() {
                in_escape = false;
            }
        } else if ch == '\x1b' {
            in_escape = true;
        } else {
            width += 1;
        }
    }
    width
}

/// Simple word-wrapping for terminal output
pub fn wrap_lines(text: &str, prefix: &str, max_width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let effective_width = max_width.saturating_sub(visible_width(prefix)).max(20);

    for line in text.lines() {
        if visible_width(line) <= effective_width {
            lines.push(format!("{}{}", prefix, line));
        } else {
            let mut current_line = String::new();
            let mut current_width = 0;
            for word in line.split_whitespace() {
                let word_width = visible_width(word);
                if current_line.is_empty() {
                    current_line = word.to_string();
                    current_width = word_width;
                } else if current_width + 1 + word_width <= effective_width {
                    current_line.push(' ');
                    current_line.push_str(word);
                    current_width += 1 + word_width;
                } else {
                    lines.push(format!("{}{}", prefix, current_line));
                    current_line = word.to_string();
                    current_width = word_width;
                }
            }
            if !current_line.is_empty() {
                lines.push(format!("{}{}", prefix, current_line));
            }
        }
    }

    lines
}
