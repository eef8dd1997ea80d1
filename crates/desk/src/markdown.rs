use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const ITALIC: &str = "\x1b[3m";
const STRIKE: &str = "\x1b[9m";
const RESET: &str = "\x1b[0m";

/// Renders a bot reply one source line at a time, so completed lines can be printed
/// while the rest of the reply is still streaming.
#[derive(Debug, Default)]
pub struct LineRenderer {
    ansi: bool,
    in_fence: bool,
}

impl LineRenderer {
    pub fn new(ansi: bool) -> Self {
        Self {
            ansi,
            in_fence: false,
        }
    }

    pub fn render_line(&mut self, line: &str) -> String {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            self.in_fence = !self.in_fence;
            return String::new();
        }

        if self.in_fence {
            let code = format!("    {line}");
            return if self.ansi {
                format!("{DIM}{code}{RESET}")
            } else {
                code
            };
        }

        // Parsed without leading whitespace so nested items never turn into code blocks.
        let depth = (line.len() - trimmed.len()) / 2;
        let mut writer = InlineWriter::new(self.ansi);
        writer.out.push_str(&"  ".repeat(depth));

        let options = Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;
        for event in Parser::new_ext(trimmed, options) {
            writer.event(event);
        }
        writer.out
    }
}

struct InlineWriter {
    out: String,
    ansi: bool,
    styles: Vec<&'static str>,
    lists: Vec<Option<u64>>,
    links: Vec<(usize, String)>,
}

impl InlineWriter {
    fn new(ansi: bool) -> Self {
        Self {
            out: String::new(),
            ansi,
            styles: Vec::new(),
            lists: Vec::new(),
            links: Vec::new(),
        }
    }

    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) | Event::Html(text) | Event::InlineHtml(text) => {
                self.out.push_str(&text)
            }
            Event::Code(code) => {
                self.out.push('`');
                self.out.push_str(&code);
                self.out.push('`');
            }
            Event::SoftBreak | Event::HardBreak => self.out.push(' '),
            Event::Rule => self.out.push_str(&"─".repeat(24)),
            Event::TaskListMarker(done) => self.out.push_str(if done { "[x] " } else { "[ ] " }),
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Heading { .. } | Tag::Strong => self.push_style(BOLD),
            Tag::Emphasis => self.push_style(ITALIC),
            Tag::Strikethrough => self.push_style(STRIKE),
            Tag::BlockQuote(_) => self.out.push_str("│ "),
            Tag::List(start) => self.lists.push(start),
            Tag::Item => match self.lists.last_mut() {
                Some(Some(number)) => {
                    self.out.push_str(&format!("{number}. "));
                    *number += 1;
                }
                _ => self.out.push_str("• "),
            },
            Tag::Link { dest_url, .. } => self.links.push((self.out.len(), dest_url.to_string())),
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Heading(_) | TagEnd::Strong | TagEnd::Emphasis | TagEnd::Strikethrough => {
                self.pop_style()
            }
            TagEnd::List(_) => {
                self.lists.pop();
            }
            TagEnd::Link => {
                if let Some((start, url)) = self.links.pop()
                    && self.out.get(start..).is_some_and(|label| label != url)
                {
                    self.out.push_str(&format!(" ({url})"));
                }
            }
            _ => {}
        }
    }

    fn push_style(&mut self, code: &'static str) {
        self.styles.push(code);
        if self.ansi {
            self.out.push_str(code);
        }
    }

    fn pop_style(&mut self) {
        self.styles.pop();
        if self.ansi {
            self.out.push_str(RESET);
            for code in &self.styles {
                self.out.push_str(code);
            }
        }
    }
}
