use std::io::{self, Write};
use std::mem;

use chrono::Local;

use crate::chat::{ChatSnapshot, Message, MessageId, Sender};
use crate::content::{CONTACT_CARD, QUICK_ACTIONS, TYPING_INDICATOR};
use crate::markdown::LineRenderer;

const ERASE_LINE: &str = "\r\x1b[2K";
const EPOCH_RULE: &str = "----------------------------------------";

/// Prints only what changed between consecutive snapshots.
///
/// Bot replies go through markdown one completed line at a time. On a terminal the
/// unfinished line of a streaming reply is shown live and redrawn as chunks arrive.
#[derive(Debug, Default)]
pub struct TranscriptPrinter {
    epoch: u64,
    printed: usize,
    open: Option<OpenReply>,
    show_timestamps: bool,
    ansi: bool,
}

impl TranscriptPrinter {
    pub fn new(show_timestamps: bool, ansi: bool) -> Self {
        Self {
            show_timestamps,
            ansi,
            ..Self::default()
        }
    }

    pub fn render(&mut self, snapshot: &ChatSnapshot, out: &mut impl Write) -> io::Result<()> {
        if snapshot.epoch != self.epoch {
            if let Some(mut reply) = self.open.take() {
                reply.close(out)?;
            }
            writeln!(out, "{EPOCH_RULE}")?;
            self.epoch = snapshot.epoch;
            self.printed = 0;
        }

        if let Some(mut reply) = self.open.take() {
            match snapshot.messages.iter().find(|message| message.id == reply.id) {
                Some(message) => {
                    reply.advance(&message.text, !message.is_pending(), out)?;
                    if message.is_pending() {
                        self.open = Some(reply);
                    }
                }
                None => reply.close(out)?,
            }
        }

        for message in snapshot.messages.iter().skip(self.printed) {
            self.printed += 1;
            let prefix = self.prefix(message);
            if message.sender == Sender::Bot && !message.is_error {
                let mut reply = OpenReply::new(message.id, prefix, self.ansi);
                reply.advance(&message.text, !message.is_pending(), out)?;
                if message.is_pending() {
                    self.open = Some(reply);
                }
            } else {
                writeln!(out, "{prefix}{}", message.text)?;
            }
        }

        if snapshot.awaiting_first_chunk()
            && let Some(reply) = self.open.as_mut()
        {
            reply.show_indicator(out)?;
        }

        out.flush()
    }

    fn prefix(&self, message: &Message) -> String {
        let author = match (message.sender, message.is_error) {
            (Sender::User, _) => "Bạn",
            (Sender::Bot, false) => "Bot",
            (Sender::Bot, true) => "Bot [lỗi]",
        };

        if self.show_timestamps {
            let local = message.timestamp.with_timezone(&Local);
            format!("[{}] {author}: ", local.format("%H:%M"))
        } else {
            format!("{author}: ")
        }
    }
}

/// Bot reply whose lines are still being printed.
#[derive(Debug)]
struct OpenReply {
    id: MessageId,
    prefix: String,
    markdown: LineRenderer,
    ansi: bool,
    // Bytes already printed as complete lines.
    consumed: usize,
    seen: usize,
    tail: String,
    started: bool,
    // A redrawable line (partial text or indicator) is on screen.
    live: bool,
    indicator: bool,
}

impl OpenReply {
    fn new(id: MessageId, prefix: String, ansi: bool) -> Self {
        Self {
            id,
            prefix,
            markdown: LineRenderer::new(ansi),
            ansi,
            consumed: 0,
            seen: 0,
            tail: String::new(),
            started: false,
            live: false,
            indicator: false,
        }
    }

    fn advance(&mut self, text: &str, finished: bool, out: &mut impl Write) -> io::Result<()> {
        if !finished && text.len() == self.seen {
            return Ok(());
        }
        self.seen = text.len();
        self.clear_live(out)?;

        let mut rest = text.get(self.consumed..).unwrap_or_default();
        while let Some((line, remainder)) = rest.split_once('\n') {
            self.write_line(line, out)?;
            self.consumed += line.len() + 1;
            rest = remainder;
        }

        if finished {
            if !rest.is_empty() || !self.started {
                self.write_line(rest, out)?;
            }
        } else if self.ansi && !rest.is_empty() {
            if !self.started {
                out.write_all(self.prefix.as_bytes())?;
            }
            out.write_all(rest.as_bytes())?;
            self.live = true;
        }
        self.tail = rest.to_string();
        Ok(())
    }

    /// Prints whatever is left of a reply that vanished from the transcript.
    fn close(&mut self, out: &mut impl Write) -> io::Result<()> {
        self.clear_live(out)?;
        let tail = mem::take(&mut self.tail);
        if !tail.is_empty() || !self.started {
            self.write_line(&tail, out)?;
        }
        Ok(())
    }

    fn show_indicator(&mut self, out: &mut impl Write) -> io::Result<()> {
        if self.ansi {
            if !self.live {
                write!(out, "{}{TYPING_INDICATOR}", self.prefix)?;
                self.live = true;
            }
        } else if !self.indicator {
            writeln!(out, "({TYPING_INDICATOR})")?;
            self.indicator = true;
        }
        Ok(())
    }

    fn write_line(&mut self, line: &str, out: &mut impl Write) -> io::Result<()> {
        let rendered = self.markdown.render_line(line);
        if !self.started {
            out.write_all(self.prefix.as_bytes())?;
            self.started = true;
        }
        writeln!(out, "{rendered}")
    }

    fn clear_live(&mut self, out: &mut impl Write) -> io::Result<()> {
        if self.live {
            out.write_all(ERASE_LINE.as_bytes())?;
            self.live = false;
        }
        Ok(())
    }
}

pub fn render_quick_actions(out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "Câu hỏi nhanh:")?;
    for (index, action) in QUICK_ACTIONS.iter().enumerate() {
        writeln!(out, "  /{} {}", index + 1, action.label)?;
    }
    Ok(())
}

pub fn render_contact_card(out: &mut impl Write) -> io::Result<()> {
    let card = &CONTACT_CARD;
    writeln!(out, "{}", card.company)?;
    writeln!(out, "  Hotline: {}", card.hotline)?;
    writeln!(out, "  Email:   {}", card.email)?;
    for hours in card.hours {
        writeln!(out, "  {hours}")?;
    }
    for office in &card.offices {
        writeln!(out, "  {}", office.name)?;
        writeln!(out, "    {}", office.address)?;
        if let Some(phone) = office.phone {
            writeln!(out, "    ĐT: {phone}")?;
        }
    }
    Ok(())
}

pub fn render_help(out: &mut impl Write) -> io::Result<()> {
    writeln!(
        out,
        "Lệnh: /1../{} câu hỏi nhanh, /stop dừng trả lời, /reset làm mới, /contact liên hệ, /quit thoát",
        QUICK_ACTIONS.len()
    )
}
