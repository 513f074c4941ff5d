//! Terminal presentation of server replies.
//!
//! Structured rendering degrades to printing the raw reply whenever an
//! expected tag is missing; a malformed reply is never an error.

use crate::protocol::{classify, ResponseKind};
use crate::tags;
use crossterm::style::Stylize;
use std::io::{self, Write};

const COMMAND_HEADING: &str = "=== Command Execution Result ===";
const AI_HEADING: &str = "=== AI Response ===";
const SERVER_HEADING: &str = "=== Server Response ===";

/// Printed after every reply.
pub const NEXT_INPUT_PROMPT: &str = "Enter your next message (type '/help' for commands, 'exit' to quit):";

/// Writes replies to an output sink, optionally with terminal styling.
#[derive(Debug, Clone, Copy, Default)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    /// Render one reply and prompt for the next input.
    ///
    /// Tags are matched on a lossy UTF-8 decoding; verbatim branches write
    /// the original bytes.
    pub fn render<W: Write>(&self, raw: &[u8], out: &mut W) -> io::Result<()> {
        let decoded = String::from_utf8_lossy(raw);
        let payload: &str = &decoded;

        match classify(payload) {
            ResponseKind::PlainText | ResponseKind::GenericXml => self.render_raw(raw, out)?,
            ResponseKind::CommandClear | ResponseKind::CommandModelChange => {
                self.heading(out, COMMAND_HEADING)?;
                if let Some(message) = tags::extract(payload, "message") {
                    writeln!(out, "{}", message)?;
                }
            }
            ResponseKind::CommandModels => {
                self.heading(out, COMMAND_HEADING)?;
                self.render_models(payload, out)?;
            }
            ResponseKind::CommandOther => {
                self.heading(out, COMMAND_HEADING)?;
                write_verbatim(out, raw)?;
            }
            ResponseKind::AiReply => {
                match (tags::extract(payload, "model"), tags::extract(payload, "content")) {
                    (Some(model), Some(content)) => {
                        self.heading(out, AI_HEADING)?;
                        let label = format!("[Model: {}]", model);
                        if self.color {
                            writeln!(out, "{}", label.dark_grey())?;
                        } else {
                            writeln!(out, "{}", label)?;
                        }
                        writeln!(out, "{}", content)?;
                    }
                    _ => self.render_raw(raw, out)?,
                }
            }
        }

        writeln!(out)?;
        writeln!(out, "{}", NEXT_INPUT_PROMPT)?;
        out.flush()
    }

    fn render_models<W: Write>(&self, payload: &str, out: &mut W) -> io::Result<()> {
        if let Some(current) = tags::extract(payload, "current_model") {
            writeln!(out, "Current model: {}", current)?;
        }

        if let Some(block) = tags::span(payload, "available_models").filter(|b| !b.is_empty()) {
            writeln!(out, "Available models:")?;
            for entry in tags::entries(block, "model").filter(|e| !e.is_empty()) {
                writeln!(out, "  - {}", tags::trim(entry))?;
            }
        }

        if let Some(message) = tags::extract(payload, "message") {
            writeln!(out, "{}", message)?;
        }
        Ok(())
    }

    fn render_raw<W: Write>(&self, raw: &[u8], out: &mut W) -> io::Result<()> {
        self.heading(out, SERVER_HEADING)?;
        write_verbatim(out, raw)
    }

    fn heading<W: Write>(&self, out: &mut W, title: &str) -> io::Result<()> {
        writeln!(out)?;
        if self.color {
            writeln!(out, "{}", title.cyan().bold())
        } else {
            writeln!(out, "{}", title)
        }
    }
}

/// Write the reply bytes unchanged, followed by a newline.
fn write_verbatim<W: Write>(out: &mut W, raw: &[u8]) -> io::Result<()> {
    out.write_all(raw)?;
    writeln!(out)
}
