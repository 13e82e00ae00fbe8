//! Output rendering for streamed replies.
//!
//! This module provides the renderer trait that receives each fragment as it arrives, and a
//! plain-text implementation that writes to the terminal.

use std::io::{self, Stdout, Write};

use crate::interrupt::Interrupt;

/// ANSI escape code for dim text (used for informational messages).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for the assistant label).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// Trait for rendering streaming output.
///
/// This abstraction allows for different rendering strategies:
/// - Plain text with ANSI styling
/// - Plain text without styling (for piping/redirecting)
/// - Capturing fragments in memory (for tests)
pub trait Renderer: Send {
    /// Called before the first fragment of a reply.
    fn start_response(&mut self) {}

    /// Print a chunk of response text.
    ///
    /// This is called incrementally as fragments are streamed from the endpoint.
    fn print_text(&mut self, text: &str);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Called when a reply is complete.
    ///
    /// Used to ensure proper newlines after streaming.
    fn finish_response(&mut self);

    /// Called when the stream is interrupted by the user.
    fn print_interrupted(&mut self) {}

    /// The interrupt that abandons a reply in progress, if this renderer has one.
    fn interrupt(&self) -> Option<Interrupt> {
        None
    }
}

/// Plain text renderer with optional ANSI styling.
pub struct PlainTextRenderer {
    stdout: Stdout,
    use_color: bool,
    line_start: bool,
    interrupt: Option<Interrupt>,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
            line_start: true,
            interrupt: None,
        }
    }

    /// Attaches an interrupt to the renderer.
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    /// Flushes stdout to ensure immediate display of streamed content.
    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }

    fn write(&mut self, text: &str) {
        let _ = self.stdout.write_all(text.as_bytes());
        if let Some(last) = text.chars().last() {
            self.line_start = last == '\n';
        }
        self.flush();
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn start_response(&mut self) {
        if self.use_color {
            self.write(&format!("{ANSI_CYAN}Assistant:{ANSI_RESET} "));
        } else {
            self.write("Assistant: ");
        }
    }

    fn print_text(&mut self, text: &str) {
        self.write(text);
    }

    fn print_error(&mut self, error: &str) {
        if !self.line_start {
            self.write("\n");
        }
        if self.use_color {
            eprintln!("{ANSI_RED}Error: {error}{ANSI_RESET}");
        } else {
            eprintln!("Error: {error}");
        }
    }

    fn print_info(&mut self, info: &str) {
        if !self.line_start {
            self.write("\n");
        }
        if self.use_color {
            self.write(&format!("{ANSI_DIM}{info}{ANSI_RESET}\n"));
        } else {
            self.write(&format!("{info}\n"));
        }
    }

    fn finish_response(&mut self) {
        self.write("\n");
    }

    fn print_interrupted(&mut self) {
        self.write("\n[interrupted]\n");
    }

    fn interrupt(&self) -> Option<Interrupt> {
        self.interrupt.clone()
    }
}
