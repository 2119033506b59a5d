//! Keyboard commands as a bit mask with edge detection.
//!
//! Input arrives as the set of commands whose keys are down during a tick.
//! `EdgeDetector` turns that level signal into presses: a command fires on
//! the tick its bit appears and stays quiet while the key is held, so a
//! held arrow moves the cursor one row, not one row per tick.

use bitflags::bitflags;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::error::Error;
use std::time::Duration;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Command: u16 {
        const UP = 0x001;
        const DOWN = 0x002;
        const LEFT = 0x004;
        const RIGHT = 0x008;
        const PLAY_SFX1 = 0x010;
        const PLAY_SFX2 = 0x020;
        const STOP = 0x040;
        const PLAY = 0x080;
        const TOGGLE_ECHO = 0x100;
        const QUIT = 0x200;
        const TOGGLE_LOADER = 0x400;
    }
}

/// Where a tick's command mask comes from. The driver only ever sees this
/// trait, so a run without a terminal gets a source that reports nothing.
pub trait InputSource {
    /// Commands whose keys are down for the current tick.
    fn sample(&mut self) -> Result<Command, Box<dyn Error>>;
}

/// Turns per-tick command masks into newly-pressed commands.
#[derive(Debug, Default)]
pub struct EdgeDetector {
    previous: Command,
}

impl EdgeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bits set in `current` that were clear on the previous tick.
    pub fn pressed(&mut self, current: Command) -> Command {
        let edges = current & !self.previous;
        self.previous = current;
        edges
    }
}

/// Terminal-backed source. Each pending key event contributes its command
/// bit to the tick's mask; key auto-repeat keeps the bit held across ticks,
/// which the edge detector then ignores.
#[derive(Debug, Default)]
pub struct TerminalInput;

impl TerminalInput {
    pub fn new() -> Self {
        Self
    }
}

impl InputSource for TerminalInput {
    fn sample(&mut self) -> Result<Command, Box<dyn Error>> {
        let mut mask = Command::empty();
        while event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                mask |= decode(key);
            }
        }
        Ok(mask)
    }
}

/// A source with no keys behind it, for runs without an interactive
/// terminal. Never reports a command.
#[derive(Debug, Default)]
pub struct NullInput;

impl InputSource for NullInput {
    fn sample(&mut self) -> Result<Command, Box<dyn Error>> {
        Ok(Command::empty())
    }
}

fn decode(key: KeyEvent) -> Command {
    if key.kind != KeyEventKind::Press {
        return Command::empty();
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Command::QUIT;
    }
    match key.code {
        KeyCode::Up => Command::UP,
        KeyCode::Down => Command::DOWN,
        KeyCode::Left => Command::LEFT,
        KeyCode::Right => Command::RIGHT,
        KeyCode::Enter => Command::PLAY,
        KeyCode::Backspace => Command::STOP,
        KeyCode::Char('1') => Command::PLAY_SFX1,
        KeyCode::Char('2') => Command::PLAY_SFX2,
        KeyCode::Char('e') => Command::TOGGLE_ECHO,
        KeyCode::Char('r') => Command::TOGGLE_LOADER,
        KeyCode::Char('q') | KeyCode::Esc => Command::QUIT,
        _ => Command::empty(),
    }
}
