//! Interactive site picker.
//!
//! [`PickerState`] is a pure state machine over [`KeyInput`]; the terminal
//! front end only translates crossterm events and redraws. Orchestrators see
//! neither and ask a [`SiteSelector`] for a site.

use std::io::{self, Stdout, Write};

use async_trait::async_trait;
use crossterm::{
    cursor::{Hide, MoveToPreviousLine, Show},
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    queue,
    style::{Print, Stylize},
    terminal::{self, disable_raw_mode, enable_raw_mode, Clear, ClearType},
};
use tracing::debug;

use crate::api::CellularSite;

const MAX_VISIBLE: usize = 10;

/// Keyboard input the picker reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    Up,
    Down,
    Enter,
    Esc,
    CtrlC,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickOutcome {
    Selected(usize),
    Aborted,
}

/// Cursor over `len` options with a scrolling window of `height` rows.
/// `offset` is the index of the first visible option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickerState {
    offset: usize,
    active: usize,
    len: usize,
    height: usize,
    done: Option<PickOutcome>,
}

impl PickerState {
    pub fn new(len: usize, height: usize) -> Self {
        Self {
            offset: 0,
            active: 0,
            len,
            height: height.max(1),
            // Nothing to choose from.
            done: (len == 0).then_some(PickOutcome::Aborted),
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn active(&self) -> usize {
        self.active
    }

    pub fn done(&self) -> Option<PickOutcome> {
        self.done
    }

    /// Indices of the options currently on screen.
    pub fn visible(&self) -> std::ops::Range<usize> {
        self.offset..(self.offset + self.height).min(self.len)
    }

    pub fn handle_key(&mut self, key: KeyInput) {
        if self.done.is_some() {
            return;
        }
        match key {
            KeyInput::Up => self.active = self.active.saturating_sub(1),
            KeyInput::Down => self.active = (self.active + 1).min(self.len - 1),
            KeyInput::Enter => self.done = Some(PickOutcome::Selected(self.active)),
            KeyInput::Esc | KeyInput::CtrlC => self.done = Some(PickOutcome::Aborted),
        }
        if self.active < self.offset {
            self.offset = self.active;
        } else if self.active >= self.offset + self.height {
            self.offset = self.active + 1 - self.height;
        }
    }
}

/// Chooses the site the measurement is taken at. `Ok(None)` means the user
/// chose nothing.
#[async_trait]
pub trait SiteSelector: Send + Sync {
    async fn pick(&self, sites: Vec<CellularSite>) -> io::Result<Option<CellularSite>>;
}

/// Picks the site whose name matches, ignoring case.
#[derive(Debug, Clone)]
pub struct NamedSiteSelector {
    name: String,
}

impl NamedSiteSelector {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl SiteSelector for NamedSiteSelector {
    async fn pick(&self, sites: Vec<CellularSite>) -> io::Result<Option<CellularSite>> {
        Ok(sites
            .into_iter()
            .find(|site| site.name.eq_ignore_ascii_case(&self.name)))
    }
}

/// Arrow-key picker on the controlling terminal.
#[derive(Debug, Clone)]
pub struct TerminalSelector {
    title: String,
}

impl TerminalSelector {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }
}

#[async_trait]
impl SiteSelector for TerminalSelector {
    async fn pick(&self, sites: Vec<CellularSite>) -> io::Result<Option<CellularSite>> {
        let title = self.title.clone();
        tokio::task::spawn_blocking(move || run_terminal_picker(&title, sites))
            .await
            .map_err(io::Error::other)?
    }
}

fn convert_key(key: KeyEvent) -> Option<KeyInput> {
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(KeyInput::CtrlC)
        }
        KeyCode::Up | KeyCode::Char('k') => Some(KeyInput::Up),
        KeyCode::Down | KeyCode::Char('j') => Some(KeyInput::Down),
        KeyCode::Enter => Some(KeyInput::Enter),
        KeyCode::Esc | KeyCode::Char('q') => Some(KeyInput::Esc),
        _ => None,
    }
}

/// Leaves raw mode and restores the cursor however the picker exits.
struct RawModeGuard;

impl RawModeGuard {
    fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = crossterm::execute!(io::stdout(), Show);
    }
}

fn draw(
    out: &mut Stdout,
    state: &PickerState,
    sites: &[CellularSite],
    redraw: bool,
) -> io::Result<()> {
    let rows = state.visible();
    if redraw {
        queue!(out, MoveToPreviousLine(rows.len() as u16))?;
    }
    for idx in rows {
        let label = sites[idx].to_string();
        queue!(out, Clear(ClearType::CurrentLine))?;
        if idx == state.active() {
            queue!(out, Print(" ● ".green()), Print(label))?;
        } else {
            queue!(out, Print(" ○ ".dark_grey()), Print(label.dark_grey()))?;
        }
        queue!(out, Print("\r\n"))?;
    }
    out.flush()
}

fn run_terminal_picker(title: &str, sites: Vec<CellularSite>) -> io::Result<Option<CellularSite>> {
    let (_, term_rows) = terminal::size().unwrap_or((80, 24));
    let height = usize::from(term_rows.saturating_sub(2)).clamp(1, MAX_VISIBLE);
    let mut state = PickerState::new(sites.len(), height);
    if state.done().is_some() {
        return Ok(None);
    }

    let mut out = io::stdout();
    let _guard = RawModeGuard::enter()?;
    queue!(out, Hide, Print(title), Print("\r\n"))?;
    draw(&mut out, &state, &sites, false)?;

    while state.done().is_none() {
        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            if let Some(input) = convert_key(key) {
                state.handle_key(input);
                draw(&mut out, &state, &sites, true)?;
            }
        }
    }

    match state.done() {
        Some(PickOutcome::Selected(idx)) => {
            debug!(site = %sites[idx].name, "site picked");
            Ok(sites.into_iter().nth(idx))
        }
        _ => Ok(None),
    }
}
