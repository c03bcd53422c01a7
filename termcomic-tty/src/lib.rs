use std::io::Write;

use anyhow::Result;
use crossterm::{
    cursor,
    event::{Event, KeyCode, KeyEvent, KeyModifiers},
    style::{Attribute, Print, SetAttribute},
    terminal::{Clear, ClearType},
};
use termcomic_core::{ChapterOption, Command, PageSlot, ReaderView};

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Command(Command),
    OpenChapterPicker,
    CloseOverlay,
    PickerMoveSelection { delta: isize },
    PickerActivateSelection,
    Quit,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    Picker,
}

/// Maps raw terminal events onto reader events. Navigation keys produce
/// the same commands as the on-screen controls; the boundary guard lives
/// in the session, not here.
#[derive(Debug, Default)]
pub struct EventMapper {
    mode: InputMode,
}

impl EventMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mode(&mut self, mode: InputMode) {
        self.mode = mode;
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        match self.mode {
            InputMode::Normal => Self::map_event_normal(event),
            InputMode::Picker => Self::map_event_picker(event),
        }
    }

    fn map_event_normal(event: Event) -> UiEvent {
        match event {
            Event::Key(KeyEvent {
                code, modifiers, ..
            }) => match (code, modifiers) {
                (KeyCode::Right, KeyModifiers::NONE)
                | (KeyCode::Char('l'), KeyModifiers::NONE) => {
                    UiEvent::Command(Command::NextChapter)
                }
                (KeyCode::Left, KeyModifiers::NONE) | (KeyCode::Char('h'), KeyModifiers::NONE) => {
                    UiEvent::Command(Command::PrevChapter)
                }
                (KeyCode::Enter, _) | (KeyCode::Char('s'), KeyModifiers::NONE) => {
                    UiEvent::OpenChapterPicker
                }
                (KeyCode::Char('q'), _) | (KeyCode::Esc, _) => UiEvent::Quit,
                _ => UiEvent::None,
            },
            _ => UiEvent::None,
        }
    }

    fn map_event_picker(event: Event) -> UiEvent {
        match event {
            Event::Key(KeyEvent {
                code, modifiers, ..
            }) => match (code, modifiers) {
                (KeyCode::Esc, _) | (KeyCode::Char('s'), KeyModifiers::NONE) => {
                    UiEvent::CloseOverlay
                }
                (KeyCode::Enter, _) => UiEvent::PickerActivateSelection,
                (KeyCode::Down, KeyModifiers::NONE) | (KeyCode::Char('j'), KeyModifiers::NONE) => {
                    UiEvent::PickerMoveSelection { delta: 1 }
                }
                (KeyCode::Up, KeyModifiers::NONE) | (KeyCode::Char('k'), KeyModifiers::NONE) => {
                    UiEvent::PickerMoveSelection { delta: -1 }
                }
                (KeyCode::Char('q'), _) => UiEvent::Quit,
                _ => UiEvent::None,
            },
            _ => UiEvent::None,
        }
    }
}

/// Buffered implementation of the reader's view slots. Slot writes only
/// update the buffer; `draw` paints the whole screen in one pass, so a
/// load that ends in an error state never leaves a half-drawn chapter.
#[derive(Debug, Default)]
pub struct TtyView {
    heading: String,
    position: String,
    pages: Vec<PageSlot>,
    page_notice: Option<String>,
    options: Vec<ChapterOption>,
    selected: usize,
    prev_enabled: bool,
    next_enabled: bool,
    year: Option<i32>,
    content_message: Option<String>,
}

impl TtyView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn options(&self) -> &[ChapterOption] {
        &self.options
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn nav_enabled(&self) -> (bool, bool) {
        (self.prev_enabled, self.next_enabled)
    }

    /// Paints the buffered slots. The caller passes the terminal size so
    /// drawing stays testable against an in-memory writer.
    pub fn draw<W: Write>(&self, writer: &mut W, cols: u16, rows: u16) -> Result<()> {
        crossterm::queue!(writer, Clear(ClearType::All), cursor::MoveTo(0, 0))?;
        let width = cols.max(20) as usize;
        let rows = rows.max(6);

        if let Some(message) = &self.content_message {
            crossterm::queue!(writer, cursor::MoveTo(0, 1), Print(message))?;
            crossterm::queue!(
                writer,
                cursor::MoveTo(0, 3),
                SetAttribute(Attribute::Dim),
                Print("[q] quit"),
                SetAttribute(Attribute::Reset)
            )?;
            writer.flush()?;
            return Ok(());
        }

        let heading = pad_to_width(&self.heading, width);
        crossterm::queue!(
            writer,
            cursor::MoveTo(0, 0),
            SetAttribute(Attribute::Reverse),
            Print(heading),
            SetAttribute(Attribute::Reset)
        )?;
        crossterm::queue!(writer, cursor::MoveTo(0, 1), Print(&self.position))?;

        let page_rows = usize::from(rows.saturating_sub(5));
        let mut row: u16 = 3;
        if let Some(notice) = &self.page_notice {
            crossterm::queue!(writer, cursor::MoveTo(0, row), Print(notice))?;
        } else {
            for slot in self.pages.iter().take(page_rows) {
                let line = truncate_with_ellipsis(
                    format!("{:<10} {}", slot.alt, slot.source),
                    width,
                );
                crossterm::queue!(writer, cursor::MoveTo(0, row), Print(line))?;
                row = row.saturating_add(1);
            }
            if self.pages.len() > page_rows {
                let hidden = self.pages.len() - page_rows;
                crossterm::queue!(
                    writer,
                    cursor::MoveTo(0, row),
                    SetAttribute(Attribute::Dim),
                    Print(format!("... {hidden} more pages")),
                    SetAttribute(Attribute::Reset)
                )?;
            }
        }

        self.draw_footer(writer, rows)?;
        writer.flush()?;
        Ok(())
    }

    fn draw_footer<W: Write>(&self, writer: &mut W, rows: u16) -> Result<()> {
        let footer_row = rows.saturating_sub(1);
        crossterm::queue!(writer, cursor::MoveTo(0, footer_row))?;

        let prev_attr = if self.prev_enabled {
            Attribute::Reset
        } else {
            Attribute::Dim
        };
        let next_attr = if self.next_enabled {
            Attribute::Reset
        } else {
            Attribute::Dim
        };
        crossterm::queue!(
            writer,
            SetAttribute(prev_attr),
            Print("[< prev]"),
            SetAttribute(Attribute::Reset),
            Print(" "),
            SetAttribute(next_attr),
            Print("[next >]"),
            SetAttribute(Attribute::Reset),
            Print("  [s] chapters  [q] quit")
        )?;
        if let Some(year) = self.year {
            crossterm::queue!(
                writer,
                SetAttribute(Attribute::Dim),
                Print(format!("  (c) {year}")),
                SetAttribute(Attribute::Reset)
            )?;
        }
        Ok(())
    }
}

impl ReaderView for TtyView {
    fn set_chapter_heading(&mut self, text: &str) {
        self.heading = text.to_owned();
        self.content_message = None;
    }

    fn set_position(&mut self, text: &str) {
        self.position = text.to_owned();
    }

    fn replace_pages(&mut self, pages: Vec<PageSlot>) {
        self.pages = pages;
        self.page_notice = None;
    }

    fn show_page_notice(&mut self, text: &str) {
        self.pages.clear();
        self.page_notice = Some(text.to_owned());
    }

    fn set_chapter_options(&mut self, options: Vec<ChapterOption>, selected: usize) {
        self.selected = if options.is_empty() {
            0
        } else {
            selected.min(options.len() - 1)
        };
        self.options = options;
    }

    fn set_nav_enabled(&mut self, prev: bool, next: bool) {
        self.prev_enabled = prev;
        self.next_enabled = next;
    }

    fn set_year(&mut self, year: i32) {
        self.year = Some(year);
    }

    fn replace_content(&mut self, message: &str) {
        let year = self.year;
        *self = Self::default();
        self.year = year;
        self.content_message = Some(message.to_owned());
    }
}

pub fn truncate_with_ellipsis(mut text: String, width: usize) -> String {
    if text.chars().count() > width {
        if width <= 3 {
            text = text.chars().take(width).collect();
        } else {
            let mut truncated: String = text.chars().take(width - 3).collect();
            truncated.push_str("...");
            text = truncated;
        }
    }
    text
}

fn pad_to_width(text: &str, width: usize) -> String {
    let mut padded = truncate_with_ellipsis(text.to_owned(), width);
    let len = padded.chars().count();
    if len < width {
        padded.push_str(&" ".repeat(width - len));
    }
    padded
}
