use std::fs;
use std::io::{self, Write};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{Datelike, Utc};
use clap::{Parser, Subcommand};
use crossterm::cursor;
use crossterm::event;
use crossterm::style::{Attribute, Print, SetAttribute};
use crossterm::terminal::{self, Clear, ClearType};
use directories::ProjectDirs;
use serde::Deserialize;
use termcomic_core::{
    load_reader, ChapterKey, ChapterOption, Comic, Command as ReaderCommand, LibraryProvider,
    NavigationTarget, Outcome, ReaderError, ReaderRequest, ReaderSession, ReaderView, TeamMember,
};
use termcomic_data::{library_source, team_source, DEFAULT_LIBRARY_SPEC, DEFAULT_TEAM_SPEC};
use termcomic_tty::{truncate_with_ellipsis, EventMapper, InputMode, TtyView, UiEvent};
use tracing::{debug, error};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};
use url::Url;

#[derive(Debug, Parser)]
#[command(name = "termcomic", version, about = "terminal reader for a comic catalog")]
struct Args {
    /// Path or URL of the comics collection (overrides the config file)
    #[arg(long = "data", global = true)]
    data: Option<String>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Open the chapter reader
    Read {
        /// Comic id as it appears in the collection
        #[arg(long = "comic")]
        comic: Option<String>,

        /// Chapter number as displayed in links
        #[arg(long = "chapter")]
        chapter: Option<String>,

        /// Deep link of the form reader.html?comicId=<id>&chapter=<n>
        #[arg(long = "link", conflicts_with_all = ["comic", "chapter"])]
        link: Option<String>,
    },
    /// Show comic metadata and the chapter listing
    Details {
        /// Comic id as it appears in the collection
        comic: String,
    },
    /// List the comics in the collection
    List,
    /// Show the team roster
    Team {
        /// Path or URL of the team directory
        #[arg(long = "team-dir")]
        team_dir: Option<String>,
    },
}

#[derive(Debug, Default, Deserialize)]
struct Config {
    data: Option<String>,
    team: Option<String>,
}

impl Config {
    fn load(project_dirs: &ProjectDirs) -> Result<Self> {
        let path = project_dirs.config_dir().join("config.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {:?}", path))?;
        toml::from_str(&raw).with_context(|| format!("failed to parse {:?}", path))
    }
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, cursor::Show);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let project_dirs = ProjectDirs::from("net", "termcomic", "termcomic")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let interactive = matches!(args.command, CliCommand::Read { .. });
    let _log_guard = init_logging(&project_dirs, interactive)?;
    let config = Config::load(&project_dirs)?;

    let data_spec = args
        .data
        .or_else(|| config.data.clone())
        .unwrap_or_else(|| DEFAULT_LIBRARY_SPEC.to_owned());

    match args.command {
        CliCommand::Read {
            comic,
            chapter,
            link,
        } => run_reader(&data_spec, comic, chapter, link).await,
        CliCommand::Details { comic } => run_details(&data_spec, &comic).await,
        CliCommand::List => run_list(&data_spec).await,
        CliCommand::Team { team_dir } => {
            let team_spec = team_dir
                .or(config.team)
                .unwrap_or_else(|| DEFAULT_TEAM_SPEC.to_owned());
            run_team(&team_spec).await
        }
    }
}

async fn run_reader(
    data_spec: &str,
    comic: Option<String>,
    chapter: Option<String>,
    link: Option<String>,
) -> Result<()> {
    let request = match link {
        Some(link) => parse_link(&link)?,
        None => ReaderRequest {
            comic_id: comic,
            chapter: chapter.map(ChapterKey::new),
        },
    };

    let provider = library_source(data_spec);
    let mut view = TtyView::new();
    view.set_year(Utc::now().year());

    // The first load runs before raw mode so a terminal error state prints
    // as a plain message instead of a blank alternate screen.
    let mut session = match load_reader(provider.as_ref(), &request, &mut view).await {
        Ok(session) => session,
        Err(err) => {
            println!("{}", err.user_message());
            return Ok(());
        }
    };

    let _raw = RawModeGuard::new()?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, cursor::Hide)?;

    let mut mapper = EventMapper::new();
    let mut picker: Option<ChapterPicker> = None;
    let mut failed = false;
    let mut exit_message: Option<&'static str> = None;
    let mut dirty = true;

    loop {
        if dirty {
            let (cols, rows) = terminal::size()?;
            view.draw(&mut stdout, cols, rows)?;
            if let Some(picker) = picker.as_mut() {
                draw_picker_overlay(&mut stdout, picker, cols, rows)?;
            }
            stdout.flush()?;
            dirty = false;
        }

        if !event::poll(Duration::from_millis(100))? {
            continue;
        }
        let ui_event = mapper.map_event(event::read()?);
        if failed && !matches!(ui_event, UiEvent::Quit) {
            continue;
        }

        match ui_event {
            UiEvent::Command(command) => match session.apply(command) {
                Outcome::Navigate(target) => {
                    match reload(provider.as_ref(), &target, &mut view).await {
                        Ok(next) => session = next,
                        Err(err) => {
                            failed = true;
                            exit_message = Some(err.user_message());
                        }
                    }
                    dirty = true;
                }
                Outcome::Blocked(direction) => {
                    debug!(?direction, "navigation blocked at chapter boundary");
                }
                Outcome::Idle => {}
            },
            UiEvent::OpenChapterPicker => {
                picker = Some(ChapterPicker::new(
                    view.options().to_vec(),
                    view.selected_index(),
                ));
                mapper.set_mode(InputMode::Picker);
                dirty = true;
            }
            UiEvent::CloseOverlay => {
                picker = None;
                mapper.set_mode(InputMode::Normal);
                dirty = true;
            }
            UiEvent::PickerMoveSelection { delta } => {
                if let Some(picker) = picker.as_mut() {
                    if picker.move_selection(delta) {
                        dirty = true;
                    }
                }
            }
            UiEvent::PickerActivateSelection => {
                let key = picker
                    .as_ref()
                    .and_then(|picker| picker.selected_option())
                    .map(|option| option.value.clone());
                picker = None;
                mapper.set_mode(InputMode::Normal);
                dirty = true;
                if let Some(key) = key {
                    match session.apply(ReaderCommand::GotoChapter { key }) {
                        Outcome::Navigate(target) => {
                            match reload(provider.as_ref(), &target, &mut view).await {
                                Ok(next) => session = next,
                                Err(err) => {
                                    failed = true;
                                    exit_message = Some(err.user_message());
                                }
                            }
                        }
                        Outcome::Blocked(_) | Outcome::Idle => {}
                    }
                }
            }
            UiEvent::Quit => break,
            UiEvent::None => {}
        }
    }

    crossterm::execute!(stdout, Clear(ClearType::All), cursor::MoveTo(0, 0))?;
    drop(_raw);
    if let Some(message) = exit_message {
        println!("{message}");
    }
    Ok(())
}

/// Navigation repeats the whole load cycle; the session that comes back is
/// resolved from a fresh fetch, never patched in place.
async fn reload(
    provider: &dyn LibraryProvider,
    target: &NavigationTarget,
    view: &mut TtyView,
) -> Result<ReaderSession, ReaderError> {
    debug!(link = %target.link(), "navigating");
    load_reader(provider, &target.request(), view).await
}

/// Accepts the deep links the site hands out, with or without a host part.
fn parse_link(link: &str) -> Result<ReaderRequest> {
    let url = Url::parse(link)
        .or_else(|_| Url::parse("http://localhost/").and_then(|base| base.join(link)))
        .with_context(|| format!("not a valid reader link: {link}"))?;

    let mut request = ReaderRequest::default();
    for (name, value) in url.query_pairs() {
        match name.as_ref() {
            "comicId" => request.comic_id = Some(value.into_owned()),
            "chapter" => request.chapter = Some(ChapterKey::new(value.as_ref())),
            _ => {}
        }
    }
    Ok(request)
}

struct ChapterPicker {
    options: Vec<ChapterOption>,
    selected: usize,
    scroll_offset: usize,
}

impl ChapterPicker {
    fn new(options: Vec<ChapterOption>, selected: usize) -> Self {
        let selected = if options.is_empty() {
            0
        } else {
            selected.min(options.len() - 1)
        };
        Self {
            options,
            selected,
            scroll_offset: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    fn selected_option(&self) -> Option<&ChapterOption> {
        self.options.get(self.selected)
    }

    fn move_selection(&mut self, delta: isize) -> bool {
        if self.options.is_empty() {
            return false;
        }
        let len = self.options.len() as isize;
        let next = (self.selected as isize + delta).clamp(0, len - 1) as usize;
        if next != self.selected {
            self.selected = next;
            true
        } else {
            false
        }
    }

    fn ensure_visible(&mut self, viewport_height: usize) {
        if viewport_height == 0 || self.options.is_empty() {
            self.scroll_offset = 0;
            return;
        }
        let max_offset = self.options.len().saturating_sub(viewport_height);
        if self.scroll_offset > max_offset {
            self.scroll_offset = max_offset;
        }
        if self.selected < self.scroll_offset {
            self.scroll_offset = self.selected;
            return;
        }
        let bottom = self.scroll_offset + viewport_height;
        if self.selected >= bottom {
            self.scroll_offset = self.selected.saturating_sub(viewport_height - 1);
        }
    }
}

fn draw_picker_overlay<W: Write>(
    writer: &mut W,
    picker: &mut ChapterPicker,
    cols: u16,
    rows: u16,
) -> Result<()> {
    const TITLE: &str = "Chapters";
    const EMPTY_MESSAGE: &str = "No chapters available yet.";

    let total_cols = usize::from(cols);
    let total_rows = usize::from(rows);
    if total_cols < 24 || total_rows < 6 {
        return Ok(());
    }

    let max_inner_width = total_cols - 6;
    let base_width = if picker.is_empty() {
        EMPTY_MESSAGE.len() + 2
    } else {
        picker
            .options
            .iter()
            .map(|option| option.label.chars().count() + 4)
            .max()
            .unwrap_or(0)
            .max(TITLE.len())
    };
    let inner_width = base_width.clamp(TITLE.len() + 2, max_inner_width);

    let max_content_height = total_rows.saturating_sub(4);
    let total_entries = if picker.is_empty() {
        1
    } else {
        picker.options.len()
    };
    let content_height = total_entries.min(max_content_height).max(1);
    picker.ensure_visible(content_height);

    let window_width = inner_width + 2;
    let window_height = content_height + 3;
    let start_col = ((total_cols - window_width) / 2) as u16;
    let start_row = ((total_rows - window_height) / 2) as u16;

    let horizontal_border = "-".repeat(inner_width);
    let mut current_row = start_row;

    print_inverted(writer, start_col, current_row, &format!("+{horizontal_border}+"))?;
    current_row += 1;
    print_inverted(
        writer,
        start_col,
        current_row,
        &format!("|{TITLE:^width$}|", width = inner_width),
    )?;
    current_row += 1;

    if picker.is_empty() {
        let content = pad_cell(EMPTY_MESSAGE, inner_width);
        print_inverted(writer, start_col, current_row, &format!("|{content}|"))?;
        current_row += 1;
    } else {
        let start_index = picker.scroll_offset;
        let end_index = (start_index + content_height).min(picker.options.len());
        for index in start_index..end_index {
            let option = &picker.options[index];
            let marker = if index == picker.selected { '>' } else { ' ' };
            let content = pad_cell(&format!("{marker} {}", option.label), inner_width);
            print_inverted(writer, start_col, current_row, &format!("|{content}|"))?;
            current_row += 1;
        }
    }

    print_inverted(writer, start_col, current_row, &format!("+{horizontal_border}+"))?;
    Ok(())
}

fn pad_cell(text: &str, width: usize) -> String {
    let mut cell = truncate_with_ellipsis(text.to_owned(), width);
    let len = cell.chars().count();
    if len < width {
        cell.push_str(&" ".repeat(width - len));
    }
    cell
}

fn print_inverted<W: Write>(writer: &mut W, col: u16, row: u16, content: &str) -> Result<()> {
    crossterm::queue!(
        writer,
        cursor::MoveTo(col, row),
        SetAttribute(Attribute::Reverse),
        Print(content),
        SetAttribute(Attribute::Reset)
    )?;
    Ok(())
}

async fn run_details(data_spec: &str, comic_id: &str) -> Result<()> {
    let provider = library_source(data_spec);
    let library = match provider.load().await {
        Ok(library) => library,
        Err(err) => {
            error!(error = ?err, "failed to fetch comics collection");
            println!("Failed to load comic data. Please try again later.");
            return Ok(());
        }
    };

    match library.comic(comic_id) {
        Some(comic) => print_details(comic),
        None => println!("Comic not found"),
    }
    Ok(())
}

fn print_details(comic: &Comic) {
    println!("{}", comic.title);
    println!("  Author: {}", comic.display_author());
    println!("  Artist: {}", comic.display_artist());
    println!("  Release Year: {}", comic.display_release_year());
    println!("  Status: {}", comic.display_status());
    if !comic.genres.is_empty() {
        println!("  Genres: {}", comic.genres.join(", "));
    }
    println!();
    println!("Synopsis");
    println!("  {}", comic.display_description());
    println!();

    if comic.chapters.is_empty() {
        println!("No chapters available yet.");
        return;
    }

    println!("Chapters");
    for chapter in comic.chapters_newest_first() {
        println!(
            "  Chapter {:<8} {:<40} {}",
            chapter.number,
            chapter.title,
            format_release_date(chapter.release_date.as_deref())
        );
    }
}

/// Release dates come through as free-form strings; anything unparseable
/// falls back the way the site does.
fn format_release_date(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return "Unknown Date".to_owned();
    };
    if let Ok(date) = chrono::DateTime::parse_from_rfc3339(raw) {
        return date.format("%b %-d, %Y").to_string();
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.format("%b %-d, %Y").to_string();
    }
    "Unknown Date".to_owned()
}

async fn run_list(data_spec: &str) -> Result<()> {
    let provider = library_source(data_spec);
    let library = match provider.load().await {
        Ok(library) => library,
        Err(err) => {
            error!(error = ?err, "failed to fetch comics collection");
            println!("Failed to load comic data. Please try again later.");
            return Ok(());
        }
    };

    if library.comics().is_empty() {
        println!("No comics found");
        return Ok(());
    }
    for comic in library.comics() {
        let latest = comic
            .latest_chapter()
            .map(|chapter| format!("latest: Chapter {}", chapter.number))
            .unwrap_or_else(|| "no chapters".to_owned());
        println!(
            "{:<16} {:<32} {:<10} {:>3} chapters  {}",
            comic.id,
            comic.title,
            comic.display_status(),
            comic.chapters.len(),
            latest
        );
    }
    Ok(())
}

async fn run_team(team_spec: &str) -> Result<()> {
    let provider = team_source(team_spec);
    let roster = match provider.load().await {
        Ok(roster) => roster,
        Err(err) => {
            error!(error = ?err, "failed to fetch team roster");
            println!("Failed to load team members");
            return Ok(());
        }
    };

    if roster.is_empty() {
        println!("No team members found");
        return Ok(());
    }

    for member in roster.priority_members() {
        print_member(member);
    }
    let others = roster.other_members();
    if !others.is_empty() {
        println!();
        println!("More ({})", others.len());
        for member in others {
            print_member(member);
        }
    }
    Ok(())
}

fn print_member(member: &TeamMember) {
    let socials: Vec<String> = member
        .social
        .iter()
        .map(|(platform, link)| format!("{platform}: {link}"))
        .collect();
    if socials.is_empty() {
        println!("  {} — {}", member.display_name(), member.display_role());
    } else {
        println!(
            "  {} — {} ({})",
            member.display_name(),
            member.display_role(),
            socials.join("  ")
        );
    }
}

fn init_logging(project_dirs: &ProjectDirs, interactive: bool) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "termcomic.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);
    let registry = tracing_subscriber::registry().with(env_filter).with(file_layer);

    // The interactive reader owns the terminal; console logging would tear
    // the screen, so it only comes up for the plain subcommands.
    if interactive {
        registry.try_init().map_err(|err| anyhow!(err))?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .try_init()
            .map_err(|err| anyhow!(err))?;
    }

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn parse_link_extracts_both_parameters() {
        let request = parse_link("reader.html?comicId=alv-01&chapter=10").unwrap();
        assert_eq!(request.comic_id.as_deref(), Some("alv-01"));
        assert_eq!(request.chapter, Some(ChapterKey::new("10")));
    }

    #[test]
    fn parse_link_accepts_absolute_links() {
        let request =
            parse_link("https://example.net/reader.html?comicId=alv-01&chapter=2").unwrap();
        assert_eq!(request.comic_id.as_deref(), Some("alv-01"));
        assert_eq!(request.chapter, Some(ChapterKey::new("2")));
    }

    #[test]
    fn parse_link_with_missing_parameters_yields_incomplete_request() {
        let request = parse_link("reader.html?comicId=alv-01").unwrap();
        assert!(request.comic_id.is_some());
        assert!(request.chapter.is_none());
        assert!(!request.is_complete());
    }

    #[test]
    fn release_dates_fall_back_when_unparseable() {
        assert_eq!(format_release_date(None), "Unknown Date");
        assert_eq!(format_release_date(Some("soon")), "Unknown Date");
        assert_eq!(format_release_date(Some("2024-03-05")), "Mar 5, 2024");
        assert_eq!(
            format_release_date(Some("2024-03-05T12:00:00Z")),
            "Mar 5, 2024"
        );
    }

    #[test]
    fn picker_selection_clamps_at_the_ends() {
        let option = |number: &str| ChapterOption {
            value: ChapterKey::new(number),
            label: format!("Chapter {number}: "),
        };
        let mut picker = ChapterPicker::new(vec![option("1"), option("2"), option("3")], 1);

        assert!(picker.move_selection(-1));
        assert!(!picker.move_selection(-1));
        assert_eq!(picker.selected_option().unwrap().value, ChapterKey::new("1"));

        assert!(picker.move_selection(10));
        assert_eq!(picker.selected_option().unwrap().value, ChapterKey::new("3"));
    }

    #[test]
    fn picker_scrolls_to_keep_the_selection_visible() {
        let options: Vec<ChapterOption> = (1..=10)
            .map(|number| ChapterOption {
                value: ChapterKey::new(number.to_string()),
                label: format!("Chapter {number}: "),
            })
            .collect();
        let mut picker = ChapterPicker::new(options, 9);

        picker.ensure_visible(4);
        assert_eq!(picker.scroll_offset, 6);

        picker.move_selection(-9);
        picker.ensure_visible(4);
        assert_eq!(picker.scroll_offset, 0);
    }
}
