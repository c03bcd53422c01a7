use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use anyhow::Result;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use serde_with::serde_as;
use thiserror::Error;
use tracing::{error, instrument};

pub const NO_PAGES_MESSAGE: &str = "No pages available for this chapter.";
pub const MISSING_REQUEST_MESSAGE: &str =
    "Comic ID or chapter number not specified. Use --comic <ID> --chapter <NUMBER>.";

/// Normalized form of a chapter number.
///
/// Chapter numbers arrive from the collection as either a JSON number or a
/// JSON string. The key is the string form a reader sees in links: numbers
/// render without a trailing fraction (`10`, not `10.0`), strings are kept
/// verbatim apart from surrounding whitespace. Lookup is string equality on
/// this form; listings order keys by their parsed numeric value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChapterKey(String);

impl ChapterKey {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_owned())
    }

    pub fn from_number(value: f64) -> Self {
        if value.fract() == 0.0 && value.abs() < 1e15 {
            Self((value as i64).to_string())
        } else {
            Self(value.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn numeric(&self) -> Option<f64> {
        self.0.parse::<f64>().ok().filter(|value| value.is_finite())
    }

    /// Ordering for chapter listings: parsed numeric value first, keys that
    /// do not parse after every numeric key, ties broken lexically.
    pub fn cmp_numeric(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl fmt::Display for ChapterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ChapterKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct KeyVisitor;

        impl<'de> Visitor<'de> for KeyVisitor {
            type Value = ChapterKey;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a chapter number as a JSON number or string")
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<ChapterKey, E> {
                Ok(ChapterKey(value.to_string()))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<ChapterKey, E> {
                Ok(ChapterKey(value.to_string()))
            }

            fn visit_f64<E: de::Error>(self, value: f64) -> Result<ChapterKey, E> {
                Ok(ChapterKey::from_number(value))
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<ChapterKey, E> {
                Ok(ChapterKey::new(value))
            }
        }

        deserializer.deserialize_any(KeyVisitor)
    }
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comic {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub cover: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde_as(as = "Option<serde_with::PickFirst<(_, serde_with::DisplayFromStr)>>")]
    #[serde(default)]
    pub release_year: Option<u16>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
}

impl Comic {
    /// Index of the chapter whose key equals `key`, within the source
    /// order. Source order is the adjacency used for previous/next.
    pub fn chapter_index(&self, key: &ChapterKey) -> Option<usize> {
        self.chapters.iter().position(|chapter| chapter.number == *key)
    }

    /// Chapters ordered for the details listing: numeric value descending,
    /// newest first.
    pub fn chapters_newest_first(&self) -> Vec<&Chapter> {
        let mut sorted: Vec<&Chapter> = self.chapters.iter().collect();
        sorted.sort_by(|a, b| b.number.cmp_numeric(&a.number));
        sorted
    }

    pub fn latest_chapter(&self) -> Option<&Chapter> {
        self.chapters_newest_first().into_iter().next()
    }

    pub fn display_status(&self) -> &str {
        non_empty(self.status.as_deref()).unwrap_or("Unknown")
    }

    pub fn display_author(&self) -> &str {
        non_empty(self.author.as_deref()).unwrap_or("Unknown")
    }

    pub fn display_artist(&self) -> &str {
        non_empty(self.artist.as_deref()).unwrap_or("Unknown")
    }

    pub fn display_release_year(&self) -> String {
        match self.release_year {
            Some(year) => year.to_string(),
            None => "Unknown".to_owned(),
        }
    }

    pub fn display_description(&self) -> &str {
        non_empty(self.description.as_deref()).unwrap_or("No description available.")
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|text| !text.trim().is_empty())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub number: ChapterKey,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub pages: Vec<String>,
}

impl Chapter {
    /// Label used for both the chapter heading and the selector options.
    pub fn label(&self) -> String {
        format!("Chapter {}: {}", self.number, self.title)
    }
}

/// The fetched comics collection. Constructing a library validates each
/// comic's chapter keys; comic id uniqueness is assumed, not enforced.
#[derive(Debug, Clone, Default)]
pub struct ComicLibrary {
    comics: Vec<Comic>,
}

impl ComicLibrary {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DataError> {
        let comics: Vec<Comic> = serde_json::from_slice(bytes).map_err(DataError::Decode)?;
        Self::from_comics(comics)
    }

    pub fn from_comics(comics: Vec<Comic>) -> Result<Self, DataError> {
        for comic in &comics {
            let mut seen = HashSet::new();
            for chapter in &comic.chapters {
                if !seen.insert(chapter.number.as_str()) {
                    return Err(DataError::DuplicateChapter {
                        comic: comic.id.clone(),
                        number: chapter.number.clone(),
                    });
                }
            }
        }
        Ok(Self { comics })
    }

    pub fn comic(&self, id: &str) -> Option<&Comic> {
        self.comics.iter().find(|comic| comic.id == id)
    }

    pub fn comics(&self) -> &[Comic] {
        &self.comics
    }
}

#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to decode comics collection")]
    Decode(#[source] serde_json::Error),
    #[error("duplicate chapter {number} in comic {comic}")]
    DuplicateChapter { comic: String, number: ChapterKey },
}

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("comic id or chapter number not specified")]
    MissingRequest,
    #[error("failed to load comics collection")]
    Load(#[source] anyhow::Error),
    #[error("no comic with id {0:?}")]
    ComicNotFound(String),
    #[error("no chapter numbered {0}")]
    ChapterNotFound(ChapterKey),
}

impl ReaderError {
    /// Message shown in the page-level content region. Each variant is a
    /// terminal state for the current load.
    pub fn user_message(&self) -> &'static str {
        match self {
            ReaderError::MissingRequest => MISSING_REQUEST_MESSAGE,
            ReaderError::Load(_) => "Error loading chapter details.",
            ReaderError::ComicNotFound(_) => "Comic not found",
            ReaderError::ChapterNotFound(_) => "Chapter not found",
        }
    }
}

/// The two request parameters of a reader load. Both are required; a
/// request with either missing renders an instructional message and
/// performs no fetch.
#[derive(Debug, Clone, Default)]
pub struct ReaderRequest {
    pub comic_id: Option<String>,
    pub chapter: Option<ChapterKey>,
}

impl ReaderRequest {
    pub fn new(comic_id: impl Into<String>, chapter: ChapterKey) -> Self {
        Self {
            comic_id: Some(comic_id.into()),
            chapter: Some(chapter),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.comic_id.is_some() && self.chapter.is_some()
    }
}

/// Where a navigation command leads. The driver turns a target back into a
/// request and repeats the full load cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationTarget {
    pub comic_id: String,
    pub chapter: ChapterKey,
}

impl NavigationTarget {
    pub fn request(&self) -> ReaderRequest {
        ReaderRequest::new(self.comic_id.clone(), self.chapter.clone())
    }

    /// Deep link for the target. Values are emitted verbatim; the
    /// collection is trusted not to contain reserved URL characters.
    pub fn link(&self) -> String {
        format!(
            "reader.html?comicId={}&chapter={}",
            self.comic_id, self.chapter
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    NextChapter,
    PrevChapter,
    GotoChapter { key: ChapterKey },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Prev,
    Next,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Navigate(NavigationTarget),
    Blocked(Direction),
    Idle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSlot {
    pub alt: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterOption {
    pub value: ChapterKey,
    pub label: String,
}

/// Named UI slots owned by the surrounding presentation layer. The reader
/// engine only ever writes into these; it never looks anything up itself,
/// so it can be driven against a recording fake.
pub trait ReaderView {
    fn set_chapter_heading(&mut self, text: &str);
    fn set_position(&mut self, text: &str);
    fn replace_pages(&mut self, pages: Vec<PageSlot>);
    fn show_page_notice(&mut self, text: &str);
    fn set_chapter_options(&mut self, options: Vec<ChapterOption>, selected: usize);
    fn set_nav_enabled(&mut self, prev: bool, next: bool);
    fn set_year(&mut self, year: i32);
    fn replace_content(&mut self, message: &str);
}

#[async_trait::async_trait]
pub trait LibraryProvider: Send + Sync {
    async fn load(&self) -> Result<ComicLibrary>;
}

/// A resolved reader load. The current index is the only piece of session
/// state; everything rendered derives from it and the comic.
#[derive(Debug, Clone)]
pub struct ReaderSession {
    comic: Comic,
    current: usize,
}

impl ReaderSession {
    pub fn resolve(library: &ComicLibrary, request: &ReaderRequest) -> Result<Self, ReaderError> {
        let (comic_id, key) = match (&request.comic_id, &request.chapter) {
            (Some(comic_id), Some(key)) => (comic_id, key),
            _ => return Err(ReaderError::MissingRequest),
        };
        let comic = library
            .comic(comic_id)
            .ok_or_else(|| ReaderError::ComicNotFound(comic_id.clone()))?;
        let current = comic
            .chapter_index(key)
            .ok_or_else(|| ReaderError::ChapterNotFound(key.clone()))?;
        Ok(Self {
            comic: comic.clone(),
            current,
        })
    }

    pub fn comic(&self) -> &Comic {
        &self.comic
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_chapter(&self) -> &Chapter {
        &self.comic.chapters[self.current]
    }

    pub fn chapter_count(&self) -> usize {
        self.comic.chapters.len()
    }

    pub fn at_first(&self) -> bool {
        self.current == 0
    }

    pub fn at_last(&self) -> bool {
        self.current + 1 == self.comic.chapters.len()
    }

    fn target_for(&self, index: usize) -> NavigationTarget {
        NavigationTarget {
            comic_id: self.comic.id.clone(),
            chapter: self.comic.chapters[index].number.clone(),
        }
    }

    /// Applies a navigation command. Boundary-crossing commands are blocked
    /// here rather than merely disabled in the view, so keyboard shortcuts
    /// go through the same guard as the on-screen controls.
    pub fn apply(&self, command: Command) -> Outcome {
        match command {
            Command::NextChapter => {
                if self.at_last() {
                    Outcome::Blocked(Direction::Next)
                } else {
                    Outcome::Navigate(self.target_for(self.current + 1))
                }
            }
            Command::PrevChapter => {
                if self.at_first() {
                    Outcome::Blocked(Direction::Prev)
                } else {
                    Outcome::Navigate(self.target_for(self.current - 1))
                }
            }
            Command::GotoChapter { key } => {
                if self.current_chapter().number == key {
                    Outcome::Idle
                } else {
                    Outcome::Navigate(NavigationTarget {
                        comic_id: self.comic.id.clone(),
                        chapter: key,
                    })
                }
            }
        }
    }

    /// Pure function of (comic, current index): every slot is fully
    /// replaced, never patched.
    pub fn render(&self, view: &mut dyn ReaderView) {
        let chapter = self.current_chapter();
        view.set_chapter_heading(&chapter.label());
        view.set_position(&format!(
            "Chapter {} of {}",
            self.current + 1,
            self.chapter_count()
        ));

        if chapter.pages.is_empty() {
            view.show_page_notice(NO_PAGES_MESSAGE);
        } else {
            let pages = chapter
                .pages
                .iter()
                .enumerate()
                .map(|(index, source)| PageSlot {
                    alt: format!("Page {}", index + 1),
                    source: source.clone(),
                })
                .collect();
            view.replace_pages(pages);
        }

        let options = self
            .comic
            .chapters
            .iter()
            .map(|chapter| ChapterOption {
                value: chapter.number.clone(),
                label: chapter.label(),
            })
            .collect();
        view.set_chapter_options(options, self.current);
        view.set_nav_enabled(!self.at_first(), !self.at_last());
    }
}

/// One full load cycle: fetch the collection, resolve the request, render.
/// Navigation repeats this from scratch, which keeps the reader stateless
/// and every chapter directly linkable. Terminal error states replace the
/// page content and are reported back to the driver.
#[instrument(skip(provider, view))]
pub async fn load_reader<P: LibraryProvider + ?Sized>(
    provider: &P,
    request: &ReaderRequest,
    view: &mut dyn ReaderView,
) -> Result<ReaderSession, ReaderError> {
    if !request.is_complete() {
        let err = ReaderError::MissingRequest;
        view.replace_content(err.user_message());
        return Err(err);
    }

    let library = match provider.load().await {
        Ok(library) => library,
        Err(source) => {
            error!(error = ?source, "failed to fetch comics collection");
            let err = ReaderError::Load(source);
            view.replace_content(err.user_message());
            return Err(err);
        }
    };

    match ReaderSession::resolve(&library, request) {
        Ok(session) => {
            session.render(view);
            Ok(session)
        }
        Err(err) => {
            view.replace_content(err.user_message());
            Err(err)
        }
    }
}

pub const DEFAULT_MEMBER_NAME: &str = "Team Member";
pub const DEFAULT_MEMBER_ROLE: &str = "Contributor";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub priority: bool,
    #[serde(default)]
    pub social: BTreeMap<String, String>,
}

impl TeamMember {
    pub fn display_name(&self) -> &str {
        non_empty(self.name.as_deref()).unwrap_or(DEFAULT_MEMBER_NAME)
    }

    pub fn display_role(&self) -> &str {
        non_empty(self.role.as_deref()).unwrap_or(DEFAULT_MEMBER_ROLE)
    }
}

/// The roster index document: file names of the member documents, fetched
/// one by one.
#[derive(Debug, Clone, Deserialize)]
pub struct TeamIndex {
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TeamRoster {
    members: Vec<TeamMember>,
}

impl TeamRoster {
    pub fn new(members: Vec<TeamMember>) -> Self {
        Self { members }
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Members flagged as priority, in source order. These are shown up
    /// front; the rest sit behind the fold.
    pub fn priority_members(&self) -> Vec<&TeamMember> {
        self.members.iter().filter(|member| member.priority).collect()
    }

    pub fn other_members(&self) -> Vec<&TeamMember> {
        self.members.iter().filter(|member| !member.priority).collect()
    }
}

#[async_trait::async_trait]
pub trait TeamProvider: Send + Sync {
    async fn load(&self) -> Result<TeamRoster>;
}
