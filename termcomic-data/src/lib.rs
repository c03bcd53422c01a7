use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use termcomic_core::{
    ComicLibrary, LibraryProvider, TeamIndex, TeamMember, TeamProvider, TeamRoster,
};
use tracing::{instrument, warn};

/// Default location of the comics collection, matching the path the site
/// serves it from.
pub const DEFAULT_LIBRARY_SPEC: &str = "data/comics.json";

/// Default location of the team directory (holds `index.json` plus one
/// document per member).
pub const DEFAULT_TEAM_SPEC: &str = "team";

/// Chooses a provider for a data spec: URLs go over HTTP, everything else
/// is treated as a local path.
pub fn library_source(spec: &str) -> Box<dyn LibraryProvider> {
    if is_http(spec) {
        Box::new(HttpLibrarySource::new(spec))
    } else {
        Box::new(FileLibrarySource::new(spec))
    }
}

pub fn team_source(spec: &str) -> Box<dyn TeamProvider> {
    if is_http(spec) {
        Box::new(HttpTeamSource::new(spec))
    } else {
        Box::new(FileTeamSource::new(spec))
    }
}

fn is_http(spec: &str) -> bool {
    spec.starts_with("http://") || spec.starts_with("https://")
}

pub struct FileLibrarySource {
    path: PathBuf,
}

impl FileLibrarySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl LibraryProvider for FileLibrarySource {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn load(&self) -> Result<ComicLibrary> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("failed to read {:?}", self.path))?;
        let library = ComicLibrary::from_slice(&bytes)
            .with_context(|| format!("failed to decode {:?}", self.path))?;
        Ok(library)
    }
}

pub struct HttpLibrarySource {
    url: String,
    client: reqwest::Client,
}

impl HttpLibrarySource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LibraryProvider for HttpLibrarySource {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn load(&self) -> Result<ComicLibrary> {
        let body = fetch(&self.client, &self.url).await?;
        let library = ComicLibrary::from_slice(&body)
            .with_context(|| format!("failed to decode {}", self.url))?;
        Ok(library)
    }
}

async fn fetch(client: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("failed to fetch {url}"))?;
    if !response.status().is_success() {
        bail!("failed to fetch {url}: status {}", response.status());
    }
    let body = response
        .bytes()
        .await
        .with_context(|| format!("failed to read body of {url}"))?;
    Ok(body.to_vec())
}

pub struct FileTeamSource {
    root: PathBuf,
}

impl FileTeamSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl TeamProvider for FileTeamSource {
    /// An unreadable index fails the roster; an unreadable member document
    /// is logged and skipped.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn load(&self) -> Result<TeamRoster> {
        let index_path = self.root.join("index.json");
        let bytes = tokio::fs::read(&index_path)
            .await
            .with_context(|| format!("failed to read {:?}", index_path))?;
        let index: TeamIndex = serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to decode {:?}", index_path))?;

        let mut members = Vec::new();
        for file in &index.members {
            let path = self.root.join(file);
            match read_member(&path).await {
                Ok(member) => members.push(member),
                Err(err) => warn!(error = ?err, file = %file, "skipping team member document"),
            }
        }
        Ok(TeamRoster::new(members))
    }
}

async fn read_member(path: &Path) -> Result<TeamMember> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {:?}", path))?;
    let member = serde_json::from_slice(&bytes)
        .with_context(|| format!("failed to decode {:?}", path))?;
    Ok(member)
}

pub struct HttpTeamSource {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTeamSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    fn member_url(&self, file: &str) -> String {
        format!("{}/{}", self.base_url, file)
    }
}

#[async_trait]
impl TeamProvider for HttpTeamSource {
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    async fn load(&self) -> Result<TeamRoster> {
        let index_url = self.member_url("index.json");
        let body = fetch(&self.client, &index_url).await?;
        let index: TeamIndex = serde_json::from_slice(&body)
            .with_context(|| format!("failed to decode {index_url}"))?;

        let mut members = Vec::new();
        for file in &index.members {
            let url = self.member_url(file);
            let member = async {
                let body = fetch(&self.client, &url).await?;
                serde_json::from_slice::<TeamMember>(&body)
                    .with_context(|| format!("failed to decode {url}"))
            }
            .await;
            match member {
                Ok(member) => members.push(member),
                Err(err) => warn!(error = ?err, url = %url, "skipping team member document"),
            }
        }
        Ok(TeamRoster::new(members))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::tempdir;

    const COLLECTION: &str = r#"[
        {
            "id": "alv-01",
            "title": "Shardbound",
            "status": "Ongoing",
            "chapters": [
                {"number": 1, "title": "Awakening", "pages": ["p1.jpg", "p2.jpg"]},
                {"number": "2", "title": "Descent", "pages": []}
            ]
        }
    ]"#;

    #[tokio::test]
    async fn file_source_loads_a_collection() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("comics.json");
        std::fs::write(&path, COLLECTION).unwrap();

        let library = FileLibrarySource::new(&path).load().await.unwrap();
        let comic = library.comic("alv-01").unwrap();
        assert_eq!(comic.title, "Shardbound");
        assert_eq!(comic.chapters.len(), 2);
        assert_eq!(comic.chapters[1].number.as_str(), "2");
    }

    #[tokio::test]
    async fn file_source_reports_missing_file() {
        let dir = tempdir().unwrap();
        let source = FileLibrarySource::new(dir.path().join("absent.json"));
        assert!(source.load().await.is_err());
    }

    #[tokio::test]
    async fn file_source_reports_malformed_collection() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("comics.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(FileLibrarySource::new(&path).load().await.is_err());
    }

    #[tokio::test]
    async fn file_source_rejects_duplicate_chapter_numbers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("comics.json");
        std::fs::write(
            &path,
            r#"[{"id": "c", "title": "T", "chapters": [
                {"number": 1, "title": "A"},
                {"number": "1", "title": "B"}
            ]}]"#,
        )
        .unwrap();
        assert!(FileLibrarySource::new(&path).load().await.is_err());
    }

    #[tokio::test]
    async fn team_source_skips_broken_member_documents() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("index.json"),
            r#"{"members": ["lead.json", "broken.json", "colorist.json"]}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("lead.json"),
            r#"{"name": "Mira", "role": "Lead Artist", "priority": true}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("broken.json"), "{ nope").unwrap();
        std::fs::write(dir.path().join("colorist.json"), r#"{"name": "Jun"}"#).unwrap();

        let roster = FileTeamSource::new(dir.path()).load().await.unwrap();
        assert_eq!(roster.len(), 2);
        let priority: Vec<&str> = roster
            .priority_members()
            .iter()
            .map(|member| member.display_name())
            .collect();
        assert_eq!(priority, vec!["Mira"]);
    }

    #[tokio::test]
    async fn team_source_fails_without_an_index() {
        let dir = tempdir().unwrap();
        assert!(FileTeamSource::new(dir.path()).load().await.is_err());
    }

    #[test]
    fn specs_are_routed_by_scheme() {
        assert!(is_http("https://example.net/data/comics.json"));
        assert!(is_http("http://localhost:8080/comics.json"));
        assert!(!is_http("data/comics.json"));
        assert!(!is_http("/srv/comics.json"));
    }
}
