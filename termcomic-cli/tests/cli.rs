use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use tempfile::tempdir;

const COLLECTION: &str = r#"[
    {
        "id": "alv-01",
        "title": "Shardbound",
        "status": "Ongoing",
        "author": "R. Vance",
        "releaseYear": 2021,
        "genres": ["Fantasy", "Action"],
        "chapters": [
            {"number": 1, "title": "Awakening", "releaseDate": "2024-03-05", "pages": ["p1.jpg"]},
            {"number": 2, "title": "Descent", "pages": ["p2.jpg", "p3.jpg"]}
        ]
    },
    {
        "id": "alv-02",
        "title": "Hollow Court",
        "chapters": []
    }
]"#;

fn termcomic() -> Command {
    Command::cargo_bin("termcomic").unwrap()
}

fn write_collection(dir: &tempfile::TempDir) -> PathBuf {
    let path = dir.path().join("comics.json");
    fs::write(&path, COLLECTION).unwrap();
    path
}

fn stdout_of(output: std::process::Output) -> String {
    assert!(output.status.success());
    String::from_utf8(output.stdout).unwrap()
}

#[test]
fn read_without_parameters_prints_instructions() {
    let output = termcomic().arg("read").output().unwrap();
    let stdout = stdout_of(output);
    assert!(stdout.contains("Comic ID or chapter number not specified"));
}

#[test]
fn read_reports_an_unreadable_collection() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("absent.json");
    let output = termcomic()
        .args(["read", "--comic", "alv-01", "--chapter", "1"])
        .arg("--data")
        .arg(&missing)
        .output()
        .unwrap();
    assert_eq!(stdout_of(output), "Error loading chapter details.\n");
}

#[test]
fn read_reports_a_missing_comic() {
    let dir = tempdir().unwrap();
    let path = write_collection(&dir);
    let output = termcomic()
        .args(["read", "--comic", "nope", "--chapter", "1"])
        .arg("--data")
        .arg(&path)
        .output()
        .unwrap();
    assert_eq!(stdout_of(output), "Comic not found\n");
}

#[test]
fn read_reports_a_missing_chapter() {
    let dir = tempdir().unwrap();
    let path = write_collection(&dir);
    let output = termcomic()
        .args(["read", "--comic", "alv-01", "--chapter", "3"])
        .arg("--data")
        .arg(&path)
        .output()
        .unwrap();
    assert_eq!(stdout_of(output), "Chapter not found\n");
}

#[test]
fn details_lists_chapters_newest_first_with_fallbacks() {
    let dir = tempdir().unwrap();
    let path = write_collection(&dir);
    let output = termcomic()
        .args(["details", "alv-01"])
        .arg("--data")
        .arg(&path)
        .output()
        .unwrap();
    let stdout = stdout_of(output);

    assert!(stdout.contains("Shardbound"));
    assert!(stdout.contains("Author: R. Vance"));
    assert!(stdout.contains("Artist: Unknown"));
    assert!(stdout.contains("Release Year: 2021"));
    assert!(stdout.contains("Genres: Fantasy, Action"));
    assert!(stdout.contains("No description available."));
    assert!(stdout.contains("Mar 5, 2024"));
    assert!(stdout.contains("Unknown Date"));

    let descent = stdout.find("Descent").unwrap();
    let awakening = stdout.find("Awakening").unwrap();
    assert!(descent < awakening);
}

#[test]
fn details_reports_an_empty_chapter_list() {
    let dir = tempdir().unwrap();
    let path = write_collection(&dir);
    let output = termcomic()
        .args(["details", "alv-02"])
        .arg("--data")
        .arg(&path)
        .output()
        .unwrap();
    assert!(stdout_of(output).contains("No chapters available yet."));
}

#[test]
fn details_reports_a_missing_comic() {
    let dir = tempdir().unwrap();
    let path = write_collection(&dir);
    let output = termcomic()
        .args(["details", "nope"])
        .arg("--data")
        .arg(&path)
        .output()
        .unwrap();
    assert_eq!(stdout_of(output), "Comic not found\n");
}

#[test]
fn list_enumerates_the_collection() {
    let dir = tempdir().unwrap();
    let path = write_collection(&dir);
    let output = termcomic().arg("list").arg("--data").arg(&path).output().unwrap();
    let stdout = stdout_of(output);

    assert!(stdout.contains("alv-01"));
    assert!(stdout.contains("alv-02"));
    assert!(stdout.contains("latest: Chapter 2"));
    assert!(stdout.contains("no chapters"));
}

#[test]
fn team_lists_priority_members_first() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("index.json"),
        r#"{"members": ["lead.json", "colorist.json"]}"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("lead.json"),
        r#"{"name": "Mira", "role": "Lead Artist", "priority": true}"#,
    )
    .unwrap();
    fs::write(dir.path().join("colorist.json"), r#"{"name": "Jun"}"#).unwrap();

    let output = termcomic()
        .arg("team")
        .arg("--team-dir")
        .arg(dir.path())
        .output()
        .unwrap();
    let stdout = stdout_of(output);

    let mira = stdout.find("Mira").unwrap();
    let jun = stdout.find("Jun").unwrap();
    assert!(mira < jun);
    assert!(stdout.contains("Lead Artist"));
    assert!(stdout.contains("Contributor"));
    assert!(stdout.contains("More (1)"));
}

#[test]
fn team_reports_a_missing_index() {
    let dir = tempdir().unwrap();
    let output = termcomic()
        .arg("team")
        .arg("--team-dir")
        .arg(dir.path())
        .output()
        .unwrap();
    assert_eq!(stdout_of(output), "Failed to load team members\n");
}
