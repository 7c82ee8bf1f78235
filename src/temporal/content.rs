//! Natural-language rendering of documents

use crate::document::{Document, DocumentMetadata};
use crate::error::{RecallError, Result};
use regex::Regex;
use serde_json::Value;

/// Renders documents as first-person prose for the generator
#[derive(Debug, Clone)]
pub struct ContentRenderer {
    braces: Regex,
    brackets: Regex,
    urls: Regex,
    whitespace: Regex,
}

impl ContentRenderer {
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| {
                RecallError::Config(format!("Invalid content pattern '{}': {}", pattern, e))
            })
        };

        Ok(Self {
            braces: compile(r"\{[^}]*\}")?,
            brackets: compile(r"\[[^\]]*\]")?,
            urls: compile(r"https?://\S+")?,
            whitespace: compile(r"\s+")?,
        })
    }

    /// Strip serialized objects, bracketed lists, URLs and redundant whitespace
    pub fn clean_page_content(&self, content: &str) -> String {
        let without_braces = self.braces.replace_all(content, "");
        let without_brackets = self.brackets.replace_all(&without_braces, "");
        let without_urls = self.urls.replace_all(&without_brackets, "");
        self.whitespace
            .replace_all(&without_urls, " ")
            .trim()
            .to_string()
    }

    /// Best natural rendering of a document
    pub fn render(&self, doc: &Document) -> String {
        let meta = &doc.metadata;

        if let Some(original) = meta.get_str("originalText") {
            if is_natural_text(original) {
                return original.to_string();
            }
        }

        let rendered = match meta.doc_type.as_deref() {
            Some("track") => Some(track(meta)),
            Some("artist") => Some(artist(meta)),
            Some("playlist") => Some(playlist(meta)),
            Some("album") => Some(album(meta)),
            Some("recently_played") => Some(recently_played(meta)),
            Some("repository") => Some(repository(meta)),
            Some("pull_request") => Some(pull_request(meta)),
            Some("tweet") => Some(tweet(meta, &doc.page_content)),
            Some("issue") => Some(issue(meta)),
            _ => None,
        };
        if let Some(text) = rendered {
            return text;
        }

        let cleaned = self.clean_page_content(&doc.page_content);
        if cleaned.is_empty() {
            format!(
                "{}: {}",
                meta.doc_type.as_deref().unwrap_or("Document"),
                meta.id.as_deref().unwrap_or("unknown")
            )
        } else {
            cleaned
        }
    }
}

/// Header line for a document: type tag followed by its most descriptive name
pub fn header(meta: &DocumentMetadata) -> String {
    let doc_type = meta.doc_type.as_deref().unwrap_or("Document");
    let name = match (meta.get_str("name"), meta.get_str("artist")) {
        (Some(name), Some(artist)) => Some(format!("{} - {}", name, artist)),
        (Some(name), None) => Some(name.to_string()),
        _ => None,
    };
    let title = name
        .or_else(|| {
            ["title", "trackName", "fullName", "description"]
                .iter()
                .find_map(|k| meta.get_str(k))
                .map(|s| truncate(s, 80))
        })
        .unwrap_or_else(|| doc_type.to_string());

    format!("{} {}", doc_type, title).trim().to_string()
}

fn is_natural_text(text: &str) -> bool {
    text.len() > 10 && !text.contains('{') && !text.contains("http")
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

fn count(meta: &DocumentMetadata, key: &str) -> Option<i64> {
    meta.get_f64(key).map(|n| n as i64)
}

fn plural(n: i64, noun: &str) -> String {
    format!("{} {}{}", n, noun, if n == 1 { "" } else { "s" })
}

fn strings(meta: &DocumentMetadata, key: &str) -> Vec<String> {
    meta.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| {
                    v.as_str()
                        .or_else(|| v.get("name").and_then(Value::as_str))
                        .map(str::to_string)
                })
                .collect()
        })
        .unwrap_or_default()
}

fn track(meta: &DocumentMetadata) -> String {
    let name = meta.get_str("name").unwrap_or("Unknown Track");
    let artist = meta.get_str("artist").unwrap_or("Unknown Artist");
    let mut out = format!("Track: \"{}\" by {}", name, artist);
    if let Some(album) = meta.get_str("album").filter(|a| *a != name) {
        out.push_str(&format!(" from the album \"{}\"", album));
    }
    if let Some(popularity) = count(meta, "popularity") {
        out.push_str(&format!(" (popularity: {}/100)", popularity));
    }
    if meta.get_bool("explicit") {
        out.push_str(" [Explicit]");
    }
    out
}

fn artist(meta: &DocumentMetadata) -> String {
    let mut out = format!("I follow {}", meta.get_str("name").unwrap_or("Unknown Artist"));
    let genres: Vec<String> = strings(meta, "genres").into_iter().take(3).collect();
    if !genres.is_empty() {
        out.push_str(&format!(", exploring {}", genres.join(", ")));
    }
    if let Some(popularity) = count(meta, "popularity") {
        out.push_str(&format!(" (popularity: {}/100)", popularity));
    }
    out
}

fn playlist(meta: &DocumentMetadata) -> String {
    let mut out = format!("Playlist: \"{}\"", meta.get_str("name").unwrap_or("Unnamed Playlist"));
    if let Some(description) = meta.get_str("description") {
        out.push_str(&format!(" - {}", description));
    }
    let tracks = meta
        .get("tracks")
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0);
    if tracks > 0 {
        out.push_str(&format!(" ({} tracks)", tracks));
    }
    out
}

fn album(meta: &DocumentMetadata) -> String {
    let artist = strings(meta, "artists")
        .into_iter()
        .next()
        .unwrap_or_else(|| "Unknown Artist".to_string());
    let mut out = format!(
        "Album: \"{}\" by {}",
        meta.get_str("name").unwrap_or("Unknown Album"),
        artist
    );
    if let Some(release) = meta.get_str("releaseDate") {
        out.push_str(&format!(" ({})", release));
    }
    if let Some(total) = count(meta, "totalTracks") {
        out.push_str(&format!(", {} tracks", total));
    }
    out
}

fn recently_played(meta: &DocumentMetadata) -> String {
    let mut out = format!(
        "I played \"{}\" by {}",
        meta.get_str("trackName").unwrap_or("Unknown Track"),
        meta.get_str("artist").unwrap_or("Unknown Artist")
    );
    if let Some(album) = meta.get_str("album") {
        out.push_str(&format!(" from {}", album));
    }
    if let Some(ms) = count(meta, "durationMs").filter(|ms| *ms > 0) {
        out.push_str(&format!(" ({}:{:02})", ms / 60_000, (ms % 60_000) / 1000));
    }
    if meta.get_bool("explicit") {
        out.push_str(" [Explicit]");
    }
    match count(meta, "popularity") {
        Some(p) if p >= 70 => out.push_str(" popular track"),
        Some(p) if p <= 30 => out.push_str(" niche track"),
        _ => {}
    }
    out
}

fn repository(meta: &DocumentMetadata) -> String {
    let name = meta
        .get_str("fullName")
        .or_else(|| meta.get_str("name"))
        .unwrap_or("Unknown Repository");
    let mut out = format!("Repository: \"{}\"", name);

    let status: Vec<&str> = [
        ("archived", "archived"),
        ("private", "private"),
        ("fork", "fork"),
        ("isTemplate", "template"),
    ]
    .iter()
    .filter(|(key, _)| meta.get_bool(key))
    .map(|(_, label)| *label)
    .collect();
    if !status.is_empty() {
        out.push_str(&format!(" [{}]", status.join(", ")));
    }
    if let Some(description) = meta.get_str("description") {
        out.push_str(&format!(" - {}", description));
    }
    if let Some(language) = meta.get_str("language") {
        out.push_str(&format!(" ({})", language));
    }

    let mut stats = Vec::new();
    if let Some(stars) = count(meta, "stars") {
        stats.push(plural(stars, "star"));
    }
    if let Some(forks) = count(meta, "forks") {
        stats.push(plural(forks, "fork"));
    }
    if let Some(watchers) = count(meta, "watchersCount").filter(|w| *w > 0) {
        stats.push(plural(watchers, "watcher"));
    }
    if let Some(open) = count(meta, "openIssuesCount") {
        stats.push(plural(open, "open issue"));
    }
    if !stats.is_empty() {
        out.push_str(&format!(". Stats: {}", stats.join(", ")));
    }

    let topics: Vec<String> = strings(meta, "topics").into_iter().take(5).collect();
    if !topics.is_empty() {
        out.push_str(&format!(". Topics: {}", topics.join(", ")));
    }
    if let Some(license) = meta.get_str("licenseName") {
        out.push_str(&format!(". License: {}", license));
    }
    out
}

fn pull_request(meta: &DocumentMetadata) -> String {
    let state = meta.get_str("state").unwrap_or("");
    let action = if meta.get_bool("merged") {
        "I merged PR"
    } else if state == "closed" {
        "I closed PR"
    } else if meta.get_bool("draft") {
        "I drafted PR"
    } else if state == "open" {
        "I opened PR"
    } else {
        "I worked on PR"
    };

    let number = count(meta, "number")
        .map(|n| n.to_string())
        .unwrap_or_else(|| "?".to_string());
    let mut out = format!("{} #{}", action, number);
    if let Some(repo) = meta
        .get_str("repositoryFullName")
        .or_else(|| meta.get_str("repositoryName"))
    {
        out.push_str(&format!(" in `{}`", repo));
    }
    out.push_str(&format!(": \"{}\"", meta.get_str("title").unwrap_or("Unnamed PR")));

    let mut stats = Vec::new();
    let additions = count(meta, "additions");
    let deletions = count(meta, "deletions");
    if additions.is_some() || deletions.is_some() {
        stats.push(format!("+{}/-{}", additions.unwrap_or(0), deletions.unwrap_or(0)));
    }
    if let Some(files) = count(meta, "changedFiles").filter(|n| *n > 0) {
        stats.push(plural(files, "file"));
    }
    if let Some(commits) = count(meta, "commits").filter(|n| *n > 0) {
        stats.push(plural(commits, "commit"));
    }
    if !stats.is_empty() {
        out.push_str(&format!(". Changes: {}", stats.join(", ")));
    }
    if let Some(body) = meta.get_str("body") {
        out.push_str(&format!("\nDescription: {}", truncate(body, 150)));
    }
    out
}

fn tweet(meta: &DocumentMetadata, page_content: &str) -> String {
    let text = meta.get_str("text").unwrap_or(page_content);
    let author = meta
        .get_str("authorUsername")
        .or_else(|| meta.get_str("authorName"))
        .map(|a| format!(" (@{})", a))
        .unwrap_or_default();
    let mut out = format!("I tweeted{}: {}", author, text);

    let engagement: Vec<String> = [
        ("retweetCount", "retweets"),
        ("likeCount", "likes"),
        ("replyCount", "replies"),
    ]
    .iter()
    .filter_map(|(key, label)| {
        count(meta, key)
            .filter(|n| *n > 0)
            .map(|n| format!("{} {}", n, label))
    })
    .collect();
    if !engagement.is_empty() {
        out.push_str(&format!(" ({})", engagement.join(", ")));
    }
    out
}

fn issue(meta: &DocumentMetadata) -> String {
    let mut out = format!("Issue: \"{}\"", meta.get_str("title").unwrap_or("Unnamed Issue"));
    if let Some(state) = meta.get_str("state") {
        out.push_str(&format!(" [{}]", state));
    }
    if let Some(team) = meta.get_str("teamName") {
        out.push_str(&format!(" in {}", team));
    }
    if let Some(priority) = count(meta, "priority") {
        let label = match priority {
            0 => "Urgent".to_string(),
            1 => "High".to_string(),
            2 => "Medium".to_string(),
            3 => "Low".to_string(),
            4 => "No priority".to_string(),
            n => format!("Priority {}", n),
        };
        out.push_str(&format!(" ({})", label));
    }
    if let Some(assignee) = meta.get_str("assigneeName") {
        out.push_str(&format!(", assigned to {}", assignee));
    }
    if let Some(project) = meta.get_str("projectName") {
        out.push_str(&format!(", project: {}", project));
    }
    if let Some(description) = meta.get_str("description") {
        out.push_str(&format!("\n{}", truncate(description, 200)));
    }
    let labels = strings(meta, "labels");
    if !labels.is_empty() {
        out.push_str(&format!("\nLabels: {}", labels.join(", ")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn renderer() -> ContentRenderer {
        ContentRenderer::new().unwrap()
    }

    #[test]
    fn test_pull_request_rendering() {
        let doc = Document::new("{\"raw\": true}")
            .with_type("pull_request")
            .with_attr("number", 42)
            .with_attr("title", "Add streaming parser")
            .with_attr("merged", true)
            .with_attr("repositoryFullName", "me/parser")
            .with_attr("additions", 120)
            .with_attr("deletions", 8)
            .with_attr("changedFiles", 1);

        assert_eq!(
            renderer().render(&doc),
            "I merged PR #42 in `me/parser`: \"Add streaming parser\". Changes: +120/-8, 1 file"
        );
    }

    #[test]
    fn test_music_rendering() {
        let played = Document::new("")
            .with_type("recently_played")
            .with_attr("trackName", "Teardrop")
            .with_attr("artist", "Massive Attack")
            .with_attr("durationMs", 330_000)
            .with_attr("popularity", 80);
        assert_eq!(
            renderer().render(&played),
            "I played \"Teardrop\" by Massive Attack (5:30) popular track"
        );

        let album = Document::new("")
            .with_type("album")
            .with_attr("name", "Mezzanine")
            .with_attr("artists", json!([{"name": "Massive Attack"}]))
            .with_attr("totalTracks", 11);
        assert_eq!(
            renderer().render(&album),
            "Album: \"Mezzanine\" by Massive Attack, 11 tracks"
        );
    }

    #[test]
    fn test_issue_and_tweet_rendering() {
        let issue = Document::new("")
            .with_type("issue")
            .with_attr("title", "Crash on login")
            .with_attr("state", "In Progress")
            .with_attr("priority", 1)
            .with_attr("labels", json!(["bug", "auth"]));
        assert_eq!(
            renderer().render(&issue),
            "Issue: \"Crash on login\" [In Progress] (High)\nLabels: bug, auth"
        );

        let tweet = Document::new("shipping the parser today")
            .with_type("tweet")
            .with_attr("authorUsername", "me")
            .with_attr("likeCount", 3);
        assert_eq!(
            renderer().render(&tweet),
            "I tweeted (@me): shipping the parser today (3 likes)"
        );
    }

    #[test]
    fn test_original_text_wins_when_natural() {
        let doc = Document::new("ignored")
            .with_type("track")
            .with_attr("originalText", "A calm song for late evenings");
        assert_eq!(renderer().render(&doc), "A calm song for late evenings");
    }

    #[test]
    fn test_clean_page_content() {
        let r = renderer();
        assert_eq!(
            r.clean_page_content("Meeting notes {\"id\": 1} [draft]  see https://x.y/z   later"),
            "Meeting notes see later"
        );

        let empty = Document::new("{}").with_type("page").with_id("p1");
        assert_eq!(r.render(&empty), "page: p1");
    }

    #[test]
    fn test_header() {
        let track = Document::new("")
            .with_type("track")
            .with_attr("name", "Teardrop")
            .with_attr("artist", "Massive Attack");
        assert_eq!(header(&track.metadata), "track Teardrop - Massive Attack");

        let bare = Document::new("");
        assert_eq!(header(&bare.metadata), "Document Document");
    }
}
