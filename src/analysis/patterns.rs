//! Pattern tables for query analysis
//!
//! The tables are plain serde data so they can be extended from a TOML file; the
//! compiled [`QueryPatterns`] holds the pre-built regexes used on every query.

use crate::error::{RecallError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Keywords that imply one or more entity types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityKeywordConfig {
    pub keywords: Vec<String>,
    pub entity_types: Vec<String>,
}

/// A temporal regex and the normalized reference it produces (`$1` expands captures)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalPatternConfig {
    pub pattern: String,
    pub normalized: String,
}

/// Pattern tables as configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryPatternsConfig {
    #[serde(default)]
    pub entity: Vec<EntityKeywordConfig>,
    #[serde(default)]
    pub temporal: Vec<TemporalPatternConfig>,
    #[serde(default)]
    pub greeting: Vec<String>,
    #[serde(default)]
    pub broad: Vec<String>,
    #[serde(default)]
    pub technical: Vec<String>,
    #[serde(default)]
    pub creative: Vec<String>,
    #[serde(default)]
    pub context_markers: Vec<String>,
}

fn entity(keywords: &[&str], entity_types: &[&str]) -> EntityKeywordConfig {
    EntityKeywordConfig {
        keywords: keywords.iter().map(|s| s.to_string()).collect(),
        entity_types: entity_types.iter().map(|s| s.to_string()).collect(),
    }
}

fn temporal(pattern: &str, normalized: &str) -> TemporalPatternConfig {
    TemporalPatternConfig {
        pattern: pattern.to_string(),
        normalized: normalized.to_string(),
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

const ITALIAN_WEEKDAYS: [(&str, &str); 7] = [
    ("luned[iì]", "monday"),
    ("marted[iì]", "tuesday"),
    ("mercoled[iì]", "wednesday"),
    ("gioved[iì]", "thursday"),
    ("venerd[iì]", "friday"),
    ("sabato", "saturday"),
    ("domenica", "sunday"),
];

const SPANISH_WEEKDAYS: [(&str, &str); 7] = [
    ("lunes", "monday"),
    ("martes", "tuesday"),
    ("mi[eé]rcoles", "wednesday"),
    ("jueves", "thursday"),
    ("viernes", "friday"),
    ("s[aá]bado", "saturday"),
    ("domingo", "sunday"),
];

const ITALIAN_MONTHS: [&str; 12] = [
    "gennaio", "febbraio", "marzo", "aprile", "maggio", "giugno", "luglio", "agosto", "settembre",
    "ottobre", "novembre", "dicembre",
];

const SPANISH_MONTHS: [&str; 12] = [
    "enero", "febrero", "marzo", "abril", "mayo", "junio", "julio", "agosto", "septiembre",
    "octubre", "noviembre", "diciembre",
];

const ENGLISH_MONTHS: [&str; 12] = [
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december",
];

impl Default for QueryPatternsConfig {
    fn default() -> Self {
        let entity = vec![
            entity(&["song", "songs", "track", "tracks", "tune"], &["track"]),
            entity(&["canzone", "canzoni", "brano", "canción", "canciones"], &["track"]),
            entity(
                &["music", "musica", "música"],
                &["track", "artist", "album", "playlist"],
            ),
            entity(
                &["artist", "artists", "band", "singer", "artista", "cantante"],
                &["artist"],
            ),
            entity(&["album", "albums", "disco"], &["album"]),
            entity(&["playlist", "playlists", "lista de reproducción"], &["playlist"]),
            entity(
                &[
                    "listening", "listened", "played", "recently played", "ascoltato",
                    "ascoltati", "escuché", "escuchado",
                ],
                &["recently_played"],
            ),
            entity(
                &["spotify"],
                &["track", "artist", "playlist", "album", "recently_played"],
            ),
            entity(
                &["repo", "repos", "repository", "repositories", "branch", "repositorio"],
                &["repository"],
            ),
            entity(
                &["code", "codice", "código"],
                &["repository", "pull_request", "repository_file"],
            ),
            entity(
                &["file", "files", "function", "class", "module", "script"],
                &["repository_file"],
            ),
            entity(&["commit", "commits", "pushed", "push"], &["commit"]),
            entity(
                &[
                    "pr", "prs", "pull request", "pull requests", "merge", "merged", "shipped",
                    "ship",
                ],
                &["pull_request"],
            ),
            entity(
                &["github"],
                &["repository", "pull_request", "repository_file", "commit"],
            ),
            entity(
                &[
                    "task", "tasks", "issue", "issues", "ticket", "tickets", "project", "linear",
                    "backlog", "sprint", "compito", "compiti", "tarea", "tareas",
                ],
                &["issue"],
            ),
            entity(
                &["tweet", "tweets", "twitter", "posted", "retweet", "on x"],
                &["tweet"],
            ),
            entity(
                &[
                    "note", "notes", "page", "pages", "document", "documents", "notion", "wiki",
                    "docs", "appunti", "nota", "notas",
                ],
                &["page"],
            ),
            entity(
                &[
                    "slack", "channel", "message", "messages", "team", "messaggio", "messaggi",
                    "mensaje", "mensajes",
                ],
                &["message"],
            ),
            entity(
                &[
                    "calendar", "meeting", "meetings", "event", "events", "appointment",
                    "riunione", "reunión", "calendario",
                ],
                &["event"],
            ),
        ];

        let mut temporal_table = vec![
            // English, ordered: first match wins
            temporal(r"\b(today|tonight)\b", "today"),
            temporal(r"\byesterday\b", "yesterday"),
            temporal(r"\blast\s+(week|month|year)\b", "last $1"),
            temporal(r"\bthis\s+(week|month|year)\b", "this $1"),
            temporal(r"\b(\d+)\s+(day|week|month|year)s?\s+ago\b", "$1 $2 ago"),
            temporal(r"\brecently?\b", "recent"),
            temporal(r"\blast\s+(\d+)\s+(day|hour|minute)s?\b", "last $1 $2"),
            temporal(r"\b(morning|afternoon|evening|night)\b", "today"),
            temporal(
                r"\b(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b",
                "$1",
            ),
            temporal(&format!(r"\b({})\b", ENGLISH_MONTHS.join("|")), "$1"),
            // Italian
            temporal(r"\b(oggi|stasera|stamattina|stanotte)\b", "today"),
            temporal(r"\bieri\b", "yesterday"),
            temporal(r"\b(la\s+)?settimana\s+scorsa\b|\bscorsa\s+settimana\b", "last week"),
            temporal(r"\bmese\s+scorso\b|\bscorso\s+mese\b", "last month"),
            temporal(r"\banno\s+scorso\b|\bscorso\s+anno\b", "last year"),
            temporal(r"\bquesta\s+settimana\b", "this week"),
            temporal(r"\bquesto\s+mese\b", "this month"),
            temporal(r"\bquest['’]\s*anno\b", "this year"),
            temporal(r"\b(\d+)\s+giorni?\s+fa\b", "$1 day ago"),
            temporal(r"\b(\d+)\s+settiman[ae]\s+fa\b", "$1 week ago"),
            temporal(r"\b(\d+)\s+mes[ei]\s+fa\b", "$1 month ago"),
            temporal(r"\b(di\s+recente|recentemente|ultimamente)\b", "recent"),
            temporal(r"\bultimi\s+(\d+)\s+giorni\b", "last $1 day"),
            temporal(r"\bultime\s+(\d+)\s+ore\b", "last $1 hour"),
            // Spanish
            temporal(r"\b(hoy|esta\s+noche|esta\s+mañana)\b", "today"),
            temporal(r"\bayer\b", "yesterday"),
            temporal(r"\b(la\s+)?semana\s+pasada\b", "last week"),
            temporal(r"\b(el\s+)?mes\s+pasado\b", "last month"),
            temporal(r"\b(el\s+)?año\s+pasado\b", "last year"),
            temporal(r"\besta\s+semana\b", "this week"),
            temporal(r"\beste\s+mes\b", "this month"),
            temporal(r"\beste\s+año\b", "this year"),
            temporal(r"\bhace\s+(\d+)\s+d[ií]as?\b", "$1 day ago"),
            temporal(r"\bhace\s+(\d+)\s+semanas?\b", "$1 week ago"),
            temporal(r"\bhace\s+(\d+)\s+mes(es)?\b", "$1 month ago"),
            temporal(r"\b(recientemente|últimamente)\b", "recent"),
            temporal(r"\b[uú]ltimos\s+(\d+)\s+d[ií]as\b", "last $1 day"),
            temporal(r"\b[uú]ltimas\s+(\d+)\s+horas\b", "last $1 hour"),
        ];

        for (pattern, day) in ITALIAN_WEEKDAYS.iter().chain(SPANISH_WEEKDAYS.iter()) {
            temporal_table.push(temporal(&format!(r"\b{}\b", pattern), day));
        }
        for (idx, name) in ITALIAN_MONTHS.iter().enumerate() {
            temporal_table.push(temporal(&format!(r"\b{}\b", name), ENGLISH_MONTHS[idx]));
        }
        for (idx, name) in SPANISH_MONTHS.iter().enumerate() {
            temporal_table.push(temporal(&format!(r"\b{}\b", name), ENGLISH_MONTHS[idx]));
        }

        Self {
            entity,
            temporal: temporal_table,
            greeting: strings(&[
                r"^(hello|hi|hey|greetings|howdy|yo)\b",
                r"^(good\s+)?(morning|afternoon|evening|night)\b",
                r"^what's\s+up\b",
                r"^how\s+are\s+you",
                r"^(ciao|salve|buongiorno|buonasera|buonanotte)\b",
                r"^(hola|buenos\s+días|buenas\s+tardes|buenas\s+noches)\b",
                r"^(what|who)\s+(are|is)\s+(you|this)\b",
                r"^(tell|show)\s+me\s+(about\s+)?(yourself|you)\b",
                r"^what\s+can\s+you\s+do",
                r"^what\s+are\s+you\s+(able|capable)\s+(of|to)",
                r"^cosa\s+(puoi|sai|sei\s+in\s+grado\s+di)\s+fare",
                r"^qu[eé]\s+puedes\s+hacer",
                r"^can\s+you\s+help\s+me",
                r"^help$",
                r"^thanks?\b",
                r"^thank\s+you\b",
                r"^(grazie|gracias)\b",
                r"^(bye|goodbye|see\s+you)\b",
            ]),
            broad: strings(&[
                r"^what\s+can\s+you\s+do",
                r"^(give|show)\s+me\s+(an?\s+)?overview",
                r"^summarize\s+(everything|all|my\s+data)",
                r"^(tell|show)\s+me\s+(about\s+)?(everything|all|my\s+data)",
            ]),
            technical: strings(&[
                r"\b(debug|fix|error|bug|issue|problem)\b",
                r"\b(code|function|class|method|api|endpoint)\b",
                r"\b(implement|refactor|optimize|performance)\b",
                r"\b(test|spec|unit|integration)\b",
            ]),
            creative: strings(&[r"\b(write|create|generate|brainstorm|ideas?)\b"]),
            context_markers: strings(&[
                "it", "them", "that", "those", "these", "he", "she", "they", "him", "her", "this",
                "previous", "following", "last", "past", "above", "below", "more", "again",
            ]),
        }
    }
}

impl QueryPatternsConfig {
    /// Load pattern tables from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| RecallError::Io {
            source: e,
            context: format!("Failed to read query patterns: {:?}", path),
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Append another table set after this one
    pub fn merge(mut self, other: QueryPatternsConfig) -> Self {
        self.entity.extend(other.entity);
        self.temporal.extend(other.temporal);
        self.greeting.extend(other.greeting);
        self.broad.extend(other.broad);
        self.technical.extend(other.technical);
        self.creative.extend(other.creative);
        self.context_markers.extend(other.context_markers);
        self
    }
}

/// Compiled keyword matcher for one keyword
#[derive(Debug, Clone)]
pub struct CompiledEntityKeyword {
    pub keyword: String,
    pub regex: Regex,
    pub entity_types: Vec<String>,
}

/// Compiled temporal pattern
#[derive(Debug, Clone)]
pub struct CompiledTemporalPattern {
    pub regex: Regex,
    pub normalized: String,
}

/// All analysis patterns, pre-compiled
#[derive(Debug, Clone)]
pub struct QueryPatterns {
    pub entities: Vec<CompiledEntityKeyword>,
    pub temporal: Vec<CompiledTemporalPattern>,
    pub greeting: Vec<Regex>,
    pub broad: Vec<Regex>,
    pub technical: Vec<Regex>,
    pub creative: Vec<Regex>,
    pub context_marker: Option<Regex>,
}

impl QueryPatterns {
    /// Compile the built-in tables
    pub fn builtin() -> Result<Self> {
        Self::from_config(&QueryPatternsConfig::default())
    }

    /// Compile pattern tables; every regex is case-insensitive
    pub fn from_config(config: &QueryPatternsConfig) -> Result<Self> {
        let mut entities = Vec::new();
        for group in &config.entity {
            for keyword in &group.keywords {
                let regex = compile(&keyword_pattern(keyword), "entity keyword")?;
                entities.push(CompiledEntityKeyword {
                    keyword: keyword.to_lowercase(),
                    regex,
                    entity_types: group.entity_types.clone(),
                });
            }
        }

        let temporal = config
            .temporal
            .iter()
            .map(|t| {
                Ok(CompiledTemporalPattern {
                    regex: compile(&t.pattern, "temporal")?,
                    normalized: t.normalized.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let markers: Vec<String> = config
            .context_markers
            .iter()
            .map(|m| regex::escape(m))
            .collect();
        let context_marker = if markers.is_empty() {
            None
        } else {
            Some(compile(&format!(r"\b({})\b", markers.join("|")), "context marker")?)
        };

        Ok(Self {
            entities,
            temporal,
            greeting: compile_all(&config.greeting, "greeting")?,
            broad: compile_all(&config.broad, "broad")?,
            technical: compile_all(&config.technical, "technical")?,
            creative: compile_all(&config.creative, "creative")?,
            context_marker,
        })
    }
}

/// Word-bounded, whitespace-tolerant pattern for a literal keyword or phrase
fn keyword_pattern(keyword: &str) -> String {
    let words: Vec<String> = keyword
        .split_whitespace()
        .map(regex::escape)
        .collect();
    format!(r"\b{}\b", words.join(r"\s+"))
}

fn compile(pattern: &str, kind: &str) -> Result<Regex> {
    Regex::new(&format!("(?i){}", pattern)).map_err(|e| {
        RecallError::Config(format!("Invalid {} pattern '{}': {}", kind, pattern, e))
    })
}

fn compile_all(patterns: &[String], kind: &str) -> Result<Vec<Regex>> {
    patterns.iter().map(|p| compile(p, kind)).collect()
}
