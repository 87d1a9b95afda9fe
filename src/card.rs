use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use crate::scheduler::LeitnerBox;

pub const DEFAULT_EASE: f64 = 2.5;

/// Lifecycle of a card. Suspended and buried cards are parked by the user;
/// the review path never enters or leaves those states.
#[derive(Clone, Copy, PartialEq, Eq, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    New,
    Learning,
    Reviewing,
    Relearning,
    Suspended,
    Buried,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::New => "new",
            Status::Learning => "learning",
            Status::Reviewing => "reviewing",
            Status::Relearning => "relearning",
            Status::Suspended => "suspended",
            Status::Buried => "buried",
        }
    }

    pub fn parse(s: &str) -> Option<Status> {
        match s {
            "new" => Some(Status::New),
            "learning" => Some(Status::Learning),
            "reviewing" => Some(Status::Reviewing),
            "relearning" => Some(Status::Relearning),
            "suspended" => Some(Status::Suspended),
            "buried" => Some(Status::Buried),
            _ => None,
        }
    }

    pub fn is_active(self) -> bool {
        !matches!(self, Status::Suspended | Status::Buried)
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Card {
    pub deck: String,
    pub front: String,
    pub back: String,
    /// Comma-separated tag string; parsing it is the caller's concern.
    pub tags: String,
    pub id: String,
    pub ease_factor: f64,
    pub interval: u32,
    pub repetitions: u32,
    pub leitner_box: LeitnerBox,
    pub status: Status,
    pub due: DateTime<Utc>,
    pub last_review: Option<DateTime<Utc>>,
    pub total_reviews: u32,
    pub correct_reviews: u32,
    pub streak: u32,
    pub max_streak: u32,
}

impl Card {
    /// A brand-new card, due immediately.
    pub fn new(deck: &str, front: &str, back: &str, tags: &str, now: DateTime<Utc>) -> Card {
        Card {
            deck: deck.to_string(),
            front: front.to_string(),
            back: back.to_string(),
            tags: tags.to_string(),
            id: uuid::Uuid::new_v4().to_string(),
            ease_factor: DEFAULT_EASE,
            interval: 1,
            repetitions: 0,
            leitner_box: LeitnerBox::Box1,
            status: Status::New,
            due: now,
            last_review: None,
            total_reviews: 0,
            correct_reviews: 0,
            streak: 0,
            max_streak: 0,
        }
    }
}

fn parse_optional_f64(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() { None } else { s.parse().ok() }
}

fn parse_optional_u32(s: &str) -> Option<u32> {
    let s = s.trim();
    if s.is_empty() { None } else { s.parse().ok() }
}

fn parse_optional_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

fn get_field(record: &csv::StringRecord, index: usize) -> String {
    record.get(index).unwrap_or("").to_string()
}

pub fn load_csv(path: &Path) -> Result<Vec<Card>, String> {
    let default_deck = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("default")
        .to_string();

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| format!("failed to open {}: {}", path.display(), e))?;

    let now = Utc::now();
    let mut cards = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| format!("CSV parse error in {}: {}", path.display(), e))?;

        let deck_raw = get_field(&record, 0);
        let deck = if deck_raw.trim().is_empty() {
            default_deck.clone()
        } else {
            deck_raw
        };

        let id_raw = get_field(&record, 4);
        let id = if id_raw.trim().is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            id_raw
        };

        // Blank scheduling columns mean a user-authored row: new-card defaults.
        cards.push(Card {
            deck,
            front: get_field(&record, 1),
            back: get_field(&record, 2),
            tags: get_field(&record, 3),
            id,
            ease_factor: parse_optional_f64(&get_field(&record, 5)).unwrap_or(DEFAULT_EASE),
            interval: parse_optional_u32(&get_field(&record, 6)).unwrap_or(1),
            repetitions: parse_optional_u32(&get_field(&record, 7)).unwrap_or(0),
            leitner_box: get_field(&record, 8)
                .trim()
                .parse::<u8>()
                .ok()
                .and_then(LeitnerBox::from_number)
                .unwrap_or(LeitnerBox::Box1),
            status: Status::parse(get_field(&record, 9).trim()).unwrap_or(Status::New),
            due: parse_optional_datetime(&get_field(&record, 10)).unwrap_or(now),
            last_review: parse_optional_datetime(&get_field(&record, 11)),
            total_reviews: parse_optional_u32(&get_field(&record, 12)).unwrap_or(0),
            correct_reviews: parse_optional_u32(&get_field(&record, 13)).unwrap_or(0),
            streak: parse_optional_u32(&get_field(&record, 14)).unwrap_or(0),
            max_streak: parse_optional_u32(&get_field(&record, 15)).unwrap_or(0),
        });
    }
    Ok(cards)
}

pub fn save_csv(path: &Path, cards: &[Card]) -> Result<(), String> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| format!("failed to write {}: {}", path.display(), e))?;

    writer
        .write_record([
            "deck",
            "front",
            "back",
            "tags",
            "id",
            "ease_factor",
            "interval",
            "repetitions",
            "leitner_box",
            "status",
            "due",
            "last_review",
            "total_reviews",
            "correct_reviews",
            "streak",
            "max_streak",
        ])
        .map_err(|e| format!("write error: {e}"))?;

    for card in cards {
        writer
            .write_record([
                &card.deck,
                &card.front,
                &card.back,
                &card.tags,
                &card.id,
                &format!("{:.3}", card.ease_factor),
                &card.interval.to_string(),
                &card.repetitions.to_string(),
                &card.leitner_box.number().to_string(),
                &card.status.as_str().to_string(),
                &card.due.to_rfc3339(),
                &card
                    .last_review
                    .map_or(String::new(), |dt| dt.to_rfc3339()),
                &card.total_reviews.to_string(),
                &card.correct_reviews.to_string(),
                &card.streak.to_string(),
                &card.max_streak.to_string(),
            ])
            .map_err(|e| format!("write error: {e}"))?;
    }

    writer.flush().map_err(|e| format!("flush error: {e}"))?;
    Ok(())
}

/// The review log lives next to the card files; keep it out of deck discovery.
pub const REVIEW_LOG_NAME: &str = "reviews.csv";

pub fn discover_files(paths: &[String]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for p in paths {
        let path = PathBuf::from(p);
        if path.is_dir() {
            collect_csv_recursive(&path, &mut files);
        } else if is_deck_file(&path) {
            files.push(path);
        }
    }
    files
}

fn is_deck_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("csv")
        && path.file_name().and_then(|n| n.to_str()) != Some(REVIEW_LOG_NAME)
}

fn collect_csv_recursive(dir: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_csv_recursive(&path, files);
        } else if is_deck_file(&path) {
            files.push(path);
        }
    }
}
