use chrono::{DateTime, Utc};
use std::path::Path;

use crate::card::{Card, Status};
use crate::scheduler::{self, Difficulty, LeitnerBox};

/// Audit snapshot of one review event: scheduling state before and after,
/// plus the rating and response latency. Append-only; never mutated.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ReviewRecord {
    pub card_id: String,
    pub reviewed_at: DateTime<Utc>,
    pub difficulty: Difficulty,
    pub response_ms: u32,
    pub old_ease_factor: f64,
    pub old_interval: u32,
    pub old_repetitions: u32,
    pub old_box: LeitnerBox,
    pub new_ease_factor: f64,
    pub new_interval: u32,
    pub new_repetitions: u32,
    pub new_box: LeitnerBox,
    pub next_due: DateTime<Utc>,
}

impl ReviewRecord {
    /// A review of a card that had never been answered counts as "new" for
    /// the daily statistics.
    pub fn is_new_card(&self) -> bool {
        self.old_repetitions == 0
    }

    pub fn is_correct(&self) -> bool {
        self.difficulty != Difficulty::Again
    }
}

/// Applies one review: runs the SM-2 estimator and the Leitner scheduler
/// independently, keeps the longer of the two proposed intervals, updates
/// counters and streaks, and advances the status machine. Returns the audit
/// record for the persistence layer.
pub fn review_card(
    card: &mut Card,
    difficulty: Difficulty,
    response_ms: u32,
    now: DateTime<Utc>,
) -> ReviewRecord {
    let old_ease_factor = card.ease_factor;
    let old_interval = card.interval;
    let old_repetitions = card.repetitions;
    let old_box = card.leitner_box;

    let sm2 = scheduler::estimate(old_ease_factor, old_interval, old_repetitions, difficulty);
    // The Leitner demotion gate reads the repetition count from before this
    // review, not the estimator's updated one.
    let new_box = scheduler::advance_box(old_box, difficulty, old_repetitions);

    // Never schedule sooner than either model recommends.
    let interval = u32::max(sm2.interval, new_box.interval_days());
    let next_due = now + chrono::Days::new(interval as u64);

    card.ease_factor = sm2.ease_factor;
    card.interval = interval;
    card.repetitions = sm2.repetitions;
    card.leitner_box = new_box;
    card.due = next_due;
    card.last_review = Some(now);

    card.total_reviews += 1;
    if difficulty != Difficulty::Again {
        card.correct_reviews += 1;
        card.streak += 1;
        card.max_streak = u32::max(card.max_streak, card.streak);
    } else {
        card.streak = 0;
    }

    // First match wins. A brand-new card becomes "learning" before the
    // demotion rule can see it, even when answered "again".
    card.status = if card.status == Status::New {
        Status::Learning
    } else if difficulty == Difficulty::Again && card.status == Status::Reviewing {
        Status::Relearning
    } else if card.status == Status::Learning && sm2.repetitions >= 2 {
        Status::Reviewing
    } else if card.status == Status::Relearning && sm2.repetitions >= 1 {
        Status::Reviewing
    } else {
        card.status
    };

    ReviewRecord {
        card_id: card.id.clone(),
        reviewed_at: now,
        difficulty,
        response_ms,
        old_ease_factor,
        old_interval,
        old_repetitions,
        old_box,
        new_ease_factor: card.ease_factor,
        new_interval: card.interval,
        new_repetitions: card.repetitions,
        new_box: card.leitner_box,
        next_due,
    }
}

/// Indices of cards eligible for review: due and not suspended or buried.
/// Ordered by due date, higher boxes first on ties.
pub fn filter_due(cards: &[Card], now: DateTime<Utc>) -> Vec<usize> {
    let mut due: Vec<usize> = cards
        .iter()
        .enumerate()
        .filter(|(_, c)| c.status.is_active() && c.due <= now)
        .map(|(i, _)| i)
        .collect();
    due.sort_by(|&a, &b| {
        cards[a]
            .due
            .cmp(&cards[b].due)
            .then(cards[b].leitner_box.cmp(&cards[a].leitner_box))
    });
    due
}

pub struct DeckSummary {
    pub name: String,
    pub total: usize,
    pub due: usize,
}

pub fn deck_summaries(cards: &[Card], now: DateTime<Utc>) -> Vec<DeckSummary> {
    let mut decks: std::collections::BTreeMap<String, (usize, usize)> =
        std::collections::BTreeMap::new();
    for card in cards {
        let entry = decks.entry(card.deck.clone()).or_insert((0, 0));
        entry.0 += 1;
        if card.status.is_active() && card.due <= now {
            entry.1 += 1;
        }
    }
    decks
        .into_iter()
        .map(|(name, (total, due))| DeckSummary { name, total, due })
        .collect()
}

// -- Review log persistence --

const LOG_HEADER: [&str; 13] = [
    "card_id",
    "reviewed_at",
    "difficulty",
    "response_ms",
    "old_ease_factor",
    "old_interval",
    "old_repetitions",
    "old_box",
    "new_ease_factor",
    "new_interval",
    "new_repetitions",
    "new_box",
    "next_due",
];

pub fn append_log(path: &Path, record: &ReviewRecord) -> Result<(), String> {
    let write_header = !path.exists();
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| format!("failed to open {}: {}", path.display(), e))?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);

    if write_header {
        writer
            .write_record(LOG_HEADER)
            .map_err(|e| format!("write error: {e}"))?;
    }
    writer
        .write_record([
            record.card_id.clone(),
            record.reviewed_at.to_rfc3339(),
            record.difficulty.as_str().to_string(),
            record.response_ms.to_string(),
            format!("{:.3}", record.old_ease_factor),
            record.old_interval.to_string(),
            record.old_repetitions.to_string(),
            record.old_box.number().to_string(),
            format!("{:.3}", record.new_ease_factor),
            record.new_interval.to_string(),
            record.new_repetitions.to_string(),
            record.new_box.number().to_string(),
            record.next_due.to_rfc3339(),
        ])
        .map_err(|e| format!("write error: {e}"))?;
    writer.flush().map_err(|e| format!("flush error: {e}"))?;
    Ok(())
}

pub fn load_log(path: &Path) -> Result<Vec<ReviewRecord>, String> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| format!("failed to open {}: {}", path.display(), e))?;

    let mut records = Vec::new();
    for result in reader.records() {
        let row = result.map_err(|e| format!("CSV parse error in {}: {}", path.display(), e))?;
        let Some(record) = parse_log_row(&row) else {
            continue;
        };
        records.push(record);
    }
    Ok(records)
}

fn parse_log_row(row: &csv::StringRecord) -> Option<ReviewRecord> {
    let field = |i: usize| row.get(i).unwrap_or("").trim().to_string();
    let datetime = |s: String| {
        DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    };
    Some(ReviewRecord {
        card_id: field(0),
        reviewed_at: datetime(field(1))?,
        difficulty: Difficulty::parse(&field(2))?,
        response_ms: field(3).parse().ok()?,
        old_ease_factor: field(4).parse().ok()?,
        old_interval: field(5).parse().ok()?,
        old_repetitions: field(6).parse().ok()?,
        old_box: field(7).parse::<u8>().ok().and_then(LeitnerBox::from_number)?,
        new_ease_factor: field(8).parse().ok()?,
        new_interval: field(9).parse().ok()?,
        new_repetitions: field(10).parse().ok()?,
        new_box: field(11).parse::<u8>().ok().and_then(LeitnerBox::from_number)?,
        next_due: datetime(field(12))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fresh_card(now: DateTime<Utc>) -> Card {
        Card::new("test", "front", "back", "", now)
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn first_review_good() {
        let now = fixed_now();
        let mut card = fresh_card(now);
        let record = review_card(&mut card, Difficulty::Good, 3000, now);

        assert_eq!(card.ease_factor, 2.5);
        assert_eq!(card.repetitions, 1);
        // SM-2 proposes 1 day, Box2 proposes 2; the merge keeps 2.
        assert_eq!(card.leitner_box, LeitnerBox::Box2);
        assert_eq!(card.interval, 2);
        assert_eq!(card.due, now + chrono::Days::new(2));
        assert_eq!(card.status, Status::Learning);
        assert_eq!(card.total_reviews, 1);
        assert_eq!(card.correct_reviews, 1);
        assert_eq!(card.streak, 1);
        assert_eq!(card.max_streak, 1);

        assert_eq!(record.old_ease_factor, 2.5);
        assert_eq!(record.old_interval, 1);
        assert_eq!(record.old_repetitions, 0);
        assert_eq!(record.old_box, LeitnerBox::Box1);
        assert_eq!(record.new_interval, 2);
        assert_eq!(record.next_due, card.due);
        assert_eq!(record.response_ms, 3000);
    }

    #[test]
    fn first_review_again() {
        let now = fixed_now();
        let mut card = fresh_card(now);
        review_card(&mut card, Difficulty::Again, 5000, now);

        assert!((card.ease_factor - 1.7).abs() < 1e-10);
        assert_eq!(card.repetitions, 0);
        assert_eq!(card.interval, 1);
        assert_eq!(card.leitner_box, LeitnerBox::Box1);
        assert_eq!(card.due, now + chrono::Days::new(1));
        assert_eq!(card.streak, 0);
        assert_eq!(card.correct_reviews, 0);
        // The new->learning rule fires before the demotion rule: status was
        // "new" at entry, not "reviewing".
        assert_eq!(card.status, Status::Learning);
    }

    #[test]
    fn reviewing_card_rated_again_enters_relearning() {
        let now = fixed_now();
        let mut card = fresh_card(now);
        card.status = Status::Reviewing;
        card.repetitions = 5;
        card.interval = 30;

        review_card(&mut card, Difficulty::Again, 8000, now);
        assert_eq!(card.status, Status::Relearning);
        assert_eq!(card.repetitions, 0);
        assert_eq!(card.streak, 0);
    }

    #[test]
    fn learning_graduates_at_two_repetitions() {
        let now = fixed_now();
        let mut card = fresh_card(now);

        review_card(&mut card, Difficulty::Good, 1000, now);
        assert_eq!(card.status, Status::Learning);

        let due = card.due;
        review_card(&mut card, Difficulty::Good, 1000, due);
        assert_eq!(card.repetitions, 2);
        assert_eq!(card.status, Status::Reviewing);
    }

    #[test]
    fn relearning_graduates_after_one_success() {
        let now = fixed_now();
        let mut card = fresh_card(now);
        card.status = Status::Relearning;
        card.repetitions = 0;

        review_card(&mut card, Difficulty::Good, 1000, now);
        assert_eq!(card.status, Status::Reviewing);
    }

    #[test]
    fn suspended_status_is_left_alone_by_the_machine() {
        let now = fixed_now();
        let mut card = fresh_card(now);
        card.status = Status::Suspended;
        card.repetitions = 3;

        review_card(&mut card, Difficulty::Good, 1000, now);
        assert_eq!(card.status, Status::Suspended);
    }

    #[test]
    fn due_date_is_strictly_in_the_future() {
        let now = fixed_now();
        for difficulty in [
            Difficulty::Again,
            Difficulty::Hard,
            Difficulty::Good,
            Difficulty::Easy,
        ] {
            let mut card = fresh_card(now);
            review_card(&mut card, difficulty, 2000, now);
            assert!(card.due > now);
            assert_eq!(card.last_review, Some(now));
            assert!(card.interval >= 1 && card.interval <= 365);
            assert!(card.ease_factor >= 1.3);
        }
    }

    #[test]
    fn stored_interval_always_matches_the_longer_model() {
        let now = fixed_now();
        let mut card = fresh_card(now);
        let mut when = now;

        for _ in 0..12 {
            let expected_sm2 = scheduler::estimate(
                card.ease_factor,
                card.interval,
                card.repetitions,
                Difficulty::Good,
            );
            let expected_box =
                scheduler::advance_box(card.leitner_box, Difficulty::Good, card.repetitions);
            let expected = u32::max(expected_sm2.interval, expected_box.interval_days());

            review_card(&mut card, Difficulty::Good, 1500, when);
            assert_eq!(card.interval, expected);
            when = card.due;
        }

        // Ease-weighted growth has outrun the 90-day Leitner ceiling.
        assert_eq!(card.leitner_box, LeitnerBox::Box7);
        assert!(card.interval > LeitnerBox::Box7.interval_days());
    }

    #[test]
    fn streaks_track_runs_of_correct_answers() {
        let now = fixed_now();
        let mut card = fresh_card(now);

        review_card(&mut card, Difficulty::Good, 1000, now);
        review_card(&mut card, Difficulty::Easy, 1000, now);
        review_card(&mut card, Difficulty::Hard, 1000, now);
        assert_eq!(card.streak, 3);
        assert_eq!(card.max_streak, 3);

        review_card(&mut card, Difficulty::Again, 1000, now);
        assert_eq!(card.streak, 0);
        assert_eq!(card.max_streak, 3);

        review_card(&mut card, Difficulty::Good, 1000, now);
        assert_eq!(card.streak, 1);
        assert_eq!(card.max_streak, 3);
        assert_eq!(card.total_reviews, 5);
        assert_eq!(card.correct_reviews, 4);
    }

    #[test]
    fn filter_due_skips_parked_cards_and_orders_by_box() {
        let now = fixed_now();
        let mut a = fresh_card(now);
        a.leitner_box = LeitnerBox::Box2;
        let mut b = fresh_card(now);
        b.leitner_box = LeitnerBox::Box5;
        let mut suspended = fresh_card(now);
        suspended.status = Status::Suspended;
        let mut future = fresh_card(now);
        future.due = now + chrono::Days::new(3);

        let cards = vec![a, b, suspended, future];
        let due = filter_due(&cards, now);
        // Same due instant: the higher box comes first.
        assert_eq!(due, vec![1, 0]);
    }

    #[test]
    fn review_log_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reviews.csv");
        let now = fixed_now();

        let mut card = fresh_card(now);
        let first = review_card(&mut card, Difficulty::Good, 2500, now);
        let due = card.due;
        let second = review_card(&mut card, Difficulty::Again, 9000, due);

        append_log(&path, &first).unwrap();
        append_log(&path, &second).unwrap();

        let records = load_log(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].card_id, card.id);
        assert_eq!(records[0].difficulty, Difficulty::Good);
        assert_eq!(records[0].old_repetitions, 0);
        assert_eq!(records[0].new_box, LeitnerBox::Box2);
        assert!(records[0].is_new_card());
        assert!(records[0].is_correct());
        assert_eq!(records[1].difficulty, Difficulty::Again);
        assert!(!records[1].is_correct());
        assert_eq!(records[1].old_repetitions, 1);
        assert!(!records[1].is_new_card());
    }
}
