// Statistics collaborator: folds per-review deltas into daily summaries and
// derives collection-level aggregates. The scheduling core never computes
// these; it only supplies the deltas through the audit record.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::card::{Card, Status};
use crate::review::ReviewRecord;
use crate::scheduler::{self, Distribution};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct DailyStats {
    pub new_cards: u32,
    pub reviewed_cards: u32,
    pub correct_cards: u32,
}

/// Upsert one review into the per-day summary: create the day's entry if
/// absent, otherwise increment it.
pub fn record_review(summaries: &mut BTreeMap<NaiveDate, DailyStats>, record: &ReviewRecord) {
    let day = record.reviewed_at.date_naive();
    let entry = summaries.entry(day).or_default();
    if record.is_new_card() {
        entry.new_cards += 1;
    } else {
        entry.reviewed_cards += 1;
    }
    if record.is_correct() {
        entry.correct_cards += 1;
    }
}

pub fn daily_summaries(records: &[ReviewRecord]) -> BTreeMap<NaiveDate, DailyStats> {
    let mut summaries = BTreeMap::new();
    for record in records {
        record_review(&mut summaries, record);
    }
    summaries
}

pub fn box_distribution(cards: &[Card]) -> [u32; 7] {
    let mut counts = [0u32; 7];
    for card in cards {
        counts[card.leitner_box.index()] += 1;
    }
    counts
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StatusCounts {
    pub new: u32,
    pub learning: u32,
    pub reviewing: u32,
    pub relearning: u32,
    pub suspended: u32,
    pub buried: u32,
}

pub fn status_counts(cards: &[Card]) -> StatusCounts {
    let mut counts = StatusCounts::default();
    for card in cards {
        match card.status {
            Status::New => counts.new += 1,
            Status::Learning => counts.learning += 1,
            Status::Reviewing => counts.reviewing += 1,
            Status::Relearning => counts.relearning += 1,
            Status::Suspended => counts.suspended += 1,
            Status::Buried => counts.buried += 1,
        }
    }
    counts
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CollectionStats {
    pub total_cards: usize,
    pub due_cards: usize,
    pub status_distribution: StatusCounts,
    pub leitner_distribution: [u32; 7],
    pub average_retention_rate: f64,
    pub review_distribution: Distribution,
}

pub fn collection_stats(cards: &[Card], now: chrono::DateTime<chrono::Utc>) -> CollectionStats {
    let reviewed: Vec<&Card> = cards.iter().filter(|c| c.total_reviews > 0).collect();
    let average_retention_rate = if reviewed.is_empty() {
        0.0
    } else {
        let sum: f64 = reviewed
            .iter()
            .map(|c| scheduler::retention_rate(c.correct_reviews, c.total_reviews))
            .sum();
        (sum / reviewed.len() as f64 * 100.0).round() / 100.0
    };

    CollectionStats {
        total_cards: cards.len(),
        due_cards: crate::review::filter_due(cards, now).len(),
        status_distribution: status_counts(cards),
        leitner_distribution: box_distribution(cards),
        average_retention_rate,
        review_distribution: scheduler::recommend_distribution(
            cards.len() as u32,
            scheduler::DEFAULT_MAX_NEW,
            scheduler::DEFAULT_MAX_REVIEW,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::review_card;
    use crate::scheduler::Difficulty;
    use chrono::{TimeZone, Utc};

    fn fixed_now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn daily_summary_upserts() {
        let now = fixed_now();
        let mut card = Card::new("test", "q", "a", "", now);

        let first = review_card(&mut card, Difficulty::Good, 1000, now);
        let second = review_card(&mut card, Difficulty::Again, 1000, now);
        let next_day = now + chrono::Days::new(1);
        let third = review_card(&mut card, Difficulty::Good, 1000, next_day);

        let summaries = daily_summaries(&[first, second, third]);
        assert_eq!(summaries.len(), 2);

        let day_one = summaries.get(&now.date_naive()).unwrap();
        assert_eq!(day_one.new_cards, 1); // first review of a fresh card
        assert_eq!(day_one.reviewed_cards, 1);
        assert_eq!(day_one.correct_cards, 1);

        // "Again" reset repetitions to zero, so the next review counts as new
        // again, matching the upstream delta definition.
        let day_two = summaries.get(&next_day.date_naive()).unwrap();
        assert_eq!(day_two.new_cards, 1);
        assert_eq!(day_two.correct_cards, 1);
    }

    #[test]
    fn distributions_count_every_card_once() {
        let now = fixed_now();
        let mut cards = vec![
            Card::new("a", "1", "", "", now),
            Card::new("a", "2", "", "", now),
            Card::new("b", "3", "", "", now),
        ];
        cards[0].leitner_box = crate::scheduler::LeitnerBox::Box3;
        cards[0].status = Status::Reviewing;
        cards[1].status = Status::Suspended;

        let boxes = box_distribution(&cards);
        assert_eq!(boxes[0], 2);
        assert_eq!(boxes[2], 1);
        assert_eq!(boxes.iter().sum::<u32>(), 3);

        let statuses = status_counts(&cards);
        assert_eq!(statuses.new, 1);
        assert_eq!(statuses.reviewing, 1);
        assert_eq!(statuses.suspended, 1);
    }

    #[test]
    fn collection_stats_shape() {
        let now = fixed_now();
        let mut cards = Vec::new();
        for i in 0..30 {
            cards.push(Card::new("deck", &format!("q{i}"), "", "", now));
        }
        cards[0].total_reviews = 4;
        cards[0].correct_reviews = 3;
        cards[1].status = Status::Suspended;

        let stats = collection_stats(&cards, now);
        assert_eq!(stats.total_cards, 30);
        assert_eq!(stats.due_cards, 29); // suspended card is not due
        assert_eq!(stats.average_retention_rate, 75.0);
        assert_eq!(stats.review_distribution.max_new_cards, 3);
        assert_eq!(stats.review_distribution.max_review_cards, 100);
    }
}
