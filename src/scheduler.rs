// Dual-model spaced repetition scheduler: an SM-2-style estimator driven by
// the Ebbinghaus forgetting curve, plus a Leitner box system. Both are pure
// functions; review.rs merges their outputs.

pub const MIN_EASE: f64 = 1.3;
pub const MAX_INTERVAL_DAYS: u32 = 365;

pub const DEFAULT_MAX_NEW: u32 = 20;
pub const DEFAULT_MAX_REVIEW: u32 = 100;

// Fixed review interval for each Leitner box, in days.
const LEITNER_INTERVALS: [u32; 7] = [1, 2, 4, 7, 14, 30, 90];

#[derive(Clone, Copy, PartialEq, Eq, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Again,
    Hard,
    Good,
    Easy,
}

impl Difficulty {
    pub fn from_u8(n: u8) -> Option<Difficulty> {
        match n {
            1 => Some(Difficulty::Again),
            2 => Some(Difficulty::Hard),
            3 => Some(Difficulty::Good),
            4 => Some(Difficulty::Easy),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Again => "again",
            Difficulty::Hard => "hard",
            Difficulty::Good => "good",
            Difficulty::Easy => "easy",
        }
    }

    pub fn parse(s: &str) -> Option<Difficulty> {
        match s {
            "again" => Some(Difficulty::Again),
            "hard" => Some(Difficulty::Hard),
            "good" => Some(Difficulty::Good),
            "easy" => Some(Difficulty::Easy),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, serde::Serialize, serde::Deserialize)]
pub enum LeitnerBox {
    #[serde(rename = "box_1")]
    Box1,
    #[serde(rename = "box_2")]
    Box2,
    #[serde(rename = "box_3")]
    Box3,
    #[serde(rename = "box_4")]
    Box4,
    #[serde(rename = "box_5")]
    Box5,
    #[serde(rename = "box_6")]
    Box6,
    #[serde(rename = "box_7")]
    Box7,
}

impl LeitnerBox {
    pub fn index(self) -> usize {
        self as usize
    }

    /// Box for a zero-based index, clamped to the highest box.
    pub fn from_index(index: usize) -> LeitnerBox {
        const BOXES: [LeitnerBox; 7] = [
            LeitnerBox::Box1,
            LeitnerBox::Box2,
            LeitnerBox::Box3,
            LeitnerBox::Box4,
            LeitnerBox::Box5,
            LeitnerBox::Box6,
            LeitnerBox::Box7,
        ];
        BOXES[index.min(BOXES.len() - 1)]
    }

    pub fn from_number(n: u8) -> Option<LeitnerBox> {
        if (1..=7).contains(&n) {
            Some(LeitnerBox::from_index(n as usize - 1))
        } else {
            None
        }
    }

    pub fn number(self) -> u8 {
        self.index() as u8 + 1
    }

    /// Fixed canonical interval for this box, in days.
    pub fn interval_days(self) -> u32 {
        LEITNER_INTERVALS[self.index()]
    }
}

fn ease_delta(difficulty: Difficulty) -> f64 {
    match difficulty {
        Difficulty::Again => -0.8,
        Difficulty::Hard => -0.15,
        Difficulty::Good => 0.0,
        Difficulty::Easy => 0.15,
    }
}

pub struct Sm2Outcome {
    pub ease_factor: f64,
    pub interval: u32,
    pub repetitions: u32,
}

/// SM-2-style estimate of the next review interval.
///
/// "Again" starts a fresh learning cycle: repetitions and interval reset
/// regardless of history. The first two successful repetitions use fixed
/// bootstrap intervals (1 and 6 days); after that the interval grows
/// geometrically by the ease factor, nudged down for "hard" and up for
/// "easy". The result is clamped to at most a year.
pub fn estimate(
    ease_factor: f64,
    interval: u32,
    repetitions: u32,
    difficulty: Difficulty,
) -> Sm2Outcome {
    let new_ease = f64::max(MIN_EASE, ease_factor + ease_delta(difficulty));

    let (new_interval, new_repetitions) = if difficulty == Difficulty::Again {
        (1, 0)
    } else {
        let reps = repetitions + 1;
        let days = match reps {
            1 => 1,
            2 => 6,
            _ => {
                let grown = (interval as f64 * new_ease).ceil() as u32;
                match difficulty {
                    Difficulty::Hard => u32::max(1, (grown as f64 * 0.8).ceil() as u32),
                    Difficulty::Easy => (grown as f64 * 1.3).ceil() as u32,
                    _ => grown,
                }
            }
        };
        (days, reps)
    };

    Sm2Outcome {
        ease_factor: new_ease,
        interval: new_interval.clamp(1, MAX_INTERVAL_DAYS),
        repetitions: new_repetitions,
    }
}

/// Leitner transition for one review.
///
/// `repetitions` is the count *before* the review is applied; it gates the
/// "hard" demotion so that well-rehearsed cards hold their box.
pub fn advance_box(current: LeitnerBox, difficulty: Difficulty, repetitions: u32) -> LeitnerBox {
    let index = current.index();
    match difficulty {
        Difficulty::Again => LeitnerBox::Box1,
        Difficulty::Hard => {
            if index > 0 && repetitions < 3 {
                LeitnerBox::from_index(index - 1)
            } else {
                current
            }
        }
        Difficulty::Good => LeitnerBox::from_index(index + 1),
        Difficulty::Easy => LeitnerBox::from_index(index + 2),
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, serde::Serialize)]
pub struct Distribution {
    pub max_new_cards: u32,
    pub max_review_cards: u32,
    pub study_minutes: u32,
}

/// Recommended daily caps for a collection of the given size.
pub fn recommend_distribution(total_cards: u32, max_new: u32, max_review: u32) -> Distribution {
    Distribution {
        max_new_cards: u32::min(max_new, u32::max(1, total_cards / 10)),
        max_review_cards: max_review,
        study_minutes: u32::min(60, u32::max(10, total_cards / 5)),
    }
}

/// Percentage of reviews answered correctly, rounded to two decimals.
pub fn retention_rate(correct_reviews: u32, total_reviews: u32) -> f64 {
    if total_reviews == 0 {
        return 0.0;
    }
    (correct_reviews as f64 / total_reviews as f64 * 10000.0).round() / 100.0
}
