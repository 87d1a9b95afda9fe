use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Instant;

use chrono::Utc;

use recap::{card, review, scheduler};

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: recap <command> [args...]");
        eprintln!("Commands:");
        eprintln!("  drill <paths...>             Review cards in the terminal");
        eprintln!("  serve <paths...> [-p PORT]   Start the JSON API (default port 3000)");
        std::process::exit(1);
    }

    match args[1].as_str() {
        "drill" => {
            if args.len() < 3 {
                eprintln!("Usage: recap drill <paths...>");
                std::process::exit(1);
            }
            drill(&args[2..]);
        }
        "serve" => {
            if args.len() < 3 {
                eprintln!("Usage: recap serve <paths...> [-p PORT]");
                std::process::exit(1);
            }
            let (paths, port) = parse_serve_args(&args[2..]);
            tokio::runtime::Runtime::new()
                .unwrap()
                .block_on(recap::web::serve(paths, port));
        }
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            eprintln!("Commands: drill, serve");
            std::process::exit(1);
        }
    }
}

fn parse_serve_args(args: &[String]) -> (Vec<String>, u16) {
    let mut paths = Vec::new();
    let mut port = 3000u16;
    let mut i = 0;
    while i < args.len() {
        if args[i] == "-p" && i + 1 < args.len() {
            port = args[i + 1].parse().unwrap_or_else(|_| {
                eprintln!("Invalid port: {}", args[i + 1]);
                std::process::exit(1);
            });
            i += 2;
        } else {
            paths.push(args[i].clone());
            i += 1;
        }
    }
    (paths, port)
}

fn drill(args: &[String]) {
    let files = card::discover_files(args);
    if files.is_empty() {
        eprintln!("No CSV files found.");
        std::process::exit(1);
    }

    // Load all cards, tracking source file per card
    let mut all_cards: Vec<card::Card> = Vec::new();
    let mut card_source: Vec<PathBuf> = Vec::new();

    for file in &files {
        match card::load_csv(file) {
            Ok(cards) => {
                for c in cards {
                    card_source.push(file.clone());
                    all_cards.push(c);
                }
            }
            Err(e) => {
                eprintln!("Warning: {e}");
            }
        }
    }

    if all_cards.is_empty() {
        eprintln!("No cards found.");
        std::process::exit(1);
    }

    let log_path = files[0]
        .parent()
        .map(|p| p.join(card::REVIEW_LOG_NAME))
        .unwrap_or_else(|| PathBuf::from(card::REVIEW_LOG_NAME));

    let now = Utc::now();

    // Show deck summaries
    let summaries = review::deck_summaries(&all_cards, now);
    println!("Decks:");
    for (i, s) in summaries.iter().enumerate() {
        println!(
            "  {}: {} ({} due / {} total)",
            i + 1,
            s.name,
            s.due,
            s.total
        );
    }
    println!("  0: All decks");
    println!();

    let plan = scheduler::recommend_distribution(
        all_cards.len() as u32,
        scheduler::DEFAULT_MAX_NEW,
        scheduler::DEFAULT_MAX_REVIEW,
    );
    println!(
        "Suggested today: up to {} new cards, {} reviews, ~{} minutes.",
        plan.max_new_cards, plan.max_review_cards, plan.study_minutes
    );
    println!();

    // Prompt for selection
    let selected_decks = prompt_deck_selection(&summaries);

    // Filter to due cards in selected decks
    let due_indices = review::filter_due(&all_cards, now);
    let mut queue: Vec<usize> = due_indices
        .into_iter()
        .filter(|&i| selected_decks.is_empty() || selected_decks.contains(&all_cards[i].deck))
        .collect();

    if queue.is_empty() {
        println!("No cards due for review.");
        return;
    }

    println!("{} cards due for review.\n", queue.len());
    shuffle(&mut queue);

    // Drill loop
    let mut counts = [0u32; 4]; // again, hard, good, easy
    let stdin = io::stdin();
    let mut stdin = stdin.lock();

    for (i, &card_idx) in queue.iter().enumerate() {
        println!("[{}/{}] {}", i + 1, queue.len(), all_cards[card_idx].deck);
        println!();
        println!("{}", all_cards[card_idx].front);
        println!();

        let shown_at = Instant::now();

        // Wait for Enter to reveal
        print!("Press Enter to reveal...");
        io::stdout().flush().unwrap();
        let mut buf = String::new();
        stdin.read_line(&mut buf).unwrap();

        println!("{}", all_cards[card_idx].back);
        println!();

        // Get rating
        let difficulty = loop {
            print!("Rate (1=again, 2=hard, 3=good, 4=easy): ");
            io::stdout().flush().unwrap();
            buf.clear();
            stdin.read_line(&mut buf).unwrap();
            if let Ok(n) = buf.trim().parse::<u8>()
                && let Some(d) = scheduler::Difficulty::from_u8(n)
            {
                break d;
            }
            println!("Please enter 1, 2, 3, or 4.");
        };

        let response_ms = shown_at.elapsed().as_millis().min(u32::MAX as u128) as u32;
        let record = review::review_card(
            &mut all_cards[card_idx],
            difficulty,
            response_ms,
            Utc::now(),
        );
        if let Err(e) = review::append_log(&log_path, &record) {
            eprintln!("Warning: {e}");
        }

        let difficulty_idx = match difficulty {
            scheduler::Difficulty::Again => 0,
            scheduler::Difficulty::Hard => 1,
            scheduler::Difficulty::Good => 2,
            scheduler::Difficulty::Easy => 3,
        };
        counts[difficulty_idx] += 1;
        println!();
    }

    // Save all cards back to their source files
    let mut files_to_save: HashMap<PathBuf, Vec<usize>> = HashMap::new();
    for (i, source) in card_source.iter().enumerate() {
        files_to_save.entry(source.clone()).or_default().push(i);
    }

    for (path, indices) in &files_to_save {
        let file_cards: Vec<card::Card> = indices.iter().map(|&i| all_cards[i].clone()).collect();
        if let Err(e) = card::save_csv(path, &file_cards) {
            eprintln!("Error saving {}: {e}", path.display());
        }
    }

    // Session summary
    let total: u32 = counts.iter().sum();
    let correct = total - counts[0];
    println!("Session complete!");
    println!(
        "  Again: {}, Hard: {}, Good: {}, Easy: {}",
        counts[0], counts[1], counts[2], counts[3]
    );
    println!(
        "  Session retention: {:.1}%",
        scheduler::retention_rate(correct, total)
    );
}

fn prompt_deck_selection(summaries: &[review::DeckSummary]) -> Vec<String> {
    let stdin = io::stdin();
    let mut stdin = stdin.lock();
    loop {
        print!("Select deck(s) (comma-separated numbers, or 0 for all): ");
        io::stdout().flush().unwrap();
        let mut buf = String::new();
        stdin.read_line(&mut buf).unwrap();

        let mut selected = Vec::new();
        let mut valid = true;

        for part in buf.trim().split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            match part.parse::<usize>() {
                Ok(0) => return Vec::new(), // all decks
                Ok(n) if n >= 1 && n <= summaries.len() => {
                    selected.push(summaries[n - 1].name.clone());
                }
                _ => {
                    valid = false;
                    break;
                }
            }
        }

        if valid && !selected.is_empty() {
            return selected;
        }
        println!("Invalid selection. Try again.");
    }
}

fn shuffle<T>(items: &mut [T]) {
    // Fisher-Yates with a time-seeded xorshift64
    let mut state: u64 = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos() as u64;
    if state == 0 {
        state = 1;
    }

    for i in (1..items.len()).rev() {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let j = (state as usize) % (i + 1);
        items.swap(i, j);
    }
}
