use std::env;

use markov_core::MarkovMap;
use markov_core::io::{build_output_path, load_snapshot, read_lines, save_snapshot};
use markov_core::random::RngSource;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Usage: markov-demo [corpus] [max window] [phrase tokens] [min characters]
    let args: Vec<String> = env::args().collect();
    let corpus = args.get(1).map(String::as_str).unwrap_or("./data/corpus.txt");
    let max_window: usize = args.get(2).map(|s| s.parse::<usize>()).transpose()?.unwrap_or(3);
    let phrase_len: usize = args.get(3).map(|s| s.parse::<usize>()).transpose()?.unwrap_or(8);
    let min_length: usize = args.get(4).map(|s| s.parse::<usize>()).transpose()?.unwrap_or(20);

    // Reuse the binary snapshot next to the corpus if one exists
    let snapshot_path = build_output_path(corpus, "bin")?;
    let mut models = if snapshot_path.exists() {
        MarkovMap::build_from(load_snapshot(&snapshot_path)?)?
    } else {
        let lines = read_lines(corpus)?;
        let models = MarkovMap::from_lines(&lines, 1..=max_window)?;
        save_snapshot(&snapshot_path, &models.save())?;
        models
    };
    log::info!("Models available for window sizes {:?}", models.window_sizes());

    let mut random = RngSource::thread();
    for i in 0..10 {
        match models.generate_phrase(phrase_len, min_length, &mut random) {
            Ok(phrase) => println!("Generated phrase {}: {}", i + 1, phrase),
            Err(e) => println!("Generation failed: {}", e),
        }
    }

    Ok(())
}
