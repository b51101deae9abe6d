use std::io::{BufRead, Write};
use std::time::Duration;

use color_eyre::eyre::{Result, WrapErr};
use tokio::sync::Mutex;

use crate::models::{Candidate, Track};

/// A source track the engine could not decide on, with its ranked candidates.
#[derive(Debug, Clone)]
pub struct ResolutionRequest {
    pub source: Track,
    /// Candidates with their final scores, best first.
    pub candidates: Vec<(Candidate, f64)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Index into [`ResolutionRequest::candidates`].
    Select(usize),
    /// Confirmed non-match.
    Skip,
}

/// Human-in-the-loop fallback for undecided tracks.
///
/// Implementations must not show two prompts at the same time; the matching
/// engine awaits `resolve` for that track only, other tracks keep matching.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait InteractiveResolver: Send + Sync {
    async fn resolve(&self, request: ResolutionRequest) -> Result<Resolution>;
}

/// Numbered-list prompt on stdin/stdout.
pub struct ConsoleResolver {
    prompt_lock: Mutex<()>,
}

impl ConsoleResolver {
    pub fn new() -> Self {
        Self {
            prompt_lock: Mutex::new(()),
        }
    }
}

impl Default for ConsoleResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn format_duration(duration_ms: Option<u64>) -> String {
    match duration_ms {
        Some(ms) => humantime::format_duration(Duration::from_secs(ms / 1000)).to_string(),
        None => "?".to_string(),
    }
}

fn render_prompt(request: &ResolutionRequest) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "\nNo confident match for: {} - {} ({})\n",
        request.source.artist,
        request.source.title,
        format_duration(request.source.duration_ms)
    ));
    if request.candidates.is_empty() {
        out.push_str("  (no candidates found)\n");
    }
    for (i, (candidate, score)) in request.candidates.iter().enumerate() {
        out.push_str(&format!(
            "  {:>2}. {} - {} ({}) [{:.2}{}]\n",
            i + 1,
            candidate.track.artist,
            candidate.track.title,
            format_duration(candidate.track.duration_ms),
            score,
            if candidate.is_liked { ", liked" } else { "" }
        ));
    }
    out.push_str("Select a number, or 's' to skip: ");
    out
}

/// Interpret one line of user input. `None` means "ask again".
fn parse_answer(answer: &str, candidate_count: usize) -> Option<Resolution> {
    let answer = answer.trim();
    if answer.eq_ignore_ascii_case("s") || answer.eq_ignore_ascii_case("skip") {
        return Some(Resolution::Skip);
    }
    match answer.parse::<usize>() {
        Ok(n) if n >= 1 && n <= candidate_count => Some(Resolution::Select(n - 1)),
        _ => None,
    }
}

#[async_trait::async_trait]
impl InteractiveResolver for ConsoleResolver {
    async fn resolve(&self, request: ResolutionRequest) -> Result<Resolution> {
        let _guard = self.prompt_lock.lock().await;
        let prompt = render_prompt(&request);
        let count = request.candidates.len();

        tokio::task::spawn_blocking(move || -> Result<Resolution> {
            let stdin = std::io::stdin();
            let mut stdout = std::io::stdout();
            loop {
                write!(stdout, "{}", prompt).wrap_err("Failed to write prompt")?;
                stdout.flush().wrap_err("Failed to flush prompt")?;

                let mut line = String::new();
                let read = stdin
                    .lock()
                    .read_line(&mut line)
                    .wrap_err("Failed to read selection")?;
                if read == 0 {
                    // stdin closed: nobody left to ask
                    return Ok(Resolution::Skip);
                }
                if let Some(resolution) = parse_answer(&line, count) {
                    return Ok(resolution);
                }
                writeln!(stdout, "Invalid choice: {}", line.trim()).ok();
            }
        })
        .await
        .wrap_err("Prompt task panicked")?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::track;

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer("1\n", 3), Some(Resolution::Select(0)));
        assert_eq!(parse_answer(" 3 ", 3), Some(Resolution::Select(2)));
        assert_eq!(parse_answer("s", 3), Some(Resolution::Skip));
        assert_eq!(parse_answer("SKIP", 0), Some(Resolution::Skip));
        assert_eq!(parse_answer("0", 3), None);
        assert_eq!(parse_answer("4", 3), None);
        assert_eq!(parse_answer("abc", 3), None);
    }

    #[test]
    fn test_render_prompt_lists_candidates() {
        let mut source = track("rb1", "Strobe", "deadmau5");
        source.duration_ms = Some(600_000);
        let request = ResolutionRequest {
            source,
            candidates: vec![(
                Candidate {
                    track: track("sp1", "Strobe - Radio Edit", "deadmau5"),
                    is_liked: true,
                },
                0.7,
            )],
        };

        let prompt = render_prompt(&request);
        assert!(prompt.contains("deadmau5 - Strobe (10m)"));
        assert!(prompt.contains(" 1. deadmau5 - Strobe - Radio Edit (?) [0.70, liked]"));
    }
}
