//! Caption segmentation: splitting narration into on-screen word groups and
//! timing each group from the alignment trace.

use rand::Rng;
use tracing::{debug, warn};

use crate::align::{AlignmentTrace, WordTiming};
use crate::error::{Error, Result};

pub const MIN_CHUNK_WORDS: usize = 6;
/// Exclusive upper bound of a random chunk length.
pub const MAX_CHUNK_WORDS: usize = 9;
pub const MIN_LAST_CHUNK_WORDS: usize = 3;
pub const RECONCILE_LOOKAHEAD: usize = 3;
pub const OVERLAP_EPSILON: f64 = 0.01;

#[derive(Debug, Clone, PartialEq)]
pub struct CaptionSegment {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

/// Greedy chunk lengths summing to `word_count`. A last chunk shorter than
/// [`MIN_LAST_CHUNK_WORDS`] is folded into the one before it.
pub fn chunk_sizes(word_count: usize, mut next_len: impl FnMut() -> usize) -> Vec<usize> {
    let mut sizes = Vec::new();
    let mut remaining = word_count;
    while remaining > 0 {
        let len = next_len().clamp(1, remaining);
        sizes.push(len);
        remaining -= len;
    }
    if sizes.len() > 1 && sizes[sizes.len() - 1] < MIN_LAST_CHUNK_WORDS {
        let last = sizes.pop().unwrap_or_default();
        if let Some(prev) = sizes.last_mut() {
            *prev += last;
        }
    }
    sizes
}

pub fn random_chunk_sizes<R: Rng>(word_count: usize, rng: &mut R) -> Vec<usize> {
    chunk_sizes(word_count, || rng.gen_range(MIN_CHUNK_WORDS..MAX_CHUNK_WORDS))
}

/// Lowercase and strip punctuation so reference words compare with aligner output.
pub fn normalize_word(word: &str) -> String {
    word.chars()
        .filter(|c| !c.is_ascii_punctuation())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Brings the reference words back in step with the spoken trace.
///
/// For each trace word the next [`RECONCILE_LOOKAHEAD`] reference words are
/// searched for a match; reference words skipped on the way were dropped by
/// the aligner and are removed. Tokens with no letters or digits can never be
/// spoken and are removed up front. On success the result has exactly one
/// reference word per trace entry.
pub fn reconcile(trace: &[WordTiming], reference: &[&str]) -> Result<Vec<String>> {
    let mut words: Vec<String> = reference
        .iter()
        .filter(|w| !normalize_word(w).is_empty())
        .map(|w| w.to_string())
        .collect();

    for (i, timing) in trace.iter().enumerate() {
        let target = normalize_word(&timing.word);
        let window_end = (i + RECONCILE_LOOKAHEAD).min(words.len());
        let candidates: Vec<String> = words
            .get(i..window_end)
            .unwrap_or_default()
            .iter()
            .map(|w| normalize_word(w))
            .collect();
        let Some(offset) = candidates.iter().position(|c| *c == target) else {
            return Err(Error::AlignmentMismatch {
                word: timing.word.clone(),
                position: i,
                candidates,
            });
        };
        if offset > 0 {
            for skipped in words.drain(i..i + offset) {
                debug!("Deleting word {:?} missing from the alignment", skipped);
            }
        }
    }

    if words.len() > trace.len() {
        warn!(
            "Dropping {} trailing words the aligner did not time",
            words.len() - trace.len()
        );
        words.truncate(trace.len());
    }
    Ok(words)
}

/// Times each chunk from the trace: start of its first word to end of its
/// last word, the final chunk ending with the trace.
pub fn assign_timestamps(
    words: &[String],
    sizes: &[usize],
    trace: &[WordTiming],
) -> Vec<CaptionSegment> {
    let mut segments = Vec::with_capacity(sizes.len());
    let mut first = 0;
    for (index, &size) in sizes.iter().enumerate() {
        let last = first + size - 1;
        let end = if index + 1 == sizes.len() {
            trace[trace.len() - 1].end
        } else {
            trace[last].end
        };
        segments.push(CaptionSegment {
            text: words[first..=last].join(" "),
            start: trace[first].start,
            end,
        });
        first += size;
    }
    segments
}

/// Pulls each segment's end back to just before the next segment's start.
pub fn fix_overlaps(segments: &mut [CaptionSegment]) {
    for i in 1..segments.len() {
        if segments[i].start < segments[i - 1].end {
            debug!(
                "Changing end of segment {} from {:.2} to {:.2}",
                i - 1,
                segments[i - 1].end,
                segments[i].start - OVERLAP_EPSILON
            );
            segments[i - 1].end = segments[i].start - OVERLAP_EPSILON;
        }
    }
}

/// Full segmentation of `text` against a raw alignment trace.
/// `sizes` receives the reconciled word count and returns chunk lengths.
pub fn segment(
    text: &str,
    trace: &AlignmentTrace,
    sizes: impl FnOnce(usize) -> Vec<usize>,
) -> Result<Vec<CaptionSegment>> {
    let spoken = trace.spoken();
    if spoken.is_empty() {
        return Err(Error::service("alignment", "trace contains no spoken words"));
    }
    debug!("Filtered trace is {} words long", spoken.len());

    let reference: Vec<&str> = text.split_whitespace().collect();
    let words = reconcile(&spoken.words, &reference)?;
    let sizes = sizes(words.len());
    let mut segments = assign_timestamps(&words, &sizes, &spoken.words[..words.len()]);
    fix_overlaps(&mut segments);
    Ok(segments)
}

pub fn segment_random<R: Rng>(
    text: &str,
    trace: &AlignmentTrace,
    rng: &mut R,
) -> Result<Vec<CaptionSegment>> {
    segment(text, trace, |count| random_chunk_sizes(count, rng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn trace_of(words: &[&str]) -> Vec<WordTiming> {
        words
            .iter()
            .enumerate()
            .map(|(i, w)| WordTiming::new(*w, i as f64 * 0.5, i as f64 * 0.5 + 0.4))
            .collect()
    }

    #[test]
    fn chunk_size_invariants_hold_for_many_seeds() {
        for seed in 0..200 {
            let mut rng = StdRng::seed_from_u64(seed);
            for count in 3..60 {
                let sizes = random_chunk_sizes(count, &mut rng);
                assert_eq!(sizes.iter().sum::<usize>(), count);
                let (last, rest) = sizes.split_last().unwrap();
                assert!(rest.iter().all(|&s| s >= MIN_CHUNK_WORDS), "{sizes:?}");
                assert!(*last >= MIN_LAST_CHUNK_WORDS, "{sizes:?}");
            }
        }
    }

    #[test]
    fn short_tail_is_merged() {
        assert_eq!(chunk_sizes(14, || 6), vec![6, 8]);
        assert_eq!(chunk_sizes(15, || 6), vec![6, 6, 3]);
        assert_eq!(chunk_sizes(2, || 6), vec![2]);
    }

    #[test]
    fn reconcile_deletes_words_the_aligner_skipped() {
        let trace = trace_of(&["i", "went", "home"]);
        let words = reconcile(&trace, &["I", "uh,", "went", "home."]).unwrap();
        assert_eq!(words, vec!["I", "went", "home."]);
    }

    #[test]
    fn reconcile_skips_punctuation_only_tokens() {
        let trace = trace_of(&["so", "yes"]);
        let words = reconcile(&trace, &["So", "-", "...", "-", "yes"]).unwrap();
        assert_eq!(words, vec!["So", "yes"]);
    }

    #[test]
    fn reconcile_reports_mismatch_beyond_lookahead() {
        let trace = trace_of(&["i", "home"]);
        let err = reconcile(&trace, &["I", "really", "really", "went", "home"]).unwrap_err();
        match err {
            Error::AlignmentMismatch {
                word,
                position,
                candidates,
            } => {
                assert_eq!(word, "home");
                assert_eq!(position, 1);
                assert_eq!(candidates, vec!["really", "really", "went"]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn reconcile_fails_when_reference_runs_out() {
        let trace = trace_of(&["one", "two"]);
        assert!(matches!(
            reconcile(&trace, &["one"]),
            Err(Error::AlignmentMismatch { position: 1, .. })
        ));
    }

    #[test]
    fn reconcile_is_idempotent() {
        let trace = trace_of(&["it", "was", "fine", "really"]);
        let reference = ["It", "um", "was", "fine,", "I", "guess", "really."];
        let once = reconcile(&trace, &reference).unwrap();
        let refs: Vec<&str> = once.iter().map(String::as_str).collect();
        let twice = reconcile(&trace, &refs).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn twelve_words_in_two_groups_take_trace_bounds() {
        let words = [
            "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
            "eleven", "twelve",
        ];
        let timings: Vec<WordTiming> = words
            .iter()
            .enumerate()
            .map(|(i, w)| WordTiming::new(*w, 1.0 + i as f64, 1.75 + i as f64))
            .collect();
        let mut raw = vec![WordTiming::new("", 0.0, 1.0)];
        raw.extend(timings.iter().cloned());
        raw.push(WordTiming::new("<eps>", 12.75, 13.5));
        let trace = AlignmentTrace::new(raw);

        let segments = segment(&words.join(" "), &trace, |n| chunk_sizes(n, || 6)).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "one two three four five six");
        assert_eq!(segments[0].start, timings[0].start);
        assert_eq!(segments[0].end, timings[5].end);
        assert_eq!(segments[1].start, timings[6].start);
        assert_eq!(segments[1].end, timings[11].end);
    }

    #[test]
    fn overlaps_are_clamped() {
        let mut segments = vec![
            CaptionSegment { text: "a".into(), start: 0.0, end: 2.0 },
            CaptionSegment { text: "b".into(), start: 1.5, end: 3.0 },
            CaptionSegment { text: "c".into(), start: 3.0, end: 4.0 },
        ];
        fix_overlaps(&mut segments);
        assert!((segments[0].end - 1.49).abs() < 1e-9);
        assert_eq!(segments[1].end, 3.0);
    }

    #[test]
    fn segments_are_ordered_and_disjoint() {
        let text = "When I got home my roommate had painted the whole kitchen bright \
                    orange without asking and then told me it was my fault for never \
                    being around on weekends";
        let words: Vec<String> = text.split_whitespace().map(normalize_word).collect();
        // Touching boundaries: each word ends where the next starts.
        let mut raw: Vec<WordTiming> = words
            .iter()
            .enumerate()
            .map(|(i, w)| WordTiming::new(w.clone(), i as f64 * 0.3, (i + 1) as f64 * 0.3 + 0.05))
            .collect();
        raw.remove(4);
        let trace = AlignmentTrace::new(raw);

        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let segments = segment_random(text, &trace, &mut rng).unwrap();
            for pair in segments.windows(2) {
                assert!(pair[0].start <= pair[1].start);
                assert!(pair[0].end <= pair[1].start);
            }
            let words_out: usize = segments.iter().map(|s| s.text.split_whitespace().count()).sum();
            assert_eq!(words_out, trace.len());
        }
    }
}
