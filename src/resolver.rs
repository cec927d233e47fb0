//! Command resolution
//!
//! Turns a raw transcript into one command from the vocabulary, or refuses.
//! Matching runs a ladder of increasingly loose strategies: exact phrase,
//! token containment, then fuzzy similarity gated by a score threshold.
//! Guessing wrong launches the wrong program, so anything below the
//! threshold or tied between entries is rejected rather than picked.

use crate::config::ResolverConfig;
use crate::vocabulary::{number_value, ActionKind, CommandEntry, Vocabulary};
use strsim::jaro_winkler;

/// Confidence reported for token-containment matches, between an exact
/// phrase hit and the fuzzy threshold
const CONTAINMENT_CONFIDENCE: f64 = 0.9;

/// A transcript successfully mapped onto the vocabulary
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCommand {
    /// Canonical name of the matched entry
    pub name: String,
    pub action: ActionKind,
    /// Executable command line for app actions, empty otherwise
    pub payload: String,
    /// Match confidence in [0, 1]; exact matches report 1.0
    pub confidence: f64,
    /// Spoken step amount for volume and brightness commands
    pub amount: Option<u8>,
}

/// Why a transcript was not resolved
#[derive(Debug, Clone, PartialEq)]
pub enum NoMatch {
    /// Nothing left after normalisation
    Empty,
    /// Best candidate scored under the fuzzy threshold
    BelowThreshold { best: String, score: f64 },
    /// Two or more entries matched equally well
    Ambiguous { candidates: Vec<String> },
}

impl std::fmt::Display for NoMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NoMatch::Empty => write!(f, "nothing recognisable was said"),
            NoMatch::BelowThreshold { best, score } => {
                write!(f, "closest was '{}' at {:.2}, below threshold", best, score)
            }
            NoMatch::Ambiguous { candidates } => {
                write!(f, "ambiguous between {}", candidates.join(", "))
            }
        }
    }
}

/// What the leading verb, if any, asked for
#[derive(Clone, Copy, PartialEq)]
enum Intent {
    Bare,
    Open,
    Close,
}

/// Resolve a transcript against one vocabulary snapshot
pub fn resolve(
    vocab: &Vocabulary,
    transcript: &str,
    cfg: &ResolverConfig,
) -> Result<ResolvedCommand, NoMatch> {
    let (tokens, amount) = normalise(transcript, cfg);
    if tokens.is_empty() {
        return Err(NoMatch::Empty);
    }
    let text = tokens.join(" ");

    // Stop phrases are matched exactly and before anything else, so the
    // assistant can always be shut down by voice
    if cfg.stop_phrases.iter().any(|p| p.to_lowercase() == text) {
        return Ok(ResolvedCommand {
            name: "stop listening".to_string(),
            action: ActionKind::StopListening,
            payload: String::new(),
            confidence: 1.0,
            amount: None,
        });
    }

    let (intent, target) = split_intent(&tokens, cfg);
    if target.is_empty() {
        return Err(NoMatch::Empty);
    }

    // "close all" arrives here as verb 'close' plus remainder 'all'
    if intent == Intent::Close && matches!(target.join(" ").as_str(), "all" | "everything") {
        return Ok(ResolvedCommand {
            name: "close all".to_string(),
            action: ActionKind::CloseAll,
            payload: String::new(),
            confidence: 1.0,
            amount: None,
        });
    }

    let (entry, confidence) = match_target(vocab, &target, cfg)?;
    Ok(build_command(entry, intent, confidence, amount))
}

/// Lowercase, strip punctuation and unknown-word tokens, drop fillers and
/// the assistant's own name, and pull out a spoken amount
fn normalise(transcript: &str, cfg: &ResolverConfig) -> (Vec<String>, Option<u8>) {
    // Apostrophes are removed outright so "what's" matches "whats";
    // other punctuation becomes a token boundary
    let cleaned: String = transcript
        .replace("[unk]", " ")
        .to_lowercase()
        .chars()
        .filter_map(|c| {
            if c == '\'' {
                None
            } else if c.is_alphanumeric() || c.is_whitespace() {
                Some(c)
            } else {
                Some(' ')
            }
        })
        .collect();

    let tokens: Vec<String> = cleaned.split_whitespace().map(str::to_string).collect();

    // Longest sequences first so multi-word fillers are removed whole
    let mut sequences: Vec<Vec<String>> = cfg
        .filler_phrases
        .iter()
        .chain(std::iter::once(&cfg.assistant_name))
        .map(|p| p.to_lowercase().split_whitespace().map(str::to_string).collect())
        .collect();
    sequences.sort_by_key(|s: &Vec<String>| std::cmp::Reverse(s.len()));

    let tokens = remove_sequences(tokens, &sequences);

    // First numeric token becomes the amount; numeric tokens never name
    // a command, so they are dropped from the match text
    let mut amount = None;
    let tokens = tokens
        .into_iter()
        .filter(|t| match number_value(t) {
            Some(n) => {
                if amount.is_none() {
                    amount = Some(n);
                }
                false
            }
            None => true,
        })
        .collect();

    (tokens, amount)
}

/// Remove every occurrence of the given token sequences
fn remove_sequences(tokens: Vec<String>, sequences: &[Vec<String>]) -> Vec<String> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    'scan: while i < tokens.len() {
        for seq in sequences {
            if !seq.is_empty()
                && tokens.len() - i >= seq.len()
                && tokens[i..i + seq.len()] == seq[..]
            {
                i += seq.len();
                continue 'scan;
            }
        }
        out.push(tokens[i].clone());
        i += 1;
    }
    out
}

/// Peel a leading open/close verb and any article off the tokens
fn split_intent<'a>(tokens: &'a [String], cfg: &ResolverConfig) -> (Intent, Vec<&'a str>) {
    let first = tokens[0].as_str();
    let (intent, rest) = if cfg.open_verbs.iter().any(|v| v == first) {
        (Intent::Open, &tokens[1..])
    } else if cfg.close_verbs.iter().any(|v| v == first) {
        (Intent::Close, &tokens[1..])
    } else {
        (Intent::Bare, tokens)
    };

    let mut target: Vec<&str> = rest.iter().map(String::as_str).collect();
    if matches!(target.first(), Some(&"the") | Some(&"a") | Some(&"an")) {
        target.remove(0);
    }
    (intent, target)
}

/// Match ladder over one vocabulary snapshot
fn match_target<'a>(
    vocab: &'a Vocabulary,
    target: &[&str],
    cfg: &ResolverConfig,
) -> Result<(&'a CommandEntry, f64), NoMatch> {
    let target_text = target.join(" ");

    // 1. Exact phrase
    if let Some(entry) = vocab.lookup(&target_text) {
        return Ok((entry, 1.0));
    }

    // 2. Token containment: the spoken target contains a known phrase or
    // a known phrase contains the target, as whole words in order
    let contained: Vec<(&str, &CommandEntry)> = vocab
        .phrases()
        .filter(|(phrase, _)| {
            let phrase_tokens: Vec<&str> = phrase.split_whitespace().collect();
            contains_tokens(target, &phrase_tokens) || contains_tokens(&phrase_tokens, target)
        })
        .collect();
    if !contained.is_empty() {
        let entry = pick_most_specific(&contained)?;
        return Ok((entry, CONTAINMENT_CONFIDENCE));
    }

    // 3. Fuzzy similarity
    let mut best_score = 0.0f64;
    let mut best: Vec<(&str, &CommandEntry)> = Vec::new();
    for (phrase, entry) in vocab.phrases() {
        let score = jaro_winkler(&target_text, phrase);
        if score > best_score + f64::EPSILON {
            best_score = score;
            best = vec![(phrase, entry)];
        } else if (score - best_score).abs() <= f64::EPSILON {
            best.push((phrase, entry));
        }
    }

    if best_score < cfg.fuzzy_threshold {
        let best_phrase = best.first().map(|(p, _)| p.to_string()).unwrap_or_default();
        return Err(NoMatch::BelowThreshold {
            best: best_phrase,
            score: best_score,
        });
    }

    let entry = pick_most_specific(&best)?;
    Ok((entry, best_score))
}

/// True when `needle` appears in `hay` as a contiguous run of whole tokens
fn contains_tokens(hay: &[&str], needle: &[&str]) -> bool {
    !needle.is_empty() && hay.windows(needle.len()).any(|w| w == needle)
}

/// Among equally ranked phrase matches, prefer the most specific phrase:
/// most tokens, then most characters. Candidates that still tie but name
/// different entries are a refusal, not a coin flip.
fn pick_most_specific<'a>(
    candidates: &[(&str, &'a CommandEntry)],
) -> Result<&'a CommandEntry, NoMatch> {
    let key = |phrase: &str| (phrase.split_whitespace().count(), phrase.len());

    let best_key = candidates
        .iter()
        .map(|(p, _)| key(p))
        .max()
        .unwrap_or((0, 0));

    let mut names: Vec<&str> = candidates
        .iter()
        .filter(|(p, _)| key(p) == best_key)
        .map(|(_, e)| e.name.as_str())
        .collect();
    names.sort_unstable();
    names.dedup();

    if names.len() > 1 {
        return Err(NoMatch::Ambiguous {
            candidates: names.iter().map(|n| n.to_string()).collect(),
        });
    }

    let winner = names[0];
    Ok(candidates
        .iter()
        .find(|(_, e)| e.name == winner)
        .map(|(_, e)| *e)
        .unwrap_or(candidates[0].1))
}

/// Apply the spoken verb to the matched entry
fn build_command(
    entry: &CommandEntry,
    intent: Intent,
    confidence: f64,
    amount: Option<u8>,
) -> ResolvedCommand {
    let action = match (entry.action, intent) {
        // A close verb flips an app entry from launching to closing
        (ActionKind::LaunchApp, Intent::Close) => ActionKind::CloseApp,
        (action, _) => action,
    };

    ResolvedCommand {
        name: entry.name.clone(),
        action,
        payload: entry.payload.clone(),
        confidence,
        amount,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocabulary::VocabularyStore;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn vocab() -> Arc<Vocabulary> {
        // A path that cannot exist yields the built-in vocabulary
        VocabularyStore::new(PathBuf::from("/nonexistent/hark-test/apps.json")).snapshot()
    }

    fn cfg() -> ResolverConfig {
        ResolverConfig::default()
    }

    #[test]
    fn test_exact_match_has_full_confidence() {
        let vocab = vocab();
        let cmd = resolve(&vocab, "open firefox", &cfg()).unwrap();
        assert_eq!(cmd.name, "firefox");
        assert_eq!(cmd.action, ActionKind::LaunchApp);
        assert_eq!(cmd.payload, "firefox");
        assert_eq!(cmd.confidence, 1.0);
    }

    #[test]
    fn test_bare_target_launches() {
        let vocab = vocab();
        let cmd = resolve(&vocab, "firefox", &cfg()).unwrap();
        assert_eq!(cmd.action, ActionKind::LaunchApp);
        assert_eq!(cmd.confidence, 1.0);
    }

    #[test]
    fn test_close_verb_flips_app_to_close() {
        let vocab = vocab();
        let cmd = resolve(&vocab, "close firefox", &cfg()).unwrap();
        assert_eq!(cmd.name, "firefox");
        assert_eq!(cmd.action, ActionKind::CloseApp);
    }

    #[test]
    fn test_misrecognised_target_still_resolves() {
        // "browzer" is garbled but "brave" survives as a whole token
        let vocab = vocab();
        let cmd = resolve(&vocab, "close brave browzer", &cfg()).unwrap();
        assert_eq!(cmd.name, "brave");
        assert_eq!(cmd.action, ActionKind::CloseApp);
        assert!(cmd.confidence >= cfg().fuzzy_threshold);
        assert!(cmd.confidence < 1.0);
    }

    #[test]
    fn test_fuzzy_match_recovers_misspelled_name() {
        let vocab = vocab();
        let cmd = resolve(&vocab, "open firefax", &cfg()).unwrap();
        assert_eq!(cmd.name, "firefox");
        assert!(cmd.confidence >= cfg().fuzzy_threshold);
        assert!(cmd.confidence < 1.0);
    }

    #[test]
    fn test_gibberish_is_refused() {
        let vocab = vocab();
        let result = resolve(&vocab, "purple elephant dancing", &cfg());
        assert!(matches!(result, Err(NoMatch::BelowThreshold { .. })));
    }

    #[test]
    fn test_unknown_tokens_alone_are_empty() {
        let vocab = vocab();
        assert_eq!(resolve(&vocab, "[unk] [unk]", &cfg()), Err(NoMatch::Empty));
        assert_eq!(resolve(&vocab, "", &cfg()), Err(NoMatch::Empty));
        assert_eq!(resolve(&vocab, "   ", &cfg()), Err(NoMatch::Empty));
    }

    #[test]
    fn test_fillers_and_name_are_stripped() {
        let vocab = vocab();
        let cmd = resolve(&vocab, "hark can you open firefox please", &cfg()).unwrap();
        assert_eq!(cmd.name, "firefox");
        assert_eq!(cmd.confidence, 1.0);
    }

    #[test]
    fn test_articles_are_stripped() {
        let vocab = vocab();
        let cmd = resolve(&vocab, "open the terminal", &cfg()).unwrap();
        assert_eq!(cmd.name, "terminal");
    }

    #[test]
    fn test_stop_phrases_match_exactly() {
        let vocab = vocab();
        let cmd = resolve(&vocab, "stop listening", &cfg()).unwrap();
        assert_eq!(cmd.action, ActionKind::StopListening);
        assert_eq!(cmd.confidence, 1.0);

        let cmd = resolve(&vocab, "die", &cfg()).unwrap();
        assert_eq!(cmd.action, ActionKind::StopListening);

        // Embedded in a longer utterance it is not a stop request
        let result = resolve(&vocab, "stop listening to music", &cfg());
        assert!(result.is_err() || result.unwrap().action != ActionKind::StopListening);
    }

    #[test]
    fn test_volume_with_spoken_amount() {
        let vocab = vocab();
        let cmd = resolve(&vocab, "volume up twenty", &cfg()).unwrap();
        assert_eq!(cmd.action, ActionKind::VolumeUp);
        assert_eq!(cmd.amount, Some(20));

        let cmd = resolve(&vocab, "volume down", &cfg()).unwrap();
        assert_eq!(cmd.action, ActionKind::VolumeDown);
        assert_eq!(cmd.amount, None);
    }

    #[test]
    fn test_verb_aliases() {
        let vocab = vocab();
        assert_eq!(
            resolve(&vocab, "launch gimp", &cfg()).unwrap().action,
            ActionKind::LaunchApp
        );
        assert_eq!(
            resolve(&vocab, "kill gimp", &cfg()).unwrap().action,
            ActionKind::CloseApp
        );
    }

    #[test]
    fn test_close_all_forms() {
        let vocab = vocab();
        assert_eq!(
            resolve(&vocab, "close all", &cfg()).unwrap().action,
            ActionKind::CloseAll
        );
        assert_eq!(
            resolve(&vocab, "kill everything", &cfg()).unwrap().action,
            ActionKind::CloseAll
        );
    }

    #[test]
    fn test_containment_matches_phrase_inside_utterance() {
        let vocab = vocab();
        let cmd = resolve(&vocab, "open task manager now", &cfg()).unwrap();
        assert_eq!(cmd.name, "task manager");
        assert_eq!(cmd.confidence, CONTAINMENT_CONFIDENCE);
    }

    #[test]
    fn test_equal_candidates_are_ambiguous() {
        let rhythmbox = CommandEntry {
            name: "rhythmbox".to_string(),
            aliases: vec![],
            action: ActionKind::LaunchApp,
            payload: "rhythmbox".to_string(),
        };
        let celluloid = CommandEntry {
            name: "celluloid".to_string(),
            aliases: vec![],
            action: ActionKind::LaunchApp,
            payload: "celluloid".to_string(),
        };
        // Same token count, same length, different entries
        let candidates: Vec<(&str, &CommandEntry)> =
            vec![("music player", &rhythmbox), ("video player", &celluloid)];

        let result = pick_most_specific(&candidates);
        assert_eq!(
            result.unwrap_err(),
            NoMatch::Ambiguous {
                candidates: vec!["celluloid".to_string(), "rhythmbox".to_string()],
            }
        );
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let vocab = vocab();
        let first = resolve(&vocab, "open sublime", &cfg()).unwrap();
        for _ in 0..10 {
            assert_eq!(resolve(&vocab, "open sublime", &cfg()).unwrap(), first);
        }
    }
}
