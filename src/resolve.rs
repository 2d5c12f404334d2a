//! Picks one display value per field out of a word's duplicate records.
//!
//! A record whose first course code is `1` is curator-verified and is taken
//! verbatim. Without one, every field is decided by majority vote across the
//! records, ties going to the value seen first.

use crate::models::{ResolvedEntry, WordRecord};
use std::collections::{BTreeMap, HashMap};

/// Vote counts in first-seen order.
///
/// A `None` count is dead: further votes leave it dead and it never wins.
/// Only `reset` brings it back.
#[derive(Debug, Default)]
struct Tally {
    counts: Vec<(String, Option<u32>)>,
}

impl Tally {
    fn vote(&mut self, key: &str, first: Option<u32>) {
        match self.counts.iter_mut().find(|(k, _)| k == key) {
            Some((_, count)) => *count = count.map(|n| n + 1),
            None => self.counts.push((key.to_string(), first)),
        }
    }

    fn increment(&mut self, key: &str) {
        self.vote(key, Some(1));
    }

    /// Adds a vote to a key already in the table; an unseen key starts dead.
    fn increment_existing(&mut self, key: &str) {
        self.vote(key, None);
    }

    fn reset(&mut self, key: &str) {
        match self.counts.iter_mut().find(|(k, _)| k == key) {
            Some((_, count)) => *count = Some(1),
            None => self.counts.push((key.to_string(), Some(1))),
        }
    }

    /// The key with the strictly highest live count; earlier keys win ties.
    fn winner(&self) -> Option<&str> {
        let mut best: Option<(&str, u32)> = None;
        for (key, count) in &self.counts {
            let Some(count) = *count else { continue };
            if count > best.map_or(0, |(_, n)| n) {
                best = Some((key.as_str(), count));
            }
        }
        best.map(|(key, _)| key)
    }
}

/// Field values chosen from a record list, before audio lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub phonetic: String,
    pub part_of_speech: String,
    pub gloss: String,
    /// Audio path relative to the audio tree, if any record carried one.
    pub audio_path: Option<String>,
    pub authoritative: bool,
}

/// Scans `records` in order and selects the best value for each field.
pub fn select_fields(records: &[WordRecord]) -> Selection {
    let mut phonetics = Tally::default();
    let mut parts_of_speech = Tally::default();
    let mut glosses = Tally::default();
    let mut audio_path: Option<String> = None;

    for record in records {
        if record.is_authoritative() {
            return Selection {
                phonetic: record.phonetic.clone().unwrap_or_default(),
                part_of_speech: record.part_of_speech.clone().unwrap_or_default(),
                gloss: record.gloss.clone().unwrap_or_default(),
                // Audio falls back to whatever earlier records supplied
                audio_path: record.audio_path().map(str::to_string).or(audio_path),
                authoritative: true,
            };
        }

        if let Some(yb) = record.phonetic() {
            phonetics.increment(yb);
        }
        // The UK phonetic shares the phonetic table. Beside a generic phonetic
        // it only adds to a count that already exists, otherwise it restarts at one.
        if let Some(uk) = record.uk_phonetic() {
            if record.phonetic().is_some() {
                phonetics.increment_existing(uk);
            } else {
                phonetics.reset(uk);
            }
        }
        if let Some(cx) = record.part_of_speech() {
            parts_of_speech.increment(cx);
        }
        if let Some(sy) = record.gloss() {
            glosses.increment(sy);
        }
        if audio_path.is_none() {
            audio_path = record.audio_path().map(str::to_string);
        }
    }

    Selection {
        phonetic: phonetics.winner().unwrap_or_default().to_string(),
        part_of_speech: parts_of_speech.winner().unwrap_or_default().to_string(),
        gloss: glosses.winner().unwrap_or_default().to_string(),
        audio_path,
        authoritative: false,
    }
}

impl Selection {
    /// Completes the entry with an audio URL under `audio_url_prefix`.
    pub fn into_entry(self, curated_audio: Option<String>, audio_url_prefix: &str) -> ResolvedEntry {
        let audio_url = self
            .audio_path
            .or(curated_audio)
            .map(|path| format!("{}{}", audio_url_prefix, path))
            .unwrap_or_default();
        ResolvedEntry {
            phonetic: self.phonetic,
            part_of_speech: self.part_of_speech,
            gloss: self.gloss,
            audio_url,
        }
    }
}

// --- Memo ---

/// Least-recently-used memo of resolved entries.
///
/// Each entry carries the tick of its last use; `recency` orders keys by that
/// tick so the oldest one is evicted first. A capacity of zero keeps every
/// entry for the life of the process.
#[derive(Debug)]
pub struct ResolvedMemo {
    capacity: usize,
    entries: HashMap<String, (ResolvedEntry, u64)>,
    recency: BTreeMap<u64, String>,
    tick: u64,
}

impl ResolvedMemo {
    pub fn new(capacity: usize) -> Self {
        ResolvedMemo {
            capacity,
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            tick: 0,
        }
    }

    pub fn get(&mut self, key: &str) -> Option<ResolvedEntry> {
        let tick = self.next_tick();
        let (entry, last_used) = self.entries.get_mut(key)?;
        if self.capacity > 0 {
            let previous = std::mem::replace(last_used, tick);
            self.recency.remove(&previous);
            self.recency.insert(tick, key.to_string());
        }
        Some(entry.clone())
    }

    pub fn insert(&mut self, key: String, entry: ResolvedEntry) {
        let tick = self.next_tick();
        if let Some((_, last_used)) = self.entries.insert(key.clone(), (entry, tick)) {
            self.recency.remove(&last_used);
        }
        if self.capacity == 0 {
            return;
        }
        self.recency.insert(tick, key);
        while self.entries.len() > self.capacity {
            let Some((_, evicted)) = self.recency.pop_first() else {
                break;
            };
            self.entries.remove(&evicted);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}
