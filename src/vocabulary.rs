//! Command vocabulary
//!
//! The set of everything the assistant can be asked to do: a built-in table
//! of desktop applications and control commands, merged with user overrides
//! from `~/.hark/apps.user.json`. The merged vocabulary is published as an
//! immutable snapshot behind an `Arc`; a command cycle works against one
//! snapshot from start to finish while reloads swap in a fresh one.

use crate::config::ResolverConfig;
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

/// What a resolved command asks the dispatcher to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// Launch the application in the payload
    LaunchApp,
    /// Close the application in the payload
    CloseApp,
    /// Close every known application
    CloseAll,
    VolumeUp,
    VolumeDown,
    BrightnessUp,
    BrightnessDown,
    Shutdown,
    Restart,
    Sleep,
    Logout,
    ClipboardCopy,
    ClipboardPaste,
    ClipboardRead,
    /// Shut the assistant itself down
    StopListening,
}

/// One entry in the vocabulary
#[derive(Debug, Clone)]
pub struct CommandEntry {
    /// Canonical spoken name
    pub name: String,
    /// Alternative spoken forms, including common misrecognitions
    pub aliases: Vec<String>,
    pub action: ActionKind,
    /// Executable command line for app entries, empty otherwise
    pub payload: String,
}

impl CommandEntry {
    fn app(name: &str, aliases: &[&str], payload: &str) -> Self {
        Self {
            name: name.to_string(),
            aliases: aliases.iter().map(|s| s.to_string()).collect(),
            action: ActionKind::LaunchApp,
            payload: payload.to_string(),
        }
    }

    fn control(name: &str, aliases: &[&str], action: ActionKind) -> Self {
        Self {
            name: name.to_string(),
            aliases: aliases.iter().map(|s| s.to_string()).collect(),
            action,
            payload: String::new(),
        }
    }

    /// All spoken forms of this entry
    pub fn phrases(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(|s| s.as_str()))
    }
}

/// Built-in application table. Names are what people say (and what the
/// recogniser tends to hear), payloads are the exact executables.
fn builtin_apps() -> Vec<CommandEntry> {
    vec![
        // Browsers and internet
        CommandEntry::app("firefox", &["browser"], "firefox"),
        CommandEntry::app("brave", &["brave browser"], "brave-browser"),
        CommandEntry::app("thunderbird", &["mail"], "thunderbird"),
        // Development
        CommandEntry::app(
            "code",
            &["vs code", "vscode", "visual studio code", "visual studio"],
            "code",
        ),
        CommandEntry::app("sublime text", &["sublime"], "sublime_text"),
        CommandEntry::app("vim", &[], "vim"),
        // Design and creative
        CommandEntry::app("gimp", &["photoshop"], "gimp"),
        CommandEntry::app("inkscape", &[], "inkscape"),
        CommandEntry::app("blender", &[], "blender"),
        // "sigma" is how the recogniser usually hears "figma"
        CommandEntry::app("figma", &["sigma"], "flatpak run com.figma.Figma"),
        // Desktop utilities
        CommandEntry::app("terminal", &["terminal emulator"], "xfce4-terminal"),
        CommandEntry::app("file manager", &["file explorer", "explorer"], "thunar"),
        CommandEntry::app("settings", &["settings manager"], "xfce4-settings-manager"),
        CommandEntry::app("task manager", &[], "xfce4-taskmanager"),
        CommandEntry::app("calculator", &[], "gnome-calculator"),
        CommandEntry::app("calendar", &[], "gnome-calendar"),
        CommandEntry::app("volume control", &["pavucontrol"], "pavucontrol"),
        // Media and communication
        CommandEntry::app("whatsapp", &["whats up"], "whatsapp-desktop"),
        CommandEntry::app("camera", &["cheese"], "cheese"),
        CommandEntry::app("rhythmbox", &["music player"], "rhythmbox"),
        // System tools
        CommandEntry::app("disks", &["disk utility"], "gnome-disks"),
        CommandEntry::app("software manager", &[], "mintinstall"),
        CommandEntry::app("update manager", &[], "mintupdate"),
        CommandEntry::app("printer", &[], "system-config-printer"),
        CommandEntry::app("scan", &[], "simple-scan"),
        CommandEntry::app("firewall", &[], "gufw"),
        CommandEntry::app("archive manager", &["file roller"], "file-roller"),
        CommandEntry::app("transmission", &["downloader"], "transmission-gtk"),
    ]
}

/// Built-in control commands
fn builtin_controls() -> Vec<CommandEntry> {
    use ActionKind::*;
    vec![
        CommandEntry::control(
            "volume up",
            &["increase volume", "raise volume", "louder", "turn it up"],
            VolumeUp,
        ),
        CommandEntry::control(
            "volume down",
            &["decrease volume", "lower volume", "quieter", "turn it down"],
            VolumeDown,
        ),
        CommandEntry::control(
            "brightness up",
            &["increase brightness", "raise brightness", "brighter"],
            BrightnessUp,
        ),
        CommandEntry::control(
            "brightness down",
            &["decrease brightness", "lower brightness", "dimmer"],
            BrightnessDown,
        ),
        CommandEntry::control("shut down", &["shutdown", "power off"], Shutdown),
        CommandEntry::control("restart", &["reboot"], Restart),
        CommandEntry::control("sleep", &["suspend"], Sleep),
        CommandEntry::control("log out", &["logout", "log off", "sign out"], Logout),
        CommandEntry::control("copy", &["copy that"], ClipboardCopy),
        CommandEntry::control("paste", &["paste that"], ClipboardPaste),
        CommandEntry::control(
            "read clipboard",
            &["show clipboard", "clipboard contents"],
            ClipboardRead,
        ),
        CommandEntry::control("close all", &["close everything"], CloseAll),
    ]
}

/// Spoken number words the resolver understands as step amounts
const NUMBER_WORDS: &[(&str, u8)] = &[
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
    ("ten", 10),
    ("fifteen", 15),
    ("twenty", 20),
    ("thirty", 30),
    ("forty", 40),
    ("fifty", 50),
];

/// Parse a spoken or written number token
pub fn number_value(token: &str) -> Option<u8> {
    if let Ok(n) = token.parse::<u8>() {
        return Some(n);
    }
    NUMBER_WORDS
        .iter()
        .find(|(word, _)| *word == token)
        .map(|(_, n)| *n)
}

/// An immutable, fully merged vocabulary snapshot
pub struct Vocabulary {
    entries: Vec<CommandEntry>,
    // lowercase phrase -> entry index; overrides shadow built-ins here
    index: HashMap<String, usize>,
}

impl Vocabulary {
    fn build(overrides: &BTreeMap<String, String>) -> Self {
        let mut entries = builtin_apps();
        entries.extend(builtin_controls());

        for (name, payload) in overrides {
            entries.push(CommandEntry::app(&name.to_lowercase(), &[], payload));
        }

        // Later entries win phrase collisions, so user overrides shadow
        // built-ins with the same spoken form
        let mut index = HashMap::new();
        for (i, entry) in entries.iter().enumerate() {
            for phrase in entry.phrases() {
                index.insert(phrase.to_lowercase(), i);
            }
        }

        Self { entries, index }
    }

    pub fn entries(&self) -> &[CommandEntry] {
        &self.entries
    }

    /// Exact lookup of a spoken phrase
    pub fn lookup(&self, phrase: &str) -> Option<&CommandEntry> {
        self.index
            .get(&phrase.to_lowercase())
            .map(|&i| &self.entries[i])
    }

    /// All (phrase, entry) pairs, with shadowed phrases pointing at their
    /// winning entry
    pub fn phrases(&self) -> impl Iterator<Item = (&str, &CommandEntry)> {
        self.index
            .iter()
            .map(move |(phrase, &i)| (phrase.as_str(), &self.entries[i]))
    }

    /// Word list for the grammar-constrained recogniser
    ///
    /// Sorted and deduplicated so the same vocabulary always produces the
    /// same grammar. `[unk]` lets out-of-vocabulary speech surface as an
    /// unknown token instead of being forced onto a command word.
    pub fn grammar(&self, resolver: &ResolverConfig) -> Vec<String> {
        let mut words = BTreeSet::new();

        for (phrase, _) in self.phrases() {
            for word in phrase.split_whitespace() {
                words.insert(word.to_string());
            }
        }

        let extra_phrases = resolver
            .open_verbs
            .iter()
            .chain(resolver.close_verbs.iter())
            .chain(resolver.stop_phrases.iter())
            .chain(resolver.filler_phrases.iter())
            .chain(std::iter::once(&resolver.assistant_name));
        for phrase in extra_phrases {
            for word in phrase.to_lowercase().split_whitespace() {
                words.insert(word.to_string());
            }
        }

        for (word, _) in NUMBER_WORDS {
            words.insert(word.to_string());
        }

        let mut grammar = vec!["[unk]".to_string()];
        grammar.extend(words);
        grammar
    }
}

#[derive(Deserialize)]
#[serde(transparent)]
struct OverrideFile(BTreeMap<String, String>);

/// Owns the override file and publishes vocabulary snapshots
pub struct VocabularyStore {
    override_path: PathBuf,
    snapshot: RwLock<Arc<Vocabulary>>,
    last_mtime: Mutex<Option<SystemTime>>,
}

impl VocabularyStore {
    /// Build the initial snapshot. Never fails: an unreadable or malformed
    /// override file logs a warning and the built-ins stand alone.
    pub fn new(override_path: PathBuf) -> Self {
        let (overrides, mtime) = read_overrides(&override_path);
        let vocabulary = Arc::new(Vocabulary::build(&overrides));

        tracing::info!(
            "Vocabulary ready: {} entries ({} user overrides)",
            vocabulary.entries().len(),
            overrides.len()
        );

        Self {
            override_path,
            snapshot: RwLock::new(vocabulary),
            last_mtime: Mutex::new(mtime),
        }
    }

    /// Current snapshot; cheap to clone and safe to hold across a cycle
    pub fn snapshot(&self) -> Arc<Vocabulary> {
        self.snapshot.read().clone()
    }

    /// Rebuild the snapshot if the override file changed on disk.
    /// Returns true when a new snapshot was published.
    pub fn reload_if_changed(&self) -> bool {
        let current = file_mtime(&self.override_path);
        {
            let mut last = self.last_mtime.lock();
            if *last == current {
                return false;
            }
            *last = current;
        }

        let (overrides, _) = read_overrides(&self.override_path);
        let vocabulary = Arc::new(Vocabulary::build(&overrides));
        tracing::info!(
            "Vocabulary reloaded: {} entries ({} user overrides)",
            vocabulary.entries().len(),
            overrides.len()
        );
        *self.snapshot.write() = vocabulary;
        true
    }
}

fn file_mtime(path: &PathBuf) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Read the override file, tolerating absence and corruption
fn read_overrides(path: &PathBuf) -> (BTreeMap<String, String>, Option<SystemTime>) {
    let mtime = file_mtime(path);

    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return (BTreeMap::new(), mtime);
        }
        Err(e) => {
            tracing::warn!("Failed to read {}: {}", path.display(), e);
            return (BTreeMap::new(), mtime);
        }
    };

    match serde_json::from_str::<OverrideFile>(&contents) {
        Ok(OverrideFile(map)) => (map, mtime),
        Err(e) => {
            tracing::warn!(
                "Malformed override file {}, using built-ins only: {}",
                path.display(),
                e
            );
            (BTreeMap::new(), mtime)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty() -> Vocabulary {
        Vocabulary::build(&BTreeMap::new())
    }

    #[test]
    fn test_builtin_lookup_by_name_and_alias() {
        let vocab = empty();

        let entry = vocab.lookup("firefox").unwrap();
        assert_eq!(entry.action, ActionKind::LaunchApp);
        assert_eq!(entry.payload, "firefox");

        // Alias resolves to the same entry
        let alias = vocab.lookup("browser").unwrap();
        assert_eq!(alias.name, "firefox");

        // Lookup is case-insensitive
        assert!(vocab.lookup("Firefox").is_some());
    }

    #[test]
    fn test_control_entries_have_no_payload() {
        let vocab = empty();
        let entry = vocab.lookup("volume up").unwrap();
        assert_eq!(entry.action, ActionKind::VolumeUp);
        assert!(entry.payload.is_empty());

        assert_eq!(vocab.lookup("reboot").unwrap().action, ActionKind::Restart);
        assert_eq!(vocab.lookup("power off").unwrap().action, ActionKind::Shutdown);
    }

    #[test]
    fn test_overrides_add_and_shadow() {
        let mut overrides = BTreeMap::new();
        overrides.insert("zed".to_string(), "zeditor".to_string());
        overrides.insert("firefox".to_string(), "firefox-nightly".to_string());

        let vocab = Vocabulary::build(&overrides);

        // New entry is visible
        assert_eq!(vocab.lookup("zed").unwrap().payload, "zeditor");
        // Override shadows the built-in with the same name
        assert_eq!(vocab.lookup("firefox").unwrap().payload, "firefox-nightly");
        // The built-in alias still points somewhere sensible
        assert!(vocab.lookup("browser").is_some());
    }

    #[test]
    fn test_grammar_is_deterministic_and_constrained() {
        let resolver = ResolverConfig::default();
        let vocab = empty();

        let grammar1 = vocab.grammar(&resolver);
        let grammar2 = vocab.grammar(&resolver);
        assert_eq!(grammar1, grammar2);

        assert_eq!(grammar1[0], "[unk]");
        assert!(grammar1.contains(&"firefox".to_string()));
        assert!(grammar1.contains(&"open".to_string()));
        assert!(grammar1.contains(&"volume".to_string()));
        assert!(grammar1.contains(&"twenty".to_string()));

        // No duplicates
        let unique: BTreeSet<_> = grammar1.iter().collect();
        assert_eq!(unique.len(), grammar1.len());
    }

    #[test]
    fn test_number_value() {
        assert_eq!(number_value("20"), Some(20));
        assert_eq!(number_value("twenty"), Some(20));
        assert_eq!(number_value("five"), Some(5));
        assert_eq!(number_value("banana"), None);
    }

    #[test]
    fn test_store_handles_missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();

        // Missing file: built-ins only
        let store = VocabularyStore::new(dir.path().join("absent.json"));
        assert!(store.snapshot().lookup("firefox").is_some());

        // Malformed file: built-ins only, no panic
        let bad = dir.path().join("bad.json");
        fs::write(&bad, "{not json").unwrap();
        let store = VocabularyStore::new(bad);
        assert!(store.snapshot().lookup("firefox").is_some());
    }

    #[test]
    fn test_store_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apps.user.json");

        let store = VocabularyStore::new(path.clone());
        assert!(store.snapshot().lookup("zed").is_none());

        // File appears: mtime goes from None to Some
        fs::write(&path, r#"{"zed": "zeditor"}"#).unwrap();
        assert!(store.reload_if_changed());
        assert_eq!(store.snapshot().lookup("zed").unwrap().payload, "zeditor");

        // Nothing changed: no reload
        assert!(!store.reload_if_changed());
    }
}
