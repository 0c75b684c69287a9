//! Target-language catalog and selection.
//!
//! The catalog is a fixed, ordered list of labels followed by a
//! [`CUSTOM_OPTION`] sentinel. Choosing the sentinel hands the decision to a
//! free-text field. The last resolved language is remembered through a
//! [`PreferenceStore`] and becomes the next session's initial selection.

use crate::error::ValidationError;
use crate::preferences::{PreferenceStore, SELECTED_LANGUAGE_KEY};
use std::sync::Arc;
use tracing::{debug, warn};

/// Sentinel option that switches to free-text entry.
pub const CUSTOM_OPTION: &str = "Other (Custom)";

/// Language selected when nothing has been remembered yet.
pub const DEFAULT_LANGUAGE: &str = "Spanish";

/// Built-in target languages, in display order.
pub const LANGUAGES: [&str; 21] = [
    "Spanish",
    "Portuguese",
    "Chinese (Mandarin)",
    "Chinese (Cantonese)",
    "French",
    "Haitian Creole",
    "Vietnamese",
    "Khmer",
    "Arabic",
    "Russian",
    "Bengali",
    "Korean",
    "Tagalog",
    "Hindi",
    "Urdu",
    "Persian",
    "Italian",
    "Polish",
    "German",
    "Japanese",
    "Somali",
];

/// Immutable, ordered set of known language labels.
#[derive(Debug, Clone, Copy)]
pub struct LanguageCatalog {
    labels: &'static [&'static str],
}

impl Default for LanguageCatalog {
    fn default() -> Self {
        Self { labels: &LANGUAGES }
    }
}

impl LanguageCatalog {
    pub fn labels(&self) -> &'static [&'static str] {
        self.labels
    }

    /// Catalog labels followed by [`CUSTOM_OPTION`], as a dropdown shows them.
    pub fn options(&self) -> impl Iterator<Item = &'static str> {
        self.labels.iter().copied().chain(std::iter::once(CUSTOM_OPTION))
    }

    /// Exact-label membership.
    pub fn contains(&self, label: &str) -> bool {
        self.labels.contains(&label)
    }

    /// Case-insensitive lookup returning the canonical label.
    pub fn canonical(&self, input: &str) -> Option<&'static str> {
        let needle = input.trim();
        self.labels
            .iter()
            .copied()
            .find(|l| l.eq_ignore_ascii_case(needle))
    }
}

/// What the language control currently shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LanguageChoice {
    /// A catalog entry is selected in the dropdown.
    Catalog(&'static str),
    /// The sentinel is selected; the payload is the free-text field.
    Custom(String),
}

impl LanguageChoice {
    /// Initial choice for a remembered value.
    ///
    /// No value selects [`DEFAULT_LANGUAGE`]. A catalog label selects that
    /// entry. Anything else selects the sentinel with the free-text field
    /// pre-filled, so the user sees their last custom entry.
    pub fn from_preference(catalog: &LanguageCatalog, remembered: Option<&str>) -> Self {
        match remembered {
            None => Self::default_choice(catalog),
            Some(value) if value.trim().is_empty() => Self::default_choice(catalog),
            Some(value) => match catalog.labels().iter().copied().find(|l| *l == value) {
                Some(label) => LanguageChoice::Catalog(label),
                None => LanguageChoice::Custom(value.to_string()),
            },
        }
    }

    /// Choice for a language typed on a command line: catalog labels match
    /// case-insensitively, anything else becomes a custom entry.
    pub fn from_user_input(catalog: &LanguageCatalog, input: &str) -> Self {
        match catalog.canonical(input) {
            Some(label) => LanguageChoice::Catalog(label),
            None => LanguageChoice::Custom(input.to_string()),
        }
    }

    fn default_choice(catalog: &LanguageCatalog) -> Self {
        match catalog.canonical(DEFAULT_LANGUAGE) {
            Some(label) => LanguageChoice::Catalog(label),
            None => LanguageChoice::Custom(DEFAULT_LANGUAGE.to_string()),
        }
    }

    /// Label of the selected dropdown option.
    pub fn selected_option(&self) -> &str {
        match self {
            LanguageChoice::Catalog(label) => label,
            LanguageChoice::Custom(_) => CUSTOM_OPTION,
        }
    }

    /// Contents of the free-text field, if it is active.
    pub fn custom_text(&self) -> Option<&str> {
        match self {
            LanguageChoice::Catalog(_) => None,
            LanguageChoice::Custom(text) => Some(text),
        }
    }

    /// The target language this choice stands for.
    pub fn resolve(&self) -> Result<String, ValidationError> {
        let value = match self {
            LanguageChoice::Catalog(label) => label.trim(),
            LanguageChoice::Custom(text) => text.trim(),
        };
        if value.is_empty() {
            return Err(ValidationError::EmptyTargetLanguage);
        }
        Ok(value.to_string())
    }
}

/// Language control bound to a preference store.
///
/// Reads the remembered value once on construction and writes the resolved
/// value back on every successful [`LanguageSelector::resolve_and_remember`].
pub struct LanguageSelector {
    catalog: LanguageCatalog,
    choice: LanguageChoice,
    store: Arc<dyn PreferenceStore>,
}

impl LanguageSelector {
    pub fn new(catalog: LanguageCatalog, store: Arc<dyn PreferenceStore>) -> Self {
        let remembered = store.get(SELECTED_LANGUAGE_KEY);
        let choice = LanguageChoice::from_preference(&catalog, remembered.as_deref());
        debug!("Initial language selection: {:?}", choice);
        Self {
            catalog,
            choice,
            store,
        }
    }

    pub fn catalog(&self) -> &LanguageCatalog {
        &self.catalog
    }

    pub fn choice(&self) -> &LanguageChoice {
        &self.choice
    }

    /// Pick a dropdown option.
    ///
    /// Picking [`CUSTOM_OPTION`] keeps any text already in the free-text
    /// field. A label outside the catalog is treated as a custom entry.
    pub fn select(&mut self, option: &str) {
        self.choice = if option == CUSTOM_OPTION {
            LanguageChoice::Custom(self.choice.custom_text().unwrap_or_default().to_string())
        } else {
            match self.catalog.labels().iter().copied().find(|l| *l == option) {
                Some(label) => LanguageChoice::Catalog(label),
                None => LanguageChoice::Custom(option.to_string()),
            }
        };
    }

    /// Switch to the sentinel and set the free-text field.
    pub fn set_custom(&mut self, text: impl Into<String>) {
        self.choice = LanguageChoice::Custom(text.into());
    }

    /// Replace the choice wholesale.
    pub fn set_choice(&mut self, choice: LanguageChoice) {
        self.choice = choice;
    }

    /// Resolve the current choice and remember it.
    ///
    /// An empty result is a validation failure and is not persisted. A store
    /// write failure is logged and otherwise ignored: losing the remembered
    /// default must not block the translation.
    pub fn resolve_and_remember(&self) -> Result<String, ValidationError> {
        let language = self.choice.resolve()?;
        if let Err(e) = self.store.set(SELECTED_LANGUAGE_KEY, &language) {
            warn!("Could not remember target language: {}", e);
        }
        Ok(language)
    }
}
