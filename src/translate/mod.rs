//! Translation fanout shared by both pipelines. One source text goes out
//! to every configured target language; each language succeeds or fails
//! on its own.

use log::{debug, warn};
use std::collections::HashMap;
use std::fmt;

use crate::settings::{Formality, TranslationSettings};

#[derive(Debug)]
pub enum TranslateError {
    /// The engine rejects the formality parameter for this target
    /// language. Retryable without it.
    UnsupportedFormality,
    Engine(anyhow::Error),
}

impl fmt::Display for TranslateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranslateError::UnsupportedFormality => {
                write!(f, "formality is not supported for this target language")
            }
            TranslateError::Engine(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for TranslateError {}

/// Translation boundary. The concrete engine (a machine translation
/// service client) lives outside this crate.
pub trait Translator: Send {
    fn translate(
        &mut self,
        text: &str,
        target_language: &str,
        formality: Formality,
    ) -> Result<String, TranslateError>;
}

/// Per-language outcome of one fanout. Languages that failed appear in
/// `failures` with their final error message and nowhere else.
#[derive(Debug, Default)]
pub struct FanoutOutcome {
    pub translations: HashMap<String, String>,
    pub failures: Vec<(String, String)>,
}

impl FanoutOutcome {
    /// True when every requested language failed. An empty target list
    /// is not a failure.
    pub fn all_failed(&self) -> bool {
        self.translations.is_empty() && !self.failures.is_empty()
    }
}

/// Translate `text` into every configured target language. A failure in
/// one language never affects the others; a formality rejection gets one
/// retry without the formality parameter.
pub fn translate_multi(
    translator: &mut dyn Translator,
    text: &str,
    settings: &TranslationSettings,
) -> FanoutOutcome {
    let mut outcome = FanoutOutcome::default();

    for language in &settings.target_languages {
        match translate_single(translator, text, language, settings.formality) {
            Ok(translated) => {
                outcome.translations.insert(language.clone(), translated);
            }
            Err(e) => {
                warn!("Translation to '{}' failed: {}", language, e);
                outcome.failures.push((language.clone(), e.to_string()));
            }
        }
    }

    outcome
}

/// Translate into one language, with the formality retry applied.
pub fn translate_single(
    translator: &mut dyn Translator,
    text: &str,
    language: &str,
    formality: Formality,
) -> Result<String, TranslateError> {
    match translator.translate(text, language, formality) {
        Err(TranslateError::UnsupportedFormality) if formality != Formality::Default => {
            debug!(
                "'{}' rejects formality, retrying with the default register",
                language
            );
            translator.translate(text, language, Formality::Default)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    /// Rejects formality for "ja" and always fails for "xx".
    struct PickyTranslator;

    impl Translator for PickyTranslator {
        fn translate(
            &mut self,
            text: &str,
            target_language: &str,
            formality: Formality,
        ) -> Result<String, TranslateError> {
            match target_language {
                "ja" if formality != Formality::Default => {
                    Err(TranslateError::UnsupportedFormality)
                }
                "xx" => Err(TranslateError::Engine(anyhow!("unknown language"))),
                _ => Ok(format!("{}:{}", target_language, text)),
            }
        }
    }

    fn settings(languages: &[&str], formality: Formality) -> TranslationSettings {
        TranslationSettings {
            target_languages: languages.iter().map(|l| l.to_string()).collect(),
            formality,
        }
    }

    #[test]
    fn formality_rejection_is_retried_without_it() {
        let outcome = translate_multi(
            &mut PickyTranslator,
            "hello",
            &settings(&["de", "ja"], Formality::Formal),
        );
        assert_eq!(outcome.translations["de"], "de:hello");
        assert_eq!(outcome.translations["ja"], "ja:hello");
        assert!(outcome.failures.is_empty());
    }

    #[test]
    fn one_language_failing_leaves_the_others_intact() {
        let outcome = translate_multi(
            &mut PickyTranslator,
            "hello",
            &settings(&["de", "xx", "fr"], Formality::Default),
        );
        assert_eq!(outcome.translations.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].0, "xx");
        assert!(!outcome.all_failed());
    }

    #[test]
    fn all_failed_distinguishes_total_loss_from_empty_config() {
        let total = translate_multi(
            &mut PickyTranslator,
            "hello",
            &settings(&["xx"], Formality::Default),
        );
        assert!(total.all_failed());

        let empty = translate_multi(&mut PickyTranslator, "hello", &settings(&[], Formality::Default));
        assert!(!empty.all_failed());
    }

    #[test]
    fn formality_rejection_at_default_register_is_a_failure() {
        struct AlwaysReject;
        impl Translator for AlwaysReject {
            fn translate(
                &mut self,
                _text: &str,
                _target_language: &str,
                _formality: Formality,
            ) -> Result<String, TranslateError> {
                Err(TranslateError::UnsupportedFormality)
            }
        }

        let outcome = translate_multi(
            &mut AlwaysReject,
            "hello",
            &settings(&["ja"], Formality::Default),
        );
        assert!(outcome.all_failed());
    }
}
