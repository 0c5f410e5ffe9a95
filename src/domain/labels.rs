use serde::{Deserialize, Serialize};

/// Display language of the admin screens.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Fr,
}

impl Locale {
    /// Parses a language tag such as `fr`, `fr-SN` or `en_US`. Unknown tags
    /// fall back to English.
    pub fn from_tag(tag: &str) -> Self {
        let language = tag
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match language.as_str() {
            "fr" => Locale::Fr,
            _ => Locale::En,
        }
    }
}

/// Values that have a human readable name on the admin screens.
pub trait Labelled {
    fn label(&self, locale: Locale) -> &'static str;
}

pub(crate) const UNKNOWN: (&str, &str) = ("Unknown", "Inconnu");

pub(crate) fn pick(pair: (&'static str, &'static str), locale: Locale) -> &'static str {
    match locale {
        Locale::En => pair.0,
        Locale::Fr => pair.1,
    }
}

/// Label of a raw `typeUsersId` code.
pub fn role_label(code: i64, locale: Locale) -> &'static str {
    match crate::domain::UserRole::from_code(code) {
        Some(role) => role.label(locale),
        None => pick(UNKNOWN, locale),
    }
}

/// Label of a raw `statut` code.
pub fn status_label(code: i64, locale: Locale) -> &'static str {
    match crate::domain::UserStatus::from_code(code) {
        Some(status) => status.label(locale),
        None => pick(UNKNOWN, locale),
    }
}

/// Message shown when a screen fails to load or save data.
pub fn generic_error(locale: Locale) -> &'static str {
    pick(
        (
            "Something went wrong. Please try again.",
            "Une erreur est survenue. Veuillez réessayer.",
        ),
        locale,
    )
}

/// Implements [`Labelled`] from a table of `(english, french)` pairs.
macro_rules! impl_labels {
    ($ty:ty { $($variant:ident => ($en:expr, $fr:expr)),+ $(,)? }) => {
        impl $crate::domain::labels::Labelled for $ty {
            fn label(&self, locale: $crate::domain::labels::Locale) -> &'static str {
                let pair = match self {
                    $(Self::$variant => ($en, $fr),)+
                };
                $crate::domain::labels::pick(pair, locale)
            }
        }
    };
}

pub(crate) use impl_labels;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_codes_map_to_labels() {
        assert_eq!(role_label(1, Locale::En), "Administrator");
        assert_eq!(role_label(3, Locale::Fr), "Locataire");
        assert_eq!(status_label(2, Locale::Fr), "Suspendu");
        assert_eq!(status_label(9, Locale::En), "Unknown");
        assert_eq!(role_label(-1, Locale::Fr), "Inconnu");
    }

    #[test]
    fn locale_tags() {
        assert_eq!(Locale::from_tag("fr-SN"), Locale::Fr);
        assert_eq!(Locale::from_tag("en_US"), Locale::En);
        assert_eq!(Locale::from_tag(""), Locale::En);
    }
}
