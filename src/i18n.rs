// src/i18n.rs

//! Static translation tables for the three supported locales.
//!
//! Lookups fall back to Brazilian Portuguese (the product's primary locale)
//! and then to the key itself, so a missing entry never breaks a response.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "pt-BR", alias = "pt", alias = "pt-br")]
    PtBr,
    #[serde(rename = "en", alias = "en-US", alias = "en-us")]
    En,
    #[serde(rename = "es", alias = "es-ES", alias = "es-es")]
    Es,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Language::PtBr => "pt-BR",
            Language::En => "en",
            Language::Es => "es",
        }
    }

    fn table(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Language::PtBr => PT_BR,
            Language::En => EN,
            Language::Es => ES,
        }
    }
}

const PT_BR: &[(&str, &str)] = &[
    ("status.pending", "Pendente"),
    ("status.in-progress", "Em andamento"),
    ("status.completed", "Concluída"),
    ("status.canceled", "Cancelada"),
    ("priority.high", "Alta"),
    ("priority.medium", "Média"),
    ("priority.low", "Baixa"),
    ("notification.task_assigned", "Você foi atribuído à tarefa \"{title}\""),
    ("notification.task_updated", "A tarefa \"{title}\" foi atualizada"),
    ("notification.task_completed", "A tarefa \"{title}\" foi concluída"),
    ("notification.comment_added", "{author} comentou na tarefa \"{title}\""),
    ("notification.due_soon", "A tarefa \"{title}\" vence em breve"),
    ("notification.system", "{message}"),
    ("report.unassigned", "Sem responsável"),
];

const EN: &[(&str, &str)] = &[
    ("status.pending", "Pending"),
    ("status.in-progress", "In progress"),
    ("status.completed", "Completed"),
    ("status.canceled", "Canceled"),
    ("priority.high", "High"),
    ("priority.medium", "Medium"),
    ("priority.low", "Low"),
    ("notification.task_assigned", "You were assigned to \"{title}\""),
    ("notification.task_updated", "Task \"{title}\" was updated"),
    ("notification.task_completed", "Task \"{title}\" was completed"),
    ("notification.comment_added", "{author} commented on \"{title}\""),
    ("notification.due_soon", "Task \"{title}\" is due soon"),
    ("notification.system", "{message}"),
    ("report.unassigned", "Unassigned"),
];

// Spanish has no report labels yet; those fall back to pt-BR.
const ES: &[(&str, &str)] = &[
    ("status.pending", "Pendiente"),
    ("status.in-progress", "En progreso"),
    ("status.completed", "Completada"),
    ("status.canceled", "Cancelada"),
    ("priority.high", "Alta"),
    ("priority.medium", "Media"),
    ("priority.low", "Baja"),
    ("notification.task_assigned", "Se te asignó la tarea \"{title}\""),
    ("notification.task_updated", "La tarea \"{title}\" fue actualizada"),
    ("notification.task_completed", "La tarea \"{title}\" fue completada"),
    ("notification.comment_added", "{author} comentó en la tarea \"{title}\""),
    ("notification.due_soon", "La tarea \"{title}\" vence pronto"),
    ("notification.system", "{message}"),
];

fn lookup(lang: Language, key: &str) -> Option<&'static str> {
    lang.table()
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| *v)
}

/// Looks up `key` in `lang`, then in pt-BR, then returns the key unchanged.
pub fn translate(lang: Language, key: &str) -> String {
    lookup(lang, key)
        .or_else(|| lookup(Language::PtBr, key))
        .map(str::to_string)
        .unwrap_or_else(|| key.to_string())
}

/// Translates `key` and substitutes each `{name}` placeholder from `args`.
/// Unknown placeholders are left as-is.
/// Substituted values are copied verbatim and never scanned again.
pub fn format(lang: Language, key: &str, args: &[(&str, &str)]) -> String {
    let template = translate(lang, key);
    let mut out = String::with_capacity(template.len());
    let mut rest = template.as_str();
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let name = &after[..close];
        match args.iter().find(|(n, _)| *n == name) {
            Some((_, value)) => out.push_str(value),
            None => out.push_str(&rest[open..open + close + 2]),
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_in_requested_language() {
        assert_eq!(translate(Language::En, "status.in-progress"), "In progress");
        assert_eq!(translate(Language::Es, "priority.low"), "Baja");
        assert_eq!(translate(Language::PtBr, "status.completed"), "Concluída");
    }

    #[test]
    fn missing_entry_falls_back_to_portuguese() {
        assert_eq!(translate(Language::Es, "report.unassigned"), "Sem responsável");
    }

    #[test]
    fn unknown_key_returns_key() {
        assert_eq!(translate(Language::En, "nope.nothing"), "nope.nothing");
    }

    #[test]
    fn format_fills_placeholders() {
        let text = format(
            Language::En,
            "notification.comment_added",
            &[("author", "Ana"), ("title", "Deploy")],
        );
        assert_eq!(text, "Ana commented on \"Deploy\"");
    }

    #[test]
    fn format_does_not_expand_placeholders_inside_values() {
        let text = format(
            Language::En,
            "notification.comment_added",
            &[("author", "{title}"), ("title", "Deploy")],
        );
        assert_eq!(text, "{title} commented on \"Deploy\"");
    }

    #[test]
    fn format_leaves_unknown_placeholders() {
        let text = format(Language::En, "notification.task_updated", &[]);
        assert_eq!(text, "Task \"{title}\" was updated");
    }

    #[test]
    fn language_codes_accept_aliases() {
        let lang: Language = serde_json::from_str("\"pt\"").unwrap();
        assert_eq!(lang, Language::PtBr);
        let lang: Language = serde_json::from_str("\"en-US\"").unwrap();
        assert_eq!(lang, Language::En);
        assert_eq!(serde_json::to_string(&Language::PtBr).unwrap(), "\"pt-BR\"");
    }
}
