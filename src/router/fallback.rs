//! Apology spoken when no backend reply could be obtained

/// Short apology in the turn's language; English when the language is unknown
#[must_use]
pub fn fallback_reply(language: &str) -> &'static str {
    let primary = language
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();

    match primary.as_str() {
        "nl" => "Sorry, ik kan je even niet goed helpen. Wil je het nog een keer proberen?",
        "es" => "Lo siento, ahora mismo no puedo responder. ¿Puedes intentarlo de nuevo?",
        "fr" => "Désolé, je ne peux pas répondre pour le moment. Pouvez-vous réessayer ?",
        "de" => {
            "Entschuldigung, ich kann gerade nicht antworten. Kannst du es noch einmal versuchen?"
        }
        _ => "Sorry, I'm having trouble answering right now. Could you try that again?",
    }
}
