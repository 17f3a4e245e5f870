//! Conversation titles and sidebar previews.

pub const DEFAULT_TITLE: &str = "Nova Conversa";

const MAX_TITLE_WORDS: usize = 4;
const MAX_TITLE_CHARS: usize = 30;
const MAX_PREVIEW_CHARS: usize = 50;
const ELLIPSIS: &str = "...";

/// Portuguese words that say nothing about the topic of a question.
/// Words of two letters or fewer are dropped before this list is consulted.
const STOP_WORDS: &[&str] = &[
    // greetings
    "olá", "ola", "bom", "boa", "dia", "tarde", "noite", "tudo", "bem", "obrigado", "obrigada",
    // pronouns and question words
    "você", "voce", "vocês", "voces", "ele", "ela", "eles", "elas", "nós", "meu", "minha", "meus",
    "minhas", "seu", "sua", "seus", "suas", "isso", "isto", "este", "esta", "esse", "essa",
    "aquele", "aquela", "que", "qual", "quais", "quem", "como", "onde",
    // prepositions and articles
    "com", "sem", "para", "pra", "por", "pelo", "pela", "sobre", "entre", "até", "ate", "dos",
    "das", "nos", "nas", "num", "numa", "uma", "uns", "umas", "desde", "após",
    // conjunctions
    "mas", "porque", "pois", "quando", "então", "entao", "também", "tambem", "nem",
    // polite requests
    "pode", "poderia", "podia", "ajudar", "ajuda", "ajude", "preciso", "quero", "queria",
    "gostaria", "favor", "consegue",
];

/// Build a short title from the first thing the user asked.
pub fn derive_title(first_user_message: &str) -> String {
    let cleaned: String = first_user_message
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    let words: Vec<String> = cleaned
        .split_whitespace()
        .filter(|word| word.chars().count() > 2 && !STOP_WORDS.contains(word))
        .take(MAX_TITLE_WORDS)
        .map(capitalize)
        .collect();

    if words.is_empty() {
        return DEFAULT_TITLE.to_string();
    }

    truncate_chars(&words.join(" "), MAX_TITLE_CHARS)
}

/// One-line preview of a message for the conversation list.
pub fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&flat, MAX_PREVIEW_CHARS)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_topic_words() {
        assert_eq!(
            derive_title("Olá, pode me ajudar com relatório de eventos?"),
            "Relatório Eventos"
        );
    }

    #[test]
    fn empty_or_stop_words_only_gives_default() {
        assert_eq!(derive_title(""), DEFAULT_TITLE);
        assert_eq!(derive_title("Olá! Bom dia, você pode me ajudar?"), DEFAULT_TITLE);
    }

    #[test]
    fn takes_first_four_words() {
        assert_eq!(
            derive_title("listar arquivos grandes servidor remoto agora"),
            "Listar Arquivos Grandes Servidor"
        );
    }

    #[test]
    fn long_titles_are_truncated() {
        let title = derive_title("configuração autenticação integração parametrização");
        assert_eq!(title.chars().count(), 33);
        assert!(title.ends_with("..."));
        assert!(title.starts_with("Configuração Autenticação"));
    }

    #[test]
    fn preview_is_flattened_and_truncated() {
        assert_eq!(preview("linha um\n\nlinha   dois"), "linha um linha dois");

        let long = "a".repeat(80);
        let p = preview(&long);
        assert_eq!(p.chars().count(), 53);
        assert!(p.ends_with("..."));
    }
}
