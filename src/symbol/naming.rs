//! Identifier rules and name derivation helpers.

use super::Language;

const JAVA_KEYWORDS: &[&str] = &[
    "abstract", "assert", "boolean", "break", "byte", "case", "catch", "char", "class", "const",
    "continue", "default", "do", "double", "else", "enum", "extends", "final", "finally",
    "float", "for", "goto", "if", "implements", "import", "instanceof", "int", "interface",
    "long", "native", "new", "package", "private", "protected", "public", "return", "short",
    "static", "strictfp", "super", "switch", "synchronized", "this", "throw", "throws",
    "transient", "try", "void", "volatile", "while", "true", "false", "null",
];

const RUST_KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move",
    "mut", "pub", "ref", "return", "self", "Self", "static", "struct", "super", "trait", "true",
    "type", "unsafe", "use", "where", "while",
];

const PYTHON_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

const C_KEYWORDS: &[&str] = &[
    "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else",
    "enum", "extern", "float", "for", "goto", "if", "inline", "int", "long", "register",
    "restrict", "return", "short", "signed", "sizeof", "static", "struct", "switch", "typedef",
    "union", "unsigned", "void", "volatile", "while",
];

const CPP_EXTRA_KEYWORDS: &[&str] = &[
    "bool", "catch", "class", "delete", "explicit", "false", "friend", "mutable", "namespace",
    "new", "nullptr", "operator", "private", "protected", "public", "template", "this", "throw",
    "true", "try", "typename", "using", "virtual",
];

const JS_KEYWORDS: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete",
    "do", "else", "export", "extends", "false", "finally", "for", "function", "if", "import",
    "in", "instanceof", "new", "null", "return", "super", "switch", "this", "throw", "true",
    "try", "typeof", "var", "void", "while", "with", "yield", "let",
];

const TS_EXTRA_KEYWORDS: &[&str] = &["enum", "implements", "interface", "package", "private", "protected", "public"];

/// Whether `word` is reserved in `language`.
fn is_reserved(language: Language, word: &str) -> bool {
    match language {
        Language::Java => JAVA_KEYWORDS.contains(&word),
        Language::Rust => RUST_KEYWORDS.contains(&word),
        Language::Python => PYTHON_KEYWORDS.contains(&word),
        Language::C => C_KEYWORDS.contains(&word),
        Language::Cpp => C_KEYWORDS.contains(&word) || CPP_EXTRA_KEYWORDS.contains(&word),
        Language::JavaScript => JS_KEYWORDS.contains(&word),
        Language::TypeScript => JS_KEYWORDS.contains(&word) || TS_EXTRA_KEYWORDS.contains(&word),
    }
}

/// Characters that may continue an identifier.
pub(crate) fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Check that `name` is a well-formed, non-reserved identifier.
///
/// Without a language only the shape is checked.
pub fn is_valid_identifier(language: Option<Language>, name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_alphabetic() || first == '_' || first == '$') {
        return false;
    }
    if !chars.all(is_identifier_char) {
        return false;
    }
    if first == '$' && !matches!(language, Some(Language::Java | Language::JavaScript | Language::TypeScript) | None) {
        return false;
    }
    language.map_or(true, |lang| !is_reserved(lang, name))
}

/// Upper-case the first character (`count` → `Count`).
pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Lower-case the first character (`Counter` → `counter`).
pub fn decapitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Bean accessor prefixes, in lookup order.
pub fn accessor_prefixes() -> &'static [&'static str] {
    &["get", "is", "set"]
}

/// Byte offsets of every occurrence of `needle` in `haystack` that is not
/// part of a longer identifier.
pub fn identifier_occurrences(haystack: &str, needle: &str) -> Vec<usize> {
    if needle.is_empty() {
        return Vec::new();
    }
    haystack
        .match_indices(needle)
        .filter(|(start, _)| {
            let before = haystack[..*start].chars().next_back();
            let after = haystack[start + needle.len()..].chars().next();
            !before.is_some_and(is_identifier_char) && !after.is_some_and(is_identifier_char)
        })
        .map(|(start, _)| start)
        .collect()
}
