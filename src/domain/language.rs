/// Editor language id for a language name offered by the exam. Unknown names edit as plain text.
pub fn editor_language(language: &str) -> &'static str {
    match language.to_lowercase().as_str() {
        "python" => "python",
        "javascript" | "js" => "javascript",
        "typescript" | "ts" => "typescript",
        "java" => "java",
        "cpp" => "cpp",
        "c" => "c",
        "csharp" | "cs" => "csharp",
        "go" => "go",
        "rust" => "rust",
        "php" => "php",
        "ruby" => "ruby",
        "swift" => "swift",
        "kotlin" => "kotlin",
        "sql" => "sql",
        _ => "plaintext",
    }
}

pub fn language_label(language: &str) -> String {
    let label = match language.to_lowercase().as_str() {
        "python" => "Python",
        "javascript" | "js" => "JavaScript",
        "typescript" | "ts" => "TypeScript",
        "java" => "Java",
        "cpp" => "C++",
        "c" => "C",
        "csharp" | "cs" => "C#",
        "go" => "Go",
        "rust" => "Rust",
        "php" => "PHP",
        "ruby" => "Ruby",
        "swift" => "Swift",
        "kotlin" => "Kotlin",
        "sql" => "SQL",
        _ => return language.to_string(),
    };
    label.to_string()
}
