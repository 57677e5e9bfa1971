/// Context windows (in tokens) of the models the exact metric knows about.
///
/// Ollama-style tags (`llama3:8b-instruct`) resolve through their base name.
pub const KNOWN_MODELS: &[(&str, usize)] = &[
    ("llama2", 4_096),
    ("llama3", 8_192),
    ("llama3.1", 131_072),
    ("llama3.2", 131_072),
    ("mistral", 32_768),
    ("mixtral", 32_768),
    ("gemma", 8_192),
    ("gemma2", 8_192),
    ("phi3", 4_096),
    ("qwen2", 32_768),
    ("gpt-3.5-turbo", 16_385),
    ("gpt-4", 8_192),
    ("gpt-4-turbo", 128_000),
    ("gpt-4o", 128_000),
    ("gpt-4o-mini", 128_000),
];

/// Look up the context window of a model by name.
#[must_use]
pub fn context_window(model: &str) -> Option<usize> {
    let name = model.trim().to_ascii_lowercase();
    lookup(&name).or_else(|| {
        let (base, _tag) = name.split_once(':')?;
        lookup(base)
    })
}

fn lookup(name: &str) -> Option<usize> {
    KNOWN_MODELS
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, window)| *window)
}
