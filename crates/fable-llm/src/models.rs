/// Model used when the player does not pick one at startup.
pub const DEFAULT_MODEL: &str = "qwen3-vl:4b";

/// Which backend serves a given model, inferred from the identifier shape:
/// LM Studio models are repo paths ("org/model"), Ollama models are tagged
/// names ("model:tag") or bare names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Ollama,
    LmStudio,
}

pub fn detect_kind(model: &str) -> BackendKind {
    if model.contains('/') {
        BackendKind::LmStudio
    } else {
        BackendKind::Ollama
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slash_means_lm_studio() {
        assert_eq!(detect_kind("lmstudio-community/qwen2.5-7b"), BackendKind::LmStudio);
    }

    #[test]
    fn tagged_and_bare_names_mean_ollama() {
        assert_eq!(detect_kind("qwen3-vl:4b"), BackendKind::Ollama);
        assert_eq!(detect_kind("llama3"), BackendKind::Ollama);
        assert_eq!(detect_kind(DEFAULT_MODEL), BackendKind::Ollama);
    }
}
