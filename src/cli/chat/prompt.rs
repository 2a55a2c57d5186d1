use std::path::PathBuf;

use rustyline::{Config, Editor, Result};

const HISTORY_FILE: &str = ".walkynine_history";

pub fn generate_prompt(custom_prompt: Option<&str>) -> String {
    custom_prompt.unwrap_or("> ").to_string()
}

pub fn rl() -> Result<Editor<()>> {
    let config = Config::builder()
        .history_ignore_space(true)
        .history_ignore_dups(true)
        .max_history_size(1000)
        .auto_add_history(false)
        .build();
    Editor::with_config(config)
}

/// Where input history is kept between sessions, if there is a home directory.
pub fn history_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(HISTORY_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_prompt() {
        assert_eq!(generate_prompt(None), "> ");
        assert_eq!(generate_prompt(Some("you> ")), "you> ");
    }

    #[test]
    fn history_lives_in_home_directory() {
        if let (Some(path), Some(home)) = (history_path(), dirs::home_dir()) {
            assert!(path.starts_with(home));
            assert!(path.ends_with(HISTORY_FILE));
        }
    }
}
