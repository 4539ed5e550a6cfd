//! Shell completion scripts for the `storykeep` binary.

use clap::CommandFactory;
use clap_complete::{generate, shells::Shell};
use std::io;

/// Writes the completion script for `shell` to stdout.
///
/// # Examples
/// ```text
/// storykeep completion --shell zsh > ~/.zfunc/_storykeep
/// ```
pub fn generate_completion(shell: Shell) {
    let mut app = crate::Cli::command();
    generate(shell, &mut app, "storykeep", &mut io::stdout());
}
