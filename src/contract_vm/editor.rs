use std::borrow::Cow::{self, Borrowed, Owned};

use rustyline::completion::{Completer, FilenameCompleter, Pair};
use rustyline::config::OutputStreamType;
use rustyline::error::ReadlineError;
use rustyline::highlight::{Highlighter, MatchingBracketHighlighter};
use rustyline::hint::{Hinter, HistoryHinter};
use rustyline::validate::{self, MatchingBracketValidator, Validator};
use rustyline::{CompletionType, Config, Context, EditMode, Editor};
use rustyline_derive::Helper;

use crate::error::HarnessResult;

const PROMPT: &str = ">> ";

#[derive(Helper)]
pub struct PromptHelper {
    completer: FilenameCompleter,
    highlighter: MatchingBracketHighlighter,
    validator: MatchingBracketValidator,
    hinter: HistoryHinter,
    colored_prompt: String,
}

impl Completer for PromptHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        ctx: &Context<'_>,
    ) -> Result<(usize, Vec<Pair>), ReadlineError> {
        self.completer.complete(line, pos, ctx)
    }
}

impl Hinter for PromptHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, ctx: &Context<'_>) -> Option<String> {
        self.hinter.hint(line, pos, ctx)
    }
}

impl Highlighter for PromptHelper {
    fn highlight_prompt<'b, 's: 'b, 'p: 'b>(
        &'s self,
        prompt: &'p str,
        default: bool,
    ) -> Cow<'b, str> {
        if default {
            Borrowed(&self.colored_prompt)
        } else {
            Borrowed(prompt)
        }
    }

    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Owned("\x1b[1m\x1b[32m".to_owned() + hint + "\x1b[0m")
    }

    fn highlight<'l>(&self, line: &'l str, pos: usize) -> Cow<'l, str> {
        self.highlighter.highlight(line, pos)
    }

    fn highlight_char(&self, line: &str, pos: usize) -> bool {
        self.highlighter.highlight_char(line, pos)
    }
}

// Multi-line JSON messages stay open until their brackets match.
impl Validator for PromptHelper {
    fn validate(
        &self,
        ctx: &mut validate::ValidationContext,
    ) -> rustyline::Result<validate::ValidationResult> {
        self.validator.validate(ctx)
    }

    fn validate_while_typing(&self) -> bool {
        self.validator.validate_while_typing()
    }
}

/// Line editor of the interactive prompt. Keeps the JSON messages typed so far
/// so they can be recalled when the next message is asked for.
pub struct TerminalEditor {
    rl: Editor<PromptHelper>,
    history_entries: Vec<String>,
}

impl TerminalEditor {
    pub fn new() -> Self {
        let config = Config::builder()
            .history_ignore_space(true)
            .completion_type(CompletionType::List)
            .edit_mode(EditMode::Emacs)
            .output_stream(OutputStreamType::Stdout)
            .build();
        let h = PromptHelper {
            completer: FilenameCompleter::new(),
            highlighter: MatchingBracketHighlighter::new(),
            hinter: HistoryHinter {},
            colored_prompt: format!("\x1b[1;32m{}\x1b[0m", PROMPT),
            validator: MatchingBracketValidator::new(),
        };
        let mut rl = Editor::with_config(config);
        rl.set_helper(Some(h));

        TerminalEditor {
            rl,
            history_entries: vec![],
        }
    }

    /// Replaces the recallable history with the stored message inputs.
    pub fn update_input_history_entry(&mut self) {
        let entries = self.history_entries.clone();
        self.update_history_entries(entries)
    }

    pub fn update_history_entries<I, S>(&mut self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str> + Into<String>,
    {
        self.rl.clear_history();
        for line in lines {
            self.rl.add_history_entry(line);
        }
    }

    /// Reads one trimmed line. `Ok(None)` once the user pressed Ctrl-C or Ctrl-D.
    pub fn readline(&mut self, store_input: bool) -> HarnessResult<Option<String>> {
        match self.rl.readline(PROMPT) {
            Ok(line) => {
                let data = line.trim().to_string();
                if store_input {
                    self.history_entries.push(data.clone());
                }
                self.rl.add_history_entry(data.as_str());
                Ok(Some(data))
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(None),
            Err(error) => Err(error.into()),
        }
    }
}

impl Default for TerminalEditor {
    fn default() -> Self {
        TerminalEditor::new()
    }
}
