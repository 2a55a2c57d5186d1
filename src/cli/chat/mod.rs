pub mod busy;
pub mod controller;
pub mod conversation_state;
pub mod prompt;
pub mod view;

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use controller::{ChatController, SendOutcome};
use eyre::Result;
use prompt::generate_prompt;
use rustyline::error::ReadlineError;
use tracing::{debug, error, warn};
use view::TerminalView;

use crate::config::ClientConfig;
use crate::error::ChatError;
use crate::gemini_client::{ChatService, ChatSession, GeminiClient};

const HELP_TEXT: &str = color_print::cstr!(
    "
<bold>WalkyNine</>

/help         Show this help dialogue
/quit         Quit the application

Anything else is sent to WalkyNine. Replies stream in as they are written.
"
);

/// Top-level session: owns the conversation controller and the terminal view
/// for as long as the program runs.
pub struct ChatContext {
    input: Option<String>,
    interactive: bool,
    view: Arc<TerminalView>,
    controller: ChatController,
    setup_error: Option<String>,
}

impl ChatContext {
    /// `session` is the setup error when the chat service could not be set
    /// up; every send then ends in the error bubble.
    pub fn new(
        output: Box<dyn Write + Send>,
        input: Option<String>,
        interactive: bool,
        session: std::result::Result<Box<dyn ChatSession>, ChatError>,
    ) -> Self {
        let view = Arc::new(TerminalView::new(output, !interactive));
        let (session, setup_error) = match session {
            Ok(session) => (Some(session), None),
            Err(e) => (None, Some(e.to_string())),
        };
        let controller = ChatController::new(session, view.clone());
        Self {
            input,
            interactive,
            view,
            controller,
            setup_error,
        }
    }

    /// Build the Gemini client from configuration and open the one session
    /// this context will use.
    pub fn connect(
        output: Box<dyn Write + Send>,
        input: Option<String>,
        interactive: bool,
        model: Option<String>,
    ) -> Self {
        let session = match ClientConfig::from_env() {
            Ok(config) => {
                let config = match model {
                    Some(model) => config.with_model(model),
                    None => config,
                };
                let client = GeminiClient::new(config);
                debug!(model = client.model(), "Gemini client ready");
                Ok(client.start_chat())
            }
            Err(e) => {
                error!("Failed to initialize Gemini client: {}", e);
                Err(e)
            }
        };

        Self::new(output, input, interactive, session)
    }

    pub async fn run(&mut self) -> Result<ExitCode> {
        Ok(match self.run_session().await? {
            Some(SendOutcome::Failed) => ExitCode::FAILURE,
            _ => ExitCode::SUCCESS,
        })
    }

    /// Returns the outcome of the single send in non-interactive mode.
    async fn run_session(&mut self) -> Result<Option<SendOutcome>> {
        if self.interactive {
            self.view.render_intro(&self.controller.snapshot())?;
        }
        if let Some(reason) = &self.setup_error {
            self.view.print_line(&color_print::cformat!(
                "<yellow>Could not connect to Gemini: {}. Messages will fail until this is fixed.</>",
                reason
            ))?;
        }

        if let Some(input) = self.input.take() {
            return Ok(Some(self.controller.send_message(&input).await));
        }

        if self.interactive {
            self.run_interactive().await?;
        }

        Ok(None)
    }

    async fn run_interactive(&mut self) -> Result<()> {
        let mut rl = prompt::rl()?;
        let history_path = prompt::history_path();
        if let Some(path) = &history_path {
            if rl.load_history(path).is_err() {
                debug!("No input history at {}", path.display());
            }
        }

        loop {
            let prompt_text = generate_prompt(None);
            match rl.readline(&prompt_text) {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    rl.add_history_entry(line.as_str());

                    match line.trim() {
                        "/quit" => break,
                        "/help" => self.view.print_line(HELP_TEXT)?,
                        _ => {
                            self.controller.send_message(&line).await;
                        }
                    }
                }
                Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
                Err(e) => {
                    error!("Failed to read input: {}", e);
                    break;
                }
            }
        }

        if let Some(path) = &history_path {
            if let Err(e) = rl.save_history(path) {
                warn!("Failed to save input history to {}: {}", path.display(), e);
            }
        }

        Ok(())
    }
}
