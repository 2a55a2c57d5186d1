use std::io::Write;
use std::sync::{Mutex, PoisonError};

use color_print::cwrite;
use crossterm::{cursor, queue, terminal};
use tracing::warn;

use super::conversation_state::{ConversationState, Message, Role};

const ASSISTANT_NAME: &str = "WalkyNine";

const HEADER_TEXT: &str = color_print::cstr!(
    "<bold,cyan>WalkyNine</> <dim>· your AI assistant</>\n<dim>Type /help for commands, /quit to leave.</>"
);

const DISCLAIMER_TEXT: &str =
    color_print::cstr!("<dim>WalkyNine can make mistakes. Consider checking important information.</>");

/// One mutation of the conversation, reported right after it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationChange<'a> {
    Appended(&'a Message),
    Extended(&'a str),
    ReplacedLast(&'a Message),
}

/// Presentation side of the chat. Called synchronously by the controller, so
/// every change is rendered before the next fragment is awaited.
pub trait ConversationView: Send + Sync {
    fn conversation_changed(&self, change: ConversationChange<'_>, state: &ConversationState);

    fn busy_changed(&self, busy: bool);
}

struct TerminalState {
    output: Box<dyn Write + Send>,
    typing_shown: bool,
    reply_open: bool,
}

/// Renders the conversation on a terminal, streaming replies as they grow.
pub struct TerminalView {
    state: Mutex<TerminalState>,
    echo_user: bool,
}

impl TerminalView {
    /// `echo_user` prints user messages too; off in interactive mode where the
    /// line editor already shows what was typed.
    pub fn new(output: Box<dyn Write + Send>, echo_user: bool) -> Self {
        Self {
            state: Mutex::new(TerminalState {
                output,
                typing_shown: false,
                reply_open: false,
            }),
            echo_user,
        }
    }

    /// Header, the existing transcript and the footer disclaimer.
    pub fn render_intro(&self, state: &ConversationState) -> std::io::Result<()> {
        let mut term = self.lock();
        writeln!(term.output, "{}\n", HEADER_TEXT)?;
        for message in state.messages() {
            write_message(&mut term.output, message)?;
        }
        writeln!(term.output, "{}\n", DISCLAIMER_TEXT)?;
        term.output.flush()
    }

    pub fn print_line(&self, text: &str) -> std::io::Result<()> {
        let mut term = self.lock();
        writeln!(term.output, "{}", text)?;
        term.output.flush()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TerminalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn render_change(&self, change: ConversationChange<'_>) -> std::io::Result<()> {
        let mut term = self.lock();
        match change {
            ConversationChange::Appended(message) => match message.role {
                Role::User if !self.echo_user => Ok(()),
                Role::Assistant if message.content.is_empty() => {
                    cwrite!(term.output, "<dim>{} is typing...</>", ASSISTANT_NAME)?;
                    term.typing_shown = true;
                    term.output.flush()
                }
                _ => {
                    write_message(&mut term.output, message)?;
                    term.output.flush()
                }
            },
            ConversationChange::Extended(fragment) => {
                if !term.reply_open {
                    clear_typing(&mut term)?;
                    cwrite!(term.output, "<bold,cyan>{}:</> ", ASSISTANT_NAME)?;
                    term.reply_open = true;
                }
                write!(term.output, "{}", fragment)?;
                term.output.flush()
            }
            ConversationChange::ReplacedLast(message) => {
                clear_typing(&mut term)?;
                if term.reply_open {
                    writeln!(term.output)?;
                    term.reply_open = false;
                }
                write_message(&mut term.output, message)?;
                term.output.flush()
            }
        }
    }

    fn render_idle(&self) -> std::io::Result<()> {
        let mut term = self.lock();
        // Still showing the indicator means the reply finished without any text.
        let empty_reply = term.typing_shown && !term.reply_open;
        clear_typing(&mut term)?;
        if empty_reply {
            write_message(&mut term.output, &Message::assistant(""))?;
        } else if term.reply_open {
            writeln!(term.output, "\n")?;
            term.reply_open = false;
        }
        term.output.flush()
    }
}

impl ConversationView for TerminalView {
    fn conversation_changed(&self, change: ConversationChange<'_>, _state: &ConversationState) {
        if let Err(e) = self.render_change(change) {
            warn!("Failed to render conversation change: {}", e);
        }
    }

    fn busy_changed(&self, busy: bool) {
        if busy {
            return;
        }
        if let Err(e) = self.render_idle() {
            warn!("Failed to render idle state: {}", e);
        }
    }
}

fn clear_typing(term: &mut TerminalState) -> std::io::Result<()> {
    if term.typing_shown {
        queue!(
            term.output,
            cursor::MoveToColumn(0),
            terminal::Clear(terminal::ClearType::CurrentLine)
        )?;
        term.typing_shown = false;
    }
    Ok(())
}

fn write_message(output: &mut Box<dyn Write + Send>, message: &Message) -> std::io::Result<()> {
    match message.role {
        Role::User => cwrite!(output, "<bold,green>You:</> {}\n\n", message.content),
        Role::Assistant => cwrite!(output, "<bold,cyan>{}:</> {}\n\n", ASSISTANT_NAME, message.content),
        Role::Error => cwrite!(output, "<bold,red>{}</>\n\n", message.content),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[test]
    fn streamed_reply_is_written_fragment_by_fragment() {
        let buffer = SharedBuffer::default();
        let view = TerminalView::new(Box::new(buffer.clone()), false);
        let mut state = ConversationState::new();

        let user = Message::user("Hi");
        state.append(user.clone());
        view.conversation_changed(ConversationChange::Appended(&user), &state);
        assert_eq!(buffer.contents(), "");

        let placeholder = Message::assistant("");
        state.append(placeholder.clone());
        view.conversation_changed(ConversationChange::Appended(&placeholder), &state);
        assert!(buffer.contents().contains("is typing..."));

        state.append_to_last("Hi ");
        view.conversation_changed(ConversationChange::Extended("Hi "), &state);
        assert!(buffer.contents().ends_with("Hi "));

        state.append_to_last("there!");
        view.conversation_changed(ConversationChange::Extended("there!"), &state);
        view.busy_changed(false);

        let out = buffer.contents();
        assert!(out.contains("Hi there!"));
        assert!(out.ends_with("\n\n"));
    }

    #[test]
    fn failure_shows_error_text() {
        let buffer = SharedBuffer::default();
        let view = TerminalView::new(Box::new(buffer.clone()), true);
        let mut state = ConversationState::new();

        let user = Message::user("Hi");
        state.append(user.clone());
        view.conversation_changed(ConversationChange::Appended(&user), &state);
        assert!(buffer.contents().contains("Hi"));

        state.append(Message::assistant(""));
        state.append_to_last("Par");
        view.conversation_changed(ConversationChange::Extended("Par"), &state);

        let error = Message::error();
        state.replace_last(error.clone());
        view.conversation_changed(ConversationChange::ReplacedLast(&error), &state);
        view.busy_changed(false);

        assert!(buffer
            .contents()
            .contains("Sorry, something went wrong. Please try again."));
    }

    #[test]
    fn reply_without_fragments_still_gets_a_line() {
        let buffer = SharedBuffer::default();
        let view = TerminalView::new(Box::new(buffer.clone()), false);
        let mut state = ConversationState::new();

        let placeholder = Message::assistant("");
        state.append(placeholder.clone());
        view.conversation_changed(ConversationChange::Appended(&placeholder), &state);
        view.busy_changed(false);

        let out = buffer.contents();
        let after_typing = &out[out.find("is typing...").unwrap()..];
        assert!(after_typing.contains("WalkyNine:"));
        assert!(out.ends_with("\n\n"));
    }

    #[test]
    fn failed_reply_does_not_add_empty_line() {
        let buffer = SharedBuffer::default();
        let view = TerminalView::new(Box::new(buffer.clone()), false);
        let mut state = ConversationState::new();

        let placeholder = Message::assistant("");
        state.append(placeholder.clone());
        view.conversation_changed(ConversationChange::Appended(&placeholder), &state);
        let error = Message::error();
        state.replace_last(error.clone());
        view.conversation_changed(ConversationChange::ReplacedLast(&error), &state);
        view.busy_changed(false);

        assert!(!buffer.contents().contains("WalkyNine:"));
    }

    #[test]
    fn intro_includes_greeting_and_disclaimer() {
        let buffer = SharedBuffer::default();
        let view = TerminalView::new(Box::new(buffer.clone()), false);
        view.render_intro(&ConversationState::new()).unwrap();

        let out = buffer.contents();
        assert!(out.contains("Hello! I'm WalkyNine"));
        assert!(out.contains("WalkyNine can make mistakes."));
    }
}
