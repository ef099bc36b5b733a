use std::io::{BufRead, Write};

use anyhow::Result;
use scribe_proxy::Gateway;
use strum_macros::{Display, EnumString};
use tracing::{error, info, warn};

use crate::generation::{Assistant, strip_code_fence};

pub const USAGE: &str = "Available commands:
  edit <prompt>    - Edit current code with AI
  explain          - Explain current code
  quit             - Exit the agent";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Verb {
    Edit,
    Explain,
    #[strum(serialize = "quit", serialize = "exit")]
    Quit,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Print this and prompt again.
    Continue(String),
    Quit,
}

/// Turns input lines into editor and model round trips.
pub struct Dispatcher<A> {
    gateway: Gateway,
    assistant: A,
}

impl<A> Dispatcher<A>
where
    A: Assistant,
{
    pub fn new(gateway: Gateway, assistant: A) -> Self {
        Self { gateway, assistant }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Read commands until `quit` or end of input, then release the editor
    /// connection.
    pub fn run<R, W>(&mut self, input: R, mut output: W) -> Result<()>
    where
        R: BufRead,
        W: Write,
    {
        let mut lines = input.lines();
        loop {
            write!(output, "> ")?;
            output.flush()?;
            let Some(line) = lines.next() else {
                break;
            };
            match self.handle_line(&line?) {
                None => {}
                Some(Outcome::Continue(text)) => writeln!(output, "{text}")?,
                Some(Outcome::Quit) => {
                    writeln!(output, "Goodbye!")?;
                    break;
                }
            }
        }
        self.gateway.close();
        Ok(())
    }

    /// `None` for blank input.
    pub fn handle_line(&mut self, line: &str) -> Option<Outcome> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };
        let Ok(verb) = verb.parse::<Verb>() else {
            return Some(Outcome::Continue(
                "Unknown command. Available: edit, explain, quit".to_string(),
            ));
        };

        let result = match verb {
            Verb::Quit => return Some(Outcome::Quit),
            Verb::Edit if rest.is_empty() => {
                return Some(Outcome::Continue("Usage: edit <prompt>".to_string()));
            }
            Verb::Edit => self
                .edit(rest)
                .map(|()| "Code edited successfully!".to_string()),
            Verb::Explain => self.explain(),
        };

        Some(Outcome::Continue(match result {
            Ok(text) => text,
            Err(err) => {
                error!("{verb} failed: {err:#}");
                let mut text = format!("Error: {err:#}");
                if let Some(note) = self.resync() {
                    text.push('\n');
                    text.push_str(&note);
                }
                text
            }
        }))
    }

    fn edit(&mut self, prompt: &str) -> Result<()> {
        let code = self.gateway.get_current_buffer_content()?;
        let edited = self.assistant.code_edit(prompt, &code)?;
        self.gateway.replace_buffer_content(&strip_code_fence(&edited))?;
        info!("buffer rewritten for {prompt:?}");
        Ok(())
    }

    fn explain(&mut self) -> Result<String> {
        let code = self.gateway.get_current_buffer_content()?;
        let filetype = self.gateway.get_filetype()?;
        let language = if filetype.is_empty() { "text" } else { &filetype };
        self.assistant.explain(&code, language)
    }

    /// After a timeout or a garbled reply the connection may still carry a
    /// stale frame, so start the next command on a fresh one.
    fn resync(&mut self) -> Option<String> {
        if !self.gateway.is_desynchronized() {
            return None;
        }
        warn!("editor connection out of sync, reconnecting");
        match self.gateway.reconnect() {
            Ok(()) => None,
            Err(err) => {
                error!("reconnect failed: {err}");
                Some(format!("Error: could not reconnect to the editor: {err}"))
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::{
        cell::RefCell,
        io::{BufReader, Cursor},
        os::unix::net::UnixStream,
        thread,
    };

    use anyhow::anyhow;
    use crossbeam_channel::Receiver;
    use scribe_proxy::gateway::method::*;
    use scribe_rpc::{
        Call, Value,
        buffer::{join_lines, split_lines},
        codec,
        frame::read_frame,
    };
    use serde_json::json;

    use super::*;

    /// Editor with one python buffer whose text follows `nvim_buf_set_lines`.
    /// Reports the buffer text after every write.
    fn editor(initial: &str) -> (Gateway, Receiver<String>) {
        let (client, server) = UnixStream::pair().unwrap();
        let (writes_tx, writes_rx) = crossbeam_channel::unbounded();
        let mut lines: Vec<Value> =
            split_lines(initial).into_iter().map(Value::from).collect();
        thread::spawn(move || {
            let mut stream = BufReader::new(server);
            while let Ok(frame) = read_frame(&mut stream) {
                let Call { id, method, args } = codec::decode_call(&frame).unwrap();
                let result = match method.as_str() {
                    GET_CURRENT_BUF => json!(1),
                    BUF_GET_LINES => Value::from(lines.clone()),
                    BUF_SET_LINES => {
                        lines = args[4].as_array().cloned().unwrap_or_default();
                        let _ = writes_tx.send(join_lines(&lines));
                        Value::Null
                    }
                    BUF_GET_OPTION => json!("python"),
                    _ => json!(null),
                };
                let reply = format!("{}\n", json!([id, result]));
                if stream.get_mut().write_all(reply.as_bytes()).is_err() {
                    return;
                }
            }
        });
        (Gateway::from_stream(client).unwrap(), writes_rx)
    }

    #[derive(Default)]
    struct StubAssistant {
        seen: RefCell<Vec<String>>,
    }

    impl Assistant for StubAssistant {
        fn code_edit(&self, prompt: &str, code: &str) -> Result<String> {
            self.seen.borrow_mut().push(format!("edit {prompt}: {code}"));
            Ok("```python\nprint('hi')\n\nprint('bye')\n```".to_string())
        }

        fn explain(&self, code: &str, language: &str) -> Result<String> {
            self.seen.borrow_mut().push(format!("explain {language}: {code}"));
            if code.is_empty() {
                return Err(anyhow!("nothing to explain"));
            }
            Ok(format!("{} lines of {language}", code.lines().count()))
        }
    }

    #[test]
    fn test_verb_parsing() {
        assert_eq!("edit".parse::<Verb>().unwrap(), Verb::Edit);
        assert_eq!("EXPLAIN".parse::<Verb>().unwrap(), Verb::Explain);
        assert_eq!("quit".parse::<Verb>().unwrap(), Verb::Quit);
        assert_eq!("exit".parse::<Verb>().unwrap(), Verb::Quit);
        assert!("save".parse::<Verb>().is_err());
        assert_eq!(Verb::Explain.to_string(), "explain");
    }

    #[test]
    fn test_edit_rewrites_buffer() {
        let (gateway, writes) = editor("print(1)\n");
        let mut dispatcher = Dispatcher::new(gateway, StubAssistant::default());

        assert_eq!(
            dispatcher.handle_line("edit   greet the user "),
            Some(Outcome::Continue("Code edited successfully!".to_string()))
        );
        assert_eq!(writes.try_recv().unwrap(), "print('hi')\n\nprint('bye')\n");
        assert_eq!(
            dispatcher.assistant.seen.borrow().as_slice(),
            ["edit greet the user: print(1)\n"]
        );
    }

    #[test]
    fn test_explain_uses_filetype() {
        let (gateway, _writes) = editor("a = 1\nb = 2\n");
        let mut dispatcher = Dispatcher::new(gateway, StubAssistant::default());
        assert_eq!(
            dispatcher.handle_line("explain"),
            Some(Outcome::Continue("2 lines of python".to_string()))
        );
    }

    #[test]
    fn test_usage_and_unknown() {
        let (gateway, _writes) = editor("");
        let mut dispatcher = Dispatcher::new(gateway, StubAssistant::default());
        assert_eq!(dispatcher.handle_line("   "), None);
        assert_eq!(
            dispatcher.handle_line("edit"),
            Some(Outcome::Continue("Usage: edit <prompt>".to_string()))
        );
        assert_eq!(
            dispatcher.handle_line("frobnicate now"),
            Some(Outcome::Continue(
                "Unknown command. Available: edit, explain, quit".to_string()
            ))
        );
        assert_eq!(dispatcher.handle_line("exit"), Some(Outcome::Quit));
    }

    #[test]
    fn test_errors_return_to_prompt() {
        let (gateway, _writes) = editor("");
        let mut dispatcher = Dispatcher::new(gateway, StubAssistant::default());
        assert_eq!(
            dispatcher.handle_line("explain"),
            Some(Outcome::Continue("Error: nothing to explain".to_string()))
        );
        assert!(!dispatcher.gateway().is_closed());
    }

    #[test]
    fn test_desync_triggers_reconnect() {
        let (client, server) = UnixStream::pair().unwrap();
        thread::spawn(move || {
            let mut stream = BufReader::new(server);
            while read_frame(&mut stream).is_ok() {
                let _ = stream.get_mut().write_all(b"not json\n");
            }
        });
        let gateway = Gateway::from_stream(client).unwrap();
        let mut dispatcher = Dispatcher::new(gateway, StubAssistant::default());

        let Some(Outcome::Continue(text)) = dispatcher.handle_line("explain") else {
            panic!("expected output");
        };
        assert!(text.starts_with("Error: malformed reply"), "{text}");
        assert!(text.contains("could not reconnect"), "{text}");
        assert!(dispatcher.gateway().is_closed());
    }

    #[test]
    fn test_run_session() {
        let (gateway, writes) = editor("x = 1\n");
        let mut dispatcher = Dispatcher::new(gateway, StubAssistant::default());
        let input = Cursor::new("explain\n\nedit make it friendly\nquit\nexplain\n");
        let mut output = Vec::new();
        dispatcher.run(input, &mut output).unwrap();

        let output = String::from_utf8(output).unwrap();
        assert_eq!(
            output,
            "> 1 lines of python\n> > Code edited successfully!\n> Goodbye!\n"
        );
        assert_eq!(writes.try_iter().count(), 1);
        assert!(dispatcher.gateway().is_closed());
    }
}
