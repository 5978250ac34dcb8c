//! Console operator: asks the person at the terminal to unblock the agent.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread;

use agent_core::{HandoffReason, HandoffRequest, HandoffResponse, OperatorChannel};
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

/// Terminal lines, read on a dedicated thread and handed over a channel.
///
/// A read in flight is never awaited on shutdown: dropping the receiving
/// future abandons it and the reader thread dies with the process.
pub struct ConsoleInput {
    lines: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

impl ConsoleInput {
    /// Reads stdin, starting the reader thread on the first request.
    pub fn stdin() -> Self {
        Self {
            lines: Mutex::new(None),
        }
    }

    pub fn from_reader<R: BufRead + Send + 'static>(reader: R) -> Self {
        Self {
            lines: Mutex::new(Some(spawn_reader(move || reader))),
        }
    }

    /// Print `prompt` and wait for the next line. `None` once input is closed.
    pub async fn read_line(&self, prompt: &str) -> Option<String> {
        {
            let mut stdout = io::stdout().lock();
            let _ = write!(stdout, "{prompt}");
            let _ = stdout.flush();
        }

        let mut lines = self.lines.lock().await;
        lines
            .get_or_insert_with(|| spawn_reader(|| io::stdin().lock()))
            .recv()
            .await
    }
}

fn spawn_reader<R, F>(open: F) -> mpsc::UnboundedReceiver<String>
where
    R: BufRead,
    F: FnOnce() -> R + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let spawned = thread::Builder::new()
        .name("console-input".to_string())
        .spawn(move || {
            let mut reader = open();
            loop {
                let mut line = String::new();
                match reader.read_line(&mut line) {
                    Ok(0) => break,
                    Ok(_) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "could not read console input");
                        break;
                    }
                }
            }
        });
    if let Err(err) = spawned {
        warn!(error = %err, "could not start console reader");
    }
    rx
}

#[derive(Clone)]
pub struct ConsoleOperator {
    input: Arc<ConsoleInput>,
}

impl ConsoleOperator {
    pub fn new(input: Arc<ConsoleInput>) -> Self {
        Self { input }
    }
}

#[async_trait]
impl OperatorChannel for ConsoleOperator {
    async fn request_help(&self, request: &HandoffRequest) -> HandoffResponse {
        match self.input.read_line(&handoff_prompt(request)).await {
            Some(line) => parse_answer(&line),
            None => {
                warn!("stdin closed while awaiting operator; aborting task");
                HandoffResponse::Aborted
            }
        }
    }
}

fn handoff_prompt(request: &HandoffRequest) -> String {
    let headline = match &request.reason {
        HandoffReason::Captcha(signature) => format!("CAPTCHA detected ({signature})."),
        HandoffReason::OracleRequest(reason) => format!("The agent needs help: {reason}"),
    };
    format!(
        "\n{headline}\nPage: {}\nResolve it in the browser window, then press Enter to continue (or type 'abort'): ",
        request.url
    )
}

fn parse_answer(line: &str) -> HandoffResponse {
    match line.trim().to_ascii_lowercase().as_str() {
        "abort" | "a" | "q" | "quit" => HandoffResponse::Aborted,
        _ => HandoffResponse::Resumed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_resumes_and_abort_aborts() {
        assert_eq!(parse_answer("\n"), HandoffResponse::Resumed);
        assert_eq!(parse_answer("done\n"), HandoffResponse::Resumed);
        assert_eq!(parse_answer(" ABORT \n"), HandoffResponse::Aborted);
    }

    #[test]
    fn prompt_names_reason_and_page() {
        let request = HandoffRequest {
            reason: HandoffReason::Captcha("page text contains 'are you a robot'".into()),
            url: "https://www.google.com/sorry/index".into(),
            iteration: 3,
        };
        let prompt = handoff_prompt(&request);
        assert!(prompt.contains("CAPTCHA detected"));
        assert!(prompt.contains("https://www.google.com/sorry/index"));
    }

    fn request() -> HandoffRequest {
        HandoffRequest {
            reason: HandoffReason::OracleRequest("login required".into()),
            url: "https://example.com/login".into(),
            iteration: 1,
        }
    }

    #[tokio::test]
    async fn operator_answers_come_from_console_lines() {
        let input = ConsoleInput::from_reader(io::Cursor::new("\nabort\n"));
        let operator = ConsoleOperator::new(Arc::new(input));
        assert_eq!(operator.request_help(&request()).await, HandoffResponse::Resumed);
        assert_eq!(operator.request_help(&request()).await, HandoffResponse::Aborted);
        // end of input
        assert_eq!(operator.request_help(&request()).await, HandoffResponse::Aborted);
    }

    /// Reader that never yields a line.
    struct Silent;

    impl io::Read for Silent {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            loop {
                thread::park();
            }
        }
    }

    #[test]
    fn pending_read_does_not_hold_runtime_shutdown() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let operator = ConsoleOperator::new(Arc::new(ConsoleInput::from_reader(io::BufReader::new(Silent))));
        let cancel = tokio_util::sync::CancellationToken::new();
        cancel.cancel();

        let answered = runtime.block_on(async {
            let req = request();
            tokio::select! {
                _ = cancel.cancelled() => None,
                response = operator.request_help(&req) => Some(response),
            }
        });
        assert_eq!(answered, None);
        // returns even though the reader thread is still blocked
        drop(runtime);
    }
}
