//! `ask`: one question, or an interactive loop that ends on an empty line,
//! end of input or Ctrl-C at the prompt.

use std::future::Future;
use std::io::Write;
use std::sync::Arc;

use colored::Colorize;
use contextor::{ContextorError, IndicatifProgress, QueryOrchestrator};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio_util::sync::CancellationToken;
use tracing::error;

pub async fn run(question: Option<String>) -> anyhow::Result<()> {
    let orchestrator =
        QueryOrchestrator::from_env()?.with_progress(Arc::new(IndicatifProgress::spinner()));

    if let Some(q) = question {
        answer_one(&orchestrator, &q).await?;
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{}", "Question: ".bold());
        std::io::stdout().flush()?;

        let Some(q) = next_question(&mut lines, ctrl_c()).await? else {
            println!();
            break;
        };

        match answer_one(&orchestrator, &q).await {
            Ok(()) | Err(ContextorError::Cancelled) => {}
            Err(e) => {
                error!(error = %e, "question failed");
                println!("{} {e}", "Error:".red().bold());
            }
        }
    }
    Ok(())
}

/// Next question from `lines`; `None` on an empty line, end of input or
/// once `interrupt` resolves.
async fn next_question<R, I>(lines: &mut Lines<R>, interrupt: I) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    I: Future<Output = ()>,
{
    tokio::select! {
        line = lines.next_line() => {
            Ok(line?.map(|l| l.trim().to_string()).filter(|q| !q.is_empty()))
        }
        () = interrupt => Ok(None),
    }
}

/// Resolves on Ctrl-C; never resolves if the signal cannot be watched.
async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Streams the answer to stdout; Ctrl-C cancels the current question.
async fn answer_one(orchestrator: &QueryOrchestrator, question: &str) -> Result<(), ContextorError> {
    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    let watcher = tokio::spawn(async move {
        ctrl_c().await;
        on_ctrl_c.cancel();
    });

    let mut stdout = std::io::stdout();
    let result = orchestrator
        .answer(
            question,
            |fragment| {
                let _ = write!(stdout, "{fragment}");
                let _ = stdout.flush();
            },
            &cancel,
        )
        .await;
    watcher.abort();
    println!("\n");

    match result {
        Ok(out) if out.answer.is_none() => {
            println!(
                "{}",
                "No complete answer; every attempt was cut off.".yellow()
            );
            Ok(())
        }
        Ok(_) => Ok(()),
        Err(ContextorError::Cancelled) => {
            println!("{}", "Cancelled.".yellow());
            Err(ContextorError::Cancelled)
        }
        Err(e) => Err(e),
    }
}
