//! Interactive question loop.

use std::io::{self, BufRead, Write};

use crate::router::QueryRouter;

pub const PROMPT: &str = "Your question: ";
pub const FAREWELL: &str = "Goodbye!";

fn is_exit_command(line: &str) -> bool {
    line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit")
}

/// Read questions from `input` until `exit`/`quit` or end of input, writing
/// each answer to `output`. Every other line, blank included, goes to the router.
pub async fn run_chat<R, W>(input: R, output: &mut W, router: &QueryRouter) -> io::Result<()>
where
    R: BufRead,
    W: Write,
{
    let mut lines = input.lines();
    loop {
        write!(output, "{}", PROMPT)?;
        output.flush()?;

        let Some(line) = lines.next() else {
            writeln!(output, "\n{}", FAREWELL)?;
            return Ok(());
        };
        let line = line?;
        let query = line.trim();

        if is_exit_command(query) {
            writeln!(output, "{}", FAREWELL)?;
            return Ok(());
        }

        let answer = router.resolve(query).await;
        tracing::debug!(strategy = answer.strategy(), "Answered query");
        writeln!(output, "\nAnswer:\n{}\n", answer)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::RouterConfig;
    use crate::testing::{MockGenerator, MockIndex};
    use crate::types::{RecordStore, RetrievedRecord, SalesRecord};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    fn hits() -> Vec<RetrievedRecord> {
        vec![RetrievedRecord {
            record: SalesRecord::new("UK", "MUG", 2.5, ""),
            score: 0.9,
        }]
    }

    fn router(index: Arc<MockIndex>, generator: Arc<MockGenerator>) -> QueryRouter {
        QueryRouter::new(RecordStore::default(), index, generator, RouterConfig::default())
    }

    async fn run(input: &str, router: &QueryRouter) -> String {
        let mut out = Vec::new();
        run_chat(input.as_bytes(), &mut out, router).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn test_exit_is_case_insensitive_and_stops_reading() {
        let index = MockIndex::new(hits());
        let generator = MockGenerator::new(Ok("Mugs sold best.".into()));
        let router = router(index.clone(), generator.clone());

        let out = run("Top?\nEXIT\nignored\n", &router).await;

        assert_eq!(
            out,
            "Your question: \nAnswer:\nMugs sold best.\n\nYour question: Goodbye!\n"
        );
        assert_eq!(index.calls.load(Ordering::SeqCst), 1);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_quit_with_whitespace() {
        let index = MockIndex::new(hits());
        let router = router(index.clone(), MockGenerator::new(Ok("x".into())));

        let out = run("  Quit  \n", &router).await;

        assert_eq!(out, "Your question: Goodbye!\n");
        assert_eq!(index.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_end_of_input_says_goodbye() {
        let index = MockIndex::new(hits());
        let router = router(index.clone(), MockGenerator::new(Ok("x".into())));

        let out = run("", &router).await;

        assert_eq!(out, "Your question: \nGoodbye!\n");
        assert_eq!(index.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_blank_line_is_routed() {
        let index = MockIndex::new(hits());
        let generator = MockGenerator::new(Ok("Ask me about sales.".into()));
        let router = router(index.clone(), generator.clone());

        let out = run("\n", &router).await;

        assert!(out.contains("\nAnswer:\nAsk me about sales.\n"));
        assert!(out.ends_with("Goodbye!\n"));
        assert_eq!(index.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_loop_continues_after_failed_queries() {
        let index = MockIndex::failing();
        let generator = MockGenerator::new(Ok("unused".into()));
        let router = router(index.clone(), generator.clone());

        let out = run("first\nsecond\nquit\n", &router).await;

        assert_eq!(out.matches("search index is unavailable").count(), 2);
        assert!(out.ends_with("Goodbye!\n"));
        assert_eq!(index.calls.load(Ordering::SeqCst), 2);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_generator_failure_prints_records() {
        let router = router(
            MockIndex::new(hits()),
            MockGenerator::new(Err(crate::error::GeneratorError::Quota("429".into()))),
        );

        let out = run("mugs?\n", &router).await;

        assert!(out.contains("\nAnswer:\nHere are some relevant records:\nUK | MUG | 2.5\n"));
    }
}
