use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tracing::debug;
use vigil::{Parser, ProbeRegistry, Queue, Test};

/// Parse every test line in `files`, failing on the first bad line.
///
/// Unknown test types are rejected here rather than left for a worker to
/// drop.
pub fn read_jobs(
    registry: &ProbeRegistry,
    parser: &Parser,
    files: &[PathBuf],
) -> Result<Vec<Test>> {
    let mut tests = Vec::new();

    for file in files {
        let contents =
            fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;

        for (index, line) in contents.lines().enumerate() {
            let location = format!("{}:{}", file.display(), index + 1);
            let Some(test) = parser.parse_line(line).with_context(|| location.clone())? else {
                continue;
            };
            if !registry.contains(&test.kind) {
                bail!("{location}: unknown test type '{}'", test.kind);
            }
            tests.push(test);
        }
    }

    Ok(tests)
}

/// Push each test's original line onto `jobs_queue`. Returns how many were
/// pushed.
pub async fn push_jobs(queue: &dyn Queue, jobs_queue: &str, tests: &[Test]) -> Result<usize> {
    for test in tests {
        queue
            .push(jobs_queue, test.input.as_bytes())
            .await
            .with_context(|| format!("Failed to enqueue '{}'", test.sanitize()))?;
        debug!(kind = %test.kind, target = %test.target, "Enqueued test");
    }
    Ok(tests.len())
}
