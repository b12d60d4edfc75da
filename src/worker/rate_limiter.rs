//! Rate limiter: per-category `tokio::sync::Semaphore`s. Acquire/release is
//! exception-safe via an RAII guard rather than a manual acquire/release
//! pair, so a panicking or cancelled handler still releases its permit.
//!
//! Categories are keyed off the task's function and, for `file_reader`, its
//! input file extension — grouping `.pptx`/`.docx`/`.doc` under one
//! category, `.md` under another, `.txt` under a third. Tasks that don't
//! match any category (including every function other than `file_reader`)
//! are not rate-limited at all.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::RateLimitConfig;
use crate::model::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Category {
    FileReaderDoc,
    FileReaderMd,
    FileReaderTxt,
}

pub struct RateLimiter {
    semaphores: HashMap<Category, Arc<Semaphore>>,
}

/// Held for the duration of a rate-limited handler invocation; dropping it
/// (including via an early return, panic unwind, or cancellation) releases
/// the permit.
pub struct RateLimitGuard(#[allow(dead_code)] Option<OwnedSemaphorePermit>);

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let mut semaphores = HashMap::new();
        semaphores.insert(Category::FileReaderDoc, Arc::new(Semaphore::new(config.file_reader_doc)));
        semaphores.insert(Category::FileReaderMd, Arc::new(Semaphore::new(config.file_reader_md)));
        semaphores.insert(Category::FileReaderTxt, Arc::new(Semaphore::new(config.file_reader_txt)));
        Self { semaphores }
    }

    fn category_for(task: &Task) -> Option<Category> {
        if task.function != "file_reader" {
            return None;
        }
        let extension = task
            .input
            .get("file_name")
            .and_then(|v| v.as_str())
            .and_then(|name| name.rsplit('.').next())
            .unwrap_or_default()
            .to_ascii_lowercase();

        match extension.as_str() {
            "pptx" | "docx" | "ppt" | "doc" => Some(Category::FileReaderDoc),
            "md" => Some(Category::FileReaderMd),
            "txt" => Some(Category::FileReaderTxt),
            _ => None,
        }
    }

    /// Acquires the permit for `task`'s category, if any, returning a guard
    /// that releases it on drop. Tasks outside a rate-limited category get a
    /// no-op guard immediately.
    pub async fn limit(&self, task: &Task) -> RateLimitGuard {
        match Self::category_for(task).and_then(|c| self.semaphores.get(&c)) {
            Some(semaphore) => {
                let permit = semaphore.clone().acquire_owned().await.expect("semaphore never closed");
                RateLimitGuard(Some(permit))
            }
            None => RateLimitGuard(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_task(name: &str) -> Task {
        Task {
            id: "t1".into(),
            priority: 0,
            namespace_id: "ns".into(),
            user_id: "u".into(),
            function: "file_reader".into(),
            input: serde_json::json!({"file_name": name}),
            payload: None,
            output: None,
            exception: None,
            created_at: chrono::Utc::now(),
            started_at: None,
            ended_at: None,
            canceled_at: None,
        }
    }

    #[tokio::test]
    async fn non_file_reader_tasks_are_never_limited() {
        let limiter = RateLimiter::new(&RateLimitConfig { file_reader_doc: 0, file_reader_md: 0, file_reader_txt: 0 });
        let mut task = file_task("a.docx");
        task.function = "collect".into();
        let _guard = limiter.limit(&task).await;
    }

    #[tokio::test]
    async fn doc_extensions_share_one_category() {
        let limiter = RateLimiter::new(&RateLimitConfig { file_reader_doc: 1, file_reader_md: 8, file_reader_txt: 8 });
        let guard1 = limiter.limit(&file_task("a.docx")).await;
        assert_eq!(limiter.semaphores[&Category::FileReaderDoc].available_permits(), 0);
        drop(guard1);
        assert_eq!(limiter.semaphores[&Category::FileReaderDoc].available_permits(), 1);
    }
}
