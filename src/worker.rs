//! Debounced compile scheduling.
//!
//! Every request bumps a generation counter. A request is compiled only after a quiet period
//! with no newer request, and its result is delivered only if no newer request arrived while
//! it was compiling.

use crate::dsl::CompileError;
use crate::model::Snapshot;
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(not(target_arch = "wasm32"))]
pub use self::task::CompileWorker;

/// Monotonic request counter shared between the submitter and the compile tasks.
#[derive(Debug, Default)]
pub struct Generation(AtomicU64);

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new generation and return it.
    pub fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.current() == generation
    }
}

/// Work for the compiler. `revision` is the editor's model revision the request was made
/// against and comes back on the result.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileRequest {
    Serialize { revision: u64, snapshot: Snapshot },
    Parse { revision: u64, source: String },
}

impl CompileRequest {
    pub fn revision(&self) -> u64 {
        match self {
            Self::Serialize { revision, .. } | Self::Parse { revision, .. } => *revision,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompileEvent {
    /// A snapshot was serialized.
    Source {
        generation: u64,
        revision: u64,
        text: String,
    },
    /// Edited source was parsed; the snapshot still has fresh ids.
    Parsed {
        generation: u64,
        revision: u64,
        snapshot: Snapshot,
    },
    Failed { generation: u64, error: CompileError },
}

impl CompileEvent {
    pub fn generation(&self) -> u64 {
        match self {
            Self::Source { generation, .. }
            | Self::Parsed { generation, .. }
            | Self::Failed { generation, .. } => *generation,
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod task {
    use super::{CompileEvent, CompileRequest, Generation};
    use crate::compiler::Compiler;
    use crate::dsl::CompileError;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;
    use tracing::debug;

    type Submission = (u64, CompileRequest);

    /// Background task that debounces compile requests and drops stale results.
    pub struct CompileWorker {
        requests: mpsc::UnboundedSender<Submission>,
        generation: Arc<Generation>,
        task: JoinHandle<()>,
    }

    impl CompileWorker {
        /// Start the worker on the current tokio runtime.
        pub fn spawn(
            compiler: Arc<dyn Compiler>,
            debounce: Duration,
        ) -> (Self, mpsc::UnboundedReceiver<CompileEvent>) {
            let (requests, rx) = mpsc::unbounded_channel();
            let (events, events_rx) = mpsc::unbounded_channel();
            let generation = Arc::new(Generation::new());
            let task = tokio::spawn(run(
                compiler,
                Arc::clone(&generation),
                rx,
                events,
                debounce,
            ));
            (
                Self {
                    requests,
                    generation,
                    task,
                },
                events_rx,
            )
        }

        /// Queue a request. Returns the generation its result will carry.
        pub fn submit(&self, request: CompileRequest) -> Result<u64, CompileError> {
            let generation = self.generation.bump();
            self.requests
                .send((generation, request))
                .map_err(|_| CompileError::Unavailable("compile worker has stopped".to_string()))?;
            debug!(generation, "compile requested");
            Ok(generation)
        }

        pub fn generation(&self) -> u64 {
            self.generation.current()
        }
    }

    impl Drop for CompileWorker {
        fn drop(&mut self) {
            self.task.abort();
        }
    }

    async fn run(
        compiler: Arc<dyn Compiler>,
        generation: Arc<Generation>,
        mut rx: mpsc::UnboundedReceiver<Submission>,
        events: mpsc::UnboundedSender<CompileEvent>,
        debounce: Duration,
    ) {
        while let Some(mut latest) = rx.recv().await {
            // Wait for a quiet period; newer requests replace the pending one.
            loop {
                match tokio::time::timeout(debounce, rx.recv()).await {
                    Ok(Some(next)) => {
                        debug!(superseded = latest.0, generation = next.0, "compile debounced");
                        latest = next;
                    }
                    Ok(None) | Err(_) => break,
                }
            }

            let (requested, request) = latest;
            let compiler = Arc::clone(&compiler);
            let generation = Arc::clone(&generation);
            let events = events.clone();
            tokio::spawn(async move {
                let result = match request {
                    CompileRequest::Serialize { revision, snapshot } => {
                        compiler
                            .serialize(snapshot)
                            .await
                            .map(|text| CompileEvent::Source {
                                generation: requested,
                                revision,
                                text,
                            })
                    }
                    CompileRequest::Parse { revision, source } => {
                        compiler
                            .parse(source)
                            .await
                            .map(|snapshot| CompileEvent::Parsed {
                                generation: requested,
                                revision,
                                snapshot,
                            })
                    }
                };
                let event = result.unwrap_or_else(|error| CompileEvent::Failed {
                    generation: requested,
                    error,
                });
                if generation.is_current(requested) {
                    let _ = events.send(event);
                } else {
                    debug!(
                        generation = requested,
                        latest = generation.current(),
                        "dropped stale compile result"
                    );
                }
            });
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::compiler::DslCompiler;
        use crate::model::{DataType, Snapshot, Table};
        use async_trait::async_trait;
        use std::sync::atomic::{AtomicUsize, Ordering};

        /// Counts calls and takes `delay` to answer.
        struct SlowCompiler {
            calls: AtomicUsize,
            delay: Duration,
        }

        #[async_trait]
        impl Compiler for SlowCompiler {
            async fn serialize(&self, snapshot: Snapshot) -> Result<String, CompileError> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(self.delay).await;
                Ok(format!("{} tables", snapshot.tables.len()))
            }

            async fn parse(&self, _source: String) -> Result<Snapshot, CompileError> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(self.delay).await;
                Ok(Snapshot::default())
            }
        }

        fn snapshot(n: usize) -> Snapshot {
            Snapshot::new(
                (0..n)
                    .map(|i| Table::new(&format!("T{}", i), DataType::Uuid))
                    .collect(),
            )
        }

        fn serialize(snapshot: Snapshot) -> CompileRequest {
            CompileRequest::Serialize {
                revision: 0,
                snapshot,
            }
        }

        const DEBOUNCE: Duration = Duration::from_millis(500);

        #[tokio::test(start_paused = true)]
        async fn test_rapid_requests_compile_once() {
            let compiler = Arc::new(SlowCompiler {
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            });
            let (worker, mut events) = CompileWorker::spawn(compiler.clone(), DEBOUNCE);

            for n in 1..=3 {
                worker.submit(serialize(snapshot(n))).unwrap();
                tokio::time::sleep(Duration::from_millis(100)).await;
            }

            let event = events.recv().await.unwrap();
            assert_eq!(
                event,
                CompileEvent::Source {
                    generation: 3,
                    revision: 0,
                    text: "3 tables".to_string()
                }
            );
            assert_eq!(compiler.calls.load(Ordering::SeqCst), 1);

            let quiet = tokio::time::timeout(Duration::from_secs(5), events.recv()).await;
            assert!(quiet.is_err());
        }

        #[tokio::test(start_paused = true)]
        async fn test_stale_in_flight_result_is_dropped() {
            let compiler = Arc::new(SlowCompiler {
                calls: AtomicUsize::new(0),
                delay: Duration::from_secs(2),
            });
            let (worker, mut events) = CompileWorker::spawn(compiler.clone(), DEBOUNCE);

            worker.submit(serialize(snapshot(1))).unwrap();
            // Let the first compile start, then supersede it while in flight.
            tokio::time::sleep(DEBOUNCE + Duration::from_millis(100)).await;
            assert_eq!(compiler.calls.load(Ordering::SeqCst), 1);
            worker.submit(serialize(snapshot(2))).unwrap();

            let event = events.recv().await.unwrap();
            assert_eq!(event.generation(), 2);
            assert_eq!(compiler.calls.load(Ordering::SeqCst), 2);

            let quiet = tokio::time::timeout(Duration::from_secs(10), events.recv()).await;
            assert!(quiet.is_err());
        }

        #[tokio::test(start_paused = true)]
        async fn test_parse_failure_is_reported() {
            let (worker, mut events) = CompileWorker::spawn(Arc::new(DslCompiler), DEBOUNCE);
            let generation = worker
                .submit(CompileRequest::Parse {
                    revision: 0,
                    source: "entity {".to_string(),
                })
                .unwrap();

            match events.recv().await.unwrap() {
                CompileEvent::Failed {
                    generation: g,
                    error,
                } => {
                    assert_eq!(g, generation);
                    assert!(matches!(error, CompileError::Parse(_)));
                }
                other => panic!("expected a failure, got {:?}", other),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_tracks_latest() {
        let generation = Generation::new();
        let first = generation.bump();
        assert!(generation.is_current(first));
        let second = generation.bump();
        assert!(!generation.is_current(first));
        assert!(generation.is_current(second));
        assert_eq!(generation.current(), 2);
    }
}
