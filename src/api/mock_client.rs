use super::client::{ByteStream, StreamSource, StreamTarget};
use crate::error::RunError;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc;
use futures::stream;
use std::sync::{Arc, Mutex};

enum MockResponse {
    Chunks(Vec<String>),
    Failing { chunks: Vec<String>, message: String },
    Pending(mpsc::UnboundedReceiver<Result<Bytes>>),
    OpenError(RunError),
}

/// Scripted [`StreamSource`]: each `open_stream` call consumes the next response.
#[derive(Clone)]
pub struct MockStreamSource {
    responses: Arc<Mutex<Vec<MockResponse>>>,
    opened: Arc<Mutex<Vec<StreamTarget>>>,
}

impl MockStreamSource {
    pub fn new(responses: Vec<std::result::Result<Vec<String>, RunError>>) -> Self {
        let responses = responses
            .into_iter()
            .map(|response| match response {
                Ok(chunks) => MockResponse::Chunks(chunks),
                Err(error) => MockResponse::OpenError(error),
            })
            .collect();
        Self {
            responses: Arc::new(Mutex::new(responses)),
            opened: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a stream that yields `chunks` and then fails with `message`.
    pub fn with_failing_stream(self, chunks: Vec<String>, message: &str) -> Self {
        self.responses.lock().unwrap().push(MockResponse::Failing {
            chunks,
            message: message.to_string(),
        });
        self
    }

    /// A source whose single stream stays open until the returned sender is dropped.
    pub fn pending() -> (Self, mpsc::UnboundedSender<Result<Bytes>>) {
        let (tx, rx) = mpsc::unbounded();
        let source = Self::new(Vec::new());
        source
            .responses
            .lock()
            .unwrap()
            .push(MockResponse::Pending(rx));
        (source, tx)
    }

    pub fn opened(&self) -> Vec<StreamTarget> {
        self.opened.lock().unwrap().clone()
    }
}

fn framed(chunks: Vec<String>) -> Vec<Result<Bytes>> {
    chunks
        .into_iter()
        .map(|s| {
            let framed = if s.ends_with("\n\n") {
                s
            } else {
                format!("{s}\n\n")
            };
            Ok(Bytes::from(framed))
        })
        .collect()
}

#[async_trait]
impl StreamSource for MockStreamSource {
    async fn open_stream(
        &self,
        target: &StreamTarget,
    ) -> std::result::Result<ByteStream, RunError> {
        self.opened.lock().unwrap().push(target.clone());
        let next = {
            let mut responses_guard = self.responses.lock().unwrap();
            if responses_guard.is_empty() {
                return Err(RunError::Open(
                    "MockStreamSource: No more responses configured".to_string(),
                ));
            }
            responses_guard.remove(0)
        };

        match next {
            MockResponse::Chunks(chunks) => Ok(Box::pin(stream::iter(framed(chunks)))),
            MockResponse::Failing { chunks, message } => {
                let mut items = framed(chunks);
                items.push(Err(anyhow::anyhow!(message)));
                Ok(Box::pin(stream::iter(items)))
            }
            MockResponse::Pending(rx) => Ok(Box::pin(rx)),
            MockResponse::OpenError(error) => Err(error),
        }
    }
}
