//! Wires the composer's attachments, the conversation store and the chat
//! transport together for the UI.
//!
//! Everything here runs on the UI thread. Network calls and preview decodes
//! run on a background runtime and report back over a channel that
//! [`ChatController::poll`] drains once per frame.

use anyhow::Result;
use futures::future::AbortHandle;
use providers::{run_query, ChatQueryRequest, ChatQueryResponse, ChatTransport, TransportError};
use services::attachments::PendingPreview;
use services::{AttachmentManager, ConversationStore, PreviewDecoder, PreviewError, SendError};
use shared::files::FileBlob;
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

enum ControllerEvent {
    QueryFinished {
        request_id: u64,
        outcome: Result<ChatQueryResponse, TransportError>,
    },
    PreviewReady {
        file_id: String,
        result: Result<String, PreviewError>,
    },
}

struct InFlight {
    request_id: u64,
    abort: AbortHandle,
}

type Waker = Arc<dyn Fn() + Send + Sync>;

pub struct ChatController {
    store: ConversationStore,
    attachments: AttachmentManager,
    transport: Arc<dyn ChatTransport>,
    decoder: Arc<dyn PreviewDecoder>,
    timeout: Duration,
    runtime: tokio::runtime::Runtime,
    events_tx: Sender<ControllerEvent>,
    events_rx: Receiver<ControllerEvent>,
    next_request_id: u64,
    in_flight: Option<InFlight>,
    notices: Vec<String>,
    waker: Option<Waker>,
}

impl ChatController {
    pub fn new(
        store: ConversationStore,
        attachments: AttachmentManager,
        transport: Arc<dyn ChatTransport>,
        decoder: Arc<dyn PreviewDecoder>,
        timeout: Duration,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("chat-worker")
            .enable_all()
            .build()?;
        let (events_tx, events_rx) = channel();

        Ok(Self {
            store,
            attachments,
            transport,
            decoder,
            timeout,
            runtime,
            events_tx,
            events_rx,
            next_request_id: 0,
            in_flight: None,
            notices: Vec::new(),
            waker: None,
        })
    }

    /// Called from the background runtime whenever an event is queued.
    pub fn with_waker(mut self, waker: impl Fn() + Send + Sync + 'static) -> Self {
        self.waker = Some(Arc::new(waker));
        self
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn attachments(&self) -> &AttachmentManager {
        &self.attachments
    }

    pub fn is_reasoning(&self) -> bool {
        self.store.is_reasoning()
    }

    pub fn set_draft_text(&mut self, text: impl Into<String>) {
        self.store.set_draft_text(text);
    }

    /// Warnings for the user since the last call.
    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    pub fn attach_paths(&mut self, paths: Vec<PathBuf>) {
        let mut blobs = Vec::with_capacity(paths.len());
        for path in paths {
            match FileBlob::from_path(&path) {
                Ok(blob) => blobs.push(blob),
                Err(e) => {
                    tracing::warn!(path = %path.display(), "could not read attachment: {}", e);
                    self.notices
                        .push(format!("Could not read {}: {}", path.display(), e));
                }
            }
        }
        if !blobs.is_empty() {
            self.attach(blobs);
        }
    }

    /// Stage files now; their previews are decoded in the background.
    pub fn attach(&mut self, files: Vec<FileBlob>) {
        match self.attachments.stage(files) {
            Ok(batch) => {
                self.notices
                    .extend(batch.rejected.iter().map(|e| e.to_string()));
                for pending in batch.pending {
                    self.spawn_preview(pending);
                }
            }
            Err(e) => self.notices.push(e.to_string()),
        }
    }

    pub fn remove_attachment(&mut self, id: &str) {
        self.attachments.remove(id);
    }

    pub fn clear_attachments(&mut self) {
        self.attachments.clear();
    }

    /// Send the draft with the staged files.
    ///
    /// Returns `Ok(false)` for a blank draft, in which case the staged files
    /// stay where they are.
    pub fn send(&mut self) -> Result<bool, SendError> {
        let Some(outgoing) = self.store.begin_send()? else {
            return Ok(false);
        };

        let request = ChatQueryRequest {
            question: outgoing.question,
            session_id: outgoing.session_id,
            user_id: outgoing.user_id,
            files: self.attachments.take_files(),
        };

        self.next_request_id += 1;
        let request_id = self.next_request_id;
        let (abort, registration) = AbortHandle::new_pair();
        self.in_flight = Some(InFlight { request_id, abort });

        tracing::info!(request_id, files = request.files.len(), "starting chat query");
        let transport = Arc::clone(&self.transport);
        let timeout = self.timeout;
        let tx = self.events_tx.clone();
        let waker = self.waker.clone();
        self.runtime.spawn(async move {
            let outcome = run_query(transport.as_ref(), request, registration, timeout).await;
            let _ = tx.send(ControllerEvent::QueryFinished {
                request_id,
                outcome,
            });
            if let Some(wake) = waker {
                wake();
            }
        });

        Ok(true)
    }

    /// Dismiss the pending state and cancel the request behind it.
    pub fn stop_reasoning(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            tracing::info!(request_id = in_flight.request_id, "chat query cancelled");
            in_flight.abort.abort();
        }
        self.store.stop_reasoning();
    }

    /// Start over: new session, empty history, nothing pending.
    pub fn clear_chat(&mut self) {
        self.store.clear_conversation();
        self.stop_reasoning();
    }

    /// Apply everything the background runtime finished since the last frame.
    pub fn poll(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                ControllerEvent::QueryFinished {
                    request_id,
                    outcome,
                } => self.finish_query(request_id, outcome),
                ControllerEvent::PreviewReady { file_id, result } => {
                    self.attachments.attach_preview(&file_id, result);
                }
            }
        }
    }

    fn finish_query(&mut self, request_id: u64, outcome: Result<ChatQueryResponse, TransportError>) {
        if self.in_flight.as_ref().map(|f| f.request_id) != Some(request_id) {
            tracing::debug!(request_id, "discarding result of a dismissed request");
            return;
        }
        self.in_flight = None;

        match &outcome {
            Ok(response) => {
                tracing::info!(request_id, sources = response.sources.len(), "chat answer received")
            }
            Err(e) => tracing::warn!(request_id, "chat query failed: {}", e),
        }
        self.store.end_send(outcome.map(|response| response.answer));
    }

    fn spawn_preview(&self, pending: PendingPreview) {
        let decoder = Arc::clone(&self.decoder);
        let tx = self.events_tx.clone();
        let waker = self.waker.clone();
        self.runtime.spawn(async move {
            let result = decoder.decode(&pending.blob).await;
            let _ = tx.send(ControllerEvent::PreviewReady {
                file_id: pending.file_id,
                result,
            });
            if let Some(wake) = waker {
                wake();
            }
        });
    }
}
