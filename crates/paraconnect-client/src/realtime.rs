//! Realtime transport for the active case.
//!
//! Prefers the server-sent event stream and falls back to fixed-interval
//! polling while the stream is down. Transport failures are only logged;
//! the workspace sees nothing but [`TransportSignal`]s.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use paraconnect_shared::{CaseId, RefreshFlags};

use crate::api::CaseApi;
use crate::config::ClientConfig;
use crate::sse::{SseDecoder, SseEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    Idle,
    Streaming,
    Polling,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSignal {
    /// Fetch the given scopes; `tasks` refetches the whole case record.
    Refresh { case_id: CaseId, flags: RefreshFlags },
    Mode(TransportMode),
}

#[derive(Default)]
struct TransportInner {
    case_id: Option<CaseId>,
    stream: Option<CancellationToken>,
    stream_active: bool,
    polling: Option<CancellationToken>,
    mode: Option<TransportMode>,
}

impl TransportInner {
    fn current_mode(&self) -> TransportMode {
        if self.stream_active {
            TransportMode::Streaming
        } else if self.polling.is_some() {
            TransportMode::Polling
        } else {
            TransportMode::Idle
        }
    }
}

pub struct RealtimeTransport {
    api: Arc<dyn CaseApi>,
    poll_interval: Duration,
    stream_retry: Duration,
    signals: mpsc::UnboundedSender<TransportSignal>,
    inner: Mutex<TransportInner>,
}

impl RealtimeTransport {
    pub fn new(
        api: Arc<dyn CaseApi>,
        config: &ClientConfig,
        signals: mpsc::UnboundedSender<TransportSignal>,
    ) -> Arc<Self> {
        Arc::new(Self {
            api,
            poll_interval: config.poll_interval,
            stream_retry: config.stream_retry,
            signals,
            inner: Mutex::new(TransportInner::default()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, TransportInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mode(&self) -> TransportMode {
        self.lock().current_mode()
    }

    /// Report a mode change, if there was one.
    fn publish_mode(&self, inner: &mut TransportInner) {
        let mode = inner.current_mode();
        if inner.mode != Some(mode) {
            inner.mode = Some(mode);
            tracing::debug!(?mode, "Transport mode changed");
            let _ = self.signals.send(TransportSignal::Mode(mode));
        }
    }

    /// Case the poll loop refreshes.
    pub fn set_case(&self, case_id: CaseId) {
        self.lock().case_id = Some(case_id);
    }

    /// Open the event stream for `case_id`, replacing any previous stream.
    pub fn start_stream(self: &Arc<Self>, case_id: CaseId) {
        let token = CancellationToken::new();
        {
            let mut inner = self.lock();
            if let Some(previous) = inner.stream.replace(token.clone()) {
                previous.cancel();
            }
            inner.stream_active = false;
            inner.case_id = Some(case_id.clone());
        }
        tracing::info!(%case_id, "Starting event stream");
        tokio::spawn(Arc::clone(self).run_stream(case_id, token));
    }

    /// Close the stream and clear the active flag. Polling is left alone.
    pub fn stop_stream(&self) {
        let mut inner = self.lock();
        if let Some(token) = inner.stream.take() {
            token.cancel();
            tracing::debug!("Event stream stopped");
        }
        inner.stream_active = false;
        self.publish_mode(&mut inner);
    }

    /// Start the fallback poll loop for the current case. No-op while the
    /// stream is active or a poll loop already runs.
    pub fn start_polling(&self) {
        let mut inner = self.lock();
        self.start_polling_locked(&mut inner);
    }

    fn start_polling_locked(&self, inner: &mut TransportInner) {
        if inner.stream_active || inner.polling.is_some() {
            return;
        }
        let Some(case_id) = inner.case_id.clone() else {
            return;
        };

        let token = CancellationToken::new();
        inner.polling = Some(token.clone());
        self.publish_mode(inner);

        let signals = self.signals.clone();
        let period = self.poll_interval;
        tracing::debug!(%case_id, ?period, "Polling started");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let signal = TransportSignal::Refresh {
                            case_id: case_id.clone(),
                            flags: RefreshFlags::all(),
                        };
                        if signals.send(signal).is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }

    pub fn stop_polling(&self) {
        let mut inner = self.lock();
        if let Some(token) = inner.polling.take() {
            token.cancel();
            tracing::debug!("Polling stopped");
        }
        self.publish_mode(&mut inner);
    }

    /// Stop everything and forget the case.
    pub fn shutdown(&self) {
        let mut inner = self.lock();
        if let Some(token) = inner.stream.take() {
            token.cancel();
        }
        if let Some(token) = inner.polling.take() {
            token.cancel();
        }
        inner.stream_active = false;
        inner.case_id = None;
        self.publish_mode(&mut inner);
    }

    fn set_stream_active(&self, token: &CancellationToken, active: bool) {
        let mut inner = self.lock();
        if token.is_cancelled() {
            return;
        }
        inner.stream_active = active;
        if active {
            if let Some(polling) = inner.polling.take() {
                polling.cancel();
            }
        } else {
            self.start_polling_locked(&mut inner);
        }
        self.publish_mode(&mut inner);
    }

    fn dispatch(&self, case_id: &CaseId, event: &SseEvent) {
        let Some(flags) = RefreshFlags::from_stream_event(&event.event) else {
            if event.event != "ping" {
                tracing::trace!(event = %event.event, "Ignoring stream event");
            }
            return;
        };
        let _ = self.signals.send(TransportSignal::Refresh {
            case_id: case_id.clone(),
            flags,
        });
    }

    async fn run_stream(self: Arc<Self>, case_id: CaseId, token: CancellationToken) {
        let mut retry = self.stream_retry;

        loop {
            let opened = tokio::select! {
                _ = token.cancelled() => return,
                opened = self.api.open_stream(&case_id) => opened,
            };

            match opened {
                Ok(mut body) => {
                    tracing::debug!(%case_id, "Event stream open");
                    self.set_stream_active(&token, true);
                    let mut decoder = SseDecoder::new();
                    loop {
                        let chunk = tokio::select! {
                            _ = token.cancelled() => return,
                            chunk = body.next() => chunk,
                        };
                        match chunk {
                            Some(Ok(bytes)) => {
                                for event in decoder.feed(&bytes) {
                                    self.dispatch(&case_id, &event);
                                }
                            }
                            Some(Err(e)) => {
                                tracing::warn!(%case_id, error = %e, "Event stream error");
                                break;
                            }
                            None => {
                                tracing::debug!(%case_id, "Event stream closed by server");
                                break;
                            }
                        }
                    }
                    if let Some(hint) = decoder.retry() {
                        retry = hint;
                    }
                }
                Err(e) => {
                    tracing::warn!(%case_id, error = %e, "Failed to open event stream");
                }
            }

            self.set_stream_active(&token, false);

            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(retry) => {}
            }
        }
    }
}
