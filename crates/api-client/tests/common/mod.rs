//! Scripted transport shared by the integration tests

#![allow(dead_code)]

use apikit::{
    ConfigHandle, ConfigPatch, RequestDescriptor, ResponseEnvelope, Transport, TransportError,
    TransportSpec,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

type Responder = dyn Fn(&RequestDescriptor, usize) -> Result<ResponseEnvelope, TransportError> + Send + Sync;

/// Records every dispatched request and answers with a closure
pub struct StubTransport {
    responder: Box<Responder>,
    delay: Option<Duration>,
    seen: Mutex<Vec<(Instant, RequestDescriptor)>>,
}

impl StubTransport {
    pub fn new(
        responder: impl Fn(&RequestDescriptor, usize) -> Result<ResponseEnvelope, TransportError>
            + Send
            + Sync
            + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            responder: Box::new(responder),
            delay: None,
            seen: Mutex::new(Vec::new()),
        })
    }

    /// Answers every request with `status` and `data`
    pub fn ok(status: u16, data: serde_json::Value) -> Arc<Self> {
        Self::new(move |_, _| Ok(ResponseEnvelope::new(status, data.clone())))
    }

    /// Waits `delay` before answering, honoring cancellation
    pub fn slow(delay: Duration, data: serde_json::Value) -> Arc<Self> {
        Self::delayed(delay, move |_, _| Ok(ResponseEnvelope::new(200, data.clone())))
    }

    /// Like [`StubTransport::new`], answering after `delay`
    pub fn delayed(
        delay: Duration,
        responder: impl Fn(&RequestDescriptor, usize) -> Result<ResponseEnvelope, TransportError>
            + Send
            + Sync
            + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            responder: Box::new(responder),
            delay: Some(delay),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<RequestDescriptor> {
        self.seen.lock().unwrap().iter().map(|(_, r)| r.clone()).collect()
    }

    pub fn last(&self) -> RequestDescriptor {
        self.requests().pop().expect("no request dispatched")
    }

    /// Gaps between consecutive dispatches
    pub fn gaps(&self) -> Vec<Duration> {
        let seen = self.seen.lock().unwrap();
        seen.windows(2).map(|w| w[1].0 - w[0].0).collect()
    }

    /// A handle configured with `base_url` and this transport
    pub fn handle(self: &Arc<Self>, base_url: &str) -> ConfigHandle {
        ConfigHandle::with_patch(self.patch().base_url(base_url)).unwrap()
    }

    pub fn patch(self: &Arc<Self>) -> ConfigPatch {
        ConfigPatch::new().transport(TransportSpec::Custom(self.clone()))
    }
}

#[async_trait]
impl Transport for StubTransport {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn request(&self, request: RequestDescriptor) -> Result<ResponseEnvelope, TransportError> {
        let index = {
            let mut seen = self.seen.lock().unwrap();
            seen.push((Instant::now(), request.clone()));
            seen.len() - 1
        };

        if let Some(delay) = self.delay {
            let token = request.cancellation.clone().unwrap_or_default();
            tokio::select! {
                () = token.cancelled() => return Err(TransportError::cancelled()),
                () = tokio::time::sleep(delay) => {}
            }
        }

        (self.responder)(&request, index)
    }
}
