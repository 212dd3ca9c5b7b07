//! Tracking session: discovery agent plus change monitor, started and stopped
//! together.
//!
//! A session must be driven from inside a tokio runtime. Each mutation batch
//! is handled synchronously; deliveries are spawned as independent tasks so a
//! slow or failing relay never holds up the next batch.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use glimpse_logging::abbreviate_image_ref;

use crate::delivery::ImageSink;
use crate::discovery::{DiscoveryAgent, DiscoveryError, TrackedImage};
use crate::dom::HostDocument;
use crate::matcher::{ImageMatcher, MatchRule, DEFAULT_ENCODING_PREFIX, DEFAULT_MIN_SIZE};
use crate::monitor::ChangeMonitor;
use crate::mutation::Mutation;

/// Deployment settings for one agent.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub rule: MatchRule,
    /// Also deliver images found by the initial scan.
    pub deliver_pre_existing: bool,
}

impl TrackerConfig {
    /// Marker-class images; only arrivals after start are delivered.
    pub fn markers() -> Self {
        Self { rule: MatchRule::default(), deliver_pre_existing: false }
    }

    /// Inline JPEG payloads of at least 50x50; everything found is delivered.
    pub fn inline_jpeg() -> Self {
        Self {
            rule: MatchRule::encoding(DEFAULT_ENCODING_PREFIX, DEFAULT_MIN_SIZE),
            deliver_pre_existing: true,
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::markers()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("tracker session already started")]
    AlreadyStarted,
    #[error("tracker session not started")]
    NotStarted,
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

pub struct TrackerSession {
    monitor: ChangeMonitor,
    agent: DiscoveryAgent,
    sink: Arc<dyn ImageSink>,
    deliver_pre_existing: bool,
    attached: bool,
    in_flight: Vec<JoinHandle<()>>,
}

impl TrackerSession {
    pub fn new(config: TrackerConfig, sink: Arc<dyn ImageSink>) -> Self {
        Self {
            monitor: ChangeMonitor::new(ImageMatcher::new(config.rule)),
            agent: DiscoveryAgent::new(),
            sink,
            deliver_pre_existing: config.deliver_pre_existing,
            attached: false,
            in_flight: Vec::new(),
        }
    }

    /// Run the initial scan, then attach the monitor.
    ///
    /// Returns the number of pre-existing images.
    pub fn start<D: HostDocument>(&mut self, document: &D) -> Result<usize, SessionError> {
        if self.attached {
            return Err(SessionError::AlreadyStarted);
        }
        let initial = self.agent.initialize(document, self.monitor.matcher())?;
        self.attached = true;
        info!(
            initial_count = initial,
            watched_attribute = self.monitor.watched_attribute(),
            "Image tracker watching"
        );

        if self.deliver_pre_existing {
            let existing = self.agent.images().to_vec();
            for image in existing {
                self.dispatch(image);
            }
        }
        Ok(initial)
    }

    /// Handle one observer callback. Returns the images it discovered.
    pub fn handle_batch<D: HostDocument>(
        &mut self,
        document: &D,
        batch: &[Mutation<D::Element>],
    ) -> Vec<TrackedImage> {
        if !self.attached {
            debug!("Mutation batch after stop ignored");
            return Vec::new();
        }
        if !self.monitor.is_relevant(batch) {
            return Vec::new();
        }

        let discovered = self.monitor.rescan(document, &mut self.agent);
        for image in &discovered {
            if image.is_new() || self.deliver_pre_existing {
                self.dispatch(image.clone());
            }
        }
        discovered
    }

    /// Consume batches until the channel closes or the session is stopped.
    pub async fn run<D: HostDocument>(
        &mut self,
        document: &D,
        batches: &mut mpsc::Receiver<Vec<Mutation<D::Element>>>,
    ) -> Result<(), SessionError> {
        if !self.attached {
            return Err(SessionError::NotStarted);
        }
        while let Some(batch) = batches.recv().await {
            self.handle_batch(document, &batch);
            if !self.attached {
                break;
            }
        }
        Ok(())
    }

    /// Detach the monitor and forget every tracked image.
    ///
    /// Deliveries already in flight run to completion.
    pub fn stop(&mut self) {
        if self.attached {
            self.attached = false;
            self.agent.reset();
            info!("Image tracker stopped and cache cleared");
        }
    }

    pub fn is_running(&self) -> bool {
        self.attached
    }

    pub fn agent(&self) -> &DiscoveryAgent {
        &self.agent
    }

    /// Wait for every delivery spawned so far.
    pub async fn drain(&mut self) {
        for handle in std::mem::take(&mut self.in_flight) {
            if let Err(e) = handle.await {
                warn!(error = %e, "Delivery task aborted");
            }
        }
    }

    fn dispatch(&mut self, image: TrackedImage) {
        let sink = Arc::clone(&self.sink);
        let handle = tokio::spawn(async move {
            match sink.deliver(&image).await {
                Ok(result) => info!(position = image.position, result = %result, "Relay response"),
                Err(e) => warn!(
                    src = %abbreviate_image_ref(&image.source),
                    position = image.position,
                    error = %e,
                    "Delivery failed"
                ),
            }
        });
        self.in_flight.retain(|h| !h.is_finished());
        self.in_flight.push(handle);
    }
}

impl Drop for TrackerSession {
    fn drop(&mut self) {
        self.stop();
    }
}
