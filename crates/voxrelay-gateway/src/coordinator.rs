//! Per-session generation driver with epoch-based barge-in.
//!
//! The coordinator owns one session's generations. Each transcript bumps the
//! session epoch, which silences whatever generation was running; only the
//! generation holding the current epoch may put frames on the channel. The
//! check and the send happen under the session lock, so a superseded stream
//! cannot slip a frame in after the bump.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use voxrelay_core::channel::SessionChannel;
use voxrelay_core::error::RelayError;
use voxrelay_core::protocol::ServerEvent;
use voxrelay_core::session::{self, SessionHandle, SessionStatus};
use voxrelay_media::segmenter::SentenceSegmenter;
use voxrelay_media::speech::SpeechAdapter;
use voxrelay_media::transmit::{AudioSink, ChunkTransmitter, TransmitOutcome};
use voxrelay_providers::{GenerationRequest, Generator};

use crate::registry::SessionRegistry;
use crate::state::GatewayState;

/// Everything the transport reports about a session, in arrival order.
#[derive(Debug)]
pub enum SessionEvent {
    /// A finished utterance. May be empty.
    Transcript(String),
    /// The client closed the channel.
    Closed,
    /// The transport failed. Always [`RelayError::Channel`].
    ChannelError(RelayError),
}

/// How one generation ended.
#[derive(Debug)]
enum GenerationOutcome {
    Completed,
    /// A newer epoch took over, or the channel went away.
    Superseded,
    Failed(RelayError),
}

struct ActiveGeneration {
    epoch: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Drives generations for one session.
pub struct StreamCoordinator {
    session_id: String,
    handle: SessionHandle,
    channel: SessionChannel,
    registry: SessionRegistry,
    generator: Arc<dyn Generator>,
    speech: SpeechAdapter,
    transmitter: ChunkTransmitter,
    grace: Duration,
    active: Option<ActiveGeneration>,
}

impl StreamCoordinator {
    /// `channel` is the connection this coordinator serves. Once another
    /// channel is attached to the session, this coordinator stops acting on it.
    pub fn new(
        state: &GatewayState,
        session_id: String,
        handle: SessionHandle,
        channel: SessionChannel,
    ) -> Self {
        Self {
            session_id,
            handle,
            channel,
            registry: state.registry.clone(),
            generator: state.generator.clone(),
            speech: state.speech.clone(),
            transmitter: state.transmitter(),
            grace: state.settings.supersede_grace(),
            active: None,
        }
    }

    /// Drain session events until the channel ends, then stop any live generation.
    pub async fn run(mut self, mut events: mpsc::Receiver<SessionEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::Transcript(text) => self.handle_transcript(text).await,
                SessionEvent::Closed => {
                    debug!(session_id = %self.session_id, "Channel closed by client");
                    break;
                }
                SessionEvent::ChannelError(e) => {
                    warn!(session_id = %self.session_id, error = %e, "Channel error");
                    break;
                }
            }
        }
        self.shutdown().await;
    }

    /// Supersede the current generation (if any) and start one for `text`.
    ///
    /// An empty transcript still interrupts but starts nothing.
    pub async fn handle_transcript(&mut self, text: String) {
        self.supersede().await;

        if text.trim().is_empty() {
            debug!(session_id = %self.session_id, "Empty transcript, nothing to generate");
            return;
        }

        let (epoch, prompt) = {
            let mut s = session::lock(&self.handle);
            if s.is_disconnected() {
                return;
            }
            if !s.is_attached(&self.channel) {
                debug!(session_id = %self.session_id, "Channel replaced, ignoring transcript");
                return;
            }
            let epoch = s.bump_epoch();
            s.is_processing = true;
            s.status = SessionStatus::Processing;
            s.touch();
            (epoch, s.prompt.clone())
        };

        info!(session_id = %self.session_id, epoch, "Starting generation");

        let cancel = CancellationToken::new();
        let job = GenerationJob {
            gate: EpochGate {
                handle: self.handle.clone(),
                channel: self.channel.clone(),
                registry: self.registry.clone(),
                session_id: self.session_id.clone(),
                epoch,
            },
            generator: self.generator.clone(),
            speech: self.speech.clone(),
            transmitter: self.transmitter,
            request: GenerationRequest {
                system_prompt: prompt,
                user_message: text,
            },
        };
        let task = tokio::spawn(drive(job, cancel.clone()));

        self.active = Some(ActiveGeneration {
            epoch,
            cancel,
            task,
        });
    }

    /// Cancel the live generation and wait briefly for it to unwind.
    async fn supersede(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };

        {
            let mut s = session::lock(&self.handle);
            if s.epoch == active.epoch {
                s.bump_epoch();
            }
        }
        active.cancel.cancel();

        let mut task = active.task;
        if !task.is_finished() {
            debug!(session_id = %self.session_id, epoch = active.epoch, "Superseding generation");
            if tokio::time::timeout(self.grace, &mut task).await.is_err() {
                warn!(session_id = %self.session_id, "Generation did not unwind in time, aborting");
                task.abort();
            }
        }

        let mut s = session::lock(&self.handle);
        if !s.is_disconnected() && s.is_attached(&self.channel) {
            s.is_processing = false;
            s.status = SessionStatus::Connected;
        }
    }

    /// Stop any live generation. Used on teardown.
    pub async fn shutdown(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            active.task.abort();
            debug!(session_id = %self.session_id, epoch = active.epoch, "Generation cancelled on teardown");
        }
    }
}

/// Output gate for one generation epoch.
#[derive(Clone)]
struct EpochGate {
    handle: SessionHandle,
    channel: SessionChannel,
    registry: SessionRegistry,
    session_id: String,
    epoch: u64,
}

impl EpochGate {
    fn is_current(&self) -> bool {
        let s = session::lock(&self.handle);
        !s.is_disconnected() && s.epoch == self.epoch && s.is_attached(&self.channel)
    }

    /// Send `event` if this epoch may still emit on this gate's channel.
    fn emit(&self, event: ServerEvent) -> bool {
        let s = session::lock(&self.handle);
        if !s.accepts_output(self.epoch) || !s.is_attached(&self.channel) {
            return false;
        }
        self.channel.send_event(event)
    }
}

#[async_trait]
impl AudioSink for EpochGate {
    async fn send_audio(&self, chunk: Bytes) -> bool {
        if !self.registry.contains(&self.session_id).await {
            return false;
        }
        let s = session::lock(&self.handle);
        if !s.accepts_output(self.epoch) || !s.is_attached(&self.channel) {
            return false;
        }
        self.channel.send_audio(chunk)
    }
}

struct GenerationJob {
    gate: EpochGate,
    generator: Arc<dyn Generator>,
    speech: SpeechAdapter,
    transmitter: ChunkTransmitter,
    request: GenerationRequest,
}

async fn drive(job: GenerationJob, cancel: CancellationToken) {
    let outcome = tokio::select! {
        _ = cancel.cancelled() => GenerationOutcome::Superseded,
        outcome = job.run() => outcome,
    };
    job.finish(outcome);
}

impl GenerationJob {
    async fn run(&self) -> GenerationOutcome {
        let mut stream = match self.generator.stream(&self.request).await {
            Ok(stream) => stream,
            Err(e) => return GenerationOutcome::Failed(RelayError::UpstreamGeneration(e.to_string())),
        };

        let mut segmenter = SentenceSegmenter::new();
        while let Some(item) = stream.next().await {
            let delta = match item {
                Ok(delta) => delta,
                Err(e) => {
                    return GenerationOutcome::Failed(RelayError::UpstreamGeneration(e.to_string()));
                }
            };
            if delta.is_empty() {
                continue;
            }

            if !self.gate.emit(ServerEvent::text(delta.as_str())) {
                return GenerationOutcome::Superseded;
            }

            if let Some(sentence) = segmenter.feed(&delta) {
                if !self.speak(&sentence).await {
                    return GenerationOutcome::Superseded;
                }
            }
        }

        if let Some(rest) = segmenter.flush() {
            if !self.speak(&rest).await {
                return GenerationOutcome::Superseded;
            }
        }

        GenerationOutcome::Completed
    }

    /// Synthesize and transmit one sentence. Returns false once this epoch is stale.
    async fn speak(&self, sentence: &str) -> bool {
        if !self.gate.is_current() {
            return false;
        }

        let audio = match self.speech.speak(sentence).await {
            Ok(Some(audio)) => audio,
            Ok(None) => return true,
            Err(e) => {
                // Reported, and the reply keeps streaming
                warn!(session_id = %self.gate.session_id, error = %e, "Synthesis failed");
                return self.gate.emit(ServerEvent::error(e.client_message()));
            }
        };

        if !self.gate.is_current() {
            return false;
        }

        match self.transmitter.transmit(&self.gate, audio).await {
            TransmitOutcome::Completed { chunks } => {
                debug!(session_id = %self.gate.session_id, chunks, "Audio sent");
                true
            }
            TransmitOutcome::Stopped { .. } => false,
        }
    }

    fn finish(&self, outcome: GenerationOutcome) {
        let session_id = &self.gate.session_id;
        let mut s = session::lock(&self.gate.handle);

        if s.is_disconnected() || s.epoch != self.gate.epoch {
            debug!(session_id = %session_id, epoch = self.gate.epoch, "Stale generation unwound");
            return;
        }

        match outcome {
            GenerationOutcome::Completed => {
                info!(session_id = %session_id, epoch = self.gate.epoch, "Generation complete");
            }
            GenerationOutcome::Superseded => {
                debug!(session_id = %session_id, "Generation stopped");
            }
            GenerationOutcome::Failed(err) => {
                // The error status is transient: it is logged here and the
                // session returns to Connected below under the same lock.
                warn!(
                    session_id = %session_id,
                    status = ?SessionStatus::Error,
                    error = %err,
                    "Generation failed"
                );
                if s.is_attached(&self.gate.channel) {
                    self.gate
                        .channel
                        .send_event(ServerEvent::error(err.client_message()));
                }
            }
        }

        s.is_processing = false;
        s.status = SessionStatus::Connected;
    }
}
