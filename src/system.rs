// File: ./src/system.rs
// Background actor that owns the engine and fires debounced refreshes.
use crate::engine::Engine;
use crate::error::EngineError;
use crate::view::ViewHandle;
use anyhow::{Result, anyhow};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

#[derive(Debug)]
pub enum EngineMessage {
    /// A document was modified.
    Changed(String),
    CreateView {
        key: String,
        host: String,
        block: String,
        reply: oneshot::Sender<Result<ViewHandle, EngineError>>,
    },
    Teardown(ViewHandle),
    Shutdown,
}

/// Spawns the engine actor.
/// returns: Sender for host events, and a handle yielding the engine back on shutdown.
pub fn spawn_engine_actor(mut engine: Engine) -> (mpsc::Sender<EngineMessage>, JoinHandle<Engine>) {
    let (tx, mut rx) = mpsc::channel(64);

    let task = tokio::spawn(async move {
        loop {
            let msg = match engine.next_deadline() {
                Some(deadline) => {
                    tokio::select! {
                        _ = sleep_until(Instant::from_std(deadline)) => {
                            let rendered = engine.fire_due(std::time::Instant::now());
                            if !rendered.is_empty() {
                                log::debug!("Refreshed {} view(s)", rendered.len());
                            }
                            continue;
                        }
                        msg = rx.recv() => msg,
                    }
                }
                // Nothing pending: just wait for the host
                None => rx.recv().await,
            };

            match msg {
                Some(EngineMessage::Changed(source)) => {
                    // Errors are already logged; the views keep their last frame
                    let _ = engine.notify_changed(&source, std::time::Instant::now());
                }
                Some(EngineMessage::CreateView {
                    key,
                    host,
                    block,
                    reply,
                }) => {
                    let result = engine.create_view_from_block(&key, &host, &block);
                    let _ = reply.send(result);
                }
                Some(EngineMessage::Teardown(handle)) => {
                    engine.teardown_view(&handle);
                }
                Some(EngineMessage::Shutdown) | None => break,
            }
        }
        log::debug!("Engine actor stopped");
        engine
    });

    (tx, task)
}

/// Async front for a running engine actor.
#[derive(Debug)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineMessage>,
    task: JoinHandle<Engine>,
}

impl EngineHandle {
    pub fn spawn(engine: Engine) -> Self {
        let (tx, task) = spawn_engine_actor(engine);
        Self { tx, task }
    }

    pub async fn changed(&self, source_id: impl Into<String>) -> Result<()> {
        self.tx
            .send(EngineMessage::Changed(source_id.into()))
            .await
            .map_err(|_| anyhow!("Engine actor is gone"))
    }

    /// Instantiates a view from its block text and waits for the outcome.
    pub async fn create_view(
        &self,
        key: impl Into<String>,
        host: impl Into<String>,
        block: impl Into<String>,
    ) -> Result<ViewHandle> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineMessage::CreateView {
                key: key.into(),
                host: host.into(),
                block: block.into(),
                reply,
            })
            .await
            .map_err(|_| anyhow!("Engine actor is gone"))?;
        Ok(rx.await??)
    }

    pub async fn teardown(&self, handle: ViewHandle) -> Result<()> {
        self.tx
            .send(EngineMessage::Teardown(handle))
            .await
            .map_err(|_| anyhow!("Engine actor is gone"))
    }

    /// Stops the actor and returns the engine with its final state.
    pub async fn shutdown(self) -> Result<Engine> {
        // A closed channel also stops the loop
        let _ = self.tx.send(EngineMessage::Shutdown).await;
        Ok(self.task.await?)
    }
}
