//! Fixed window request pipeline.
//!
//! Tasks per pipeline:
//!
//! - send loop: takes submitted Interests, waits for a window slot, hands
//!   them to the owner loop;
//! - owner loop: sole owner of the [`FetchTable`] and of the face. Classifies
//!   every inbound packet, transmits, delivers responses and failures;
//! - sweep loop: periodically asks the owner to expire old entries;
//! - one short-lived task per congestion backoff, which asks the owner to
//!   resend once the delay has elapsed.
//!
//! Everything that is not the owner talks to it through [`Command`]s.

use std::sync::Arc;
use std::time::Duration;

use ndnfs_core::{
    Action, Admission, Config, ConfigError, Data, FetchError, FetchTable, Interest, Name, Packet,
};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::face::Face;

enum Command {
    Dispatch(Interest),
    Resend(Name),
    Sweep,
    Abandon(Vec<Name>),
}

/// The owner loop has to stop: pipeline cancelled, face gone or consumer gone.
struct Stopped;

/// Cloneable submit side of a pipeline.
#[derive(Clone)]
pub struct PipelineHandle {
    submit: mpsc::Sender<Interest>,
    commands: mpsc::UnboundedSender<Command>,
}

impl PipelineHandle {
    /// Enqueue a request. Waits only when the submit queue is full.
    ///
    /// A request for a name that is already in flight is coalesced into it:
    /// both share the first request's single response or failure, so the
    /// second submit produces no outcome of its own.
    pub async fn submit(&self, interest: Interest) -> Result<(), FetchError> {
        self.submit
            .send(interest)
            .await
            .map_err(|_| FetchError::Closed)
    }

    /// Raw submit queue, for callers that interleave submission with draining.
    pub fn submitter(&self) -> &mpsc::Sender<Interest> {
        &self.submit
    }

    /// Drop pending requests without waiting for their outcome and give
    /// their window slots back. Names that are not pending are ignored.
    pub fn abandon(&self, names: Vec<Name>) {
        if names.is_empty() {
            return;
        }
        let _ = self.commands.send(Command::Abandon(names));
    }
}

pub struct Pipeline {
    handle: PipelineHandle,
    responses: mpsc::Receiver<Data>,
    failures: mpsc::Receiver<FetchError>,
    window: Arc<Semaphore>,
    capacity: usize,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Start the pipeline tasks on the current tokio runtime.
    pub fn new(face: Face, config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;

        let (submit_tx, submit_rx) = mpsc::channel(config.submit_queue);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (response_tx, response_rx) = mpsc::channel(config.response_queue);
        let (failure_tx, failure_rx) = mpsc::channel(config.response_queue);
        let window = Arc::new(Semaphore::new(config.window));
        let cancel = CancellationToken::new();

        let owner = Owner {
            face,
            table: FetchTable::new(config.retry_policy()),
            window: window.clone(),
            commands: command_tx.clone(),
            responses: response_tx,
            failures: failure_tx,
            cancel: cancel.clone(),
        };

        let tasks = vec![
            tokio::spawn(send_loop(
                submit_rx,
                window.clone(),
                command_tx.clone(),
                cancel.clone(),
            )),
            tokio::spawn(owner.run(command_rx)),
            tokio::spawn(sweep_loop(
                config.sweep_interval,
                command_tx.clone(),
                cancel.clone(),
            )),
        ];
        debug!(window = config.window, "started fixed window pipeline");

        Ok(Self {
            handle: PipelineHandle {
                submit: submit_tx,
                commands: command_tx,
            },
            responses: response_rx,
            failures: failure_rx,
            window,
            capacity: config.window,
            cancel,
            tasks,
        })
    }

    pub fn handle(&self) -> PipelineHandle {
        self.handle.clone()
    }

    /// See [`PipelineHandle::submit`].
    pub async fn submit(&self, interest: Interest) -> Result<(), FetchError> {
        self.handle.submit(interest).await
    }

    /// Matched Data, one per resolved request, in arrival order.
    pub fn responses(&mut self) -> &mut mpsc::Receiver<Data> {
        &mut self.responses
    }

    /// Terminal failures and protocol violations, in arrival order.
    pub fn failures(&mut self) -> &mut mpsc::Receiver<FetchError> {
        &mut self.failures
    }

    /// Next response or failure, whichever is ready first (responses win
    /// ties). `None` once the pipeline has stopped.
    pub async fn next_outcome(&mut self) -> Option<Result<Data, FetchError>> {
        tokio::select! {
            biased;
            Some(data) = self.responses.recv() => Some(Ok(data)),
            Some(err) = self.failures.recv() => Some(Err(err)),
            else => None,
        }
    }

    /// Window slots currently held by requests.
    pub fn in_flight(&self) -> usize {
        self.capacity
            .saturating_sub(self.window.available_permits())
    }

    /// Stop every task. Unresolved requests are abandoned and nothing is
    /// delivered afterwards.
    pub async fn close(mut self) {
        debug!("closing fixed window pipeline");
        self.cancel.cancel();
        for task in std::mem::take(&mut self.tasks) {
            let _ = task.await;
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn send_loop(
    mut submit: mpsc::Receiver<Interest>,
    window: Arc<Semaphore>,
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
) {
    loop {
        let interest = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = submit.recv() => match next {
                Some(interest) => interest,
                None => break,
            },
        };
        // wait for the window to slide
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = window.acquire() => permit,
        };
        match permit {
            // released by the owner once the request is resolved
            Ok(permit) => permit.forget(),
            Err(_) => break,
        }
        if commands.send(Command::Dispatch(interest)).is_err() {
            break;
        }
    }
    debug!("stopping pipeline send loop");
}

async fn sweep_loop(
    period: Duration,
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if commands.send(Command::Sweep).is_err() {
                    break;
                }
            }
        }
    }
}

/// Current instant on the tokio clock, so paused-time tests drive the table too.
fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}

struct Owner {
    face: Face,
    table: FetchTable,
    window: Arc<Semaphore>,
    commands: mpsc::UnboundedSender<Command>,
    responses: mpsc::Sender<Data>,
    failures: mpsc::Sender<FetchError>,
    cancel: CancellationToken,
}

impl Owner {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            // inbound packets first: Data beats a sweep queued at the same instant
            let step = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                packet = self.face.rx.recv() => match packet {
                    Some(packet) => self.on_packet(packet).await,
                    None => {
                        warn!("face closed");
                        break;
                    }
                },
                command = commands.recv() => match command {
                    Some(command) => self.on_command(command).await,
                    None => break,
                },
            };
            if step.is_err() {
                break;
            }
        }
        debug!(pending = self.table.len(), "stopping pipeline receive loop");
    }

    async fn on_packet(&mut self, packet: Packet) -> Result<(), Stopped> {
        match packet.classify() {
            Ok(inbound) => match self.table.on_inbound(inbound, now()) {
                Some(action) => self.apply(action).await,
                None => Ok(()),
            },
            Err(err) => self.apply(Action::Violation(err)).await,
        }
    }

    async fn on_command(&mut self, command: Command) -> Result<(), Stopped> {
        match command {
            Command::Dispatch(interest) => match self.table.begin(interest, now()) {
                Admission::Sent(interest) => self.transmit(interest).await,
                Admission::Coalesced => {
                    self.window.add_permits(1);
                    Ok(())
                }
            },
            Command::Resend(name) => match self.table.resend(&name, now()) {
                Some(interest) => self.transmit(interest).await,
                None => Ok(()),
            },
            Command::Sweep => {
                for action in self.table.sweep(now()) {
                    self.apply(action).await?;
                }
                Ok(())
            }
            Command::Abandon(names) => {
                for name in names {
                    if self.table.abandon(&name) {
                        debug!(%name, "abandoned request");
                        self.window.add_permits(1);
                    }
                }
                Ok(())
            }
        }
    }

    async fn apply(&mut self, action: Action) -> Result<(), Stopped> {
        match action {
            Action::Transmit(interest) => self.transmit(interest).await,
            Action::ResendAfter { name, delay } => {
                self.schedule_resend(name, delay);
                Ok(())
            }
            Action::Deliver(data) => {
                self.window.add_permits(1);
                send_or_cancel(&self.responses, data, &self.cancel).await
            }
            Action::Fail(err) => {
                self.window.add_permits(1);
                send_or_cancel(&self.failures, err, &self.cancel).await
            }
            Action::Violation(err) => {
                warn!(error = %err, "protocol violation");
                send_or_cancel(&self.failures, err, &self.cancel).await
            }
        }
    }

    async fn transmit(&mut self, interest: Interest) -> Result<(), Stopped> {
        send_or_cancel(&self.face.tx, Packet::Interest(interest), &self.cancel)
            .await
            .map_err(|stopped| {
                if !self.cancel.is_cancelled() {
                    warn!("face closed, cannot transmit");
                }
                stopped
            })
    }

    fn schedule_resend(&self, name: Name, delay: Duration) {
        debug!(%name, ?delay, "backing off before resend");
        let commands = self.commands.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = commands.send(Command::Resend(name));
                }
            }
        });
    }
}

async fn send_or_cancel<T>(
    tx: &mpsc::Sender<T>,
    value: T,
    cancel: &CancellationToken,
) -> Result<(), Stopped> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Stopped),
        sent = tx.send(value) => sent.map_err(|_| Stopped),
    }
}
