//! Multiboard group: board ownership, install and remove.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use daq_board::{AcquisitionBoard, BoardError, InterruptWaker, ResolvedConfig};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::barrier::{RoundBarrier, RoundCallback};
use crate::error::{MultiboardError, Result};
use crate::readout::{ReadoutBatch, RoundEvent};
use crate::sink::{RoundReceiver, RoundSnapshot};
use crate::stats::RoundStats;

/// A board handle as shared between the group, start helpers and the barrier.
pub(crate) type BoardSlot = Mutex<Box<dyn AcquisitionBoard>>;

/// Whether [`MultiboardGroup::install`] returns after starting the boards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstallMode {
    /// Return once every board is running; the barrier runs in the background
    #[default]
    Background,
    /// Block the caller until the barrier thread exits
    Blocking,
}

/// Stops one installation of a [`MultiboardGroup`] from anywhere.
///
/// Obtained from [`MultiboardGroup::stop_handle`]. Each installation gets a
/// fresh handle, so a handle kept past [`MultiboardGroup::remove`] no longer
/// affects the group. Stopping ends the round barrier but leaves the boards
/// running until `remove()`.
#[derive(Clone)]
pub struct StopHandle {
    terminate: Arc<AtomicBool>,
    wakers: Arc<[Arc<dyn InterruptWaker>]>,
}

impl StopHandle {
    fn new(wakers: Arc<[Arc<dyn InterruptWaker>]>) -> Self {
        Self {
            terminate: Arc::new(AtomicBool::new(false)),
            wakers,
        }
    }

    /// Ask the round barrier to exit and wake it if it is parked.
    ///
    /// Safe from any thread, including from inside the round callback.
    pub fn stop(&self) {
        self.terminate.store(true, Ordering::SeqCst);
        for waker in self.wakers.iter() {
            if let Err(e) = waker.wake() {
                warn!(error = %e, "Failed to wake interrupt channel");
            }
        }
    }

    /// Check if [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        self.terminate.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for StopHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopHandle")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// One installed callback and the thread serving it.
struct Installation {
    stop: StopHandle,
    handle: Option<JoinHandle<Vec<ReadoutBatch>>>,
}

impl Installation {
    fn signal(&self) {
        self.stop.stop();
    }

    /// Join the barrier thread, if it is still owned here.
    fn join(&mut self) -> Option<Vec<ReadoutBatch>> {
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(batches) => Some(batches),
            Err(_) => {
                error!("Round barrier thread panicked");
                None
            }
        }
    }
}

/// N acquisition boards read out in lockstep.
///
/// The group owns its boards for its whole lifetime. Installing a callback
/// starts every board and a round barrier thread; the callback then runs once
/// per round with one [`ReadoutBatch`] per board, in the order the boards
/// were passed to [`new`](Self::new).
///
/// # Example
///
/// ```
/// use daq_board::{AcquisitionBoard, AcquisitionConfig, SimulatedBoard};
/// use daq_multiboard::{InstallMode, MultiboardGroup, RoundEvent};
///
/// let mut boards: Vec<Box<dyn AcquisitionBoard>> = Vec::new();
/// let mut controllers = Vec::new();
/// for id in 0..2 {
///     let mut board = SimulatedBoard::open(id)?;
///     board.configure(&AcquisitionConfig::default())?;
///     controllers.push(board.controller());
///     boards.push(Box::new(board));
/// }
///
/// let mut group = MultiboardGroup::new(boards)?;
/// let (tx, rx) = std::sync::mpsc::channel();
/// group.install(
///     move |event| {
///         if let RoundEvent::Round(batches) = event {
///             let _ = tx.send(batches.len());
///         }
///     },
///     InstallMode::Background,
/// )?;
///
/// for controller in &controllers {
///     controller.complete_buffer()?;
/// }
/// assert_eq!(rx.recv_timeout(std::time::Duration::from_secs(5))?, 2);
///
/// group.remove()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct MultiboardGroup {
    boards: Arc<[BoardSlot]>,
    configs: Vec<ResolvedConfig>,
    batches: Option<Vec<ReadoutBatch>>,
    installed: Option<Installation>,
    wakers: Arc<[Arc<dyn InterruptWaker>]>,
    stop: StopHandle,
    stats: Arc<RoundStats>,
}

impl MultiboardGroup {
    /// Group configured boards.
    ///
    /// Fails on an empty list, on a board that was never configured, or on
    /// two boards sharing an id.
    pub fn new(boards: Vec<Box<dyn AcquisitionBoard>>) -> Result<Self> {
        if boards.is_empty() {
            return Err(MultiboardError::setup("a group needs at least one board"));
        }

        let mut seen = HashSet::new();
        let mut configs = Vec::with_capacity(boards.len());
        for board in &boards {
            if !seen.insert(board.id()) {
                return Err(MultiboardError::setup(format!(
                    "board {} appears more than once",
                    board.id()
                )));
            }
            let resolved = board.resolved().ok_or_else(|| {
                MultiboardError::setup(format!("board {} is not configured", board.id()))
            })?;
            configs.push(resolved.clone());
        }

        let ids: Vec<u32> = boards.iter().map(|b| b.id()).collect();
        let batches = allocate_batches(&ids, &configs);
        let stats = Arc::new(RoundStats::new(boards.len()));
        let wakers: Arc<[Arc<dyn InterruptWaker>]> = boards.iter().map(|b| b.waker()).collect();
        let boards: Arc<[BoardSlot]> = boards.into_iter().map(Mutex::new).collect();

        info!(boards = ?ids, "Created multiboard group");

        Ok(Self {
            boards,
            configs,
            batches: Some(batches),
            installed: None,
            stop: StopHandle::new(wakers.clone()),
            wakers,
            stats,
        })
    }

    /// Number of boards.
    pub fn len(&self) -> usize {
        self.boards.len()
    }

    /// Always false: a group holds at least one board.
    pub fn is_empty(&self) -> bool {
        self.boards.is_empty()
    }

    /// Board ids in group order.
    pub fn board_ids(&self) -> Vec<u32> {
        self.boards.iter().map(|slot| slot.lock().id()).collect()
    }

    /// Configuration each board was grouped with.
    pub fn configs(&self) -> &[ResolvedConfig] {
        &self.configs
    }

    /// Check if a callback is installed.
    pub fn is_installed(&self) -> bool {
        self.installed.is_some()
    }

    /// Check if the round barrier thread is still running.
    pub fn is_running(&self) -> bool {
        self.installed
            .as_ref()
            .and_then(|inst| inst.handle.as_ref())
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Handle that stops the current installation, or the next one when
    /// nothing is installed.
    ///
    /// This is how an [`InstallMode::Blocking`] install is ended without a
    /// failure: clone the handle into another thread or into the callback
    /// before installing.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Live round counters.
    pub fn stats(&self) -> Arc<RoundStats> {
        self.stats.clone()
    }

    /// Run `f` against the board at `index`.
    ///
    /// While the barrier runs this contends with it for the board lock; keep
    /// `f` short.
    pub fn with_board<R>(&self, index: usize, f: impl FnOnce(&dyn AcquisitionBoard) -> R) -> Option<R> {
        let slot = self.boards.get(index)?;
        let board = slot.lock();
        Some(f(&**board))
    }

    /// Install `callback`, start every board and the round barrier.
    ///
    /// The callback runs on the barrier thread, once per completed round or
    /// once with [`RoundEvent::Failed`] before the barrier stops. Setup
    /// failures are returned here and never reach the callback. With
    /// [`InstallMode::Blocking`] this returns only after the barrier has
    /// stopped, on a terminal failure or through a [`StopHandle`].
    pub fn install<F>(&mut self, callback: F, mode: InstallMode) -> Result<()>
    where
        F: FnMut(RoundEvent<'_>) + Send + 'static,
    {
        self.install_boxed(Box::new(callback), mode)
    }

    /// Install a callback that forwards owned round snapshots over a channel.
    ///
    /// Rounds arriving while the channel is full are dropped and counted in
    /// [`RoundStats::rounds_dropped`]. A terminal failure is delivered as the
    /// final `Err` item.
    pub fn install_channel(&mut self, capacity: usize) -> Result<RoundReceiver> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let stats = self.stats.clone();

        self.install(
            move |event| match event {
                RoundEvent::Round(batches) => {
                    let snapshot = RoundSnapshot::capture(batches);
                    match tx.try_send(Ok(snapshot)) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            stats.record_dropped();
                            debug!("Dropped round (sink full)");
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            debug!("Round sink closed");
                        }
                    }
                }
                RoundEvent::Failed(err) => {
                    if tx.blocking_send(Err(err)).is_err() {
                        debug!("Round sink closed before failure delivery");
                    }
                }
            },
            InstallMode::Background,
        )?;

        Ok(rx)
    }

    fn install_boxed(&mut self, callback: RoundCallback, mode: InstallMode) -> Result<()> {
        if self.installed.is_some() {
            return Err(MultiboardError::AlreadyInstalled);
        }

        let batches = match self.batches.take() {
            Some(batches) => batches,
            None => self.fresh_batches(),
        };
        let stop = self.stop.clone();
        self.stats.reset();

        let barrier = RoundBarrier::new(
            self.boards.clone(),
            batches,
            stop.terminate.clone(),
            self.stats.clone(),
            callback,
        );
        let handle = match thread::Builder::new()
            .name("round-barrier".to_string())
            .spawn(move || barrier.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                self.batches = Some(self.fresh_batches());
                return Err(MultiboardError::setup(format!(
                    "failed to spawn round barrier thread: {}",
                    e
                )));
            }
        };

        let mut installation = Installation {
            stop,
            handle: Some(handle),
        };

        if let Err(err) = self.start_boards() {
            warn!(error = %err, "Start failed, rolling back install");
            installation.signal();
            let batches = installation.join().unwrap_or_else(|| self.fresh_batches());
            self.batches = Some(batches);
            self.stop_boards();
            self.stop = StopHandle::new(self.wakers.clone());
            return Err(err);
        }

        info!(boards = self.boards.len(), ?mode, "Round callback installed");

        if mode == InstallMode::Blocking {
            let batches = installation.join().unwrap_or_else(|| self.fresh_batches());
            self.batches = Some(batches);
        }
        self.installed = Some(installation);
        Ok(())
    }

    /// Start sequence for every board.
    ///
    /// DMA, triggers and clock are set up board by board; the potentially
    /// slow initialise-and-start runs on one helper thread per board so the
    /// boards begin sampling as close together as possible.
    fn start_boards(&self) -> Result<()> {
        for slot in self.boards.iter() {
            let mut board = slot.lock();
            let id = board.id();
            let start_err = |source: BoardError| MultiboardError::StartFailed { board: id, source };

            let channels = board
                .geometry()
                .ok_or_else(|| MultiboardError::setup(format!("board {} lost its configuration", id)))?
                .channels;
            for channel in 0..channels {
                board.start_dma(channel).map_err(start_err)?;
            }
            board.arm_triggers().map_err(start_err)?;
            board.program_rate().map_err(start_err)?;
            debug!(board = id, channels, "Board armed");
        }

        let results: Vec<Result<()>> = thread::scope(|scope| {
            let helpers: Vec<_> = self
                .boards
                .iter()
                .map(|slot| {
                    thread::Builder::new()
                        .name("board-start".to_string())
                        .spawn_scoped(scope, move || {
                            let mut board = slot.lock();
                            let id = board.id();
                            board
                                .initialize_and_start()
                                .map_err(|source| MultiboardError::StartFailed { board: id, source })
                        })
                })
                .collect();

            helpers
                .into_iter()
                .map(|helper| match helper {
                    Ok(handle) => handle
                        .join()
                        .unwrap_or_else(|_| Err(MultiboardError::setup("board start helper panicked"))),
                    Err(e) => Err(MultiboardError::setup(format!(
                        "failed to spawn board start helper: {}",
                        e
                    ))),
                })
                .collect()
        });

        results.into_iter().collect()
    }

    fn stop_boards(&self) -> Option<MultiboardError> {
        let mut first = None;
        for slot in self.boards.iter() {
            let mut board = slot.lock();
            if let Err(e) = board.stop() {
                warn!(board = board.id(), error = %e, "Failed to stop board");
                first.get_or_insert(MultiboardError::from(e));
            }
        }
        first
    }

    fn fresh_batches(&self) -> Vec<ReadoutBatch> {
        let ids = self.board_ids();
        allocate_batches(&ids, &self.configs)
    }

    /// Stop the round barrier and every board, and drop the callback.
    ///
    /// Safe to call at any time; without an installed callback it does
    /// nothing. Returns the first board stop failure, after stopping the rest.
    pub fn remove(&mut self) -> Result<()> {
        let Some(mut installation) = self.installed.take() else {
            return Ok(());
        };

        installation.signal();
        if installation.handle.is_some() {
            let batches = installation.join().unwrap_or_else(|| self.fresh_batches());
            self.batches = Some(batches);
        }

        self.stop = StopHandle::new(self.wakers.clone());

        let result = match self.stop_boards() {
            Some(err) => Err(err),
            None => Ok(()),
        };

        info!(
            rounds = self.stats.rounds_completed(),
            last_error = ?self.stats.last_error(),
            "Round callback removed"
        );
        result
    }

    /// Remove any installed callback, then release every board.
    pub fn destroy(mut self) -> Result<()> {
        self.remove()
    }
}

impl std::fmt::Debug for MultiboardGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiboardGroup")
            .field("boards", &self.boards.len())
            .field("installed", &self.is_installed())
            .field("running", &self.is_running())
            .finish()
    }
}

impl Drop for MultiboardGroup {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            error!(error = %e, "Failed to remove round callback on drop");
        }
        debug!(boards = self.boards.len(), "Multiboard group destroyed");
    }
}

fn allocate_batches(ids: &[u32], configs: &[ResolvedConfig]) -> Vec<ReadoutBatch> {
    ids.iter()
        .zip(configs)
        .map(|(&id, config)| ReadoutBatch::new(id, config))
        .collect()
}
