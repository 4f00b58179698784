//! Worker pool: one persistent OS thread per search worker.
//!
//! Each worker parks on its own mutex/condvar pair until the pool hands it
//! a job. The main worker (index 0) additionally drives time management,
//! wakes the auxiliary workers, and emits the final `bestmove` line. Only
//! the transposition table and the two atomic flags are shared-mutable;
//! all search state is thread-private.

pub mod time;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::board::types::Move;
use crate::board::Board;
use crate::search::{SearchParams, Worker};
use crate::tt::TranspositionTable;
use time::TimeManager;

/// Worker threads get a large stack to accommodate the recursion depth.
const WORKER_STACK_SIZE: usize = 8 * 1024 * 1024;

/// UCI option values affecting search behavior, snapshotted per search.
#[derive(Clone, Debug)]
pub struct EngineOptions {
    pub threads: usize,
    pub hash_mb: usize,
    pub move_overhead: u64,
    pub multi_pv: u32,
    pub chess960: bool,
    pub show_wdl: bool,
    pub normalize_score: bool,
    pub timeman_for_nodes: bool,
    pub ponder: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            threads: 1,
            hash_mb: crate::tt::DEFAULT_TT_MB,
            move_overhead: 30,
            multi_pv: 1,
            chess960: false,
            show_wdl: false,
            normalize_score: true,
            timeman_for_nodes: false,
            ponder: false,
        }
    }
}

/// State shared by every worker during a search.
pub struct SharedState {
    pub tt: TranspositionTable,
    stop: AtomicBool,
    ponder: AtomicBool,
}

impl SharedState {
    pub fn new(hash_mb: usize) -> SharedState {
        SharedState {
            tt: TranspositionTable::new(hash_mb),
            stop: AtomicBool::new(false),
            ponder: AtomicBool::new(false),
        }
    }

    /// A minimal placeholder workers fall back to between searches, so
    /// the pool regains exclusive ownership of the real table.
    fn placeholder() -> Arc<SharedState> {
        Arc::new(SharedState::new(0))
    }

    #[inline]
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn clear_stop(&self) {
        self.stop.store(false, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_ponder(&self, value: bool) {
        self.ponder.store(value, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_pondering(&self) -> bool {
        self.ponder.load(Ordering::Relaxed)
    }
}

/// A search assignment delivered to a parked worker.
struct Job {
    board: Board,
    params: SearchParams,
    options: EngineOptions,
    shared: Arc<SharedState>,
    node_counters: Vec<Arc<AtomicU64>>,
    /// Main worker only: time budgets plus the channels of the auxiliary
    /// workers it must wake.
    timeman: Option<TimeManager>,
    aux: Vec<(Arc<WorkerChannel>, Job)>,
}

struct ChannelState {
    job: Option<Job>,
    new_game: bool,
    is_searching: bool,
    must_exit: bool,
}

/// The per-worker mutex/condvar handshake: the pool (or the main worker)
/// signals start, the worker signals completion.
pub struct WorkerChannel {
    state: Mutex<ChannelState>,
    condvar: Condvar,
}

impl WorkerChannel {
    fn new() -> WorkerChannel {
        WorkerChannel {
            state: Mutex::new(ChannelState {
                job: None,
                new_game: false,
                is_searching: false,
                must_exit: false,
            }),
            condvar: Condvar::new(),
        }
    }

    fn send_job(&self, job: Job) {
        let mut state = self.state.lock();
        state.job = Some(job);
        state.is_searching = true;
        self.condvar.notify_all();
    }

    fn send_new_game(&self) {
        let mut state = self.state.lock();
        state.new_game = true;
        self.condvar.notify_all();
    }

    fn send_exit(&self) {
        let mut state = self.state.lock();
        state.must_exit = true;
        self.condvar.notify_all();
    }

    /// Blocks until the worker has no pending or running work.
    fn wait_idle(&self) {
        let mut state = self.state.lock();
        while state.is_searching || state.job.is_some() || state.new_game {
            self.condvar.wait(&mut state);
        }
    }
}

/// Thread body: park until signaled, run the job, signal completion.
fn worker_loop(thread_index: usize, channel: Arc<WorkerChannel>, nodes: Arc<AtomicU64>) {
    let mut worker = Worker::new(thread_index, SharedState::placeholder(), EngineOptions::default());
    worker.nodes = nodes;

    loop {
        let job = {
            let mut state = channel.state.lock();
            loop {
                if state.must_exit {
                    return;
                }
                if state.new_game {
                    state.new_game = false;
                    worker.new_game();
                    channel.condvar.notify_all();
                    continue;
                }
                if let Some(job) = state.job.take() {
                    break job;
                }
                channel.condvar.wait(&mut state);
            }
        };

        let Job {
            board,
            params,
            options,
            shared,
            node_counters,
            timeman,
            aux,
        } = job;

        worker.shared = shared;
        worker.options = options;
        worker.node_counters = node_counters;
        worker.timeman = timeman;
        worker.check_counter = 1;
        worker.init_search_data(&board, &params);

        if worker.is_main() {
            main_worker_search(&mut worker, aux);
        } else {
            worker.worker_search();
        }

        // Drop the shared handle so the pool can resize the table while
        // everyone is idle.
        worker.shared = SharedState::placeholder();
        worker.timeman = None;

        let mut state = channel.state.lock();
        state.is_searching = false;
        channel.condvar.notify_all();
    }
}

/// The main worker's search orchestration: perft, the no-legal-move
/// special case, auxiliary worker wake-up, and the bestmove report.
fn main_worker_search(worker: &mut Worker, aux: Vec<(Arc<WorkerChannel>, Job)>) {
    use crate::uci::report;

    // Perft searches bypass the whole pipeline.
    if let Some(depth) = worker.params.perft {
        let start = Instant::now();
        let nodes = crate::perft::perft(&mut worker.board, depth as usize);
        let elapsed = start.elapsed().as_millis().max(1) as u64;
        report::print_perft(nodes, nodes * 1000 / elapsed, elapsed);
        worker.shared.stop();
        return;
    }

    if worker.root_moves.is_empty() {
        // Checkmate or stalemate at the root.
        report::print_no_legal_moves(worker.board.in_check());
        wait_for_stop_permission(worker);
        worker.shared.stop();
        report::print_bestmove(&worker.board, Move::NONE, Move::NONE);
        return;
    }

    worker.shared.tt.new_search();

    // Wake the helpers only after the shared state is ready.
    let mut aux_channels = Vec::with_capacity(aux.len());
    for (channel, job) in aux {
        channel.send_job(job);
        aux_channels.push(channel);
    }

    worker.worker_search();

    // The protocol forbids printing the bestmove before a "stop" in
    // infinite mode or a "ponderhit" while pondering.
    wait_for_stop_permission(worker);
    worker.shared.stop();

    // Wait for the auxiliary workers to finish their iteration.
    for channel in &aux_channels {
        channel.wait_idle();
    }

    let bestmove = worker.root_moves[0].mv;
    let mut ponder = worker.root_moves[0].pv.get(1).copied().unwrap_or(Move::NONE);

    // After a fail-high iteration the PV may be a lone move; try the TT
    // for a ponder move, re-validating against data races.
    if ponder.is_none() {
        worker.board.do_move(bestmove);
        let (_, found, data) = worker.shared.tt.probe(worker.board.stack().board_key);
        if found
            && !data.mv.is_none()
            && worker.board.move_is_pseudo_legal(data.mv)
            && worker.board.move_is_legal(data.mv)
        {
            ponder = data.mv;
        }
        worker.board.undo_move(bestmove);
    }

    report::print_bestmove(&worker.board, bestmove, ponder);
}

fn wait_for_stop_permission(worker: &Worker) {
    while !worker.shared.is_stopped()
        && (worker.shared.is_pondering() || worker.params.infinite)
    {
        std::thread::sleep(std::time::Duration::from_millis(1));
    }
}

struct WorkerHandle {
    thread: Option<JoinHandle<()>>,
    channel: Arc<WorkerChannel>,
    nodes: Arc<AtomicU64>,
}

pub struct WorkerPool {
    shared: Arc<SharedState>,
    handles: Vec<WorkerHandle>,
    options: EngineOptions,
}

impl WorkerPool {
    pub fn new(options: EngineOptions) -> WorkerPool {
        let mut pool = WorkerPool {
            shared: Arc::new(SharedState::new(options.hash_mb)),
            handles: Vec::new(),
            options,
        };
        pool.resize_workers(pool.options.threads);
        pool
    }

    /// Rebuilds the worker threads; callable only between searches.
    pub fn resize_workers(&mut self, count: usize) {
        self.wait_search_completion();
        self.shutdown_workers();

        self.options.threads = count.max(1);
        for index in 0..self.options.threads {
            let channel = Arc::new(WorkerChannel::new());
            let nodes = Arc::new(AtomicU64::new(0));
            let thread_channel = Arc::clone(&channel);
            let thread_nodes = Arc::clone(&nodes);

            let thread = std::thread::Builder::new()
                .name(format!("worker-{index}"))
                .stack_size(WORKER_STACK_SIZE)
                .spawn(move || worker_loop(index, thread_channel, thread_nodes))
                .unwrap_or_else(|err| {
                    eprintln!("info string error: failed to spawn worker: {err}");
                    std::process::exit(1);
                });

            self.handles.push(WorkerHandle {
                thread: Some(thread),
                channel,
                nodes,
            });
        }
    }

    fn shutdown_workers(&mut self) {
        for handle in &self.handles {
            handle.channel.send_exit();
        }
        for handle in &mut self.handles {
            if let Some(thread) = handle.thread.take() {
                let _ = thread.join();
            }
        }
        self.handles.clear();
    }

    pub fn set_options(&mut self, options: EngineOptions) {
        self.options = options;
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Reallocates the transposition table. Requires all workers idle.
    pub fn resize_hash(&mut self, megabytes: usize) {
        self.wait_search_completion();
        self.options.hash_mb = megabytes;

        match Arc::get_mut(&mut self.shared) {
            Some(shared) => shared.tt.resize(megabytes, self.options.threads),
            None => {
                // A worker still holds the old table; replace wholesale.
                self.shared = Arc::new(SharedState::new(megabytes));
            }
        }
    }

    pub fn clear_hash(&mut self) {
        self.wait_search_completion();
        self.shared.tt.clear(self.options.threads);
    }

    /// Resets worker histories and the hash table for a fresh game.
    pub fn new_game(&mut self) {
        self.wait_search_completion();
        for handle in &self.handles {
            handle.channel.send_new_game();
        }
        for handle in &self.handles {
            handle.channel.wait_idle();
        }
        self.shared.tt.clear(self.options.threads);
    }

    /// Launches a search of `board` under `params`. Returns immediately;
    /// the main worker prints `bestmove` when done.
    pub fn start_search(&mut self, board: &Board, params: &SearchParams) {
        let start = Instant::now();
        self.wait_search_completion();

        self.shared.clear_stop();
        self.shared.set_ponder(params.ponder);

        let node_counters: Vec<Arc<AtomicU64>> =
            self.handles.iter().map(|h| Arc::clone(&h.nodes)).collect();

        let timeman = TimeManager::new(board, params, self.options.move_overhead, start);

        // Hand the auxiliary jobs to the main worker, which launches them
        // once the shared state is ready.
        let mut aux = Vec::new();
        for handle in self.handles.iter().skip(1) {
            aux.push((
                Arc::clone(&handle.channel),
                Job {
                    board: board.clone(),
                    params: params.clone(),
                    options: self.options.clone(),
                    shared: Arc::clone(&self.shared),
                    node_counters: node_counters.clone(),
                    timeman: None,
                    aux: Vec::new(),
                },
            ));
        }

        let main_job = Job {
            board: board.clone(),
            params: params.clone(),
            options: self.options.clone(),
            shared: Arc::clone(&self.shared),
            node_counters,
            timeman: Some(timeman),
            aux,
        };

        self.handles[0].channel.send_job(main_job);
    }

    /// Blocks until every worker is idle.
    pub fn wait_search_completion(&self) {
        for handle in &self.handles {
            handle.channel.wait_idle();
        }
    }

    pub fn stop(&self) {
        self.shared.stop();
    }

    pub fn ponderhit(&self) {
        self.shared.set_ponder(false);
    }

    pub fn is_searching(&self) -> bool {
        self.handles
            .iter()
            .any(|handle| handle.channel.state.lock().is_searching)
    }

    pub fn total_nodes(&self) -> u64 {
        self.handles
            .iter()
            .map(|handle| handle.nodes.load(Ordering::Relaxed))
            .sum()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
        self.wait_search_completion();
        self.shutdown_workers();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_to_depth(pool: &mut WorkerPool, board: &Board, depth: u16) {
        let params = SearchParams {
            depth: Some(depth),
            ..SearchParams::default()
        };
        pool.start_search(board, &params);
        pool.wait_search_completion();
    }

    #[test]
    fn test_pool_runs_and_completes() {
        let mut pool = WorkerPool::new(EngineOptions::default());
        let board = Board::startpos();
        run_to_depth(&mut pool, &board, 4);
        assert!(pool.total_nodes() > 0);
        assert!(!pool.is_searching());
    }

    #[test]
    fn test_multithreaded_search() {
        let mut options = EngineOptions::default();
        options.threads = 3;
        let mut pool = WorkerPool::new(options);
        let board = Board::startpos();
        run_to_depth(&mut pool, &board, 5);
        assert!(!pool.is_searching());
    }

    #[test]
    fn test_stop_is_sticky_until_next_search() {
        let pool = WorkerPool::new(EngineOptions::default());
        pool.stop();
        assert!(pool.shared.is_stopped());
    }

    #[test]
    fn test_new_game_resets_cleanly() {
        let mut pool = WorkerPool::new(EngineOptions::default());
        let board = Board::startpos();
        run_to_depth(&mut pool, &board, 3);
        pool.new_game();
        run_to_depth(&mut pool, &board, 3);
    }
}
