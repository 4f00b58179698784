//! Per-thread search state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::board::types::{Move, Piece, Score, Square, INF_SCORE, NO_SCORE};
use crate::board::Board;
use crate::engine::time::TimeManager;
use crate::engine::{EngineOptions, SharedState};
use crate::eval::king_pawn::KingPawnTable;

use super::history::{
    ButterflyHistory, CaptureHistory, ContinuationHistory, CorrectionHistory, CountermoveHistory,
};
use super::{SearchParams, MAX_STACK};

/// A root move with its running score and principal variation.
#[derive(Clone, Debug)]
pub struct RootMove {
    pub mv: Move,
    pub seldepth: u16,
    pub previous_score: Score,
    pub score: Score,
    pub pv: Vec<Move>,
}

impl RootMove {
    pub fn new(mv: Move) -> RootMove {
        RootMove {
            mv,
            seldepth: 0,
            previous_score: -INF_SCORE,
            score: -INF_SCORE,
            pv: vec![mv],
        }
    }
}

/// Sorts a root-move slice by score, ties broken by the previous
/// iteration's score. Stable so equal moves keep their generation order.
pub fn sort_root_moves(moves: &mut [RootMove]) {
    moves.sort_by(|a, b| {
        (b.score, b.previous_score).cmp(&(a.score, a.previous_score))
    });
}

/// One search-stack frame. The stack is indexed at `plies + 4` so that
/// continuation-history lookups can reach four plies back without bounds
/// checks.
#[derive(Clone)]
pub struct StackEntry {
    pub plies: i16,
    pub double_extensions: i16,
    pub static_eval: Score,
    pub killer: Move,
    pub excluded_move: Move,
    pub current_move: Move,
    /// Identifies the continuation-history table of the move made at this
    /// ply; `None` after a null move.
    pub cont_index: Option<(Piece, Square)>,
    pub pv: Vec<Move>,
}

impl StackEntry {
    fn new(plies: i16) -> StackEntry {
        StackEntry {
            plies,
            double_extensions: 0,
            static_eval: NO_SCORE,
            killer: Move::NONE,
            excluded_move: Move::NONE,
            current_move: Move::NONE,
            cont_index: None,
            pv: Vec::new(),
        }
    }
}

/// A search thread's private state. Only the transposition table and the
/// pool's atomic flags are shared; everything here belongs to one thread.
pub struct Worker {
    pub board: Board,
    pub thread_index: usize,
    pub shared: Arc<SharedState>,
    pub options: EngineOptions,
    pub params: SearchParams,

    pub butterfly_hist: ButterflyHistory,
    pub continuation_hist: ContinuationHistory,
    pub counter_hist: CountermoveHistory,
    pub capture_hist: CaptureHistory,
    pub correction_hist: CorrectionHistory,
    pub king_pawn_table: KingPawnTable,

    pub nodes: Arc<AtomicU64>,
    /// Node counters of every worker, for pool-wide totals.
    pub node_counters: Vec<Arc<AtomicU64>>,

    pub seldepth: u16,
    pub root_depth: u16,
    pub nmp_verif_plies: i16,
    pub root_moves: Vec<RootMove>,
    pub pv_line: usize,

    /// Main-worker only: time budgets for the current search.
    pub timeman: Option<TimeManager>,
    pub check_counter: u64,

    pub stack: Vec<StackEntry>,
}

impl Worker {
    pub fn new(thread_index: usize, shared: Arc<SharedState>, options: EngineOptions) -> Worker {
        Worker {
            board: Board::startpos(),
            thread_index,
            shared,
            options,
            params: SearchParams::default(),
            butterfly_hist: ButterflyHistory::new(),
            continuation_hist: ContinuationHistory::new(),
            counter_hist: CountermoveHistory::new(),
            capture_hist: CaptureHistory::new(),
            correction_hist: CorrectionHistory::new(),
            king_pawn_table: KingPawnTable::new(),
            nodes: Arc::new(AtomicU64::new(0)),
            node_counters: Vec::new(),
            seldepth: 0,
            root_depth: 0,
            nmp_verif_plies: 0,
            root_moves: Vec::new(),
            pv_line: 0,
            timeman: None,
            check_counter: 1000,
            stack: (0..MAX_STACK).map(|i| StackEntry::new(i as i16 - 4)).collect(),
        }
    }

    /// Wipes everything that should not leak between games.
    pub fn new_game(&mut self) {
        self.butterfly_hist.clear();
        self.continuation_hist.clear();
        self.counter_hist.clear();
        self.capture_hist.clear();
        self.correction_hist.clear();
        self.king_pawn_table.clear();
    }

    /// Resets per-search state and the root move list.
    pub fn init_search_data(&mut self, board: &Board, params: &SearchParams) {
        use crate::board::movegen::{generate_legal, Movelist};

        self.board = board.clone();
        self.params = params.clone();
        self.nodes.store(0, Ordering::Relaxed);
        self.seldepth = 0;
        self.root_depth = 0;
        self.nmp_verif_plies = 0;
        self.pv_line = 0;

        for (i, entry) in self.stack.iter_mut().enumerate() {
            *entry = StackEntry::new(i as i16 - 4);
        }

        let mut list = Movelist::new();
        generate_legal(&mut list, &self.board);

        self.root_moves = list
            .iter()
            .filter(|mv| {
                params.searchmoves.is_empty() || params.searchmoves.contains(mv)
            })
            .map(|&mv| RootMove::new(mv))
            .collect();
    }

    #[inline]
    pub fn increment_nodes(&self) {
        self.nodes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn total_nodes(&self) -> u64 {
        self.node_counters
            .iter()
            .map(|counter| counter.load(Ordering::Relaxed))
            .sum::<u64>()
            .max(self.nodes.load(Ordering::Relaxed))
    }

    /// A pseudo-random draw score dithers repetition evaluations so the
    /// search doesn't pile up on a single drawing line.
    #[inline]
    pub fn draw_score(&self) -> Score {
        (self.nodes.load(Ordering::Relaxed) & 2) as Score - 1
    }

    #[inline]
    pub fn is_main(&self) -> bool {
        self.thread_index == 0
    }

    /// Periodic stop-condition poll, run by the main worker only.
    pub fn check_time(&mut self) {
        if !self.is_main() {
            return;
        }

        self.check_counter = self.check_counter.saturating_sub(1);
        if self.check_counter > 0 {
            return;
        }

        let frequency = self
            .timeman
            .as_ref()
            .map(|tm| tm.check_frequency)
            .unwrap_or(1000);
        self.check_counter = frequency;

        // Time checks only take effect once pondering ends (ponderhit).
        if self.params.infinite || self.shared.is_pondering() || self.shared.is_stopped() {
            return;
        }

        if let Some(node_limit) = self.params.nodes {
            if self.total_nodes() >= node_limit {
                self.shared.stop();
                return;
            }
        }

        if let Some(tm) = &self.timeman {
            if tm.must_stop_search() {
                self.shared.stop();
            }
        }
    }

    /// A main worker wired to its own private shared state. Used by the
    /// bench harness and tests that want a search without a pool.
    pub fn standalone() -> Worker {
        let shared = Arc::new(SharedState::new(1));
        let mut worker = Worker::new(0, shared, EngineOptions::default());
        worker.node_counters = vec![Arc::clone(&worker.nodes)];
        worker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_move_sorting() {
        let board = Board::startpos();
        let mut moves: Vec<RootMove> = ["e2e4", "d2d4", "g1f3"]
            .iter()
            .map(|text| RootMove::new(board.uci_to_move(text)))
            .collect();

        moves[0].score = 10;
        moves[1].score = 30;
        moves[2].score = 10;
        moves[2].previous_score = 50;

        sort_root_moves(&mut moves);
        assert_eq!(moves[0].score, 30);
        // Tie on score broken by previous_score.
        assert_eq!(moves[1].previous_score, 50);
    }

    #[test]
    fn test_init_search_data_fills_root_moves() {
        let mut worker = Worker::standalone();
        let board = Board::startpos();
        worker.init_search_data(&board, &SearchParams::default());
        assert_eq!(worker.root_moves.len(), 20);

        let restricted = SearchParams {
            searchmoves: vec![board.uci_to_move("e2e4")],
            ..SearchParams::default()
        };
        worker.init_search_data(&board, &restricted);
        assert_eq!(worker.root_moves.len(), 1);
    }

    #[test]
    fn test_draw_score_is_small() {
        let worker = Worker::standalone();
        assert!(worker.draw_score().abs() <= 1);
    }
}
