//! Search time management.
//!
//! Derives a soft (`optimal`) and hard (`maximal`) budget from the clock,
//! then rescales the soft budget after every iteration based on how
//! stable the best move is and how much the score moved.

use std::time::Instant;

use crate::board::movegen::{generate_legal, Movelist};
use crate::board::types::{Move, Score, NO_SCORE};
use crate::board::Board;
use crate::search::SearchParams;

/// Scaling by the number of consecutive iterations the best move held.
const BESTMOVE_STABILITY_SCALE: [f64; 5] = [2.50, 1.20, 0.90, 0.80, 0.75];

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum TimeMode {
    /// No clock: fixed depth/nodes or infinite analysis.
    None,
    /// Exact time per move.
    Movetime,
    /// Clock plus increment; budgets are adjusted between iterations.
    Tournament,
}

#[derive(Clone, Debug)]
pub struct TimeManager {
    start: Instant,
    mode: TimeMode,
    average_ms: u64,
    optimal_ms: u64,
    maximal_ms: u64,
    pondering: bool,
    /// How often (in node batches) the stop conditions are polled.
    pub check_frequency: u64,
    prev_score: Score,
    prev_bestmove: Move,
    stability: usize,
}

impl TimeManager {
    /// Sets up budgets for a `go` command issued at `start`.
    pub fn new(board: &Board, params: &SearchParams, overhead_ms: u64, start: Instant) -> Self {
        let mut tm = TimeManager {
            start,
            mode: TimeMode::None,
            average_ms: 0,
            optimal_ms: 0,
            maximal_ms: 0,
            pondering: false,
            check_frequency: 1000,
            prev_score: NO_SCORE,
            prev_bestmove: Move::NONE,
            stability: 0,
        };

        if let Some(nodes) = params.nodes {
            tm.check_frequency = ((nodes as f64).sqrt() + 0.5).min(1000.0).max(1.0) as u64;
        }

        let our_time = params.time_for(board.side_to_move());
        let our_inc = params.inc_for(board.side_to_move());

        if let Some(time) = our_time {
            tm.mode = TimeMode::Tournament;

            let mtg = params.movestogo.unwrap_or(40).max(1) as f64;
            let time = time.saturating_sub(overhead_ms.min(time));
            let inc = our_inc.unwrap_or(0);

            tm.average_ms = (time as f64 / mtg) as u64 + inc;
            tm.maximal_ms = (time as f64 / mtg.powf(0.4)) as u64 + inc;

            // While pondering the opponent pays for our thinking time.
            if params.ponder {
                tm.pondering = true;
                tm.average_ms += tm.average_ms / 4;
            }

            tm.average_ms = tm.average_ms.min(time);
            tm.maximal_ms = tm.maximal_ms.min(time);
            tm.optimal_ms = tm.maximal_ms;

            log::debug!("maximal search time: {} ms", tm.maximal_ms);
        } else if let Some(movetime) = params.movetime {
            tm.mode = TimeMode::Movetime;
            let budget = if movetime <= overhead_ms {
                1
            } else {
                movetime - overhead_ms
            };
            tm.average_ms = budget;
            tm.optimal_ms = budget;
            tm.maximal_ms = budget;

            log::debug!("maximal search time: {} ms", tm.maximal_ms);
        }

        tm
    }

    #[inline]
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    #[inline]
    pub fn start_time(&self) -> Instant {
        self.start
    }

    /// Converts a score delta into a time scale in [0.5, 2.0]: losing
    /// ground buys time, gaining ground spends less.
    fn score_difference_scale(delta: Score) -> f64 {
        2f64.powf(delta.clamp(-100, 100) as f64 / 100.0)
    }

    /// Re-derives the soft budget after a finished iteration.
    pub fn update(&mut self, board: &Board, bestmove: Move, score: Score) {
        if self.mode != TimeMode::Tournament {
            return;
        }

        let mut scale = 1.0;

        // With a single legal reply there is nothing to think about.
        let mut list = Movelist::new();
        generate_legal(&mut list, board);
        if list.len() == 1 {
            scale = 0.2;
        }

        if self.prev_bestmove != bestmove {
            self.prev_bestmove = bestmove;
            self.stability = 0;
        } else {
            self.stability = (self.stability + 1).min(4);
        }

        scale *= BESTMOVE_STABILITY_SCALE[self.stability];

        if self.prev_score != NO_SCORE {
            scale *= Self::score_difference_scale(self.prev_score - score);
        }

        self.prev_score = score;
        self.optimal_ms = ((self.average_ms as f64 * scale) as u64).min(self.maximal_ms);

        log::debug!("optimal search time: {} ms", self.optimal_ms);
    }

    /// Soft stop, honored between iterations by the main worker.
    pub fn can_stop_search(&self) -> bool {
        self.mode != TimeMode::None && self.elapsed_ms() >= self.optimal_ms
    }

    /// Hard stop, polled during search.
    pub fn must_stop_search(&self) -> bool {
        self.mode != TimeMode::None && self.elapsed_ms() >= self.maximal_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params_with_time(wtime: u64, winc: u64) -> SearchParams {
        SearchParams {
            wtime: Some(wtime),
            winc: Some(winc),
            ..SearchParams::default()
        }
    }

    #[test]
    fn test_tournament_budgets() {
        let board = Board::startpos();
        let tm = TimeManager::new(&board, &params_with_time(60_000, 1_000), 30, Instant::now());

        // average = time/40 + inc, maximal = time/40^0.4 + inc.
        assert_eq!(tm.average_ms, 59_970 / 40 + 1_000);
        assert!(tm.maximal_ms > tm.average_ms);
        assert!(tm.maximal_ms <= 59_970);
    }

    #[test]
    fn test_movetime_subtracts_overhead() {
        let board = Board::startpos();
        let params = SearchParams {
            movetime: Some(1_000),
            ..SearchParams::default()
        };
        let tm = TimeManager::new(&board, &params, 50, Instant::now());
        assert_eq!(tm.maximal_ms, 950);
        assert!(!tm.can_stop_search());
    }

    #[test]
    fn test_depth_only_never_stops() {
        let board = Board::startpos();
        let params = SearchParams {
            depth: Some(10),
            ..SearchParams::default()
        };
        let tm = TimeManager::new(&board, &params, 50, Instant::now());
        assert!(!tm.must_stop_search());
        assert!(!tm.can_stop_search());
    }

    #[test]
    fn test_stability_shrinks_budget() {
        let board = Board::startpos();
        let mut tm =
            TimeManager::new(&board, &params_with_time(60_000, 0), 0, Instant::now());
        let mv = board.uci_to_move("e2e4");

        tm.update(&board, mv, 20);
        let first = tm.optimal_ms;
        for _ in 0..4 {
            tm.update(&board, mv, 20);
        }
        assert!(tm.optimal_ms < first);
    }

    #[test]
    fn test_score_swing_scale() {
        assert!((TimeManager::score_difference_scale(100) - 2.0).abs() < 1e-9);
        assert!((TimeManager::score_difference_scale(-100) - 0.5).abs() < 1e-9);
        assert!((TimeManager::score_difference_scale(0) - 1.0).abs() < 1e-9);
    }
}
