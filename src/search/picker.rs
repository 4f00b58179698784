//! Staged move picker.
//!
//! Moves are generated lazily, stage by stage, so that a beta cutoff on
//! the TT move or a good capture never pays for quiet generation. Bad
//! captures found during the good-noisy stage are stashed at the front of
//! the buffer and replayed last.

use crate::board::movegen::{self, MAX_MOVES};
use crate::board::types::{Move, PieceType, Score, Square};
use crate::board::Board;

use super::worker::Worker;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
enum Stage {
    Tt,
    GenNoisy,
    GoodNoisy,
    Killer,
    Counter,
    GenQuiet,
    Quiet,
    BadNoisy,
    CheckTt,
    CheckGenAll,
    CheckPickAll,
    Done,
}

/// MVV-style bonus per captured piece type.
const CAPTURED_BONUS: [i32; 8] = [0, 0, 1280, 1280, 2560, 5120, 0, 0];

pub struct MovePicker {
    stage: Stage,
    in_qsearch: bool,
    tt_move: Move,
    pub killer: Move,
    pub counter: Move,
    moves: [Move; MAX_MOVES],
    scores: [i32; MAX_MOVES],
    count: usize,
    current: usize,
    bad_noisy: usize,
    /// Continuation tables for the two previous plies, as (piece, to)
    /// indices into the worker's tables.
    cont_index: [Option<(crate::board::types::Piece, Square)>; 2],
}

impl MovePicker {
    /// Builds a picker for the node. `killer` comes from the search stack,
    /// `prev` identifies the previous move (piece on its destination) so
    /// the countermove slot can be consulted, and `cont_index` addresses
    /// the continuation histories of the two prior plies.
    pub fn new(
        board: &Board,
        worker: &Worker,
        in_qsearch: bool,
        tt_move: Move,
        killer: Move,
        prev: Option<(crate::board::types::Piece, Square)>,
        cont_index: [Option<(crate::board::types::Piece, Square)>; 2],
    ) -> MovePicker {
        let tt_usable = !tt_move.is_none()
            && (!in_qsearch || board.move_is_noisy(tt_move))
            && board.move_is_pseudo_legal(tt_move);

        let stage = if board.in_check() {
            if tt_move.is_none() || !board.move_is_pseudo_legal(tt_move) {
                Stage::CheckGenAll
            } else {
                Stage::CheckTt
            }
        } else if tt_usable {
            Stage::Tt
        } else {
            Stage::GenNoisy
        };

        let counter = match prev {
            Some((piece, to)) => worker.counter_hist.get(piece, to),
            None => Move::NONE,
        };

        MovePicker {
            stage,
            in_qsearch,
            tt_move,
            killer,
            counter,
            moves: [Move::NONE; MAX_MOVES],
            scores: [0; MAX_MOVES],
            count: 0,
            current: 0,
            bad_noisy: 0,
            cont_index,
        }
    }

    /// True once the picker has entered the losing-captures stage; the
    /// qsearch uses this to stop searching.
    pub fn in_bad_noisy_stage(&self) -> bool {
        self.stage == Stage::BadNoisy
    }

    /// Selection sort step: moves the best remaining move to `current`.
    fn pick_best(&mut self) {
        let mut best = self.current;
        for i in self.current + 1..self.count {
            if self.scores[i] > self.scores[best] {
                best = i;
            }
        }
        self.moves.swap(self.current, best);
        self.scores.swap(self.current, best);
    }

    fn score_noisy(&mut self, board: &Board, worker: &Worker, from: usize) {
        for i in from..self.count {
            let mv = self.moves[i];
            let to = mv.to();
            let moved = board.piece_on(mv.from());

            let captured = match mv.kind() {
                crate::board::types::MoveKind::Promotion => mv.promotion_type(),
                crate::board::types::MoveKind::EnPassant => PieceType::Pawn,
                _ => board.piece_on(to).piece_type(),
            };

            self.scores[i] = CAPTURED_BONUS[captured.index()]
                + worker.capture_hist.score(moved, to, captured);
        }
    }

    fn quiet_score(&self, board: &Board, worker: &Worker, mv: Move) -> i32 {
        let moved = board.piece_on(mv.from());
        let to = mv.to();
        let mut score = worker.butterfly_hist.score(moved, mv) / 2;

        for index in self.cont_index.iter().flatten() {
            score += worker
                .continuation_hist
                .table(index.0, index.1)
                .score(moved, to);
        }

        score
    }

    fn score_quiets(&mut self, board: &Board, worker: &Worker, from: usize) {
        for i in from..self.count {
            self.scores[i] = self.quiet_score(board, worker, self.moves[i]);
        }
    }

    fn score_evasions(&mut self, board: &Board, worker: &Worker) {
        for i in 0..self.count {
            let mv = self.moves[i];
            if board.move_is_noisy(mv) {
                // Captures of the checker first, MVV/LVA ordered.
                let captured = board.piece_on(mv.to()).piece_type();
                let moved = board.piece_on(mv.from()).piece_type();
                self.scores[i] = 65536 + captured.index() as i32 * 8 - moved.index() as i32;
            } else {
                self.scores[i] = self.quiet_score(board, worker, mv);
            }
        }
    }

    /// Yields the next candidate move, or `Move::NONE` when exhausted.
    /// `see_threshold` gates the good-noisy stage (probcut raises it).
    pub fn next(
        &mut self,
        board: &Board,
        worker: &Worker,
        skip_quiets: bool,
        see_threshold: Score,
    ) -> Move {
        loop {
            match self.stage {
                Stage::Tt | Stage::CheckTt => {
                    self.stage = if self.stage == Stage::Tt {
                        Stage::GenNoisy
                    } else {
                        Stage::CheckGenAll
                    };
                    return self.tt_move;
                }

                Stage::GenNoisy => {
                    let mut list = movegen::Movelist::new();
                    movegen::generate_noisy(&mut list, board, self.in_qsearch);
                    self.count = list.len();
                    self.moves[..self.count].copy_from_slice(list.as_slice());
                    self.score_noisy(board, worker, 0);
                    self.current = 0;
                    self.bad_noisy = 0;
                    self.stage = Stage::GoodNoisy;
                }

                Stage::GoodNoisy => {
                    while self.current < self.count {
                        self.pick_best();
                        let mv = self.moves[self.current];

                        if mv != self.tt_move && board.see_above(mv, see_threshold) {
                            self.current += 1;
                            return mv;
                        }

                        // Keep losing captures for the last stage.
                        self.moves[self.bad_noisy] = mv;
                        self.scores[self.bad_noisy] = self.scores[self.current];
                        self.bad_noisy += 1;
                        self.current += 1;
                    }

                    if self.in_qsearch {
                        self.current = 0;
                        self.stage = Stage::BadNoisy;
                    } else {
                        self.stage = Stage::Killer;
                    }
                }

                Stage::Killer => {
                    self.stage = Stage::Counter;
                    let killer = self.killer;
                    if !killer.is_none()
                        && killer != self.tt_move
                        && !board.move_is_noisy(killer)
                        && board.move_is_pseudo_legal(killer)
                    {
                        return killer;
                    }
                }

                Stage::Counter => {
                    self.stage = Stage::GenQuiet;
                    let counter = self.counter;
                    if !counter.is_none()
                        && counter != self.tt_move
                        && counter != self.killer
                        && !board.move_is_noisy(counter)
                        && board.move_is_pseudo_legal(counter)
                    {
                        return counter;
                    }
                }

                Stage::GenQuiet => {
                    if !skip_quiets {
                        let mut list = movegen::Movelist::new();
                        movegen::generate_quiet(&mut list, board);
                        let start = self.current;
                        self.count = start + list.len();
                        self.moves[start..self.count].copy_from_slice(list.as_slice());
                        self.score_quiets(board, worker, start);
                    }
                    self.stage = Stage::Quiet;
                }

                Stage::Quiet => {
                    if !skip_quiets {
                        while self.current < self.count {
                            self.pick_best();
                            let mv = self.moves[self.current];
                            self.current += 1;

                            if mv != self.tt_move && mv != self.killer && mv != self.counter {
                                return mv;
                            }
                        }
                    }
                    self.current = 0;
                    self.stage = Stage::BadNoisy;
                }

                Stage::BadNoisy => {
                    while self.current < self.bad_noisy {
                        let mv = self.moves[self.current];
                        self.current += 1;
                        if mv != self.tt_move {
                            return mv;
                        }
                    }
                    self.stage = Stage::Done;
                }

                Stage::CheckGenAll => {
                    let mut list = movegen::Movelist::new();
                    movegen::generate_incheck(&mut list, board);
                    self.count = list.len();
                    self.moves[..self.count].copy_from_slice(list.as_slice());
                    self.score_evasions(board, worker);
                    self.current = 0;
                    self.stage = Stage::CheckPickAll;
                }

                Stage::CheckPickAll => {
                    while self.current < self.count {
                        self.pick_best();
                        let mv = self.moves[self.current];
                        self.current += 1;
                        if mv != self.tt_move {
                            return mv;
                        }
                    }
                    self.stage = Stage::Done;
                }

                Stage::Done => return Move::NONE,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::worker::Worker;

    fn drain(board: &Board, worker: &Worker, tt_move: Move) -> Vec<Move> {
        let mut picker = MovePicker::new(
            board,
            worker,
            false,
            tt_move,
            Move::NONE,
            None,
            [None, None],
        );
        let mut seen = Vec::new();
        loop {
            let mv = picker.next(board, worker, false, 0);
            if mv.is_none() {
                break;
            }
            seen.push(mv);
        }
        seen
    }

    #[test]
    fn test_yields_every_pseudo_legal_move_once() {
        let board = Board::from_fen(
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
            false,
        )
        .unwrap();
        let worker = Worker::standalone();

        let mut list = movegen::Movelist::new();
        movegen::generate_pseudo(&mut list, &board);
        let yielded = drain(&board, &worker, Move::NONE);

        assert_eq!(yielded.len(), list.len());
        for &mv in list.iter() {
            assert_eq!(yielded.iter().filter(|&&m| m == mv).count(), 1, "{mv:?}");
        }
    }

    #[test]
    fn test_tt_move_comes_first_and_is_deduped() {
        let board = Board::startpos();
        let worker = Worker::standalone();
        let tt_move = board.uci_to_move("e2e4");

        let yielded = drain(&board, &worker, tt_move);
        assert_eq!(yielded[0], tt_move);
        assert_eq!(yielded.iter().filter(|&&m| m == tt_move).count(), 1);
        assert_eq!(yielded.len(), 20);
    }

    #[test]
    fn test_good_captures_before_quiets() {
        // White can win a queen with exd5 and also has many quiets.
        let board =
            Board::from_fen("rnb1kbnr/ppp1pppp/8/3q4/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 3", false)
                .unwrap();
        let worker = Worker::standalone();
        let yielded = drain(&board, &worker, Move::NONE);
        assert_eq!(yielded[0], board.uci_to_move("e4d5"));
    }

    #[test]
    fn test_evasion_mode_when_in_check() {
        let board =
            Board::from_fen("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3", false)
                .unwrap();
        let worker = Worker::standalone();
        let yielded = drain(&board, &worker, Move::NONE);

        let mut evasions = movegen::Movelist::new();
        movegen::generate_incheck(&mut evasions, &board);
        assert_eq!(yielded.len(), evasions.len());
    }
}
